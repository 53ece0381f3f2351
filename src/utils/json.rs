use std::fs::{
    File,
    OpenOptions
};
use std::io::{
    BufReader,
    Write
};
use std::path::Path;

use serde::{
    Serialize,
    de::DeserializeOwned
};

use crate::error::Result;

/// Reads a JSON document from `path`.
pub fn load_json<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    let data = serde_json::from_reader(BufReader::new(file))?;
    Ok(data)
}

/// Writes `data` to `path` as pretty-printed JSON, replacing any existing file.
pub fn save_json<T, P>(data: &T, path: P) -> Result<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let serialized = serde_json::to_string_pretty(data)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(serialized.as_bytes())?;
    Ok(())
}
