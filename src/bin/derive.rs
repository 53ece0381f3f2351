//! Runs a graph grammar on a seed graph.
//!
//! The grammar is read from a JSON [`GrammarSchema`] and the seed graph from a
//! JSON [`GraphSchema`]. The derivation is summarised as a table on stdout and
//! optionally written out as JSON. Set `RUST_LOG=debug` to trace every step.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use graphgram::DerivationConfig;
use graphgram::report::{DerivationOutput, format_state, format_steps};
use graphgram::rewriting::matching::ParallelMatcher;
use graphgram::schema::{GrammarSchema, GraphSchema};
use graphgram::utils::json::{load_json, save_json};

#[derive(Parser, Debug)]
#[command(author, version, about = "Derive graphs from a seed graph with a graph grammar", long_about = None)]
struct Args {
    /// Grammar description (JSON)
    #[arg(short = 'g', long)]
    grammar: PathBuf,

    /// Seed graph description (JSON)
    #[arg(short = 's', long)]
    seed: PathBuf,

    /// Maximum number of rewrites, 0 for no limit
    #[arg(short = 'n', long, default_value_t = 0)]
    steps: usize,

    /// Random seed, overriding the one in the grammar file
    #[arg(short = 'r', long)]
    rng_seed: Option<u64>,

    /// Search budget per production and step, in milliseconds
    #[arg(short = 't', long)]
    match_time_limit: Option<u64>,

    /// Spread the match search over all cores
    #[arg(short = 'p', long)]
    parallel: bool,

    /// Output JSON file path
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut schema: GrammarSchema = load_json(&args.grammar)
        .with_context(|| format!("loading grammar from {:?}", args.grammar))?;
    if args.rng_seed.is_some() {
        schema.seed = args.rng_seed;
    }
    let seed_schema: GraphSchema = load_json(&args.seed)
        .with_context(|| format!("loading seed graph from {:?}", args.seed))?;

    let seed = seed_schema.build().context("building seed graph")?.graph;
    let mut grammar = schema.build().context("building grammar")?;
    if args.parallel {
        grammar = grammar.with_matcher(ParallelMatcher);
    }

    let config = DerivationConfig {
        max_steps: args.steps,
        match_time_limit: args.match_time_limit.map(Duration::from_millis),
    };
    let derivation = grammar.derive(&seed, &config)?;

    let table = format_steps(&derivation);
    if !table.is_empty() {
        println!("{table}");
    }
    println!(
        "{} {} after {} step(s)",
        "Halted:".bold(),
        format_state(derivation.state),
        derivation.len()
    );

    if let Some(output) = &args.output {
        save_json(&DerivationOutput::new(&seed, &derivation), output)
            .with_context(|| format!("writing derivation to {output:?}"))?;
        println!("Wrote derivation to {output:?}");
    }

    Ok(())
}
