//! Random choices made during a derivation.
//!
//! All randomness goes through a caller-provided [`Rng`], so a derivation driven
//! by a seeded generator is reproducible.

use rand::Rng;
use rand::seq::SliceRandom;

/// The indices `0..len` in a uniformly random order.
pub fn randomly<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}

/// A uniformly random index into a collection of `len` items, `None` if it is empty.
pub fn select<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Option<usize> {
    (len > 0).then(|| rng.gen_range(0..len))
}
