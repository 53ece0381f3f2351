//! Graph rewriting: patterns, productions and the derivation driver.
//!
//! A [`Production`](production::Production) pairs a pattern with a replacement
//! graph. Matching finds the occurrences of the pattern in a host graph and
//! applying a production rewrites one occurrence. A [`Grammar`](grammar::Grammar)
//! repeats this over a set of productions.

pub mod assignment;
pub mod correspondence;
pub mod grammar;
pub mod matching;
pub mod predicate;
pub mod production;
pub mod random;
