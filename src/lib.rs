//! Graph grammars: attributed graphs rewritten by productions.
//!
//! A [`Grammar`] holds a set of [`Production`]s and derives a sequence of graphs
//! from a seed graph, at each step applying a randomly chosen production at a
//! randomly chosen match.

#[macro_use]
mod macros;

pub mod error;
pub mod graph;
pub mod report;
pub mod rewriting;
pub mod schema;
pub mod utils;

pub use error::{Error, Result};
pub use graph::{Attributes, DanglingPolicy, EdgeId, EdgeMode, Element, Graph, Value, VertexId};
pub use rewriting::grammar::{Derivation, DerivationConfig, DerivationState, Grammar};
pub use rewriting::production::{Match, Production};
