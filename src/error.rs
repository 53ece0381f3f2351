use thiserror::Error;

use crate::graph::{EdgeId, Element, VertexId};

/// Errors raised by graph mutation, production construction and rewriting.
///
/// Every failing operation leaves the graph it was called on untouched.
#[derive(Error, Debug)]
pub enum Error {
    /// An edge endpoint is not a member of the graph
    #[error("edge endpoint {0} is not a member of the graph")]
    InvalidReference(VertexId),

    /// The element is not a member of the graph
    #[error("{0} is not a member of the graph")]
    UnknownElement(Element),

    /// Removing the vertex would leave edges without an endpoint
    #[error("removing {vertex} would orphan {} incident edge(s)", .edges.len())]
    DanglingEdgePolicyViolation { vertex: VertexId, edges: Vec<EdgeId> },

    /// The match does not belong to the production or does not fit the host graph
    #[error("invalid match: {0}")]
    InvalidMatch(String),

    /// The production's correspondence, constraints or rules reference missing elements
    #[error("ill-formed production: {0}")]
    IllFormedProduction(String),

    /// A name was declared twice while building a graph from names
    #[error("duplicate element name: {0}")]
    DuplicateName(String),

    /// A serialized graph has repeated or exhausted handles
    #[error("invalid graph snapshot: {0}")]
    InvalidSnapshot(String),

    /// A name was referenced but never declared
    #[error("unknown element name: {0}")]
    UnknownName(String),

    /// A derivation step failed while rewriting the current host graph
    #[error("derivation step {step} failed in production `{production}`")]
    DerivationFailed {
        step: usize,
        production: String,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
