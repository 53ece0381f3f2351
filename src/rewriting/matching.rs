//! Subgraph matching of production patterns against host graphs.
//!
//! A [`Pattern`] is the left-hand side of a production: a small graph whose
//! element attributes must be present on the image, plus optional attribute
//! [`Constraint`]s per element. A [`Matcher`] finds every [`Embedding`] of a
//! pattern, i.e. every injective, structure- and attribute-preserving map from
//! pattern elements onto host elements. Host graphs may carry extra edges; this
//! is subgraph matching, not isomorphism.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use itertools::Itertools;

use crate::error::{Error, Result};
use crate::graph::{Attributes, EdgeId, EdgeMode, Element, Graph, VertexId};

use super::predicate::Constraint;

pub mod backtracking;
pub mod parallel;

pub use backtracking::BacktrackingMatcher;
pub use parallel::ParallelMatcher;

/// Left-hand side of a production.
#[derive(Clone, Debug, Default)]
pub struct Pattern {
    graph: Graph,
    constraints: BTreeMap<Element, Constraint>,
    edge_mode: EdgeMode,
}

impl Pattern {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            constraints: BTreeMap::new(),
            edge_mode: EdgeMode::default(),
        }
    }

    pub fn with_edge_mode(mut self, edge_mode: EdgeMode) -> Self {
        self.edge_mode = edge_mode;
        self
    }

    /// Attaches a constraint to a pattern element, on top of any existing one.
    pub fn constrain(&mut self, element: Element, constraint: Constraint) -> Result<()> {
        if !self.graph.contains(element) {
            return Err(Error::IllFormedProduction(format!(
                "constraint on {element}, which is not part of the pattern"
            )));
        }
        self.constraints.entry(element).or_default().extend(constraint);
        Ok(())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn edge_mode(&self) -> EdgeMode {
        self.edge_mode
    }

    pub fn constraint(&self, element: Element) -> Option<&Constraint> {
        self.constraints.get(&element)
    }

    /// Whether a host element with `attributes` may be the image of `element`.
    ///
    /// The pattern element's own attributes act as equality requirements.
    pub fn admits(&self, element: Element, attributes: &Attributes) -> bool {
        let Some(required) = self.graph.attributes(element) else {
            return false;
        };

        required
            .iter()
            .all(|(name, value)| attributes.get(name).is_some_and(|v| v.same_as(value)))
            && self
                .constraints
                .get(&element)
                .is_none_or(|constraint| constraint.holds(attributes))
    }
}

/// An injective map from pattern elements to host elements.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Embedding {
    vertices: BTreeMap<VertexId, VertexId>,
    edges: BTreeMap<EdgeId, EdgeId>,
}

impl Embedding {
    pub(crate) fn new(
        vertices: BTreeMap<VertexId, VertexId>,
        edges: BTreeMap<EdgeId, EdgeId>,
    ) -> Self {
        Self { vertices, edges }
    }

    /// Host image of a pattern vertex.
    pub fn vertex(&self, pattern_vertex: VertexId) -> Option<VertexId> {
        self.vertices.get(&pattern_vertex).copied()
    }

    /// Host image of a pattern edge.
    pub fn edge(&self, pattern_edge: EdgeId) -> Option<EdgeId> {
        self.edges.get(&pattern_edge).copied()
    }

    /// Host image of either kind of pattern element.
    pub fn image(&self, pattern_element: Element) -> Option<Element> {
        match pattern_element {
            Element::Vertex(id) => self.vertex(id).map(Element::Vertex),
            Element::Edge(id) => self.edge(id).map(Element::Edge),
        }
    }

    pub fn vertex_pairs(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.vertices.iter().map(|(&p, &h)| (p, h))
    }

    pub fn edge_pairs(&self) -> impl Iterator<Item = (EdgeId, EdgeId)> + '_ {
        self.edges.iter().map(|(&p, &h)| (p, h))
    }

    pub fn host_vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.values().copied()
    }

    pub fn host_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.values().copied()
    }

    /// Checks that this embedding is a valid occurrence of `pattern` in `host`.
    ///
    /// Fails with [`Error::InvalidMatch`] describing the first violation found.
    pub fn verify(&self, pattern: &Pattern, host: &Graph) -> Result<()> {
        let invalid = |message: String| Err(Error::InvalidMatch(message));
        let lhs = pattern.graph();

        if !self.vertices.keys().copied().eq(lhs.vertex_ids())
            || !self.edges.keys().copied().eq(lhs.edge_ids())
        {
            return invalid("embedding does not cover exactly the pattern elements".to_string());
        }

        let distinct_vertices = self.host_vertices().collect::<BTreeSet<_>>().len();
        let distinct_edges = self.host_edges().collect::<BTreeSet<_>>().len();
        if distinct_vertices != self.vertices.len() || distinct_edges != self.edges.len() {
            return invalid("embedding is not injective".to_string());
        }

        for (p, h) in self.vertex_pairs() {
            let Some(vertex) = host.vertex(h) else {
                return invalid(format!("{h} is not a host vertex"));
            };
            if !pattern.admits(Element::Vertex(p), vertex.attributes()) {
                return invalid(format!("{h} does not satisfy the constraints of {p}"));
            }
        }

        for (p, h) in self.edge_pairs() {
            let Some(edge) = host.edge(h) else {
                return invalid(format!("{h} is not a host edge"));
            };
            if !pattern.admits(Element::Edge(p), edge.attributes()) {
                return invalid(format!("{h} does not satisfy the constraints of {p}"));
            }

            let Some(pattern_edge) = lhs.edge(p) else {
                return invalid(format!("{p} is not a pattern edge"));
            };
            let (Some(source), Some(target)) = (
                self.vertex(pattern_edge.vertex1()),
                self.vertex(pattern_edge.vertex2()),
            ) else {
                return invalid(format!("endpoints of {p} are not mapped"));
            };
            if !host
                .edges_between(source, target, pattern.edge_mode())
                .contains(&h)
            {
                return invalid(format!("{h} does not connect the images of {p}"));
            }
        }

        Ok(())
    }
}

/// Result of a pattern search.
#[derive(Clone, Debug, Default)]
pub struct SearchOutcome {
    pub embeddings: Vec<Embedding>,
    /// `false` when the search stopped at its deadline and may have missed embeddings.
    pub complete: bool,
}

impl SearchOutcome {
    pub fn merge(outcomes: impl IntoIterator<Item = SearchOutcome>) -> Self {
        outcomes.into_iter().fold(
            SearchOutcome {
                embeddings: Vec::new(),
                complete: true,
            },
            |mut merged, outcome| {
                merged.embeddings.extend(outcome.embeddings);
                merged.complete &= outcome.complete;
                merged
            },
        )
    }
}

/// Strategy for finding every embedding of a pattern in a host graph.
pub trait Matcher: Send + Sync {
    /// Searches for embeddings, giving up once `deadline` has passed.
    fn find(&self, pattern: &Pattern, host: &Graph, deadline: Option<Instant>) -> SearchOutcome;

    /// Every embedding of `pattern` in `host`.
    fn find_all(&self, pattern: &Pattern, host: &Graph) -> Vec<Embedding> {
        self.find(pattern, host, None).embeddings
    }
}

/// Renders an embedding as `pattern -> host` pairs, for logging.
pub fn describe(embedding: &Embedding) -> String {
    embedding
        .vertex_pairs()
        .map(|(p, h)| format!("{p}->{h}"))
        .chain(embedding.edge_pairs().map(|(p, h)| format!("{p}->{h}")))
        .join(", ")
}
