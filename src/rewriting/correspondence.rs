//! The correspondence of a production: which pattern elements persist into the replacement.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::graph::{EdgeId, Graph, VertexId};

/// Partial injective mapping from LHS elements to RHS elements, with inverse lookup.
///
/// Mapped elements are preserved by a rewrite, unmapped LHS elements are deleted
/// and unmapped RHS elements are created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Correspondence {
    vertices: BTreeMap<VertexId, VertexId>,
    vertices_inverse: BTreeMap<VertexId, VertexId>,
    edges: BTreeMap<EdgeId, EdgeId>,
    edges_inverse: BTreeMap<EdgeId, EdgeId>,
}

impl Correspondence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a correspondence from pairs, failing if any side is used twice.
    pub fn from_pairs(
        vertices: impl IntoIterator<Item = (VertexId, VertexId)>,
        edges: impl IntoIterator<Item = (EdgeId, EdgeId)>,
    ) -> Result<Self> {
        let mut correspondence = Self::new();
        for (lhs, rhs) in vertices {
            correspondence.insert_vertex(lhs, rhs)?;
        }
        for (lhs, rhs) in edges {
            correspondence.insert_edge(lhs, rhs)?;
        }
        Ok(correspondence)
    }

    pub fn insert_vertex(&mut self, lhs: VertexId, rhs: VertexId) -> Result<()> {
        if self.vertices.contains_key(&lhs) || self.vertices_inverse.contains_key(&rhs) {
            return Err(Error::IllFormedProduction(format!(
                "vertex correspondence {lhs} -> {rhs} is not injective"
            )));
        }
        self.vertices.insert(lhs, rhs);
        self.vertices_inverse.insert(rhs, lhs);
        Ok(())
    }

    pub fn insert_edge(&mut self, lhs: EdgeId, rhs: EdgeId) -> Result<()> {
        if self.edges.contains_key(&lhs) || self.edges_inverse.contains_key(&rhs) {
            return Err(Error::IllFormedProduction(format!(
                "edge correspondence {lhs} -> {rhs} is not injective"
            )));
        }
        self.edges.insert(lhs, rhs);
        self.edges_inverse.insert(rhs, lhs);
        Ok(())
    }

    pub fn rhs_vertex(&self, lhs: VertexId) -> Option<VertexId> {
        self.vertices.get(&lhs).copied()
    }

    pub fn lhs_vertex(&self, rhs: VertexId) -> Option<VertexId> {
        self.vertices_inverse.get(&rhs).copied()
    }

    pub fn rhs_edge(&self, lhs: EdgeId) -> Option<EdgeId> {
        self.edges.get(&lhs).copied()
    }

    pub fn lhs_edge(&self, rhs: EdgeId) -> Option<EdgeId> {
        self.edges_inverse.get(&rhs).copied()
    }

    pub fn vertex_pairs(&self) -> impl Iterator<Item = (VertexId, VertexId)> + '_ {
        self.vertices.iter().map(|(&lhs, &rhs)| (lhs, rhs))
    }

    pub fn edge_pairs(&self) -> impl Iterator<Item = (EdgeId, EdgeId)> + '_ {
        self.edges.iter().map(|(&lhs, &rhs)| (lhs, rhs))
    }

    /// Checks the correspondence against the two sides of a production.
    ///
    /// Every mapped element must exist on its side, and a preserved edge must keep
    /// its endpoints: both endpoints are preserved and map onto the endpoints of
    /// the RHS edge in the same order.
    pub fn validate(&self, lhs: &Graph, rhs: &Graph) -> Result<()> {
        let ill_formed = |message: String| Err(Error::IllFormedProduction(message));

        for (l, r) in self.vertex_pairs() {
            if lhs.vertex(l).is_none() {
                return ill_formed(format!("{l} is not a pattern vertex"));
            }
            if rhs.vertex(r).is_none() {
                return ill_formed(format!("{r} is not a replacement vertex"));
            }
        }

        for (l, r) in self.edge_pairs() {
            let Some(lhs_edge) = lhs.edge(l) else {
                return ill_formed(format!("{l} is not a pattern edge"));
            };
            let Some(rhs_edge) = rhs.edge(r) else {
                return ill_formed(format!("{r} is not a replacement edge"));
            };

            let source = self.rhs_vertex(lhs_edge.vertex1());
            let target = self.rhs_vertex(lhs_edge.vertex2());
            if source != Some(rhs_edge.vertex1()) || target != Some(rhs_edge.vertex2()) {
                return ill_formed(format!(
                    "preserved edge {l} -> {r} does not keep its endpoints"
                ));
            }
        }

        Ok(())
    }
}
