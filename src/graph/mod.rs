//! A module for representing attributed directed multigraphs.
//!
//! Vertices and edges live in id-keyed arenas. Handles are never reused within a
//! graph and survive cloning, so an element that persists across a rewrite keeps
//! the same handle in every graph of a derivation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod attribute;

pub use self::attribute::{Attributes, Value};

/// Handle of a vertex inside a graph lineage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(u64);

/// Handle of an edge inside a graph lineage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Either kind of graph element, by handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Element {
    Vertex(VertexId),
    Edge(EdgeId),
}

impl From<VertexId> for Element {
    fn from(id: VertexId) -> Self {
        Element::Vertex(id)
    }
}

impl From<EdgeId> for Element {
    fn from(id: EdgeId) -> Self {
        Element::Edge(id)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Vertex(id) => write!(f, "vertex {id}"),
            Element::Edge(id) => write!(f, "edge {id}"),
        }
    }
}

/// Whether an edge may be traversed against its stored orientation when matching.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMode {
    #[default]
    Directed,
    Undirected,
}

/// What happens to the incident edges of a removed vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DanglingPolicy {
    /// Incident edges are removed together with the vertex.
    #[default]
    Cascade,
    /// Removal fails while incident edges exist.
    Reject,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    id: VertexId,
    #[serde(default)]
    attributes: Attributes,
}

impl Vertex {
    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// A directed edge from `vertex1` to `vertex2`. Endpoints never change after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    id: EdgeId,
    vertex1: VertexId,
    vertex2: VertexId,
    #[serde(default)]
    attributes: Attributes,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn vertex1(&self) -> VertexId {
        self.vertex1
    }

    pub fn vertex2(&self) -> VertexId {
        self.vertex2
    }

    pub fn endpoints(&self) -> (VertexId, VertexId) {
        (self.vertex1, self.vertex2)
    }

    pub fn is_loop(&self) -> bool {
        self.vertex1 == self.vertex2
    }

    /// The endpoint opposite to `vertex`, if `vertex` is an endpoint at all.
    pub fn opposite(&self, vertex: VertexId) -> Option<VertexId> {
        if vertex == self.vertex1 {
            Some(self.vertex2)
        } else if vertex == self.vertex2 {
            Some(self.vertex1)
        } else {
            None
        }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Description of an element to insert with [`Graph::add`].
#[derive(Clone, Debug, PartialEq)]
pub enum NewElement {
    Vertex(Attributes),
    Edge {
        vertex1: VertexId,
        vertex2: VertexId,
        attributes: Attributes,
    },
}

/// An attributed directed multigraph whose edges never dangle.
///
/// Iteration over vertices and edges follows handle order, which is stable for a
/// given graph value. Cloning yields a structurally independent graph with the
/// same handles. Two graphs are equal when they have the same vertices and edges.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(into = "GraphSnapshot", try_from = "GraphSnapshot")]
pub struct Graph {
    vertices: BTreeMap<VertexId, Vertex>,
    edges: BTreeMap<EdgeId, Edge>,
    outgoing: BTreeMap<VertexId, BTreeSet<EdgeId>>,
    incoming: BTreeMap<VertexId, BTreeSet<EdgeId>>,
    next_vertex: u64,
    next_edge: u64,
}

impl Graph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex and returns its handle.
    pub fn add_vertex(&mut self, attributes: Attributes) -> VertexId {
        let id = VertexId(self.next_vertex);
        self.next_vertex += 1;
        self.insert_vertex(Vertex { id, attributes });
        id
    }

    /// Adds a directed edge from `vertex1` to `vertex2`.
    ///
    /// Fails with [`Error::InvalidReference`] if either endpoint is not a member.
    pub fn add_edge(
        &mut self,
        vertex1: VertexId,
        vertex2: VertexId,
        attributes: Attributes,
    ) -> Result<EdgeId> {
        for endpoint in [vertex1, vertex2] {
            if !self.vertices.contains_key(&endpoint) {
                return Err(Error::InvalidReference(endpoint));
            }
        }

        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.insert_edge(Edge {
            id,
            vertex1,
            vertex2,
            attributes,
        });
        Ok(id)
    }

    /// Inserts either kind of element.
    pub fn add(&mut self, element: NewElement) -> Result<Element> {
        match element {
            NewElement::Vertex(attributes) => Ok(self.add_vertex(attributes).into()),
            NewElement::Edge {
                vertex1,
                vertex2,
                attributes,
            } => self.add_edge(vertex1, vertex2, attributes).map(Element::Edge),
        }
    }

    /// Removes an element, cascading to the incident edges of a vertex.
    ///
    /// Returns every element that was removed.
    pub fn remove(&mut self, element: Element) -> Result<Vec<Element>> {
        self.remove_with_policy(element, DanglingPolicy::Cascade)
    }

    /// Removes an element, resolving incident edges of a vertex according to `policy`.
    pub fn remove_with_policy(
        &mut self,
        element: Element,
        policy: DanglingPolicy,
    ) -> Result<Vec<Element>> {
        match element {
            Element::Edge(id) => {
                self.remove_edge(id)?;
                Ok(vec![element])
            }
            Element::Vertex(id) => {
                let removed_edges = self.remove_vertex(id, policy)?;
                Ok(removed_edges
                    .into_iter()
                    .map(Element::Edge)
                    .chain(std::iter::once(element))
                    .collect())
            }
        }
    }

    /// Removes an edge and returns it.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge> {
        let edge = self
            .edges
            .remove(&id)
            .ok_or(Error::UnknownElement(Element::Edge(id)))?;
        if let Some(out) = self.outgoing.get_mut(&edge.vertex1) {
            out.remove(&id);
        }
        if let Some(inc) = self.incoming.get_mut(&edge.vertex2) {
            inc.remove(&id);
        }
        Ok(edge)
    }

    /// Removes a vertex and returns the handles of the edges removed with it.
    pub fn remove_vertex(&mut self, id: VertexId, policy: DanglingPolicy) -> Result<Vec<EdgeId>> {
        if !self.vertices.contains_key(&id) {
            return Err(Error::UnknownElement(Element::Vertex(id)));
        }

        let incident = self.incident_edges(id);
        if policy == DanglingPolicy::Reject && !incident.is_empty() {
            return Err(Error::DanglingEdgePolicyViolation {
                vertex: id,
                edges: incident.into_iter().collect(),
            });
        }

        for &edge in &incident {
            self.remove_edge(edge)?;
        }
        self.vertices.remove(&id);
        self.outgoing.remove(&id);
        self.incoming.remove(&id);
        Ok(incident.into_iter().collect())
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn contains(&self, element: Element) -> bool {
        match element {
            Element::Vertex(id) => self.vertices.contains_key(&id),
            Element::Edge(id) => self.edges.contains_key(&id),
        }
    }

    pub fn attributes(&self, element: Element) -> Option<&Attributes> {
        match element {
            Element::Vertex(id) => self.vertices.get(&id).map(|v| &v.attributes),
            Element::Edge(id) => self.edges.get(&id).map(|e| &e.attributes),
        }
    }

    /// Mutable access to the attributes of an element. Structure stays untouched.
    pub fn attributes_mut(&mut self, element: Element) -> Option<&mut Attributes> {
        match element {
            Element::Vertex(id) => self.vertices.get_mut(&id).map(|v| &mut v.attributes),
            Element::Edge(id) => self.edges.get_mut(&id).map(|e| &mut e.attributes),
        }
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.keys().copied()
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.keys().copied()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Edges leaving `vertex`.
    pub fn outgoing(&self, vertex: VertexId) -> impl Iterator<Item = EdgeId> + '_ {
        self.outgoing.get(&vertex).into_iter().flatten().copied()
    }

    /// Edges entering `vertex`.
    pub fn incoming(&self, vertex: VertexId) -> impl Iterator<Item = EdgeId> + '_ {
        self.incoming.get(&vertex).into_iter().flatten().copied()
    }

    /// All edges touching `vertex`, loops included once.
    pub fn incident_edges(&self, vertex: VertexId) -> BTreeSet<EdgeId> {
        self.outgoing(vertex).chain(self.incoming(vertex)).collect()
    }

    pub fn out_degree(&self, vertex: VertexId) -> usize {
        self.outgoing.get(&vertex).map_or(0, BTreeSet::len)
    }

    pub fn in_degree(&self, vertex: VertexId) -> usize {
        self.incoming.get(&vertex).map_or(0, BTreeSet::len)
    }

    /// Number of edge ends at `vertex`; a loop counts twice.
    pub fn degree(&self, vertex: VertexId) -> usize {
        self.out_degree(vertex) + self.in_degree(vertex)
    }

    /// Edges that connect `from` to `to`. In undirected mode edges from `to` to
    /// `from` are included as well.
    pub fn edges_between(&self, from: VertexId, to: VertexId, mode: EdgeMode) -> Vec<EdgeId> {
        let forward = self
            .outgoing(from)
            .filter(|id| self.edges[id].vertex2 == to);

        match mode {
            EdgeMode::Directed => forward.collect(),
            EdgeMode::Undirected => {
                let backward = self
                    .outgoing(to)
                    .filter(|id| self.edges[id].vertex2 == from);
                forward
                    .chain(backward)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            }
        }
    }

    /// Extracts the sub-structure made of the given vertices and edges.
    ///
    /// Handles are kept, so the result can be compared against `self` directly.
    /// Fails with [`Error::InvalidReference`] if an edge endpoint is not among `vertices`.
    pub fn subgraph(
        &self,
        vertices: impl IntoIterator<Item = VertexId>,
        edges: impl IntoIterator<Item = EdgeId>,
    ) -> Result<Graph> {
        let mut subgraph = Graph {
            next_vertex: self.next_vertex,
            next_edge: self.next_edge,
            ..Graph::default()
        };

        for id in vertices {
            let vertex = self
                .vertex(id)
                .ok_or(Error::UnknownElement(Element::Vertex(id)))?;
            subgraph.insert_vertex(vertex.clone());
        }

        for id in edges {
            let edge = self
                .edge(id)
                .ok_or(Error::UnknownElement(Element::Edge(id)))?;
            for endpoint in [edge.vertex1, edge.vertex2] {
                if !subgraph.vertices.contains_key(&endpoint) {
                    return Err(Error::InvalidReference(endpoint));
                }
            }
            subgraph.insert_edge(edge.clone());
        }

        Ok(subgraph)
    }

    /// Returns a string in DOT format representing the graph.
    pub fn dot(&self) -> String {
        let label = |attributes: &Attributes| {
            attribute::describe(attributes)
                .replace('"', "\\\"")
                .replace('\n', "\\n")
        };

        let mut dot = String::from("digraph G {\n");
        for vertex in self.vertices() {
            dot.push_str(&format!(
                "    {} [label=\"{}\\n{}\"];\n",
                vertex.id.0,
                vertex.id,
                label(&vertex.attributes)
            ));
        }
        for edge in self.edges() {
            dot.push_str(&format!(
                "    {} -> {} [label=\"{}\"];\n",
                edge.vertex1.0,
                edge.vertex2.0,
                label(&edge.attributes)
            ));
        }
        dot.push('}');
        dot
    }

    // Counters are maintained by the callers.
    fn insert_vertex(&mut self, vertex: Vertex) {
        self.outgoing.entry(vertex.id).or_default();
        self.incoming.entry(vertex.id).or_default();
        self.vertices.insert(vertex.id, vertex);
    }

    fn insert_edge(&mut self, edge: Edge) {
        self.outgoing.entry(edge.vertex1).or_default().insert(edge.id);
        self.incoming.entry(edge.vertex2).or_default().insert(edge.id);
        self.edges.insert(edge.id, edge);
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices && self.edges == other.edges
    }
}

// Flat serialized form of a graph
#[derive(Serialize, Deserialize)]
struct GraphSnapshot {
    vertices: Vec<Vertex>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    next_vertex: Option<u64>,
    #[serde(default)]
    next_edge: Option<u64>,
}

impl From<Graph> for GraphSnapshot {
    fn from(graph: Graph) -> Self {
        Self {
            vertices: graph.vertices.into_values().collect(),
            edges: graph.edges.into_values().collect(),
            next_vertex: Some(graph.next_vertex),
            next_edge: Some(graph.next_edge),
        }
    }
}

// First free handle after `ids`, never below `recorded`.
fn next_handle(recorded: Option<u64>, ids: impl Iterator<Item = u64>) -> Result<u64> {
    let mut next = recorded.unwrap_or(0);
    for id in ids {
        let after = id
            .checked_add(1)
            .ok_or_else(|| Error::InvalidSnapshot(format!("handle {id} is out of range")))?;
        next = next.max(after);
    }
    if next == u64::MAX {
        return Err(Error::InvalidSnapshot("no handles left".to_string()));
    }
    Ok(next)
}

impl TryFrom<GraphSnapshot> for Graph {
    type Error = Error;

    fn try_from(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = Graph {
            next_vertex: next_handle(
                snapshot.next_vertex,
                snapshot.vertices.iter().map(|v| v.id.0),
            )?,
            next_edge: next_handle(snapshot.next_edge, snapshot.edges.iter().map(|e| e.id.0))?,
            ..Graph::default()
        };
        for vertex in snapshot.vertices {
            if graph.vertices.contains_key(&vertex.id) {
                return Err(Error::InvalidSnapshot(format!("{} appears twice", vertex.id)));
            }
            graph.insert_vertex(vertex);
        }
        for edge in snapshot.edges {
            if graph.edges.contains_key(&edge.id) {
                return Err(Error::InvalidSnapshot(format!("{} appears twice", edge.id)));
            }
            for endpoint in [edge.vertex1, edge.vertex2] {
                if !graph.vertices.contains_key(&endpoint) {
                    return Err(Error::InvalidReference(endpoint));
                }
            }
            graph.insert_edge(edge);
        }
        Ok(graph)
    }
}
