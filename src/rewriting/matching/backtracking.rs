use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;

use itertools::Itertools;
use tracing::trace;

use crate::graph::{EdgeId, EdgeMode, Element, Graph, VertexId};

use super::{Embedding, Matcher, Pattern, SearchOutcome};

/// Sequential backtracking search over pattern vertices.
///
/// Pattern vertices are visited connected-first, highest degree first, so that
/// most vertices after the first are reached over an already matched neighbour
/// and only that neighbour's host neighbourhood has to be tried.
pub struct BacktrackingMatcher;

impl Matcher for BacktrackingMatcher {
    fn find(&self, pattern: &Pattern, host: &Graph, deadline: Option<Instant>) -> SearchOutcome {
        let plan = SearchPlan::new(pattern, host);
        let outcome = SearchState::new(&plan, pattern, host, deadline).run();
        trace!(
            pattern_vertices = pattern.graph().vertex_count(),
            host_vertices = host.vertex_count(),
            embeddings = outcome.embeddings.len(),
            complete = outcome.complete,
            "backtracking search finished"
        );
        outcome
    }
}

/// Matched pattern neighbour used to narrow the candidates of a later vertex.
#[derive(Clone, Copy, Debug)]
pub(super) struct Anchor {
    vertex: VertexId,
    /// The pattern edge between the two leaves the anchor.
    outgoing: bool,
}

#[derive(Debug)]
pub(super) struct PlanStep {
    vertex: VertexId,
    anchor: Option<Anchor>,
    /// Pattern edges whose endpoints are all matched once this step's vertex is.
    covered: Vec<EdgeId>,
    /// Host vertices passing the attribute and degree filters, in handle order.
    pub(super) candidates: Vec<VertexId>,
    admissible: HashSet<VertexId>,
}

/// Vertex order and per-vertex candidate sets for one pattern/host pair.
#[derive(Debug)]
pub(super) struct SearchPlan {
    pub(super) steps: Vec<PlanStep>,
}

impl SearchPlan {
    pub(super) fn new(pattern: &Pattern, host: &Graph) -> Self {
        let lhs = pattern.graph();
        let mut remaining: BTreeSet<VertexId> = lhs.vertex_ids().collect();
        let mut placed: HashSet<VertexId> = HashSet::new();
        let mut steps = Vec::with_capacity(remaining.len());

        while let Some(vertex) = next_vertex(lhs, &remaining, &placed) {
            remaining.remove(&vertex);
            placed.insert(vertex);

            let covered = lhs
                .incident_edges(vertex)
                .into_iter()
                .filter(|&edge| {
                    lhs.edge(edge)
                        .and_then(|e| e.opposite(vertex))
                        .is_some_and(|other| placed.contains(&other))
                })
                .collect_vec();

            let anchor = covered
                .iter()
                .filter_map(|&edge| lhs.edge(edge))
                .find(|edge| !edge.is_loop())
                .and_then(|edge| {
                    let other = edge.opposite(vertex)?;
                    Some(Anchor {
                        vertex: other,
                        outgoing: edge.vertex1() == other,
                    })
                });

            let candidates = host
                .vertices()
                .filter(|h| pattern.admits(Element::Vertex(vertex), h.attributes()))
                .map(|h| h.id())
                .filter(|&h| has_room(pattern, host, vertex, h))
                .collect_vec();
            let admissible = candidates.iter().copied().collect();

            steps.push(PlanStep {
                vertex,
                anchor,
                covered,
                candidates,
                admissible,
            });
        }

        Self { steps }
    }
}

// Prefers vertices linked to the placed ones, then high degree, then low handle.
fn next_vertex(
    lhs: &Graph,
    remaining: &BTreeSet<VertexId>,
    placed: &HashSet<VertexId>,
) -> Option<VertexId> {
    remaining.iter().copied().max_by_key(|&v| {
        let links = lhs
            .incident_edges(v)
            .into_iter()
            .filter_map(|edge| lhs.edge(edge).and_then(|e| e.opposite(v)))
            .filter(|other| placed.contains(other))
            .count();
        (links, lhs.degree(v), Reverse(v))
    })
}

// A host vertex can only be an image if it has at least as many edge ends.
fn has_room(pattern: &Pattern, host: &Graph, vertex: VertexId, image: VertexId) -> bool {
    let lhs = pattern.graph();
    match pattern.edge_mode() {
        EdgeMode::Directed => {
            host.out_degree(image) >= lhs.out_degree(vertex)
                && host.in_degree(image) >= lhs.in_degree(vertex)
        }
        EdgeMode::Undirected => host.degree(image) >= lhs.degree(vertex),
    }
}

/// Mutable state of one depth-first search.
pub(super) struct SearchState<'a> {
    plan: &'a SearchPlan,
    pattern: &'a Pattern,
    host: &'a Graph,
    deadline: Option<Instant>,
    vertices: BTreeMap<VertexId, VertexId>,
    used_vertices: HashSet<VertexId>,
    edges: BTreeMap<EdgeId, EdgeId>,
    used_edges: HashSet<EdgeId>,
    expired: bool,
    found: Vec<Embedding>,
}

impl<'a> SearchState<'a> {
    pub(super) fn new(
        plan: &'a SearchPlan,
        pattern: &'a Pattern,
        host: &'a Graph,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            plan,
            pattern,
            host,
            deadline,
            vertices: BTreeMap::new(),
            used_vertices: HashSet::new(),
            edges: BTreeMap::new(),
            used_edges: HashSet::new(),
            expired: false,
            found: Vec::new(),
        }
    }

    /// Searches the whole space.
    pub(super) fn run(mut self) -> SearchOutcome {
        self.extend(0);
        self.finish()
    }

    /// Searches only the branch where the first planned vertex maps to `root`.
    pub(super) fn run_from(mut self, root: VertexId) -> SearchOutcome {
        if !self.plan.steps.is_empty() && !self.timed_out() {
            self.try_vertex(0, root);
        }
        self.finish()
    }

    fn finish(self) -> SearchOutcome {
        SearchOutcome {
            embeddings: self.found,
            complete: !self.expired,
        }
    }

    fn timed_out(&mut self) -> bool {
        if !self.expired
            && let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.expired = true;
        }
        self.expired
    }

    fn extend(&mut self, depth: usize) {
        if self.timed_out() {
            return;
        }

        let plan = self.plan;
        let Some(step) = plan.steps.get(depth) else {
            self.found.push(Embedding::new(
                self.vertices.clone(),
                self.edges.clone(),
            ));
            return;
        };

        let candidates = match step.anchor {
            Some(anchor) => self.anchored_candidates(step, anchor),
            None => step.candidates.clone(),
        };

        for candidate in candidates {
            self.try_vertex(depth, candidate);
            if self.expired {
                return;
            }
        }
    }

    fn try_vertex(&mut self, depth: usize, candidate: VertexId) {
        let plan = self.plan;
        let step = &plan.steps[depth];
        if self.used_vertices.contains(&candidate) {
            return;
        }

        self.vertices.insert(step.vertex, candidate);
        self.used_vertices.insert(candidate);
        self.extend_edges(depth, 0);
        self.vertices.remove(&step.vertex);
        self.used_vertices.remove(&candidate);
    }

    // Assigns host edges to the pattern edges covered at `depth`, one at a time.
    fn extend_edges(&mut self, depth: usize, index: usize) {
        let plan = self.plan;
        let pattern = self.pattern;
        let host = self.host;

        let Some(&pattern_edge) = plan.steps[depth].covered.get(index) else {
            self.extend(depth + 1);
            return;
        };
        let Some(edge) = pattern.graph().edge(pattern_edge) else {
            return;
        };
        let (Some(&source), Some(&target)) = (
            self.vertices.get(&edge.vertex1()),
            self.vertices.get(&edge.vertex2()),
        ) else {
            return;
        };

        for host_edge in host.edges_between(source, target, pattern.edge_mode()) {
            if self.used_edges.contains(&host_edge) {
                continue;
            }
            let admitted = host
                .edge(host_edge)
                .is_some_and(|e| pattern.admits(Element::Edge(pattern_edge), e.attributes()));
            if !admitted {
                continue;
            }

            self.edges.insert(pattern_edge, host_edge);
            self.used_edges.insert(host_edge);
            self.extend_edges(depth, index + 1);
            self.edges.remove(&pattern_edge);
            self.used_edges.remove(&host_edge);

            if self.expired {
                return;
            }
        }
    }

    fn anchored_candidates(&self, step: &PlanStep, anchor: Anchor) -> Vec<VertexId> {
        let Some(&image) = self.vertices.get(&anchor.vertex) else {
            return step.candidates.clone();
        };
        let host = self.host;
        let undirected = self.pattern.edge_mode() == EdgeMode::Undirected;

        let mut reachable = BTreeSet::new();
        if anchor.outgoing || undirected {
            reachable.extend(
                host.outgoing(image)
                    .filter_map(|e| host.edge(e))
                    .map(|e| e.vertex2()),
            );
        }
        if !anchor.outgoing || undirected {
            reachable.extend(
                host.incoming(image)
                    .filter_map(|e| host.edge(e))
                    .map(|e| e.vertex1()),
            );
        }

        reachable
            .into_iter()
            .filter(|candidate| step.admissible.contains(candidate))
            .collect()
    }
}
