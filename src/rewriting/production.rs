//! Productions: graph rewrite rules with a pattern, a replacement and a correspondence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{Attributes, DanglingPolicy, EdgeId, EdgeMode, Element, Graph, VertexId};

use super::assignment::{AttributeRule, RuleContext};
use super::correspondence::Correspondence;
use super::matching::{self, BacktrackingMatcher, Embedding, Matcher, Pattern};
use super::predicate::{AttributePredicate, Constraint};

static NEXT_PRODUCTION: AtomicU64 = AtomicU64::new(0);

/// Identity of a production, carried by every match it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductionId(u64);

impl ProductionId {
    fn fresh() -> Self {
        Self(NEXT_PRODUCTION.fetch_add(1, Ordering::Relaxed))
    }
}

/// An occurrence of a production's pattern in a host graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    production: ProductionId,
    embedding: Embedding,
}

impl Match {
    pub fn production(&self) -> ProductionId {
        self.production
    }

    pub fn embedding(&self) -> &Embedding {
        &self.embedding
    }

    pub fn vertex(&self, pattern_vertex: VertexId) -> Option<VertexId> {
        self.embedding.vertex(pattern_vertex)
    }

    pub fn edge(&self, pattern_edge: EdgeId) -> Option<EdgeId> {
        self.embedding.edge(pattern_edge)
    }

    /// The host sub-structure covered by this match, with host handles.
    pub fn subgraph(&self, host: &Graph) -> Result<Graph> {
        host.subgraph(self.embedding.host_vertices(), self.embedding.host_edges())
    }
}

/// A graph rewrite rule.
///
/// Pattern elements mapped by the correspondence are preserved, unmapped pattern
/// elements are deleted and unmapped replacement elements are created.
#[derive(Clone, Debug)]
pub struct Production {
    id: ProductionId,
    name: String,
    lhs: Pattern,
    rhs: Graph,
    correspondence: Correspondence,
    rules: BTreeMap<Element, Vec<(String, AttributeRule)>>,
    dangling: DanglingPolicy,
}

impl Production {
    /// Creates a production, validating the correspondence against both sides.
    pub fn new(
        name: impl Into<String>,
        lhs: Graph,
        rhs: Graph,
        correspondence: Correspondence,
    ) -> Result<Self> {
        correspondence.validate(&lhs, &rhs)?;
        Ok(Self {
            id: ProductionId::fresh(),
            name: name.into(),
            lhs: Pattern::new(lhs),
            rhs,
            correspondence,
            rules: BTreeMap::new(),
            dangling: DanglingPolicy::default(),
        })
    }

    pub fn builder(name: impl Into<String>, lhs: Graph, rhs: Graph) -> ProductionBuilder {
        ProductionBuilder {
            name: name.into(),
            lhs,
            rhs,
            vertex_pairs: Vec::new(),
            edge_pairs: Vec::new(),
            constraints: Vec::new(),
            rules: Vec::new(),
            edge_mode: EdgeMode::default(),
            dangling: DanglingPolicy::default(),
        }
    }

    pub fn id(&self) -> ProductionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lhs(&self) -> &Pattern {
        &self.lhs
    }

    pub fn rhs(&self) -> &Graph {
        &self.rhs
    }

    pub fn correspondence(&self) -> &Correspondence {
        &self.correspondence
    }

    pub fn dangling_policy(&self) -> DanglingPolicy {
        self.dangling
    }

    /// Every match of the pattern in `host`; empty if there is none.
    pub fn find_matches(&self, host: &Graph) -> Vec<Match> {
        self.find_matches_with(host, &BacktrackingMatcher)
    }

    pub fn find_matches_with(&self, host: &Graph, matcher: &dyn Matcher) -> Vec<Match> {
        self.wrap(matcher.find_all(&self.lhs, host))
    }

    /// Like [`find_matches_with`](Self::find_matches_with), but gives up after `limit`.
    ///
    /// Returns `None` if the search did not finish in time.
    pub fn find_matches_within(
        &self,
        host: &Graph,
        matcher: &dyn Matcher,
        limit: Duration,
    ) -> Option<Vec<Match>> {
        let outcome = matcher.find(&self.lhs, host, Some(Instant::now() + limit));
        outcome.complete.then(|| self.wrap(outcome.embeddings))
    }

    fn wrap(&self, embeddings: Vec<Embedding>) -> Vec<Match> {
        embeddings
            .into_iter()
            .map(|embedding| Match {
                production: self.id,
                embedding,
            })
            .collect()
    }

    /// Checks that `matched` was found by this production and still fits `host`.
    pub fn verify(&self, host: &Graph, matched: &Match) -> Result<()> {
        if matched.production != self.id {
            return Err(Error::InvalidMatch(format!(
                "match was not produced by production `{}`",
                self.name
            )));
        }
        matched.embedding.verify(&self.lhs, host)
    }

    /// Rewrites `host` at `matched` and returns the resulting graph.
    ///
    /// The host graph is left untouched. Fails with [`Error::InvalidMatch`] if the
    /// match comes from another production or does not fit `host`, and with
    /// [`Error::DanglingEdgePolicyViolation`] if a deleted vertex has unmatched
    /// edges under [`DanglingPolicy::Reject`].
    pub fn apply(&self, host: &Graph, matched: &Match) -> Result<Graph> {
        self.verify(host, matched)?;
        let embedding = &matched.embedding;

        let lhs = self.lhs.graph();
        let context = RuleContext::new(host, embedding);

        let deleted_edges: BTreeSet<EdgeId> = lhs
            .edge_ids()
            .filter(|&e| self.correspondence.rhs_edge(e).is_none())
            .filter_map(|e| embedding.edge(e))
            .collect();
        let deleted_vertices: Vec<VertexId> = lhs
            .vertex_ids()
            .filter(|&v| self.correspondence.rhs_vertex(v).is_none())
            .filter_map(|v| embedding.vertex(v))
            .collect();

        if self.dangling == DanglingPolicy::Reject {
            for &vertex in &deleted_vertices {
                let dangling: Vec<EdgeId> = host
                    .incident_edges(vertex)
                    .difference(&deleted_edges)
                    .copied()
                    .collect();
                if !dangling.is_empty() {
                    return Err(Error::DanglingEdgePolicyViolation {
                        vertex,
                        edges: dangling,
                    });
                }
            }
        }

        let mut result = host.clone();

        for &edge in &deleted_edges {
            result.remove_edge(edge)?;
        }
        for &vertex in &deleted_vertices {
            result.remove_vertex(vertex, DanglingPolicy::Cascade)?;
        }

        for (l, r) in self.correspondence.vertex_pairs() {
            let image = embedding
                .vertex(l)
                .ok_or_else(|| Error::InvalidMatch(format!("{l} is not mapped")))?;
            self.rewrite_attributes(
                &mut result,
                Element::Vertex(image),
                Element::Vertex(r),
                &context,
            )?;
        }
        for (l, r) in self.correspondence.edge_pairs() {
            let image = embedding
                .edge(l)
                .ok_or_else(|| Error::InvalidMatch(format!("{l} is not mapped")))?;
            self.rewrite_attributes(&mut result, Element::Edge(image), Element::Edge(r), &context)?;
        }

        let mut created: BTreeMap<VertexId, VertexId> = BTreeMap::new();
        for vertex in self.rhs.vertices() {
            if self.correspondence.lhs_vertex(vertex.id()).is_some() {
                continue;
            }
            let attributes =
                self.assigned_attributes(Element::Vertex(vertex.id()), Attributes::new(), &context);
            created.insert(vertex.id(), result.add_vertex(attributes));
        }

        let resolve = |rhs_vertex: VertexId| -> Result<VertexId> {
            created
                .get(&rhs_vertex)
                .copied()
                .or_else(|| {
                    self.correspondence
                        .lhs_vertex(rhs_vertex)
                        .and_then(|l| embedding.vertex(l))
                })
                .ok_or(Error::InvalidReference(rhs_vertex))
        };

        let mut new_edges = 0;
        for edge in self.rhs.edges() {
            if self.correspondence.lhs_edge(edge.id()).is_some() {
                continue;
            }
            let attributes =
                self.assigned_attributes(Element::Edge(edge.id()), Attributes::new(), &context);
            result.add_edge(resolve(edge.vertex1())?, resolve(edge.vertex2())?, attributes)?;
            new_edges += 1;
        }

        debug!(
            production = %self.name,
            matched = %matching::describe(embedding),
            deleted_vertices = deleted_vertices.len(),
            deleted_edges = deleted_edges.len(),
            created_vertices = created.len(),
            created_edges = new_edges,
            "applied production"
        );

        Ok(result)
    }

    fn rewrite_attributes(
        &self,
        result: &mut Graph,
        image: Element,
        rhs_element: Element,
        context: &RuleContext<'_>,
    ) -> Result<()> {
        let current = result
            .attributes(image)
            .cloned()
            .ok_or(Error::UnknownElement(image))?;
        let updated = self.assigned_attributes(rhs_element, current, context);
        if let Some(attributes) = result.attributes_mut(image) {
            *attributes = updated;
        }
        Ok(())
    }

    // Replacement literals first, then the element's rules in declaration order.
    fn assigned_attributes(
        &self,
        rhs_element: Element,
        mut attributes: Attributes,
        context: &RuleContext<'_>,
    ) -> Attributes {
        if let Some(literals) = self.rhs.attributes(rhs_element) {
            attributes.extend(literals.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        for (name, rule) in self.rules.get(&rhs_element).into_iter().flatten() {
            rule.apply(name, &mut attributes, context);
        }
        attributes
    }
}

/// Collects correspondence pairs, constraints and attribute rules for a production.
pub struct ProductionBuilder {
    name: String,
    lhs: Graph,
    rhs: Graph,
    vertex_pairs: Vec<(VertexId, VertexId)>,
    edge_pairs: Vec<(EdgeId, EdgeId)>,
    constraints: Vec<(Element, Constraint)>,
    rules: Vec<(Element, String, AttributeRule)>,
    edge_mode: EdgeMode,
    dangling: DanglingPolicy,
}

impl ProductionBuilder {
    /// Marks a pattern vertex as preserved, becoming `rhs` in the replacement.
    pub fn preserve_vertex(mut self, lhs: VertexId, rhs: VertexId) -> Self {
        self.vertex_pairs.push((lhs, rhs));
        self
    }

    pub fn preserve_edge(mut self, lhs: EdgeId, rhs: EdgeId) -> Self {
        self.edge_pairs.push((lhs, rhs));
        self
    }

    /// Adds an attribute predicate to a pattern element.
    pub fn constraint(
        mut self,
        element: impl Into<Element>,
        name: impl Into<String>,
        predicate: AttributePredicate,
    ) -> Self {
        self.constraints
            .push((element.into(), Constraint::new().with(name, predicate)));
        self
    }

    /// Adds an assignment rule to a replacement element.
    pub fn rule(
        mut self,
        element: impl Into<Element>,
        name: impl Into<String>,
        rule: AttributeRule,
    ) -> Self {
        self.rules.push((element.into(), name.into(), rule));
        self
    }

    pub fn edge_mode(mut self, edge_mode: EdgeMode) -> Self {
        self.edge_mode = edge_mode;
        self
    }

    pub fn dangling_policy(mut self, dangling: DanglingPolicy) -> Self {
        self.dangling = dangling;
        self
    }

    /// Validates everything collected and builds the production.
    ///
    /// Fails with [`Error::IllFormedProduction`] on any reference to an element
    /// missing from its side of the production.
    pub fn build(self) -> Result<Production> {
        let correspondence = Correspondence::from_pairs(self.vertex_pairs, self.edge_pairs)?;
        let mut production = Production::new(self.name, self.lhs, self.rhs, correspondence)?;
        production.lhs = production.lhs.with_edge_mode(self.edge_mode);
        production.dangling = self.dangling;

        for (element, constraint) in self.constraints {
            production.lhs.constrain(element, constraint)?;
        }

        for (element, name, rule) in self.rules {
            if !production.rhs.contains(element) {
                return Err(Error::IllFormedProduction(format!(
                    "rule for `{name}` on {element}, which is not part of the replacement"
                )));
            }
            if let Some(source) = rule.source()
                && !production.lhs.graph().contains(source)
            {
                return Err(Error::IllFormedProduction(format!(
                    "rule for `{name}` reads {source}, which is not part of the pattern"
                )));
            }
            production.rules.entry(element).or_default().push((name, rule));
        }

        Ok(production)
    }
}

#[cfg(test)]
mod tests {
    use super::Production;
    use crate::attrs;
    use crate::error::Error;
    use crate::graph::{DanglingPolicy, EdgeMode, Graph, Value};
    use crate::rewriting::assignment::AttributeRule;
    use crate::rewriting::correspondence::Correspondence;
    use crate::rewriting::predicate::AttributePredicate;

    fn recolor() -> Production {
        let mut lhs = Graph::new();
        let red = lhs.add_vertex(attrs! { "color" => "red" });
        let mut rhs = Graph::new();
        let blue = rhs.add_vertex(attrs! { "color" => "blue" });
        Production::builder("recolor", lhs, rhs)
            .preserve_vertex(red, blue)
            .build()
            .unwrap()
    }

    fn assert_no_dangling_edges(graph: &Graph) {
        for edge in graph.edges() {
            assert!(graph.vertex(edge.vertex1()).is_some());
            assert!(graph.vertex(edge.vertex2()).is_some());
        }
    }

    #[test]
    fn recolor_single_vertex() {
        let production = recolor();
        let mut host = Graph::new();
        let v = host.add_vertex(attrs! { "color" => "red", "size" => 1 });

        let matches = production.find_matches(&host);
        assert_eq!(matches.len(), 1);
        let red = production.lhs().graph().vertex_ids().next().unwrap();
        assert_eq!(matches[0].vertex(red), Some(v));

        let result = production.apply(&host, &matches[0]).unwrap();
        assert_eq!(result.vertex_count(), 1);
        let vertex = result.vertex(v).unwrap();
        assert_eq!(vertex.attribute("color"), Some(&Value::from("blue")));
        assert_eq!(vertex.attribute("size"), Some(&Value::from(1)));

        assert!(production.find_matches(&result).is_empty());
    }

    #[test]
    fn apply_leaves_host_untouched() {
        let production = recolor();
        let mut host = Graph::new();
        let a = host.add_vertex(attrs! { "color" => "red" });
        let b = host.add_vertex(attrs! {});
        host.add_edge(a, b, attrs! {}).unwrap();
        let before = host.clone();

        let matches = production.find_matches(&host);
        let snapshot = matches[0].clone();
        production.apply(&host, &matches[0]).unwrap();

        assert_eq!(host, before);
        assert_eq!(matches[0], snapshot);
    }

    #[test]
    fn match_from_other_host_is_invalid() {
        let production = recolor();
        let mut red_host = Graph::new();
        red_host.add_vertex(attrs! { "color" => "red" });
        let mut blue_host = Graph::new();
        blue_host.add_vertex(attrs! { "color" => "blue" });

        assert!(production.find_matches(&blue_host).is_empty());
        let foreign = production.find_matches(&red_host).remove(0);
        assert!(matches!(
            production.apply(&blue_host, &foreign),
            Err(Error::InvalidMatch(_))
        ));
    }

    #[test]
    fn match_from_other_production_is_invalid() {
        let first = recolor();
        let second = recolor();
        let mut host = Graph::new();
        host.add_vertex(attrs! { "color" => "red" });

        let matched = first.find_matches(&host).remove(0);
        assert!(matches!(
            second.apply(&host, &matched),
            Err(Error::InvalidMatch(_))
        ));
    }

    #[test]
    fn match_covers_host_substructure() {
        let mut lhs = Graph::new();
        let u = lhs.add_vertex(attrs! {});
        let v = lhs.add_vertex(attrs! {});
        lhs.add_edge(u, v, attrs! {}).unwrap();
        let production = Production::new("edge", lhs.clone(), lhs, Correspondence::new()).unwrap();

        let mut host = Graph::new();
        let a = host.add_vertex(attrs! { "name" => "a" });
        let b = host.add_vertex(attrs! { "name" => "b" });
        let c = host.add_vertex(attrs! {});
        host.add_edge(a, b, attrs! {}).unwrap();
        host.add_edge(b, c, attrs! {}).unwrap();

        let matched = production
            .find_matches(&host)
            .into_iter()
            .find(|m| m.vertex(u) == Some(a))
            .unwrap();
        let covered = matched.subgraph(&host).unwrap();
        assert_eq!(covered.vertex_count(), 2);
        assert_eq!(covered.edge_count(), 1);
        assert_eq!(covered.vertex(b), host.vertex(b));
    }

    #[test]
    fn split_edge_creates_vertex_and_edges() {
        // u -> v  becomes  u -> m -> v
        let mut lhs = Graph::new();
        let u = lhs.add_vertex(attrs! {});
        let v = lhs.add_vertex(attrs! {});
        lhs.add_edge(u, v, attrs! {}).unwrap();

        let mut rhs = Graph::new();
        let u2 = rhs.add_vertex(attrs! {});
        let v2 = rhs.add_vertex(attrs! {});
        let m = rhs.add_vertex(attrs! { "kind" => "middle" });
        rhs.add_edge(u2, m, attrs! {}).unwrap();
        rhs.add_edge(m, v2, attrs! {}).unwrap();

        let production = Production::builder("split", lhs, rhs)
            .preserve_vertex(u, u2)
            .preserve_vertex(v, v2)
            .build()
            .unwrap();

        let mut host = Graph::new();
        let a = host.add_vertex(attrs! {});
        let b = host.add_vertex(attrs! {});
        let ab = host.add_edge(a, b, attrs! {}).unwrap();

        let matches = production.find_matches(&host);
        assert_eq!(matches.len(), 1);
        let result = production.apply(&host, &matches[0]).unwrap();

        assert_eq!(result.vertex_count(), 3);
        assert_eq!(result.edge_count(), 2);
        assert!(result.edge(ab).is_none());
        let middle = result
            .vertices()
            .find(|x| x.attribute("kind").is_some())
            .unwrap()
            .id();
        assert_eq!(result.edges_between(a, middle, EdgeMode::Directed).len(), 1);
        assert_eq!(result.edges_between(middle, b, EdgeMode::Directed).len(), 1);
        assert_no_dangling_edges(&result);
    }

    fn delete_marked() -> Graph {
        let mut lhs = Graph::new();
        lhs.add_vertex(attrs! { "doomed" => true });
        lhs
    }

    fn host_with_doomed_hub() -> Graph {
        let mut host = Graph::new();
        let hub = host.add_vertex(attrs! { "doomed" => true });
        let a = host.add_vertex(attrs! {});
        let b = host.add_vertex(attrs! {});
        host.add_edge(hub, a, attrs! {}).unwrap();
        host.add_edge(b, hub, attrs! {}).unwrap();
        host
    }

    #[test]
    fn deletion_cascades_to_unmatched_edges() {
        let lhs = delete_marked();
        let production = Production::new("delete", lhs, Graph::new(), Correspondence::new()).unwrap();
        let host = host_with_doomed_hub();

        let matches = production.find_matches(&host);
        let result = production.apply(&host, &matches[0]).unwrap();
        assert_eq!(result.vertex_count(), 2);
        assert_eq!(result.edge_count(), 0);
        assert_no_dangling_edges(&result);
    }

    #[test]
    fn deletion_under_reject_policy_fails() {
        let lhs = delete_marked();
        let production = Production::builder("delete", lhs, Graph::new())
            .dangling_policy(DanglingPolicy::Reject)
            .build()
            .unwrap();
        let host = host_with_doomed_hub();
        let before = host.clone();

        let matches = production.find_matches(&host);
        match production.apply(&host, &matches[0]) {
            Err(Error::DanglingEdgePolicyViolation { edges, .. }) => assert_eq!(edges.len(), 2),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(host, before);

        let mut isolated = Graph::new();
        isolated.add_vertex(attrs! { "doomed" => true });
        let matches = production.find_matches(&isolated);
        assert!(production.apply(&isolated, &matches[0]).unwrap().is_empty());
    }

    #[test]
    fn reject_policy_allows_deleting_matched_edges() {
        let mut lhs = Graph::new();
        let u = lhs.add_vertex(attrs! {});
        let v = lhs.add_vertex(attrs! { "leaf" => true });
        lhs.add_edge(u, v, attrs! {}).unwrap();
        let mut rhs = Graph::new();
        let u2 = rhs.add_vertex(attrs! {});

        let production = Production::builder("prune", lhs, rhs)
            .preserve_vertex(u, u2)
            .dangling_policy(DanglingPolicy::Reject)
            .build()
            .unwrap();

        let mut host = Graph::new();
        let a = host.add_vertex(attrs! {});
        let leaf = host.add_vertex(attrs! { "leaf" => true });
        host.add_edge(a, leaf, attrs! {}).unwrap();

        let matches = production.find_matches(&host);
        let result = production.apply(&host, &matches[0]).unwrap();
        assert_eq!(result.vertex_count(), 1);
        assert!(result.vertex(a).is_some());
    }

    #[test]
    fn attribute_rules_update_preserved_and_created_elements() {
        let mut lhs = Graph::new();
        let room = lhs.add_vertex(attrs! { "kind" => "room" });
        let mut rhs = Graph::new();
        let room2 = rhs.add_vertex(attrs! { "kind" => "room" });
        let door = rhs.add_vertex(attrs! { "kind" => "door" });
        let link = rhs.add_edge(room2, door, attrs! {}).unwrap();

        let production = Production::builder("add-door", lhs, rhs)
            .preserve_vertex(room, room2)
            .constraint(room, "doors", AttributePredicate::Range { min: None, max: Some(1.0) })
            .rule(
                room2,
                "doors",
                AttributeRule::compute("increment", move |ctx| {
                    let doors = ctx.attribute(room.into(), "doors")?.as_f64()?;
                    Some(Value::Int(doors as i64 + 1))
                }),
            )
            .rule(door, "width", AttributeRule::copy(room, "wall"))
            .rule(link, "via", AttributeRule::Set(Value::from("hinge")))
            .build()
            .unwrap();

        let mut host = Graph::new();
        let r = host.add_vertex(attrs! { "kind" => "room", "doors" => 0, "wall" => 2.5 });

        let first = production.find_matches(&host);
        let host = production.apply(&host, &first[0]).unwrap();
        assert_eq!(host.vertex(r).unwrap().attribute("doors"), Some(&Value::Int(1)));
        let created = host
            .vertices()
            .find(|v| v.attribute("kind") == Some(&Value::from("door")))
            .unwrap();
        assert_eq!(created.attribute("width"), Some(&Value::Float(2.5)));
        assert_eq!(
            host.edges().next().unwrap().attribute("via"),
            Some(&Value::from("hinge"))
        );

        let second = production.find_matches(&host);
        let host = production.apply(&host, &second[0]).unwrap();
        assert_eq!(host.vertex(r).unwrap().attribute("doors"), Some(&Value::Int(2)));
        assert!(production.find_matches(&host).is_empty());
    }

    #[test]
    fn ill_formed_productions_are_rejected() {
        let mut lhs = Graph::new();
        let u = lhs.add_vertex(attrs! {});
        let mut rhs = Graph::new();
        let r = rhs.add_vertex(attrs! {});
        let r_extra = rhs.add_vertex(attrs! {});

        let missing_rhs = Production::builder("bad", lhs.clone(), Graph::new())
            .preserve_vertex(u, r)
            .build();
        assert!(matches!(missing_rhs, Err(Error::IllFormedProduction(_))));

        let not_injective = Production::builder("bad", lhs.clone(), rhs.clone())
            .preserve_vertex(u, r)
            .preserve_vertex(u, r_extra)
            .build();
        assert!(matches!(not_injective, Err(Error::IllFormedProduction(_))));

        let rule_on_pattern_only = Production::builder("bad", lhs.clone(), Graph::new())
            .rule(u, "x", AttributeRule::Remove)
            .build();
        assert!(matches!(rule_on_pattern_only, Err(Error::IllFormedProduction(_))));

        let constraint_on_replacement = Production::builder("bad", Graph::new(), rhs)
            .constraint(r_extra, "x", AttributePredicate::Present)
            .build();
        assert!(matches!(constraint_on_replacement, Err(Error::IllFormedProduction(_))));
    }
}
