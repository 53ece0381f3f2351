//! Descriptions of graphs, productions and grammars that refer to elements by name.
//!
//! These are the serializable inputs of the `derive` binary. Building a
//! description resolves every name to a handle and validates the result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::{Attributes, DanglingPolicy, EdgeId, EdgeMode, Element, Graph, Value, VertexId};
use crate::rewriting::assignment::AttributeRule;
use crate::rewriting::grammar::Grammar;
use crate::rewriting::predicate::AttributePredicate;
use crate::rewriting::production::Production;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VertexSchema {
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EdgeSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GraphSchema {
    #[serde(default)]
    pub vertices: Vec<VertexSchema>,
    #[serde(default)]
    pub edges: Vec<EdgeSchema>,
}

/// A graph together with the names its elements were declared with.
#[derive(Clone, Debug, Default)]
pub struct NamedGraph {
    pub graph: Graph,
    names: BTreeMap<String, Element>,
}

impl NamedGraph {
    pub fn element(&self, name: &str) -> Result<Element> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownName(name.to_string()))
    }

    pub fn vertex(&self, name: &str) -> Result<VertexId> {
        match self.element(name)? {
            Element::Vertex(id) => Ok(id),
            Element::Edge(_) => Err(Error::UnknownName(format!("{name} (not a vertex)"))),
        }
    }

    pub fn edge(&self, name: &str) -> Result<EdgeId> {
        match self.element(name)? {
            Element::Edge(id) => Ok(id),
            Element::Vertex(_) => Err(Error::UnknownName(format!("{name} (not an edge)"))),
        }
    }

    fn declare(&mut self, name: &str, element: Element) -> Result<()> {
        if self.names.insert(name.to_string(), element).is_some() {
            return Err(Error::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

impl GraphSchema {
    /// Builds the graph, resolving edge endpoints by vertex name.
    ///
    /// Vertices and edges share one namespace.
    pub fn build(&self) -> Result<NamedGraph> {
        let mut named = NamedGraph::default();
        for vertex in &self.vertices {
            let id = named.graph.add_vertex(vertex.attributes.clone());
            named.declare(&vertex.name, Element::Vertex(id))?;
        }
        for edge in &self.edges {
            let from = named.vertex(&edge.from)?;
            let to = named.vertex(&edge.to)?;
            let id = named.graph.add_edge(from, to, edge.attributes.clone())?;
            if let Some(name) = &edge.name {
                named.declare(name, Element::Edge(id))?;
            }
        }
        Ok(named)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstraintSchema {
    pub element: String,
    pub attribute: String,
    pub predicate: AttributePredicate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSchema {
    Set(Value),
    Remove,
    /// Copies `attribute` of the named pattern element.
    Copy { from: String, attribute: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssignmentSchema {
    pub element: String,
    pub attribute: String,
    pub rule: RuleSchema,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductionSchema {
    pub name: String,
    #[serde(default)]
    pub lhs: GraphSchema,
    #[serde(default)]
    pub rhs: GraphSchema,
    /// `[pattern name, replacement name]` pairs of preserved elements.
    #[serde(default)]
    pub preserve: Vec<(String, String)>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSchema>,
    #[serde(default)]
    pub assignments: Vec<AssignmentSchema>,
    #[serde(default)]
    pub edge_mode: EdgeMode,
    #[serde(default)]
    pub dangling: DanglingPolicy,
}

impl ProductionSchema {
    pub fn build(&self) -> Result<Production> {
        let lhs = self.lhs.build()?;
        let rhs = self.rhs.build()?;

        let mut vertex_pairs = Vec::new();
        let mut edge_pairs = Vec::new();
        for (l, r) in &self.preserve {
            match (lhs.element(l)?, rhs.element(r)?) {
                (Element::Vertex(l), Element::Vertex(r)) => vertex_pairs.push((l, r)),
                (Element::Edge(l), Element::Edge(r)) => edge_pairs.push((l, r)),
                _ => {
                    return Err(Error::IllFormedProduction(format!(
                        "`{l}` and `{r}` are not of the same kind"
                    )));
                }
            }
        }

        let constraints = self
            .constraints
            .iter()
            .map(|c| Ok((lhs.element(&c.element)?, c.attribute.clone(), c.predicate.clone())))
            .collect::<Result<Vec<_>>>()?;

        let rules = self
            .assignments
            .iter()
            .map(|a| {
                let rule = match &a.rule {
                    RuleSchema::Set(value) => AttributeRule::Set(value.clone()),
                    RuleSchema::Remove => AttributeRule::Remove,
                    RuleSchema::Copy { from, attribute } => {
                        AttributeRule::copy(lhs.element(from)?, attribute.clone())
                    }
                };
                Ok((rhs.element(&a.element)?, a.attribute.clone(), rule))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = Production::builder(self.name.clone(), lhs.graph, rhs.graph)
            .edge_mode(self.edge_mode)
            .dangling_policy(self.dangling);
        for (l, r) in vertex_pairs {
            builder = builder.preserve_vertex(l, r);
        }
        for (l, r) in edge_pairs {
            builder = builder.preserve_edge(l, r);
        }
        for (element, attribute, predicate) in constraints {
            builder = builder.constraint(element, attribute, predicate);
        }
        for (element, attribute, rule) in rules {
            builder = builder.rule(element, attribute, rule);
        }
        builder.build()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GrammarSchema {
    pub productions: Vec<ProductionSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GrammarSchema {
    /// Builds the grammar, seeded if the description names a seed.
    pub fn build(&self) -> Result<Grammar> {
        let productions = self
            .productions
            .iter()
            .map(ProductionSchema::build)
            .collect::<Result<Vec<_>>>()?;
        let grammar = Grammar::new(productions);
        Ok(match self.seed {
            Some(seed) => grammar.with_seed(seed),
            None => grammar,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{GrammarSchema, GraphSchema, ProductionSchema};
    use crate::error::Error;
    use crate::graph::{DanglingPolicy, EdgeMode, Value};
    use crate::rewriting::grammar::DerivationState;

    fn graph(json: &str) -> GraphSchema {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn graph_elements_resolve_by_name() {
        let named = graph(
            r#"{
                "vertices": [
                    { "name": "a", "attributes": { "color": "red" } },
                    { "name": "b" }
                ],
                "edges": [ { "name": "ab", "from": "a", "to": "b", "attributes": { "w": 2 } } ]
            }"#,
        )
        .build()
        .unwrap();

        let a = named.vertex("a").unwrap();
        let ab = named.edge("ab").unwrap();
        assert_eq!(
            named.graph.vertex(a).unwrap().attribute("color"),
            Some(&Value::from("red"))
        );
        assert_eq!(named.graph.edge(ab).unwrap().vertex1(), a);
        assert!(matches!(named.edge("a"), Err(Error::UnknownName(_))));
    }

    #[test]
    fn duplicate_and_unknown_names_are_rejected() {
        let duplicate = graph(r#"{ "vertices": [ { "name": "a" }, { "name": "a" } ] }"#);
        assert!(matches!(duplicate.build(), Err(Error::DuplicateName(_))));

        let unknown = graph(
            r#"{ "vertices": [ { "name": "a" } ], "edges": [ { "from": "a", "to": "z" } ] }"#,
        );
        assert!(matches!(unknown.build(), Err(Error::UnknownName(_))));
    }

    #[test]
    fn production_schema_builds_constraints_and_rules() {
        let schema: ProductionSchema = serde_json::from_str(
            r#"{
                "name": "extend",
                "lhs": { "vertices": [ { "name": "x", "attributes": { "kind": "room" } } ] },
                "rhs": {
                    "vertices": [ { "name": "x" }, { "name": "y", "attributes": { "kind": "hall" } } ],
                    "edges": [ { "from": "x", "to": "y" } ]
                },
                "preserve": [ ["x", "x"] ],
                "constraints": [
                    { "element": "x", "attribute": "size", "predicate": { "range": { "min": 2 } } }
                ],
                "assignments": [
                    { "element": "y", "attribute": "size", "rule": { "copy": { "from": "x", "attribute": "size" } } },
                    { "element": "x", "attribute": "size", "rule": { "set": 1 } }
                ],
                "edge_mode": "undirected",
                "dangling": "reject"
            }"#,
        )
        .unwrap();
        let production = schema.build().unwrap();
        assert_eq!(production.lhs().edge_mode(), EdgeMode::Undirected);
        assert_eq!(production.dangling_policy(), DanglingPolicy::Reject);

        let host = graph(
            r#"{ "vertices": [
                { "name": "small", "attributes": { "kind": "room", "size": 1 } },
                { "name": "big", "attributes": { "kind": "room", "size": 4 } }
            ] }"#,
        )
        .build()
        .unwrap();
        let big = host.vertex("big").unwrap();

        let matches = production.find_matches(&host.graph);
        assert_eq!(matches.len(), 1);
        let result = production.apply(&host.graph, &matches[0]).unwrap();
        assert_eq!(result.vertex(big).unwrap().attribute("size"), Some(&Value::Int(1)));
        let hall = result
            .vertices()
            .find(|v| v.attribute("kind") == Some(&Value::from("hall")))
            .unwrap();
        assert_eq!(hall.attribute("size"), Some(&Value::Int(4)));
    }

    #[test]
    fn preserving_across_kinds_is_ill_formed() {
        let schema: ProductionSchema = serde_json::from_str(
            r#"{
                "name": "bad",
                "lhs": { "vertices": [ { "name": "a" } ] },
                "rhs": {
                    "vertices": [ { "name": "p" }, { "name": "q" } ],
                    "edges": [ { "name": "pq", "from": "p", "to": "q" } ]
                },
                "preserve": [ ["a", "pq"] ]
            }"#,
        )
        .unwrap();
        assert!(matches!(schema.build(), Err(Error::IllFormedProduction(_))));
    }

    #[test]
    fn seeded_grammar_schema_derives() {
        let schema: GrammarSchema = serde_json::from_str(
            r#"{
                "seed": 11,
                "productions": [ {
                    "name": "recolor",
                    "lhs": { "vertices": [ { "name": "v", "attributes": { "color": "red" } } ] },
                    "rhs": { "vertices": [ { "name": "v", "attributes": { "color": "blue" } } ] },
                    "preserve": [ ["v", "v"] ]
                } ]
            }"#,
        )
        .unwrap();
        let seed = graph(
            r#"{ "vertices": [
                { "name": "a", "attributes": { "color": "red" } },
                { "name": "b", "attributes": { "color": "red" } }
            ] }"#,
        )
        .build()
        .unwrap();

        let mut grammar = schema.build().unwrap();
        assert_eq!(grammar.productions().len(), 1);
        assert_eq!(grammar.productions()[0].name(), "recolor");
        let derivation = grammar.apply(&seed.graph, 0).unwrap();
        assert_eq!(derivation.len(), 2);
        assert_eq!(derivation.state, DerivationState::HaltedNoMatch);
        assert!(
            derivation
                .last()
                .unwrap()
                .vertices()
                .all(|v| v.attribute("color") == Some(&Value::from("blue")))
        );
    }
}
