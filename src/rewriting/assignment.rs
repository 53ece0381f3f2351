//! Attribute assignment for elements of a production's replacement graph.

use std::fmt;
use std::sync::Arc;

use crate::graph::{Attributes, Element, Graph, Value};

use super::matching::Embedding;

/// Read access to the matched host elements while computing new attributes.
///
/// Reads always see the host graph as it was before the rewrite.
pub struct RuleContext<'a> {
    host: &'a Graph,
    embedding: &'a Embedding,
}

impl<'a> RuleContext<'a> {
    pub(crate) fn new(host: &'a Graph, embedding: &'a Embedding) -> Self {
        Self { host, embedding }
    }

    /// Attributes of the host image of a pattern element.
    pub fn attributes(&self, pattern_element: Element) -> Option<&'a Attributes> {
        let image = self.embedding.image(pattern_element)?;
        self.host.attributes(image)
    }

    pub fn attribute(&self, pattern_element: Element, name: &str) -> Option<&'a Value> {
        self.attributes(pattern_element)?.get(name)
    }

    pub fn host(&self) -> &'a Graph {
        self.host
    }

    pub fn embedding(&self) -> &'a Embedding {
        self.embedding
    }
}

type ComputeFn = dyn Fn(&RuleContext<'_>) -> Option<Value> + Send + Sync;

/// A named closure computing an attribute from the matched host elements.
#[derive(Clone)]
pub struct Computation {
    name: String,
    compute: Arc<ComputeFn>,
}

impl Computation {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Computation").field(&self.name).finish()
    }
}

/// How one attribute of a preserved or created element is set by a rewrite.
#[derive(Clone, Debug)]
pub enum AttributeRule {
    /// Sets a constant.
    Set(Value),
    /// Copies an attribute of the image of a pattern element; removes it if missing.
    Copy { from: Element, name: String },
    /// Removes the attribute.
    Remove,
    /// Sets the computed value, or removes the attribute on `None`.
    Compute(Computation),
}

impl AttributeRule {
    pub fn copy(from: impl Into<Element>, name: impl Into<String>) -> Self {
        AttributeRule::Copy {
            from: from.into(),
            name: name.into(),
        }
    }

    pub fn compute(
        name: impl Into<String>,
        compute: impl Fn(&RuleContext<'_>) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        AttributeRule::Compute(Computation {
            name: name.into(),
            compute: Arc::new(compute),
        })
    }

    /// Pattern element this rule reads from, if any.
    pub fn source(&self) -> Option<Element> {
        match self {
            AttributeRule::Copy { from, .. } => Some(*from),
            _ => None,
        }
    }

    fn evaluate(&self, context: &RuleContext<'_>) -> Option<Value> {
        match self {
            AttributeRule::Set(value) => Some(value.clone()),
            AttributeRule::Copy { from, name } => context.attribute(*from, name).cloned(),
            AttributeRule::Remove => None,
            AttributeRule::Compute(computation) => (computation.compute)(context),
        }
    }

    pub(crate) fn apply(&self, name: &str, attributes: &mut Attributes, context: &RuleContext<'_>) {
        match self.evaluate(context) {
            Some(value) => {
                attributes.insert(name.to_string(), value);
            }
            None => {
                attributes.remove(name);
            }
        }
    }
}
