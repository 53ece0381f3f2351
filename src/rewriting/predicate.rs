//! Attribute predicates checked against host elements during matching.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::graph::{Attributes, Value};

type TestFn = dyn Fn(Option<&Value>) -> bool + Send + Sync;

/// A named closure over an optional attribute value.
#[derive(Clone)]
pub struct CustomPredicate {
    name: String,
    test: Arc<TestFn>,
}

impl CustomPredicate {
    pub fn new(
        name: impl Into<String>,
        test: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomPredicate").field(&self.name).finish()
    }
}

/// A condition on one attribute of a host element.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributePredicate {
    Equals(Value),
    NotEquals(Value),
    /// Inclusive numeric range; a missing bound is open.
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    OneOf(Vec<Value>),
    Present,
    Absent,
    #[serde(skip)]
    Custom(CustomPredicate),
}

impl AttributePredicate {
    pub fn custom(
        name: impl Into<String>,
        test: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        AttributePredicate::Custom(CustomPredicate::new(name, test))
    }

    /// Whether the (possibly missing) attribute value satisfies the predicate.
    pub fn holds(&self, value: Option<&Value>) -> bool {
        match self {
            AttributePredicate::Equals(expected) => value.is_some_and(|v| v.same_as(expected)),
            AttributePredicate::NotEquals(expected) => !value.is_some_and(|v| v.same_as(expected)),
            AttributePredicate::Range { min, max } => {
                let Some(x) = value.and_then(Value::as_f64) else {
                    return false;
                };
                min.is_none_or(|min| x >= min) && max.is_none_or(|max| x <= max)
            }
            AttributePredicate::OneOf(options) => {
                value.is_some_and(|v| options.iter().any(|option| v.same_as(option)))
            }
            AttributePredicate::Present => value.is_some(),
            AttributePredicate::Absent => value.is_none(),
            AttributePredicate::Custom(custom) => (custom.test)(value),
        }
    }
}

/// Conjunction of attribute predicates attached to one pattern element.
#[derive(Clone, Debug, Default)]
pub struct Constraint {
    clauses: Vec<(String, AttributePredicate)>,
}

impl Constraint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires every attribute in `attributes` to be present with an equal value.
    pub fn from_attributes(attributes: &Attributes) -> Self {
        Self {
            clauses: attributes
                .iter()
                .map(|(name, value)| (name.clone(), AttributePredicate::Equals(value.clone())))
                .collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, predicate: AttributePredicate) -> Self {
        self.push(name, predicate);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, predicate: AttributePredicate) {
        self.clauses.push((name.into(), predicate));
    }

    pub fn extend(&mut self, other: Constraint) {
        self.clauses.extend(other.clauses);
    }

    pub fn holds(&self, attributes: &Attributes) -> bool {
        self.clauses
            .iter()
            .all(|(name, predicate)| predicate.holds(attributes.get(name)))
    }
}
