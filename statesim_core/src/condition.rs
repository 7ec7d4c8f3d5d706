//! Predicates evaluated against a person.
//!
//! Guard states, conditional transitions and complex transitions all use the
//! same [`Condition`] tree. Evaluation is pure: it reads the person's
//! attributes and history and never mutates them.

use crate::attribute::AttributeValue;
use crate::error::RuntimeError;
use crate::person::Person;
use crate::time::{TimeUnit, Timestamp};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator used by attribute and age conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "is nil")]
    IsNil,
    #[serde(rename = "is not nil")]
    IsNotNil,
}

impl Operator {
    /// Whether this operator needs a right-hand value.
    pub fn needs_value(self) -> bool {
        !matches!(self, Operator::IsNil | Operator::IsNotNil)
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Ge => ordering != Ordering::Less,
            Operator::IsNil | Operator::IsNotNil => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::IsNil => "is nil",
            Operator::IsNotNil => "is not nil",
        };
        f.write_str(symbol)
    }
}

/// A boolean predicate over a person's attributes, age and module history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition_type")]
pub enum Condition {
    Attribute {
        attribute: String,
        operator: Operator,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<AttributeValue>,
    },
    Age {
        operator: Operator,
        quantity: f64,
        unit: TimeUnit,
    },
    /// True once the named state appears in the current module's history.
    PriorState { name: String },
    And { conditions: Vec<Condition> },
    Or { conditions: Vec<Condition> },
    Not { condition: Box<Condition> },
    True,
    False,
}

impl Condition {
    /// Builds an `attribute == value` condition.
    pub fn attribute_equals(attribute: &str, value: impl Into<AttributeValue>) -> Self {
        Condition::Attribute {
            attribute: attribute.to_string(),
            operator: Operator::Eq,
            value: Some(value.into()),
        }
    }

    /// Evaluates the condition for `person` while running `module` at `now`.
    pub fn evaluate(&self, person: &Person, module: &str, now: Timestamp) -> Result<bool, RuntimeError> {
        match self {
            Condition::Attribute { attribute, operator, value } => {
                compare_attribute(person.attribute(attribute), attribute, *operator, value.as_ref())
            }
            Condition::Age { operator, quantity, unit } => {
                let age = unit.from_millis(person.age_millis(now));
                let ordering = age.partial_cmp(quantity).ok_or_else(|| RuntimeError::TypeMismatch {
                    attribute: "age".to_string(),
                    operator: operator.to_string(),
                    detail: format!("cannot order {} and {}", age, quantity),
                })?;
                Ok(operator.accepts(ordering))
            }
            Condition::PriorState { name } => Ok(person
                .history(module)
                .map(|history| history.contains_state(name))
                .unwrap_or(false)),
            Condition::And { conditions } => {
                for condition in conditions {
                    if !condition.evaluate(person, module, now)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or { conditions } => {
                for condition in conditions {
                    if condition.evaluate(person, module, now)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not { condition } => Ok(!condition.evaluate(person, module, now)?),
            Condition::True => Ok(true),
            Condition::False => Ok(false),
        }
    }

    /// Returns the first structural problem in this condition tree, if any.
    pub(crate) fn check(&self) -> Option<String> {
        match self {
            Condition::Attribute { attribute, operator, value } => {
                if operator.needs_value() && value.is_none() {
                    Some(format!("attribute '{}' compared with '{}' but no value given", attribute, operator))
                } else {
                    None
                }
            }
            Condition::Age { operator, .. } if !operator.needs_value() => {
                Some(format!("age cannot be tested with '{}'", operator))
            }
            Condition::And { conditions } | Condition::Or { conditions } => {
                conditions.iter().find_map(Condition::check)
            }
            Condition::Not { condition } => condition.check(),
            _ => None,
        }
    }
}

fn compare_attribute(
    actual: Option<&AttributeValue>,
    attribute: &str,
    operator: Operator,
    expected: Option<&AttributeValue>,
) -> Result<bool, RuntimeError> {
    match operator {
        Operator::IsNil => return Ok(actual.is_none()),
        Operator::IsNotNil => return Ok(actual.is_some()),
        _ => {}
    }

    let actual = actual.ok_or_else(|| RuntimeError::MissingAttribute(attribute.to_string()))?;
    let expected = expected.ok_or_else(|| RuntimeError::TypeMismatch {
        attribute: attribute.to_string(),
        operator: operator.to_string(),
        detail: "no value to compare against".to_string(),
    })?;

    let ordering = actual.partial_compare(expected).ok_or_else(|| RuntimeError::TypeMismatch {
        attribute: attribute.to_string(),
        operator: operator.to_string(),
        detail: format!("{} vs {}", actual.type_name(), expected.type_name()),
    })?;

    Ok(operator.accepts(ordering))
}
