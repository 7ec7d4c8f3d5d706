//! Attribute values stored on a person.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A value in a person's attribute store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::Bool(_) => "boolean",
            AttributeValue::Number(_) => "number",
            AttributeValue::Text(_) => "text",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Orders two values of the same type. Returns `None` across types.
    pub fn partial_compare(&self, other: &AttributeValue) -> Option<Ordering> {
        match (self, other) {
            (AttributeValue::Number(a), AttributeValue::Number(b)) => a.partial_cmp(b),
            (AttributeValue::Text(a), AttributeValue::Text(b)) => Some(a.cmp(b)),
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_deserialize() {
        let values: Vec<AttributeValue> = serde_json::from_str(r#"[true, 2.5, 3, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                AttributeValue::Bool(true),
                AttributeValue::Number(2.5),
                AttributeValue::Number(3.0),
                AttributeValue::Text("x".into()),
            ]
        );
    }

    #[test]
    fn test_compare_only_same_type() {
        let a = AttributeValue::from(1.0);
        let b = AttributeValue::from(2.0);
        assert_eq!(a.partial_compare(&b), Some(Ordering::Less));
        assert_eq!(a.partial_compare(&AttributeValue::from("1")), None);
    }
}
