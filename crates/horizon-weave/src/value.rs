//! Widget values.
//!
//! [`Value`] is the opaque payload a widget exposes. Comparisons never look
//! at it directly: they first reduce it to a canonical [`Scalar`], under
//! which numeric strings compare numerically and everything else compares
//! as text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A widget value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// A boolean (checkboxes, toggles).
    Bool(bool),
    /// A number.
    Number(f64),
    /// Text.
    Text(String),
    /// Several values, e.g. a multi-select.
    List(Vec<Value>),
    /// A nested structure.
    Map(BTreeMap<String, Value>),
}

/// Canonical comparable form of a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// A finite number.
    Number(f64),
    /// Anything that is not numeric.
    Text(String),
}

impl Value {
    /// Shorthand for `Value::Text`.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Whether this counts as "no value" for `onlyIfNotEmpty` checks.
    ///
    /// Null, blank text, and empty lists or maps are empty. `false` and `0`
    /// are values.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Render as text. Lists are joined with `delimiter`.
    pub fn to_text(&self, delimiter: &str) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
            Self::List(items) => items
                .iter()
                .map(|v| v.to_text(delimiter))
                .collect::<Vec<_>>()
                .join(delimiter),
            Self::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }

    /// Reduce to the canonical scalar used by comparators.
    pub fn to_scalar(&self, delimiter: &str) -> Scalar {
        match self {
            Self::Bool(b) => Scalar::Number(if *b { 1.0 } else { 0.0 }),
            Self::Number(n) if n.is_finite() => Scalar::Number(*n),
            Self::Text(s) => Scalar::from_text(s),
            other => Scalar::Text(other.to_text(delimiter)),
        }
    }

    /// Split into list members: lists yield their items, text is split on
    /// `delimiter` (members trimmed), anything else is a single member.
    pub fn list_members(&self, delimiter: &str) -> Vec<Value> {
        match self {
            Self::List(items) => items.clone(),
            Self::Text(s) if s.trim().is_empty() => Vec::new(),
            Self::Text(s) => s
                .split(delimiter)
                .map(|part| Value::Text(part.trim().to_string()))
                .collect(),
            Self::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }
}

impl Scalar {
    /// Numeric if the trimmed text parses as a finite number, text otherwise.
    pub fn from_text(s: &str) -> Self {
        match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() && !s.trim().is_empty() => Self::Number(n),
            _ => Self::Text(s.to_string()),
        }
    }

    /// The number, if this scalar is numeric.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Identity comparison, optionally ignoring case for text.
    pub fn matches(&self, other: &Scalar, ignore_case: bool) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) if ignore_case => a.to_lowercase() == b.to_lowercase(),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text(","))
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_strings_are_numbers() {
        assert_eq!(Value::text("5").to_scalar(","), Scalar::Number(5.0));
        assert_eq!(Value::text(" 5.0 ").to_scalar(","), Scalar::Number(5.0));
        assert_eq!(Value::text("5a").to_scalar(","), Scalar::Text("5a".into()));
        assert_eq!(Value::text("").to_scalar(","), Scalar::Text(String::new()));
        assert_eq!(Value::text("NaN").to_scalar(","), Scalar::Text("NaN".into()));
        assert_eq!(Value::Bool(true).to_scalar(","), Scalar::Number(1.0));
        assert_eq!(Value::Null.to_scalar(","), Scalar::Text(String::new()));
    }

    #[test]
    fn test_emptiness() {
        assert!(Value::Null.is_empty());
        assert!(Value::text("  ").is_empty());
        assert!(Value::List(vec![]).is_empty());
        assert!(!Value::Number(0.0).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(!Value::text("x").is_empty());
    }

    #[test]
    fn test_list_members() {
        let members = Value::text("a, b ,c").list_members(",");
        assert_eq!(members, vec![Value::text("a"), Value::text("b"), Value::text("c")]);
        assert!(Value::text("").list_members(",").is_empty());
        assert_eq!(Value::Number(3.0).list_members(","), vec![Value::Number(3.0)]);
    }

    #[test]
    fn test_text_rendering() {
        assert_eq!(Value::Number(3.0).to_text(","), "3");
        assert_eq!(Value::Number(2.5).to_text(","), "2.5");
        let list = Value::List(vec![Value::Number(1.0), Value::text("x")]);
        assert_eq!(list.to_text(";"), "1;x");
    }

    #[test]
    fn test_scalar_matching() {
        let a = Scalar::Text("Open".into());
        let b = Scalar::Text("open".into());
        assert!(!a.matches(&b, false));
        assert!(a.matches(&b, true));
        assert!(Scalar::Number(5.0).matches(&Scalar::from_text("5"), false));
        assert!(!Scalar::Number(5.0).matches(&Scalar::Text("five".into()), true));
    }

    #[test]
    fn test_untagged_serde() {
        let v: Value = serde_json::from_str(r#"{"a": [1, "x", null, true]}"#).unwrap();
        let Value::Map(map) = &v else {
            panic!("expected map");
        };
        assert_eq!(
            map["a"],
            Value::List(vec![
                Value::Number(1.0),
                Value::text("x"),
                Value::Null,
                Value::Bool(true)
            ])
        );
    }
}
