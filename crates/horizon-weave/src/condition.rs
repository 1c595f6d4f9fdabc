//! Condition trees.
//!
//! A [`ConditionGroup`] combines [`Condition`]s and nested groups with AND or
//! OR. Groups are built from their declaration ([`ConditionGroupSpec`])
//! parent first, children after, and hold their children by value, so a
//! group can never contain itself.
//!
//! # Declaration format
//!
//! ```json
//! {
//!   "operator": "AND",
//!   "conditions": [
//!     { "left": "=status", "comparator": "==", "right": "open" },
//!     { "left": "=tags", "comparator": "[", "right": "a;b", "delimiter": ";" }
//!   ],
//!   "conditionGroups": [ { "operator": "OR", "conditions": [] } ]
//! }
//! ```
//!
//! Operands are literals, reference expressions (`=widget!column[row]`) or
//! static formulas (`=Upper("x")`). Anything else starting with `=`, and
//! `[#alias#]` placeholders, are rejected when the tree is built.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::reference::Reference;
use crate::value::Value;

/// How a condition compares its operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Comparator {
    /// Canonical scalar identity.
    Equals,
    /// Negation of `Equals`.
    NotEquals,
    /// Numeric `<`.
    Less,
    /// Numeric `<=`.
    LessEqual,
    /// Numeric `>`.
    Greater,
    /// Numeric `>=`.
    GreaterEqual,
    /// Membership in the delimited right-hand list.
    In,
    /// Negation of `In`.
    NotIn,
    /// Scalar identity, optionally ignoring case.
    Is,
    /// Negation of `Is`.
    IsNot,
    /// Not a known comparator. Fails when evaluated.
    Unsupported(String),
}

impl Comparator {
    /// Parse a symbolic (`==`, `[`, ...) or named (`EQUALS`, ...) comparator.
    ///
    /// Unknown names are kept as [`Comparator::Unsupported`].
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "==" => Self::Equals,
            "!==" => Self::NotEquals,
            "<" => Self::Less,
            "<=" => Self::LessEqual,
            ">" => Self::Greater,
            ">=" => Self::GreaterEqual,
            "[" => Self::In,
            "![" => Self::NotIn,
            "=" => Self::Is,
            "!=" => Self::IsNot,
            name => match name.to_ascii_uppercase().as_str() {
                "EQUALS" => Self::Equals,
                "NOT_EQUALS" => Self::NotEquals,
                "LESS" => Self::Less,
                "LESS_EQUAL" => Self::LessEqual,
                "GREATER" => Self::Greater,
                "GREATER_EQUAL" => Self::GreaterEqual,
                "IN" => Self::In,
                "NOT_IN" => Self::NotIn,
                "IS" => Self::Is,
                "IS_NOT" => Self::IsNot,
                _ => Self::Unsupported(name.to_string()),
            },
        }
    }

    /// The canonical name.
    pub fn name(&self) -> &str {
        match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::Less => "LESS",
            Self::LessEqual => "LESS_EQUAL",
            Self::Greater => "GREATER",
            Self::GreaterEqual => "GREATER_EQUAL",
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
            Self::Is => "IS",
            Self::IsNot => "IS_NOT",
            Self::Unsupported(name) => name,
        }
    }

    /// Whether this comparator needs numeric operands.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Self::Less | Self::LessEqual | Self::Greater | Self::GreaterEqual
        )
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a group combines its members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    /// All members must hold. An empty group holds.
    And,
    /// At least one member must hold. An empty group does not hold.
    Or,
    /// Not a known operator. Fails when evaluated.
    Unsupported(String),
}

impl LogicalOperator {
    /// Parse `AND`/`OR` (any case) or `&&`/`||`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "&&" => Self::And,
            "||" => Self::Or,
            name if name.eq_ignore_ascii_case("and") => Self::And,
            name if name.eq_ignore_ascii_case("or") => Self::Or,
            name => Self::Unsupported(name.to_string()),
        }
    }

    /// The canonical name.
    pub fn name(&self) -> &str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Unsupported(name) => name,
        }
    }
}

/// One side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A constant.
    Literal(Value),
    /// The current value of another widget.
    Reference(Reference),
    /// A constant computed from a static formula.
    StaticFormula(Formula),
}

impl Operand {
    /// Classify a declared operand.
    pub fn parse(raw: &Value) -> Result<Self> {
        let Value::Text(text) = raw else {
            return Ok(Self::Literal(raw.clone()));
        };
        if text.contains("[#") && text.contains("#]") {
            return Err(Error::unsupported_operand(text, "alias placeholders are not supported"));
        }
        if !text.trim_start().starts_with('=') {
            return Ok(Self::Literal(raw.clone()));
        }
        if let Some(reference) = Reference::try_parse(text) {
            return Ok(Self::Reference(reference));
        }
        if Formula::looks_like(text) {
            return Formula::parse(text).map(Self::StaticFormula);
        }
        Err(Error::unsupported_operand(
            text,
            "neither a reference nor a static formula",
        ))
    }

    /// The referenced widget, for reference operands.
    pub fn reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    fn to_raw(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Reference(reference) => Value::Text(reference.to_string()),
            Self::StaticFormula(formula) => Value::Text(formula.source().to_string()),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Value::Text(s)) => write!(f, "\"{s}\""),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Reference(reference) => write!(f, "{reference}"),
            Self::StaticFormula(formula) => f.write_str(formula.source()),
        }
    }
}

/// A single comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Left operand.
    pub left: Operand,
    /// Comparator.
    pub comparator: Comparator,
    /// Right operand.
    pub right: Operand,
    /// Delimiter for `IN`/`NOT_IN`, overriding the configured default.
    pub list_delimiter: Option<String>,
}

impl Condition {
    /// Create a condition using the default list delimiter.
    pub fn new(left: Operand, comparator: Comparator, right: Operand) -> Self {
        Self {
            left,
            comparator,
            right,
            list_delimiter: None,
        }
    }

    /// Build from a declaration.
    pub fn from_spec(spec: &ConditionSpec) -> Result<Self> {
        Ok(Self {
            left: Operand::parse(&spec.left)?,
            comparator: Comparator::parse(&spec.comparator),
            right: Operand::parse(&spec.right)?,
            list_delimiter: spec.delimiter.clone(),
        })
    }

    /// Convert back to a declaration.
    pub fn to_spec(&self) -> ConditionSpec {
        ConditionSpec {
            left: self.left.to_raw(),
            comparator: self.comparator.name().to_string(),
            right: self.right.to_raw(),
            delimiter: self.list_delimiter.clone(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.comparator, self.right)
    }
}

/// A tree node combining conditions and nested groups.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionGroup {
    /// How members are combined.
    pub operator: LogicalOperator,
    /// Conditions of this node.
    pub conditions: Vec<Condition>,
    /// Nested groups.
    pub groups: Vec<ConditionGroup>,
}

impl ConditionGroup {
    /// An empty group.
    pub fn new(operator: LogicalOperator) -> Self {
        Self {
            operator,
            conditions: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Add a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add a nested group.
    pub fn with_group(mut self, group: ConditionGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Build from a declaration, classifying every operand.
    pub fn from_spec(spec: &ConditionGroupSpec) -> Result<Self> {
        Ok(Self {
            operator: LogicalOperator::parse(&spec.operator),
            conditions: spec
                .conditions
                .iter()
                .map(Condition::from_spec)
                .collect::<Result<_>>()?,
            groups: spec
                .condition_groups
                .iter()
                .map(Self::from_spec)
                .collect::<Result<_>>()?,
        })
    }

    /// Parse a JSON declaration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let spec: ConditionGroupSpec = serde_json::from_str(json)?;
        Self::from_spec(&spec)
    }

    /// Convert back to a declaration.
    pub fn to_spec(&self) -> ConditionGroupSpec {
        ConditionGroupSpec {
            operator: self.operator.name().to_string(),
            conditions: self.conditions.iter().map(Condition::to_spec).collect(),
            condition_groups: self.groups.iter().map(Self::to_spec).collect(),
        }
    }

    /// Every distinct reference in the tree, depth-first in declaration order.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        for condition in &self.conditions {
            for reference in [condition.left.reference(), condition.right.reference()]
                .into_iter()
                .flatten()
            {
                if !out.contains(&reference) {
                    out.push(reference);
                }
            }
        }
        for group in &self.groups {
            group.collect_references(out);
        }
    }
}

impl fmt::Display for ConditionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() && self.groups.is_empty() {
            return write!(f, "({} of nothing)", self.operator.name());
        }
        f.write_str("(")?;
        let separator = format!(" {} ", self.operator.name());
        let mut first = true;
        for condition in &self.conditions {
            if !first {
                f.write_str(&separator)?;
            }
            write!(f, "{condition}")?;
            first = false;
        }
        for group in &self.groups {
            if !first {
                f.write_str(&separator)?;
            }
            write!(f, "{group}")?;
            first = false;
        }
        f.write_str(")")
    }
}

/// Declared form of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    /// Left operand: literal, reference expression or static formula.
    pub left: Value,
    /// Comparator, symbolic or named.
    pub comparator: String,
    /// Right operand.
    pub right: Value,
    /// Optional list delimiter for `IN`/`NOT_IN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

/// Declared form of a condition group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionGroupSpec {
    /// `AND` or `OR`.
    #[serde(default = "default_operator")]
    pub operator: String,
    /// Conditions.
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    /// Nested groups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub condition_groups: Vec<ConditionGroupSpec>,
}

fn default_operator() -> String {
    "AND".to_string()
}

impl ConditionGroupSpec {
    /// An empty group declaration.
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            conditions: Vec::new(),
            condition_groups: Vec::new(),
        }
    }
}
