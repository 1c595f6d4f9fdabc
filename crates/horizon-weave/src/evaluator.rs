//! Condition evaluation.

use horizon_weave_core::logging::targets;

use crate::condition::{Comparator, Condition, ConditionGroup, LogicalOperator, Operand};
use crate::config::WeaveConfig;
use crate::error::{Error, Result};
use crate::reference::ReferenceValues;
use crate::value::{Scalar, Value};

/// Evaluates condition trees against current reference values.
///
/// Every member of a group is evaluated, so an unsupported comparator or a
/// type mismatch anywhere in the tree is reported even when another member
/// already decides the outcome.
#[derive(Debug, Clone, Default)]
pub struct ConditionEvaluator {
    config: WeaveConfig,
}

impl ConditionEvaluator {
    /// Create an evaluator.
    pub fn new(config: WeaveConfig) -> Self {
        Self { config }
    }

    /// Evaluate `group`.
    ///
    /// An empty AND group is `true`, an empty OR group is `false`.
    pub fn evaluate(&self, group: &ConditionGroup, values: &dyn ReferenceValues) -> Result<bool> {
        let mut results = Vec::with_capacity(group.conditions.len() + group.groups.len());
        for condition in &group.conditions {
            results.push(self.evaluate_condition(condition, values)?);
        }
        for nested in &group.groups {
            results.push(self.evaluate(nested, values)?);
        }

        let outcome = match &group.operator {
            LogicalOperator::And => results.iter().all(|&r| r),
            LogicalOperator::Or => results.iter().any(|&r| r),
            LogicalOperator::Unsupported(name) => return Err(Error::unsupported_operator(name)),
        };
        tracing::trace!(target: targets::EVALUATOR, %group, outcome, "evaluated group");
        Ok(outcome)
    }

    /// Evaluate one condition.
    pub fn evaluate_condition(&self, condition: &Condition, values: &dyn ReferenceValues) -> Result<bool> {
        let left = operand_value(&condition.left, values)?;
        let right = operand_value(&condition.right, values)?;
        let delimiter = self.delimiter_for(condition, values);

        match &condition.comparator {
            Comparator::Equals => Ok(same(&left, &right, &delimiter, false)),
            Comparator::NotEquals => Ok(!same(&left, &right, &delimiter, false)),
            Comparator::Is => Ok(same(&left, &right, &delimiter, self.config.case_insensitive_is)),
            Comparator::IsNot => Ok(!same(&left, &right, &delimiter, self.config.case_insensitive_is)),
            Comparator::In => Ok(contains(&left, &right, &delimiter)),
            Comparator::NotIn => Ok(!contains(&left, &right, &delimiter)),
            ordering @ (Comparator::Less
            | Comparator::LessEqual
            | Comparator::Greater
            | Comparator::GreaterEqual) => {
                let (l, r) = match (
                    left.to_scalar(&delimiter).as_number(),
                    right.to_scalar(&delimiter).as_number(),
                ) {
                    (Some(l), Some(r)) => (l, r),
                    _ => {
                        return Err(Error::ComparatorTypeMismatch {
                            comparator: ordering.name().to_string(),
                            left: left.to_text(&delimiter),
                            right: right.to_text(&delimiter),
                        });
                    }
                };
                Ok(match ordering {
                    Comparator::Less => l < r,
                    Comparator::LessEqual => l <= r,
                    Comparator::Greater => l > r,
                    _ => l >= r,
                })
            }
            Comparator::Unsupported(name) => Err(Error::unsupported_operator(name)),
        }
    }

    /// The right-hand reference's declared delimiter wins over the
    /// condition's own, which wins over the configured default.
    fn delimiter_for(&self, condition: &Condition, values: &dyn ReferenceValues) -> String {
        condition
            .right
            .reference()
            .and_then(|r| values.delimiter_of(r))
            .or_else(|| condition.list_delimiter.clone())
            .unwrap_or_else(|| self.config.list_delimiter.clone())
    }
}

fn operand_value(operand: &Operand, values: &dyn ReferenceValues) -> Result<Value> {
    match operand {
        Operand::Literal(value) => Ok(value.clone()),
        Operand::Reference(reference) => values.value_of(reference),
        Operand::StaticFormula(formula) => Ok(formula.value().clone()),
    }
}

fn same(left: &Value, right: &Value, delimiter: &str, ignore_case: bool) -> bool {
    left.to_scalar(delimiter)
        .matches(&right.to_scalar(delimiter), ignore_case)
}

/// A list on the left is a member if any of its items is.
fn contains(left: &Value, right: &Value, delimiter: &str) -> bool {
    let set: Vec<Scalar> = right
        .list_members(delimiter)
        .iter()
        .map(|m| m.to_scalar(delimiter))
        .collect();
    let is_member = |candidate: &Value| {
        let candidate = candidate.to_scalar(delimiter);
        set.iter().any(|m| m.matches(&candidate, false))
    };
    match left {
        Value::List(items) => items.iter().any(is_member),
        single => is_member(single),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionGroupSpec;
    use crate::reference::Reference;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Values {
        values: HashMap<String, Value>,
        delimiters: HashMap<String, String>,
    }

    impl Values {
        fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
            self.values.insert(format!("={name}"), value.into());
            self
        }
    }

    impl ReferenceValues for Values {
        fn value_of(&self, reference: &Reference) -> Result<Value> {
            self.values
                .get(&reference.to_string())
                .cloned()
                .ok_or_else(|| Error::broken_reference(reference.to_string(), "unbound"))
        }

        fn delimiter_of(&self, reference: &Reference) -> Option<String> {
            self.delimiters.get(&reference.to_string()).cloned()
        }
    }

    fn literal(v: impl Into<Value>) -> Operand {
        Operand::Literal(v.into())
    }

    fn check(left: impl Into<Value>, comparator: Comparator, right: impl Into<Value>) -> Result<bool> {
        let condition = Condition::new(literal(left), comparator, literal(right));
        ConditionEvaluator::default().evaluate_condition(&condition, &Values::default())
    }

    #[test]
    fn test_empty_group_identities() {
        let evaluator = ConditionEvaluator::default();
        let values = Values::default();
        assert!(evaluator.evaluate(&ConditionGroup::new(LogicalOperator::And), &values).unwrap());
        assert!(!evaluator.evaluate(&ConditionGroup::new(LogicalOperator::Or), &values).unwrap());
    }

    #[test]
    fn test_equality_is_numeric_for_numeric_strings() {
        assert!(check("5", Comparator::Equals, 5.0).unwrap());
        assert!(check("5.0", Comparator::Equals, "5").unwrap());
        assert!(!check("5", Comparator::Equals, "5a").unwrap());
        assert!(check(true, Comparator::Equals, "1").unwrap());
        assert!(check("true", Comparator::NotEquals, "1").unwrap());
    }

    #[test]
    fn test_is_ignores_case_but_equals_does_not() {
        assert!(check("Open", Comparator::Is, "open").unwrap());
        assert!(!check("Open", Comparator::IsNot, "open").unwrap());
        assert!(!check("Open", Comparator::Equals, "open").unwrap());

        let strict = ConditionEvaluator::new(WeaveConfig {
            case_insensitive_is: false,
            ..WeaveConfig::default()
        });
        let condition = Condition::new(literal("Open"), Comparator::Is, literal("open"));
        assert!(!strict.evaluate_condition(&condition, &Values::default()).unwrap());
    }

    #[test]
    fn test_equals_and_not_equals_are_complements() {
        let pairs: [(Value, Value); 6] = [
            ("5".into(), "5".into()),
            ("5".into(), 5.0.into()),
            ("a".into(), "A".into()),
            (Value::Null, "".into()),
            (true.into(), "0".into()),
            (Value::List(vec!["a".into()]), "a".into()),
        ];
        for (l, r) in pairs {
            let eq = check(l.clone(), Comparator::Equals, r.clone()).unwrap();
            let ne = check(l, Comparator::NotEquals, r).unwrap();
            assert_ne!(eq, ne);
        }
    }

    #[test]
    fn test_ordering() {
        assert!(check("10", Comparator::Greater, "9").unwrap());
        assert!(check(3.0, Comparator::LessEqual, "3").unwrap());
        assert!(!check(3.0, Comparator::Less, 3.0).unwrap());
        assert!(check(4.0, Comparator::GreaterEqual, 3.5).unwrap());

        let err = check("abc", Comparator::Less, 3.0).unwrap_err();
        assert!(matches!(err, Error::ComparatorTypeMismatch { .. }));
        assert!(err.to_string().contains("LESS"));
    }

    #[test]
    fn test_membership() {
        assert!(check("b", Comparator::In, "a, b, c").unwrap());
        assert!(check(2.0, Comparator::In, "1,2,3").unwrap());
        assert!(!check("d", Comparator::In, "a,b").unwrap());
        assert!(!check("a", Comparator::In, "").unwrap());
        assert!(check("d", Comparator::NotIn, "a,b").unwrap());

        let multi = Value::List(vec!["x".into(), "b".into()]);
        assert!(check(multi.clone(), Comparator::In, "a,b").unwrap());
        assert!(!check(multi, Comparator::NotIn, "a,b").unwrap());
    }

    #[test]
    fn test_delimiter_precedence() {
        let evaluator = ConditionEvaluator::default();
        let mut condition = Condition::new(literal("b"), Comparator::In, literal("a;b"));
        assert!(!evaluator.evaluate_condition(&condition, &Values::default()).unwrap());

        condition.list_delimiter = Some(";".into());
        assert!(evaluator.evaluate_condition(&condition, &Values::default()).unwrap());

        // The referenced widget's own delimiter wins.
        let mut values = Values::default().with("tags", "a|b");
        values.delimiters.insert("=tags".into(), "|".into());
        condition.right = Operand::Reference(Reference::widget("tags"));
        assert!(evaluator.evaluate_condition(&condition, &values).unwrap());
    }

    #[test]
    fn test_unsupported_comparator_and_operator() {
        assert!(matches!(
            check("a", Comparator::Unsupported("LIKE".into()), "a"),
            Err(Error::UnsupportedOperator { .. })
        ));

        let group = ConditionGroup::new(LogicalOperator::Unsupported("XOR".into()));
        let err = ConditionEvaluator::default()
            .evaluate(&group, &Values::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported operator 'XOR'");
    }

    #[test]
    fn test_errors_surface_without_short_circuit() {
        let spec: ConditionGroupSpec = serde_json::from_value(serde_json::json!({
            "operator": "OR",
            "conditions": [
                { "left": "1", "comparator": "==", "right": "1" },
                { "left": "x", "comparator": ">", "right": "1" }
            ]
        }))
        .unwrap();
        let group = ConditionGroup::from_spec(&spec).unwrap();
        assert!(ConditionEvaluator::default().evaluate(&group, &Values::default()).is_err());
    }

    #[test]
    fn test_nested_groups_with_references() {
        let values = Values::default().with("a", "0").with("b", "2").with("c", 7.0);
        let group = ConditionGroup::new(LogicalOperator::And)
            .with_condition(Condition::new(
                Operand::Reference(Reference::widget("c")),
                Comparator::Greater,
                literal(5.0),
            ))
            .with_group(
                ConditionGroup::new(LogicalOperator::Or)
                    .with_condition(Condition::new(
                        Operand::Reference(Reference::widget("a")),
                        Comparator::Equals,
                        literal("1"),
                    ))
                    .with_condition(Condition::new(
                        Operand::Reference(Reference::widget("b")),
                        Comparator::Equals,
                        literal("2"),
                    )),
            );
        assert!(ConditionEvaluator::default().evaluate(&group, &values).unwrap());
    }
}
