//! End-to-end scenarios for conditional properties, live references and
//! data composition.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use horizon_weave::{
    Action, Comparator, Condition, ConditionEvaluator, ConditionGroup, ConditionalPropertySpec,
    DataExtraction, HierarchicalDataComposer, InputValue, LiveReferenceSpec, LogicalOperator, Operand,
    RecordSet, Reference, TableValue, Value, ValueProvider, Weave, WeaveConfig, WidgetEntry,
};
use serde_json::json;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn spec(widget: &str, property: &str, group: serde_json::Value) -> ConditionalPropertySpec {
    serde_json::from_value(json!({
        "widget": widget,
        "property": property,
        "conditionGroup": group,
    }))
    .unwrap()
}

fn counting_actions() -> (Action, Action, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let trues = Arc::new(AtomicUsize::new(0));
    let falses = Arc::new(AtomicUsize::new(0));
    let t = trues.clone();
    let f = falses.clone();
    (
        Arc::new(move || {
            t.fetch_add(1, Ordering::SeqCst);
        }),
        Arc::new(move || {
            f.fetch_add(1, Ordering::SeqCst);
        }),
        trues,
        falses,
    )
}

fn weave_with(config: WeaveConfig, inputs: &[(&str, &str)]) -> (Weave, Vec<Arc<InputValue>>) {
    let weave = Weave::new(config);
    weave.add_widget("form", None, WidgetEntry::container()).unwrap();
    let providers = inputs
        .iter()
        .map(|(name, value)| {
            let input = InputValue::new(*name).with_column(*name).with_value(*value).shared();
            weave
                .add_widget(name, Some("form"), WidgetEntry::input(input.clone()))
                .unwrap();
            input
        })
        .collect();
    weave.add_widget("target", Some("form"), WidgetEntry::layout()).unwrap();
    (weave, providers)
}

#[test]
fn test_equals_scenario_follows_source_changes() {
    init_logging();
    let (weave, inputs) = weave_with(WeaveConfig::immediate(), &[("A", "5")]);
    weave
        .attach_conditional_property(spec(
            "target",
            "disabled",
            json!({ "operator": "AND", "conditions": [{ "left": "=A", "comparator": "EQUALS", "right": "5" }] }),
        ))
        .unwrap();
    assert_eq!(weave.registrar().last_outcome("target", "disabled"), Some(true));
    assert!(!weave.widget_state("target").unwrap().enabled);

    inputs[0].set_value(Value::text("6"));
    assert_eq!(weave.registrar().last_outcome("target", "disabled"), Some(false));
    assert!(weave.widget_state("target").unwrap().enabled);
}

#[test]
fn test_or_scenario() {
    let (weave, _) = weave_with(WeaveConfig::immediate(), &[("A", "0"), ("B", "2")]);
    weave
        .attach_conditional_property(spec(
            "target",
            "hidden",
            json!({
                "operator": "OR",
                "conditions": [
                    { "left": "=A", "comparator": "EQUALS", "right": "1" },
                    { "left": "=B", "comparator": "EQUALS", "right": "2" }
                ]
            }),
        ))
        .unwrap();
    assert_eq!(weave.registrar().last_outcome("target", "hidden"), Some(true));
    assert!(!weave.is_effectively_visible("target").unwrap());
}

#[test]
fn test_empty_groups_are_identities() {
    let evaluator = ConditionEvaluator::new(WeaveConfig::default());
    let values = horizon_weave::BoundReferences::new();
    assert!(evaluator.evaluate(&ConditionGroup::new(LogicalOperator::And), &values).unwrap());
    assert!(!evaluator.evaluate(&ConditionGroup::new(LogicalOperator::Or), &values).unwrap());

    // Nesting identities keeps composition associative.
    let nested = ConditionGroup::new(LogicalOperator::Or)
        .with_group(ConditionGroup::new(LogicalOperator::And))
        .with_group(ConditionGroup::new(LogicalOperator::Or));
    assert!(evaluator.evaluate(&nested, &values).unwrap());
}

#[test]
fn test_complementary_comparators() {
    let evaluator = ConditionEvaluator::new(WeaveConfig::default());
    let values = horizon_weave::BoundReferences::new();
    let operands = [
        (Value::text("5"), Value::Number(5.0)),
        (Value::text("a"), Value::text("a,b")),
        (Value::text("Open"), Value::text("open")),
        (Value::Null, Value::text("")),
        (Value::List(vec![Value::text("x"), Value::text("b")]), Value::text("a;b")),
    ];
    for (left, right) in operands {
        for (positive, negative) in [
            (Comparator::Equals, Comparator::NotEquals),
            (Comparator::In, Comparator::NotIn),
            (Comparator::Is, Comparator::IsNot),
        ] {
            for delimiter in [None, Some(";".to_string())] {
                let check = |comparator: Comparator| {
                    let mut condition = Condition::new(
                        Operand::Literal(left.clone()),
                        comparator,
                        Operand::Literal(right.clone()),
                    );
                    condition.list_delimiter = delimiter.clone();
                    evaluator.evaluate_condition(&condition, &values).unwrap()
                };
                assert_ne!(
                    check(positive.clone()),
                    check(negative.clone()),
                    "{positive} / {negative} on {left:?} and {right:?}"
                );
            }
        }
    }
}

#[test]
fn test_reregistering_does_not_double_invoke() {
    let (weave, inputs) = weave_with(WeaveConfig::immediate(), &[("A", "1")]);
    let (on_true, on_false, trues, falses) = counting_actions();
    let group = json!({ "conditions": [{ "left": "=A", "comparator": "==", "right": "1" }] });

    for _ in 0..2 {
        weave
            .attach_conditional_property_with(
                spec("target", "custom", group.clone()),
                on_true.clone(),
                on_false.clone(),
            )
            .unwrap();
    }
    assert_eq!(weave.registrar().registration_count(), 1);
    let before = trues.load(Ordering::SeqCst) + falses.load(Ordering::SeqCst);

    inputs[0].set_value(Value::text("2"));
    let after = trues.load(Ordering::SeqCst) + falses.load(Ordering::SeqCst);
    assert_eq!(after - before, 1);
}

#[test]
fn test_synchronous_changes_coalesce_into_one_recompute() {
    init_logging();
    let (weave, inputs) = weave_with(WeaveConfig::default(), &[("A", "0"), ("B", "0")]);
    let (on_true, on_false, trues, falses) = counting_actions();
    weave
        .attach_conditional_property_with(
            spec(
                "target",
                "refresh",
                json!({
                    "conditions": [
                        { "left": "=A", "comparator": "==", "right": "1" },
                        { "left": "=B", "comparator": "==", "right": "1" }
                    ]
                }),
            ),
            on_true,
            on_false,
        )
        .unwrap();
    assert_eq!(falses.load(Ordering::SeqCst), 1);

    // Two linked filters updated by one gesture.
    inputs[0].set_value(Value::text("1"));
    inputs[1].set_value(Value::text("1"));
    assert_eq!(weave.registrar().recompute_count("target", "refresh"), Some(1));

    assert_eq!(weave.run_until_idle(), 1);
    assert_eq!(weave.registrar().recompute_count("target", "refresh"), Some(2));
    assert_eq!(trues.load(Ordering::SeqCst), 1);
    assert_eq!(falses.load(Ordering::SeqCst), 1);
}

#[test]
fn test_live_reference_only_if_not_empty() {
    let (weave, inputs) = weave_with(WeaveConfig::immediate(), &[("source", "x"), ("copy", "")]);
    weave
        .attach_live_reference(LiveReferenceSpec {
            widget: "copy".into(),
            source: "=source".into(),
            only_if_not_empty: true,
        })
        .unwrap();
    assert_eq!(inputs[1].value(), Value::text("x"));

    inputs[0].set_value(Value::text(""));
    assert_eq!(inputs[1].value(), Value::text("x"));

    inputs[0].set_value(Value::text("y"));
    assert_eq!(inputs[1].value(), Value::text("y"));
}

#[test]
fn test_live_reference_chain_drives_conditional_property() {
    let (weave, inputs) = weave_with(WeaveConfig::immediate(), &[("source", "a"), ("copy", "")]);
    weave.declare_conditional_property(spec(
        "target",
        "hidden",
        json!({ "conditions": [{ "left": "=copy", "comparator": "=", "right": "B" }] }),
    ));
    weave.declare_live_reference(LiveReferenceSpec {
        widget: "copy".into(),
        source: "=source".into(),
        only_if_not_empty: false,
    });
    assert!(weave.bind_pending().is_empty());
    assert!(weave.widget_state("target").unwrap().visible);

    inputs[0].set_value(Value::text("b"));
    assert_eq!(weave.value("copy"), Some(Value::text("b")));
    assert!(!weave.widget_state("target").unwrap().visible);
}

#[test]
fn test_row_scoped_reference_follows_refresh() {
    let weave = Weave::new(WeaveConfig::immediate());
    let row = |status: &str| {
        let mut r = horizon_weave::Row::new();
        r.insert("status".into(), Value::text(status));
        r
    };
    let table = TableValue::new("orders", "status").with_rows(vec![row("open")]).shared();
    weave.add_widget("orders", None, WidgetEntry::input(table.clone())).unwrap();
    weave.add_widget("close", None, WidgetEntry::layout()).unwrap();
    weave
        .attach_conditional_property(spec(
            "close",
            "disabled",
            json!({ "conditions": [{ "left": "=orders!status[0]", "comparator": "==", "right": "closed" }] }),
        ))
        .unwrap();
    assert!(weave.widget_state("close").unwrap().enabled);

    table.set_rows(vec![row("closed")]);
    assert!(!weave.widget_state("close").unwrap().enabled);
}

#[test]
fn test_broken_reference_does_not_affect_other_properties() {
    let (weave, inputs) = weave_with(WeaveConfig::immediate(), &[("A", "1")]);
    weave.add_widget("other", Some("form"), WidgetEntry::layout()).unwrap();
    weave.declare_conditional_property(spec(
        "target",
        "disabled",
        json!({ "conditions": [{ "left": "=gone", "comparator": "==", "right": "1" }] }),
    ));
    weave.declare_conditional_property(spec(
        "other",
        "disabled",
        json!({ "conditions": [{ "left": "=A", "comparator": "==", "right": "1" }] }),
    ));
    weave.declare_conditional_property(spec(
        "other",
        "hidden",
        json!({ "conditions": [{ "left": "=A", "comparator": "FUZZY", "right": "1" }] }),
    ));

    let failures = weave.bind_pending();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].widget, "target");

    // The unsupported comparator is registered but never produces an outcome.
    assert_eq!(weave.registrar().last_outcome("other", "hidden"), None);
    assert!(weave.widget_state("other").unwrap().visible);
    assert!(!weave.widget_state("other").unwrap().enabled);

    inputs[0].set_value(Value::text("0"));
    assert!(weave.widget_state("other").unwrap().enabled);
    assert!(weave.widget_state("target").unwrap().enabled);
}

#[test]
fn test_compose_contracts() {
    assert_eq!(
        HierarchicalDataComposer::compose("container", Vec::new()),
        RecordSet::new("container")
    );

    let a = RecordSet::new("a").with_rows(vec![[("x".to_string(), Value::Number(1.0))].into()]);
    let b = RecordSet::new("b").with_rows(vec![[("x".to_string(), Value::Number(2.0))].into()]);
    let composed = HierarchicalDataComposer::compose("container", [a, b]);
    assert_eq!(composed.object_id, "container");
    assert_eq!(composed.rows[0]["x"], Value::Number(2.0));
    assert_eq!(composed.to_json()["oId"], json!("container"));

    let skipped = HierarchicalDataComposer::compose_extracted("container", [DataExtraction::Unsupported]);
    assert_eq!(skipped, RecordSet::new("container"));
}

#[test]
fn test_collect_data_from_form() {
    let (weave, _) = weave_with(WeaveConfig::default(), &[("first", "Ada"), ("last", "Lovelace")]);
    let rs = weave.collect_data("form").unwrap();
    assert_eq!(
        rs.to_json(),
        json!({ "oId": "form", "rows": [{ "first": "Ada", "last": "Lovelace" }] })
    );
}

#[test]
fn test_reference_display_matches_declaration() {
    let reference = Reference::parse("=orders!status[0]").unwrap();
    assert!(reference.is_row_scoped());
    assert_eq!(reference.to_string(), "=orders!status[0]");
}
