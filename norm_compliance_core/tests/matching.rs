use norm_compliance_core::*;
use serde_json::json;

fn order_event() -> Event {
    Event::new("o1", 0, 1_000, "alice", "ship_order")
        .with_attr("case_id", "c-7")
        .with_attr("amount", 250i64)
        .with_attr("weight", 2.5)
        .with_attr("express", true)
}

fn cond(v: serde_json::Value) -> Condition {
    serde_json::from_value(v).unwrap()
}

#[test]
fn absent_attribute_never_matches() {
    let e = order_event();
    let b = Bindings::new();
    assert!(!matches(&Condition::equals(Field::attr("missing"), "x"), &e, &b));
    assert!(!matches(&cond(json!({"op": "range", "field": "missing", "min": 0})), &e, &b));
    assert!(!matches(&cond(json!({"op": "matches", "field": "missing", "pattern": ".*"})), &e, &b));
    assert!(!matches(&cond(json!({"op": "exists", "field": "missing"})), &e, &b));
    // Negation of a non-match is a match.
    assert!(matches(&Condition::negate(Condition::equals(Field::attr("missing"), "x")), &e, &b));
}

#[test]
fn equality_is_numeric_across_int_and_float() {
    let e = order_event();
    let b = Bindings::new();
    assert!(matches(&Condition::equals(Field::attr("amount"), 250.0), &e, &b));
    assert!(matches(&Condition::equals(Field::attr("express"), true), &e, &b));
    assert!(!matches(&Condition::equals(Field::attr("amount"), "250"), &e, &b));
    assert!(matches(
        &cond(json!({"op": "in", "field": "actor", "values": ["bob", "alice"]})),
        &e,
        &b
    ));
}

#[test]
fn range_bounds_are_inclusive() {
    let e = order_event();
    let b = Bindings::new();
    assert!(matches(&cond(json!({"op": "range", "field": "amount", "min": 250, "max": 250})), &e, &b));
    assert!(matches(&cond(json!({"op": "range", "field": "weight", "max": 2.5})), &e, &b));
    assert!(!matches(&cond(json!({"op": "range", "field": "weight", "min": 2.6})), &e, &b));
    assert!(!matches(&cond(json!({"op": "range", "field": "actor", "min": 0})), &e, &b));
}

#[test]
fn regex_and_boolean_composition() {
    let e = order_event();
    let c = cond(json!({
        "op": "all",
        "of": [
            {"op": "matches", "field": "action", "pattern": "^ship_"},
            {"op": "any", "of": [
                {"op": "eq", "field": "actor", "value": "bob"},
                {"op": "matches", "field": "case_id", "pattern": "c-\\d+"}
            ]}
        ]
    }));
    assert!(matches(&c, &e, &Bindings::new()));
    assert!(matches(&Condition::Always, &e, &Bindings::new()));
}

#[test]
fn invalid_regex_is_rejected_at_decode() {
    let res: Result<Condition, _> =
        serde_json::from_value(json!({"op": "matches", "field": "action", "pattern": "(unclosed"}));
    assert!(res.is_err());
}

#[test]
fn same_as_compares_against_bound_values() {
    let e = order_event();
    let bound = Bindings::new().with("case", "c-7").with(ACTOR_BINDING, "bob");
    assert!(matches(&Condition::same_as(Field::attr("case_id"), "case"), &e, &bound));
    assert!(!matches(&Condition::same_as(Field::Actor, ACTOR_BINDING), &e, &bound));
    // A binding that was never established is a non-match.
    assert!(!matches(&Condition::same_as(Field::Actor, "nobody"), &e, &bound));
}

#[test]
fn within_measures_from_the_trigger_time() {
    let e = order_event();
    assert!(matches(&Condition::within(1_000), &e, &Bindings::anchored(0)));
    assert!(!matches(&Condition::within(999), &e, &Bindings::anchored(0)));
    assert!(!matches(&Condition::within(10), &e, &Bindings::anchored(2_000)));
    assert!(!matches(&Condition::within(1_000), &e, &Bindings::new()));
}

#[test]
fn within_at_the_edges_of_the_timeline_does_not_overflow() {
    let late = Event::new("late", 0, i64::MAX, "a", "b");
    assert!(!matches(&Condition::within(10), &late, &Bindings::anchored(-5)));
    let early = Event::new("early", 0, i64::MIN, "a", "b");
    assert!(!matches(&Condition::within(10), &early, &Bindings::anchored(5)));
    assert!(matches(&Condition::within(0), &late, &Bindings::anchored(i64::MAX)));
}

#[test]
fn like_is_a_loose_action_match() {
    assert!(like("assemble_wheels", "assemble wheels"));
    assert!(like("Assemble-Wheels-Now", "assemble wheels"));
    assert!(like("wheels", "assemble wheels"));
    assert!(like("check_wheels", "assemble wheels"));
    assert!(!like("deck", "assemble wheels"));
    assert!(!like("anything", ""));

    let e = order_event();
    assert!(matches(&cond(json!({"op": "like", "field": "action", "text": "Ship Order"})), &e, &Bindings::new()));
}

#[test]
fn roles_are_inferred_from_actor_ids() {
    let roles = ["Reviewer", "Quality Inspector"];
    let m = infer_role("reviewer", &roles).unwrap();
    assert_eq!(m.confidence, RoleConfidence::Exact);

    let m = infer_role("Reviewer-2", &roles).unwrap();
    assert_eq!((m.role.as_str(), m.confidence), ("Reviewer", RoleConfidence::Substring));

    let m = infer_role("inspector_bot", &roles).unwrap();
    assert_eq!((m.role.as_str(), m.confidence), ("Quality Inspector", RoleConfidence::Partial));

    let m = infer_role("review", &roles).unwrap();
    assert_eq!(m.confidence, RoleConfidence::SubstringReverse);

    assert!(infer_role("courier", &roles).is_none());
}

#[test]
fn evidence_index_queries_by_window_and_proximity() {
    let log = EventLog::from_events(vec![
        Event::new("a", 0, 0, "x", "poll"),
        Event::new("b", 1, 10, "y", "poll"),
        Event::new("c", 2, 20, "x", "poll"),
        Event::new("d", 3, 30, "x", "push").with_attr("k", 1i64),
        Event::new("e", 4, 40, "x", "poll"),
    ]);
    let index = EvidenceIndex::build(&log);
    assert_eq!(index.len(), 5);
    assert_eq!(index.event("d").map(|e| e.timestamp), Some(30));

    let q = EvidenceQuery::new().actor("x").action("poll");
    let ids = |evs: Vec<&Event>| evs.into_iter().map(|e| e.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(index.query(&q, TimeWindow::ALL)), vec!["a", "c", "e"]);
    assert_eq!(ids(index.query(&q, TimeWindow::between(5, 20))), vec!["c"]);

    let one = Value::Int(1);
    let q = EvidenceQuery::new().attribute("k", &one);
    assert_eq!(ids(index.query(&q, TimeWindow::ALL)), vec!["d"]);

    let q = EvidenceQuery::new().actor("x");
    assert_eq!(ids(index.nearest(&q, (30, 3), 3, &["d"])), vec!["c", "e", "a"]);
}
