use norm_compliance_core::*;
use norm_compliance_supervisor::*;
use serde_json::json;

fn fixture_log() -> EventLog {
    let mut events = Vec::new();
    let mut seq = 0;
    for case in 0..6i64 {
        let t0 = case * 100;
        let actor = format!("agent_{case}");
        let id = |tag: &str| format!("{tag}-{case}");
        events.push(Event::new(id("req"), seq, t0, actor.as_str(), "request").with_attr("case_id", case));
        seq += 1;
        if case % 2 == 0 {
            events.push(Event::new(id("resp"), seq, t0 + 30, "desk", "respond").with_attr("case_id", case));
            seq += 1;
        }
        if case % 3 == 0 {
            events.push(Event::new(id("del"), seq, t0 + 40, actor.as_str(), "delete_record"));
            seq += 1;
        }
    }
    EventLog::from_events(events)
}

fn fixture_norms() -> NormSet {
    let mut specs = Vec::new();
    for i in 0..5 {
        specs.push(
            NormSpec::new(format!("ob-respond-{i}"), Modality::Obligation, Condition::action("request"))
                .bind("case", Field::attr("case_id"))
                .with_target(Condition::all(vec![
                    Condition::action("respond"),
                    Condition::same_as(Field::attr("case_id"), "case"),
                ]))
                .with_deadline(Deadline::AfterMs(50 + i * 10)),
        );
    }
    specs.push(
        NormSpec::new("pr-delete", Modality::Prohibition, Condition::action("request")).with_target(
            Condition::all(vec![
                Condition::action("delete_record"),
                Condition::same_as(Field::Actor, ACTOR_BINDING),
            ]),
        ),
    );
    specs.push(
        NormSpec::new("ob-bad", Modality::Obligation, Condition::action("request"))
            .with_target(Condition::same_as(Field::Actor, "owner")),
    );
    NormSet::load(specs).unwrap()
}

#[test]
fn report_is_identical_for_any_shard_count() {
    let log = fixture_log();
    let norms = fixture_norms();
    let baseline = evaluate(&log, &norms, &EngineCfg::default()).unwrap().to_json().unwrap();

    for shards in [1, 2, 3, 4, 7, 16] {
        let sup = ComplianceSupervisor::new(shards, EngineCfg::default());
        let report = sup.evaluate(&log, &norms).unwrap();
        assert_eq!(report.to_json().unwrap(), baseline, "shards = {shards}");
    }
}

#[test]
fn plan_covers_every_norm_once() {
    let norms = fixture_norms();
    let sup = ComplianceSupervisor::new(3, EngineCfg::default());
    assert_eq!(sup.shards(), 3);

    let plan = sup.plan(&norms);
    assert_eq!(plan.len(), 3);
    let mut all: Vec<usize> = plan.iter().flatten().copied().collect();
    all.sort();
    assert_eq!(all, (0..norms.len()).collect::<Vec<_>>());
    assert_eq!(plan, sup.plan(&norms));

    assert_eq!(ComplianceSupervisor::new(0, EngineCfg::default()).shards(), 1);
}

#[test]
fn sharded_run_keeps_skip_markers_and_fails_without_norms() {
    let sup = ComplianceSupervisor::new(4, EngineCfg::default());
    let report = sup.evaluate(&fixture_log(), &fixture_norms()).unwrap();
    let skipped: Vec<_> = report.skipped().map(|s| s.norm_id()).collect();
    assert_eq!(skipped, vec!["ob-bad"]);
    assert_eq!(report.norms.len(), 7);

    let violations: Vec<_> = report
        .violations()
        .filter(|v| v.norm_id == "pr-delete")
        .map(|v| v.resolving_event_id.clone())
        .collect();
    assert_eq!(violations, vec![Some("del-0".to_string()), Some("del-3".to_string())]);

    assert!(matches!(
        sup.evaluate(&fixture_log(), &NormSet::default()),
        Err(EngineError::NoNorms)
    ));
}

#[test]
fn run_documents_accepts_aliased_records() {
    let events = json!({
        "entries": [
            {"entry_id": 1, "agent_id": "clerk_a", "activity": "request",
             "time": "2024-03-01 09:00:00", "metadata": {"case_id": "K-1"}},
            {"event_id": "2", "agent": "desk", "event": "respond",
             "datetime": "2024-03-01T09:00:30Z", "case_id": "K-1", "channel": "email"},
            {"id": "3", "actor": "clerk_b", "action": "request",
             "timestamp": "2024-03-01T09:01:00Z", "attributes": {"case_id": "K-2"}},
            {"id": "4", "actor": "nobody", "timestamp": "2024-03-01T09:02:00Z"},
            "not an object"
        ]
    })
    .to_string();
    let norms = json!([{
        "norm_id": "ob-respond",
        "norm_type": "obligation",
        "trigger": {"op": "eq", "field": "action", "value": "request"},
        "target": {"op": "all", "of": [
            {"op": "eq", "field": "action", "value": "respond"},
            {"op": "same_as", "field": "case_id", "binding": "case"}
        ]},
        "deadline": {"after_ms": 60000},
        "bind": [{"name": "case", "field": "case_id"}]
    }])
    .to_string();

    let sup = ComplianceSupervisor::new(2, EngineCfg::default());
    let report = sup
        .run_documents(&BasicRecordNormalizer::default(), &events, &norms)
        .unwrap();

    assert_eq!(report.temporal_mode, TemporalMode::Timestamp);
    let got: Vec<_> = report
        .results
        .iter()
        .map(|v| (v.trigger_event_id.as_str(), v.outcome, v.resolving_event_id.as_deref()))
        .collect();
    assert_eq!(
        got,
        vec![("1", Outcome::Fulfilled, Some("2")), ("3", Outcome::Violated, None)]
    );

    let dropped: Vec<_> = report.dropped_events.iter().map(|d| d.index).collect();
    assert_eq!(dropped, vec![3, 4]);
    assert_eq!(report.summary.dropped_events, 2);
}

#[test]
fn basic_normalizer_moves_extras_into_attributes() {
    let n = BasicRecordNormalizer::default();
    let raw = n.normalize(&json!({
        "id": "x", "agent": "a", "activity": "go", "seq": "4",
        "priority": 2, "metadata": {"priority": 9, "site": "north"}
    }));

    assert_eq!(raw.id.as_deref(), Some("x"));
    assert_eq!(raw.actor.as_deref(), Some("a"));
    assert_eq!(raw.action.as_deref(), Some("go"));
    assert_eq!(raw.sequence, Some(4));
    assert_eq!(raw.timestamp, None);
    assert_eq!(raw.attributes.get("priority"), Some(&json!(2)));
    assert_eq!(raw.attributes.get("site"), Some(&json!("north")));
    assert!(!raw.attributes.contains_key("metadata"));
}
