use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tessera_statemachine::{
    Callback, Definition, DefinitionBuilder, EventDesc, EventRecord, FsmError, StateMachine,
};

fn deal_events() -> Vec<EventDesc> {
    vec![
        EventDesc::new("validate", &["new"], "validating"),
        EventDesc::new("transfer", &["validating"], "transferring"),
        EventDesc::new("verify", &["transferring"], "verifying"),
        EventDesc::new("publish", &["verifying"], "publishing"),
        EventDesc::new("seal", &["publishing"], "sealing"),
        EventDesc::new("finish", &["sealing"], "complete"),
        EventDesc::new(
            "fail",
            &[
                "new",
                "validating",
                "transferring",
                "verifying",
                "publishing",
                "sealing",
            ],
            "failed",
        ),
    ]
}

#[test]
fn test_deal_lifecycle_walks_every_stage() {
    let definition = Arc::new(Definition::new("new".into(), deal_events(), HashMap::new()));
    let mut machine = StateMachine::new(definition);

    for event in ["validate", "transfer", "verify", "publish", "seal", "finish"] {
        machine.fire(event, vec![]).unwrap();
    }
    assert!(machine.is(&"complete".into()));

    // terminal: nothing fires from complete
    assert!(machine.available_transitions().is_empty());
    assert!(matches!(
        machine.fire("fail", vec![]),
        Err(FsmError::InappropriateEvent { .. })
    ));
}

#[test]
fn test_fail_reachable_from_every_live_stage() {
    let definition = Arc::new(Definition::new("new".into(), deal_events(), HashMap::new()));

    let advancing = ["validate", "transfer", "verify", "publish", "seal"];
    for stop_after in 0..=advancing.len() {
        let mut machine = StateMachine::new(definition.clone());
        for event in &advancing[..stop_after] {
            machine.fire(*event, vec![]).unwrap();
        }
        machine.fire("fail", vec![]).unwrap();
        assert!(machine.is(&"failed".into()));
    }
}

#[test]
fn test_string_keyed_and_builder_definitions_agree() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let recording = |log: Arc<Mutex<Vec<String>>>, tag: &str| -> Callback {
        let tag = tag.to_string();
        Arc::new(move |_: &mut EventRecord| log.lock().unwrap().push(tag.clone()))
    };

    let mut callbacks: HashMap<String, Callback> = HashMap::new();
    callbacks.insert("enter_validating".into(), recording(log.clone(), "enter"));
    callbacks.insert("validate".into(), recording(log.clone(), "after-shorthand"));
    callbacks.insert("leave_state".into(), recording(log.clone(), "leave-any"));
    let string_keyed = Definition::new("new".into(), deal_events(), callbacks);

    let mut machine = StateMachine::new(Arc::new(string_keyed));
    machine.fire("validate", vec![]).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["leave-any", "enter", "after-shorthand"]
    );

    log.lock().unwrap().clear();
    let built = DefinitionBuilder::new("new")
        .event("validate", &["new"], "validating")
        .on_enter_state("validating", recording(log.clone(), "enter"))
        .on_after_event("validate", recording(log.clone(), "after-shorthand"))
        .leave_any_state(recording(log.clone(), "leave-any"))
        .build();
    let mut machine = StateMachine::new(Arc::new(built));
    machine.fire("validate", vec![]).unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec!["leave-any", "enter", "after-shorthand"]
    );
}

#[test]
fn test_event_args_reach_callbacks() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_inner = seen.clone();
    let definition = DefinitionBuilder::new("new")
        .event("validate", &["new"], "validating")
        .after_any_event(Arc::new(move |record: &mut EventRecord| {
            seen_inner.lock().unwrap().extend(record.args.clone());
        }))
        .build();

    let mut machine = StateMachine::new(Arc::new(definition));
    machine
        .fire("validate", vec![serde_json::json!({"height": 42})])
        .unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
}
