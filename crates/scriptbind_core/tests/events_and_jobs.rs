//! Events, subcalls and the job surface.

use std::sync::{Arc, Mutex};

use scriptbind_core::{Bridge, GlueError, GlueHandle, ScriptRef};
use scriptbind_host::mock::MockHost;
use scriptbind_host::HostError;
use scriptbind_value::{Node, ReplyCell, ScriptValue, TableKey};

fn table(pairs: &[(&str, ScriptValue)]) -> ScriptValue {
    ScriptValue::Table(
        pairs
            .iter()
            .map(|(key, value)| (TableKey::Str((*key).to_owned()), value.clone()))
            .collect(),
    )
}

fn setup() -> (MockHost, Arc<Bridge>, GlueHandle) {
    let host = MockHost::new();
    let bridge = Arc::new(Bridge::new(Arc::new(host.clone())));
    let api = bridge
        .api_add(&table(&[("uid", "demo".into())]), None)
        .unwrap();
    (host, bridge, api)
}

#[test]
fn pushed_payloads_reach_the_host_event() {
    let (host, bridge, api) = setup();
    let event = bridge.event_new(&api, "status").unwrap();
    bridge
        .event_push(&event, &[ScriptValue::str("ready")])
        .unwrap();

    let pushed = host.event(0).pushed();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0], vec![ReplyCell::Node(Node::Str("ready".to_owned()))]);
}

#[test]
fn defunct_event_rejects_pushes() {
    let (host, bridge, api) = setup();
    let event = bridge.event_new(&api, "status").unwrap();
    host.event(0).invalidate();
    assert!(matches!(
        bridge.event_push(&event, &[]),
        Err(GlueError::DefunctEvent)
    ));
}

#[test]
fn subscription_round_trip_from_a_verb_callback() {
    let (host, bridge, api) = setup();
    let event = bridge.event_new(&api, "status").unwrap();
    let inner = Arc::clone(&bridge);
    let subject = event.clone();
    bridge
        .verb_add(
            &api,
            &table(&[("uid", "watch".into())]),
            ScriptRef::new("onWatch", move |_, args| {
                let request = GlueHandle::from_value(&args[0]).unwrap();
                inner.event_subscribe(&request, &subject).unwrap();
                Ok(vec![ScriptValue::Int(0)])
            }),
            ScriptValue::Nil,
        )
        .unwrap();

    let request = host.dispatch_verb("demo", "watch", vec![]).unwrap();
    assert_eq!(request.subscriptions(), vec!["demo/status".to_owned()]);
}

#[test]
fn handler_receives_name_payload_and_context() {
    let (host, bridge, api) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bridge
        .event_handler(
            &api,
            &table(&[
                ("uid", "watcher".into()),
                ("pattern", "monitor/*".into()),
            ]),
            ScriptRef::new("onEvent", move |_, args| {
                sink.lock().unwrap().push(args);
                Ok(vec![])
            }),
            ScriptValue::str("ctx"),
        )
        .unwrap();

    let hit = host.deliver_event(
        "demo",
        "monitor/disconnected",
        vec![ReplyCell::Str("gone".to_owned())],
    );
    assert_eq!(hit, 1);
    assert_eq!(host.deliver_event("demo", "other/thing", vec![]), 0);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let args = &seen[0];
    assert!(matches!(args[0], ScriptValue::Opaque(_)));
    assert_eq!(args[1], ScriptValue::str("monitor/disconnected"));
    assert_eq!(args[2], ScriptValue::str("gone"));
    assert_eq!(args[3], ScriptValue::str("ctx"));
}

#[test]
fn call_sync_returns_status_and_decoded_replies() {
    let (host, bridge, _api) = setup();
    host.set_call_result(
        "clock",
        "now",
        0,
        vec![ReplyCell::I64(1_693_000_000), ReplyCell::Str("utc".to_owned())],
    );

    let (status, values) = bridge
        .call_sync(&bridge.handle(), "clock", "now", &[])
        .unwrap();
    assert_eq!(status, 0);
    assert_eq!(
        values,
        vec![ScriptValue::Int(1_693_000_000), ScriptValue::str("utc")]
    );
}

#[test]
fn call_sync_surfaces_refusals_as_errors() {
    let (host, bridge, _api) = setup();
    host.set_call_refusal("clock", "now", HostError::new(-5, "no such api"));

    let error = bridge
        .call_sync(&bridge.handle(), "clock", "now", &[])
        .unwrap_err();
    match error {
        GlueError::Host(refusal) => assert_eq!(refusal.status, -5),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn call_sync_caps_the_reply_count() {
    let (host, bridge, _api) = setup();
    host.set_call_result(
        "bulk",
        "list",
        0,
        (0..12).map(ReplyCell::I64).collect(),
    );

    let (_, values) = bridge
        .call_sync(&bridge.handle(), "bulk", "list", &[])
        .unwrap();
    assert_eq!(values.len(), 8);
}

#[test]
fn call_async_delivers_status_replies_and_context() {
    let (host, bridge, api) = setup();
    host.set_call_result("clock", "now", 0, vec![ReplyCell::Str("noon".to_owned())]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bridge
        .call_async(
            &api,
            "clock",
            "now",
            &[],
            ScriptRef::new("onReply", move |thread, args| {
                assert!(thread.parent().is_some());
                sink.lock().unwrap().push(args);
                Ok(vec![])
            }),
            ScriptValue::str("ctx"),
        )
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let args = &seen[0];
    assert_eq!(args.len(), 4);
    assert!(matches!(args[0], ScriptValue::Opaque(_)));
    assert_eq!(args[1], ScriptValue::Int(0));
    assert_eq!(args[2], ScriptValue::str("noon"));
    assert_eq!(args[3], ScriptValue::str("ctx"));
}

#[test]
fn refused_async_call_delivers_no_payload() {
    let (host, bridge, _api) = setup();
    host.set_call_refusal("clock", "now", HostError::new(-5, "no such api"));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bridge
        .call_async(
            &bridge.handle(),
            "clock",
            "now",
            &[],
            ScriptRef::new("onReply", move |_, args| {
                sink.lock().unwrap().push(args);
                Ok(vec![])
            }),
            ScriptValue::str("ctx"),
        )
        .unwrap();

    let seen = seen.lock().unwrap();
    let args = &seen[0];
    assert_eq!(args.len(), 3);
    assert_eq!(args[1], ScriptValue::Int(-5));
    assert_eq!(args[2], ScriptValue::str("ctx"));
}

#[test]
fn posted_job_runs_with_handle_and_context() {
    let (host, bridge, _api) = setup();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let job = bridge
        .job_post(
            &bridge.handle(),
            50,
            ScriptRef::new("onJob", move |_, args| {
                sink.lock().unwrap().push(args);
                Ok(vec![])
            }),
            ScriptValue::str("deferred"),
        )
        .unwrap();

    drop(job);
    assert!(seen.lock().unwrap().is_empty());
    assert!(host.run_job(scriptbind_host::JobId(1)));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0][1], ScriptValue::str("deferred"));
}

#[test]
fn cancelled_job_never_runs() {
    let (host, bridge, _api) = setup();
    let job = bridge
        .job_post(
            &bridge.handle(),
            50,
            ScriptRef::new("onJob", |_, _| panic!("job ran after cancel")),
            ScriptValue::Nil,
        )
        .unwrap();
    bridge.job_cancel(&job).unwrap();
    assert!(!host.run_job(scriptbind_host::JobId(1)));
    assert!(bridge.job_cancel(&job).is_err());
}

#[test]
fn job_start_returns_the_killed_status() {
    let (_host, bridge, _api) = setup();
    let inner = Arc::clone(&bridge);
    let status = bridge
        .job_start(
            &bridge.handle(),
            100,
            ScriptRef::new("onLock", move |_, args| {
                let lock = GlueHandle::from_value(&args[0]).unwrap();
                inner.job_kill(&lock, 42).unwrap();
                Ok(vec![])
            }),
            ScriptValue::Nil,
        )
        .unwrap();
    assert_eq!(status, 42);
}

#[test]
fn job_start_times_out_when_never_killed() {
    let (_host, bridge, _api) = setup();
    let outcome = bridge.job_start(
        &bridge.handle(),
        10,
        ScriptRef::new("onLock", |_, _| Ok(vec![])),
        ScriptValue::Nil,
    );
    assert!(matches!(outcome, Err(GlueError::Host(_))));
}

#[test]
fn failing_wait_callback_resumes_with_minus_one() {
    let (_host, bridge, _api) = setup();
    let status = bridge
        .job_start(
            &bridge.handle(),
            10,
            ScriptRef::new("onLock", |_, _| {
                Err(scriptbind_core::ScriptError::msg("lock setup failed"))
            }),
            ScriptValue::Nil,
        )
        .unwrap();
    assert_eq!(status, -1);
}

#[test]
fn scoped_handles_resolve_their_creating_api() {
    let (_host, bridge, api) = setup();
    let timer = bridge
        .timer_new(
            &api,
            &table(&[("uid", "tick".into()), ("period", ScriptValue::Int(10))]),
            ScriptRef::new("onTick", |_, _| Ok(vec![ScriptValue::Int(0)])),
            ScriptValue::Nil,
        )
        .unwrap();
    let owner = timer.owning_api().unwrap();
    assert_eq!(
        bridge.config_of(&owner, Some("uid")).unwrap().as_str(),
        Some("demo")
    );

    let job = bridge
        .job_post(
            &api,
            50,
            ScriptRef::new("onJob", |_, _| Ok(vec![])),
            ScriptValue::Nil,
        )
        .unwrap();
    assert!(job.owning_api().is_some());
    // The binder scopes the whole process, not one api.
    assert!(bridge.handle().owning_api().is_none());
}

#[test]
fn event_and_job_handles_scope_subcalls() {
    let (host, bridge, api) = setup();
    host.set_call_result("clock", "now", 0, vec![ReplyCell::I64(7)]);

    let event = bridge.event_new(&api, "status").unwrap();
    let (status, values) = bridge.call_sync(&event, "clock", "now", &[]).unwrap();
    assert_eq!(status, 0);
    assert_eq!(values, vec![ScriptValue::Int(7)]);

    let job = bridge
        .job_post(
            &api,
            0,
            ScriptRef::new("onJob", |_, _| Ok(vec![])),
            ScriptValue::Nil,
        )
        .unwrap();
    let (status, _) = bridge.call_sync(&job, "clock", "now", &[]).unwrap();
    assert_eq!(status, 0);
}

#[test]
fn second_kill_cannot_alter_the_recorded_status() {
    let (_host, bridge, _api) = setup();
    let inner = Arc::clone(&bridge);
    let status = bridge
        .job_start(
            &bridge.handle(),
            100,
            ScriptRef::new("onLock", move |_, args| {
                let lock = GlueHandle::from_value(&args[0]).unwrap();
                inner.job_kill(&lock, 42).unwrap();
                assert!(inner.job_kill(&lock, 7).is_err());
                Ok(vec![])
            }),
            ScriptValue::Nil,
        )
        .unwrap();
    assert_eq!(status, 42);
}
