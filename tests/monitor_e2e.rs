use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use monitorkit::event::{
    ChangedValue, ElementInfoEvent, ElementStateEvent, ParameterChangeEvent, TableUpdateEvent,
};
use monitorkit::monitor::{
    AlarmLevelMatcher, AlarmTarget, CellValueMatcher, ElementNameMatcher, ElementStateMatcher, Monitor,
    ParamValueMatcher, TableMatcher,
};
use monitorkit::{
    AlarmLevel, CellId, Connection, ConnectionHandle, ElementId, ElementState, EventHandler, EventPayload,
    EventType, InProcessConfig, InProcessConnection, ParamId, ParamValue, ResourceRef, SubscriptionFilter,
    SubscriptionRegistry, SubscriptionSetId, TableRow,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn inline_registry() -> (Arc<InProcessConnection>, Arc<SubscriptionRegistry>) {
    init_tracing();
    let conn = InProcessConnection::inline();
    let handle: ConnectionHandle = conn.clone();
    (conn, Arc::new(SubscriptionRegistry::new(handle)))
}

fn value_change(param: ParamId, value: impl Into<ParamValue>) -> EventPayload {
    EventPayload::ParameterChange(ParameterChangeEvent {
        param,
        row_key: None,
        value: ChangedValue::Single(value.into()),
        alarm_level: None,
    })
}

fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Arc<Mutex<Vec<T>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    (Arc::clone(&seen), seen)
}

#[test]
fn scalar_value_repeats_are_suppressed() {
    let (conn, registry) = inline_registry();
    let param = ParamId::new(7, 12, 500);
    let (sink, seen) = collector();

    let monitor = Monitor::new(
        Arc::clone(&registry),
        "S",
        ParamValueMatcher::<i64>::new(param).unwrap(),
    );
    monitor
        .start(move |change| sink.lock().push((change.resource.clone(), change.value)))
        .unwrap();

    for v in [3, 3, 5] {
        conn.publish(value_change(param, v)).unwrap();
    }

    let resource = ResourceRef::Parameter(param);
    assert_eq!(*seen.lock(), vec![(resource.clone(), 3), (resource, 5)]);
}

#[test]
fn change_event_carries_scope_and_connection() {
    let (conn, registry) = inline_registry();
    let param = ParamId::new(7, 12, 500);
    let (sink, seen) = collector();

    let monitor = Monitor::new(registry, "dashboard", ParamValueMatcher::<f64>::new(param).unwrap());
    monitor
        .start(move |change| sink.lock().push((change.source_id.clone(), change.connection.clone())))
        .unwrap();
    conn.publish(value_change(param, 1.0)).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "dashboard");
    assert!(std::ptr::eq(
        Arc::as_ptr(&seen[0].1).cast::<()>(),
        Arc::as_ptr(&conn).cast::<()>()
    ));
}

#[test]
fn monitors_on_the_same_selection_share_a_record() {
    let (conn, registry) = inline_registry();
    let param = ParamId::new(7, 12, 500);
    let (first_sink, first) = collector();
    let (second_sink, second) = collector();

    let a = Monitor::new(Arc::clone(&registry), "S", ParamValueMatcher::<i64>::new(param).unwrap());
    let b = Monitor::new(Arc::clone(&registry), "S", ParamValueMatcher::<i64>::new(param).unwrap());
    a.start(move |c| first_sink.lock().push(c.value)).unwrap();
    b.start(move |c| second_sink.lock().push(c.value)).unwrap();

    conn.publish(value_change(param, 1)).unwrap();
    assert!(first.lock().is_empty());
    assert_eq!(*second.lock(), vec![1]);
    assert_eq!(registry.normal_count("S"), 1);
}

#[test]
fn value_and_alarm_subscriptions_coexist() {
    let (conn, registry) = inline_registry();
    let param = ParamId::new(7, 12, 500);
    let (value_sink, values) = collector();
    let (alarm_sink, alarms) = collector();

    let value = Monitor::new(Arc::clone(&registry), "S", ParamValueMatcher::<i64>::new(param).unwrap());
    let alarm = Monitor::new(
        Arc::clone(&registry),
        "S",
        AlarmLevelMatcher::new(AlarmTarget::Parameter(param)).unwrap(),
    );
    value.start(move |c| value_sink.lock().push(c.value)).unwrap();
    alarm.start(move |c| alarm_sink.lock().push(c.value)).unwrap();

    for (v, level) in [(1, AlarmLevel::Normal), (80, AlarmLevel::Major), (81, AlarmLevel::Major)] {
        conn.publish(EventPayload::ParameterChange(ParameterChangeEvent {
            param,
            row_key: None,
            value: ChangedValue::Single(ParamValue::Int(v)),
            alarm_level: Some(level),
        }))
        .unwrap();
    }

    assert_eq!(*values.lock(), vec![1, 80, 81]);
    assert_eq!(*alarms.lock(), vec![AlarmLevel::Normal, AlarmLevel::Major]);
    assert_eq!(registry.normal_count("S"), 2);
}

#[test]
fn state_and_name_monitors_follow_an_element() {
    let (conn, registry) = inline_registry();
    let element = ElementId::new(3, 40);
    let (state_sink, states) = collector();
    let (name_sink, names) = collector();

    Monitor::new(Arc::clone(&registry), "S", ElementStateMatcher::new(element))
        .start(move |c| state_sink.lock().push(c.value))
        .unwrap();
    Monitor::new(Arc::clone(&registry), "S", ElementNameMatcher::new(element))
        .start(move |c| name_sink.lock().push(c.value))
        .unwrap();

    conn.publish(EventPayload::ElementState(ElementStateEvent {
        element,
        state: ElementState::Active,
        startup_complete: false,
    }))
    .unwrap();
    conn.publish(EventPayload::ElementState(ElementStateEvent {
        element,
        state: ElementState::Active,
        startup_complete: true,
    }))
    .unwrap();
    conn.publish(EventPayload::ElementInfo(ElementInfoEvent {
        element,
        name: "Router".to_string(),
        state: ElementState::Active,
    }))
    .unwrap();

    assert_eq!(*states.lock(), vec![ElementState::Active]);
    assert_eq!(*names.lock(), vec!["Router".to_string()]);
}

#[test]
fn cell_and_table_monitors_see_the_same_update() {
    let (conn, registry) = inline_registry();
    let table = ParamId::new(7, 12, 1000);
    let cell = CellId::new(table, 1002, "r2").unwrap();
    let (cell_sink, cells) = collector();
    let (table_sink, tables) = collector();

    Monitor::new(Arc::clone(&registry), "S", CellValueMatcher::<String>::new(cell).unwrap())
        .start(move |c| cell_sink.lock().push(c.value))
        .unwrap();
    Monitor::new(Arc::clone(&registry), "S", TableMatcher::new(table).unwrap())
        .start(move |c| table_sink.lock().push(c.value))
        .unwrap();

    conn.publish(EventPayload::TableUpdate(TableUpdateEvent {
        table,
        full: true,
        updated: vec![
            TableRow::new("r1").with_cell(1002, "up"),
            TableRow::new("r2").with_cell(1002, "down"),
        ],
        deleted: vec![],
    }))
    .unwrap();
    conn.publish(EventPayload::TableUpdate(TableUpdateEvent {
        table,
        full: false,
        updated: vec![TableRow::new("r2").with_cell(1002, "up")],
        deleted: vec!["r1".to_string()],
    }))
    .unwrap();

    assert_eq!(*cells.lock(), vec!["down".to_string(), "up".to_string()]);
    let tables = tables.lock();
    assert_eq!(tables.len(), 2);
    assert!(tables[0].initial);
    assert_eq!(tables[0].added.len(), 2);
    assert_eq!(tables[1].updated, vec![TableRow::new("r2").with_cell(1002, "up")]);
    assert_eq!(tables[1].removed, vec!["r1".to_string()]);
}

#[test]
fn panicking_callback_does_not_break_other_scopes() {
    let (conn, registry) = inline_registry();
    let param = ParamId::new(1, 2, 3);
    let (sink, seen) = collector();

    Monitor::new(Arc::clone(&registry), "bad", ParamValueMatcher::<i64>::new(param).unwrap())
        .start(|_| panic!("callback failure"))
        .unwrap();
    Monitor::new(Arc::clone(&registry), "good", ParamValueMatcher::<i64>::new(param).unwrap())
        .start(move |c| sink.lock().push(c.value))
        .unwrap();

    conn.publish(value_change(param, 1)).unwrap();
    conn.publish(value_change(param, 2)).unwrap();

    assert_eq!(*seen.lock(), vec![1, 2]);
    assert_eq!(registry.normal_count("bad"), 1);
}

#[test]
fn unparseable_values_are_swallowed() {
    let (conn, registry) = inline_registry();
    let param = ParamId::new(1, 2, 3);
    let (sink, seen) = collector();

    Monitor::new(registry, "S", ParamValueMatcher::<bool>::new(param).unwrap())
        .start(move |c| sink.lock().push(c.value))
        .unwrap();

    conn.publish(value_change(param, "not a bool")).unwrap();
    conn.publish(value_change(param, true)).unwrap();

    assert_eq!(*seen.lock(), vec![true]);
}

#[test]
fn stream_receives_changes_from_worker_pool() {
    init_tracing();
    let conn = InProcessConnection::new(InProcessConfig {
        dispatch_workers: 2,
        queue_capacity: 64,
    })
    .unwrap();
    let handle: ConnectionHandle = conn.clone();
    let registry = Arc::new(SubscriptionRegistry::new(handle));

    let param = ParamId::new(7, 12, 500);
    let monitor = Monitor::new(Arc::clone(&registry), "S", ParamValueMatcher::<i64>::new(param).unwrap());
    let stream = monitor.start_stream(16).unwrap();

    conn.publish(value_change(param, 42)).unwrap();
    let change = stream.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(change.value, 42);
    assert_eq!(change.resource, ResourceRef::Parameter(param));

    stream.unsubscribe().unwrap();
    assert!(!registry.contains_scope("S"));
    conn.shutdown();
}

#[test]
fn restart_with_a_delivery_in_flight_reaches_only_the_new_callback() {
    init_tracing();
    let conn = InProcessConnection::new(InProcessConfig {
        dispatch_workers: 1,
        queue_capacity: 64,
    })
    .unwrap();
    let handle: ConnectionHandle = conn.clone();
    let registry = Arc::new(SubscriptionRegistry::new(handle));
    let param = ParamId::new(7, 12, 500);

    // Parks the only dispatch worker until released.
    let parking = ElementId::new(99, 99);
    let (parked_tx, parked_rx) = crossbeam_channel::bounded::<()>(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    let parker = EventHandler::new(move |_, _| {
        let _ = parked_tx.send(());
        let _ = release_rx.recv();
    });
    conn.subscribe(
        &parker,
        SubscriptionSetId::new(),
        &[SubscriptionFilter::element(EventType::ElementInfo, parking)],
    )
    .unwrap();

    let (old_sink, old_seen) = collector();
    let monitor = Monitor::new(Arc::clone(&registry), "S", ParamValueMatcher::<i64>::new(param).unwrap());
    monitor.start(move |c| old_sink.lock().push(c.value)).unwrap();

    conn.publish(EventPayload::ElementInfo(ElementInfoEvent {
        element: parking,
        name: "parking".to_string(),
        state: ElementState::Active,
    }))
    .unwrap();
    parked_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(conn.publish(value_change(param, 3)).unwrap(), 1);

    let (new_tx, new_rx) = crossbeam_channel::unbounded();
    monitor
        .start(move |c| {
            let _ = new_tx.send(c.value);
        })
        .unwrap();

    release_tx.send(()).unwrap();
    conn.publish(value_change(param, 3)).unwrap();

    assert_eq!(new_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
    assert!(old_seen.lock().is_empty());
    assert!(new_rx.try_recv().is_err());
    conn.shutdown();
}
