use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use monitorkit::event::{ChangedValue, EventType, ParameterChangeEvent};
use monitorkit::monitor::{Monitor, ParamValueMatcher};
use monitorkit::registry::{CachedValue, RecordKind, SubscriptionRecord};
use monitorkit::{
    ConnectionHandle, EventHandler, EventPayload, InProcessConnection, ParamId, ParamValue, SubscriptionFilter,
    SubscriptionRegistry,
};

fn registry() -> (Arc<InProcessConnection>, Arc<SubscriptionRegistry>) {
    let conn = InProcessConnection::inline();
    let handle: ConnectionHandle = conn.clone();
    (conn, Arc::new(SubscriptionRegistry::new(handle)))
}

fn value_change(param: ParamId, value: i64) -> EventPayload {
    EventPayload::ParameterChange(ParameterChangeEvent {
        param,
        row_key: None,
        value: ChangedValue::Single(ParamValue::Int(value)),
        alarm_level: None,
    })
}

fn bench_dedup_gate(c: &mut Criterion) {
    let (_conn, registry) = registry();
    let record = SubscriptionRecord::new(
        "R",
        RecordKind::Normal,
        None,
        vec![SubscriptionFilter::any(EventType::ParameterChange)],
        EventHandler::new(|_, _| {}),
    );
    registry.create("S", record, false).unwrap();

    let mut group = c.benchmark_group("dedup");
    group.bench_function("unchanged", |b| {
        let value = CachedValue::Value(ParamValue::Int(1));
        b.iter(|| registry.replace_if_different("S", "R", "Result", value.clone()));
    });
    group.bench_function("alternating", |b| {
        let mut n = 0i64;
        b.iter(|| {
            n += 1;
            registry.replace_if_different("S", "R", "Result", CachedValue::Value(ParamValue::Int(n % 2)))
        });
    });
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let param = ParamId::new(7, 12, 500);
    let mut group = c.benchmark_group("fan_out");

    for monitors in [1usize, 16, 128] {
        let (conn, registry) = registry();
        let delivered = Arc::new(AtomicU64::new(0));
        for i in 0..monitors {
            let counter = Arc::clone(&delivered);
            Monitor::new(
                Arc::clone(&registry),
                format!("source-{i}").as_str(),
                ParamValueMatcher::<i64>::new(param).unwrap(),
            )
            .start(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        }

        group.throughput(Throughput::Elements(monitors as u64));
        group.bench_with_input(BenchmarkId::from_parameter(monitors), &monitors, |b, _| {
            let mut n = 0i64;
            b.iter(|| {
                n += 1;
                conn.publish(value_change(param, n)).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_dedup_gate, bench_fan_out);
criterion_main!(benches);
