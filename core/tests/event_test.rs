use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use engramic_core::event::{MessageBus, Topic};
use engramic_core::EngramError;
use serde_json::json;

fn start_bus() -> (Arc<MessageBus>, tokio::runtime::Runtime) {
    let bus = Arc::new(MessageBus::new());
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let worker = bus.take_worker().expect("worker not yet taken");
    rt.spawn(worker);
    (bus, rt)
}

#[test]
fn subscribe_and_publish_basic() {
    let (bus, _rt) = start_bus();
    let (tx, rx) = mpsc::channel();

    bus.subscribe(Topic::Status, "test", move |payload| {
        tx.send(payload).unwrap();
        Ok(())
    });

    bus.publish(Topic::Status, json!({ "id": "s1" }));

    let received = rx.recv_timeout(Duration::from_secs(5)).expect("delivery");
    assert_eq!(received["id"], "s1");
}

#[test]
fn publish_order_is_preserved_per_topic() {
    let (bus, _rt) = start_bus();
    let (tx, rx) = mpsc::channel();

    bus.subscribe(Topic::Status, "test", move |payload| {
        tx.send(payload["n"].as_u64().unwrap()).unwrap();
        Ok(())
    });

    for n in 0..50u64 {
        bus.publish(Topic::Status, json!({ "n": n }));
    }

    let mut received = Vec::new();
    for _ in 0..50 {
        received.push(rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }
    assert_eq!(received, (0..50).collect::<Vec<_>>());
}

#[test]
fn failing_handler_is_contained_and_stays_subscribed() {
    let (bus, _rt) = start_bus();
    let failures = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    {
        let failures = Arc::clone(&failures);
        bus.subscribe(Topic::Acknowledge, "broken", move |_payload| {
            failures.fetch_add(1, Ordering::SeqCst);
            Err(EngramError::Backend("boom".to_string()))
        });
    }
    bus.subscribe(Topic::Acknowledge, "healthy", move |payload| {
        tx.send(payload).unwrap();
        Ok(())
    });

    bus.publish(Topic::Acknowledge, json!({}));
    bus.publish(Topic::Acknowledge, json!({}));

    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // The broken handler kept receiving after its first error.
    assert_eq!(failures.load(Ordering::SeqCst), 2);
    let stats = bus.stats(Topic::Acknowledge).unwrap();
    assert_eq!(stats.handler_errors, 2);
    assert_eq!(stats.total_delivered, 2);
}

#[test]
fn multiple_subscribers_all_receive() {
    let (bus, _rt) = start_bus();
    let (tx1, rx1) = mpsc::channel();
    let (tx2, rx2) = mpsc::channel();

    bus.subscribe(Topic::Status, "one", move |p| {
        tx1.send(p).unwrap();
        Ok(())
    });
    bus.subscribe(Topic::Status, "two", move |p| {
        tx2.send(p).unwrap();
        Ok(())
    });

    bus.publish(Topic::Status, json!({ "id": "fanout" }));

    assert_eq!(
        rx1.recv_timeout(Duration::from_secs(5)).unwrap()["id"],
        "fanout"
    );
    assert_eq!(
        rx2.recv_timeout(Duration::from_secs(5)).unwrap()["id"],
        "fanout"
    );
}

#[test]
fn stats_track_published_without_subscribers() {
    let (bus, _rt) = start_bus();

    bus.publish(Topic::StartProfiler, json!({}));

    let stats = bus.stats(Topic::StartProfiler).unwrap();
    assert_eq!(stats.total_published, 1);
    assert_eq!(stats.total_delivered, 0);
}

#[test]
fn shutdown_drains_already_queued_events() {
    let bus = Arc::new(MessageBus::new());
    let (tx, rx) = mpsc::channel();

    bus.subscribe(Topic::Status, "late", move |payload| {
        tx.send(payload).unwrap();
        Ok(())
    });

    // Queue before the worker even starts, then close the intake.
    for n in 0..5 {
        bus.publish(Topic::Status, json!({ "n": n }));
    }
    bus.shutdown();
    bus.publish(Topic::Status, json!({ "n": 99 }));

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let worker = bus.take_worker().unwrap();
    rt.block_on(worker);

    let mut received = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        received.push(payload["n"].as_u64().unwrap());
    }
    assert_eq!(received, vec![0, 1, 2, 3, 4]);
}
