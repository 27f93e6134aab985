use std::sync::{Arc, Mutex};

use serde_json::json;

use super::event_types::{ResourceDeleted, RESOURCE_DELETED};
use super::{EventBus, HandlerError, PublishReport};

fn recorder() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

#[test]
fn handlers_run_in_registration_order() {
    let bus = EventBus::new();
    let log = recorder();

    for label in ["first", "second", "third"] {
        let log = log.clone();
        bus.subscribe("thing.happened", move |_| {
            log.lock().unwrap().push(label.to_string());
            Ok(())
        });
    }

    let report = bus.publish("thing.happened", json!({}));
    assert_eq!(
        report,
        PublishReport {
            delivered: 3,
            failed: 0
        }
    );
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[test]
fn failing_and_panicking_handlers_do_not_block_others() {
    let bus = EventBus::new();
    let log = recorder();

    bus.subscribe("x", |_| Err(HandlerError::new("nope")));
    bus.subscribe("x", |_| panic!("handler exploded"));
    let tail = log.clone();
    bus.subscribe("x", move |event| {
        tail.lock().unwrap().push(event.name.clone());
        Ok(())
    });

    let report = bus.publish("x", json!({ "n": 1 }));
    assert_eq!(report.delivered, 1);
    assert_eq!(report.failed, 2);
    assert_eq!(*log.lock().unwrap(), vec!["x"]);

    // The registry survives a panicking handler.
    assert_eq!(bus.handler_count("x"), 3);
}

#[test]
fn events_only_reach_matching_names() {
    let bus = EventBus::new();
    let log = recorder();
    let other = log.clone();
    bus.subscribe("other.event", move |_| {
        other.lock().unwrap().push("other".to_string());
        Ok(())
    });

    let report = bus.publish(RESOURCE_DELETED, json!({}));
    assert_eq!(report, PublishReport::default());
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn unsubscribe_removes_only_that_handler() {
    let bus = EventBus::new();
    let first = bus.subscribe("x", |_| Ok(()));
    let _second = bus.subscribe("x", |_| Ok(()));

    assert!(bus.unsubscribe(first));
    assert!(!bus.unsubscribe(first));
    assert_eq!(bus.handler_count("x"), 1);
}

#[test]
fn handler_can_publish_reentrantly() {
    let bus = Arc::new(EventBus::new());
    let log = recorder();

    let inner = log.clone();
    bus.subscribe("inner", move |_| {
        inner.lock().unwrap().push("inner".to_string());
        Ok(())
    });
    let weak = Arc::downgrade(&bus);
    bus.subscribe("outer", move |_| {
        if let Some(bus) = weak.upgrade() {
            bus.publish("inner", json!(null));
        }
        Ok(())
    });

    bus.publish("outer", json!(null));
    assert_eq!(*log.lock().unwrap(), vec!["inner"]);
}

#[test]
fn typed_payload_round_trips_through_emit() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    bus.subscribe(RESOURCE_DELETED, move |event| {
        let body: ResourceDeleted = event.payload_as()?;
        *sink.lock().unwrap() = Some(body);
        Ok(())
    });

    let body = ResourceDeleted {
        resource_id: "r-1".to_string(),
        title: "Dune".to_string(),
    };
    let report = bus.emit(RESOURCE_DELETED, &body);
    assert_eq!(report.delivered, 1);
    assert_eq!(seen.lock().unwrap().clone(), Some(body));

    // Malformed payloads surface as handler failures.
    let report = bus.publish(RESOURCE_DELETED, json!({ "resource_id": 7 }));
    assert_eq!(report.failed, 1);
}
