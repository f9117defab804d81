//! Virtual device attribute batching, alert/data handles, and the built-in
//! attribute-write and action handlers.

use std::sync::Arc;

use parking_lot::Mutex;

use edgelink::config::ClientConfig;
use edgelink::error::Error;
use edgelink::messaging::message::{Priority, Reliability, RequestMethod, RequestMessage, Severity};
use edgelink::value::{NamedValue, Value};

use super::support::{Harness, action_url, attributes_url, post, put};

// ── attribute batching ───────────────────────────────────────

#[test]
fn set_float_then_get_float_without_batch() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    dev.set_float("temperature", 21.5).unwrap();
    assert_eq!(dev.get_float("temperature"), Ok(21.5));
}

#[test]
fn batched_sets_produce_one_message() {
    let mut h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");

    dev.start_update();
    dev.set_float("temperature", 21.5).unwrap();
    dev.set_float("humidity", 40.0).unwrap();
    assert_eq!(h.dispatcher.len(), 0, "nothing is queued mid-update");
    dev.finish_update().unwrap();
    assert_eq!(h.dispatcher.len(), 1);

    let sent = h.drain();
    let data = sent[0].as_data().unwrap();
    assert_eq!(data.format, format!("{}:attributes", super::support::URN));
    assert_eq!(
        data.items,
        vec![
            NamedValue::new("temperature", Value::Number(21.5)),
            NamedValue::new("humidity", Value::Number(40.0)),
        ]
    );
    assert_eq!(sent[0].base.source, "dev-1");
    assert_eq!(sent[0].base.priority, Priority::Low);
    assert_eq!(sent[0].base.reliability, Reliability::BestEffort);
}

#[test]
fn unbatched_sets_produce_one_message_each() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    dev.set_float("temperature", 21.5).unwrap();
    dev.set_float("humidity", 40.0).unwrap();
    assert_eq!(h.dispatcher.len(), 2);
}

#[test]
fn repeated_set_in_batch_sends_latest_value_once() {
    let mut h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    dev.start_update();
    dev.set_float("temperature", 20.0).unwrap();
    dev.set_boolean("online", true).unwrap();
    dev.set_float("temperature", 22.0).unwrap();
    dev.finish_update().unwrap();

    let sent = h.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].as_data().unwrap().items,
        vec![
            NamedValue::new("temperature", Value::Number(22.0)),
            NamedValue::new("online", Value::Boolean(true)),
        ]
    );
}

#[test]
fn type_mismatch_is_rejected_during_batch() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    dev.start_update();
    assert_eq!(dev.set_string("temperature", "warm"), Err(Error::InvalidArgument));
    dev.finish_update().unwrap();
    assert_eq!(h.dispatcher.len(), 0);
}

#[test]
fn setter_reports_full_queue() {
    let h = Harness::paused(ClientConfig {
        queue_capacity: 1,
        ..ClientConfig::default()
    });
    let dev = h.device("dev-1");
    dev.set_float("temperature", 1.0).unwrap();
    assert_eq!(dev.set_float("temperature", 2.0), Err(Error::OutOfMemory));
    // The value is stored even though the message was rejected.
    assert_eq!(dev.get_float("temperature"), Ok(2.0));
}

#[test]
fn rejected_finish_update_can_be_retried() {
    let mut h = Harness::paused(ClientConfig {
        queue_capacity: 1,
        ..ClientConfig::default()
    });
    let dev = h.device("dev-1");
    dev.set_boolean("online", true).unwrap();

    dev.start_update();
    dev.set_float("temperature", 21.0).unwrap();
    dev.set_float("humidity", 40.0).unwrap();
    assert_eq!(dev.finish_update(), Err(Error::OutOfMemory));
    assert_eq!(h.drain().len(), 1);

    dev.finish_update().unwrap();
    let sent = h.drain();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[1].as_data().unwrap().items,
        vec![
            NamedValue::new("temperature", Value::Number(21.0)),
            NamedValue::new("humidity", Value::Number(40.0)),
        ]
    );
}

// ── alerts and data ──────────────────────────────────────────

#[test]
fn alert_requires_description() {
    let mut h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    let mut alert = dev.alert_handle("tooHot").unwrap();

    assert_eq!(alert.raise(), Err(Error::Fail));
    alert.set_string("description", "too hot").unwrap();
    alert.raise().unwrap();

    let sent = h.drain();
    assert_eq!(sent.len(), 1);
    let payload = sent[0].as_alert().unwrap();
    assert_eq!(payload.format, "urn:test:thermostat:tooHot");
    assert_eq!(payload.description, "Temperature above limit");
    assert_eq!(payload.severity, Severity::Significant);
    assert_eq!(sent[0].base.priority, Priority::High);
    assert_eq!(sent[0].base.reliability, Reliability::GuaranteedDelivery);
}

#[test]
fn alert_values_persist_but_required_fields_must_be_set_again() {
    let mut h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    let mut alert = dev.alert_handle("urn:test:thermostat:tooHot").unwrap();
    alert.set_severity(Severity::Critical);

    alert.set_string("description", "first").unwrap();
    alert.set_float("temp", 41.0).unwrap();
    alert.raise().unwrap();

    assert_eq!(alert.raise(), Err(Error::Fail));
    alert.set_string("description", "second").unwrap();
    alert.raise().unwrap();

    let sent = h.drain();
    assert_eq!(sent.len(), 2);
    let second = sent[1].as_alert().unwrap();
    assert_eq!(second.severity, Severity::Critical);
    assert_eq!(
        second.items,
        vec![
            NamedValue::new("description", Value::from("second")),
            NamedValue::new("temp", Value::Number(41.0)),
        ]
    );
}

#[test]
fn optional_only_alert_needs_a_new_value_per_raise() {
    let mut h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    let mut alert = dev.alert_handle("doorOpen").unwrap();

    assert_eq!(alert.raise(), Err(Error::Fail));
    assert_eq!(h.dispatcher.len(), 0);

    alert.set_string("note", "service hatch").unwrap();
    alert.raise().unwrap();
    assert_eq!(alert.raise(), Err(Error::Fail));

    let sent = h.drain();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].as_alert().unwrap().items,
        vec![NamedValue::new("note", Value::from("service hatch"))]
    );
}

#[test]
fn handles_check_format_kind() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    assert!(matches!(dev.alert_handle("reading"), Err(Error::InvalidArgument)));
    assert!(matches!(dev.data_handle("tooHot"), Err(Error::InvalidArgument)));
    assert!(matches!(dev.data_handle("nope"), Err(Error::InvalidArgument)));
}

#[test]
fn data_submit_includes_default_optional_fields() {
    let mut h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    let mut data = dev.data_handle("reading").unwrap();
    assert_eq!(data.set_float("value", 1.0), Err(Error::InvalidArgument));
    data.set_integer("value", 7).unwrap();
    data.submit().unwrap();

    let sent = h.drain();
    let payload = sent[0].as_data().unwrap();
    assert_eq!(payload.format, "urn:test:thermostat:reading");
    assert_eq!(
        payload.items,
        vec![
            NamedValue::new("value", Value::Integer(7)),
            NamedValue::new("unit", Value::from("C")),
        ]
    );
}

// ── delivery failures ────────────────────────────────────────

#[test]
fn attribute_error_callbacks_receive_failed_values() {
    let mut h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");

    let per_attribute = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&per_attribute);
    dev.attribute_set_on_error("temperature", move |ev| {
        sink.lock().push((ev.values.clone(), ev.error, ev.message.clone()));
    })
    .unwrap();
    let device_wide = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&device_wide);
    dev.set_on_error(move |ev| sink.lock().push(ev.values.len()));

    h.transport.fail_next_batch(Error::CannotAuthorize, "token expired");
    dev.start_update();
    dev.set_float("temperature", 30.0).unwrap();
    dev.set_float("humidity", 10.0).unwrap();
    dev.finish_update().unwrap();
    assert!(h.drain().is_empty());

    let per_attribute = per_attribute.lock();
    assert_eq!(per_attribute.len(), 1);
    assert_eq!(
        per_attribute[0],
        (
            vec![NamedValue::new("temperature", Value::Number(30.0))],
            Error::CannotAuthorize,
            "token expired".to_owned()
        )
    );
    assert_eq!(*device_wide.lock(), vec![2]);
}

#[test]
fn error_callback_on_unknown_attribute_is_rejected() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    assert_eq!(
        dev.attribute_set_on_error("nope", |_| {}),
        Err(Error::InvalidArgument)
    );
    assert_eq!(
        dev.attribute_set_on_change("nope", |_| {}),
        Err(Error::InvalidArgument)
    );
}

// ── inbound attribute writes and actions ─────────────────────

#[test]
fn server_write_updates_attributes_and_fires_callbacks() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    dev.attribute_set_on_change("setpoint", move |ev| {
        sink.lock().push(format!("attr:{}", ev.values[0].name));
    })
    .unwrap();
    let sink = Arc::clone(&changes);
    dev.set_on_change(move |ev| sink.lock().push(format!("device:{}", ev.values.len())));

    let resp = h.request(put(
        "dev-1",
        &attributes_url(),
        r#"{"setpoint": 19.5, "mode": "eco"}"#,
    ));
    assert_eq!(resp.status_code, 200);
    assert_eq!(dev.get_float("setpoint"), Ok(19.5));
    assert_eq!(dev.get_string("mode"), Ok("eco".to_owned()));
    assert_eq!(*changes.lock(), vec!["attr:setpoint", "device:2"]);
    // External changes are not echoed back to the server.
    assert_eq!(h.dispatcher.len(), 0);
}

#[test]
fn invalid_server_writes_are_rejected_without_side_effects() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");

    for body in [
        "not json",
        "[1, 2]",
        r#"{"setpoint": "warm"}"#,
        r#"{"temperature": 5.0}"#,
        r#"{"setpoint": 18.0, "unknown": 1}"#,
    ] {
        let resp = h.request(put("dev-1", &attributes_url(), body));
        assert_eq!(resp.status_code, 400, "body {body}");
    }
    assert_eq!(dev.get("setpoint"), Err(Error::Fail));

    let get = RequestMessage::new("dev-1", RequestMethod::Get, attributes_url());
    assert_eq!(h.request(get).status_code, 405);
}

#[test]
fn writes_for_another_endpoint_are_not_found() {
    let h = Harness::paused(ClientConfig::default());
    let _dev = h.device("dev-1");
    let resp = h.request(put("dev-2", &attributes_url(), r#"{"setpoint": 1.0}"#));
    assert_eq!(resp.status_code, 404);
}

#[test]
fn action_callback_receives_argument() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    dev.set_action_callback("reboot", move |d, arg| {
        sink.lock().push((d.endpoint_id().to_owned(), arg));
    })
    .unwrap();

    let resp = h.request(post("dev-1", &action_url("reboot"), r#"{"value": 5}"#));
    assert_eq!(resp.status_code, 200);
    let resp = h.request(post("dev-1", &action_url("reboot"), ""));
    assert_eq!(resp.status_code, 200);
    let resp = h.request(post("dev-1", &action_url("reboot"), r#"{"value": true}"#));
    assert_eq!(resp.status_code, 400);
    let resp = h.request(put("dev-1", &action_url("reboot"), ""));
    assert_eq!(resp.status_code, 405);

    assert_eq!(
        *calls.lock(),
        vec![
            ("dev-1".to_owned(), Some(Value::Integer(5))),
            ("dev-1".to_owned(), None),
        ]
    );
}

#[test]
fn action_without_callback_is_not_found() {
    let h = Harness::paused(ClientConfig::default());
    let _dev = h.device("dev-1");
    let resp = h.request(post("dev-1", &action_url("reboot"), ""));
    assert_eq!(resp.status_code, 404);
}

#[test]
fn dropping_the_device_removes_its_routes() {
    let h = Harness::paused(ClientConfig::default());
    let dev = h.device("dev-1");
    let clone = dev.clone();
    dev.set_action_callback("reboot", |_, _| {}).unwrap();

    drop(dev);
    assert_eq!(h.registry.len(), 2, "a clone still holds the device");
    drop(clone);
    assert!(h.registry.is_empty());

    let resp = h.request(put("dev-1", &attributes_url(), r#"{"setpoint": 1.0}"#));
    assert_eq!(resp.status_code, 404);
}
