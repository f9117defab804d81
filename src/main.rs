//! Edgelink demo: a simulated environment sensor on the loopback transport.
//!
//! ```text
//!   sensor loop ── start_update / set_float / finish_update ──┐
//!        └── temp > maxThreshold ── AlertHandle::raise ───────┤
//!                                                             ▼
//!   "server" ── PUT .../attributes ──▶ LoopbackTransport ◀── DeviceClient
//! ```
//!
//! Set `EDGELINK_CONFIG` to a JSON file to override [`ClientConfig`]
//! defaults; `RUST_LOG` controls log output.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};

use edgelink::device::model::FieldSpec;
use edgelink::messaging::message::RequestMethod;
use edgelink::{
    ClientConfig, DeviceClient, LoopbackTransport, RequestMessage, StaticDeviceModel, ValueType,
};

const SENSOR_URN: &str = "urn:com:example:esensor";
const ENDPOINT_ID: &str = "esensor-0001";
const SAMPLES: u32 = 12;

fn load_config() -> Result<ClientConfig> {
    let Ok(path) = std::env::var("EDGELINK_CONFIG") else {
        return Ok(ClientConfig {
            polling_timeout_ms: 100,
            ..ClientConfig::default()
        });
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config: ClientConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    Ok(config)
}

fn sensor_model() -> StaticDeviceModel {
    StaticDeviceModel::new(SENSOR_URN)
        .with_attribute(FieldSpec::new("temperature", ValueType::Number))
        .with_attribute(FieldSpec::new("humidity", ValueType::Number))
        .with_attribute(
            FieldSpec::new("maxThreshold", ValueType::Number)
                .writable()
                .with_default(30.0_f32),
        )
        .with_alert(
            "tooHot",
            format!("{SENSOR_URN}:tooHot"),
            "Temperature above threshold",
            vec![
                FieldSpec::new("temp", ValueType::Number),
                FieldSpec::new("note", ValueType::String).optional(),
            ],
        )
        .with_action("reset", None)
}

/// Deterministic stand-in for a physical sensor: a slow ramp with a wobble.
fn sample(step: u32) -> (f32, f32) {
    let t = step as f32;
    let temperature = 22.0 + 1.1 * t + if step % 3 == 0 { 0.4 } else { -0.2 };
    let humidity = 55.0 - 0.8 * t;
    (temperature, humidity)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Edgelink demo v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let transport = Arc::new(LoopbackTransport::new());
    let mut client = DeviceClient::new(config, transport.clone()).context("starting client")?;

    let delivered = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    {
        let delivered = Arc::clone(&delivered);
        client.set_delivery_callback(move |_| {
            delivered.fetch_add(1, Ordering::Relaxed);
        });
        let failed = Arc::clone(&failed);
        client.set_error_callback(move |msg, err, reason| {
            failed.fetch_add(1, Ordering::Relaxed);
            warn!("delivery of {} failed: {} ({})", msg.id, err, reason);
        });
    }

    let device = client.virtual_device(ENDPOINT_ID, Arc::new(sensor_model()))?;
    device.attribute_set_on_change("maxThreshold", |event| {
        info!("threshold changed by server: {:?}", event.values);
    })?;
    device.set_action_callback("reset", |dev, _| {
        info!("reset requested for {}", dev.endpoint_id());
    })?;
    let mut too_hot = device.alert_handle("tooHot")?;

    client.start_polling()?;

    for step in 0..SAMPLES {
        let (temperature, humidity) = sample(step);

        device.start_update();
        device.set_float("temperature", temperature)?;
        device.set_float("humidity", humidity)?;
        device.finish_update()?;

        let threshold = device.get_float("maxThreshold")?;
        if temperature > threshold {
            too_hot.set_float("temp", temperature)?;
            too_hot.set_string("note", &format!("threshold {threshold:.1}"))?;
            too_hot.raise()?;
            info!("alert raised at {temperature:.1} (threshold {threshold:.1})");
        }

        // Halfway through, the "server" raises the threshold and resets the device.
        if step == SAMPLES / 2 {
            let urn_path = format!("deviceModels/{SENSOR_URN}");
            transport.push_request(
                RequestMessage::new(ENDPOINT_ID, RequestMethod::Put, format!("/{urn_path}/attributes"))
                    .with_body(r#"{"maxThreshold": 33.5}"#),
            );
            transport.push_request(RequestMessage::new(
                ENDPOINT_ID,
                RequestMethod::Post,
                format!("/{urn_path}/actions/reset"),
            ));
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    if !client.wait_idle(Duration::from_secs(5)) {
        warn!("dispatcher did not drain in time");
    }
    client.shutdown();

    let responses = transport
        .sent()
        .iter()
        .filter_map(|m| m.as_response().map(|r| r.status_code))
        .collect::<Vec<_>>();
    info!(
        "sent {} messages ({} delivered, {} failed), responses {:?}",
        transport.sent().len(),
        delivered.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        responses
    );
    Ok(())
}
