//! Fuzz target: attribute-write request bodies
//!
//! Routes arbitrary bytes as the body of a `PUT .../attributes` request to a
//! virtual device and checks that the handler always answers 200 or 400 and
//! that a rejected write leaves the attribute table untouched.
//!
//! cargo fuzz run fuzz_attribute_write

#![no_main]

use std::sync::Arc;

use edgelink::config::ClientConfig;
use edgelink::device::model::{FieldSpec, StaticDeviceModel, ValueType};
use edgelink::device::VirtualDevice;
use edgelink::messaging::dispatcher::MessageDispatcher;
use edgelink::messaging::message::{RequestMessage, RequestMethod};
use edgelink::messaging::registry::HandlerRegistry;
use edgelink::messaging::router::RequestRouter;
use edgelink::messaging::transport::NullTransport;
use libfuzzer_sys::fuzz_target;

const URN: &str = "urn:fuzz:device";

fuzz_target!(|data: &[u8]| {
    let Ok(body) = std::str::from_utf8(data) else {
        return;
    };

    let model = Arc::new(
        StaticDeviceModel::new(URN)
            .with_attribute(FieldSpec::new("level", ValueType::Integer).writable())
            .with_attribute(FieldSpec::new("label", ValueType::String).writable())
            .with_attribute(FieldSpec::new("sealed", ValueType::Boolean)),
    );
    let Ok(dispatcher) = MessageDispatcher::new(&ClientConfig::default(), Arc::new(NullTransport))
    else {
        return;
    };
    let registry = Arc::new(HandlerRegistry::new(4));
    let Ok(device) = VirtualDevice::new("dev", model, dispatcher.handle(), registry.clone()) else {
        return;
    };
    let router = RequestRouter::new(registry, dispatcher.handle());

    let request = RequestMessage::new(
        "dev",
        RequestMethod::Put,
        format!("/deviceModels/{URN}/attributes"),
    )
    .with_body(body);
    let message = router.dispatch(request);
    let Some(response) = message.as_response() else {
        return;
    };

    match response.status_code {
        200 => {}
        400 => {
            assert!(device.get("level").is_err());
            assert!(device.get("label").is_err());
        }
        other => panic!("unexpected status {other}"),
    }
    assert!(device.get("sealed").is_err());
});
