//! Shared fixtures: a loopback transport, a dispatcher and registry wired
//! to it, and a small thermostat device model.

use std::sync::Arc;
use std::time::Duration;

use edgelink::config::ClientConfig;
use edgelink::device::model::{DeviceModel, FieldSpec, StaticDeviceModel, ValueType};
use edgelink::device::VirtualDevice;
use edgelink::messaging::dispatcher::MessageDispatcher;
use edgelink::messaging::message::{Message, RequestMessage, RequestMethod, ResponseMessage};
use edgelink::messaging::registry::HandlerRegistry;
use edgelink::messaging::router::RequestRouter;
use edgelink::messaging::transport::LoopbackTransport;

pub const WAIT: Duration = Duration::from_secs(5);
pub const URN: &str = "urn:test:thermostat";

pub fn thermostat() -> Arc<dyn DeviceModel> {
    Arc::new(
        StaticDeviceModel::new(URN)
            .with_attribute(FieldSpec::new("temperature", ValueType::Number))
            .with_attribute(FieldSpec::new("humidity", ValueType::Number))
            .with_attribute(FieldSpec::new("setpoint", ValueType::Number).writable())
            .with_attribute(FieldSpec::new("mode", ValueType::String).writable())
            .with_attribute(FieldSpec::new("online", ValueType::Boolean))
            .with_alert(
                "tooHot",
                "urn:test:thermostat:tooHot",
                "Temperature above limit",
                vec![
                    FieldSpec::new("description", ValueType::String),
                    FieldSpec::new("temp", ValueType::Number).optional(),
                ],
            )
            .with_alert(
                "doorOpen",
                "urn:test:thermostat:doorOpen",
                "Cover left open",
                vec![FieldSpec::new("note", ValueType::String).optional()],
            )
            .with_data(
                "reading",
                "urn:test:thermostat:reading",
                "Periodic reading",
                vec![
                    FieldSpec::new("value", ValueType::Integer),
                    FieldSpec::new("unit", ValueType::String).optional().with_default("C"),
                ],
            )
            .with_action("reboot", Some(ValueType::Integer)),
    )
}

pub fn attributes_url() -> String {
    format!("/deviceModels/{URN}/attributes")
}

pub fn action_url(action: &str) -> String {
    format!("/deviceModels/{URN}/actions/{action}")
}

pub struct Harness {
    pub transport: Arc<LoopbackTransport>,
    pub dispatcher: MessageDispatcher,
    pub registry: Arc<HandlerRegistry>,
}

#[allow(dead_code)]
impl Harness {
    /// Dispatcher running.
    pub fn started() -> Self {
        let mut h = Self::paused(ClientConfig::default());
        h.dispatcher.start().unwrap();
        h
    }

    /// Dispatcher built but not started: queued messages stay countable.
    pub fn paused(config: ClientConfig) -> Self {
        let transport = Arc::new(LoopbackTransport::new());
        let dispatcher = MessageDispatcher::new(&config, transport.clone()).unwrap();
        let registry = Arc::new(HandlerRegistry::new(config.max_resource_number));
        Self {
            transport,
            dispatcher,
            registry,
        }
    }

    pub fn device(&self, endpoint: &str) -> VirtualDevice {
        VirtualDevice::new(
            endpoint,
            thermostat(),
            self.dispatcher.handle(),
            self.registry.clone(),
        )
        .unwrap()
    }

    pub fn router(&self) -> RequestRouter {
        RequestRouter::new(self.registry.clone(), self.dispatcher.handle())
    }

    /// Start if needed, wait for the queue to drain, return what was sent.
    pub fn drain(&mut self) -> Vec<Message> {
        let _ = self.dispatcher.start();
        assert!(self.dispatcher.wait_idle(WAIT), "dispatcher did not drain");
        self.transport.sent()
    }

    /// Route `request` synchronously and return the filled response.
    pub fn request(&self, request: RequestMessage) -> ResponseMessage {
        let message = self.router().dispatch(request);
        message.as_response().cloned().unwrap()
    }
}

pub fn put(endpoint: &str, url: &str, body: &str) -> RequestMessage {
    RequestMessage::new(endpoint, RequestMethod::Put, url).with_body(body)
}

pub fn post(endpoint: &str, url: &str, body: &str) -> RequestMessage {
    RequestMessage::new(endpoint, RequestMethod::Post, url).with_body(body)
}
