//! Edgelink device client runtime.
//!
//! Lets a device publish telemetry and alerts to a cloud endpoint and answer
//! inbound requests without application code ever waiting on the network.
//! The wire transport is supplied by the caller through the
//! [`Transport`](messaging::transport::Transport) trait.


pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod messaging;
pub mod value;

pub use client::DeviceClient;
pub use config::ClientConfig;
pub use device::{AlertHandle, DataHandle, DeviceModel, StaticDeviceModel, VirtualDevice};
pub use error::{Error, Result};
pub use messaging::dispatcher::{DispatchQueue, MessageDispatcher};
pub use messaging::message::{Message, Priority, Reliability, RequestMessage, ResponseMessage};
pub use messaging::registry::{HandlerRef, HandlerRegistry};
pub use messaging::router::{PollLoop, RequestRouter};
pub use messaging::transport::{LoopbackTransport, NullTransport, SendOutcome, Transport};
pub use value::{NamedValue, Value, ValueType};
