//! Message data model.
//!
//! A [`Message`] is the unit handed to the dispatcher and, in batches, to the
//! transport.  Its payload is a tagged enum, so the message type can never
//! disagree with the payload that is actually present.
//!
//! Inbound requests arrive as [`RequestMessage`]s and are answered with a
//! [`ResponseMessage`] that owns the originating request until the response
//! has been handed to the transport.

use core::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::{DateTime, NamedValue, Value};

// ───────────────────────────────────────────────────────────────
// Enumerations
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Data = 0,
    Alert = 1,
    Request = 2,
    Response = 3,
    Resource = 4,
}

/// Dispatch priority.  Each level is one FIFO lane in the dispatcher.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    Lowest = 0,
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Highest = 4,
}

impl Priority {
    /// Number of priority levels (and dispatcher lanes).
    pub const COUNT: usize = 5;

    /// Lanes in drain order.
    pub const DESCENDING: [Self; Self::COUNT] = [
        Self::Highest,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Lowest,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Requested delivery assurance.  Never triggers retries by itself.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Reliability {
    NoGuarantee = 0,
    #[default]
    BestEffort = 1,
    GuaranteedDelivery = 2,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    Critical = 0,
    #[default]
    Significant = 1,
    Normal = 2,
    Low = 3,
}

/// HTTP-like request method.  Discriminants are single bits so methods can
/// be combined into a [`MethodSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestMethod {
    Delete = 0b0000_0001,
    Get = 0b0000_0010,
    Post = 0b0000_1000,
    Put = 0b0001_0000,
}

impl RequestMethod {
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "DELETE"),
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

/// ORed set of [`RequestMethod`]s.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSet(u8);

impl MethodSet {
    pub const EMPTY: Self = Self(0);

    pub const fn of(methods: &[RequestMethod]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < methods.len() {
            bits |= methods[i].mask();
            i += 1;
        }
        Self(bits)
    }

    pub fn insert(&mut self, method: RequestMethod) {
        self.0 |= method.mask();
    }

    pub const fn contains(self, method: RequestMethod) -> bool {
        self.0 & method.mask() != 0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ResourceReportType {
    Update = 0,
    Delete = 1,
    Reconciliation = 2,
}

// ───────────────────────────────────────────────────────────────
// Records
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Routing and delivery attributes common to every message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageBase {
    pub source: String,
    pub sender: String,
    pub destination: String,
    pub priority: Priority,
    pub reliability: Reliability,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub key: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataMessage {
    pub format: String,
    pub items: Vec<NamedValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub format: String,
    pub description: String,
    pub severity: Severity,
    pub items: Vec<NamedValue>,
}

/// An inbound request.  Owned by whichever component currently holds it;
/// dropping it releases it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub id: String,
    pub source: String,
    /// Endpoint the request is addressed to.
    pub destination: String,
    pub headers: Vec<KeyValue>,
    pub params: Vec<KeyValue>,
    pub method: Option<RequestMethod>,
    pub url: String,
    pub body: String,
}

impl RequestMessage {
    pub fn new(
        destination: impl Into<String>,
        method: RequestMethod,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: new_message_id(),
            destination: destination.into(),
            method: Some(method),
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Resource path used for handler resolution: the url without its
    /// query string and without a leading slash.
    pub fn path(&self) -> &str {
        let url = self.url.split('?').next().unwrap_or_default();
        url.strip_prefix('/').unwrap_or(url)
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        find_key(&self.headers, key)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        find_key(&self.params, key)
    }
}

fn find_key<'a>(list: &'a [KeyValue], key: &str) -> Option<&'a str> {
    list.iter()
        .find(|kv| kv.key.eq_ignore_ascii_case(key))
        .map(|kv| kv.value.as_str())
}

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
/// HTTP "not found", the status of a response no handler filled in.
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_METHOD_NOT_ALLOWED: u16 = 405;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseMessage {
    pub status_code: u16,
    pub body: String,
    /// Request this response answers.  Released once the response is sent.
    pub request: Option<Box<RequestMessage>>,
    pub headers: Vec<KeyValue>,
}

impl Default for ResponseMessage {
    fn default() -> Self {
        Self {
            status_code: STATUS_NOT_FOUND,
            body: String::new(),
            request: None,
            headers: Vec::new(),
        }
    }
}

impl ResponseMessage {
    /// Fill in status and body in one call from a handler.
    pub fn reply(&mut self, status_code: u16, body: impl Into<String>) {
        self.status_code = status_code;
        self.body = body.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub name: String,
    pub path: String,
    pub description: String,
    pub methods: MethodSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceMessage {
    pub resources: Vec<Resource>,
    pub report_type: ResourceReportType,
    pub endpoint_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Payload {
    Data(DataMessage),
    Alert(AlertMessage),
    Response(ResponseMessage),
    Resource(ResourceMessage),
}

// ───────────────────────────────────────────────────────────────
// Delivery tracking
// ───────────────────────────────────────────────────────────────

/// Observer attached to a message by the component that produced it, told
/// when the dispatcher could not deliver that particular message.
///
/// Runs on the dispatcher worker; must not queue messages.
pub trait DeliveryTracker: Send + Sync {
    fn on_failed(&self, message: &Message, error: Error, reason: &str);
}

#[derive(Clone)]
pub(crate) struct Tracker(pub(crate) Arc<dyn DeliveryTracker>);

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tracker")
    }
}

// ───────────────────────────────────────────────────────────────
// Message
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub base: MessageBase,
    pub id: String,
    /// Milliseconds since the Unix epoch at which the event occurred.
    pub event_time: DateTime,
    pub diagnostics: Vec<Diagnostic>,
    pub properties: Vec<Property>,
    pub payload: Payload,
    #[serde(skip)]
    pub(crate) tracker: Option<Tracker>,
}

impl Message {
    pub fn new(base: MessageBase, payload: Payload) -> Self {
        Self {
            base,
            id: new_message_id(),
            event_time: now_millis(),
            diagnostics: Vec::new(),
            properties: Vec::new(),
            payload,
            tracker: None,
        }
    }

    /// A data message from `source` with the default data priority.
    pub fn data(source: impl Into<String>, format: impl Into<String>, items: Vec<NamedValue>) -> Self {
        Self::new(
            MessageBase {
                source: source.into(),
                priority: Priority::Low,
                reliability: Reliability::BestEffort,
                ..MessageBase::default()
            },
            Payload::Data(DataMessage {
                format: format.into(),
                items,
            }),
        )
    }

    /// An alert message from `source` with the default alert priority.
    pub fn alert(
        source: impl Into<String>,
        format: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        items: Vec<NamedValue>,
    ) -> Self {
        Self::new(
            MessageBase {
                source: source.into(),
                priority: Priority::High,
                reliability: Reliability::GuaranteedDelivery,
                ..MessageBase::default()
            },
            Payload::Alert(AlertMessage {
                format: format.into(),
                description: description.into(),
                severity,
                items,
            }),
        )
    }

    /// The default reply: 404, empty body, high priority, best effort.
    pub fn response_for(request: &RequestMessage) -> Self {
        Self::new(
            MessageBase {
                source: request.destination.clone(),
                destination: request.source.clone(),
                priority: Priority::High,
                reliability: Reliability::BestEffort,
                ..MessageBase::default()
            },
            Payload::Response(ResponseMessage::default()),
        )
    }

    pub fn resource(endpoint: impl Into<String>, report: ResourceMessage) -> Self {
        Self::new(
            MessageBase {
                source: endpoint.into(),
                ..MessageBase::default()
            },
            Payload::Resource(report),
        )
    }

    pub fn message_type(&self) -> MessageType {
        match self.payload {
            Payload::Data(_) => MessageType::Data,
            Payload::Alert(_) => MessageType::Alert,
            Payload::Response(_) => MessageType::Response,
            Payload::Resource(_) => MessageType::Resource,
        }
    }

    pub fn priority(&self) -> Priority {
        self.base.priority
    }

    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.base.priority = priority;
        self
    }

    #[must_use]
    pub fn with_reliability(mut self, reliability: Reliability) -> Self {
        self.base.reliability = reliability;
        self
    }

    #[must_use]
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.base.destination = destination.into();
        self
    }

    #[must_use]
    pub fn with_diagnostic(mut self, key: impl Into<String>, value: Value) -> Self {
        self.diagnostics.push(Diagnostic {
            key: key.into(),
            value,
        });
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.properties.push(Property {
            key: key.into(),
            values,
        });
        self
    }

    #[must_use]
    pub(crate) fn with_tracker(mut self, tracker: Arc<dyn DeliveryTracker>) -> Self {
        self.tracker = Some(Tracker(tracker));
        self
    }

    pub fn as_data(&self) -> Option<&DataMessage> {
        match &self.payload {
            Payload::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_alert(&self) -> Option<&AlertMessage> {
        match &self.payload {
            Payload::Alert(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseMessage> {
        match &self.payload {
            Payload::Response(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_response_mut(&mut self) -> Option<&mut ResponseMessage> {
        match &mut self.payload {
            Payload::Response(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&ResourceMessage> {
        match &self.payload {
            Payload::Resource(r) => Some(r),
            _ => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

pub(crate) fn new_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) fn now_millis() -> DateTime {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as DateTime)
}
