//! Virtual device: the application's view of one (endpoint, device model)
//! pair.
//!
//! Holds the attribute table, the pending-change buffer used between
//! [`VirtualDevice::start_update`] and [`VirtualDevice::finish_update`], and
//! the change/error/action callback slots.
//!
//! ## Outbound
//!
//! Without an update in progress every setter queues a single-attribute
//! data message immediately.  With one in progress, setters only record the
//! change and `finish_update` queues one message holding every changed
//! attribute.
//!
//! ## Inbound
//!
//! Each device registers itself with the handler registry for
//! `deviceModels/<urn>/attributes` (attribute writes from the server) and
//! for `deviceModels/<urn>/actions/<name>` once an action callback is set.
//! The entries are removed when the last clone of the device is dropped.
//!
//! ## Callbacks
//!
//! Change callbacks run on the router poll thread, error callbacks on the
//! dispatcher worker.  Neither may call setters, `finish_update`, `raise`,
//! `submit` or `queue`.
//!
//! A device is not meant to be mutated from several threads at once;
//! callers serialize access to one device themselves.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use super::alert::AlertHandle;
use super::data::DataHandle;
use super::model::{ActionSpec, DateTime, DeviceModel, FormatKind, NamedValue, Value};
use crate::error::{Error, Result};
use crate::messaging::dispatcher::DispatchQueue;
use crate::messaging::message::{
    DeliveryTracker, Message, RequestMessage, RequestMethod, ResponseMessage, STATUS_BAD_REQUEST,
    STATUS_METHOD_NOT_ALLOWED, STATUS_OK,
};
use crate::messaging::registry::{HandlerRef, HandlerRegistry, Pattern, ResourceHandler};

/// Externally originated attribute change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub endpoint_id: String,
    pub values: Vec<NamedValue>,
}

/// Delivery failure of an attribute update.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub endpoint_id: String,
    pub values: Vec<NamedValue>,
    pub error: Error,
    pub message: String,
}

pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ErrorEvent) + Send + Sync>;
pub type ActionCallback = Arc<dyn Fn(&VirtualDevice, Option<Value>) + Send + Sync>;

#[derive(Default)]
struct DeviceState {
    values: HashMap<String, Value>,
    /// Attributes changed since `start_update`, first-change order.
    pending: Vec<String>,
    update_in_progress: bool,
}

#[derive(Default)]
struct Callbacks {
    on_change: Option<ChangeCallback>,
    on_error: Option<ErrorCallback>,
    attribute_change: HashMap<String, ChangeCallback>,
    attribute_error: HashMap<String, ErrorCallback>,
    actions: HashMap<String, ActionCallback>,
}

struct DeviceInner {
    endpoint_id: String,
    model: Arc<dyn DeviceModel>,
    queue: DispatchQueue,
    registry: Arc<HandlerRegistry>,
    /// Single handler behind every registry entry of this device.
    handler: HandlerRef,
    state: Mutex<DeviceState>,
    callbacks: RwLock<Callbacks>,
    me: Weak<DeviceInner>,
}

impl DeviceInner {
    fn attributes_path(&self) -> String {
        format!("deviceModels/{}/attributes", self.model.urn())
    }

    fn actions_prefix(&self) -> String {
        format!("deviceModels/{}/actions/", self.model.urn())
    }

    fn attribute_message(&self, items: Vec<NamedValue>) -> Message {
        Message::data(
            self.endpoint_id.as_str(),
            format!("{}:attributes", self.model.urn()),
            items,
        )
        .with_tracker(Arc::new(AttributeTracker {
            device: self.me.clone(),
        }))
    }

    fn report_failure(&self, values: &[NamedValue], error: Error, reason: &str) {
        let (per_attribute, device_wide) = {
            let cbs = self.callbacks.read();
            let per_attribute: Vec<_> = values
                .iter()
                .filter_map(|nv| {
                    cbs.attribute_error
                        .get(&nv.name)
                        .map(|cb| (Arc::clone(cb), nv.clone()))
                })
                .collect();
            (per_attribute, cbs.on_error.clone())
        };

        let event = |values: Vec<NamedValue>| ErrorEvent {
            endpoint_id: self.endpoint_id.clone(),
            values,
            error,
            message: reason.to_owned(),
        };
        for (cb, nv) in per_attribute {
            cb(&event(vec![nv]));
        }
        if let Some(cb) = device_wide {
            cb(&event(values.to_vec()));
        }
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        let _ = self.registry.unregister_all(self.handler.clone());
        info!("Device[{}]: released", self.endpoint_id);
    }
}

/// Routes delivery failures of attribute messages back to the device.
struct AttributeTracker {
    device: Weak<DeviceInner>,
}

impl DeliveryTracker for AttributeTracker {
    fn on_failed(&self, message: &Message, error: Error, reason: &str) {
        let (Some(inner), Some(data)) = (self.device.upgrade(), message.as_data()) else {
            return;
        };
        warn!(
            "Device[{}]: attribute update failed: {} ({})",
            inner.endpoint_id, error, reason
        );
        inner.report_failure(&data.items, error, reason);
    }
}

/// Registry-facing handler for attribute writes and action invocations.
struct DeviceRequests {
    device: Weak<DeviceInner>,
}

impl ResourceHandler for DeviceRequests {
    fn handle(&self, request: &RequestMessage, response: &mut ResponseMessage) {
        if let Some(inner) = self.device.upgrade() {
            VirtualDevice { inner }.handle_request(request, response);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Public handle
// ───────────────────────────────────────────────────────────────

/// Cloneable handle; all clones share one attribute table.
#[derive(Clone)]
pub struct VirtualDevice {
    inner: Arc<DeviceInner>,
}

impl VirtualDevice {
    /// Create a device and register its attribute-write handler.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty or wildcard endpoint id.
    /// - `OutOfMemory` if the registry is full.
    pub fn new(
        endpoint_id: impl Into<String>,
        model: Arc<dyn DeviceModel>,
        queue: DispatchQueue,
        registry: Arc<HandlerRegistry>,
    ) -> Result<Self> {
        let endpoint_id = endpoint_id.into();
        if endpoint_id.is_empty() || endpoint_id == Pattern::WILDCARD {
            return Err(Error::InvalidArgument);
        }

        let inner = Arc::new_cyclic(|me: &Weak<DeviceInner>| DeviceInner {
            endpoint_id,
            model,
            queue,
            registry,
            handler: HandlerRef::new(DeviceRequests { device: me.clone() }),
            state: Mutex::new(DeviceState::default()),
            callbacks: RwLock::new(Callbacks::default()),
            me: me.clone(),
        });
        inner
            .registry
            .register(&inner.endpoint_id, &inner.attributes_path(), inner.handler.clone())?;

        info!(
            "Device[{}]: created for {}",
            inner.endpoint_id,
            inner.model.urn()
        );
        Ok(Self { inner })
    }

    pub fn endpoint_id(&self) -> &str {
        &self.inner.endpoint_id
    }

    pub fn model(&self) -> &Arc<dyn DeviceModel> {
        &self.inner.model
    }

    // ── batching ──────────────────────────────────────────────

    /// Hold back attribute messages until [`finish_update`](Self::finish_update).
    pub fn start_update(&self) {
        self.inner.state.lock().update_in_progress = true;
    }

    /// Queue one data message with every attribute changed since
    /// `start_update`.  A no-op when no update is in progress or nothing
    /// changed.
    ///
    /// If the message cannot be queued the update stays open with its
    /// changes, so calling `finish_update` again retries it.
    pub fn finish_update(&self) -> Result<()> {
        let (names, message) = {
            let mut state = self.inner.state.lock();
            if !state.update_in_progress {
                return Ok(());
            }
            state.update_in_progress = false;
            let names = std::mem::take(&mut state.pending);
            let items: Vec<NamedValue> = names
                .iter()
                .filter_map(|name| {
                    let value = state.values.get(name).cloned()?;
                    Some(NamedValue::new(name.as_str(), value))
                })
                .collect();
            if items.is_empty() {
                return Ok(());
            }
            (names, self.inner.attribute_message(items))
        };

        debug!(
            "Device[{}]: finishing update with {} attributes",
            self.inner.endpoint_id,
            names.len()
        );
        self.inner.queue.queue(message).inspect_err(|e| {
            warn!(
                "Device[{}]: update not queued ({}), keeping {} changes",
                self.inner.endpoint_id,
                e,
                names.len()
            );
            let mut state = self.inner.state.lock();
            state.update_in_progress = true;
            let mut restored = names;
            for name in std::mem::take(&mut state.pending) {
                if !restored.contains(&name) {
                    restored.push(name);
                }
            }
            state.pending = restored;
        })
    }

    // ── attribute access ──────────────────────────────────────

    /// Store an attribute value, validated against the model.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an unknown attribute or a type mismatch.
    /// - Any error of [`DispatchQueue::queue`] when no update is in
    ///   progress; the value is stored regardless.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let spec = self
            .inner
            .model
            .attribute(name)
            .ok_or(Error::InvalidArgument)?;
        if !spec.accepts(&value) {
            return Err(Error::InvalidArgument);
        }

        let message = {
            let mut state = self.inner.state.lock();
            state.values.insert(name.to_owned(), value.clone());
            if state.update_in_progress {
                if !state.pending.iter().any(|p| p == name) {
                    state.pending.push(name.to_owned());
                }
                None
            } else {
                Some(
                    self.inner
                        .attribute_message(vec![NamedValue::new(name, value)]),
                )
            }
        };

        match message {
            Some(message) => self.inner.queue.queue(message),
            None => Ok(()),
        }
    }

    /// Current value, falling back to the model default.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an unknown attribute.
    /// - `Fail` if the attribute has no value and no default.
    pub fn get(&self, name: &str) -> Result<Value> {
        let spec = self
            .inner
            .model
            .attribute(name)
            .ok_or(Error::InvalidArgument)?;
        if let Some(value) = self.inner.state.lock().values.get(name) {
            return Ok(value.clone());
        }
        spec.default.clone().ok_or(Error::Fail)
    }

    pub fn set_integer(&self, name: &str, value: i32) -> Result<()> {
        self.set(name, Value::Integer(value))
    }

    pub fn set_float(&self, name: &str, value: f32) -> Result<()> {
        self.set(name, Value::Number(value))
    }

    pub fn set_boolean(&self, name: &str, value: bool) -> Result<()> {
        self.set(name, Value::Boolean(value))
    }

    pub fn set_string(&self, name: &str, value: &str) -> Result<()> {
        self.set(name, Value::String(value.to_owned()))
    }

    pub fn set_date_time(&self, name: &str, value: DateTime) -> Result<()> {
        self.set(name, Value::DateTime(value))
    }

    pub fn get_integer(&self, name: &str) -> Result<i32> {
        match self.get(name)? {
            Value::Integer(v) => Ok(v),
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn get_float(&self, name: &str) -> Result<f32> {
        match self.get(name)? {
            Value::Number(v) => Ok(v),
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn get_boolean(&self, name: &str) -> Result<bool> {
        match self.get(name)? {
            Value::Boolean(v) => Ok(v),
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<String> {
        match self.get(name)? {
            Value::String(v) => Ok(v),
            _ => Err(Error::InvalidArgument),
        }
    }

    pub fn get_date_time(&self, name: &str) -> Result<DateTime> {
        match self.get(name)? {
            Value::DateTime(v) => Ok(v),
            _ => Err(Error::InvalidArgument),
        }
    }

    // ── callbacks ─────────────────────────────────────────────

    /// Device-wide change callback; receives every value of one external
    /// change.
    pub fn set_on_change(&self, cb: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.inner.callbacks.write().on_change = Some(Arc::new(cb));
    }

    pub fn attribute_set_on_change(
        &self,
        name: &str,
        cb: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        self.inner
            .model
            .attribute(name)
            .ok_or(Error::InvalidArgument)?;
        self.inner
            .callbacks
            .write()
            .attribute_change
            .insert(name.to_owned(), Arc::new(cb));
        Ok(())
    }

    /// Device-wide delivery-failure callback for attribute updates.
    pub fn set_on_error(&self, cb: impl Fn(&ErrorEvent) + Send + Sync + 'static) {
        self.inner.callbacks.write().on_error = Some(Arc::new(cb));
    }

    pub fn attribute_set_on_error(
        &self,
        name: &str,
        cb: impl Fn(&ErrorEvent) + Send + Sync + 'static,
    ) -> Result<()> {
        self.inner
            .model
            .attribute(name)
            .ok_or(Error::InvalidArgument)?;
        self.inner
            .callbacks
            .write()
            .attribute_error
            .insert(name.to_owned(), Arc::new(cb));
        Ok(())
    }

    /// Install the callback for a model action and expose it at
    /// `deviceModels/<urn>/actions/<action>`.
    pub fn set_action_callback(
        &self,
        action: &str,
        cb: impl Fn(&VirtualDevice, Option<Value>) + Send + Sync + 'static,
    ) -> Result<()> {
        self.inner.model.action(action).ok_or(Error::InvalidArgument)?;
        let path = format!("{}{}", self.inner.actions_prefix(), action);
        self.inner.registry.register(
            &self.inner.endpoint_id,
            &path,
            self.inner.handler.clone(),
        )?;
        self.inner
            .callbacks
            .write()
            .actions
            .insert(action.to_owned(), Arc::new(cb));
        Ok(())
    }

    // ── external changes ──────────────────────────────────────

    /// Apply a server-originated change: every value is validated first
    /// (known, writable, matching type), then all are stored and the change
    /// callbacks fire.  Nothing is stored if any value is rejected.
    pub fn apply_external_change(&self, values: &[NamedValue]) -> Result<()> {
        for nv in values {
            let spec = self
                .inner
                .model
                .attribute(&nv.name)
                .ok_or(Error::InvalidArgument)?;
            if !spec.writable || !spec.accepts(&nv.value) {
                return Err(Error::InvalidArgument);
            }
        }
        if values.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.inner.state.lock();
            for nv in values {
                state.values.insert(nv.name.clone(), nv.value.clone());
            }
        }
        debug!(
            "Device[{}]: applied external change of {} attributes",
            self.inner.endpoint_id,
            values.len()
        );

        let (per_attribute, device_wide) = {
            let cbs = self.inner.callbacks.read();
            let per_attribute: Vec<_> = values
                .iter()
                .filter_map(|nv| {
                    cbs.attribute_change
                        .get(&nv.name)
                        .map(|cb| (Arc::clone(cb), nv.clone()))
                })
                .collect();
            (per_attribute, cbs.on_change.clone())
        };
        for (cb, nv) in per_attribute {
            cb(&ChangeEvent {
                endpoint_id: self.inner.endpoint_id.clone(),
                values: vec![nv],
            });
        }
        if let Some(cb) = device_wide {
            cb(&ChangeEvent {
                endpoint_id: self.inner.endpoint_id.clone(),
                values: values.to_vec(),
            });
        }
        Ok(())
    }

    // ── alert / data handles ──────────────────────────────────

    /// Handle for the alert format `name` (short name or URN).
    pub fn alert_handle(&self, name: &str) -> Result<AlertHandle> {
        let format = self
            .inner
            .model
            .format(name)
            .filter(|f| f.kind == FormatKind::Alert)
            .ok_or(Error::InvalidArgument)?;
        AlertHandle::new(&self.inner.endpoint_id, self.inner.queue.clone(), format.clone())
    }

    /// Handle for the data format `name` (short name or URN).
    pub fn data_handle(&self, name: &str) -> Result<DataHandle> {
        let format = self
            .inner
            .model
            .format(name)
            .filter(|f| f.kind == FormatKind::Data)
            .ok_or(Error::InvalidArgument)?;
        DataHandle::new(&self.inner.endpoint_id, self.inner.queue.clone(), format.clone())
    }

    // ── request handling ──────────────────────────────────────

    fn handle_request(&self, request: &RequestMessage, response: &mut ResponseMessage) {
        let path = request.path();
        if path == self.inner.attributes_path() {
            self.handle_attribute_write(request, response);
        } else if let Some(action) = path.strip_prefix(self.inner.actions_prefix().as_str()) {
            self.handle_action(action, request, response);
        }
    }

    fn handle_attribute_write(&self, request: &RequestMessage, response: &mut ResponseMessage) {
        if !matches!(
            request.method,
            Some(RequestMethod::Put | RequestMethod::Post)
        ) {
            response.reply(STATUS_METHOD_NOT_ALLOWED, "");
            return;
        }
        let values = match self.parse_attribute_body(&request.body) {
            Ok(values) => values,
            Err(reason) => {
                warn!(
                    "Device[{}]: rejected attribute write: {}",
                    self.inner.endpoint_id, reason
                );
                response.reply(STATUS_BAD_REQUEST, reason);
                return;
            }
        };
        match self.apply_external_change(&values) {
            Ok(()) => response.reply(STATUS_OK, ""),
            Err(e) => response.reply(STATUS_BAD_REQUEST, e.to_string()),
        }
    }

    fn parse_attribute_body(&self, body: &str) -> core::result::Result<Vec<NamedValue>, String> {
        let json: serde_json::Value =
            serde_json::from_str(body).map_err(|e| format!("malformed body: {e}"))?;
        let object = json
            .as_object()
            .ok_or_else(|| "body must be a JSON object".to_owned())?;

        object
            .iter()
            .map(|(name, raw)| {
                let spec = self
                    .inner
                    .model
                    .attribute(name)
                    .ok_or_else(|| format!("unknown attribute {name}"))?;
                if !spec.writable {
                    return Err(format!("attribute {name} is read-only"));
                }
                Value::from_json(spec.value_type, raw)
                    .map(|value| NamedValue::new(name.clone(), value))
                    .ok_or_else(|| format!("{name}: expected {}", spec.value_type))
            })
            .collect()
    }

    fn handle_action(&self, action: &str, request: &RequestMessage, response: &mut ResponseMessage) {
        let Some(spec) = self.inner.model.action(action) else {
            return;
        };
        let Some(cb) = self.inner.callbacks.read().actions.get(action).cloned() else {
            return;
        };
        if request.method != Some(RequestMethod::Post) {
            response.reply(STATUS_METHOD_NOT_ALLOWED, "");
            return;
        }
        let argument = match parse_action_argument(spec, &request.body) {
            Ok(argument) => argument,
            Err(reason) => {
                response.reply(STATUS_BAD_REQUEST, reason);
                return;
            }
        };
        debug!("Device[{}]: invoking action {}", self.inner.endpoint_id, action);
        cb(self, argument);
        response.reply(STATUS_OK, "");
    }
}

/// Decode `{"value": …}` into the action's argument type.  An empty body or
/// an action without an argument yields `None`.
fn parse_action_argument(
    spec: &ActionSpec,
    body: &str,
) -> core::result::Result<Option<Value>, String> {
    let Some(ty) = spec.argument else {
        return Ok(None);
    };
    if body.trim().is_empty() {
        return Ok(None);
    }
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| format!("malformed body: {e}"))?;
    match json.get("value") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(raw) => Value::from_json(ty, raw)
            .map(Some)
            .ok_or_else(|| format!("{}: expected {}", spec.name, ty)),
    }
}
