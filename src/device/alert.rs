//! Alert handle: set fields, then raise.

use log::{debug, warn};

use super::fields::FieldBuffer;
use super::model::{DateTime, FormatSpec, Value};
use crate::error::Result;
use crate::messaging::dispatcher::DispatchQueue;
use crate::messaging::message::{Message, Severity};

/// Scoped to one alert format of one virtual device.
///
/// Raised alerts go out with `High` priority and `GuaranteedDelivery`.
/// Failures are reported through the dispatcher's error callback; resending
/// is up to the caller.
pub struct AlertHandle {
    endpoint_id: String,
    queue: DispatchQueue,
    fields: FieldBuffer,
    severity: Severity,
}

impl AlertHandle {
    pub(crate) fn new(endpoint_id: &str, queue: DispatchQueue, format: FormatSpec) -> Result<Self> {
        Ok(Self {
            endpoint_id: endpoint_id.to_owned(),
            queue,
            fields: FieldBuffer::new(format)?,
            severity: Severity::default(),
        })
    }

    pub fn urn(&self) -> &str {
        &self.fields.format().urn
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn set_severity(&mut self, severity: Severity) {
        self.severity = severity;
    }

    /// `InvalidArgument` for an unknown field or a type mismatch.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        self.fields.set(field, value.into())
    }

    pub fn set_integer(&mut self, field: &str, value: i32) -> Result<()> {
        self.set(field, Value::Integer(value))
    }

    pub fn set_float(&mut self, field: &str, value: f32) -> Result<()> {
        self.set(field, Value::Number(value))
    }

    pub fn set_boolean(&mut self, field: &str, value: bool) -> Result<()> {
        self.set(field, Value::Boolean(value))
    }

    pub fn set_string(&mut self, field: &str, value: &str) -> Result<()> {
        self.set(field, Value::String(value.to_owned()))
    }

    pub fn set_date_time(&mut self, field: &str, value: DateTime) -> Result<()> {
        self.set(field, Value::DateTime(value))
    }

    /// Queue the alert.
    ///
    /// `Fail` if nothing, or not every required field, was set since the
    /// last raise; queue errors are passed through.  On success the set
    /// marks are cleared and stored values are kept.
    pub fn raise(&mut self) -> Result<()> {
        let items = self.fields.items().inspect_err(|_| {
            match self.fields.missing_required() {
                Some(missing) => warn!(
                    "Device[{}]: alert {} missing required field {}",
                    self.endpoint_id,
                    self.urn(),
                    missing.name
                ),
                None => warn!(
                    "Device[{}]: alert {} has no new values",
                    self.endpoint_id,
                    self.urn()
                ),
            }
        })?;
        let format = self.fields.format();
        let message = Message::alert(
            self.endpoint_id.as_str(),
            format.urn.as_str(),
            format.description.as_str(),
            self.severity,
            items,
        );
        self.queue.queue(message)?;
        self.fields.commit();
        debug!("Device[{}]: raised {}", self.endpoint_id, self.urn());
        Ok(())
    }
}
