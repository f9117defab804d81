//! Data handle: set fields, then submit.

use log::debug;

use super::fields::FieldBuffer;
use super::model::{DateTime, FormatSpec, Value};
use crate::error::Result;
use crate::messaging::dispatcher::DispatchQueue;
use crate::messaging::message::Message;

/// Scoped to one data format of one virtual device.  Same set-then-submit
/// contract as [`AlertHandle`](super::alert::AlertHandle), sent with `Low`
/// priority and `BestEffort`.
pub struct DataHandle {
    endpoint_id: String,
    queue: DispatchQueue,
    fields: FieldBuffer,
}

impl DataHandle {
    pub(crate) fn new(endpoint_id: &str, queue: DispatchQueue, format: FormatSpec) -> Result<Self> {
        Ok(Self {
            endpoint_id: endpoint_id.to_owned(),
            queue,
            fields: FieldBuffer::new(format)?,
        })
    }

    pub fn urn(&self) -> &str {
        &self.fields.format().urn
    }

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

    pub fn is_set(&self, field: &str) -> bool {
        self.fields.is_set(field)
    }

    /// Queue the data item.  `Fail` if nothing new or not every required
    /// field has been set since the last submit.
    pub fn submit(&mut self) -> Result<()> {
        let items = self.fields.items()?;
        let message = Message::data(self.endpoint_id.as_str(), self.urn(), items);
        self.queue.queue(message)?;
        self.fields.commit();
        debug!("Device[{}]: submitted {}", self.endpoint_id, self.urn());
        Ok(())
    }
}
