//! Field buffer shared by alert and data handles.
//!
//! Holds the stored value of every field of one format plus a bitset of the
//! fields set since the last successful raise/submit.  Stored values
//! survive a raise/submit; the bits do not, so required fields must be set
//! again before the next one.

use crate::device::model::{FieldSpec, FormatSpec, NamedValue, Value};
use crate::error::{Error, Result};

/// Formats wider than this cannot be tracked in the set-bits word.
pub const MAX_FORMAT_FIELDS: usize = u64::BITS as usize;

#[derive(Debug, Clone)]
pub(crate) struct FieldBuffer {
    format: FormatSpec,
    values: Vec<Option<Value>>,
    set_bits: u64,
}

impl FieldBuffer {
    pub(crate) fn new(format: FormatSpec) -> Result<Self> {
        if format.fields.len() > MAX_FORMAT_FIELDS {
            return Err(Error::InvalidArgument);
        }
        let values = format.fields.iter().map(|f| f.default.clone()).collect();
        Ok(Self {
            format,
            values,
            set_bits: 0,
        })
    }

    pub(crate) fn format(&self) -> &FormatSpec {
        &self.format
    }

    /// Store `value` into `name` and mark it set.
    ///
    /// `InvalidArgument` for an unknown field or a type mismatch.
    pub(crate) fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let idx = self.format.field_index(name).ok_or(Error::InvalidArgument)?;
        if !self.format.fields[idx].accepts(&value) {
            return Err(Error::InvalidArgument);
        }
        self.values[idx] = Some(value);
        self.set_bits |= 1u64 << idx;
        Ok(())
    }

    pub(crate) fn is_set(&self, name: &str) -> bool {
        self.format
            .field_index(name)
            .is_some_and(|idx| self.set_bits & (1u64 << idx) != 0)
    }

    /// The first required field not set since the last commit.
    pub(crate) fn missing_required(&self) -> Option<&FieldSpec> {
        self.format
            .fields
            .iter()
            .enumerate()
            .find(|(idx, f)| !f.optional && self.set_bits & (1u64 << idx) == 0)
            .map(|(_, f)| f)
    }

    /// Items for the outgoing message: every field holding a value, in
    /// format order.
    ///
    /// `Fail` if nothing, or not every required field, has been set since
    /// the last commit.
    pub(crate) fn items(&self) -> Result<Vec<NamedValue>> {
        if self.set_bits == 0 || self.missing_required().is_some() {
            return Err(Error::Fail);
        }
        Ok(self
            .format
            .fields
            .iter()
            .zip(&self.values)
            .filter_map(|(f, v)| v.clone().map(|v| NamedValue::new(f.name.clone(), v)))
            .collect())
    }

    /// Clear the set bits after a successful raise/submit.
    pub(crate) fn commit(&mut self) {
        self.set_bits = 0;
    }
}
