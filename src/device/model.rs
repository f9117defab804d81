//! Device model port.
//!
//! ```text
//!   schema source ──▶ DeviceModel trait ──▶ VirtualDevice / AlertHandle / DataHandle
//! ```
//!
//! Virtual devices only ever ask the model three questions: does this name
//! exist, what type is it, and is it optional (plus its default).  Parsing
//! a model document is the job of whoever implements the trait;
//! [`StaticDeviceModel`] is an in-memory implementation built in code.

pub use crate::value::{DateTime, NamedValue, Value, ValueType};

// ───────────────────────────────────────────────────────────────
// Model records
// ───────────────────────────────────────────────────────────────

/// One attribute of a device model, or one field of an alert/data format.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub value_type: ValueType,
    /// Alert/data fields only: may be left unset at raise/submit.
    pub optional: bool,
    pub default: Option<Value>,
    /// Attributes only: accepts externally originated writes.
    pub writable: bool,
}

impl FieldSpec {
    /// A required, read-only field with no default.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            optional: false,
            default: None,
            writable: false,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Set the default value.  Ignored if its type does not match.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.value_type() == self.value_type {
            self.default = Some(value);
        }
        self
    }

    /// Whether `value` may be stored in this field.
    pub fn accepts(&self, value: &Value) -> bool {
        value.value_type() == self.value_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Alert,
    Data,
}

/// An alert or data format declared by a device model.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSpec {
    pub urn: String,
    pub name: String,
    pub kind: FormatKind,
    pub description: String,
    pub fields: Vec<FieldSpec>,
}

impl FormatSpec {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub name: String,
    /// Type of the single argument, if the action takes one.
    pub argument: Option<ValueType>,
}

// ───────────────────────────────────────────────────────────────
// Device model port
// ───────────────────────────────────────────────────────────────

/// Read-only view of a device model.
pub trait DeviceModel: Send + Sync {
    fn urn(&self) -> &str;

    /// Resolve an attribute: type, optional flag and default.
    fn attribute(&self, name: &str) -> Option<&FieldSpec>;

    fn attributes(&self) -> &[FieldSpec];

    /// Look up an alert or data format by its short name or its URN.
    fn format(&self, name_or_urn: &str) -> Option<&FormatSpec>;

    fn action(&self, name: &str) -> Option<&ActionSpec>;
}

// ───────────────────────────────────────────────────────────────
// In-memory implementation
// ───────────────────────────────────────────────────────────────

/// A device model assembled in code.
///
/// ```
/// use edgelink::device::model::{FieldSpec, StaticDeviceModel, ValueType};
///
/// let model = StaticDeviceModel::new("urn:com:example:thermostat")
///     .with_attribute(FieldSpec::new("temperature", ValueType::Number))
///     .with_attribute(FieldSpec::new("setpoint", ValueType::Number).writable())
///     .with_alert(
///         "tooHot",
///         "urn:com:example:thermostat:tooHot",
///         "Temperature above limit",
///         vec![FieldSpec::new("temp", ValueType::Number)],
///     );
/// # let _ = model;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceModel {
    urn: String,
    attributes: Vec<FieldSpec>,
    formats: Vec<FormatSpec>,
    actions: Vec<ActionSpec>,
}

impl StaticDeviceModel {
    pub fn new(urn: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, spec: FieldSpec) -> Self {
        self.attributes.retain(|a| a.name != spec.name);
        self.attributes.push(spec);
        self
    }

    #[must_use]
    pub fn with_alert(
        self,
        name: impl Into<String>,
        urn: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<FieldSpec>,
    ) -> Self {
        self.push_format(FormatKind::Alert, name, urn, description, fields)
    }

    #[must_use]
    pub fn with_data(
        self,
        name: impl Into<String>,
        urn: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<FieldSpec>,
    ) -> Self {
        self.push_format(FormatKind::Data, name, urn, description, fields)
    }

    #[must_use]
    pub fn with_action(mut self, name: impl Into<String>, argument: Option<ValueType>) -> Self {
        self.actions.push(ActionSpec {
            name: name.into(),
            argument,
        });
        self
    }

    fn push_format(
        mut self,
        kind: FormatKind,
        name: impl Into<String>,
        urn: impl Into<String>,
        description: impl Into<String>,
        fields: Vec<FieldSpec>,
    ) -> Self {
        self.formats.push(FormatSpec {
            urn: urn.into(),
            name: name.into(),
            kind,
            description: description.into(),
            fields,
        });
        self
    }
}

impl DeviceModel for StaticDeviceModel {
    fn urn(&self) -> &str {
        &self.urn
    }

    fn attribute(&self, name: &str) -> Option<&FieldSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    fn attributes(&self) -> &[FieldSpec] {
        &self.attributes
    }

    fn format(&self, name_or_urn: &str) -> Option<&FormatSpec> {
        self.formats
            .iter()
            .find(|f| f.name == name_or_urn || f.urn == name_or_urn)
    }

    fn action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.name == name)
    }
}
