//! Virtual devices and their alert/data handles.
//!
//! ```text
//!   VirtualDevice ── set_* / finish_update ──▶ Data message (attributes)
//!        │
//!        ├── alert_handle() ─▶ AlertHandle ── raise  ──▶ Alert message
//!        └── data_handle()  ─▶ DataHandle  ── submit ──▶ Data message
//! ```

pub mod alert;
pub mod data;
mod fields;
pub mod model;
pub mod virtual_device;

pub use alert::AlertHandle;
pub use data::DataHandle;
pub use fields::MAX_FORMAT_FIELDS;
pub use model::{ActionSpec, DeviceModel, FieldSpec, FormatKind, FormatSpec, StaticDeviceModel};
pub use virtual_device::{ChangeEvent, ErrorEvent, VirtualDevice};
