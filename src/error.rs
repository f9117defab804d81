//! Unified error type for the edgelink runtime.
//!
//! A single closed `Error` enum that every subsystem returns, so callers
//! handle exactly the same small set of outcomes whether they are queueing
//! a message, registering a handler or setting an attribute.  All variants
//! are `Copy` so they can be handed to error callbacks from the dispatcher
//! worker without allocation.
//!
//! Validation problems (`InvalidArgument`) are always reported synchronously
//! by the call that caused them.  Transport problems (`Fail`,
//! `CannotAuthorize`) only ever reach application code through the
//! dispatcher's error callback.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the runtime funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Error {
    /// Generic failure, including transport-level send failures and
    /// operations attempted after shutdown.
    Fail = 0x1,
    /// Allocation or capacity exhaustion (full queue, full registry).
    OutOfMemory = 0x2,
    /// Missing handle or name, unknown attribute/field, or type mismatch.
    InvalidArgument = 0x4,
    /// The transport rejected the credentials; passed through unmodified.
    CannotAuthorize = 0x8,
}

impl Error {
    /// Numeric code matching the wire-level result codes.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => write!(f, "operation failed"),
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::CannotAuthorize => write!(f, "cannot authorize"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Runtime-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
