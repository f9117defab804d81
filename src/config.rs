//! Runtime configuration parameters
//!
//! All tunable sizes and timeouts for the messaging runtime.  Defaults
//! match a small, directly connected device; gateways with many virtual
//! devices will want a larger queue and registry.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hard ceiling on messages handed to the transport in one call.
/// Batches are stack-allocated with this capacity.
pub const MAX_BATCH_SIZE: usize = 16;

/// Maximum length (bytes) of a failure reason passed to error callbacks.
pub const FAIL_REASON_CAPACITY: usize = 256;

/// Core runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    // --- Dispatcher ---
    /// Maximum number of messages sent to the transport in one batch
    pub max_messages_for_send: usize,
    /// Total number of queued messages across all priority lanes
    pub queue_capacity: usize,

    // --- Request routing ---
    /// Maximum number of handler registrations
    pub max_resource_number: usize,
    /// How long one transport poll may block (milliseconds)
    pub polling_timeout_ms: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // Dispatcher
            max_messages_for_send: 5,
            queue_capacity: 64,

            // Request routing
            max_resource_number: 16,
            polling_timeout_ms: 5000,
        }
    }
}

impl ClientConfig {
    /// Reject values the runtime cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.max_messages_for_send == 0 || self.max_messages_for_send > MAX_BATCH_SIZE {
            return Err(Error::InvalidArgument);
        }
        if self.queue_capacity == 0 || self.max_resource_number == 0 {
            return Err(Error::InvalidArgument);
        }
        if self.polling_timeout_ms == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    pub fn polling_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.polling_timeout_ms))
    }
}
