//! Link configuration

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{LinkError, LinkResult};
use crate::types::ServiceId;

/// Service record name peers register under
pub const DEFAULT_SERVICE_NAME: &str = "RfChat";

/// Serial-port style service UUID shared by every peer
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0xfa87c0d0_afac_11de_8a39_0800200c9a66);

/// Largest chunk delivered by a single session read
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for a link manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Service record name used when listening
    pub service_name: String,
    /// Service UUID used for both listening and connecting
    pub service_uuid: Uuid,
    /// Read buffer size of the session pump
    pub read_buffer_size: usize,
    /// RFCOMM channel used by the Bluetooth transport
    pub rfcomm_channel: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_uuid: DEFAULT_SERVICE_UUID,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            rfcomm_channel: 1,
        }
    }
}

impl LinkConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set service record name
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set service UUID
    pub fn with_service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = uuid;
        self
    }

    /// Set session read buffer size
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set RFCOMM channel
    pub fn with_rfcomm_channel(mut self, channel: u8) -> Self {
        self.rfcomm_channel = channel;
        self
    }

    /// Service identity derived from this configuration
    pub fn service(&self) -> ServiceId {
        ServiceId::new(self.service_name.clone(), self.service_uuid)
    }

    pub fn validate(&self) -> LinkResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(LinkError::InvalidConfiguration {
                reason: "Service name must not be empty".to_string(),
            });
        }
        if self.read_buffer_size == 0 {
            return Err(LinkError::InvalidConfiguration {
                reason: "Read buffer size must be greater than 0".to_string(),
            });
        }
        // Reads are delivered as chunks of at most one default buffer
        if self.read_buffer_size > DEFAULT_READ_BUFFER_SIZE {
            return Err(LinkError::InvalidConfiguration {
                reason: format!(
                    "Read buffer size {} exceeds the {} byte chunk limit",
                    self.read_buffer_size, DEFAULT_READ_BUFFER_SIZE
                ),
            });
        }
        // RFCOMM channels are 1..=30
        if !(1..=30).contains(&self.rfcomm_channel) {
            return Err(LinkError::InvalidConfiguration {
                reason: format!("RFCOMM channel {} out of range 1-30", self.rfcomm_channel),
            });
        }
        Ok(())
    }
}
