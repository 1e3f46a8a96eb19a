//! Device identity types

use crate::constants::DEVICE_ID_MAX_LEN;
use crate::crypto::Digest32;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// A registered IoT device
///
/// `public_commitment` is immutable after creation. Deactivation forbids
/// authentication but preserves history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique printable identifier, `[A-Za-z0-9_-]`, at most 64 chars
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    /// `H("COMMIT" ‖ device_id ‖ H(secret))`
    pub public_commitment: Digest32,
    /// Unix seconds
    pub registered_at: u64,
    pub last_authenticated_at: Option<u64>,
    pub is_active: bool,
    pub total_data_submitted: u64,
}

impl Device {
    pub fn new(
        device_id: String,
        device_name: String,
        device_type: String,
        public_commitment: Digest32,
        registered_at: u64,
    ) -> Self {
        Self {
            device_id,
            device_name,
            device_type,
            public_commitment,
            registered_at,
            last_authenticated_at: None,
            is_active: true,
            total_data_submitted: 0,
        }
    }
}

/// Validate a device identifier against the protocol character set
pub fn validate_device_id(device_id: &str) -> Result<(), CoreError> {
    if device_id.is_empty() {
        return Err(CoreError::Validation("device_id must not be empty".to_string()));
    }
    if device_id.len() > DEVICE_ID_MAX_LEN {
        return Err(CoreError::Validation(format!(
            "device_id exceeds {} characters",
            DEVICE_ID_MAX_LEN
        )));
    }
    if !device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(CoreError::Validation(
            "device_id may only contain [A-Za-z0-9_-]".to_string(),
        ));
    }
    Ok(())
}
