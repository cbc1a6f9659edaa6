//! Device identity: the 3-character tag prefixed to every generated ID.
//!
//! Tags are assigned externally (provisioning, first-run registration);
//! this module only normalizes and persists them. Collision freedom across
//! installations rests entirely on no two devices sharing a tag.

use crate::error::{MintError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exact length of a device tag.
pub const TAG_LEN: usize = 3;

/// Durable-cache key holding the installation's tag.
pub const DEVICE_NUMBER_KEY: &str = "DeviceNumber";

/// Secondary durable-cache key; kept in sync with [`DEVICE_NUMBER_KEY`] for
/// compatibility with stores written by older installations.
pub const LAST_USED_PREFIX_KEY: &str = "LastUsedPrefix";

/// A normalized 3-character device tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTag(String);

impl DeviceTag {
    /// Normalize an externally supplied tag: shorter values are right-padded
    /// with `'0'`, longer values truncated to exactly [`TAG_LEN`] characters.
    /// Characters outside `[A-Za-z0-9]` are rejected, not sanitized.
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(MintError::DeviceIdentity("empty device tag".to_string()));
        }
        let mut tag: String = trimmed.chars().take(TAG_LEN).collect();
        // The tag is embedded in every ID's `[A-Za-z0-9]{3}` prefix and in
        // the scan's LIKE pattern; anything outside that alphabet would
        // make every ID of this device read as corrupt downstream.
        if !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MintError::DeviceIdentity(format!(
                "device tag {raw:?} contains characters outside [A-Za-z0-9]"
            )));
        }
        while tag.chars().count() < TAG_LEN {
            tag.push('0');
        }
        Ok(DeviceTag(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supplies the raw device tag for this installation.
///
/// Resolved once per allocator lifetime; the allocator persists the
/// normalized tag into the durable cache and falls back to that persisted
/// copy if the provider fails on a later run.
pub trait DeviceIdentity: Send + Sync {
    fn device_tag(&self) -> Result<String>;
}

/// A fixed, pre-provisioned device tag. Also the identity used in tests.
pub struct FixedDeviceIdentity(String);

impl FixedDeviceIdentity {
    pub fn new(tag: impl Into<String>) -> Self {
        FixedDeviceIdentity(tag.into())
    }
}

impl DeviceIdentity for FixedDeviceIdentity {
    fn device_tag(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}
