//! # Configuration
//!
//! Runtime switches for the allocators, loaded once at startup from TOML.
//!
//! ```toml
//! [pool]
//! trace_events = false
//! warn_on_leak = true
//!
//! [tracking]
//! trace_events = true
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};

/// Settings for [`PoolAllocator`](crate::PoolAllocator).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Emit a `trace` event for every construct and destruct.
    pub trace_events: bool,
    /// Emit a `warn` event when a pool is dropped with live objects.
    pub warn_on_leak: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            trace_events: false,
            warn_on_leak: true,
        }
    }
}

/// Settings for [`TrackingAllocator`](crate::TrackingAllocator).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Emit a `trace` event for every allocate and deallocate.
    pub trace_events: bool,
}

/// Top-level configuration file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemlabConfig {
    /// Pool allocator settings.
    pub pool: PoolConfig,
    /// Tracking allocator settings.
    pub tracking: TrackingConfig,
}

impl MemlabConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] if the text is not valid TOML or
    /// a field has the wrong type.
    pub fn from_toml_str(text: &str) -> MemoryResult<Self> {
        toml::from_str(text).map_err(|e| MemoryError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}
