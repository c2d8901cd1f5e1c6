//! # Entity Manager Configuration
//!
//! Loaded once at startup, usually from a TOML file:
//!
//! ```toml
//! initial_capacity = 4096
//! sector_caches = 4
//! warn_on_component_overwrite = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EntityError, EntityResult};

/// Default pre-size for the id→cache map and loaded-id set.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1000;

/// Entity manager configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityManagerConfig {
    /// Pre-size of the id→cache map and the loaded-id set.
    pub initial_capacity: usize,
    /// Number of sector cache partitions created at startup (at least one).
    pub sector_caches: usize,
    /// Log when `add_component` replaces a component that already exists.
    pub warn_on_component_overwrite: bool,
}

impl Default for EntityManagerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            sector_caches: 1,
            warn_on_component_overwrite: true,
        }
    }
}

impl EntityManagerConfig {
    /// Parses a configuration from TOML text. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::InvalidConfig`] if the text is not valid TOML or
    /// a key has the wrong type.
    pub fn from_toml_str(text: &str) -> EntityResult<Self> {
        toml::from_str(text).map_err(|e| EntityError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::InvalidConfig`] if the file cannot be read or
    /// parsed.
    pub fn load(path: impl AsRef<Path>) -> EntityResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EntityError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Number of sector caches to create, never less than one.
    #[inline]
    #[must_use]
    pub fn sector_cache_count(&self) -> usize {
        self.sector_caches.max(1)
    }
}
