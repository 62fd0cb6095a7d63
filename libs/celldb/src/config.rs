//! Database configuration.
//!
//! ```toml
//! connectivity = "blocks"
//! insertion_sort_threshold = 32
//! verify = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connectivity::EngineKind;
use crate::error::Result;

/// The default size below which the sorted connectivity index switches to
/// binary insertion sort.
pub const DEFAULT_INSERTION_SORT_THRESHOLD: usize = 32;

/// Configuration for a cell database.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    /// The connectivity engine answering [`Snapshot::connections`](crate::Snapshot::connections).
    pub connectivity: EngineKind,
    /// Range size below which the sorted index uses binary insertion sort.
    pub insertion_sort_threshold: usize,
    /// Re-check every derived revision and assert equivalence closure
    /// invariants. Slow; intended for tests.
    pub verify: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            connectivity: EngineKind::default(),
            insertion_sort_threshold: DEFAULT_INSERTION_SORT_THRESHOLD,
            verify: cfg!(debug_assertions),
        }
    }
}

impl DbConfig {
    /// Parses a configuration from TOML.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        Ok(config.normalized())
    }

    /// Reads a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "loading cell database configuration");
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    fn normalized(mut self) -> Self {
        // Binary insertion needs at least a pair to partition around.
        self.insertion_sort_threshold = self.insertion_sort_threshold.max(2);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn parses_partial_config() {
        let config = DbConfig::from_toml_str("connectivity = \"sorted_keys\"\nverify = false").unwrap();
        assert_eq!(config.connectivity, EngineKind::SortedKeys);
        assert_eq!(config.insertion_sort_threshold, DEFAULT_INSERTION_SORT_THRESHOLD);
        assert!(!config.verify);
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(DbConfig::from_toml_str("threads = 4").is_err());
    }

    #[test]
    fn clamps_threshold() {
        let config = DbConfig::from_toml_str("insertion_sort_threshold = 0").unwrap();
        assert_eq!(config.insertion_sort_threshold, 2);
    }

    #[test]
    fn empty_config_is_default() {
        assert_eq!(DbConfig::from_toml_str("").unwrap(), DbConfig::default());
    }
}
