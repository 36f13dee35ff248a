//! Datastore configuration
//!
//! Loaded from a JSON file or built in code. Every field has a default,
//! so `{}` is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::Sha256Digest;
use crate::observability::Severity;

use super::errors::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Minimum severity written by the logger: trace, info, warn, error or fatal
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Longest ancestor path accepted with a replicated revision
    #[serde(default = "default_max_revision_history")]
    pub max_revision_history: usize,

    /// Hex characters kept from the SHA-256 content digest
    #[serde(default = "default_digest_length")]
    pub digest_length: usize,

    /// Document trees kept in memory before idle ones are evicted
    #[serde(default = "default_tree_cache_capacity")]
    pub tree_cache_capacity: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_revision_history() -> usize {
    1000
}
fn default_digest_length() -> usize {
    Sha256Digest::DEFAULT_LENGTH
}
fn default_tree_cache_capacity() -> usize {
    1024
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            max_revision_history: default_max_revision_history(),
            digest_length: default_digest_length(),
            tree_cache_capacity: default_tree_cache_capacity(),
        }
    }
}

impl DatastoreConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(content: &str) -> StoreResult<Self> {
        let config: DatastoreConfig = serde_json::from_str(content)
            .map_err(|e| StoreError::Config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if Severity::parse(&self.log_level).is_none() {
            return Err(StoreError::Config(format!(
                "Invalid log_level: '{}'",
                self.log_level
            )));
        }
        if self.max_revision_history == 0 {
            return Err(StoreError::Config(
                "max_revision_history must be > 0".to_string(),
            ));
        }
        if self.tree_cache_capacity == 0 {
            return Err(StoreError::Config(
                "tree_cache_capacity must be > 0".to_string(),
            ));
        }
        if !(Sha256Digest::MIN_LENGTH..=Sha256Digest::MAX_LENGTH).contains(&self.digest_length) {
            return Err(StoreError::Config(format!(
                "digest_length must be between {} and {}",
                Sha256Digest::MIN_LENGTH,
                Sha256Digest::MAX_LENGTH
            )));
        }
        Ok(())
    }

    /// Parsed log level. Falls back to INFO for unvalidated configs.
    pub fn severity(&self) -> Severity {
        Severity::parse(&self.log_level).unwrap_or(Severity::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = DatastoreConfig::from_json("{}").unwrap();
        assert_eq!(config, DatastoreConfig::default());
        assert_eq!(config.max_revision_history, 1000);
        assert_eq!(config.digest_length, 32);
        assert_eq!(config.tree_cache_capacity, 1024);
        assert_eq!(config.severity(), Severity::Info);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(DatastoreConfig::from_json(r#"{"log_level": "loud"}"#).is_err());
        assert!(DatastoreConfig::from_json(r#"{"max_revision_history": 0}"#).is_err());
        assert!(DatastoreConfig::from_json(r#"{"digest_length": 4}"#).is_err());
        assert!(DatastoreConfig::from_json(r#"{"tree_cache_capacity": 0}"#).is_err());
        assert!(DatastoreConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"log_level": "warn", "digest_length": 40}}"#).unwrap();
        let config = DatastoreConfig::load(file.path()).unwrap();
        assert_eq!(config.severity(), Severity::Warn);
        assert_eq!(config.digest_length, 40);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = DatastoreConfig::load(Path::new("/nonexistent/revtree.json")).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}
