use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{FileLockService, ThreadError};

/// Settings for minting thread keys.
///
/// Every field has a default, so a partial (or empty) JSON document is a
/// valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Prefix of every lock name; writers only exclude each other when they
    /// share a namespace
    pub namespace: String,

    /// Longest key (including the trailing `/`) that may be minted, or no
    /// limit at all
    pub max_key_length: Option<usize>,

    /// Where [FileLockService] keeps its lock files
    pub lock_directory: Option<PathBuf>,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            namespace: "thread".to_string(),
            max_key_length: Some(255),
            lock_directory: None,
        }
    }
}

impl ThreadConfig {
    /// Read a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ThreadError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The configured lock directory, or `colloquy-locks` in the system
    /// temporary directory
    pub fn lock_directory(&self) -> PathBuf {
        self.lock_directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("colloquy-locks"))
    }

    /// A [FileLockService] over [ThreadConfig::lock_directory]
    pub fn file_lock_service(&self) -> Result<FileLockService, ThreadError> {
        Ok(FileLockService::new(self.lock_directory())?)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn it_fills_in_defaults() -> Result<()> {
        assert_eq!(ThreadConfig::from_json("{}")?, ThreadConfig::default());

        let config = ThreadConfig::from_json(r#"{ "namespace": "comment", "max_key_length": null }"#)?;
        assert_eq!(config.namespace, "comment");
        assert_eq!(config.max_key_length, None);

        Ok(())
    }

    #[test]
    fn it_reports_invalid_documents() {
        assert!(matches!(
            ThreadConfig::from_json(r#"{ "max_key_length": "long" }"#),
            Err(ThreadError::Configuration(_))
        ));
    }

    #[test]
    fn it_opens_file_locks_in_the_configured_directory() -> Result<()> {
        let tempdir = tempfile::tempdir()?;
        let config = ThreadConfig {
            lock_directory: Some(tempdir.path().join("locks")),
            ..ThreadConfig::default()
        };

        let locks = config.file_lock_service()?;
        assert_eq!(locks.directory(), &tempdir.path().join("locks"));
        assert!(tempdir.path().join("locks").is_dir());

        Ok(())
    }
}
