use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{InspectorError, Result};

/// Inspector configuration
///
/// Every field has a default, so a YAML file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InspectorConfig {
    /// Delay between commit lock polls (ms)
    pub lock_poll_interval_ms: u64,

    /// Number of polls before a lock acquire times out
    pub lock_attempts: u32,

    /// Settle delay after a click/change commit (ms)
    pub settle_delay_ms: u64,

    /// How long the overlay shows the error state (ms)
    pub error_flash_ms: u64,

    /// Maximum ancestor levels the css finder may climb
    pub finder_threshold: usize,

    /// Maximum candidate selectors the css finder may test
    pub finder_max_tries: usize,

    /// Attributes captured in each ancestor frame of a scanned node
    pub attribute_names: Vec<String>,

    /// Test-id style attributes tried by the `css:attributes` strategy
    pub data_attributes: Vec<String>,

    /// Attributes preferred by the `xpath:attributes` strategy
    pub preferred_attributes: Vec<String>,

    /// Longest text the `xpath:inner-text` strategy will embed
    pub inner_text_max_length: usize,

    /// Clear the action list after every flush
    pub clear_on_flush: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            lock_poll_interval_ms: 10,
            lock_attempts: 200,
            settle_delay_ms: 750,
            error_flash_ms: 1250,
            finder_threshold: 1000,
            finder_max_tries: 10000,
            attribute_names: strings(&[
                "id",
                "name",
                "class",
                "title",
                "href",
                "for",
                "type",
                "value",
                "placeholder",
                "aria-label",
                "role",
            ]),
            data_attributes: strings(&[
                "data-testid",
                "data-test-id",
                "data-test",
                "data-qa",
                "data-cy",
                "data-id",
            ]),
            preferred_attributes: strings(&["id", "name", "value", "type", "action", "onclick"]),
            inner_text_max_length: 64,
            clear_on_flush: false,
        }
    }
}

impl InspectorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| InspectorError::Config(e.to_string()))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| InspectorError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    /// Total time an acquire may wait
    pub fn lock_timeout(&self) -> Duration {
        self.lock_poll_interval() * self.lock_attempts
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn error_flash(&self) -> Duration {
        Duration::from_millis(self.error_flash_ms)
    }
}
