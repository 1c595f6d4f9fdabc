//! Engine configuration.
//!
//! A [`WeaveConfig`] is handed explicitly to every component that needs it;
//! nothing in the engine reads global defaults. It can be loaded from JSON or
//! TOML, with every key optional:
//!
//! ```toml
//! list_delimiter = ";"
//! coalesce_recompute = true
//! defer_delay_ms = 0
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration shared by the resolver, evaluator, registrar and propagator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Default delimiter for `IN`/`NOT_IN` value lists.
    pub list_delimiter: String,
    /// Route change-triggered conditional recomputes through a coalescing
    /// deferred call instead of running them synchronously.
    pub coalesce_recompute: bool,
    /// Same as `coalesce_recompute`, for live reference propagation.
    pub coalesce_propagation: bool,
    /// Delay of the coalescing timer, in milliseconds. Zero means next tick.
    pub defer_delay_ms: u64,
    /// Compare text case-insensitively for `IS`/`IS_NOT`.
    pub case_insensitive_is: bool,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            list_delimiter: ",".to_string(),
            coalesce_recompute: true,
            coalesce_propagation: false,
            defer_delay_ms: 0,
            case_insensitive_is: true,
        }
    }
}

impl WeaveConfig {
    /// Configuration with every recompute and propagation run synchronously.
    pub fn immediate() -> Self {
        Self {
            coalesce_recompute: false,
            coalesce_propagation: false,
            ..Self::default()
        }
    }

    /// Load from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validated()
    }

    /// Load from a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validated()
    }

    /// The coalescing delay as a [`Duration`].
    pub fn defer_delay(&self) -> Duration {
        Duration::from_millis(self.defer_delay_ms)
    }

    fn validated(self) -> Result<Self> {
        if self.list_delimiter.is_empty() {
            return Err(Error::Config("list_delimiter must not be empty".into()));
        }
        Ok(self)
    }
}
