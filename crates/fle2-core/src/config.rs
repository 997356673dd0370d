//! Runtime configuration for query-time tag materialization.

use fle2_error::{FleError, Result};
use serde::{Deserialize, Serialize};

/// Default serialized tag-array budget: 14 MiB.
pub const DEFAULT_MEMORY_LIMIT_BYTES: usize = 14 * 1024 * 1024;

/// Default ceiling on an accepted contention maximum.
pub const DEFAULT_MAX_CONTENTION_FACTOR: u64 = u32::MAX as u64;

/// Which state-collection layout the tags are read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryProtocol {
    /// ESC counters minus ECC delete ranges.
    V1,
    /// ESC anchors; no delete walk.
    #[default]
    V2,
}

impl QueryProtocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fle2Config {
    pub memory_limit_bytes: usize,
    pub protocol: QueryProtocol,
    /// Answer all v2 contention factors with one count-info call.
    pub batch_edges: bool,
    pub max_contention_factor: u64,
}

impl Default for Fle2Config {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            protocol: QueryProtocol::default(),
            batch_edges: true,
            max_contention_factor: DEFAULT_MAX_CONTENTION_FACTOR,
        }
    }
}

impl Fle2Config {
    /// Parse and validate. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`FleError::Config`] for malformed TOML or an invalid value.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|error| FleError::config(format!("failed to parse config: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`FleError::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|error| FleError::config(format!("failed to render config: {error}")))
    }

    /// # Errors
    ///
    /// Returns [`FleError::Config`] for a zero memory limit.
    pub fn validate(&self) -> Result<()> {
        if self.memory_limit_bytes == 0 {
            return Err(FleError::config("memory_limit_bytes must be positive"));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`FleError::Config`] when `max_contention` exceeds the
    /// configured ceiling.
    pub fn check_contention(&self, max_contention: u64) -> Result<()> {
        if max_contention > self.max_contention_factor {
            return Err(FleError::config(format!(
                "contention maximum {max_contention} exceeds configured ceiling {}",
                self.max_contention_factor
            )));
        }
        Ok(())
    }
}
