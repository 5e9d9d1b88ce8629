//! Engine configuration.
//!
//! # Responsibility
//! - Hold the tunables of validation and propagation.
//! - Parse and validate configuration supplied by the host application.
//!
//! # Invariants
//! - `debounce_secs` is strictly positive.
//! - Missing keys fall back to `EngineConfig::default()`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use time::Duration;

/// Default propagation threshold: one day.
pub const DEFAULT_DEBOUNCE_SECS: i64 = 86_400;

/// How far dependency-of-dependency conflicts are searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitiveCheck {
    /// Only the dependencies of direct dependencies (and dependents of
    /// direct dependents) are inspected.
    #[default]
    OneHop,
    /// The full transitive closure is inspected, which also rejects
    /// precedence cycles of any length.
    FullClosure,
}

/// Validation and propagation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minimum date delta, in seconds, that triggers a cascade step.
    pub debounce_secs: i64,
    pub transitive_check: TransitiveCheck,
    /// Reject creations whose start is later than a child's start.
    pub enforce_child_start_on_create: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_secs: DEFAULT_DEBOUNCE_SECS,
            transitive_check: TransitiveCheck::OneHop,
            enforce_child_start_on_create: true,
        }
    }
}

impl EngineConfig {
    /// Parses a JSON document and validates the result.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_secs <= 0 {
            return Err(ConfigError::NonPositiveDebounce(self.debounce_secs));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::seconds(self.debounce_secs)
    }
}

/// Configuration parse/validation failures.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    NonPositiveDebounce(i64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
            Self::NonPositiveDebounce(value) => {
                write!(f, "debounce_secs must be positive, got {value}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::NonPositiveDebounce(_) => None,
        }
    }
}
