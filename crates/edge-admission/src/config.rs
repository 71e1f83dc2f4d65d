//! Gate parameters and startup configuration.
//!
//! [`GateConfig`] is the value that decides whether a route's gate can be
//! reused across route-table rebuilds, so it stays a plain `Copy + Eq` value
//! with no references or collections inside.
//!
//! [`AdmissionConfig`] is the startup configuration (global fallback gate and
//! named groups). It can be loaded from YAML, TOML, JSON or JSON5
//! with `${VAR}` / `$VAR` environment substitution.

use crate::error::{ConfigError, ConfigResult};
use config::{Config as Cfg, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// GateConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Limits for a single gate.
///
/// Always valid: `max_concurrency > 0` and `timeout >= 1 ms`. A zero timeout
/// is rejected rather than read as "fail fast"; a route that must never queue
/// uses `max_stack_size = 0` instead. The timeout is kept at millisecond
/// resolution, the unit it is configured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawGateConfig", into = "RawGateConfig")]
pub struct GateConfig {
    max_concurrency: usize,
    max_stack_size: usize,
    timeout: Duration,
}

impl GateConfig {
    /// Create a validated gate config.
    pub fn new(
        max_concurrency: usize,
        max_stack_size: usize,
        timeout: Duration,
    ) -> ConfigResult<Self> {
        if max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if timeout.as_millis() == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(Self {
            max_concurrency,
            max_stack_size,
            timeout,
        })
    }

    /// Maximum number of simultaneously admitted callers.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Maximum number of callers waiting for a slot.
    pub fn max_stack_size(&self) -> usize {
        self.max_stack_size
    }

    /// How long a caller may wait on the stack before failing.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for GateConfig {
    /// Used for groups referenced by a route but missing from the startup
    /// configuration.
    fn default() -> Self {
        Self {
            max_concurrency: 100,
            max_stack_size: 100,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Wire shape of [`GateConfig`]; the timeout travels as milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawGateConfig {
    max_concurrency: usize,
    #[serde(default)]
    max_stack_size: usize,
    timeout_ms: u64,
}

impl TryFrom<RawGateConfig> for GateConfig {
    type Error = ConfigError;

    fn try_from(raw: RawGateConfig) -> Result<Self, Self::Error> {
        GateConfig::new(
            raw.max_concurrency,
            raw.max_stack_size,
            Duration::from_millis(raw.timeout_ms),
        )
    }
}

impl From<GateConfig> for RawGateConfig {
    fn from(config: GateConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            max_stack_size: config.max_stack_size,
            timeout_ms: u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AdmissionConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Startup configuration handed to [`GateRegistry`](crate::registry::GateRegistry).
///
/// ```yaml
/// global:
///   max_concurrency: 1000
///   max_stack_size: 500
///   timeout_ms: 5000
/// groups:
///   search:
///     max_concurrency: 20
///     max_stack_size: 40
///     timeout_ms: 2000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Fallback gate for routes without an admission filter.
    pub global: Option<GateConfig>,
    /// Static limits for each named group.
    pub groups: HashMap<String, GateConfig>,
}

impl AdmissionConfig {
    /// Builder: set the global fallback gate.
    pub fn with_global(mut self, config: GateConfig) -> Self {
        self.global = Some(config);
        self
    }

    /// Builder: add a named group.
    pub fn with_group(mut self, name: impl Into<String>, config: GateConfig) -> Self {
        self.groups.insert(name.into(), config);
        self
    }

    /// Load from a YAML, TOML, JSON or JSON5 file, picking the format from
    /// its extension.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let format = file_format(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse `content`, replacing `${VAR}` / `$VAR` with environment values
    /// first. Unset variables are left untouched.
    pub fn parse(content: &str, format: FileFormat) -> ConfigResult<Self> {
        let substituted = substitute_env_vars(content)?;

        Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ConfigError::Serialization(e.to_string()))
    }
}

fn file_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("no file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

fn substitute_env_vars(content: &str) -> ConfigResult<String> {
    let braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    let bare =
        Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").map_err(|e| ConfigError::Parse(e.to_string()))?;

    let result = braced.replace_all(content, env_lookup).to_string();
    Ok(bare.replace_all(&result, env_lookup).to_string())
}

fn env_lookup(caps: &regex::Captures<'_>) -> String {
    std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
}
