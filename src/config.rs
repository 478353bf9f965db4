//! Configuration for discovery, circuit breakers and logging
//!
//! Loaded from a TOML or JSON file, then overridden by `SERVICEKIT_*`
//! environment variables:
//!
//! ```toml
//! [discovery]
//! name = "edge"
//! notify_exporters_on_update = true
//!
//! [breaker]          # defaults for every breaker
//! max_failures = 5
//! reset_timeout_ms = 30000
//!
//! [breakers.payments]
//! max_failures = 2
//! timeout_ms = 500
//!
//! [logging]
//! level = "debug"
//! format = "compact"
//! ```
//!
//! Environment variables name a section and a key: `SERVICEKIT_DISCOVERY_NAME`,
//! `SERVICEKIT_BREAKER_MAX_FAILURES`, `SERVICEKIT_LOG_LEVEL`. Values are
//! parsed according to the type of the key they replace.

use crate::error::{ConfigError, Result};
use crate::logging::LogConfig;
use armature_circuit::{CircuitBreakerOptions, CircuitBreakers};
use armature_discovery::{DiscoveryOptions, ServiceDiscovery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "SERVICEKIT";

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            _ => None,
        }
    }

    /// Auto-detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        Self::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", ext)))
    }
}

/// Service kit configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceKitConfig {
    /// Discovery registry options
    pub discovery: DiscoveryOptions,

    /// Defaults for breakers without their own section
    pub breaker: CircuitBreakerOptions,

    /// Per-breaker options, by breaker name
    pub breakers: HashMap<String, CircuitBreakerOptions>,

    /// Logging setup
    pub logging: LogConfig,
}

impl ServiceKitConfig {
    /// Parse configuration from a string
    pub fn parse(content: &str, format: FileFormat) -> Result<Self> {
        let value: Value = match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))?,
            FileFormat::Toml => toml::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?,
        };

        serde_json::from_value(value).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load configuration from a file, detecting the format from its extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_path(path)?;
        let content = fs::read_to_string(path)?;

        debug!(path = %path.display(), ?format, "Loading configuration file");
        Self::parse(&content, format)
    }

    /// Load from an optional file, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SERVICEKIT_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply overrides from `(variable, value)` pairs.
    ///
    /// Variables without the prefix are skipped. Unknown sections and keys
    /// are logged and skipped; values that do not parse are errors.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut value = serde_json::to_value(&*self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        let mut applied = 0usize;

        for (variable, raw) in vars {
            let Some(rest) = variable
                .strip_prefix(ENV_PREFIX)
                .and_then(|rest| rest.strip_prefix('_'))
            else {
                continue;
            };
            let Some((section, key)) = rest.split_once('_') else {
                continue;
            };

            let section = match section {
                "DISCOVERY" => "discovery",
                "BREAKER" => "breaker",
                "LOG" | "LOGGING" => "logging",
                _ => {
                    warn!(variable = %variable, "Ignoring unknown configuration section");
                    continue;
                }
            };
            let key = key.to_lowercase();

            let Some(target) = value.get_mut(section).and_then(Value::as_object_mut) else {
                continue;
            };
            let Some(current) = target.get(&key) else {
                warn!(variable = %variable, "Ignoring unknown configuration key");
                continue;
            };

            let parsed = coerce(&raw, current)
                .map_err(|message| ConfigError::ParseError(format!("{}: {}", variable, message)))?;
            target.insert(key, parsed);
            applied += 1;
        }

        if applied > 0 {
            *self = serde_json::from_value(value)
                .map_err(|e| ConfigError::ParseError(format!("Environment override: {}", e)))?;
            debug!(applied, "Applied environment overrides");
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        not_empty(&self.discovery.name, "discovery.name")?;
        not_empty(&self.discovery.announce_address, "discovery.announce_address")?;
        not_empty(&self.discovery.usage_address, "discovery.usage_address")?;
        if self.discovery.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "discovery.event_capacity must be positive".to_string(),
            ));
        }

        validate_breaker("breaker", &self.breaker)?;
        for (name, options) in &self.breakers {
            not_empty(name, "breaker name")?;
            validate_breaker(&format!("breakers.{}", name), options)?;
        }
        Ok(())
    }

    /// Options for the named breaker, falling back to the defaults.
    pub fn breaker_options(&self, name: &str) -> CircuitBreakerOptions {
        self.breakers
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.breaker.clone())
    }

    /// Create the configured breakers. Unnamed breakers requested later
    /// get the default options.
    pub fn build_breakers(&self) -> CircuitBreakers {
        let breakers = CircuitBreakers::with_defaults(self.breaker.clone());
        for (name, options) in &self.breakers {
            breakers.get_or_create_with(name, options.clone());
        }
        breakers
    }

    /// Create a discovery registry with the configured options.
    pub fn build_discovery(&self) -> ServiceDiscovery {
        ServiceDiscovery::create(self.discovery.clone())
    }
}

/// Load a `.env` file into the process environment.
///
/// Without a path, a missing `.env` in the working directory is ignored.
pub fn load_dotenv(path: Option<&str>) -> Result<()> {
    if let Some(path) = path {
        dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
    } else {
        dotenvy::dotenv().ok();
    }
    Ok(())
}

fn coerce(raw: &str, current: &Value) -> std::result::Result<Value, String> {
    match current {
        Value::Bool(_) => raw
            .trim()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|e| e.to_string()),
        Value::Number(_) => match serde_json::from_str::<Value>(raw.trim()) {
            Ok(number @ Value::Number(_)) => Ok(number),
            _ => Err(format!("expected a number, got '{}'", raw)),
        },
        Value::String(_) | Value::Null => Ok(Value::String(raw.to_string())),
        Value::Object(_) | Value::Array(_) => serde_json::from_str(raw).map_err(|e| e.to_string()),
    }
}

fn not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!("{} cannot be empty", field)));
    }
    Ok(())
}

fn validate_breaker(field: &str, options: &CircuitBreakerOptions) -> Result<()> {
    if options.max_failures == 0 {
        return Err(ConfigError::ValidationError(format!(
            "{}.max_failures must be positive",
            field
        )));
    }
    if options.reset_timeout_ms < -1 {
        return Err(ConfigError::ValidationError(format!(
            "{}.reset_timeout_ms must be -1 (disabled) or a duration",
            field
        )));
    }
    Ok(())
}
