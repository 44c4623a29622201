//! Layered application configuration.
//!
//! Resolution order (lowest to highest priority):
//! 1. `application.yaml` (base)
//! 2. `application-{profile}.yaml` (profile override)
//! 3. `.env` file (loaded into process environment, never overwrites an
//!    already-set variable)
//! 4. `.env.{profile}` file
//! 5. Environment variables (e.g. `APP_STORAGE_DSN` overrides
//!    `app.storage.dsn`)
//!
//! Profile is determined by `BASIN_PROFILE` env var > argument > `"dev"`.

mod loader;
pub mod secrets;
mod value;

use std::collections::HashMap;
use std::path::Path;

pub use value::{ConfigValue, FromConfigValue};

/// Error type for configuration operations.
#[derive(Debug)]
pub enum ConfigError {
    NotFound(String),
    TypeMismatch { key: String, expected: &'static str },
    Load(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "config key not found: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "config type mismatch for '{key}': expected {expected}")
            }
            ConfigError::Load(msg) => write!(f, "config load error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Application configuration loaded from YAML files, `.env` files, and
/// environment variables. Raw key-value access only; callers read the
/// handful of keys they need via [`BasinConfig::get`]/[`BasinConfig::get_or`].
#[derive(Debug, Clone)]
pub struct BasinConfig {
    values: HashMap<String, ConfigValue>,
    profile: String,
}

impl BasinConfig {
    /// Load configuration for the given default profile (overridden by
    /// `BASIN_PROFILE` if set).
    pub fn load(default_profile: &str) -> Result<Self, ConfigError> {
        let active_profile =
            std::env::var("BASIN_PROFILE").unwrap_or_else(|_| default_profile.to_string());

        let mut values = HashMap::new();
        loader::load_yaml_file(Path::new("application.yaml"), &mut values)?;
        let profile_path = format!("application-{active_profile}.yaml");
        loader::load_yaml_file(Path::new(&profile_path), &mut values)?;

        let _ = dotenvy::dotenv();
        let _ = dotenvy::from_filename(format!(".env.{active_profile}"));

        for (key, value) in values.clone() {
            if let ConfigValue::String(s) = &value {
                if s.contains("${") {
                    values.insert(key, ConfigValue::String(secrets::resolve_placeholders(s)?));
                }
            }
        }

        // Environment variables win last. Convention: `app.storage.dsn` <-> `APP_STORAGE_DSN`.
        for (env_key, env_val) in std::env::vars() {
            let config_key = env_key.to_lowercase().replace('_', ".");
            values.insert(config_key, ConfigValue::String(env_val));
        }

        Ok(BasinConfig {
            values,
            profile: active_profile,
        })
    }

    /// Build a config directly from a YAML string (used by tests).
    pub fn from_yaml_str(yaml: &str, profile: &str) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        loader::load_yaml_str(yaml, &mut values)?;
        Ok(BasinConfig {
            values,
            profile: profile.to_string(),
        })
    }

    /// An empty config, useful for tests that set values programmatically.
    pub fn empty() -> Self {
        BasinConfig {
            values: HashMap::new(),
            profile: "test".to_string(),
        }
    }

    pub fn set(&mut self, key: &str, value: ConfigValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get<V: FromConfigValue>(&self, key: &str) -> Result<V, ConfigError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ConfigError::NotFound(key.to_string()))?;
        V::from_config_value(value, key)
    }

    pub fn get_or<V: FromConfigValue>(&self, key: &str, default: V) -> V {
        self.get(key).unwrap_or(default)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_yaml_into_dotted_keys() {
        let config = BasinConfig::from_yaml_str(
            "app:\n  dev_mode: true\n  storage:\n    backend: memory\n",
            "test",
        )
        .unwrap();
        assert!(config.get_or::<bool>("app.dev_mode", false));
        assert_eq!(config.get::<String>("app.storage.backend").unwrap(), "memory");
    }

    #[test]
    fn missing_key_falls_back_to_default() {
        let config = BasinConfig::empty();
        assert_eq!(config.get_or::<i64>("app.handler_timeout_ms", 5000), 5000);
    }
}
