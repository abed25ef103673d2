//! Runtime configuration, loaded from TOML with environment overrides.

use crate::error::VmError;
use crate::vm::STACK_SIZE;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Stop the run loop after this many instructions
    pub max_instructions: Option<u64>,
    /// Seed for a predictable `random` sequence
    pub random_seed: Option<u64>,
    /// Maximum value stack depth
    pub stack_limit: usize,
    /// Log every executed instruction
    pub trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_instructions: None,
            random_seed: None,
            stack_limit: STACK_SIZE,
            trace: false,
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, VmError> {
        toml::from_str(source).map_err(|e| VmError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VmError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| VmError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// Apply `STONY_*` environment variables on top of this configuration
    pub fn with_env_overrides(self) -> Result<Self, VmError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, VmError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("STONY_MAX_INSTRUCTIONS") {
            self.max_instructions = Some(parse_number("STONY_MAX_INSTRUCTIONS", &value)?);
        }
        if let Some(value) = lookup("STONY_RANDOM_SEED") {
            self.random_seed = Some(parse_number("STONY_RANDOM_SEED", &value)?);
        }
        if let Some(value) = lookup("STONY_STACK_LIMIT") {
            self.stack_limit = parse_number("STONY_STACK_LIMIT", &value)?;
        }
        if let Some(value) = lookup("STONY_TRACE") {
            self.trace = matches!(value.trim(), "1" | "true" | "yes" | "on");
        }
        Ok(self)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, VmError> {
    value
        .trim()
        .parse()
        .map_err(|_| VmError::Config(format!("{} is not a valid number: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_log::test;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.stack_limit, 1024);
        assert!(!config.trace);
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml_str(
            "max_instructions = 5000\nrandom_seed = 42\nstack_limit = 64\ntrace = true\n",
        )
        .unwrap();
        assert_eq!(config.max_instructions, Some(5000));
        assert_eq!(config.random_seed, Some(42));
        assert_eq!(config.stack_limit, 64);
        assert!(config.trace);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            Config::from_toml_str("speed = 3"),
            Err(VmError::Config(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("STONY_MAX_INSTRUCTIONS", "10"),
            ("STONY_TRACE", "1"),
            ("STONY_STACK_LIMIT", " 32 "),
        ]
        .into_iter()
        .collect();
        let config = Config::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.max_instructions, Some(10));
        assert_eq!(config.stack_limit, 32);
        assert!(config.trace);
        assert_eq!(config.random_seed, None);
    }

    #[test]
    fn test_bad_override() {
        let result = Config::default().with_overrides(|key| {
            (key == "STONY_RANDOM_SEED").then(|| "abc".to_string())
        });
        assert!(matches!(result, Err(VmError::Config(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/stony.toml"),
            Err(VmError::Config(_))
        ));
    }
}
