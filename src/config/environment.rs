//! Deployment environment used to pick layered configuration files

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;

/// Deployment stage; selects the `{environment}.toml` overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

/// Accepted spellings, canonical name first
const NAMES: [(Environment, &[&str]); 4] = [
    (Environment::Development, &["development", "dev"]),
    (Environment::Test, &["test"]),
    (Environment::Staging, &["staging", "stage"]),
    (Environment::Production, &["production", "prod"]),
];

impl Environment {
    /// Variable consulted when neither `--env` nor the loader picks one
    pub const ENV_VAR: &'static str = "PODPUSH_APP_ENV";

    /// Environment named by `PODPUSH_APP_ENV`, or `Development` when the
    /// variable is unset or unrecognized
    pub fn from_env() -> Self {
        std::env::var(Self::ENV_VAR)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Overlay file read after `default.toml`
    pub fn config_file_name(&self) -> String {
        format!("{}.toml", self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        NAMES
            .iter()
            .find(|(_, names)| names.contains(&wanted.as_str()))
            .map(|(env, _)| *env)
            .ok_or_else(|| {
                let valid: Vec<&str> = NAMES.iter().map(|(_, names)| names[0]).collect();
                ConfigError::EnvVarError(format!(
                    "Invalid environment '{}'. Valid values are: {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_names_and_aliases() {
        for (env, names) in NAMES {
            for name in names {
                assert_eq!(name.parse::<Environment>().unwrap(), env);
                assert_eq!(name.to_uppercase().parse::<Environment>().unwrap(), env);
            }
        }
    }

    #[test]
    fn test_canonical_name_round_trips() {
        for (env, _) in NAMES {
            assert_eq!(env.as_str().parse::<Environment>().unwrap(), env);
            assert_eq!(env.to_string(), env.as_str());
        }
    }

    #[test]
    fn test_overlay_file_name() {
        assert_eq!(Environment::Staging.config_file_name(), "staging.toml");
        assert_eq!(Environment::default().config_file_name(), "development.toml");
    }

    #[test]
    fn test_unknown_environment_lists_valid_values() {
        let err = "qa".parse::<Environment>().unwrap_err();
        assert!(err.to_string().contains("development, test, staging, production"));
    }
}
