//! Layered settings loading: TOML files under a config directory (or one
//! explicit file), then `PODPUSH_*` environment overrides.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};

use crate::config::environment::Environment as AppEnvironment;
use crate::config::error::ConfigError;
use crate::config::settings::Settings;

/// Environment variable for configuration directory
const CONFIG_DIR_ENV: &str = "PODPUSH_CONFIG_DIR";

/// Environment variable for specific configuration file
const CONFIG_FILE_ENV: &str = "PODPUSH_CONFIG_FILE";

/// Default configuration directory
const DEFAULT_CONFIG_DIR: &str = "config";

/// Environment variable prefix for configuration overrides
const ENV_PREFIX: &str = "PODPUSH";

/// Separator for nested configuration keys in environment variables
const ENV_SEPARATOR: &str = "__";

/// Configuration loader that handles layered configuration loading
///
/// The loader supports the following configuration sources (in order of priority):
/// 1. `default.toml` - Base default configuration (required)
/// 2. `{environment}.toml` - Environment-specific configuration (optional)
/// 3. `local.toml` - Local development overrides (optional)
/// 4. `PODPUSH_*` environment variables (highest priority)
#[derive(Debug)]
pub struct ConfigLoader {
    /// Configuration directory path
    config_dir: PathBuf,
    /// Specific configuration file path (if set, skips layered loading)
    config_file: Option<PathBuf>,
    /// Current application environment
    environment: AppEnvironment,
}

impl ConfigLoader {
    /// Create a new configuration loader
    ///
    /// This reads environment variables to determine:
    /// - Configuration directory (`PODPUSH_CONFIG_DIR`)
    /// - Specific configuration file (`PODPUSH_CONFIG_FILE`)
    /// - Application environment (`PODPUSH_APP_ENV`)
    ///
    /// # Errors
    ///
    /// Returns an error if both `PODPUSH_CONFIG_DIR` and `PODPUSH_CONFIG_FILE` are set,
    /// as they are mutually exclusive.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = std::env::var(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR));

        let config_file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);

        // Check mutual exclusivity
        if config_file.is_some() && std::env::var(CONFIG_DIR_ENV).is_ok() {
            return Err(ConfigError::mutual_exclusivity(
                "PODPUSH_CONFIG_DIR and PODPUSH_CONFIG_FILE cannot both be set. \
                 Use PODPUSH_CONFIG_DIR for layered configuration or \
                 PODPUSH_CONFIG_FILE for a single configuration file.",
            ));
        }

        let environment = AppEnvironment::from_env();

        Ok(Self {
            config_dir,
            config_file,
            environment,
        })
    }

    /// Create a loader that reads exactly one file, as `--config` does
    ///
    /// Environment variable overrides still apply on top of the file.
    pub fn with_config_file(path: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            config_file: Some(path.into()),
            environment: AppEnvironment::from_env(),
        }
    }

    /// Override the environment used to pick `{environment}.toml`
    pub fn with_environment(mut self, environment: AppEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// Get the current application environment
    pub fn environment(&self) -> AppEnvironment {
        self.environment
    }

    /// Get the configuration directory path
    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    /// Load configuration from all sources
    ///
    /// If `PODPUSH_CONFIG_FILE` is set, loads only that file.
    /// Otherwise, performs layered loading from the configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `default.toml` is not found (when using layered loading)
    /// - Configuration parsing fails
    /// - Configuration validation fails
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let config = self.build_config()?;
        let settings: Settings = config.try_deserialize().map_err(|e| {
            ConfigError::ParseError(format!("Failed to deserialize configuration: {}", e))
        })?;

        // Validate the loaded settings
        settings.validate()?;

        Ok(settings)
    }

    /// Build the config::Config instance from all sources
    fn build_config(&self) -> Result<Config, ConfigError> {
        let builder = Config::builder();

        let builder = if let Some(ref config_file) = self.config_file {
            // Single file mode
            self.add_file_source(builder, config_file, true)?
        } else {
            // Layered loading mode
            self.build_layered_config(builder)?
        };

        // Env always wins: PODPUSH_PUSH__WEB_PUSH_CONCURRENCY -> push.web_push_concurrency
        let builder = Self::add_env_source(builder);

        builder.build().map_err(ConfigError::from)
    }

    /// Build layered configuration from multiple files
    fn build_layered_config(
        &self,
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        // default.toml, then {environment}.toml, then local.toml
        let default_path = self.config_dir.join("default.toml");
        let builder = self.add_file_source(builder, &default_path, true)?;

        let env_path = self.config_dir.join(self.environment.config_file_name());
        let builder = self.add_file_source(builder, &env_path, false)?;

        let local_path = self.config_dir.join("local.toml");
        let builder = self.add_file_source(builder, &local_path, false)?;

        Ok(builder)
    }

    /// Adds a TOML file; a missing required file is reported by path
    fn add_file_source(
        &self,
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        path: &Path,
        required: bool,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        if required && !path.exists() {
            return Err(ConfigError::file_not_found(format!(
                "Required configuration file not found: {}",
                path.display()
            )));
        }

        Ok(builder.add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(required),
        ))
    }

    /// Add environment variable source to the config builder
    ///
    /// Environment variables with prefix `PODPUSH_` are mapped to configuration keys.
    /// Double underscores (`__`) are used as separators for nested keys.
    ///
    /// Examples:
    /// - `PODPUSH_HTTP__REQUEST_TIMEOUT` -> `http.request_timeout`
    /// - `PODPUSH_PUSH__PROVIDER__API_KEY` -> `push.provider.api_key`
    fn add_env_source(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> config::ConfigBuilder<config::builder::DefaultState> {
        builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .ignore_empty(true)
                .try_parsing(true),
        )
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            config_file: None,
            environment: AppEnvironment::default(),
        })
    }
}

/// Serializes tests that read or mutate `PODPUSH_*` environment variables
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::push::PushProviderConfig;
    use std::fs;
    use tempfile::TempDir;

    const DEFAULT_CONFIG: &str = r#"
[application]
name = "test-push"
version = "1.0.0"

[http]
request_timeout = 30
connect_timeout = 10
user_agent = "podpush-test"

[push]
web_push_concurrency = 10

[logger]
level = "info"

[logger.console]
enabled = true
colored = true

[logger.file]
enabled = false
"#;

    /// Helper to create a temporary config directory with files
    fn setup_config_dir(files: &[(&str, &str)]) -> TempDir {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        for (name, content) in files {
            let path = temp_dir.path().join(name);
            fs::write(&path, content).expect("Failed to write config file");
        }
        temp_dir
    }

    /// Helper to safely set environment variables for a test
    struct EnvGuard {
        vars_to_restore: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self {
                vars_to_restore: Vec::new(),
            }
        }

        fn set(&mut self, key: &str, value: &str) {
            let original = std::env::var(key).ok();
            self.vars_to_restore.push((key.to_string(), original));
            unsafe {
                std::env::set_var(key, value);
            }
        }

        fn remove(&mut self, key: &str) {
            let original = std::env::var(key).ok();
            self.vars_to_restore.push((key.to_string(), original));
            unsafe {
                std::env::remove_var(key);
            }
        }

        fn clear_loader_vars(&mut self) {
            self.remove("PODPUSH_CONFIG_DIR");
            self.remove("PODPUSH_CONFIG_FILE");
            self.remove("PODPUSH_APP_ENV");
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            // Restore in reverse so repeated keys end at their first-seen value
            for (key, original_value) in self.vars_to_restore.iter().rev() {
                unsafe {
                    match original_value {
                        Some(value) => std::env::set_var(key, value),
                        None => std::env::remove_var(key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_loader_new_default() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();
        env.clear_loader_vars();

        let loader = ConfigLoader::new().expect("Should create loader");
        assert_eq!(loader.config_dir, PathBuf::from("config"));
        assert!(loader.config_file.is_none());
        assert_eq!(loader.environment, AppEnvironment::Development);
    }

    #[test]
    fn test_config_loader_mutual_exclusivity_error() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();

        env.set("PODPUSH_CONFIG_DIR", "/custom/config");
        env.set("PODPUSH_CONFIG_FILE", "/path/to/config.toml");

        match ConfigLoader::new() {
            Err(ConfigError::MutualExclusivityError(msg)) => {
                assert!(msg.contains("PODPUSH_CONFIG_DIR"));
                assert!(msg.contains("PODPUSH_CONFIG_FILE"));
            }
            other => panic!("Expected MutualExclusivityError, got {:?}", other),
        }
    }

    #[test]
    fn test_config_loader_environment_from_env() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();
        env.clear_loader_vars();
        env.set("PODPUSH_APP_ENV", "production");

        let loader = ConfigLoader::new().expect("Should create loader");
        assert_eq!(loader.environment(), AppEnvironment::Production);
    }

    #[test]
    fn test_load_missing_default_toml() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();
        env.clear_loader_vars();

        let temp_dir = setup_config_dir(&[]);
        env.set("PODPUSH_CONFIG_DIR", temp_dir.path().to_str().unwrap());

        let loader = ConfigLoader::new().expect("Should create loader");
        match loader.load() {
            Err(ConfigError::FileNotFound(msg)) => assert!(msg.contains("default.toml")),
            other => panic!("Expected FileNotFound error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_full_precedence_chain() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();
        env.clear_loader_vars();

        let development_config = r#"
[application]
name = "dev-push"

[http]
request_timeout = 20
"#;

        let local_config = r#"
[http]
request_timeout = 15
user_agent = "local-agent"
"#;

        let temp_dir = setup_config_dir(&[
            ("default.toml", DEFAULT_CONFIG),
            ("development.toml", development_config),
            ("local.toml", local_config),
        ]);
        env.set("PODPUSH_CONFIG_DIR", temp_dir.path().to_str().unwrap());
        env.set("PODPUSH_HTTP__REQUEST_TIMEOUT", "5");

        let settings = ConfigLoader::new()
            .expect("Should create loader")
            .load()
            .expect("Should load settings");

        // Environment variable has highest priority
        assert_eq!(settings.http.request_timeout, 5);
        // local.toml overrides development.toml
        assert_eq!(settings.http.user_agent, "local-agent");
        // development.toml overrides default.toml
        assert_eq!(settings.application.name, "dev-push");
        // default.toml provides base values
        assert_eq!(settings.http.connect_timeout, 10);
        assert_eq!(settings.application.version, "1.0.0");
    }

    #[test]
    fn test_load_single_file_mode_with_provider() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();
        env.clear_loader_vars();

        let single_config = r#"
[push]
web_push_concurrency = 3

[push.provider]
provider = "webpush"
vapid_public_key = "pub"
vapid_private_key = "priv"
vapid_subject = "mailto:ops@example.com"
"#;
        let temp_dir = setup_config_dir(&[("single.toml", single_config)]);
        let path = temp_dir.path().join("single.toml");

        let settings = ConfigLoader::with_config_file(&path)
            .load()
            .expect("Should load settings");

        assert_eq!(settings.push.web_push_concurrency, 3);
        assert_eq!(
            settings.push.provider,
            Some(PushProviderConfig::WebPush {
                vapid_public_key: "pub".to_string(),
                vapid_private_key: "priv".to_string(),
                vapid_subject: "mailto:ops@example.com".to_string(),
            })
        );
        // Untouched sections fall back to built-in defaults
        assert_eq!(settings.http.request_timeout, 30);
    }

    #[test]
    fn test_env_var_overrides_provider_secret() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();
        env.clear_loader_vars();

        let single_config = r#"
[push.provider]
provider = "onesignal"
app_id = "app-1"
api_key = "placeholder"
"#;
        let temp_dir = setup_config_dir(&[("push.toml", single_config)]);
        env.set("PODPUSH_PUSH__PROVIDER__API_KEY", "from-env");

        let settings = ConfigLoader::with_config_file(temp_dir.path().join("push.toml"))
            .load()
            .expect("Should load settings");

        assert_eq!(
            settings.push.provider,
            Some(PushProviderConfig::OneSignal {
                app_id: "app-1".to_string(),
                api_key: "from-env".to_string(),
            })
        );
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();
        env.clear_loader_vars();

        let temp_dir = setup_config_dir(&[("default.toml", DEFAULT_CONFIG)]);
        env.set("PODPUSH_CONFIG_DIR", temp_dir.path().to_str().unwrap());
        env.set("PODPUSH_PUSH__WEB_PUSH_CONCURRENCY", "0");

        let result = ConfigLoader::new().expect("Should create loader").load();
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError { ref field, .. }) if field == "push.web_push_concurrency"
        ));
    }

    #[test]
    fn test_optional_files_not_required() {
        let _guard = super::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut env = EnvGuard::new();
        env.clear_loader_vars();

        let temp_dir = setup_config_dir(&[("default.toml", DEFAULT_CONFIG)]);
        env.set("PODPUSH_CONFIG_DIR", temp_dir.path().to_str().unwrap());

        // staging.toml and local.toml don't exist
        let settings = ConfigLoader::new()
            .expect("Should create loader")
            .with_environment(AppEnvironment::Staging)
            .load()
            .expect("Should load settings");

        assert_eq!(settings.application.name, "test-push");
    }
}
