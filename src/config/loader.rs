//! Configuration Loader
//!
//! Builds an [`AgentConfig`] from layered sources using the `config` crate:
//!
//! 1. Built-in defaults
//! 2. Configuration file (JSON or TOML, chosen by extension)
//! 3. `RUNBOOK_AGENT__<SECTION>__<FIELD>` environment variables
//! 4. Command-line overrides for the server endpoint and API key

use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::{AgentConfig, DEFAULT_CONFIG_FILE_NAME};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "RUNBOOK_AGENT";

/// Inputs to configuration loading, usually taken from the command line
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit configuration file; it must exist when given
    pub config_path: Option<PathBuf>,
    /// Overrides `server.endpoint`
    pub endpoint: Option<String>,
    /// Overrides `server.api_key`
    pub api_key: Option<String>,
    /// Skip environment variables (tests)
    pub ignore_environment: bool,
}

/// Loaded configuration plus the file it came from
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AgentConfig,
    config_file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load, merge and validate the configuration
    pub fn load(options: &LoadOptions) -> ConfigResult<Self> {
        let (config_file, required) = match &options.config_path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigurationError::config_file_not_found(path));
                }
                (Some(path.clone()), true)
            }
            None => (Self::default_config_path().filter(|p| p.is_file()), false),
        };

        let mut builder = Config::builder().add_source(Config::try_from(&AgentConfig::default())?);

        if let Some(path) = &config_file {
            debug!(path = %path.display(), "Loading agent configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(required));
        }

        if !options.ignore_environment {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let mut config: AgentConfig = builder.build()?.try_deserialize()?;

        if let Some(endpoint) = options.endpoint.as_ref().filter(|e| !e.is_empty()) {
            config.server.endpoint = endpoint.clone();
        }
        if let Some(api_key) = options.api_key.as_ref().filter(|k| !k.is_empty()) {
            config.server.api_key = api_key.clone();
        }

        if let Some(path) = &config_file {
            config.agent.log_file = Self::resolve_relative(path, &config.agent.log_file);
        }

        config.validate()?;

        debug!(
            config = %config.sanitized(),
            "Agent configuration loaded"
        );

        Ok(Self {
            config,
            config_file,
        })
    }

    /// `agent.json` next to the running executable
    pub fn default_config_path() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        Some(exe.parent()?.join(DEFAULT_CONFIG_FILE_NAME))
    }

    fn resolve_relative(config_file: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match config_file.parent() {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn into_config(self) -> AgentConfig {
        self.config
    }

    /// Configuration file that was merged, if any
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}
