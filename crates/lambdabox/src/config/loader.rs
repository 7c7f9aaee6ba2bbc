//! Configuration loading for lambdabox
//!
//! Handles layering the embedded defaults, an optional config file, and
//! environment overrides using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat, Map};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, RESULT_PLACEHOLDER};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load the effective service configuration
    ///
    /// Layers, lowest precedence first: the embedded example config, the file
    /// at `path` if given, then `LAMBDABOX_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading overrides from `env` instead of the
    /// process environment when given
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_timeout.is_finite() || self.default_timeout <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_timeout must be positive, got {}",
                self.default_timeout
            )));
        }
        if !self.max_timeout.is_finite() || self.max_timeout < self.default_timeout {
            return Err(ConfigError::Invalid(format!(
                "max_timeout ({}) must be at least default_timeout ({})",
                self.max_timeout, self.default_timeout
            )));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.interpreter.command.is_empty() {
            return Err(ConfigError::Invalid(
                "interpreter has empty command".to_string(),
            ));
        }
        if !self
            .interpreter
            .command
            .iter()
            .any(|arg| arg.contains(RESULT_PLACEHOLDER))
        {
            return Err(ConfigError::Invalid(format!(
                "interpreter command must pass the result path via {RESULT_PLACEHOLDER}"
            )));
        }

        Ok(())
    }
}
