//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a placer configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML or JSON content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A recognized key carried a value of the wrong shape.
    #[error("invalid value '{value}' for option '{key}'")]
    InvalidValue {
        /// The option name.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
