//! Placer configuration loading and validation.
//!
//! A run is configured by one immutable [`PlacerConfig`], built once at
//! startup from a TOML file, a JSON string map, or key/value pairs, and then
//! passed by reference to every placement component.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_json, load_config_from_pairs, load_config_from_str};
pub use types::{PlacerConfig, TraceConfig};
