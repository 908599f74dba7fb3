//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::PlacerConfig;
use std::path::Path;

/// Loads and validates a configuration file.
///
/// Files ending in `.json` are read as a JSON option map; everything else is
/// parsed as TOML.
pub fn load_config(path: &Path) -> Result<PlacerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        load_config_from_json(&content)
    } else {
        load_config_from_str(&content)
    }
}

/// Parses and validates a TOML configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<PlacerConfig, ConfigError> {
    let config: PlacerConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Parses and validates a JSON option map such as `{"jobs": "8"}`.
pub fn load_config_from_json(content: &str) -> Result<PlacerConfig, ConfigError> {
    let config: PlacerConfig =
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Builds a configuration from string key/value pairs, e.g. command-line
/// `--set key=value` overrides applied on top of a file.
///
/// Pairs are applied over `base`; later pairs win. Unknown keys are ignored.
pub fn load_config_from_pairs<I, K, V>(base: &PlacerConfig, pairs: I) -> Result<PlacerConfig, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut map = match serde_json::to_value(base) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => serde_json::Map::new(),
        Err(e) => return Err(ConfigError::ParseError(e.to_string())),
    };
    for (key, value) in pairs {
        let key = key.into();
        let value = value.into();
        // Probe the single option first so the error names the offending key.
        let mut probe = serde_json::Map::new();
        probe.insert(key.clone(), serde_json::Value::String(value.clone()));
        if serde_json::from_value::<PlacerConfig>(serde_json::Value::Object(probe)).is_err() {
            return Err(ConfigError::InvalidValue { key, value });
        }
        map.insert(key, serde_json::Value::String(value));
    }
    let config: PlacerConfig = serde_json::from_value(serde_json::Value::Object(map))
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Rejects values the placer cannot run with.
fn validate_config(config: &PlacerConfig) -> Result<(), ConfigError> {
    if config.jobs == 0 {
        return Err(ConfigError::ValidationError("jobs must be at least 1".to_string()));
    }
    if !positive(config.y2x_ratio) {
        return Err(ConfigError::ValidationError("y2xRatio must be positive".to_string()));
    }
    if !positive(config.pseudo_net_weight) {
        return Err(ConfigError::ValidationError(
            "PseudoNetWeight must be positive".to_string(),
        ));
    }
    if !(positive(config.bin_width) && positive(config.bin_height)) {
        return Err(ConfigError::ValidationError(
            "bin dimensions must be positive".to_string(),
        ));
    }
    if config.global_placement_iterations == 0 {
        return Err(ConfigError::ValidationError(
            "GlobalPlacementIteration must be at least 1".to_string(),
        ));
    }
    if config.cluster_size == 0 {
        return Err(ConfigError::ValidationError("ClusterSize must be at least 1".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_toml_options() {
        let toml = r#"
jobs = 8
y2xRatio = 0.4
PseudoNetWeight = 1.5
SpreaderSimpleExpland = true
DumpAllCoordTrace = "trace/all"
SomeFutureOption = "ignored"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.jobs, 8);
        assert_eq!(config.y2x_ratio, 0.4);
        assert_eq!(config.pseudo_net_weight, 1.5);
        assert!(config.spreader_simple_expand);
        assert_eq!(config.trace.all.as_deref(), Some("trace/all"));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, PlacerConfig::default());
    }

    #[test]
    fn zero_jobs_rejected() {
        let err = load_config_from_str("jobs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn negative_ratio_rejected() {
        let err = load_config_from_json(r#"{"y2xRatio": "-1"}"#).unwrap_err();
        assert!(err.to_string().contains("y2xRatio"));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = load_config_from_str("jobs = = 3").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn pairs_override_base() {
        let base = load_config_from_str("jobs = 2\ny2xRatio = 0.5").unwrap();
        let config =
            load_config_from_pairs(&base, [("jobs", "6"), ("RandomInitialPlacement", "true")])
                .unwrap();
        assert_eq!(config.jobs, 6);
        assert_eq!(config.y2x_ratio, 0.5);
        assert!(config.random_initial_placement);
    }

    #[test]
    fn pairs_name_the_bad_key() {
        let err = load_config_from_pairs(&PlacerConfig::default(), [("BinWidth", "wide")])
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, "BinWidth");
                assert_eq!(value, "wide");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_json_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("placer.json");
        std::fs::write(&path, r#"{"jobs": "3", "GlobalPlacerPrintHPWL": "true"}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.jobs, 3);
        assert!(config.global_placer_print_hpwl);
    }

    #[test]
    fn load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("placer.toml");
        std::fs::write(&path, "BinWidth = 3.0\nBinHeight = 4.0\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.bin_width, 3.0);
        assert_eq!(config.bin_height, 4.0);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/placer.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
