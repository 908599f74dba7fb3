//! The placer configuration and its option names.
//!
//! Option names keep the historical spellings used by existing placement
//! scripts (`SpreaderSimpleExpland`, `y2xRatio`), so every field carries an
//! explicit `#[serde(rename)]`. Values may be given natively (`jobs = 8`) or
//! as strings (`"jobs": "8"`), which is how JSON option maps are written.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::str::FromStr;

/// All options recognized by the placer.
///
/// Unknown keys are ignored and missing keys fall back to [`Default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacerConfig {
    /// Worker thread count.
    #[serde(rename = "jobs", deserialize_with = "lenient")]
    pub jobs: usize,
    /// Weight of vertical wirelength relative to horizontal.
    #[serde(rename = "y2xRatio", deserialize_with = "lenient")]
    pub y2x_ratio: f64,
    /// Initial pseudo-net weight.
    #[serde(rename = "PseudoNetWeight", deserialize_with = "lenient")]
    pub pseudo_net_weight: f64,
    /// Legalize macros directly onto their nearest columns, skipping the rough phase.
    #[serde(rename = "DirectMacroLegalize", deserialize_with = "lenient")]
    pub direct_macro_legalize: bool,
    /// Always grow spreading regions in round-robin order.
    #[serde(rename = "SpreaderSimpleExpland", deserialize_with = "lenient")]
    pub spreader_simple_expand: bool,
    /// Keep the spreading forget ratio at 1.0 for the whole run.
    #[serde(rename = "disableSpreadingConvergeRatio", deserialize_with = "lenient")]
    pub disable_spreading_converge_ratio: bool,
    /// Scale pseudo-net weights by the degree of the placement unit.
    #[serde(rename = "pseudoNetWeightConsiderNetNum", deserialize_with = "lenient")]
    pub pseudo_net_weight_consider_net_num: bool,
    /// Upper bound on global placement iterations.
    #[serde(rename = "GlobalPlacementIteration", deserialize_with = "lenient")]
    pub global_placement_iterations: usize,
    /// Width of a density bin in site columns.
    #[serde(rename = "BinWidth", deserialize_with = "lenient")]
    pub bin_width: f64,
    /// Height of a density bin in site rows.
    #[serde(rename = "BinHeight", deserialize_with = "lenient")]
    pub bin_height: f64,
    /// Scatter units uniformly instead of running cluster placement.
    #[serde(rename = "RandomInitialPlacement", deserialize_with = "lenient")]
    pub random_initial_placement: bool,
    /// Seed for every random choice of the run.
    #[serde(rename = "RandomSeed", deserialize_with = "lenient")]
    pub random_seed: u64,
    /// Maximum number of units per initial cluster.
    #[serde(rename = "ClusterSize", deserialize_with = "lenient")]
    pub cluster_size: usize,
    /// Solve the QP with box constraints (projected CG).
    #[serde(rename = "ConstrainedQP", deserialize_with = "lenient")]
    pub constrained_qp: bool,
    /// Log the internal state of every global iteration.
    #[serde(rename = "GlobalPlacerVerbose", deserialize_with = "lenient")]
    pub global_placer_verbose: bool,
    /// Log HPWL bounds after each global iteration.
    #[serde(rename = "GlobalPlacerPrintHPWL", deserialize_with = "lenient")]
    pub global_placer_print_hpwl: bool,
    /// Log legalizer internals.
    #[serde(rename = "MacroLegalizationVerbose", deserialize_with = "lenient")]
    pub macro_legalization_verbose: bool,
    /// User-defined cluster file, one cluster of cell names per line.
    #[serde(rename = "designCluster")]
    pub design_cluster: Option<PathBuf>,
    /// Coordinate trace outputs.
    #[serde(flatten)]
    pub trace: TraceConfig,
}

impl Default for PlacerConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            y2x_ratio: 1.0,
            pseudo_net_weight: 1.0,
            direct_macro_legalize: false,
            spreader_simple_expand: false,
            disable_spreading_converge_ratio: false,
            pseudo_net_weight_consider_net_num: true,
            global_placement_iterations: 100,
            bin_width: 2.0,
            bin_height: 2.0,
            random_initial_placement: false,
            random_seed: 20213654,
            cluster_size: 64,
            constrained_qp: false,
            global_placer_verbose: false,
            global_placer_print_hpwl: false,
            macro_legalization_verbose: false,
            design_cluster: None,
            trace: TraceConfig::default(),
        }
    }
}

/// Path prefixes of the gzip coordinate traces. A trace is written only when
/// its prefix is set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// LUT cells after every placement step.
    #[serde(rename = "DumpLUTCoordTrace")]
    pub lut: Option<String>,
    /// FF cells after every placement step.
    #[serde(rename = "DumpFFCoordTrace")]
    pub ff: Option<String>,
    /// LUT and FF cells after every placement step.
    #[serde(rename = "DumpLUTFFCoordTrace")]
    pub lut_ff: Option<String>,
    /// CARRY cells after every placement step.
    #[serde(rename = "DumpCARRYCoordTrace")]
    pub carry: Option<String>,
    /// DSP cells after every placement step.
    #[serde(rename = "DumpDSPCoordTrace")]
    pub dsp: Option<String>,
    /// BRAM cells after every placement step.
    #[serde(rename = "DumpBRAMCoordTrace")]
    pub bram: Option<String>,
    /// Every cell after every placement step.
    #[serde(rename = "DumpAllCoordTrace")]
    pub all: Option<String>,
    /// LUT and FF cells after every spreading loop.
    #[serde(rename = "DumpLUTFFCoordTrace-GeneralSpreader")]
    pub spreader_lut_ff: Option<String>,
    /// Legal macro positions after every legalization.
    #[serde(rename = "DumpMacroLegalization")]
    pub macro_legalization: Option<String>,
}

/// Accepts a value either natively or as a string and parses it with `FromStr`.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    struct LenientVisitor<T>(PhantomData<T>);

    impl<T> LenientVisitor<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        fn parse<E: de::Error>(text: &str) -> Result<T, E> {
            text.trim().parse::<T>().map_err(E::custom)
        }
    }

    impl<'de, T> Visitor<'de> for LenientVisitor<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        type Value = T;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a value or its string form")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<T, E> {
            Self::parse(value)
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<T, E> {
            Self::parse(if value { "true" } else { "false" })
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<T, E> {
            Self::parse(&value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<T, E> {
            Self::parse(&value.to_string())
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<T, E> {
            Self::parse(&value.to_string())
        }
    }

    deserializer.deserialize_any(LenientVisitor(PhantomData))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PlacerConfig::default();
        assert_eq!(config.jobs, 1);
        assert_eq!(config.y2x_ratio, 1.0);
        assert_eq!(config.random_seed, 20213654);
        assert!(config.pseudo_net_weight_consider_net_num);
        assert!(config.trace.all.is_none());
    }

    #[test]
    fn json_strings_are_parsed() {
        let json = r#"{"jobs": "8", "y2xRatio": "0.4", "DirectMacroLegalize": "true"}"#;
        let config: PlacerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.jobs, 8);
        assert_eq!(config.y2x_ratio, 0.4);
        assert!(config.direct_macro_legalize);
    }

    #[test]
    fn native_json_values_are_parsed() {
        let json = r#"{"jobs": 4, "PseudoNetWeight": 0.5, "SpreaderSimpleExpland": true}"#;
        let config: PlacerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.jobs, 4);
        assert_eq!(config.pseudo_net_weight, 0.5);
        assert!(config.spreader_simple_expand);
    }

    #[test]
    fn trace_keys_flatten_into_the_top_level() {
        let json = r#"{"DumpAllCoordTrace": "out/all", "DumpLUTFFCoordTrace-GeneralSpreader": "out/spread"}"#;
        let config: PlacerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.trace.all.as_deref(), Some("out/all"));
        assert_eq!(config.trace.spreader_lut_ff.as_deref(), Some("out/spread"));
    }

    #[test]
    fn malformed_number_is_rejected() {
        let json = r#"{"jobs": "many"}"#;
        assert!(serde_json::from_str::<PlacerConfig>(json).is_err());
    }
}
