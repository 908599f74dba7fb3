//! Timing-driven net pulls.
//!
//! A [`TimingContext`] carries per-net slack and delay figures produced by an
//! external timing analysis. During the late phase of global placement the
//! wirelength optimizer turns every critical net into extra driver-to-sink
//! springs, weighted by how badly the net misses timing and how far its sinks
//! have drifted from the driver.

use crate::codes;
use hiplace_common::{NetId, Point};
use hiplace_device::Device;
use hiplace_diagnostics::{Diagnostic, DiagnosticSink};
use hiplace_model::PlacementModel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Driver-to-sink distance beyond which a pull is amplified.
const EXPECTED_DISTANCE: f64 = 30.0;
/// Extra distance charged for every clock region crossed.
const CLOCK_REGION_STEP: f64 = 10.0;
/// Nets touching this many units or more are left alone.
const MAX_NET_UNITS: usize = 500;

/// Timing figures of one net, in nanoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetTiming {
    /// Worst slack over the net's sinks.
    pub slack: f64,
    /// Estimated interconnect delay.
    pub delay: f64,
    /// Delay the net is budgeted for.
    pub expected_delay: f64,
}

/// Timing data for a design.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct TimingContext {
    /// Target clock period.
    pub clock_period: f64,
    /// Figures keyed by net.
    pub nets: BTreeMap<NetId, NetTiming>,
}

/// Errors raised while loading timing data.
#[derive(Debug, thiserror::Error)]
pub enum TimingLoadError {
    /// The file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid timing JSON.
    #[error("invalid timing data: {0}")]
    Invalid(String),
}

#[derive(Deserialize)]
struct TimingFile {
    clock_period: f64,
    #[serde(default)]
    nets: BTreeMap<String, NetTiming>,
}

impl TimingContext {
    /// Creates an empty context for the given clock period.
    pub fn new(clock_period: f64) -> Self {
        Self {
            clock_period,
            nets: BTreeMap::new(),
        }
    }

    /// Records the figures of one net.
    pub fn insert(&mut self, net: NetId, timing: NetTiming) {
        self.nets.insert(net, timing);
    }

    /// Figures of one net.
    pub fn net(&self, net: NetId) -> Option<&NetTiming> {
        self.nets.get(&net)
    }

    /// Parses `{"clock_period": .., "nets": {name: {slack, delay, expected_delay}}}`,
    /// resolving net names against the model's design. Unknown names are
    /// reported to `sink` and skipped.
    pub fn from_json_str(
        content: &str,
        model: &PlacementModel,
        sink: &DiagnosticSink,
    ) -> Result<Self, TimingLoadError> {
        let file: TimingFile =
            serde_json::from_str(content).map_err(|e| TimingLoadError::Invalid(e.to_string()))?;
        if !(file.clock_period.is_finite() && file.clock_period > 0.0) {
            return Err(TimingLoadError::Invalid(format!(
                "clock_period must be positive, got {}",
                file.clock_period
            )));
        }
        let by_name: HashMap<&str, NetId> = model
            .design()
            .nets()
            .iter()
            .map(|n| (n.name.as_str(), n.id))
            .collect();
        let mut context = Self::new(file.clock_period);
        for (name, timing) in file.nets {
            match by_name.get(name.as_str()) {
                Some(&id) => context.insert(id, timing),
                None => sink.emit(
                    Diagnostic::warning(codes::UNKNOWN_TIMING_NET, format!("timing data names unknown net '{name}'"))
                        .with_origin("timing"),
                ),
            }
        }
        Ok(context)
    }

    /// Reads and parses a timing file.
    pub fn load(path: &Path, model: &PlacementModel, sink: &DiagnosticSink) -> Result<Self, TimingLoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| TimingLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content, model, sink)
    }
}

/// Weight of one driver-to-sink pull.
///
/// `base` is the progress-scaled timing weight, `pins` the pin count of the
/// net and `distance` the driver-to-sink distance including clock-region
/// penalties.
pub fn timing_pull_weight(
    timing: &NetTiming,
    clock_period: f64,
    pins: usize,
    distance: f64,
    progress: f64,
    base: f64,
) -> f64 {
    if pins < 2 {
        return 0.0;
    }
    let mut w = base * 2.0 / ((pins - 1) as f64).sqrt();
    w *= 1.0 + timing.slack.abs() / clock_period;
    if timing.expected_delay > 0.0 {
        w *= (timing.delay / timing.expected_delay).max(1.0);
    }
    if distance > EXPECTED_DISTANCE {
        w *= (distance / EXPECTED_DISTANCE).powf(0.5 + 0.2 * progress);
    }
    w
}

/// A spring between two pins of one net.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PinPull {
    pub net: usize,
    pub driver: usize,
    pub sink: usize,
    pub weight: f64,
}

fn region_distance(device: &Device, a: Point, b: Point) -> f64 {
    let ra = device.clock_region_at(a);
    let rb = device.clock_region_at(b);
    let steps = ra.col.abs_diff(rb.col) + ra.row.abs_diff(rb.row);
    steps as f64 * CLOCK_REGION_STEP
}

/// Driver-to-sink pulls for every critical net of the model.
pub(crate) fn collect_timing_pulls(
    model: &PlacementModel,
    device: &Device,
    context: &TimingContext,
    base: f64,
) -> Vec<PinPull> {
    let units = model.units();
    let progress = model.progress();
    let mut pulls = Vec::new();
    for (index, net) in model.nets().iter().enumerate() {
        if net.is_power {
            continue;
        }
        let Some(timing) = context.net(net.id) else {
            continue;
        };
        if timing.slack >= 0.0 {
            continue;
        }
        let unit_count = net.unit_count();
        if unit_count < 2 || unit_count >= MAX_NET_UNITS {
            continue;
        }
        let Some(driver) = net.sole_driver() else {
            continue;
        };
        let from = net.pin_location(units, driver);
        for sink in 0..net.pins.len() {
            if sink == driver || net.pins[sink].unit == net.pins[driver].unit {
                continue;
            }
            let to = net.pin_location(units, sink);
            let distance = from.displacement(to, 1.0) + region_distance(device, from, to);
            let weight = timing_pull_weight(timing, context.clock_period, net.pins.len(), distance, progress, base);
            if weight > 0.0 {
                pulls.push(PinPull {
                    net: index,
                    driver,
                    sink,
                    weight,
                });
            }
        }
    }
    pulls
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiplace_device::{DeviceBuilder, SiteType};
    use hiplace_model::{CellType, Design, ModelSettings};

    fn model() -> (PlacementModel, Device) {
        let device = DeviceBuilder::new("t")
            .column(0.0, SiteType::SliceL, 80)
            .column(79.0, SiteType::SliceL, 80)
            .clock_regions(2, 2)
            .build()
            .unwrap();
        let mut design = Design::new("timing");
        let a = design.add_cell("a", CellType::Ff);
        let b = design.add_cell("b", CellType::Lut);
        let c = design.add_cell("c", CellType::Lut);
        design.fix_cell(a, Point::new(0.0, 0.0));
        design.fix_cell(b, Point::new(79.0, 79.0));
        let slow = design.add_net("slow");
        design.connect(slow, a, Point::default(), true);
        design.connect(slow, b, Point::default(), false);
        let fast = design.add_net("fast");
        design.connect(fast, a, Point::default(), true);
        design.connect(fast, c, Point::default(), false);
        let model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();
        (model, device)
    }

    #[test]
    fn weight_grows_with_violation_and_distance() {
        let t = NetTiming {
            slack: -1.0,
            delay: 2.0,
            expected_delay: 1.0,
        };
        let near = timing_pull_weight(&t, 4.0, 2, 10.0, 0.0, 1.0);
        // 2 / sqrt(1) * (1 + 1/4) * 2
        assert!((near - 5.0).abs() < 1e-9);
        let far = timing_pull_weight(&t, 4.0, 2, 120.0, 0.0, 1.0);
        assert!((far - 5.0 * 2.0).abs() < 1e-9);
        assert_eq!(timing_pull_weight(&t, 4.0, 1, 120.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn json_resolves_names_and_warns_on_unknown() {
        let (model, _) = model();
        let sink = DiagnosticSink::new();
        let json = r#"{"clock_period": 2.5, "nets": {
            "slow": {"slack": -0.5, "delay": 1.0, "expected_delay": 0.5},
            "ghost": {"slack": -0.1, "delay": 1.0, "expected_delay": 1.0}
        }}"#;
        let context = TimingContext::from_json_str(json, &model, &sink).unwrap();
        assert_eq!(context.clock_period, 2.5);
        assert_eq!(context.nets.len(), 1);
        assert!(context.net(NetId::from_raw(0)).is_some());
        let diags = sink.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, codes::UNKNOWN_TIMING_NET);
    }

    #[test]
    fn bad_period_is_rejected() {
        let (model, _) = model();
        let sink = DiagnosticSink::new();
        let result = TimingContext::from_json_str(r#"{"clock_period": 0}"#, &model, &sink);
        assert!(matches!(result, Err(TimingLoadError::Invalid(_))));
    }

    #[test]
    fn only_violating_nets_get_pulls() {
        let (model, device) = model();
        let mut context = TimingContext::new(4.0);
        let bad = NetTiming {
            slack: -1.0,
            delay: 1.0,
            expected_delay: 1.0,
        };
        let good = NetTiming { slack: 0.5, ..bad };
        context.insert(NetId::from_raw(0), bad);
        context.insert(NetId::from_raw(1), good);
        let pulls = collect_timing_pulls(&model, &device, &context, 1.0);
        assert_eq!(pulls.len(), 1);
        assert_eq!(pulls[0].net, 0);
        assert_eq!((pulls[0].driver, pulls[0].sink), (0, 1));
        // Far apart and two regions away: amplified beyond the plain weight.
        assert!(pulls[0].weight > 2.0 * 1.25);
    }

    #[test]
    fn load_reads_file() {
        let (model, _) = model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timing.json");
        std::fs::write(&path, r#"{"clock_period": 5.0, "nets": {}}"#).unwrap();
        let sink = DiagnosticSink::new();
        let context = TimingContext::load(&path, &model, &sink).unwrap();
        assert!(context.nets.is_empty());
        assert!(matches!(
            TimingContext::load(&dir.path().join("none.json"), &model, &sink),
            Err(TimingLoadError::Io { .. })
        ));
    }
}
