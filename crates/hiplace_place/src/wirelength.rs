//! Quadratic wirelength optimization with the bound-to-bound net model.
//!
//! Every call to [`WirelengthOptimizer::solve_iteration`] linearizes the
//! current placement into one symmetric system per axis: each net becomes a
//! set of two-pin springs between its extreme pins and every inner pin, and
//! pseudo nets pull units towards anchors (their previous location, the
//! legalized macro plan, a user cluster centroid or a clock region). The X
//! and Y systems are solved concurrently by conjugate gradient and the
//! solution is written back as new unit anchors.

use crate::codes;
use crate::solver::{conjugate_gradient, projected_conjugate_gradient, CgSettings, QpSystem, SolveStats};
use crate::timing::{collect_timing_pulls, TimingContext};
use crate::workers::WorkerPool;
use hiplace_common::{PlaceResult, Point, Rect, UnitId};
use hiplace_config::PlacerConfig;
use hiplace_device::Device;
use hiplace_diagnostics::{Diagnostic, DiagnosticSink};
use hiplace_model::{PlacementModel, PlacementNet, PlacementUnit};
use log::{debug, warn};

/// Offsets smaller than this are treated as zero.
const OFFSET_EPS: f64 = 1e-5;
/// Spring lengths are floored at this distance.
const MIN_SPRING_LENGTH: f64 = 1.0;
/// Anchor pull distances are floored at this distance.
const MIN_ANCHOR_DISTANCE: f64 = 0.5;
/// User clusters smaller than this are not pulled together.
const MIN_USER_CLUSTER_CELLS: usize = 24;

/// One of the two placement axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Axis {
    X,
    Y,
}

impl Axis {
    pub(crate) fn of(self, p: Point) -> f64 {
        match self {
            Axis::X => p.x,
            Axis::Y => p.y,
        }
    }
}

/// What one QP iteration should include.
#[derive(Clone, Copy, Debug)]
pub struct SolveRequest<'a> {
    /// Weight of the anchor pseudo nets.
    pub pseudo_weight: f64,
    /// Reload the warm start from the current unit locations.
    pub first_iteration: bool,
    /// Keep the solution as the warm start of the next call.
    pub forward_solution: bool,
    /// Pull units towards their legalized locations.
    pub enable_macro_pull: bool,
    /// Scale pseudo nets by the number of nets of each unit.
    pub consider_net_num: bool,
    /// Pull sparse user clusters towards their centroid.
    pub enable_cluster_pull: bool,
    /// Timing data for driver-to-sink pulls.
    pub timing: Option<&'a TimingContext>,
}

impl Default for SolveRequest<'_> {
    fn default() -> Self {
        Self {
            pseudo_weight: 1.0,
            first_iteration: true,
            forward_solution: true,
            enable_macro_pull: false,
            consider_net_num: true,
            enable_cluster_pull: false,
            timing: None,
        }
    }
}

/// Outcome of one QP iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    /// Horizontal solve.
    pub x: SolveStats,
    /// Vertical solve.
    pub y: SolveStats,
    /// `false` if the solution was discarded and units kept their positions.
    pub applied: bool,
}

/// A one-sided spring from a unit to a fixed target.
#[derive(Clone, Copy, Debug, PartialEq)]
struct PseudoNet {
    unit: UnitId,
    target: Point,
    weight: f64,
}

/// Builds and solves the per-axis quadratic systems.
#[derive(Clone, Debug)]
pub struct WirelengthOptimizer {
    general_net_weight: f64,
    y2x: f64,
    constrained: bool,
    direct_macro_legalize: bool,
    cg: CgSettings,
    macro_pull_count: u32,
    macro_pull_weight: f64,
    cluster_fade: f64,
    warm_x: Vec<f64>,
    warm_y: Vec<f64>,
}

impl WirelengthOptimizer {
    /// Creates an optimizer configured by `config`.
    pub fn new(config: &PlacerConfig) -> Self {
        Self {
            general_net_weight: 1.0,
            y2x: config.y2x_ratio,
            constrained: config.constrained_qp,
            direct_macro_legalize: config.direct_macro_legalize,
            cg: CgSettings::default(),
            macro_pull_count: 0,
            macro_pull_weight: 1.0,
            cluster_fade: 1.0,
            warm_x: Vec::new(),
            warm_y: Vec::new(),
        }
    }

    /// Calls and current base weight of the macro legalization pull.
    pub fn macro_pull_state(&self) -> (u32, f64) {
        (self.macro_pull_count, self.macro_pull_weight)
    }

    /// Restores the macro legalization pull state.
    pub fn set_macro_pull_state(&mut self, count: u32, weight: f64) {
        self.macro_pull_count = count;
        self.macro_pull_weight = weight;
    }

    /// Current fade factor of the user cluster pull.
    pub fn cluster_fade(&self) -> f64 {
        self.cluster_fade
    }

    /// Restores the fade factor of the user cluster pull.
    pub fn set_cluster_fade(&mut self, fade: f64) {
        self.cluster_fade = fade;
    }

    /// Runs one QP iteration: assemble, solve X and Y on the pool, write
    /// back. A non-finite solution is discarded with a warning.
    pub fn solve_iteration(
        &mut self,
        pool: &WorkerPool,
        model: &mut PlacementModel,
        device: &Device,
        request: &SolveRequest<'_>,
        sink: &DiagnosticSink,
    ) -> PlaceResult<SolveReport> {
        let n = model.units().len();
        if request.first_iteration || self.warm_x.len() != n {
            self.warm_x = model.units().iter().map(PlacementUnit::x).collect();
            self.warm_y = model.units().iter().map(PlacementUnit::y).collect();
        }

        let (sx, sy) = self.assemble(pool, model, device, request);
        let bounds = model.bounds();
        let mut x = self.warm_x.clone();
        let mut y = self.warm_y.clone();
        let (constrained, cg) = (self.constrained, self.cg);
        let (stats_x, stats_y) = pool.join(
            || solve_axis(&sx, &mut x, (bounds.left - 0.5, bounds.right + 0.5), constrained, cg),
            || solve_axis(&sy, &mut y, (bounds.bottom - 0.5, bounds.top + 0.5), constrained, cg),
        );
        debug!(
            "QP solved: x {} iterations (residual {:.2e}), y {} iterations (residual {:.2e})",
            stats_x.iterations, stats_x.residual, stats_y.iterations, stats_y.residual
        );

        if x.iter().chain(&y).any(|v| !v.is_finite()) {
            warn!("QP produced non-finite positions, keeping the previous placement");
            sink.emit(
                Diagnostic::warning(codes::QP_SOLVE_DISCARDED, "QP solution is not finite and was discarded")
                    .with_origin("wirelength"),
            );
            return Ok(SolveReport {
                x: stats_x,
                y: stats_y,
                applied: false,
            });
        }

        for (i, unit) in model.units().iter().enumerate() {
            if unit.is_fixed() {
                x[i] = unit.x();
                y[i] = unit.y();
            }
        }
        for i in 0..n {
            let id = UnitId::from_index(i);
            let unit = model.unit(id);
            if unit.is_locked() || unit.is_fixed() {
                continue;
            }
            let p = model.legalize_xy_in_area(id, Point::new(x[i], y[i]));
            model.set_anchor_location(id, p);
        }
        if request.forward_solution {
            self.warm_x = x;
            self.warm_y = y;
        }
        model.update_element_bin_grid();
        Ok(SolveReport {
            x: stats_x,
            y: stats_y,
            applied: true,
        })
    }

    /// Assembles both axis systems, X and Y concurrently.
    fn assemble(
        &mut self,
        pool: &WorkerPool,
        model: &PlacementModel,
        device: &Device,
        request: &SolveRequest<'_>,
    ) -> (QpSystem, QpSystem) {
        let mut pseudo = Vec::new();
        if request.enable_macro_pull && !self.direct_macro_legalize {
            pseudo.extend(self.macro_pulls(model, request));
        }
        if request.enable_cluster_pull {
            pseudo.extend(self.cluster_pulls(model, request.pseudo_weight));
        }
        pseudo.extend(clock_region_pulls(
            model,
            device,
            (4.0 - model.progress()) * request.pseudo_weight,
        ));
        let timing_base = (0.1 + 0.1 * model.progress()) * self.general_net_weight;
        let timing = request
            .timing
            .filter(|_| model.progress() > 0.5)
            .map(|context| collect_timing_pulls(model, device, context, timing_base))
            .unwrap_or_default();

        let build = |axis: Axis| {
            let mut system = QpSystem::new(model.units().len());
            let scale = if axis == Axis::Y { self.y2x } else { 1.0 };
            for net in model.nets().iter().filter(|n| !n.is_power) {
                add_net_springs(&mut system, model.units(), net, axis, self.general_net_weight * scale);
            }
            for pull in &timing {
                let net = &model.nets()[pull.net];
                add_pin_spring(&mut system, model.units(), net, pull.driver, pull.sink, axis, pull.weight * scale);
            }
            for p in &pseudo {
                add_pseudo_net(&mut system, model.unit(p.unit), axis.of(p.target), p.weight * scale);
            }
            add_anchor_pulls(&mut system, model, axis, request, scale);
            system
        };
        pool.join(|| build(Axis::X), || build(Axis::Y))
    }

    fn macro_pulls(&mut self, model: &PlacementModel, request: &SolveRequest<'_>) -> Vec<PseudoNet> {
        self.macro_pull_count += 1;
        let progress = model.progress();
        if progress > 0.8 {
            self.macro_pull_weight *= 1.025;
        }
        if progress > 0.9 {
            self.macro_pull_weight *= 1.05;
        }
        if self.macro_pull_count > 40 {
            self.macro_pull_weight *= 1.05;
        }
        let factor = f64::from(self.macro_pull_count) / 20.0 * self.macro_pull_weight * request.pseudo_weight;
        debug!("macro legalization pull factor {factor:.4}");
        model
            .legal_plan()
            .locations()
            .map(|(id, target)| {
                let unit = model.unit(id);
                let weight = if request.consider_net_num {
                    let divisor = if unit.has_dsp_or_bram() {
                        1.0
                    } else if unit.has_carry() {
                        5.0
                    } else {
                        3.0
                    };
                    factor * unit.net_count() as f64 / divisor
                } else {
                    factor
                };
                PseudoNet { unit: id, target, weight }
            })
            .collect()
    }

    fn cluster_pulls(&mut self, model: &PlacementModel, pseudo_weight: f64) -> Vec<PseudoNet> {
        self.cluster_fade *= 0.9;
        let mut pulls = Vec::new();
        for cluster in model.user_clusters() {
            let cells: usize = cluster.iter().map(|&u| model.unit(u).cell_count()).sum();
            if cells < MIN_USER_CLUSTER_CELLS || cluster.len() < 2 {
                continue;
            }
            let mut extent = Rect::empty();
            let (mut sx, mut sy, mut nets) = (0.0, 0.0, 0.0);
            for &id in cluster {
                let unit = model.unit(id);
                let k = unit.net_count() as f64;
                extent.include(unit.location());
                sx += unit.x() * k;
                sy += unit.y() * k;
                nets += k;
            }
            let area = extent.area();
            if nets <= 0.0 || area <= 1.0 || area / cluster.len() as f64 >= 1.0 {
                continue;
            }
            let centroid = Point::new(sx / nets, sy / nets);
            let size_factor = (200.0 / cells as f64).min(1.0);
            for &id in cluster {
                let unit = model.unit(id);
                pulls.push(PseudoNet {
                    unit: id,
                    target: model.legalize_xy_in_area(id, centroid),
                    weight: size_factor * self.cluster_fade * pseudo_weight * unit.net_count() as f64,
                });
            }
        }
        if !pulls.is_empty() {
            debug!("user cluster pull on {} units", pulls.len());
        }
        pulls
    }
}

fn clock_region_pulls(model: &PlacementModel, device: &Device, base: f64) -> Vec<PseudoNet> {
    if base <= 0.0 {
        return Vec::new();
    }
    model
        .units()
        .iter()
        .filter_map(|unit| {
            let (col, row) = model.unit_clock_region(unit.id)?;
            let region = device.clock_region(col as usize, row as usize)?;
            let distance = region.bounds.distance_to(unit.location(), 1.0);
            let tier = if distance <= 0.0 {
                return None;
            } else if distance <= 5.0 {
                1.0
            } else {
                2.0
            };
            Some(PseudoNet {
                unit: unit.id,
                target: region.center(),
                weight: base * unit.net_count() as f64 * tier,
            })
        })
        .collect()
}

fn add_anchor_pulls(system: &mut QpSystem, model: &PlacementModel, axis: Axis, request: &SolveRequest<'_>, scale: f64) {
    let power = model.progress() * 0.45 + 0.5;
    for unit in model.units() {
        if unit.is_fixed() {
            continue;
        }
        let current = axis.of(unit.location());
        let last = axis.of(unit.last_location());
        let degree = if request.consider_net_num {
            (unit.net_count() as f64).powf(power)
        } else {
            1.0
        };
        let weight = degree * request.pseudo_weight / (last - current).abs().max(MIN_ANCHOR_DISTANCE);
        add_pseudo_net(system, unit, current, weight * scale);
    }
}

/// Adds one two-pin spring between pin locations `pos + off` of two units.
fn add_spring(
    system: &mut QpSystem,
    (u0, pos0, off0, movable0): (usize, f64, f64, bool),
    (u1, pos1, off1, movable1): (usize, f64, f64, bool),
    w: f64,
) {
    if u0 == u1 || w.is_nan() || w <= 0.0 {
        return;
    }
    let has_offset = off0.abs() > OFFSET_EPS || off1.abs() > OFFSET_EPS;
    match (movable0, movable1) {
        (true, true) => {
            system.add_diagonal(u0, w);
            system.add_diagonal(u1, w);
            system.add_symmetric(u0, u1, -w);
            if has_offset {
                system.add_linear(u0, w * (off0 - off1));
                system.add_linear(u1, w * (off1 - off0));
            }
        }
        (true, false) => {
            system.add_diagonal(u0, w);
            system.add_linear(u0, -w * pos1);
            if has_offset {
                system.add_linear(u0, w * (off0 - off1));
            }
        }
        (false, true) => {
            system.add_diagonal(u1, w);
            system.add_linear(u1, -w * pos0);
            if has_offset {
                system.add_linear(u1, w * (off1 - off0));
            }
        }
        (false, false) => {}
    }
}

fn pin_end(units: &[PlacementUnit], net: &PlacementNet, pin: usize, axis: Axis) -> (usize, f64, f64, bool) {
    let p = &net.pins[pin];
    let unit = &units[p.unit.index()];
    (p.unit.index(), axis.of(unit.location()), axis.of(p.offset), !unit.is_fixed())
}

fn pin_coord(units: &[PlacementUnit], net: &PlacementNet, pin: usize, axis: Axis) -> f64 {
    axis.of(net.pin_location(units, pin))
}

/// Net-degree weighting of the bound-to-bound model.
pub(crate) fn degree_factor(pins: usize) -> f64 {
    match pins {
        0..=9 => 1.0,
        10..=19 => 1.2,
        20..=49 => 1.6,
        50..=99 => 1.8,
        100..=199 => 2.1,
        _ => 2.5,
    }
}

/// Bound-to-bound springs of one net on one axis.
pub(crate) fn add_net_springs(
    system: &mut QpSystem,
    units: &[PlacementUnit],
    net: &PlacementNet,
    axis: Axis,
    general_weight: f64,
) {
    let pins = net.pins.len();
    if pins < 2 {
        return;
    }
    let w = 2.0 * general_weight / (pins - 1) as f64 * degree_factor(pins) * net.weight;
    let coords: Vec<f64> = (0..pins).map(|i| pin_coord(units, net, i, axis)).collect();
    let mut low = 0;
    let mut high = 0;
    for (i, &c) in coords.iter().enumerate() {
        if c < coords[low] {
            low = i;
        }
        if c > coords[high] {
            high = i;
        }
    }
    if net.pins[low].unit == net.pins[high].unit {
        return;
    }
    let (lo, hi) = (coords[low], coords[high]);
    add_spring(
        system,
        pin_end(units, net, low, axis),
        pin_end(units, net, high, axis),
        w / (hi - lo).max(MIN_SPRING_LENGTH),
    );
    for i in 0..pins {
        if i == low || i == high {
            continue;
        }
        let inner = pin_end(units, net, i, axis);
        add_spring(
            system,
            inner,
            pin_end(units, net, low, axis),
            w / (coords[i] - lo).max(MIN_SPRING_LENGTH),
        );
        add_spring(
            system,
            inner,
            pin_end(units, net, high, axis),
            w / (hi - coords[i]).max(MIN_SPRING_LENGTH),
        );
    }
}

fn add_pin_spring(
    system: &mut QpSystem,
    units: &[PlacementUnit],
    net: &PlacementNet,
    a: usize,
    b: usize,
    axis: Axis,
    w: f64,
) {
    add_spring(system, pin_end(units, net, a, axis), pin_end(units, net, b, axis), w);
}

fn add_pseudo_net(system: &mut QpSystem, unit: &PlacementUnit, target: f64, w: f64) {
    if unit.is_fixed() {
        return;
    }
    add_spring(system, (unit.id.index(), 0.0, 0.0, true), (usize::MAX, target, 0.0, false), w);
}

fn solve_axis(
    system: &QpSystem,
    x: &mut [f64],
    (lower, upper): (f64, f64),
    constrained: bool,
    settings: CgSettings,
) -> SolveStats {
    let matrix = system.to_csr();
    let b: Vec<f64> = system.linear().iter().map(|q| -q).collect();
    if constrained {
        let lo = vec![lower; x.len()];
        let hi = vec![upper; x.len()];
        projected_conjugate_gradient(&matrix, &b, x, &lo, &hi, settings)
    } else {
        conjugate_gradient(&matrix, &b, x, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiplace_common::CellId;
    use hiplace_device::{DeviceBuilder, SiteType};
    use hiplace_model::{CellType, Design, ModelSettings};

    fn device() -> Device {
        let mut builder = DeviceBuilder::new("grid");
        for x in 0..=20 {
            builder = builder.column(f64::from(x), SiteType::SliceL, 21);
        }
        builder.clock_regions(2, 2).build().unwrap()
    }

    /// `a` fixed at the origin, `b` free at (10, 10), one net between them.
    fn two_pin_model() -> PlacementModel {
        let mut design = Design::new("pair");
        let a = design.add_cell("a", CellType::Lut);
        let b = design.add_cell("b", CellType::Lut);
        design.fix_cell(a, Point::new(0.0, 0.0));
        let n = design.add_net("n");
        design.connect(n, a, Point::default(), true);
        design.connect(n, b, Point::default(), false);
        let mut model = PlacementModel::new(design, &device(), ModelSettings::default()).unwrap();
        let b = model.cell_unit(CellId::from_raw(1));
        model.set_anchor_location_and_forget(b, Point::new(10.0, 10.0));
        model
    }

    #[test]
    fn one_iteration_shortens_a_two_pin_net() {
        let mut model = two_pin_model();
        let before = model.total_hpwl();
        let mut optimizer = WirelengthOptimizer::new(&PlacerConfig::default());
        let pool = WorkerPool::new(2).unwrap();
        let sink = DiagnosticSink::new();
        let request = SolveRequest {
            pseudo_weight: 0.01,
            ..SolveRequest::default()
        };
        let report = optimizer
            .solve_iteration(&pool, &mut model, &device(), &request, &sink)
            .unwrap();
        assert!(report.applied);
        assert!(model.total_hpwl() < before);
        let a = model.cell_unit(CellId::from_raw(0));
        assert_eq!(model.unit(a).location(), Point::new(0.0, 0.0));
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn free_pair_without_pseudo_nets_pulls_together() {
        let mut design = Design::new("free pair");
        let a = design.add_cell("a", CellType::Lut);
        let b = design.add_cell("b", CellType::Lut);
        let n = design.add_net("n");
        design.connect(n, a, Point::default(), true);
        design.connect(n, b, Point::default(), false);
        let mut model = PlacementModel::new(design, &device(), ModelSettings::default()).unwrap();
        let (ua, ub) = (model.cell_unit(a), model.cell_unit(b));
        model.set_anchor_location_and_forget(ua, Point::new(2.0, 3.0));
        model.set_anchor_location_and_forget(ub, Point::new(13.0, 14.0));
        let before = model.total_hpwl();
        assert_eq!(before, 22.0);

        let mut optimizer = WirelengthOptimizer::new(&PlacerConfig::default());
        let pool = WorkerPool::new(2).unwrap();
        let sink = DiagnosticSink::new();
        let request = SolveRequest {
            pseudo_weight: 0.0,
            ..SolveRequest::default()
        };
        let report = optimizer
            .solve_iteration(&pool, &mut model, &device(), &request, &sink)
            .unwrap();
        assert!(report.applied);
        assert!(model.total_hpwl() < before, "HPWL {} not below {before}", model.total_hpwl());
        assert_ne!(model.unit(ua).location(), Point::new(2.0, 3.0));
        assert_ne!(model.unit(ub).location(), Point::new(13.0, 14.0));
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn degree_factor_tiers() {
        assert_eq!(degree_factor(2), 1.0);
        assert_eq!(degree_factor(10), 1.2);
        assert_eq!(degree_factor(49), 1.6);
        assert_eq!(degree_factor(99), 1.8);
        assert_eq!(degree_factor(150), 2.1);
        assert_eq!(degree_factor(5000), 2.5);
    }

    #[test]
    fn fixed_endpoint_becomes_linear_term() {
        let model = two_pin_model();
        let net = &model.nets()[0];
        let mut system = QpSystem::new(model.units().len());
        add_net_springs(&mut system, model.units(), net, Axis::X, 1.0);
        let m = system.to_csr();
        let b = model.cell_unit(CellId::from_raw(1)).index();
        let a = model.cell_unit(CellId::from_raw(0)).index();
        // w = 2 / 1, divided by the span of 10.
        assert!((m.get(b, b) - 0.2).abs() < 1e-12);
        assert_eq!(m.get(a, a), 0.0);
        assert_eq!(m.get(a, b), 0.0);
        assert_eq!(system.linear()[b], 0.0);
    }

    #[test]
    fn movable_pair_with_offsets_is_symmetric() {
        let mut design = Design::new("offsets");
        let a = design.add_cell("a", CellType::Lut);
        let b = design.add_cell("b", CellType::Lut);
        let n = design.add_net("n");
        design.connect(n, a, Point::new(0.5, 0.0), true);
        design.connect(n, b, Point::default(), false);
        let mut model = PlacementModel::new(design, &device(), ModelSettings::default()).unwrap();
        model.set_anchor_location_and_forget(UnitId::from_raw(1), Point::new(4.0, 0.0));
        model.set_anchor_location_and_forget(UnitId::from_raw(0), Point::new(0.0, 0.0));
        let mut system = QpSystem::new(2);
        add_net_springs(&mut system, model.units(), &model.nets()[0], Axis::X, 1.0);
        let m = system.to_csr();
        let w = 2.0 / 3.5;
        assert!((m.get(0, 0) - w).abs() < 1e-12);
        assert!((m.get(0, 1) + w).abs() < 1e-12);
        assert_eq!(m.get(0, 1), m.get(1, 0));
        assert!((system.linear()[0] - w * 0.5).abs() < 1e-12);
        assert!((system.linear()[1] + w * 0.5).abs() < 1e-12);
    }

    #[test]
    fn macro_pull_weight_ramps_up() {
        let mut model = two_pin_model();
        model.set_progress(0.95);
        let b = model.cell_unit(CellId::from_raw(1));
        model.legal_plan_mut().set_location(b, Point::new(3.0, 3.0));
        let mut optimizer = WirelengthOptimizer::new(&PlacerConfig::default());
        let request = SolveRequest::default();
        let pulls = optimizer.macro_pulls(&model, &request);
        assert_eq!(pulls.len(), 1);
        let (count, weight) = optimizer.macro_pull_state();
        assert_eq!(count, 1);
        assert!((weight - 1.025 * 1.05).abs() < 1e-12);
        // One net, CLB-like unit: divided by 3.
        assert!((pulls[0].weight - weight / 20.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn macro_pull_disabled_for_direct_legalization() {
        let mut model = two_pin_model();
        let b = model.cell_unit(CellId::from_raw(1));
        model.legal_plan_mut().set_location(b, Point::new(3.0, 3.0));
        let config = PlacerConfig {
            direct_macro_legalize: true,
            ..PlacerConfig::default()
        };
        let mut optimizer = WirelengthOptimizer::new(&config);
        let request = SolveRequest {
            enable_macro_pull: true,
            ..SolveRequest::default()
        };
        let pool = WorkerPool::new(1).unwrap();
        optimizer.assemble(&pool, &model, &device(), &request);
        assert_eq!(optimizer.macro_pull_state().0, 0);
    }

    #[test]
    fn clock_region_pull_tiers_by_distance() {
        let mut design = Design::new("cr");
        let a = design.add_cell("a", CellType::Lut);
        let b = design.add_cell("b", CellType::Lut);
        design.constrain_to_clock_region(a, 1, 1);
        let n = design.add_net("n");
        design.connect(n, a, Point::default(), true);
        design.connect(n, b, Point::default(), false);
        let device = device();
        let mut model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();
        let a = model.cell_unit(CellId::from_raw(0));

        model.set_anchor_location_and_forget(a, Point::new(15.0, 15.0));
        assert!(clock_region_pulls(&model, &device, 1.0).is_empty());

        model.set_anchor_location_and_forget(a, Point::new(8.0, 15.0));
        let near = clock_region_pulls(&model, &device, 1.0);
        assert_eq!(near[0].weight, 1.0);

        model.set_anchor_location_and_forget(a, Point::new(0.0, 0.0));
        let far = clock_region_pulls(&model, &device, 1.0);
        assert_eq!(far[0].weight, 2.0);
        assert_eq!(far[0].target, device.clock_region(1, 1).unwrap().center());
    }

    #[test]
    fn cluster_pull_fades_each_call() {
        let mut model = two_pin_model();
        let mut optimizer = WirelengthOptimizer::new(&PlacerConfig::default());
        model.set_user_clusters(vec![vec![CellId::from_raw(0), CellId::from_raw(1)]]);
        // Two cells only: below the minimum cluster size.
        assert!(optimizer.cluster_pulls(&model, 1.0).is_empty());
        assert!((optimizer.cluster_fade() - 0.9).abs() < 1e-12);
        optimizer.cluster_pulls(&model, 1.0);
        assert!((optimizer.cluster_fade() - 0.81).abs() < 1e-12);
    }

    #[test]
    fn constrained_solve_stays_in_box() {
        let mut model = two_pin_model();
        let config = PlacerConfig {
            constrained_qp: true,
            ..PlacerConfig::default()
        };
        let mut optimizer = WirelengthOptimizer::new(&config);
        let pool = WorkerPool::new(2).unwrap();
        let sink = DiagnosticSink::new();
        let report = optimizer
            .solve_iteration(&pool, &mut model, &device(), &SolveRequest::default(), &sink)
            .unwrap();
        assert!(report.applied);
        let bounds = model.bounds();
        for unit in model.units() {
            assert!(bounds.contains(unit.location()));
        }
    }
}
