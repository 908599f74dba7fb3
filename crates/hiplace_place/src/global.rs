//! The global placement loop.
//!
//! Every iteration solves the quadratic wirelength problem (the lower bound),
//! spreads each resource family out of overfull bins (the upper bound) and,
//! from the eighth iteration on, legalizes DSP, block RAM, carry and
//! distributed RAM units. The ratio of the two bounds drives the anchor
//! pseudo-net weight and the spreading forget ratio. Once legalization
//! displacement settles, the legalized units are fixed on their sites and
//! the loop winds down.

use crate::cluster::{self, ClusterSummary};
use crate::codes;
use crate::legalizer::{ClbLegalizer, Legalizer, MacroLegalizer};
use crate::spreader::GeneralSpreader;
use crate::timing::TimingContext;
use crate::trace::PlacementTraces;
use crate::wirelength::{SolveRequest, WirelengthOptimizer};
use crate::workers::WorkerPool;
use hiplace_common::{PlaceResult, Point, UnitId};
use hiplace_config::PlacerConfig;
use hiplace_device::{Device, SiteType};
use hiplace_diagnostics::{Diagnostic, DiagnosticSink};
use hiplace_model::{CellType, PlacementModel, ResourceFamily};
use log::{debug, info, log, warn, Level};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// QP solves per iteration.
const QP_PASSES: usize = 2;
/// First iteration that legalizes macros in a fresh run.
const MACRO_LEGALIZATION_START: usize = 8;
/// Rough legalization is used until this iteration.
const ROUGH_PHASE_END: usize = 10;
const ROUGH_DISPLACEMENT_LIMIT: f64 = 1.5;
/// From this iteration on, macros close enough to their sites are fixed.
const FORCE_FIX_ITERATION: usize = 10;
const FORCE_FIX_DISPLACEMENT: f64 = 7.5;
/// Iterations the macros stay untouched once their displacement stalls.
const LOCK_ITERATIONS: u32 = 3;
const INITIAL_FORGET_RATIO: f64 = 0.2;
const INITIAL_DISPLACEMENT: f64 = 100_000.0;
/// Carry chains far beyond this are legalized every iteration.
const CARRY_RUNAWAY_DISPLACEMENT: f64 = 5000.0;

/// Why a global placement run stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convergence {
    /// Upper and lower bound within 2% with macros on their sites.
    BoundsClose,
    /// Progress saturated with macros on their sites.
    ProgressSaturated,
    /// Late iteration within twice the best HPWL with macros fixed.
    BoundedHpwl,
    /// Upper bound within 2% of the best HPWL with macros fixed.
    NearMinimum,
    /// One full iteration ran with macros fixed.
    MacrosSettled,
    /// Placement is converged enough to pack slices before going on.
    ReadyForPacking,
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Convergence::BoundsClose => "HPWL bounds are close",
            Convergence::ProgressSaturated => "progress saturated",
            Convergence::BoundedHpwl => "HPWL is bounded with macros fixed",
            Convergence::NearMinimum => "HPWL is near its minimum",
            Convergence::MacrosSettled => "macros are settled",
            Convergence::ReadyForPacking => "ready for packing",
        };
        f.write_str(text)
    }
}

/// Bounds and schedule values after one iteration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IterationRecord {
    /// Zero-based iteration number.
    pub iteration: usize,
    /// HPWL after the QP solves.
    pub lower_hpwl: f64,
    /// HPWL after spreading and legalization.
    pub upper_hpwl: f64,
    /// Anchor pseudo-net weight for the next iteration.
    pub pseudo_net_weight: f64,
    /// Progress ratio in `[0, 1]`.
    pub progress: f64,
    /// Mean displacement of the DSP and block RAM legalization.
    pub macro_displacement: f64,
}

/// Summary of a global placement run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GlobalPlacementReport {
    /// Iterations run.
    pub iterations: usize,
    /// Why the run stopped, `None` if it ran out of iterations.
    pub converged_by: Option<Convergence>,
    /// HPWL after the last spreading and legalization.
    pub final_upper_hpwl: f64,
    /// HPWL after the last QP solve.
    pub final_lower_hpwl: f64,
    /// Legalized units are fixed on their sites.
    pub macros_fixed: bool,
    /// Per-iteration records.
    pub history: Vec<IterationRecord>,
}

/// Schedule state that carries over to a continued run.
///
/// Restoring it into a fresh [`GlobalPlacer`] reproduces the pseudo-net
/// magnitudes of the placer it was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PseudoNetBookkeeping {
    /// Anchor pseudo-net weight at the end of the last run.
    pub pseudo_net_weight: f64,
    /// Calls that pulled units towards their legal locations.
    pub macro_pull_count: u32,
    /// Base weight of the legal location pull.
    pub macro_pull_weight: f64,
    /// Fade factor of the user cluster pull.
    pub cluster_fade: f64,
    /// Legalized units were fixed on their sites.
    pub macros_fixed: bool,
}

/// Latest mean displacements of the three legalizers.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Displacements {
    macros: f64,
    slicem: f64,
    carry: f64,
}

#[derive(Clone, Debug)]
struct Schedule {
    pseudo_weight: f64,
    saved_pseudo_weight: Option<f64>,
    progress: f64,
    forget: f64,
    min_hpwl: f64,
    upper: f64,
    lower: f64,
    hpwl_history: VecDeque<f64>,
    hpwl_change_little: bool,
    min_reset_after_legalization: bool,
    displacement: Displacements,
    displacement_history: Vec<f64>,
    macros_bound: bool,
    macros_close: bool,
    macros_locked: bool,
    locked_iterations: u32,
    macros_fixed: bool,
    timing_enabled: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            pseudo_weight: 1.0,
            saved_pseudo_weight: None,
            progress: 0.0,
            forget: INITIAL_FORGET_RATIO,
            min_hpwl: f64::INFINITY,
            upper: f64::INFINITY,
            lower: 1.0,
            hpwl_history: VecDeque::new(),
            hpwl_change_little: false,
            min_reset_after_legalization: false,
            displacement: Displacements {
                macros: INITIAL_DISPLACEMENT,
                slicem: INITIAL_DISPLACEMENT,
                carry: INITIAL_DISPLACEMENT,
            },
            displacement_history: Vec::new(),
            macros_bound: false,
            macros_close: false,
            macros_locked: false,
            locked_iterations: 0,
            macros_fixed: false,
            timing_enabled: false,
        }
    }
}

/// Drives initial placement and the global placement iterations.
#[derive(Debug)]
pub struct GlobalPlacer {
    config: PlacerConfig,
    pool: WorkerPool,
    optimizer: WirelengthOptimizer,
    bram_dsp: MacroLegalizer,
    carry: MacroLegalizer,
    slicem: ClbLegalizer,
    traces: PlacementTraces,
    timing: Option<TimingContext>,
    state: Schedule,
}

impl GlobalPlacer {
    /// Creates a placer with its worker pool, optimizer and legalizers.
    pub fn new(config: &PlacerConfig) -> PlaceResult<Self> {
        let pool = WorkerPool::new(config.jobs)?;
        let jobs = pool.jobs();
        let verbose = config.macro_legalization_verbose;
        let bram_dsp = MacroLegalizer::new(
            "BRAM-DSP",
            vec![CellType::Bram18, CellType::Bram36, CellType::Dsp],
            vec![SiteType::Bram, SiteType::Dsp],
            jobs,
        )
        .with_verbose(verbose);
        let carry = MacroLegalizer::new("CARRY", vec![CellType::Carry], vec![SiteType::SliceL, SiteType::SliceM], jobs)
            .with_verbose(verbose);
        let slicem = ClbLegalizer::new("SLICEM", SiteType::SliceM, jobs).with_verbose(verbose);
        if config.direct_macro_legalize {
            warn!("direct macro legalization is enabled, HPWL may suffer");
        }
        let traces = PlacementTraces::new(&config.trace);
        if traces.any_enabled() {
            info!("coordinate traces enabled");
        }
        Ok(Self {
            config: config.clone(),
            pool,
            optimizer: WirelengthOptimizer::new(config),
            bram_dsp,
            carry,
            slicem,
            traces,
            timing: None,
            state: Schedule::default(),
        })
    }

    /// Enables timing-driven pulls once placement has progressed far enough.
    pub fn set_timing(&mut self, timing: Option<TimingContext>) {
        self.timing = timing;
    }

    /// Places every movable unit before the first iteration, randomly or by
    /// clusters depending on the configuration.
    pub fn cluster_placement(&mut self, model: &mut PlacementModel, device: &Device) -> Option<ClusterSummary> {
        let summary = if self.config.random_initial_placement {
            cluster::random_placement(model, self.config.random_seed);
            None
        } else {
            Some(cluster::cluster_placement(
                model,
                device,
                self.config.cluster_size,
                self.config.random_seed,
            ))
        };
        info!("initial placement done, HPWL {:.1}", model.total_hpwl());
        summary
    }

    /// The schedule state a continued run needs.
    pub fn bookkeeping(&self) -> PseudoNetBookkeeping {
        let (macro_pull_count, macro_pull_weight) = self.optimizer.macro_pull_state();
        PseudoNetBookkeeping {
            pseudo_net_weight: self.state.saved_pseudo_weight.unwrap_or(self.config.pseudo_net_weight),
            macro_pull_count,
            macro_pull_weight,
            cluster_fade: self.optimizer.cluster_fade(),
            macros_fixed: self.state.macros_fixed,
        }
    }

    /// Restores schedule state taken from another placer.
    pub fn restore_bookkeeping(&mut self, saved: &PseudoNetBookkeeping) {
        self.state.saved_pseudo_weight = Some(saved.pseudo_net_weight);
        self.state.macros_fixed = saved.macros_fixed;
        self.optimizer
            .set_macro_pull_state(saved.macro_pull_count, saved.macro_pull_weight);
        self.optimizer.set_cluster_fade(saved.cluster_fade);
    }

    /// Runs up to `iterations` global placement iterations.
    ///
    /// With `continue_previous` the pseudo-net weight of the last run is
    /// reused and macros are legalized from the first iteration on. A broken
    /// invariant aborts the run and is also reported to `sink`.
    pub fn run(
        &mut self,
        model: &mut PlacementModel,
        device: &mut Device,
        iterations: usize,
        continue_previous: bool,
        sink: &DiagnosticSink,
    ) -> PlaceResult<GlobalPlacementReport> {
        let result = self.iterate(model, device, iterations, continue_previous, sink);
        if let Err(e) = &result {
            sink.emit(Diagnostic::error(codes::INVARIANT_BROKEN, e.message.clone()).with_origin("global placer"));
        }
        result
    }

    fn iterate(
        &mut self,
        model: &mut PlacementModel,
        device: &mut Device,
        iterations: usize,
        continue_previous: bool,
        sink: &DiagnosticSink,
    ) -> PlaceResult<GlobalPlacementReport> {
        info!("global placement started: up to {iterations} iterations");
        self.begin(model, continue_previous);
        let fresh = !continue_previous;
        let level = if self.config.global_placer_verbose {
            Level::Info
        } else {
            Level::Debug
        };
        let mut report = GlobalPlacementReport::default();
        let mut iterations_fixed = 0;

        for i in 0..iterations {
            report.iterations = i + 1;
            self.lower_bound(model, device, i, continue_previous, sink)?;
            self.traces.dump_phase(model, sink);

            self.spreading(model, i, sink)?;
            self.state.upper = model.total_hpwl();
            self.traces.dump_phase(model, sink);

            if !fresh || i >= MACRO_LEGALIZATION_START {
                self.macro_legalize(model, device, i, sink)?;
            }
            if self.config.global_placer_print_hpwl {
                info!(
                    "HPWL after legalization {:.1}, pseudo-net weight {:.4}",
                    self.state.upper, self.state.pseudo_weight
                );
            }
            self.state.min_hpwl = self.state.min_hpwl.min(self.state.upper);
            self.state.upper = model.total_hpwl();

            if !self.state.min_reset_after_legalization && self.state.macros_close {
                warn!(
                    "macros reached their sites, minimum HPWL reset to {:.1}",
                    self.state.upper
                );
                self.state.min_hpwl = self.state.upper;
                self.state.min_reset_after_legalization = true;
                self.state.pseudo_weight *= 0.5;
            }

            self.update_pseudo_net_weight(model, i);
            let s = &self.state;
            report.history.push(IterationRecord {
                iteration: i,
                lower_hpwl: s.lower,
                upper_hpwl: s.upper,
                pseudo_net_weight: s.pseudo_weight,
                progress: s.progress,
                macro_displacement: s.displacement.macros,
            });
            info!(
                "iteration {i:3}: lower HPWL {:.1}, upper HPWL {:.1}, progress {:.3}",
                s.lower, s.upper, s.progress
            );
            log!(
                level,
                "upper/lower {:.4}, min HPWL {:.1}, macro displacement {:.3}, close to sites: {}, fixed: {}",
                s.upper / s.lower,
                s.min_hpwl,
                s.displacement.macros,
                s.macros_close,
                s.macros_fixed
            );

            let converged = self.convergence(i, iterations_fixed);
            if self.state.macros_fixed {
                iterations_fixed += 1;
            }
            if let Some(reason) = converged {
                info!("global placement converged after {} iterations: {reason}", i + 1);
                report.converged_by = Some(reason);
                break;
            }
            if self.state.progress > 0.98 && self.state.macros_close && fresh {
                info!("global placement should pack slices before going on");
                report.converged_by = Some(Convergence::ReadyForPacking);
                break;
            }
        }

        if report.converged_by.is_none() && iterations > 0 {
            warn!("global placement stopped after {iterations} iterations without converging");
            sink.emit(
                Diagnostic::warning(
                    codes::ITERATION_LIMIT,
                    format!("global placement did not converge in {iterations} iterations"),
                )
                .with_origin("global placer")
                .with_note(format!(
                    "final HPWL bounds: {:.1} (upper), {:.1} (lower)",
                    self.state.upper, self.state.lower
                ))
                .with_help("raise GlobalPlacementIteration or continue from this placement"),
            );
        }
        self.traces.dump_phase(model, sink);

        self.state.saved_pseudo_weight = Some(self.state.pseudo_weight);
        report.final_upper_hpwl = self.state.upper;
        report.final_lower_hpwl = self.state.lower;
        report.macros_fixed = self.state.macros_fixed;
        Ok(report)
    }

    /// Resets the per-run part of the schedule.
    fn begin(&mut self, model: &PlacementModel, continue_previous: bool) {
        let s = &mut self.state;
        s.pseudo_weight = match s.saved_pseudo_weight {
            Some(weight) if continue_previous => weight,
            _ => self.config.pseudo_net_weight,
        };
        s.displacement_history.clear();
        s.progress = if model.progress() > 0.1 { model.progress() } else { 0.0 };
        s.forget = INITIAL_FORGET_RATIO;
        let total = model.total_hpwl();
        if total * 100.0 < s.min_hpwl {
            s.min_hpwl = total * 100.0;
        }
        s.upper = s.min_hpwl;
        s.lower = 1.0;
    }

    /// The QP passes of one iteration.
    fn lower_bound(
        &mut self,
        model: &mut PlacementModel,
        device: &Device,
        iteration: usize,
        continue_previous: bool,
        sink: &DiagnosticSink,
    ) -> PlaceResult<()> {
        let cluster_pull =
            (iteration > 1 || continue_previous) && !model.user_clusters().is_empty() && self.state.progress < 0.6;
        for pass in 0..QP_PASSES {
            let timing_active = self.state.progress > 0.5 || self.state.timing_enabled;
            let request = SolveRequest {
                pseudo_weight: self.state.pseudo_weight,
                first_iteration: pass == 0,
                forward_solution: true,
                enable_macro_pull: true,
                consider_net_num: self.config.pseudo_net_weight_consider_net_num,
                enable_cluster_pull: cluster_pull,
                timing: if timing_active { self.timing.as_ref() } else { None },
            };
            self.optimizer
                .solve_iteration(&self.pool, model, device, &request, sink)?;
            if self.state.progress > 0.5 {
                self.state.timing_enabled = true;
            }
        }
        self.state.lower = model.total_hpwl();
        debug!(
            "QP iteration {iteration} done: HPWL {:.1}, pseudo-net weight {:.4}",
            self.state.lower, self.state.pseudo_weight
        );
        Ok(())
    }

    /// Spreads every slice family; carry chains only until macros are fixed.
    fn spreading(&mut self, model: &mut PlacementModel, iteration: usize, sink: &DiagnosticSink) -> PlaceResult<()> {
        model.update_element_bin_grid();
        let supply = if self.config.bin_width < 2.5 {
            0.95
        } else {
            0.8 + 0.1 * self.state.progress
        };
        let mut families = Vec::with_capacity(5);
        if !self.state.macros_fixed {
            families.push((ResourceFamily::Carry, supply));
        }
        families.extend([
            (ResourceFamily::MuxF8, 0.75),
            (ResourceFamily::MuxF7, 0.75),
            (ResourceFamily::Lut, supply),
            (ResourceFamily::Ff, supply),
        ]);
        let seed = self.config.random_seed.wrapping_add(iteration as u64);
        for (family, supply) in families {
            let mut spreader = GeneralSpreader::new(family, supply, self.config.spreader_simple_expand, seed);
            let trace = matches!(family, ResourceFamily::Lut | ResourceFamily::Ff).then_some(&mut self.traces.spreader);
            let outcome = spreader.spread_placement_units(&self.pool, model, self.state.forget, sink, trace)?;
            debug!(
                "{family}: spread in {} passes (converged: {})",
                outcome.loops, outcome.converged
            );
        }
        Ok(())
    }

    /// Legalizes DSP, block RAM, distributed RAM and carry units, choosing
    /// between rough and exact legalization from the current displacements.
    fn macro_legalize(
        &mut self,
        model: &mut PlacementModel,
        device: &mut Device,
        iteration: usize,
        sink: &DiagnosticSink,
    ) -> PlaceResult<()> {
        if self.state.macros_fixed {
            return Ok(());
        }
        if self.state.macros_locked {
            self.state.locked_iterations += 1;
            if self.state.locked_iterations > LOCK_ITERATIONS {
                self.state.macros_locked = false;
            } else {
                return Ok(());
            }
        }
        let direct = self.config.direct_macro_legalize;
        let rough = self.bram_dsp.rough_displacement() > ROUGH_DISPLACEMENT_LIMIT
            && self.state.progress < 0.9
            && iteration < ROUGH_PHASE_END
            && !self.state.macros_bound
            && !direct;
        if rough {
            self.rough_legalize(model, device, sink)?;
        } else {
            self.exact_legalize(model, device, iteration, sink)?;
        }

        let history = &self.state.displacement_history;
        if history.len() > 3 && self.state.displacement.macros < 3.0 && !direct {
            let last = &history[history.len() - 3..];
            let mean = last.iter().sum::<f64>() / 3.0;
            let deviation = (last.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / 3.0).sqrt();
            if deviation < 0.01 {
                warn!("macro displacement stalled at {mean:.3}, macros are locked for a while");
                self.state.macros_locked = true;
                self.state.locked_iterations = 0;
                self.state.displacement_history.clear();
            }
        }
        Ok(())
    }

    fn rough_legalize(&mut self, model: &mut PlacementModel, device: &mut Device, sink: &DiagnosticSink) -> PlaceResult<()> {
        debug!(
            "rough legalization: BRAM/DSP displacement {:.3}, SLICEM displacement {:.3}",
            self.bram_dsp.rough_displacement(),
            self.slicem.rough_displacement()
        );
        self.bram_dsp.reset_sites_mapped(device);
        self.slicem.reset_sites_mapped(device);
        self.carry.reset_sites_mapped(device);
        self.slicem.legalize(model, device, false, false, sink)?;
        self.bram_dsp.legalize(model, device, false, false, sink)?;
        let displacement = self.bram_dsp.rough_displacement();
        self.state.displacement.macros = displacement;
        self.state.displacement_history.push(displacement);
        Ok(())
    }

    fn exact_legalize(
        &mut self,
        model: &mut PlacementModel,
        device: &mut Device,
        iteration: usize,
        sink: &DiagnosticSink,
    ) -> PlaceResult<()> {
        let direct = self.config.direct_macro_legalize;
        let d = Displacements {
            macros: self.bram_dsp.exact_displacement(model),
            slicem: self.slicem.exact_displacement(model),
            carry: self.carry.exact_displacement(model),
        };
        self.state.displacement = d;
        debug!(
            "exact legalization: BRAM/DSP displacement {:.3}, SLICEM displacement {:.3}, CARRY displacement {:.3}",
            d.macros, d.slicem, d.carry
        );
        self.bram_dsp.set_initial_parameters(40.0, 40, None);
        self.slicem.set_initial_parameters(20.0, 20, Some(2));
        self.carry.set_initial_parameters(2.0, 3, Some(2));

        let far = d.macros > 1.0 || d.slicem > 2.0 || d.carry > 2.0;
        if !far && self.state.macros_close {
            self.fix_legalized_units(model);
            return Ok(());
        }

        let settled = d.macros < FORCE_FIX_DISPLACEMENT
            && d.slicem < FORCE_FIX_DISPLACEMENT
            && d.carry < FORCE_FIX_DISPLACEMENT;
        if iteration >= FORCE_FIX_ITERATION && settled {
            warn!("legalization keeps moving units, fixing them on their legal sites");
            self.state.macros_close = true;
        } else {
            self.state.macros_close = true;
            if d.slicem > 2.0 {
                self.slicem.reset_sites_mapped(device);
                self.slicem.legalize(model, device, true, false, sink)?;
                self.state.macros_close = false;
            }
            if d.macros > 1.0 {
                self.bram_dsp.reset_sites_mapped(device);
                self.bram_dsp.legalize(model, device, true, direct, sink)?;
                self.state.macros_close = false;
            }
            if d.carry > 2.0 {
                if iteration % 2 == 0 || d.carry > CARRY_RUNAWAY_DISPLACEMENT {
                    self.carry.reset_sites_mapped(device);
                    self.carry.legalize(model, device, true, direct, sink)?;
                }
                self.state.macros_close = false;
            }
            let displacement = self.bram_dsp.exact_displacement(model);
            self.state.displacement.macros = displacement;
            self.state.macros_bound = true;
            self.state.displacement_history.push(displacement);
            let entries: Vec<(Point, &str)> = model
                .legal_plan()
                .locations()
                .map(|(unit, at)| (at, model.unit(unit).name.as_str()))
                .collect();
            self.traces.macro_legalization.dump(entries, sink);
        }
        if direct {
            move_to_legal_locations(model, false);
        }
        if self.state.macros_close {
            self.fix_legalized_units(model);
        }
        Ok(())
    }

    fn fix_legalized_units(&mut self, model: &mut PlacementModel) {
        let fixed = move_to_legal_locations(model, true);
        info!("{fixed} legalized units are fixed on their sites");
        self.state.macros_fixed = true;
    }

    /// Updates progress, forget ratio and pseudo-net weight from the bounds.
    fn update_pseudo_net_weight(&mut self, model: &mut PlacementModel, iteration: usize) {
        let bram_dsp_displacement = self.bram_dsp.exact_displacement(model);
        let s = &mut self.state;
        let mut ratio = if s.upper > 0.0 { s.lower / s.upper } else { 1.0 };
        if ratio > 1.0 {
            ratio = 0.999;
        }
        s.forget = if ratio > 0.5 { 1.0 - 0.8 * ratio } else { 1.0 };
        if self.config.disable_spreading_converge_ratio {
            s.forget = 1.0;
        }
        s.hpwl_change_little = false;
        s.progress = ratio.max(0.0).powf(0.6);
        model.set_progress(s.progress);

        let p = s.progress;
        if s.pseudo_weight < 0.002 {
            s.pseudo_weight *= 1.825;
        } else {
            s.pseudo_weight *= 1.5 * (1.0 - p) + 1.01 * p;
        }

        s.hpwl_history.push_back(s.upper);
        let n = s.hpwl_history.len();
        if n > 5 {
            let err: f64 = s
                .hpwl_history
                .iter()
                .skip(n - 5)
                .map(|h| (s.min_hpwl - h).powi(2))
                .sum();
            let h = &s.hpwl_history;
            if h[n - 1] > h[n - 2] && h[n - 2] > h[n - 3] {
                if s.pseudo_weight > 0.03 && p < 0.95 {
                    while s.hpwl_history.len() > 1 {
                        s.hpwl_history.pop_front();
                    }
                    s.pseudo_weight *= 0.75;
                }
            } else if p > 0.8 && s.upper / s.min_hpwl > 1.333 && s.min_reset_after_legalization {
                warn!("upper bound HPWL grew too much, pseudo-net weight halved to recover");
                s.pseudo_weight *= 0.5;
                s.hpwl_history.clear();
            }
            let err = (err / 5.0).sqrt();
            debug!("HPWL error {err:.2} against minimum {:.1}", s.min_hpwl);
            if s.displacement.macros > 3.0 && p > 0.98 {
                s.pseudo_weight *= 1.05;
            }
            if err / s.min_hpwl < 0.01 && p > 0.85 && bram_dsp_displacement < 3.0 {
                debug!("HPWL changes little, doubling the pseudo-net weight");
                s.hpwl_change_little = true;
                s.pseudo_weight *= 2.0;
            }
        } else if n > 2
            && s.min_reset_after_legalization
            && p > 0.6
            && s.upper / s.min_hpwl > 1.333
            && iteration > 10
        {
            warn!("upper bound HPWL grew too much, pseudo-net weight halved to recover");
            s.pseudo_weight *= 0.5;
            s.hpwl_history.clear();
        }
    }

    /// The first convergence criterion that holds, if any.
    fn convergence(&self, iteration: usize, iterations_fixed: usize) -> Option<Convergence> {
        let s = &self.state;
        let settled = (s.displacement.macros < 1.0 && s.macros_close) || s.macros_fixed;
        if s.upper / s.lower < 1.02 && settled && s.pseudo_weight > 0.02 {
            Some(Convergence::BoundsClose)
        } else if (s.progress > 0.98 || (s.progress > 0.95 && s.hpwl_change_little)) && settled {
            Some(Convergence::ProgressSaturated)
        } else if s.upper < s.min_hpwl * 2.0 && s.macros_fixed && iteration > 30 {
            Some(Convergence::BoundedHpwl)
        } else if s.progress > 0.925 && s.upper / s.min_hpwl < 1.02 && s.macros_fixed {
            Some(Convergence::NearMinimum)
        } else if iterations_fixed >= 1 && s.macros_fixed {
            Some(Convergence::MacrosSettled)
        } else {
            None
        }
    }
}

/// Moves every unit with a legal location there, optionally fixing it, and
/// returns how many units moved.
fn move_to_legal_locations(model: &mut PlacementModel, fix: bool) -> usize {
    let legal: Vec<(UnitId, Point)> = model.legal_plan().locations().collect();
    for &(unit, at) in &legal {
        model.set_anchor_location_and_forget(unit, at);
        if fix {
            model.unit_mut(unit).set_fixed(true);
        }
    }
    legal.len()
}
