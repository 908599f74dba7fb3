//! Density-driven cell spreading for one resource family.
//!
//! Each pass finds the overflowing bins of the family's grid, grows a
//! region around every one of them until the region's total demand fits the
//! supply target, bipartitions each region to move cells into its bins, and
//! commits the new cell locations to their placement units. Passes repeat
//! until no bin overflows or progress stalls.

mod region;
mod subbox;

use crate::codes;
use crate::trace::CoordinateTrace;
use crate::workers::WorkerPool;
use hiplace_common::{CellId, PlaceResult, Point, Rect, UnitId};
use hiplace_diagnostics::{Diagnostic, DiagnosticSink};
use hiplace_model::{BinGrid, CellType, PlacementModel, ResourceFamily, UnitKind};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use region::SpreadRegion;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Every this many passes the shrink state of all bins is reset.
const SHRINK_RESET_PERIOD: usize = 20;
/// Consecutive overflowing passes after which a bin is shrunk.
const STREAK_LIMIT: u32 = 5;
const SHRINK_STEP: f64 = 0.015;
const MIN_SHRINK: f64 = 0.8;
/// Passes after which regions grow one strip at a time.
const SIMPLE_EXPAND_AFTER: usize = 400;
const SOFT_LOOP_CAP: usize = 500;
const HARD_LOOP_CAP: usize = 1000;
/// Regions are spread in parallel only above both of these.
const PARALLEL_MIN_BINS: usize = 256;
const PARALLEL_MIN_REGIONS: usize = 32;
/// Margin kept between spread cells and the device boundary.
const AREA_EPS: f64 = 1e-4;

/// How a spreading call ended.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpreadOutcome {
    /// Passes run.
    pub loops: usize,
    /// `true` if no bin overflowed at the end.
    pub converged: bool,
    /// Cells left in overflowing bins.
    pub final_overflow_cells: usize,
}

/// Spreads the cells of one resource family.
#[derive(Debug)]
pub struct GeneralSpreader {
    family: ResourceFamily,
    supply: f64,
    simple_expand: bool,
    rng: StdRng,
}

impl GeneralSpreader {
    /// Creates a spreader that fills bins up to `supply` of their capacity.
    pub fn new(family: ResourceFamily, supply: f64, simple_expand: bool, seed: u64) -> Self {
        Self {
            family,
            supply,
            simple_expand,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The family this spreader works on.
    pub fn family(&self) -> ResourceFamily {
        self.family
    }

    /// Target utilization of every bin.
    pub fn supply(&self) -> f64 {
        self.supply
    }

    /// Spreads until no bin overflows or progress stalls.
    ///
    /// Unit moves are damped by `forget` (see
    /// [`PlacementModel::set_spread_location`]); fixed and locked units keep
    /// their location. Every unit's spread location is recorded at the end.
    pub fn spread_placement_units(
        &mut self,
        pool: &WorkerPool,
        model: &mut PlacementModel,
        forget: f64,
        sink: &DiagnosticSink,
        mut trace: Option<&mut CoordinateTrace>,
    ) -> PlaceResult<SpreadOutcome> {
        let family = self.family;
        model.update_element_bin_grid();
        let grid = model.bin_grid(family);
        debug!(
            "{family}: spreading {:.1} of {:.1} capacity at supply {}",
            grid.total_utilization(),
            grid.total_capacity(),
            self.supply
        );
        let mut history: Vec<usize> = Vec::new();
        let mut simple = self.simple_expand;
        let mut loops = 0;
        let mut outcome = SpreadOutcome {
            loops: 0,
            converged: false,
            final_overflow_cells: 0,
        };

        loop {
            if loops % SHRINK_RESET_PERIOD == 0 {
                model.bin_grid_mut(family).reset_shrink_and_counters();
            }
            loops += 1;
            outcome.loops = loops;

            let overflow = find_overflow_bins(model.bin_grid_mut(family), self.supply);
            if overflow.is_empty() {
                outcome.converged = true;
                outcome.final_overflow_cells = 0;
                break;
            }
            let grid = model.bin_grid(family);
            let cell_count: usize = overflow.iter().map(|&b| grid.bin(b).cells().len()).sum();
            outcome.final_overflow_cells = cell_count;
            if loops > SIMPLE_EXPAND_AFTER {
                simple = true;
            }
            if loops > HARD_LOOP_CAP {
                self.report_loop_cap(sink, loops, overflow.len(), cell_count);
                break;
            }
            history.push(cell_count);
            if let Some(stop) = stalled(&history, loops) {
                if stop == Stall::LoopCap {
                    self.report_loop_cap(sink, loops, overflow.len(), cell_count);
                }
                debug!("{family}: spreading stalled after {loops} passes with {cell_count} overflowing cells");
                break;
            }
            debug!(
                "{family}: pass {loops}, {} overflowing bins holding {cell_count} cells",
                overflow.len()
            );

            let regions = self.expand_regions(grid, &overflow, simple)?;
            let covered: usize = regions.iter().map(|r| r.bins().len()).sum();
            let supply = self.supply;
            let model_ref: &PlacementModel = model;
            let moves: Vec<Vec<(CellId, Point)>> =
                if covered > PARALLEL_MIN_BINS && regions.len() > PARALLEL_MIN_REGIONS {
                    pool.install(|| {
                        regions
                            .par_iter()
                            .map(|r| subbox::spread_region(model_ref, grid, r, supply))
                            .collect()
                    })
                } else {
                    regions
                        .iter()
                        .map(|r| subbox::spread_region(model_ref, grid, r, supply))
                        .collect()
                };
            commit_spread_locations(model, &moves, forget)?;
            if let Some(trace) = trace.as_deref_mut() {
                trace.dump_cells(model, |t| matches!(t, CellType::Lut | CellType::Lutram | CellType::Ff), sink);
            }
        }

        model.record_spread_locations();
        debug!(
            "{family}: spreading finished after {} passes (converged: {})",
            outcome.loops, outcome.converged
        );
        Ok(outcome)
    }

    /// Grows one region from every overflowing bin not yet covered.
    fn expand_regions(&mut self, grid: &BinGrid, overflow: &[usize], simple: bool) -> PlaceResult<Vec<SpreadRegion>> {
        let mut covered = vec![false; grid.bins().len()];
        let mut regions = Vec::new();
        for &bin in overflow {
            if covered[bin] {
                continue;
            }
            let mut region = SpreadRegion::new(grid, bin, &mut covered)?;
            if simple {
                while region.overflow_ratio() > self.supply
                    && region.simple_find_direction(grid, &covered, &mut self.rng)
                {
                    region.simple_expand(grid, &mut covered)?;
                }
            } else {
                while region.overflow_ratio() > self.supply && region.smart_find_direction(grid, &covered) {
                    if !region.smart_expand(grid, self.supply, &mut covered, &mut self.rng)? {
                        break;
                    }
                }
            }
            if !region.cells().is_empty() {
                regions.push(region);
            }
        }
        Ok(regions)
    }

    fn report_loop_cap(&self, sink: &DiagnosticSink, loops: usize, bins: usize, cells: usize) {
        warn!(
            "{}: spreading stopped after {loops} passes with {bins} bins still overflowing",
            self.family
        );
        sink.emit(
            Diagnostic::warning(
                codes::SPREAD_LOOP_CAP,
                format!("{} spreading stopped after {loops} passes", self.family),
            )
            .with_origin("spreader")
            .with_note(format!("{bins} bins holding {cells} cells still overflow")),
        );
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stall {
    LoopCap,
    NoProgress,
}

/// Checks the overflowing-cell history for a stall.
fn stalled(history: &[usize], loops: usize) -> Option<Stall> {
    let n = history.len();
    if n <= 20 {
        return None;
    }
    let recent = (history[n - 1] + history[n - 2] + history[n - 3]) / 3;
    let earlier = (history[n - 20] + history[n - 19] + history[n - 18]) / 3;
    let improved = recent.abs_diff(earlier) as f64;
    let last = history[n - 1];
    if loops > SOFT_LOOP_CAP {
        return Some(Stall::LoopCap);
    }
    if improved < 30.0 && last < 1000 && loops > 300 {
        return Some(Stall::NoProgress);
    }
    if improved / (last.max(1) as f64) < 0.01 {
        return Some(Stall::NoProgress);
    }
    None
}

/// Updates the overflow bookkeeping of every bin and returns the
/// overflowing ones, most utilized first.
fn find_overflow_bins(grid: &mut BinGrid, threshold: f64) -> Vec<usize> {
    let mut overflow = Vec::new();
    for (index, bin) in grid.bins_mut().iter_mut().enumerate() {
        if bin.is_overflow(threshold) {
            overflow.push(index);
            bin.count_overflow();
            if bin.overflow_count() > STREAK_LIMIT {
                if bin.shrink_ratio() > MIN_SHRINK {
                    bin.shrink_by(SHRINK_STEP);
                } else {
                    bin.reset_shrink_ratio();
                }
                bin.reset_overflow_count();
            }
        } else {
            bin.count_no_overflow();
            if bin.no_overflow_count() > STREAK_LIMIT {
                bin.reset_shrink_ratio();
            }
        }
    }
    let bins = grid.bins();
    overflow.sort_by(|&a, &b| {
        bins[b]
            .utilization_rate()
            .total_cmp(&bins[a].utilization_rate())
            .then(a.cmp(&b))
    });
    overflow
}

fn clamp_into(area: Rect, p: Point) -> Point {
    Point::new(
        p.x.clamp(area.left + AREA_EPS, area.right - AREA_EPS),
        p.y.clamp(area.bottom + AREA_EPS, area.top - AREA_EPS),
    )
}

/// Moves every unit touched by the spread to its new location.
///
/// An unpacked cell takes its spread location directly; a macro moves to
/// the average anchor implied by its spread member cells.
fn commit_spread_locations(
    model: &mut PlacementModel,
    moves: &[Vec<(CellId, Point)>],
    forget: f64,
) -> PlaceResult<()> {
    let area = model.bounds();
    let mut spread: HashMap<CellId, Point> = HashMap::new();
    let mut units: Vec<UnitId> = Vec::new();
    let mut seen: HashSet<UnitId> = HashSet::new();
    for &(cell, p) in moves.iter().flatten() {
        spread.insert(cell, clamp_into(area, p));
        let unit = model.cell_unit(cell);
        if seen.insert(unit) {
            units.push(unit);
        }
    }

    for id in units {
        let unit = model.unit(id);
        if unit.is_fixed() || unit.is_locked() {
            continue;
        }
        let target = match &unit.kind {
            UnitKind::Unpacked(member) => match spread.get(&member.cell) {
                Some(&p) => p,
                None => continue,
            },
            UnitKind::Macro { members, .. } => {
                let mut sum = Point::default();
                let mut count = 0usize;
                for member in members {
                    if let Some(p) = spread.get(&member.cell) {
                        sum.x += p.x - member.offset.x;
                        sum.y += p.y - member.offset.y;
                        count += 1;
                    }
                }
                if count == 0 {
                    continue;
                }
                let average = Point::new(sum.x / count as f64, sum.y / count as f64);
                model.legalize_xy_in_area(id, average)
            }
        };
        model.set_spread_location(id, target, forget)?;
    }
    Ok(())
}
