//! Legalization of macros and single-site units onto device sites.
//!
//! Both legalizers share one flow. A rough phase matches every element to a
//! nearby free site in widening rounds and records the averaged anchor of
//! each unit in the model's legal plan. The exact phase maps each unit to a
//! site column, moves units out of over-full columns, matches again inside
//! the assigned columns and finally packs every column with a dynamic
//! program that keeps multi-site units contiguous. Chosen sites are marked
//! mapped on the device until [`Legalizer::reset_sites_mapped`].

mod clb_legalizer;
mod columns;
mod dp;
mod macro_legalizer;
mod rounds;

pub use clb_legalizer::ClbLegalizer;
pub use macro_legalizer::MacroLegalizer;

use crate::codes;
use columns::{most_frequent, spread_columns, ColumnSet};
use dp::{DpUnit, Slot};
use hiplace_common::{PlaceResult, Point, SiteId, UnitId};
use hiplace_device::{Device, SiteType};
use hiplace_diagnostics::{Diagnostic, DiagnosticSink};
use hiplace_model::PlacementModel;
use log::{debug, log, warn, Level};
use rayon::prelude::*;
use rounds::{MatchItem, MatchingRounds, RoundsOutcome, MAX_COST_NET_PINS};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Displacement reported before a legalization produced one.
pub const NO_DISPLACEMENT: f64 = 10_000.0;
/// Recorded exact displacements above this are reported as is.
const LIVE_DISPLACEMENT_LIMIT: f64 = 1000.0;

/// Starting point of the widening matching rounds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegalizerParameters {
    /// Initial search radius, doubled every round.
    pub displacement_threshold: f64,
    /// Initial number of candidate sites per element, doubled every round.
    pub max_candidates: usize,
    /// Sites fetched from the site index per kept candidate.
    pub candidate_factor: usize,
}

impl Default for LegalizerParameters {
    fn default() -> Self {
        Self {
            displacement_threshold: 30.0,
            max_candidates: 30,
            candidate_factor: 5,
        }
    }
}

/// A legalizer that binds units to device sites.
pub trait Legalizer {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Resets the matching parameters used by the next call to
    /// [`legalize`](Legalizer::legalize). The candidate factor is kept when
    /// `None`.
    fn set_initial_parameters(&mut self, displacement_threshold: f64, max_candidates: usize, candidate_factor: Option<usize>);

    /// The current matching parameters.
    fn parameters(&self) -> LegalizerParameters;

    /// Legalizes the units this legalizer handles. Without `exact` only the
    /// rough matching runs; with `direct` the rough matching is skipped and
    /// units go to the column nearest their current X.
    fn legalize(
        &mut self,
        model: &mut PlacementModel,
        device: &mut Device,
        exact: bool,
        direct: bool,
        sink: &DiagnosticSink,
    ) -> PlaceResult<()>;

    /// Mean element displacement of the last rough legalization.
    fn rough_displacement(&self) -> f64;

    /// Mean displacement between the units and their exact legal anchors.
    fn exact_displacement(&self, model: &PlacementModel) -> f64;

    /// Releases every site mapped so far.
    fn reset_sites_mapped(&mut self, device: &mut Device);

    /// Units handled by the last call to [`legalize`](Legalizer::legalize).
    fn legalized_units(&self) -> &[UnitId];
}

/// A unit as the shared flow sees it.
#[derive(Clone, Debug)]
pub(crate) struct PlannedUnit {
    pub unit: UnitId,
    /// Elements matched to sites, at least one.
    pub items: Vec<MatchItem>,
    /// Consecutive column sites the unit covers.
    pub height: usize,
    /// The lowest covered site must be on an even row.
    pub even_start: bool,
    /// Offset of the element on the lowest covered site.
    pub base_offset: Point,
}

/// State and flow shared by the legalizers.
#[derive(Debug)]
pub(crate) struct LegalizerCore {
    name: String,
    site_types: Vec<SiteType>,
    column_budget: fn(SiteType) -> f64,
    jobs: usize,
    verbose: bool,
    params: LegalizerParameters,
    units: Vec<UnitId>,
    mapped: Vec<SiteId>,
    rough_displacement: f64,
    final_displacement: f64,
    anchors: Vec<(UnitId, Point)>,
}

fn same_column_class(a: SiteType, b: SiteType) -> bool {
    a == b || (a.is_slice() && b.is_slice())
}

fn anchor_on(device: &Device, site: SiteId, offset: Point) -> Point {
    let site = device.site(site);
    Point::new(site.x - offset.x, site.y - offset.y)
}

impl LegalizerCore {
    pub fn new(name: String, site_types: Vec<SiteType>, column_budget: fn(SiteType) -> f64, jobs: usize) -> Self {
        Self {
            name,
            site_types,
            column_budget,
            jobs: jobs.max(1),
            verbose: false,
            params: LegalizerParameters::default(),
            units: Vec::new(),
            mapped: Vec::new(),
            rough_displacement: NO_DISPLACEMENT,
            final_displacement: NO_DISPLACEMENT,
            anchors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_initial_parameters(&mut self, displacement_threshold: f64, max_candidates: usize, candidate_factor: Option<usize>) {
        self.params.displacement_threshold = displacement_threshold;
        self.params.max_candidates = max_candidates;
        if let Some(factor) = candidate_factor {
            self.params.candidate_factor = factor;
        }
    }

    pub fn parameters(&self) -> LegalizerParameters {
        self.params
    }

    pub fn rough_displacement(&self) -> f64 {
        self.rough_displacement
    }

    pub fn exact_displacement(&self, model: &PlacementModel) -> f64 {
        if self.final_displacement > LIVE_DISPLACEMENT_LIMIT || self.anchors.is_empty() {
            return self.final_displacement;
        }
        let total: f64 = self
            .anchors
            .iter()
            .map(|&(unit, anchor)| {
                let at = model.unit(unit).location();
                (at.x - anchor.x).abs() + (at.y - anchor.y).abs()
            })
            .sum();
        total / self.anchors.len() as f64
    }

    pub fn reset_sites_mapped(&mut self, device: &mut Device) {
        let released = self.mapped.len();
        for site in self.mapped.drain(..) {
            device.reset_mapped(site);
        }
        debug!(
            "{}: released {released} sites, {} still mapped on the device",
            self.name,
            device.mapped_count()
        );
    }

    pub fn units(&self) -> &[UnitId] {
        &self.units
    }

    fn origin(&self) -> String {
        format!("legalizer[{}]", self.name)
    }

    fn level(&self) -> Level {
        if self.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }

    /// Runs the shared flow over `plan`.
    pub fn run(
        &mut self,
        model: &mut PlacementModel,
        device: &mut Device,
        plan: Vec<PlannedUnit>,
        exact: bool,
        direct: bool,
        sink: &DiagnosticSink,
    ) -> PlaceResult<()> {
        let columns = ColumnSet::available(device, &self.site_types);
        self.units = plan.iter().map(|p| p.unit).collect();
        self.anchors.clear();
        self.final_displacement = NO_DISPLACEMENT;
        log!(
            self.level(),
            "{}: legalizing {} units over {} columns (exact: {exact}, direct: {direct})",
            self.name,
            plan.len(),
            columns.len()
        );
        if plan.is_empty() {
            self.rough_displacement = 0.0;
            if exact {
                self.final_displacement = 0.0;
            }
            return Ok(());
        }

        let mut items = Vec::new();
        let mut owner = Vec::new();
        for (k, unit) in plan.iter().enumerate() {
            items.extend(unit.items.iter().copied());
            owner.extend(std::iter::repeat(k).take(unit.items.len()));
        }

        let mut relaxed = false;
        let mut rough: Vec<Option<SiteId>> = vec![None; items.len()];
        if !direct {
            let outcome = self.match_rounds(model, device, &columns, &items, false, sink)?;
            relaxed |= outcome.relaxed;
            rough = outcome.sites;
            let displacement = self.record_rough(model, device, &plan, &items, &owner, &rough);
            log!(self.level(), "{}: rough displacement {displacement:.3}", self.name);
            if !exact {
                self.rough_displacement = displacement;
            }
        }
        if !exact {
            if relaxed {
                self.report_relaxed(sink);
            }
            let sites: Vec<SiteId> = rough.into_iter().flatten().collect();
            return self.map_sites(device, &sites);
        }

        // Column per unit.
        let mut hits: Vec<Vec<usize>> = vec![Vec::new(); plan.len()];
        for (i, site) in rough.iter().enumerate() {
            if let Some(column) = site.and_then(|s| columns.column_of(s)) {
                hits[owner[i]].push(column);
            }
        }
        let mut assignment: Vec<Option<usize>> = plan
            .iter()
            .zip(hits)
            .map(|(unit, hits)| {
                let preferred = if direct { None } else { most_frequent(hits) };
                preferred.or_else(|| {
                    let site_types = unit.items.first().map_or(&[][..], |i| i.site_types);
                    columns.nearest(model.unit(unit.unit).x(), site_types)
                })
            })
            .collect();

        let residual = self.spread(model, &plan, &columns, &mut assignment);
        if residual > 0 {
            warn!("{}: {residual} sites of column demand remain over capacity", self.name);
            sink.emit(
                Diagnostic::warning(
                    codes::COLUMN_OVERFLOW,
                    format!("{}: columns still over capacity after spreading", self.name),
                )
                .with_origin(self.origin())
                .with_note(format!("{residual} sites of demand exceed the column capacity")),
            );
        }

        for (item, &k) in items.iter_mut().zip(&owner) {
            item.column = assignment[k];
        }
        let outcome = self.match_rounds(model, device, &columns, &items, true, sink)?;
        relaxed |= outcome.relaxed;
        if relaxed {
            self.report_relaxed(sink);
        }

        // Matched sites, column and averaged anchor per unit.
        let mut unit_sites: Vec<Vec<SiteId>> = vec![Vec::new(); plan.len()];
        let mut anchor_sum = vec![Point::new(0.0, 0.0); plan.len()];
        for (i, site) in outcome.sites.iter().enumerate() {
            if let Some(site) = *site {
                let k = owner[i];
                let anchor = anchor_on(device, site, items[i].offset);
                anchor_sum[k].x += anchor.x;
                anchor_sum[k].y += anchor.y;
                unit_sites[k].push(site);
            }
        }
        let mut column_units: Vec<Vec<(usize, Point)>> = vec![Vec::new(); columns.len()];
        for (k, sites) in unit_sites.iter_mut().enumerate() {
            let Some(column) = sites.first().and_then(|&s| columns.column_of(s)) else {
                continue;
            };
            let n = sites.len() as f64;
            column_units[column].push((k, Point::new(anchor_sum[k].x / n, anchor_sum[k].y / n)));
            sites.sort_by_key(|&s| device.site(s).row);
        }
        for units in &mut column_units {
            units.sort_by(|a, b| a.1.y.total_cmp(&b.1.y).then(a.0.cmp(&b.0)));
        }

        let packed = self.pack_columns(model, device, &plan, &columns, &column_units);

        let mut placements: Vec<(usize, Point, Vec<SiteId>)> = Vec::new();
        for (c, units) in column_units.iter().enumerate() {
            if units.is_empty() {
                continue;
            }
            let column = &columns.columns[c];
            match &packed[c] {
                Some(starts) => {
                    for (&(k, _), &start) in units.iter().zip(starts) {
                        let sites = column.sites[start..start + plan[k].height].to_vec();
                        let anchor = anchor_on(device, sites[0], plan[k].base_offset);
                        placements.push((k, anchor, sites));
                    }
                }
                None => {
                    warn!(
                        "{}: no contiguous packing for {} units in {:?} column at x = {}",
                        self.name,
                        units.len(),
                        column.site_type,
                        column.x
                    );
                    sink.emit(
                        Diagnostic::warning(
                            codes::COLUMN_INFEASIBLE,
                            format!("{}: column at x = {} cannot hold its units contiguously", self.name, column.x),
                        )
                        .with_origin(self.origin())
                        .with_note(format!("{} units keep their matched sites", units.len())),
                    );
                    for &(k, anchor) in units {
                        placements.push((k, anchor, std::mem::take(&mut unit_sites[k])));
                    }
                }
            }
        }

        let mut total = 0.0;
        for (k, anchor, sites) in placements {
            let unit = plan[k].unit;
            let at = model.unit(unit).location();
            total += (at.x - anchor.x).abs() + (at.y - anchor.y).abs();
            self.map_sites(device, &sites)?;
            let legal = model.legal_plan_mut();
            legal.set_location(unit, anchor);
            legal.set_sites(unit, sites);
            self.anchors.push((unit, anchor));
        }
        self.final_displacement = if self.anchors.is_empty() {
            0.0
        } else {
            total / self.anchors.len() as f64
        };
        log!(
            self.level(),
            "{}: {} units placed exactly, displacement {:.3}",
            self.name,
            self.anchors.len(),
            self.final_displacement
        );
        Ok(())
    }

    fn match_rounds(
        &self,
        model: &PlacementModel,
        device: &Device,
        columns: &ColumnSet,
        items: &[MatchItem],
        fixed_column: bool,
        sink: &DiagnosticSink,
    ) -> PlaceResult<RoundsOutcome> {
        let rounds = MatchingRounds {
            model,
            device,
            columns,
            params: self.params,
            jobs: self.jobs,
        };
        let outcome = rounds.run(items, fixed_column)?;
        log!(
            self.level(),
            "{}: {} matching finished after {} rounds",
            self.name,
            if fixed_column { "fixed-column" } else { "rough" },
            outcome.rounds
        );
        let unmatched = outcome.unmatched();
        if unmatched > 0 {
            warn!("{}: {unmatched} of {} elements found no site", self.name, items.len());
            sink.emit(
                Diagnostic::warning(
                    codes::UNMATCHED_UNITS,
                    format!("{}: {unmatched} of {} elements found no free site", self.name, items.len()),
                )
                .with_origin(self.origin())
                .with_help("the device may not have enough free sites of the required type"),
            );
        }
        Ok(outcome)
    }

    fn report_relaxed(&self, sink: &DiagnosticSink) {
        warn!("{}: matching radius exceeded twice its start, area legality was relaxed", self.name);
        sink.emit(
            Diagnostic::warning(
                codes::RELAXED_LEGALITY,
                format!("{}: matching dropped the area legality check", self.name),
            )
            .with_origin(self.origin())
            .with_note(format!(
                "the search radius grew beyond {}",
                2.0 * self.params.displacement_threshold
            )),
        );
    }

    /// Records the averaged anchor of every rough-matched unit and returns
    /// the mean element displacement.
    fn record_rough(
        &self,
        model: &mut PlacementModel,
        device: &Device,
        plan: &[PlannedUnit],
        items: &[MatchItem],
        owner: &[usize],
        sites: &[Option<SiteId>],
    ) -> f64 {
        let mut sum = vec![(Point::new(0.0, 0.0), 0usize); plan.len()];
        let mut displacement = 0.0;
        let mut matched = 0usize;
        for (i, site) in sites.iter().enumerate() {
            let Some(site) = *site else { continue };
            let at = device.site(site).location();
            displacement += (at.x - items[i].location.x).abs() + (at.y - items[i].location.y).abs();
            matched += 1;
            let anchor = anchor_on(device, site, items[i].offset);
            let entry = &mut sum[owner[i]];
            entry.0.x += anchor.x;
            entry.0.y += anchor.y;
            entry.1 += 1;
        }
        for (unit, (total, count)) in plan.iter().zip(sum) {
            if count > 0 {
                let n = count as f64;
                model
                    .legal_plan_mut()
                    .set_location(unit.unit, Point::new(total.x / n, total.y / n));
            }
        }
        if matched == 0 {
            NO_DISPLACEMENT
        } else {
            displacement / matched as f64
        }
    }

    /// Resolves column overflow per class of interchangeable columns and
    /// returns the residual overflow.
    fn spread(
        &self,
        model: &PlacementModel,
        plan: &[PlannedUnit],
        columns: &ColumnSet,
        assignment: &mut [Option<usize>],
    ) -> usize {
        let mut per_column: Vec<VecDeque<(usize, usize)>> = vec![VecDeque::new(); columns.len()];
        let mut order: Vec<usize> = (0..plan.len()).filter(|&k| assignment[k].is_some()).collect();
        order.sort_by(|&a, &b| {
            let (xa, xb) = (model.unit(plan[a].unit).x(), model.unit(plan[b].unit).x());
            xa.total_cmp(&xb).then(a.cmp(&b))
        });
        for k in order {
            if let Some(c) = assignment[k] {
                per_column[c].push_back((k, plan[k].height));
            }
        }

        let mut classes: Vec<(SiteType, Vec<usize>)> = Vec::new();
        for (c, column) in columns.columns.iter().enumerate() {
            match classes.iter_mut().find(|(t, _)| same_column_class(*t, column.site_type)) {
                Some((_, members)) => members.push(c),
                None => classes.push((column.site_type, vec![c])),
            }
        }

        let mut residual = 0;
        for (site_type, members) in classes {
            let capacity: Vec<usize> = members.iter().map(|&c| columns.columns[c].sites.len()).collect();
            let mut class_columns: Vec<VecDeque<(usize, usize)>> =
                members.iter().map(|&c| std::mem::take(&mut per_column[c])).collect();
            residual += spread_columns(&capacity, (self.column_budget)(site_type), &mut class_columns);
            for (&c, units) in members.iter().zip(class_columns) {
                per_column[c] = units;
            }
        }

        for (c, units) in per_column.iter().enumerate() {
            for &(k, _) in units {
                assignment[k] = Some(c);
            }
        }
        residual
    }

    /// Packs every column with its units in order. `None` marks a column
    /// without a feasible packing.
    fn pack_columns(
        &self,
        model: &PlacementModel,
        device: &Device,
        plan: &[PlannedUnit],
        columns: &ColumnSet,
        column_units: &[Vec<(usize, Point)>],
    ) -> Vec<Option<Vec<usize>>> {
        column_units
            .par_iter()
            .enumerate()
            .map(|(c, units)| {
                if units.is_empty() {
                    return Some(Vec::new());
                }
                let column = &columns.columns[c];
                let slots: Vec<Slot> = column
                    .sites
                    .iter()
                    .map(|&s| {
                        let site = device.site(s);
                        Slot {
                            row: site.row,
                            clock_row: site.clock_region_row,
                        }
                    })
                    .collect();
                let shapes: Vec<DpUnit> = units
                    .iter()
                    .map(|&(k, _)| DpUnit {
                        height: plan[k].height,
                        even_start: plan[k].even_start,
                    })
                    .collect();
                dp::place_column(&slots, &shapes, |i, s| {
                    let unit = &plan[units[i].0];
                    let anchor = anchor_on(device, column.sites[s], unit.base_offset);
                    model.hpwl_change(unit.unit, anchor, MAX_COST_NET_PINS)
                })
            })
            .collect()
    }

    fn map_sites(&mut self, device: &mut Device, sites: &[SiteId]) -> PlaceResult<()> {
        for &site in sites {
            device.set_mapped(site)?;
            self.mapped.push(site);
        }
        Ok(())
    }
}
