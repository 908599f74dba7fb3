//! Widening rounds of min-cost site matching.
//!
//! Every round gathers, for each still unmatched element, the cheapest
//! nearby candidate sites, solves a min-cost bipartite matching over them and
//! keeps whatever matched. The search radius and the candidate count double
//! between rounds. Once the radius exceeds twice its starting value the
//! area-legality filter is dropped; once it covers the whole device and a
//! round matches nothing, the remaining elements are given up on.

use super::columns::ColumnSet;
use super::LegalizerParameters;
use crate::matching::MinCostMatching;
use hiplace_common::{InternalError, PlaceResult, Point, SiteId, UnitId};
use hiplace_device::{Device, SiteType};
use hiplace_model::PlacementModel;
use log::debug;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

/// Nets with more pins than this are left out of matching costs.
pub(crate) const MAX_COST_NET_PINS: usize = 1000;
/// Edge costs below this get the whole bipartite graph shifted upwards.
const MIN_EDGE_COST: f64 = 1e-4;
const COST_SHIFT: f64 = 10.0;

/// One cell or unit to be put on a site.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MatchItem {
    pub unit: UnitId,
    /// Where the element is now.
    pub location: Point,
    /// Offset of the element from its unit anchor.
    pub offset: Point,
    pub site_types: &'static [SiteType],
    /// Only sites on even rows qualify.
    pub even_row: bool,
    /// Divisor applied to the unit's HPWL change.
    pub share: f64,
    /// Column the element is restricted to in fixed-column rounds.
    pub column: Option<usize>,
}

/// Sites found for a list of items.
#[derive(Debug, Default)]
pub(crate) struct RoundsOutcome {
    pub sites: Vec<Option<SiteId>>,
    /// Some round ran without the area-legality filter.
    pub relaxed: bool,
    pub rounds: usize,
}

impl RoundsOutcome {
    pub fn unmatched(&self) -> usize {
        self.sites.iter().filter(|s| s.is_none()).count()
    }
}

/// Read-only context of one matching run.
pub(crate) struct MatchingRounds<'a> {
    pub model: &'a PlacementModel,
    pub device: &'a Device,
    pub columns: &'a ColumnSet,
    pub params: LegalizerParameters,
    pub jobs: usize,
}

impl MatchingRounds<'_> {
    /// Matches `items` to distinct sites. With `fixed_column` every item only
    /// considers the sites of its assigned column.
    pub fn run(&self, items: &[MatchItem], fixed_column: bool) -> PlaceResult<RoundsOutcome> {
        let bounds = self.model.bounds();
        let reach = bounds.width() + self.model.y2x() * bounds.height() + 1.0;
        let initial = self.params.displacement_threshold.max(f64::MIN_POSITIVE);
        let mut threshold = initial;
        let mut max_candidates = self.params.max_candidates.max(1);
        let factor = self.params.candidate_factor.max(1);

        let mut outcome = RoundsOutcome {
            sites: vec![None; items.len()],
            ..RoundsOutcome::default()
        };
        let mut taken: HashSet<SiteId> = HashSet::new();
        let mut pending: Vec<usize> = (0..items.len()).collect();

        while !pending.is_empty() {
            outcome.rounds += 1;
            let relax = threshold > 2.0 * initial;
            outcome.relaxed |= relax;
            let search = Search {
                threshold,
                max_candidates,
                pool: factor.saturating_mul(max_candidates),
                relax,
                fixed_column,
            };
            let candidates: Vec<Vec<(SiteId, f64)>> = pending
                .par_iter()
                .map(|&i| self.candidates(&items[i], &search, &taken))
                .collect();

            let (sites, edges) = bipartite(&candidates);
            let mut matching = MinCostMatching::new(pending.len(), sites.len(), edges, self.jobs)?;
            let matched = matching.solve()?;
            debug!(
                "round {}: matched {matched} of {} items over {} components",
                outcome.rounds,
                pending.len(),
                matching.component_count()
            );
            for (left, &item) in pending.iter().enumerate() {
                if let Some(right) = matching.matched_right(left) {
                    let site = sites[right];
                    if !taken.insert(site) {
                        return Err(InternalError::new(format!("site {site} matched twice")));
                    }
                    outcome.sites[item] = Some(site);
                }
            }
            pending.retain(|&i| outcome.sites[i].is_none());

            let radius = if fixed_column { 2.0 * threshold } else { threshold };
            let exhaustive = fixed_column || search.pool >= self.columns.site_count();
            if matched == 0 && relax && radius > reach && exhaustive {
                break;
            }
            threshold *= 2.0;
            max_candidates = max_candidates.saturating_mul(2);
        }
        Ok(outcome)
    }

    /// Cheapest acceptable sites for `item`, at most `max_candidates`.
    fn candidates(&self, item: &MatchItem, search: &Search, taken: &HashSet<SiteId>) -> Vec<(SiteId, f64)> {
        let nearby;
        let pool: &[SiteId] = if search.fixed_column {
            item.column
                .and_then(|c| self.columns.columns.get(c))
                .map_or(&[][..], |c| c.sites.as_slice())
        } else {
            nearby = self.model.find_neighbor_sites(
                self.device,
                item.site_types,
                item.location,
                search.threshold,
                search.pool,
            );
            &nearby
        };
        let radius = if search.fixed_column {
            2.0 * search.threshold
        } else {
            search.threshold
        };
        let y2x = self.model.y2x();

        let mut found: Vec<(SiteId, f64)> = pool
            .iter()
            .filter_map(|&id| {
                let site = self.device.site(id);
                if taken.contains(&id) || !site.is_available() || !item.site_types.contains(&site.site_type) {
                    return None;
                }
                if item.even_row && site.row % 2 != 0 {
                    return None;
                }
                if site.location().displacement(item.location, y2x) >= radius {
                    return None;
                }
                let anchor = Point::new(site.x - item.offset.x, site.y - item.offset.y);
                if !search.relax && !self.model.is_legal_location(item.unit, anchor) {
                    return None;
                }
                let cost = self.model.hpwl_change(item.unit, anchor, MAX_COST_NET_PINS) / item.share;
                Some((id, cost))
            })
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found.truncate(search.max_candidates);
        found
    }
}

struct Search {
    threshold: f64,
    max_candidates: usize,
    pool: usize,
    relax: bool,
    fixed_column: bool,
}

/// Numbers the candidate sites and turns the candidate lists into matching
/// edges. Costs are shifted so the cheapest edge costs [`COST_SHIFT`] when
/// any edge would otherwise be near zero or negative.
fn bipartite(candidates: &[Vec<(SiteId, f64)>]) -> (Vec<SiteId>, Vec<Vec<(usize, f64)>>) {
    let mut index: HashMap<SiteId, usize> = HashMap::new();
    let mut sites = Vec::new();
    let mut min_cost = f64::INFINITY;
    let mut edges = Vec::with_capacity(candidates.len());
    for list in candidates {
        let mut row = Vec::with_capacity(list.len());
        for &(site, cost) in list {
            let right = *index.entry(site).or_insert_with(|| {
                sites.push(site);
                sites.len() - 1
            });
            min_cost = min_cost.min(cost);
            row.push((right, cost));
        }
        edges.push(row);
    }
    if min_cost < MIN_EDGE_COST {
        let shift = COST_SHIFT - min_cost;
        for (_, cost) in edges.iter_mut().flatten() {
            *cost += shift;
        }
    }
    (sites, edges)
}
