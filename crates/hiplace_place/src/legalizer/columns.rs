//! Site columns offered to a legalizer and column overflow spreading.

use hiplace_common::SiteId;
use hiplace_device::{Device, SiteType};
use std::collections::{HashMap, VecDeque};

/// Available sites of one device column, in row order.
#[derive(Clone, Debug)]
pub(crate) struct Column {
    pub site_type: SiteType,
    pub x: f64,
    pub sites: Vec<SiteId>,
}

/// The columns of a set of site types, ordered by x.
#[derive(Clone, Debug, Default)]
pub(crate) struct ColumnSet {
    pub columns: Vec<Column>,
    of_site: HashMap<SiteId, usize>,
    site_count: usize,
}

impl ColumnSet {
    /// Collects the columns of `site_types` with the sites that are neither
    /// occupied nor mapped.
    pub fn available(device: &Device, site_types: &[SiteType]) -> Self {
        let mut columns = Vec::new();
        for &site_type in site_types {
            for (col, &x) in device.column_positions(site_type).iter().enumerate() {
                let sites = device
                    .column_sites(site_type, col)
                    .iter()
                    .copied()
                    .filter(|&s| device.site(s).is_available())
                    .collect();
                columns.push(Column { site_type, x, sites });
            }
        }
        columns.sort_by(|a, b| a.x.total_cmp(&b.x));

        let mut of_site = HashMap::new();
        for (index, column) in columns.iter().enumerate() {
            for &site in &column.sites {
                of_site.insert(site, index);
            }
        }
        let site_count = of_site.len();
        Self {
            columns,
            of_site,
            site_count,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Number of available sites over all columns.
    pub fn site_count(&self) -> usize {
        self.site_count
    }

    pub fn column_of(&self, site: SiteId) -> Option<usize> {
        self.of_site.get(&site).copied()
    }

    /// Column of one of `site_types` closest to `x`.
    pub fn nearest(&self, x: f64, site_types: &[SiteType]) -> Option<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| site_types.contains(&c.site_type))
            .min_by(|(_, a), (_, b)| (a.x - x).abs().total_cmp(&(b.x - x).abs()))
            .map(|(index, _)| index)
    }
}

/// The column hit most often, lowest index on ties.
pub(crate) fn most_frequent(hits: impl IntoIterator<Item = usize>) -> Option<usize> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for column in hits {
        *counts.entry(column).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(column, _)| column)
}

/// Bound on the shifting rounds of [`spread_columns`].
fn round_cap(columns: usize) -> usize {
    4 * columns + 16
}

/// Shifts units out of columns whose load exceeds their budgeted capacity.
///
/// `columns` holds `(unit, height)` pairs per column, ordered so that the
/// front leans left and the back leans right. An over-full column hands its
/// excess to its neighbours in proportion to the spare capacity on either
/// side: front units go one column left, back units one column right.
/// Returns the number of sites still demanded beyond capacity.
pub(crate) fn spread_columns<T: Copy>(capacity: &[usize], budget: f64, columns: &mut [VecDeque<(T, usize)>]) -> usize {
    let n = columns.len();
    let load = |columns: &[VecDeque<(T, usize)>], c: usize| columns[c].iter().map(|u| u.1).sum::<usize>();
    let limit = |c: usize| {
        let sites = capacity[c] as f64;
        if budget < 1.0 {
            sites * (budget + 0.05)
        } else {
            sites
        }
    };

    for _ in 0..round_cap(n) {
        let util: Vec<usize> = (0..n).map(|c| load(columns, c)).collect();
        let Some(over) = (0..n).find(|&c| util[c] as f64 > limit(c)) else {
            break;
        };
        let spare = |c: usize| capacity[c] as f64 * budget - util[c] as f64;
        let left: f64 = (0..over).map(spare).sum();
        let right: f64 = (over + 1..n).map(spare).sum();
        if left + right <= 0.0 {
            break;
        }
        let overflow = util[over] as f64 - (capacity[over] as f64 * budget).floor();
        let mut to_left = if left > 0.0 {
            (overflow * left / (left + right)).round()
        } else {
            0.0
        };
        let mut to_right = overflow - to_left;

        let mut moved = false;
        while over > 0 && to_left > 0.0 {
            let Some(unit) = columns[over].pop_front() else {
                break;
            };
            to_left -= unit.1 as f64;
            columns[over - 1].push_back(unit);
            moved = true;
        }
        while over + 1 < n && to_right > 0.0 {
            let Some(unit) = columns[over].pop_back() else {
                break;
            };
            to_right -= unit.1 as f64;
            columns[over + 1].push_front(unit);
            moved = true;
        }
        if !moved {
            break;
        }
    }

    (0..n).map(|c| load(columns, c).saturating_sub(capacity[c])).sum()
}
