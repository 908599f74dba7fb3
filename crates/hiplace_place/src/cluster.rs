//! Initial placement of the units before the first quadratic solve.
//!
//! Random mode scatters every movable unit uniformly over the device. Cluster
//! mode grows clusters of connected units breadth-first, assigns the clusters
//! to clock regions with simulated annealing and drops every unit near the
//! center of its cluster's region. Fixed units are never moved.

use hiplace_common::{Point, UnitId};
use hiplace_device::Device;
use hiplace_model::PlacementModel;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Cooling rate of the annealer (multiplied each temperature step).
const COOLING_RATE: f64 = 0.95;
/// Annealing stops below this temperature.
const MIN_TEMPERATURE: f64 = 0.01;
/// Moves per temperature step, as a multiplier of the cluster count.
const MOVES_PER_TEMP_MULTIPLIER: usize = 10;
/// Distance kept from the device edge by random placement.
const EDGE_MARGIN: f64 = 0.1;
/// Jitter around the region center, as a share of the region half-size.
const JITTER: f64 = 0.25;
/// Nets touching more units than this do not bind clusters.
const MAX_CLUSTERING_NET_UNITS: usize = 100;
/// Weight of the region load imbalance in the annealing cost.
const BALANCE_WEIGHT: f64 = 1.0;

/// Outcome of a cluster placement.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ClusterSummary {
    /// Number of clusters formed.
    pub clusters: usize,
    /// Number of clock regions clusters were spread over.
    pub regions: usize,
    /// Annealing cost of the initial region assignment.
    pub initial_cost: f64,
    /// Annealing cost of the final region assignment.
    pub final_cost: f64,
}

/// Places every movable unit uniformly at random inside the device, with a
/// generator seeded from `seed`.
pub fn random_placement(model: &mut PlacementModel, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let bounds = model.bounds();
    let mut sample = |lo: f64, hi: f64| {
        let (lo, hi) = (lo + EDGE_MARGIN, hi - EDGE_MARGIN);
        if lo < hi {
            rng.gen_range(lo..hi)
        } else {
            (lo + hi) / 2.0
        }
    };
    for index in 0..model.units().len() {
        let id = UnitId::from_index(index);
        if model.unit(id).is_fixed() {
            continue;
        }
        let x = sample(bounds.left, bounds.right);
        let y = sample(bounds.bottom, bounds.top);
        let at = model.legalize_xy_in_area(id, Point::new(x, y));
        model.set_anchor_location_and_forget(id, at);
    }
}

/// Clusters the movable units and places them region by region.
pub fn cluster_placement(model: &mut PlacementModel, device: &Device, cluster_size: usize, seed: u64) -> ClusterSummary {
    let mut rng = StdRng::seed_from_u64(seed);
    let clusters = build_clusters(model, cluster_size.max(1));
    let regions: Vec<Point> = device.clock_regions().iter().map(|r| r.center()).collect();
    let region_extent: Vec<Point> = device
        .clock_regions()
        .iter()
        .map(|r| Point::new(r.bounds.width() / 2.0, r.bounds.height() / 2.0))
        .collect();

    let mut summary = ClusterSummary {
        clusters: clusters.len(),
        regions: regions.len(),
        ..ClusterSummary::default()
    };
    if clusters.is_empty() || regions.is_empty() {
        return summary;
    }

    let edges = cluster_edges(model, &clusters);
    let mut annealer = RegionAnnealer {
        sizes: clusters.iter().map(Vec::len).collect(),
        edges,
        regions: &regions,
        y2x: model.y2x(),
        assignment: (0..clusters.len()).map(|c| c % regions.len()).collect(),
    };
    summary.initial_cost = annealer.cost();
    summary.final_cost = annealer.anneal(&mut rng);
    debug!(
        "cluster placement: {} clusters over {} regions, cost {:.3} -> {:.3}",
        summary.clusters, summary.regions, summary.initial_cost, summary.final_cost
    );

    let (grid_cols, _) = device.clock_region_grid();
    for (cluster, units) in clusters.iter().enumerate() {
        let region = annealer.assignment[cluster];
        for &id in units {
            let (center, extent) = match model.unit_clock_region(id) {
                Some((col, row)) => {
                    let index = row as usize * grid_cols + col as usize;
                    match (regions.get(index), region_extent.get(index)) {
                        (Some(&c), Some(&e)) => (c, e),
                        _ => (regions[region], region_extent[region]),
                    }
                }
                None => (regions[region], region_extent[region]),
            };
            let dx = rng.gen_range(-1.0..=1.0) * JITTER * extent.x;
            let dy = rng.gen_range(-1.0..=1.0) * JITTER * extent.y;
            let at = model.legalize_xy_in_area(id, Point::new(center.x + dx, center.y + dy));
            model.set_anchor_location_and_forget(id, at);
        }
    }
    summary
}

/// Unit adjacency over the nets that can bind clusters.
fn unit_neighbours(model: &PlacementModel) -> Vec<Vec<UnitId>> {
    let mut neighbours: Vec<Vec<UnitId>> = vec![Vec::new(); model.units().len()];
    for net in model.nets() {
        if net.is_power {
            continue;
        }
        let mut units: Vec<UnitId> = net.pins.iter().map(|p| p.unit).collect();
        units.sort_unstable();
        units.dedup();
        if units.len() < 2 || units.len() > MAX_CLUSTERING_NET_UNITS {
            continue;
        }
        for &a in &units {
            neighbours[a.index()].extend(units.iter().copied().filter(|&b| b != a));
        }
    }
    for list in &mut neighbours {
        list.sort_unstable();
        list.dedup();
    }
    neighbours
}

/// User clusters first, then breadth-first clusters of at most
/// `cluster_size` movable units.
fn build_clusters(model: &PlacementModel, cluster_size: usize) -> Vec<Vec<UnitId>> {
    let movable = |id: UnitId| !model.unit(id).is_fixed();
    let mut assigned = vec![false; model.units().len()];
    let mut clusters = Vec::new();

    for user in model.user_clusters() {
        let members: Vec<UnitId> = user
            .iter()
            .copied()
            .filter(|&u| movable(u) && !assigned[u.index()])
            .collect();
        for &u in &members {
            assigned[u.index()] = true;
        }
        if !members.is_empty() {
            clusters.push(members);
        }
    }

    let neighbours = unit_neighbours(model);
    for seed in model.units().iter().map(|u| u.id) {
        if assigned[seed.index()] || !movable(seed) {
            continue;
        }
        let mut cluster = vec![seed];
        assigned[seed.index()] = true;
        let mut queue = VecDeque::from([seed]);
        'grow: while let Some(current) = queue.pop_front() {
            for &next in &neighbours[current.index()] {
                if cluster.len() >= cluster_size {
                    break 'grow;
                }
                if assigned[next.index()] || !movable(next) {
                    continue;
                }
                assigned[next.index()] = true;
                cluster.push(next);
                queue.push_back(next);
            }
        }
        clusters.push(cluster);
    }
    clusters
}

/// Connection weight between cluster pairs, `(a, b, weight)` with `a < b`.
fn cluster_edges(model: &PlacementModel, clusters: &[Vec<UnitId>]) -> Vec<(usize, usize, f64)> {
    let mut owner: Vec<Option<usize>> = vec![None; model.units().len()];
    for (c, units) in clusters.iter().enumerate() {
        for &u in units {
            owner[u.index()] = Some(c);
        }
    }
    let mut weights: HashMap<(usize, usize), f64> = HashMap::new();
    for net in model.nets() {
        if net.is_power {
            continue;
        }
        let mut touched: Vec<usize> = net.pins.iter().filter_map(|p| owner[p.unit.index()]).collect();
        touched.sort_unstable();
        touched.dedup();
        if touched.len() < 2 || touched.len() > MAX_CLUSTERING_NET_UNITS {
            continue;
        }
        let share = net.weight / (touched.len() - 1) as f64;
        for (i, &a) in touched.iter().enumerate() {
            for &b in &touched[i + 1..] {
                *weights.entry((a, b)).or_default() += share;
            }
        }
    }
    let mut edges: Vec<(usize, usize, f64)> = weights.into_iter().map(|((a, b), w)| (a, b, w)).collect();
    edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
    edges
}

/// Assignment of clusters to clock regions under annealing.
struct RegionAnnealer<'a> {
    sizes: Vec<usize>,
    edges: Vec<(usize, usize, f64)>,
    regions: &'a [Point],
    y2x: f64,
    assignment: Vec<usize>,
}

impl RegionAnnealer<'_> {
    /// Weighted Manhattan distance between connected clusters plus the
    /// squared deviation of every region's load from the mean.
    fn cost(&self) -> f64 {
        let wire: f64 = self
            .edges
            .iter()
            .map(|&(a, b, w)| {
                let (pa, pb) = (self.regions[self.assignment[a]], self.regions[self.assignment[b]]);
                w * pa.displacement(pb, self.y2x)
            })
            .sum();
        let mut load = vec![0.0; self.regions.len()];
        for (c, &r) in self.assignment.iter().enumerate() {
            load[r] += self.sizes[c] as f64;
        }
        let target = self.sizes.iter().sum::<usize>() as f64 / self.regions.len() as f64;
        let imbalance: f64 = load.iter().map(|l| (l - target).powi(2)).sum::<f64>() / target.max(1.0);
        wire + BALANCE_WEIGHT * imbalance
    }

    /// Relocates single clusters under the Metropolis criterion with
    /// geometric cooling. Returns the final cost.
    fn anneal(&mut self, rng: &mut StdRng) -> f64 {
        let mut current = self.cost();
        let clusters = self.assignment.len();
        let regions = self.regions.len();
        if clusters < 2 || regions < 2 {
            return current;
        }

        let mut temperature = (clusters as f64).sqrt() * 2.0;
        let moves_per_temp = (MOVES_PER_TEMP_MULTIPLIER * clusters).max(10);
        while temperature > MIN_TEMPERATURE {
            let mut accepted = 0;
            for _ in 0..moves_per_temp {
                let cluster = rng.gen_range(0..clusters);
                let from = self.assignment[cluster];
                let to = rng.gen_range(0..regions);
                if to == from {
                    continue;
                }
                self.assignment[cluster] = to;
                let cost = self.cost();
                let delta = cost - current;
                if delta < 0.0 || rng.gen::<f64>() < (-delta / temperature).exp() {
                    current = cost;
                    accepted += 1;
                } else {
                    self.assignment[cluster] = from;
                }
            }
            temperature *= COOLING_RATE;
            if (accepted as f64 / moves_per_temp as f64) < 0.001 {
                break;
            }
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiplace_device::{DeviceBuilder, SiteType};
    use hiplace_model::{CellType, Design, ModelSettings};

    fn grid_device() -> Device {
        let mut builder = DeviceBuilder::new("grid").clock_regions(2, 2);
        for col in 0..8 {
            builder = builder.column(col as f64, SiteType::SliceL, 8);
        }
        builder.build().unwrap()
    }

    /// Two tightly connected groups of `n` LUTs with one net between them.
    fn two_groups(n: usize) -> Design {
        let mut design = Design::new("groups");
        let cells: Vec<_> = (0..2 * n).map(|i| design.add_cell(format!("lut{i}"), CellType::Lut)).collect();
        for group in cells.chunks(n) {
            for pair in group.windows(2) {
                let net = design.add_net(format!("n{}", pair[0]));
                design.connect(net, pair[0], Point::new(0.0, 0.0), true);
                design.connect(net, pair[1], Point::new(0.0, 0.0), false);
            }
        }
        let bridge = design.add_net("bridge");
        design.connect(bridge, cells[n - 1], Point::new(0.0, 0.0), true);
        design.connect(bridge, cells[n], Point::new(0.0, 0.0), false);
        design
    }

    #[test]
    fn random_placement_is_seeded_and_inside_the_margin() {
        let device = grid_device();
        let mut a = PlacementModel::new(two_groups(4), &device, ModelSettings::default()).unwrap();
        let mut b = PlacementModel::new(two_groups(4), &device, ModelSettings::default()).unwrap();
        random_placement(&mut a, 20213654);
        random_placement(&mut b, 20213654);
        for (ua, ub) in a.units().iter().zip(b.units()) {
            assert_eq!(ua.location(), ub.location());
            let p = ua.location();
            assert!(p.x >= 0.1 && p.x <= 6.9 && p.y >= 0.1 && p.y <= 6.9);
        }
    }

    #[test]
    fn fixed_units_are_left_alone() {
        let device = grid_device();
        let mut design = two_groups(3);
        design.fix_cell(hiplace_common::CellId::from_index(0), Point::new(7.0, 7.0));
        let mut model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();
        let fixed = model.cell_unit(hiplace_common::CellId::from_index(0));
        let before = model.unit(fixed).location();
        random_placement(&mut model, 1);
        assert_eq!(model.unit(fixed).location(), before);
        cluster_placement(&mut model, &device, 2, 1);
        assert_eq!(model.unit(fixed).location(), before);
    }

    #[test]
    fn clusters_respect_the_size_limit_and_cover_every_unit() {
        let device = grid_device();
        let model = PlacementModel::new(two_groups(5), &device, ModelSettings::default()).unwrap();
        let clusters = build_clusters(&model, 3);
        assert!(clusters.iter().all(|c| c.len() <= 3));
        let mut seen: Vec<UnitId> = clusters.concat();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn connected_groups_end_up_in_their_own_regions() {
        let device = grid_device();
        let mut model = PlacementModel::new(two_groups(4), &device, ModelSettings::default()).unwrap();
        let summary = cluster_placement(&mut model, &device, 4, 7);
        assert_eq!(summary.clusters, 2);
        assert_eq!(summary.regions, 4);
        assert!(summary.final_cost <= summary.initial_cost + 1e-9);

        let region_of = |u: usize| device.clock_region_at(model.unit(UnitId::from_index(u)).location()).clone();
        for group in [0..4, 4..8] {
            let first = region_of(group.start);
            for u in group {
                assert_eq!(region_of(u), first);
            }
        }
    }
}
