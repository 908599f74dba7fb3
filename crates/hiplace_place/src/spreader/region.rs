//! Spread regions: rectangles of bins grown around an overflowing bin until
//! their total utilization fits the supply target.

use hiplace_common::{CellId, InternalError, PlaceResult};
use hiplace_model::BinGrid;
use rand::rngs::StdRng;
use rand::Rng;

/// Strips of bins probed past an empty one before a direction is given up.
const MAX_PROBE_STEPS: usize = 3;
/// Capacity below which a probed strip counts as empty.
const EMPTY_CAPACITY: f64 = 2e-5;

/// A side the region can grow towards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub(crate) const ALL: [Direction; 4] = [Direction::Left, Direction::Right, Direction::Up, Direction::Down];
}

/// Outcome of probing one direction.
#[derive(Clone, Copy, Debug)]
struct Probe {
    legal: bool,
    steps: usize,
    utilization: f64,
    capacity: f64,
}

impl Probe {
    fn blocked() -> Self {
        Self {
            legal: false,
            steps: 0,
            utilization: 1e-1,
            capacity: 1e-5,
        }
    }
}

/// A rectangle of bins `[left, right] x [bottom, top]` owned by one spreading
/// pass.
#[derive(Clone, Debug)]
pub(crate) struct SpreadRegion {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
    bins: Vec<usize>,
    cells: Vec<CellId>,
    capacity: f64,
    utilization: f64,
    probes: [Probe; 4],
    next_direction: usize,
    chosen: Option<Direction>,
}

impl SpreadRegion {
    /// Starts a region on one bin and marks it covered.
    pub fn new(grid: &BinGrid, bin: usize, covered: &mut [bool]) -> PlaceResult<Self> {
        let start = grid.bin(bin);
        let mut region = Self {
            top: start.row,
            bottom: start.row,
            left: start.col,
            right: start.col,
            bins: Vec::new(),
            cells: Vec::new(),
            capacity: 0.0,
            utilization: 0.0,
            probes: [Probe::blocked(); 4],
            next_direction: 0,
            chosen: None,
        };
        region.take_bin(grid, bin, covered)?;
        Ok(region)
    }

    /// Bins of the region, in insertion order.
    pub fn bins(&self) -> &[usize] {
        &self.bins
    }

    /// Cells inside the region's bins.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Utilization over shrunk capacity.
    pub fn overflow_ratio(&self) -> f64 {
        if self.capacity <= 0.0 {
            return f64::INFINITY;
        }
        self.utilization / self.capacity
    }

    fn take_bin(&mut self, grid: &BinGrid, index: usize, covered: &mut [bool]) -> PlaceResult<()> {
        if covered[index] {
            let bin = grid.bin(index);
            return Err(InternalError::new(format!(
                "{} spread regions overlap at bin ({}, {})",
                grid.family(),
                bin.row,
                bin.col
            )));
        }
        covered[index] = true;
        let bin = grid.bin(index);
        self.bins.push(index);
        self.cells.extend_from_slice(bin.cells());
        self.capacity += bin.capacity();
        self.utilization += bin.utilization();
        Ok(())
    }

    /// Bins of the strip `step` bins beyond the region edge in `dir`, or
    /// `None` if it falls outside the grid.
    fn strip(&self, grid: &BinGrid, dir: Direction, step: usize) -> Option<Vec<usize>> {
        match dir {
            Direction::Left => {
                let col = self.left.checked_sub(step)?;
                Some((self.bottom..=self.top).map(|row| grid.index_of(row, col)).collect())
            }
            Direction::Right => {
                let col = self.right + step;
                (col < grid.cols()).then(|| (self.bottom..=self.top).map(|row| grid.index_of(row, col)).collect())
            }
            Direction::Up => {
                let row = self.top + step;
                (row < grid.rows()).then(|| (self.left..=self.right).map(|col| grid.index_of(row, col)).collect())
            }
            Direction::Down => {
                let row = self.bottom.checked_sub(step)?;
                Some((self.left..=self.right).map(|col| grid.index_of(row, col)).collect())
            }
        }
    }

    /// Probes up to three strips in `dir`, accumulating their utilization
    /// and capacity until one with real capacity is found.
    fn probe(&self, grid: &BinGrid, covered: &[bool], dir: Direction) -> Probe {
        let mut probe = Probe::blocked();
        for step in 1..=MAX_PROBE_STEPS {
            let Some(strip) = self.strip(grid, dir, step) else {
                break;
            };
            if strip.iter().any(|&b| covered[b]) {
                break;
            }
            for &b in &strip {
                let bin = grid.bin(b);
                probe.capacity += bin.capacity();
                probe.utilization += bin.utilization();
            }
            if probe.capacity < 1e-5 {
                probe.capacity = 1e-5;
            }
            if probe.utilization < 1e-5 {
                probe.utilization = 2e-5;
            }
            if probe.capacity > EMPTY_CAPACITY {
                probe.legal = true;
                probe.steps = step;
                break;
            }
        }
        probe
    }

    /// Grows the region by `steps` strips in `dir`.
    fn grow(&mut self, grid: &BinGrid, dir: Direction, steps: usize, covered: &mut [bool]) -> PlaceResult<()> {
        for step in 1..=steps {
            let strip = self.strip(grid, dir, step).ok_or_else(|| {
                InternalError::new(format!("{} spread region grew past the grid edge", grid.family()))
            })?;
            for b in strip {
                self.take_bin(grid, b, covered)?;
            }
        }
        match dir {
            Direction::Left => self.left -= steps,
            Direction::Right => self.right += steps,
            Direction::Up => self.top += steps,
            Direction::Down => self.bottom -= steps,
        }
        Ok(())
    }

    /// Probes all four directions; returns `true` if any can grow.
    pub fn smart_find_direction(&mut self, grid: &BinGrid, covered: &[bool]) -> bool {
        for dir in Direction::ALL {
            self.probes[dir as usize] = self.probe(grid, covered, dir);
        }
        self.probes.iter().any(|p| p.legal)
    }

    /// Grows along the axis with the lower utilization rate.
    ///
    /// A single side that brings the region under `supply` is taken alone;
    /// otherwise every growable side of the axis is taken. Falls back to the
    /// other axis when the preferred one cannot grow.
    pub fn smart_expand(
        &mut self,
        grid: &BinGrid,
        supply: f64,
        covered: &mut [bool],
        rng: &mut StdRng,
    ) -> PlaceResult<bool> {
        let [left, right, up, down] = self.probes;
        let h_capacity = left.capacity + right.capacity;
        let v_capacity = up.capacity + down.capacity;
        let h_utilization = left.utilization + right.utilization;
        let v_utilization = up.utilization + down.utilization;
        let horizontal = (left.legal || right.legal)
            && (h_utilization / h_capacity < 0.9 * v_utilization / v_capacity
                || ((h_utilization + v_utilization).abs() < 1e-4 && h_capacity > v_capacity));
        let (first, second) = if horizontal {
            ((Direction::Left, Direction::Right), (Direction::Up, Direction::Down))
        } else {
            ((Direction::Up, Direction::Down), (Direction::Left, Direction::Right))
        };
        if self.expand_axis(grid, first, supply, covered, rng)? {
            return Ok(true);
        }
        self.expand_axis(grid, second, supply, covered, rng)
    }

    fn expand_axis(
        &mut self,
        grid: &BinGrid,
        (a, b): (Direction, Direction),
        supply: f64,
        covered: &mut [bool],
        rng: &mut StdRng,
    ) -> PlaceResult<bool> {
        let order = if rng.gen_bool(0.5) { [a, b] } else { [b, a] };
        for dir in order {
            let probe = self.probes[dir as usize];
            if probe.legal
                && (probe.utilization + self.utilization) / (probe.capacity + self.capacity) < supply
            {
                self.grow(grid, dir, probe.steps, covered)?;
                return Ok(true);
            }
        }
        let mut expanded = false;
        for dir in [a, b] {
            let probe = self.probes[dir as usize];
            if probe.legal {
                self.grow(grid, dir, probe.steps, covered)?;
                expanded = true;
            }
        }
        Ok(expanded)
    }

    /// Picks the next uncovered neighbouring strip, rotating from a random
    /// start direction.
    pub fn simple_find_direction(&mut self, grid: &BinGrid, covered: &[bool], rng: &mut StdRng) -> bool {
        self.next_direction = rng.gen_range(0..4);
        for _ in 0..4 {
            let dir = Direction::ALL[self.next_direction];
            self.next_direction = (self.next_direction + 1) % 4;
            if let Some(strip) = self.strip(grid, dir, 1) {
                if strip.iter().all(|&b| !covered[b]) {
                    self.chosen = Some(dir);
                    return true;
                }
            }
        }
        self.chosen = None;
        false
    }

    /// Grows by one strip in the direction found last.
    pub fn simple_expand(&mut self, grid: &BinGrid, covered: &mut [bool]) -> PlaceResult<()> {
        match self.chosen.take() {
            Some(dir) => self.grow(grid, dir, 1, covered),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiplace_common::Rect;
    use hiplace_model::ResourceFamily;
    use rand::SeedableRng;

    /// A 1 x 4 grid of capacity-4 bins with `load` cells in the first.
    fn grid(load: usize) -> BinGrid {
        let mut grid = BinGrid::new(ResourceFamily::Dsp, Rect::new(0.0, 8.0, 0.0, 3.0), 2.0, 4.0).unwrap();
        for b in 0..grid.bins().len() {
            grid.bin_mut(b).add_capacity(4.0).unwrap();
        }
        for c in 0..load {
            grid.bin_mut(0).add_cell(CellId::from_index(c), 1.0);
        }
        grid
    }

    #[test]
    fn smart_expansion_stops_once_supply_fits() {
        let grid = grid(10);
        let mut covered = vec![false; grid.bins().len()];
        let mut rng = StdRng::seed_from_u64(1);
        let mut region = SpreadRegion::new(&grid, 0, &mut covered).unwrap();
        assert_eq!(region.overflow_ratio(), 2.5);
        while region.overflow_ratio() > 1.0 && region.smart_find_direction(&grid, &covered) {
            assert!(region.smart_expand(&grid, 1.0, &mut covered, &mut rng).unwrap());
        }
        assert_eq!((region.left, region.right), (0, 2));
        assert_eq!(region.bins().len(), 3);
        assert_eq!(region.cells().len(), 10);
        assert_eq!(covered, vec![true, true, true, false]);
    }

    #[test]
    fn probe_skips_empty_strips() {
        let mut grid = BinGrid::new(ResourceFamily::Dsp, Rect::new(0.0, 8.0, 0.0, 3.0), 2.0, 4.0).unwrap();
        grid.bin_mut(0).add_capacity(1.0).unwrap();
        grid.bin_mut(3).add_capacity(4.0).unwrap();
        grid.bin_mut(0).add_cell(CellId::from_index(0), 3.0);
        let covered = vec![true, false, false, false];
        let mut region = SpreadRegion::new(&grid, 0, &mut vec![false; 4]).unwrap();
        assert!(region.smart_find_direction(&grid, &covered));
        let right = region.probes[Direction::Right as usize];
        assert!(right.legal);
        assert_eq!(right.steps, 3);
        assert!(!region.probes[Direction::Left as usize].legal);
        let left = region.probes[Direction::Left as usize];
        assert!(left.utilization / left.capacity > 1e3);
    }

    #[test]
    fn overlapping_growth_is_an_error() {
        let grid = grid(10);
        let mut covered = vec![false, true, false, false];
        let mut region = SpreadRegion::new(&grid, 0, &mut covered).unwrap();
        assert!(region.grow(&grid, Direction::Right, 1, &mut covered).is_err());
    }

    #[test]
    fn simple_expansion_takes_one_strip() {
        let grid = grid(10);
        let mut covered = vec![false; 4];
        let mut rng = StdRng::seed_from_u64(7);
        let mut region = SpreadRegion::new(&grid, 0, &mut covered).unwrap();
        assert!(region.simple_find_direction(&grid, &covered, &mut rng));
        region.simple_expand(&grid, &mut covered).unwrap();
        // Only rightwards is inside the grid.
        assert_eq!((region.left, region.right), (0, 1));
        assert_eq!(region.cells().len(), 10);
    }
}
