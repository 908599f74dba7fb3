//! Density bins.
//!
//! Each resource family owns a uniform grid of bins covering the device.
//! A bin's capacity is the family capacity of the sites inside it; its
//! utilization is the occupation of the cells currently inside it. The
//! shrink ratio lets the spreader demand extra headroom from bins that keep
//! overflowing.

use crate::family::ResourceFamily;
use hiplace_common::{CellId, InternalError, PlaceResult, Point, Rect};

const OVERFLOW_EPS: f64 = 1e-4;
const GRID_EPS: f64 = 1e-9;

/// One bin of a family grid.
#[derive(Clone, Debug, PartialEq)]
pub struct Bin {
    /// Row in the grid.
    pub row: usize,
    /// Column in the grid.
    pub col: usize,
    /// Covered area, half-open on the right and top edges except where it
    /// meets the edge of the grid.
    pub area: Rect,
    capacity: f64,
    utilization: f64,
    cells: Vec<CellId>,
    shrink_ratio: f64,
    overflow_count: u32,
    no_overflow_count: u32,
}

impl Bin {
    /// Creates an empty bin with nominal shrink ratio.
    pub fn new(row: usize, col: usize, area: Rect) -> Self {
        Self {
            row,
            col,
            area,
            capacity: 0.0,
            utilization: 0.0,
            cells: Vec::new(),
            shrink_ratio: 1.0,
            overflow_count: 0,
            no_overflow_count: 0,
        }
    }

    /// Nominal capacity.
    pub fn nominal_capacity(&self) -> f64 {
        self.capacity
    }

    /// Capacity after shrinking.
    pub fn capacity(&self) -> f64 {
        self.capacity * self.shrink_ratio
    }

    /// Adds nominal capacity.
    pub fn add_capacity(&mut self, amount: f64) -> PlaceResult<()> {
        if amount.is_nan() || amount < 0.0 {
            return Err(InternalError::new(format!(
                "bin ({}, {}) given negative capacity {amount}",
                self.row, self.col
            )));
        }
        self.capacity += amount;
        Ok(())
    }

    /// Current utilization.
    pub fn utilization(&self) -> f64 {
        self.utilization
    }

    /// Utilization over shrunk capacity; empty bins with no capacity use a
    /// tiny denominator so they sort as heavily overflowed.
    pub fn utilization_rate(&self) -> f64 {
        if self.capacity <= 0.0 {
            return self.utilization / 0.01;
        }
        self.utilization / self.capacity()
    }

    /// Returns `true` if utilization exceeds `threshold` of shrunk capacity.
    pub fn is_overflow(&self, threshold: f64) -> bool {
        if self.capacity <= 0.0 {
            return self.utilization > 0.0;
        }
        self.utilization / self.capacity() > threshold + OVERFLOW_EPS
    }

    /// Cells currently inside.
    pub fn cells(&self) -> &[CellId] {
        &self.cells
    }

    /// Adds a cell with its occupation.
    pub fn add_cell(&mut self, cell: CellId, occupation: f64) {
        self.cells.push(cell);
        self.utilization += occupation;
    }

    /// Removes a cell with its occupation.
    pub fn remove_cell(&mut self, cell: CellId, occupation: f64) -> PlaceResult<()> {
        let pos = self.cells.iter().position(|&c| c == cell).ok_or_else(|| {
            InternalError::new(format!(
                "cell {cell} is not recorded in bin ({}, {})",
                self.row, self.col
            ))
        })?;
        self.cells.swap_remove(pos);
        self.utilization = (self.utilization - occupation).max(0.0);
        if self.cells.is_empty() {
            self.utilization = 0.0;
        }
        Ok(())
    }

    /// Current shrink ratio.
    pub fn shrink_ratio(&self) -> f64 {
        self.shrink_ratio
    }

    /// Reduces supply by `ratio`.
    pub fn shrink_by(&mut self, ratio: f64) {
        self.shrink_ratio *= 1.0 - ratio;
    }

    /// Restores the full capacity.
    pub fn reset_shrink_ratio(&mut self) {
        self.shrink_ratio = 1.0;
    }

    /// Consecutive overflowing passes.
    pub fn overflow_count(&self) -> u32 {
        self.overflow_count
    }

    /// Consecutive non-overflowing passes.
    pub fn no_overflow_count(&self) -> u32 {
        self.no_overflow_count
    }

    /// Records one more overflowing pass.
    pub fn count_overflow(&mut self) {
        self.overflow_count += 1;
    }

    /// Records one more non-overflowing pass, clearing the overflow streak.
    pub fn count_no_overflow(&mut self) {
        self.no_overflow_count += 1;
        self.overflow_count = 0;
    }

    /// Clears the overflow streak.
    pub fn reset_overflow_count(&mut self) {
        self.overflow_count = 0;
    }

    /// Clears the non-overflow streak.
    pub fn reset_no_overflow_count(&mut self) {
        self.no_overflow_count = 0;
    }

    /// Clears cells and utilization, keeping shrink state.
    pub fn clear_cells(&mut self) {
        self.cells.clear();
        self.utilization = 0.0;
    }

    /// Clears cells and utilization, restores the shrink ratio and counters.
    pub fn reset(&mut self) {
        self.clear_cells();
        self.reset_shrink_ratio();
        self.overflow_count = 0;
        self.no_overflow_count = 0;
    }
}

/// Bins needed to cover `extent`; a remainder within rounding error of zero
/// does not get a bin of its own.
fn bin_count(extent: f64, size: f64) -> usize {
    ((extent / size - GRID_EPS).ceil().max(1.0)) as usize
}

/// Upper edge of a bin starting at `lower`, clipped to the area edge unless
/// that would leave the bin without width.
fn clip_edge(lower: f64, upper: f64, edge: f64) -> f64 {
    if edge > lower {
        upper.min(edge)
    } else {
        upper
    }
}

/// A uniform bin grid for one resource family.
#[derive(Clone, Debug)]
pub struct BinGrid {
    family: ResourceFamily,
    origin: Point,
    bin_width: f64,
    bin_height: f64,
    rows: usize,
    cols: usize,
    bins: Vec<Bin>,
}

impl BinGrid {
    /// Creates a grid covering `area` with bins of the given size.
    ///
    /// The last row and column are clipped to the area, and points on its
    /// right or top edge belong to them, so every bin's capacity comes from
    /// sites a cell inside the area can reach.
    pub fn new(family: ResourceFamily, area: Rect, bin_width: f64, bin_height: f64) -> PlaceResult<Self> {
        if bin_width.is_nan() || bin_height.is_nan() || bin_width <= 0.0 || bin_height <= 0.0 {
            return Err(InternalError::new(format!(
                "{family} bins must have positive size, got {bin_width} x {bin_height}"
            )));
        }
        let cols = bin_count(area.width(), bin_width);
        let rows = bin_count(area.height(), bin_height);
        let mut bins = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let left = area.left + col as f64 * bin_width;
                let bottom = area.bottom + row as f64 * bin_height;
                let right = clip_edge(left, left + bin_width, area.right);
                let top = clip_edge(bottom, bottom + bin_height, area.top);
                bins.push(Bin::new(row, col, Rect::new(left, right, bottom, top)));
            }
        }
        Ok(Self {
            family,
            origin: Point::new(area.left, area.bottom),
            bin_width,
            bin_height,
            rows,
            cols,
            bins,
        })
    }

    /// Family of this grid.
    pub fn family(&self) -> ResourceFamily {
        self.family
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Bin width.
    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    /// Bin height.
    pub fn bin_height(&self) -> f64 {
        self.bin_height
    }

    /// Flat index of `(row, col)`.
    pub fn index_of(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Flat index of the bin containing `p`, clamped to the grid.
    pub fn locate(&self, p: Point) -> usize {
        let col = ((p.x - self.origin.x) / self.bin_width).floor();
        let row = ((p.y - self.origin.y) / self.bin_height).floor();
        let col = (col.max(0.0) as usize).min(self.cols - 1);
        let row = (row.max(0.0) as usize).min(self.rows - 1);
        self.index_of(row, col)
    }

    /// All bins, row-major.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// All bins, mutable.
    pub fn bins_mut(&mut self) -> &mut [Bin] {
        &mut self.bins
    }

    /// Bin by flat index.
    pub fn bin(&self, index: usize) -> &Bin {
        &self.bins[index]
    }

    /// Bin by flat index, mutable.
    pub fn bin_mut(&mut self, index: usize) -> &mut Bin {
        &mut self.bins[index]
    }

    /// Bin at `(row, col)`.
    pub fn bin_at(&self, row: usize, col: usize) -> &Bin {
        &self.bins[self.index_of(row, col)]
    }

    /// Resets every bin.
    pub fn reset(&mut self) {
        for bin in &mut self.bins {
            bin.reset();
        }
    }

    /// Empties every bin but keeps shrink ratios and counters.
    pub fn clear_cells(&mut self) {
        for bin in &mut self.bins {
            bin.clear_cells();
        }
    }

    /// Restores shrink ratios and counters but keeps cells.
    pub fn reset_shrink_and_counters(&mut self) {
        for bin in &mut self.bins {
            bin.reset_shrink_ratio();
            bin.reset_overflow_count();
            bin.reset_no_overflow_count();
        }
    }

    /// Total nominal capacity.
    pub fn total_capacity(&self) -> f64 {
        self.bins.iter().map(Bin::nominal_capacity).sum()
    }

    /// Total utilization.
    pub fn total_utilization(&self) -> f64 {
        self.bins.iter().map(Bin::utilization).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> BinGrid {
        BinGrid::new(ResourceFamily::Lut, Rect::new(0.0, 7.0, 0.0, 3.0), 2.0, 2.0).unwrap()
    }

    #[test]
    fn grid_covers_area_corner() {
        let grid = grid();
        assert_eq!((grid.rows(), grid.cols()), (2, 4));
        assert_eq!(grid.locate(Point::new(7.0, 3.0)), grid.index_of(1, 3));
        assert_eq!(grid.locate(Point::new(-5.0, 1.0)), grid.index_of(0, 0));
        assert_eq!(grid.locate(Point::new(2.0, 1.9)), grid.index_of(0, 1));
    }

    #[test]
    fn edge_sites_fold_into_the_last_bin() {
        let mut grid = BinGrid::new(ResourceFamily::Dsp, Rect::new(0.0, 6.0, 0.0, 3.0), 2.0, 4.0).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (1, 3));
        let last = grid.locate(Point::new(6.0, 3.0));
        assert_eq!(last, grid.index_of(0, 2));
        assert_eq!(grid.bin(last).area, Rect::new(4.0, 6.0, 0.0, 3.0));
        grid.bin_mut(last).add_capacity(4.0).unwrap();
        assert_eq!(grid.total_capacity(), 4.0);
    }

    #[test]
    fn degenerate_area_keeps_one_full_bin() {
        let grid = BinGrid::new(ResourceFamily::Dsp, Rect::new(3.0, 3.0, 0.0, 9.0), 2.0, 4.0).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (3, 1));
        assert_eq!(grid.bin_at(0, 0).area.width(), 2.0);
        assert_eq!(grid.bin_at(2, 0).area.height(), 1.0);
    }

    #[test]
    fn half_open_bins() {
        let grid = grid();
        assert_eq!(grid.locate(Point::new(0.0, 0.0)), grid.index_of(0, 0));
        assert_eq!(grid.locate(Point::new(1.999, 0.5)), grid.index_of(0, 0));
        assert_eq!(grid.locate(Point::new(2.0, 0.5)), grid.index_of(0, 1));
        assert_eq!(grid.bin_at(1, 3).area, Rect::new(6.0, 7.0, 2.0, 3.0));
    }

    #[test]
    fn overflow_respects_shrink() {
        let mut bin = Bin::new(0, 0, Rect::new(0.0, 1.0, 0.0, 1.0));
        bin.add_capacity(4.0).unwrap();
        for i in 0..4 {
            bin.add_cell(CellId::from_raw(i), 1.0);
        }
        assert!(!bin.is_overflow(1.0));
        bin.shrink_by(0.5);
        assert_eq!(bin.capacity(), 2.0);
        assert!(bin.is_overflow(1.0));
        assert_eq!(bin.utilization_rate(), 2.0);
        bin.reset_shrink_ratio();
        assert_eq!(bin.shrink_ratio(), 1.0);
    }

    #[test]
    fn zero_capacity_bins() {
        let mut bin = Bin::new(0, 0, Rect::new(0.0, 1.0, 0.0, 1.0));
        assert!(!bin.is_overflow(1.0));
        bin.add_cell(CellId::from_raw(0), 1.0);
        assert!(bin.is_overflow(1.0));
        assert_eq!(bin.utilization_rate(), 100.0);
    }

    #[test]
    fn remove_missing_cell_is_an_error() {
        let mut bin = Bin::new(0, 0, Rect::new(0.0, 1.0, 0.0, 1.0));
        bin.add_cell(CellId::from_raw(1), 1.0);
        assert!(bin.remove_cell(CellId::from_raw(2), 1.0).is_err());
        bin.remove_cell(CellId::from_raw(1), 1.0).unwrap();
        assert_eq!(bin.utilization(), 0.0);
    }

    #[test]
    fn reset_restores_everything() {
        let mut bin = Bin::new(0, 0, Rect::new(0.0, 1.0, 0.0, 1.0));
        bin.add_capacity(1.0).unwrap();
        bin.add_cell(CellId::from_raw(1), 1.0);
        bin.shrink_by(0.1);
        bin.count_overflow();
        bin.reset();
        assert!(bin.cells().is_empty());
        assert_eq!(bin.shrink_ratio(), 1.0);
        assert_eq!(bin.overflow_count(), 0);
        assert_eq!(bin.nominal_capacity(), 1.0);
    }

    #[test]
    fn negative_capacity_rejected() {
        let mut bin = Bin::new(0, 0, Rect::new(0.0, 1.0, 0.0, 1.0));
        assert!(bin.add_capacity(-1.0).is_err());
        assert!(BinGrid::new(ResourceFamily::Ff, Rect::new(0.0, 1.0, 0.0, 1.0), 0.0, 1.0).is_err());
    }
}
