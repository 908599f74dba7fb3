//! Recursive bipartitioning of a spread region.
//!
//! A box splits its bin lines (columns or rows) into two groups of roughly
//! equal capacity, hands each group the matching share of cells in
//! coordinate order and then packs those cells into the lines from the outer
//! edges inwards, mapping them linearly into each line's inner range. The
//! recursion alternates between horizontal and vertical cuts and runs over
//! an explicit stack.

use super::region::SpreadRegion;
use crate::wirelength::Axis;
use hiplace_common::{CellId, Point};
use hiplace_model::{BinGrid, PlacementModel};

/// Recursion depth of the root box.
const ROOT_LEVEL: u32 = 100;
/// Boxes narrower than this many bins in both directions are not split.
const MIN_SPAN: usize = 1;
const EPS: f64 = 1e-4;

/// Bin rectangle plus the region-local indices of the cells inside.
#[derive(Clone, Debug)]
struct SubBox {
    top: usize,
    bottom: usize,
    left: usize,
    right: usize,
    level: u32,
    horizontal: bool,
    members: Vec<usize>,
}

impl SubBox {
    fn span(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.right - self.left,
            Axis::Y => self.top - self.bottom,
        }
    }

    fn child(&self, axis: Axis, lo: usize, hi: usize, members: Vec<usize>) -> Option<SubBox> {
        if members.is_empty() {
            return None;
        }
        let mut child = SubBox {
            level: self.level - 1,
            horizontal: !self.horizontal,
            members,
            ..*self
        };
        match axis {
            Axis::X => (child.left, child.right) = (lo, hi),
            Axis::Y => (child.bottom, child.top) = (lo, hi),
        }
        Some(child)
    }
}

/// Working state of one region: cell ids with their evolving positions.
struct RegionCells<'a> {
    grid: &'a BinGrid,
    supply: f64,
    ids: &'a [CellId],
    positions: Vec<Point>,
    occupation: Vec<f64>,
}

/// Spreads the cells of `region` over its bins and returns their new
/// locations. The model is only read.
pub(crate) fn spread_region(model: &PlacementModel, grid: &BinGrid, region: &SpreadRegion, supply: f64) -> Vec<(CellId, Point)> {
    let ids = region.cells();
    let mut cells = RegionCells {
        grid,
        supply,
        ids,
        positions: ids.iter().map(|&c| model.cell_location(c)).collect(),
        occupation: ids.iter().map(|&c| model.cell_occupation(c)).collect(),
    };
    let mut stack = vec![SubBox {
        top: region.top,
        bottom: region.bottom,
        left: region.left,
        right: region.right,
        level: ROOT_LEVEL,
        horizontal: true,
        members: (0..ids.len()).collect(),
    }];
    while let Some(sub) = stack.pop() {
        if sub.level == 0 || (sub.span(Axis::X) < MIN_SPAN && sub.span(Axis::Y) < MIN_SPAN) {
            continue;
        }
        let (first, second) = if sub.horizontal { (Axis::X, Axis::Y) } else { (Axis::Y, Axis::X) };
        let mut children = None;
        if sub.span(first) >= MIN_SPAN {
            children = cells.split(&sub, first);
        }
        if children.is_none() && sub.span(second) >= MIN_SPAN {
            children = cells.split(&sub, second);
        }
        if let Some((a, b)) = children {
            stack.extend(a);
            stack.extend(b);
        }
    }
    ids.iter().copied().zip(cells.positions).collect()
}

impl RegionCells<'_> {
    fn coord(&self, member: usize, axis: Axis) -> f64 {
        axis.of(self.positions[member])
    }

    fn set_coord(&mut self, member: usize, axis: Axis, v: f64) {
        match axis {
            Axis::X => self.positions[member].x = v,
            Axis::Y => self.positions[member].y = v,
        }
    }

    /// Supply-scaled capacity of bin line `line` inside `sub`.
    fn line_capacity(&self, sub: &SubBox, axis: Axis, line: usize) -> f64 {
        let capacity: f64 = match axis {
            Axis::X => (sub.bottom..=sub.top).map(|row| self.grid.bin_at(row, line).capacity()).sum(),
            Axis::Y => (sub.left..=sub.right).map(|col| self.grid.bin_at(line, col).capacity()).sum(),
        };
        self.supply * capacity
    }

    /// Lower and upper edge of a bin line, clipped to the grid's area.
    fn line_edges(&self, sub: &SubBox, axis: Axis, line: usize) -> (f64, f64) {
        match axis {
            Axis::X => {
                let area = self.grid.bin_at(sub.bottom, line).area;
                (area.left, area.right)
            }
            Axis::Y => {
                let area = self.grid.bin_at(line, sub.left).area;
                (area.bottom, area.top)
            }
        }
    }

    /// Splits `sub` across `axis`. Returns `None` when no cut was made.
    fn split(&mut self, sub: &SubBox, axis: Axis) -> Option<(Option<SubBox>, Option<SubBox>)> {
        if sub.members.is_empty() {
            return None;
        }
        let (lo, hi) = match axis {
            Axis::X => (sub.left, sub.right),
            Axis::Y => (sub.bottom, sub.top),
        };
        let mut members = sub.members.clone();
        members.sort_by(|&a, &b| self.coord(a, axis).total_cmp(&self.coord(b, axis)).then(a.cmp(&b)));

        let capacity: Vec<f64> = (lo..=hi).map(|line| self.line_capacity(sub, axis, line)).collect();
        let total_capacity: f64 = capacity.iter().sum();
        let a_lo = lo + capacity.iter().position(|&c| c > 0.0)?;
        let b_hi = lo + capacity.iter().rposition(|&c| c > 0.0)?;
        if b_hi <= a_lo {
            return None;
        }

        // Grow the two halves towards each other, always feeding the smaller.
        let (mut a_hi, mut b_lo) = (a_lo, b_hi);
        let mut a_capacity = capacity[a_hi - lo];
        let mut b_capacity = capacity[b_lo - lo];
        while a_hi + 1 < b_lo {
            if a_capacity <= b_capacity {
                a_hi += 1;
                a_capacity += capacity[a_hi - lo];
            } else {
                b_lo -= 1;
                b_capacity += capacity[b_lo - lo];
            }
        }

        let total_occupation: f64 = members.iter().map(|&m| self.occupation[m]).sum();
        let mut a_share = total_occupation * a_capacity / total_capacity;
        let mut cut = 0;
        if a_share > EPS {
            for &m in &members {
                a_share -= self.occupation[m];
                cut += 1;
                if a_share <= EPS {
                    break;
                }
            }
        }
        let b_members = members.split_off(cut);
        let a_members = members;

        // Box A fills from its inner edge outwards, taking the largest
        // coordinates first; its outermost line takes whatever remains.
        let mut tail = a_members.len();
        for line in (a_lo..=a_hi).rev() {
            if tail == 0 {
                break;
            }
            let mut head = tail;
            let mut area = 0.0;
            while head > 0 && (line == a_lo || area <= capacity[line - lo] + EPS) {
                head -= 1;
                area += self.occupation[a_members[head]];
            }
            self.remap(&a_members[head..tail], sub, axis, line);
            tail = head;
        }

        let mut head = 0;
        for line in b_lo..=b_hi {
            if head >= b_members.len() {
                break;
            }
            let mut tail = head;
            let mut area = 0.0;
            while tail < b_members.len() && (line == b_hi || area <= capacity[line - lo] + EPS) {
                area += self.occupation[b_members[tail]];
                tail += 1;
            }
            self.remap(&b_members[head..tail], sub, axis, line);
            head = tail;
        }

        Some((
            sub.child(axis, a_lo, a_hi, a_members),
            sub.child(axis, b_lo, b_hi, b_members),
        ))
    }

    /// Maps sorted `members` linearly into the inner range of `line`.
    fn remap(&mut self, members: &[usize], sub: &SubBox, axis: Axis, line: usize) {
        let (Some(&first), Some(&last)) = (members.first(), members.last()) else {
            return;
        };
        let (lower, upper) = self.line_edges(sub, axis, line);
        let inset = (upper - lower) / (members.len() as f64 + 1.0);
        let (new_lo, new_hi) = (lower + inset, upper - inset);
        let old_lo = self.coord(first, axis);
        let old_hi = self.coord(last, axis);
        if (old_hi - old_lo).abs() < 1e-5 {
            let mid = (new_lo + new_hi) / 2.0;
            for &m in members {
                self.set_coord(m, axis, mid);
            }
        } else {
            let scale = (new_hi - new_lo) / (old_hi - old_lo);
            for &m in members {
                let v = new_lo + (self.coord(m, axis) - old_lo) * scale;
                self.set_coord(m, axis, v);
            }
        }
    }
}
