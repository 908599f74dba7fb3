//! Exact placement of an ordered list of units into one site column.
//!
//! `best[i][j]` is the cheapest placement of units `0..=i` with unit `i`
//! ending at or below slot `j`:
//!
//! ```text
//! best[i][j] = min(best[i][j - 1], best[i - 1][j - h(i)] + cost(i, j - h(i) + 1))
//! ```
//!
//! A unit spans `h` slots whose rows must be consecutive and inside one clock
//! region row; tall block RAM units must start on an even row. Units keep
//! their order along the column.

/// Cost of a placement that breaks a structural constraint.
pub(crate) const INFEASIBLE: f64 = 1.1e9;
const UNSET: f64 = 1e9;

/// One available site of a column, in row order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Slot {
    pub row: u32,
    pub clock_row: u32,
}

/// One unit to place, in column order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct DpUnit {
    /// Number of consecutive slots the unit covers.
    pub height: usize,
    /// The first slot must be on an even row.
    pub even_start: bool,
}

fn fits(slots: &[Slot], unit: DpUnit, start: usize) -> bool {
    let end = start + unit.height - 1;
    let (first, last) = (slots[start], slots[end]);
    last.row - first.row == unit.height as u32 - 1
        && first.clock_row == last.clock_row
        && (!unit.even_start || first.row % 2 == 0)
}

/// Places `units` into `slots` minimizing the summed `cost(unit, start
/// slot)`. Returns the start slot of every unit, or `None` if no placement
/// avoids [`INFEASIBLE`] costs.
pub(crate) fn place_column(
    slots: &[Slot],
    units: &[DpUnit],
    cost: impl Fn(usize, usize) -> f64,
) -> Option<Vec<usize>> {
    let n = units.len();
    let m = slots.len();
    if n == 0 {
        return Some(Vec::new());
    }
    if units.iter().any(|u| u.height == 0) || units.iter().map(|u| u.height).sum::<usize>() > m {
        return None;
    }

    let mut best = vec![vec![UNSET; m]; n];
    let mut chosen = vec![vec![false; m]; n];
    let step_cost = |i: usize, start: usize| {
        if fits(slots, units[i], start) {
            cost(i, start)
        } else {
            INFEASIBLE
        }
    };

    let mut covered = units[0].height;
    let mut running = INFEASIBLE;
    for j in covered - 1..m {
        let c = step_cost(0, j + 1 - units[0].height);
        if c < running {
            running = c;
            chosen[0][j] = true;
        }
        best[0][j] = running;
    }
    for i in 1..n {
        let h = units[i].height;
        covered += h;
        for j in covered - 1..m {
            let candidate = best[i - 1][j - h] + step_cost(i, j + 1 - h);
            if best[i][j - 1] > candidate {
                chosen[i][j] = true;
                best[i][j] = candidate;
            } else {
                best[i][j] = best[i][j - 1];
            }
        }
    }
    if best[n - 1][m - 1] >= UNSET {
        return None;
    }

    let mut starts = vec![0; n];
    let mut top = m - 1;
    for i in (0..n).rev() {
        while !chosen[i][top] {
            top = top.checked_sub(1)?;
        }
        let start = top + 1 - units[i].height;
        starts[i] = start;
        if i > 0 {
            top = start.checked_sub(1)?;
        }
    }
    Some(starts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(rows: &[u32]) -> Vec<Slot> {
        rows.iter().map(|&row| Slot { row, clock_row: 0 }).collect()
    }

    const fn unit(height: usize) -> DpUnit {
        DpUnit {
            height,
            even_start: false,
        }
    }

    #[test]
    fn two_macros_share_a_five_site_column() {
        let slots = column(&[0, 1, 2, 3, 4]);
        let wanted = [0.0, 3.0];
        let starts = place_column(&slots, &[unit(3), unit(2)], |i, s| {
            1.0 + (slots[s].row as f64 - wanted[i]).abs()
        })
        .unwrap();
        assert_eq!(starts, vec![0, 3]);
    }

    #[test]
    fn each_unit_lands_on_its_cheapest_rows() {
        let slots = column(&[0, 1, 2, 3, 4, 5, 6]);
        let wanted = [0.0, 4.0];
        let starts = place_column(&slots, &[unit(2), unit(3)], |i, s| {
            (slots[s].row as f64 - wanted[i]).abs()
        })
        .unwrap();
        assert_eq!(starts, vec![0, 4]);
    }

    #[test]
    fn gaps_break_contiguity() {
        let slots = column(&[0, 1, 3, 4, 5]);
        assert_eq!(place_column(&slots, &[unit(3)], |_, _| 1.0), Some(vec![2]));
        assert_eq!(place_column(&slots, &[unit(3), unit(3)], |_, _| 1.0), None);
        assert_eq!(place_column(&slots, &[unit(2), unit(3)], |_, _| 1.0), Some(vec![0, 2]));
    }

    #[test]
    fn clock_region_rows_and_parity_are_respected() {
        let mut slots = column(&[0, 1, 2, 3]);
        slots[2].clock_row = 1;
        slots[3].clock_row = 1;
        // Rows 1..2 straddle the region boundary.
        let starts = place_column(&slots, &[unit(2)], |_, s| if s == 1 { 0.0 } else { 5.0 }).unwrap();
        assert_ne!(starts, vec![1]);

        let slots = column(&[0, 1, 2, 3]);
        let bram = DpUnit {
            height: 2,
            even_start: true,
        };
        let starts = place_column(&slots, &[bram], |_, s| (s as f64 - 1.0).abs()).unwrap();
        assert_eq!(starts[0] % 2, 0);
    }

    #[test]
    fn too_many_units_is_infeasible() {
        let slots = column(&[0, 1]);
        assert_eq!(place_column(&slots, &[unit(2), unit(1)], |_, _| 1.0), None);
        assert_eq!(place_column(&slots, &[], |_, _| 1.0), Some(vec![]));
    }
}
