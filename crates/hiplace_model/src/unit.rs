//! Placement units: the objects the global placer moves.
//!
//! A unit is either one unpacked cell or a rigid macro whose members keep
//! fixed offsets from the unit anchor. Every design cell belongs to exactly
//! one unit.

use crate::design::{CellType, MacroKind};
use hiplace_common::{CellId, InternalError, PlaceResult, Point, UnitId};
use serde::{Deserialize, Serialize};

/// A cell inside a unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitMember {
    /// The member cell.
    pub cell: CellId,
    /// Offset of the cell from the unit anchor.
    pub offset: Point,
    /// Type of the member cell.
    pub cell_type: CellType,
}

/// The two shapes of a placement unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UnitKind {
    /// A single free cell, always at offset zero.
    Unpacked(UnitMember),
    /// A rigid group of cells.
    Macro {
        /// What kind of macro this is.
        kind: MacroKind,
        /// Members in declaration order.
        members: Vec<UnitMember>,
    },
}

/// A unit of placement motion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementUnit {
    /// Position in the unit arena.
    pub id: UnitId,
    /// Name of the cell or macro.
    pub name: String,
    /// Single cell or macro.
    pub kind: UnitKind,
    anchor: Point,
    last_anchor: Point,
    last_spread: Option<Point>,
    fixed: bool,
    locked: bool,
    net_count: usize,
}

impl PlacementUnit {
    /// Creates a movable unit at `anchor`.
    pub fn new(id: UnitId, name: impl Into<String>, kind: UnitKind, anchor: Point) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            anchor,
            last_anchor: anchor,
            last_spread: None,
            fixed: false,
            locked: false,
            net_count: 0,
        }
    }

    /// Members of the unit; one for an unpacked cell.
    pub fn members(&self) -> &[UnitMember] {
        match &self.kind {
            UnitKind::Unpacked(member) => std::slice::from_ref(member),
            UnitKind::Macro { members, .. } => members,
        }
    }

    /// Number of member cells.
    pub fn cell_count(&self) -> usize {
        self.members().len()
    }

    /// Member cell ids.
    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.members().iter().map(|m| m.cell)
    }

    /// Macro kind, `None` for unpacked cells.
    pub fn macro_kind(&self) -> Option<MacroKind> {
        match &self.kind {
            UnitKind::Unpacked(_) => None,
            UnitKind::Macro { kind, .. } => Some(*kind),
        }
    }

    /// Returns `true` if any member matches `pred`.
    pub fn has_cell_type(&self, pred: impl Fn(CellType) -> bool) -> bool {
        self.members().iter().any(|m| pred(m.cell_type))
    }

    /// Returns `true` if the unit holds a carry cell.
    pub fn has_carry(&self) -> bool {
        self.has_cell_type(|t| t == CellType::Carry)
    }

    /// Returns `true` if the unit holds a DSP or block RAM cell.
    pub fn has_dsp_or_bram(&self) -> bool {
        self.has_cell_type(|t| t == CellType::Dsp || t.is_bram())
    }

    /// Number of site rows the members of types accepted by `pred` cover.
    pub fn site_span_of(&self, pred: impl Fn(CellType) -> bool) -> usize {
        self.members()
            .iter()
            .filter(|m| pred(m.cell_type))
            .map(|m| m.cell_type.site_span())
            .sum()
    }

    /// Current anchor X.
    pub fn x(&self) -> f64 {
        self.anchor.x
    }

    /// Current anchor Y.
    pub fn y(&self) -> f64 {
        self.anchor.y
    }

    /// Current anchor location.
    pub fn location(&self) -> Point {
        self.anchor
    }

    /// Anchor location before the last move.
    pub fn last_location(&self) -> Point {
        self.last_anchor
    }

    /// Moves the anchor, remembering the previous one.
    pub fn set_anchor_location(&mut self, p: Point) {
        self.last_anchor = self.anchor;
        self.anchor = p;
    }

    /// Moves the anchor and forgets where it was.
    pub fn set_anchor_location_and_forget(&mut self, p: Point) {
        self.anchor = p;
        self.last_anchor = p;
    }

    /// Moves the unit to a spread location, damped towards the previous
    /// spread location by `forget` (1.0 keeps the new location as is).
    ///
    /// Returns the location actually applied.
    pub fn set_spread_location(&mut self, p: Point, forget: f64) -> PlaceResult<Point> {
        if self.locked {
            return Err(InternalError::new(format!(
                "spreading tried to move locked unit '{}'",
                self.name
            )));
        }
        let mut target = p;
        if let Some(last) = self.last_spread {
            target = Point::new(
                p.x * forget + last.x * (1.0 - forget),
                p.y * forget + last.y * (1.0 - forget),
            );
            self.last_spread = Some(target);
        }
        self.set_anchor_location_and_forget(target);
        Ok(target)
    }

    /// Remembers the current anchor as the last spread location.
    pub fn record_spread_location(&mut self) {
        self.last_spread = Some(self.anchor);
    }

    /// Returns `true` if the unit is excluded from QP and spreading.
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Returns `true` if the unit is excluded from legalization moves.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Sets the fixed flag.
    pub fn set_fixed(&mut self, fixed: bool) {
        self.fixed = fixed;
    }

    /// Sets the locked flag.
    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Number of distinct nets touching the unit.
    pub fn net_count(&self) -> usize {
        self.net_count
    }

    pub(crate) fn set_net_count(&mut self, count: usize) {
        self.net_count = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lut(id: u32) -> UnitMember {
        UnitMember {
            cell: CellId::from_raw(id),
            offset: Point::default(),
            cell_type: CellType::Lut,
        }
    }

    fn carry_macro() -> PlacementUnit {
        let members = vec![
            UnitMember {
                cell: CellId::from_raw(0),
                offset: Point::new(0.0, 0.0),
                cell_type: CellType::Carry,
            },
            UnitMember {
                cell: CellId::from_raw(1),
                offset: Point::new(0.0, 1.0),
                cell_type: CellType::Carry,
            },
            UnitMember {
                cell: CellId::from_raw(2),
                offset: Point::new(0.0, 0.0),
                cell_type: CellType::Lut,
            },
        ];
        PlacementUnit::new(
            UnitId::from_raw(0),
            "adder",
            UnitKind::Macro {
                kind: MacroKind::Carry,
                members,
            },
            Point::new(3.0, 3.0),
        )
    }

    #[test]
    fn unpacked_unit_has_one_member() {
        let unit = PlacementUnit::new(UnitId::from_raw(4), "lut", UnitKind::Unpacked(lut(9)), Point::default());
        assert_eq!(unit.cell_count(), 1);
        assert_eq!(unit.cells().collect::<Vec<_>>(), vec![CellId::from_raw(9)]);
        assert_eq!(unit.macro_kind(), None);
    }

    #[test]
    fn macro_capabilities() {
        let unit = carry_macro();
        assert_eq!(unit.cell_count(), 3);
        assert_eq!(unit.members()[1].cell, CellId::from_raw(1));
        assert_eq!(unit.members()[1].offset, Point::new(0.0, 1.0));
        assert!(unit.has_carry());
        assert!(!unit.has_dsp_or_bram());
        assert_eq!(unit.site_span_of(|t| t == CellType::Carry), 2);
    }

    #[test]
    fn anchor_moves_remember_previous() {
        let mut unit = carry_macro();
        unit.set_anchor_location(Point::new(5.0, 1.0));
        assert_eq!(unit.location(), Point::new(5.0, 1.0));
        assert_eq!(unit.last_location(), Point::new(3.0, 3.0));
        unit.set_anchor_location_and_forget(Point::new(6.0, 2.0));
        assert_eq!(unit.last_location(), Point::new(6.0, 2.0));
    }

    #[test]
    fn first_spread_is_not_damped() {
        let mut unit = carry_macro();
        let applied = unit.set_spread_location(Point::new(10.0, 10.0), 0.2).unwrap();
        assert_eq!(applied, Point::new(10.0, 10.0));
        let again = unit.set_spread_location(Point::new(0.0, 0.0), 0.2).unwrap();
        assert_eq!(again, Point::new(0.0, 0.0));
    }

    #[test]
    fn later_spreads_blend_with_record() {
        let mut unit = carry_macro();
        unit.record_spread_location();
        let applied = unit.set_spread_location(Point::new(13.0, 3.0), 0.5).unwrap();
        assert_eq!(applied, Point::new(8.0, 3.0));
        assert_eq!(unit.last_location(), Point::new(8.0, 3.0));
        let next = unit.set_spread_location(Point::new(18.0, 3.0), 0.5).unwrap();
        assert_eq!(next, Point::new(13.0, 3.0));
    }

    #[test]
    fn locked_unit_refuses_spreading() {
        let mut unit = carry_macro();
        unit.set_locked(true);
        assert!(unit.set_spread_location(Point::new(1.0, 1.0), 1.0).is_err());
        assert_eq!(unit.location(), Point::new(3.0, 3.0));
    }
}
