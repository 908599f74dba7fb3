//! Nets expressed over placement units.

use crate::unit::PlacementUnit;
use hiplace_common::{CellId, NetId, Point, Rect, UnitId};

/// A net pin located relative to its unit anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetPin {
    /// Unit owning the pin's cell.
    pub unit: UnitId,
    /// Cell owning the pin.
    pub cell: CellId,
    /// Pin location relative to the unit anchor (member offset plus pin offset).
    pub offset: Point,
    /// Whether the pin drives the net.
    pub is_driver: bool,
}

/// A design net in placement terms.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementNet {
    /// The design net.
    pub id: NetId,
    /// Pins, in design order.
    pub pins: Vec<NetPin>,
    /// Power nets are skipped by wirelength models.
    pub is_power: bool,
    /// Wirelength weight multiplier.
    pub weight: f64,
}

impl PlacementNet {
    /// Location of pin `i` given the unit arena.
    pub fn pin_location(&self, units: &[PlacementUnit], i: usize) -> Point {
        let pin = &self.pins[i];
        let anchor = units[pin.unit.index()].location();
        Point::new(anchor.x + pin.offset.x, anchor.y + pin.offset.y)
    }

    /// Bounding box of all pins.
    pub fn bounds(&self, units: &[PlacementUnit]) -> Rect {
        let mut rect = Rect::empty();
        for i in 0..self.pins.len() {
            rect.include(self.pin_location(units, i));
        }
        rect
    }

    /// Half-perimeter wirelength; zero for nets with fewer than two pins.
    pub fn hpwl(&self, units: &[PlacementUnit], y2x: f64) -> f64 {
        if self.pins.len() < 2 {
            return 0.0;
        }
        self.bounds(units).half_perimeter(y2x)
    }

    /// HPWL if `unit` were anchored at `at` instead of its current location.
    pub fn hpwl_with_unit_at(&self, units: &[PlacementUnit], unit: UnitId, at: Point, y2x: f64) -> f64 {
        if self.pins.len() < 2 {
            return 0.0;
        }
        let mut rect = Rect::empty();
        for (i, pin) in self.pins.iter().enumerate() {
            let p = if pin.unit == unit {
                Point::new(at.x + pin.offset.x, at.y + pin.offset.y)
            } else {
                self.pin_location(units, i)
            };
            rect.include(p);
        }
        rect.half_perimeter(y2x)
    }

    /// Index of the single driver pin, `None` if there are zero or several.
    pub fn sole_driver(&self) -> Option<usize> {
        let mut drivers = self.pins.iter().enumerate().filter(|(_, p)| p.is_driver);
        match (drivers.next(), drivers.next()) {
            (Some((i, _)), None) => Some(i),
            _ => None,
        }
    }

    /// Number of distinct units on the net.
    pub fn unit_count(&self) -> usize {
        let mut units: Vec<UnitId> = self.pins.iter().map(|p| p.unit).collect();
        units.sort_unstable();
        units.dedup();
        units.len()
    }
}
