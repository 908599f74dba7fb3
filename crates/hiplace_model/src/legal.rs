//! Legalization results shared between legalizers and the wirelength model.

use hiplace_common::{Point, SiteId, UnitId};
use std::collections::BTreeMap;

/// Where legalizers want each unit to end up.
///
/// The wirelength optimizer pulls units towards their legal location with
/// pseudo nets; the final output reads the site lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegalPlan {
    locations: BTreeMap<UnitId, Point>,
    sites: BTreeMap<UnitId, Vec<SiteId>>,
}

impl LegalPlan {
    /// Records the legal anchor of a unit, replacing any earlier one.
    pub fn set_location(&mut self, unit: UnitId, at: Point) {
        self.locations.insert(unit, at);
    }

    /// Records the sites of a unit, replacing any earlier ones.
    pub fn set_sites(&mut self, unit: UnitId, sites: Vec<SiteId>) {
        self.sites.insert(unit, sites);
    }

    /// Legal anchor of a unit.
    pub fn location(&self, unit: UnitId) -> Option<Point> {
        self.locations.get(&unit).copied()
    }

    /// Sites of a unit.
    pub fn sites(&self, unit: UnitId) -> Option<&[SiteId]> {
        self.sites.get(&unit).map(Vec::as_slice)
    }

    /// All legal anchors, by unit.
    pub fn locations(&self) -> impl Iterator<Item = (UnitId, Point)> + '_ {
        self.locations.iter().map(|(&u, &p)| (u, p))
    }

    /// Forgets a unit.
    pub fn remove(&mut self, unit: UnitId) {
        self.locations.remove(&unit);
        self.sites.remove(&unit);
    }

    /// Number of units with a legal anchor.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns `true` if no unit has a legal anchor.
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.locations.clear();
        self.sites.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_entries_replace_earlier() {
        let mut plan = LegalPlan::default();
        let unit = UnitId::from_raw(3);
        plan.set_location(unit, Point::new(1.0, 2.0));
        plan.set_location(unit, Point::new(4.0, 2.0));
        plan.set_sites(unit, vec![SiteId::from_raw(7), SiteId::from_raw(8)]);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.location(unit), Some(Point::new(4.0, 2.0)));
        assert_eq!(plan.sites(unit).map(<[SiteId]>::len), Some(2));
        plan.remove(unit);
        assert!(plan.is_empty());
        assert!(plan.sites(unit).is_none());
    }
}
