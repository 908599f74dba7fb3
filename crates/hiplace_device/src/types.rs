//! Sites, site types and clock regions.

use hiplace_common::{Point, Rect, SiteId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The functional type of a placement site.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum SiteType {
    /// A logic slice (LUTs, FFs, carry, wide muxes).
    #[serde(rename = "SLICEL")]
    SliceL,
    /// A logic slice whose LUTs can also act as distributed RAM.
    #[serde(rename = "SLICEM")]
    SliceM,
    /// A DSP multiply-accumulate block.
    #[serde(rename = "DSP")]
    Dsp,
    /// A block RAM half (one BRAM18, two rows per BRAM36).
    #[serde(rename = "BRAM")]
    Bram,
    /// An I/O pad.
    #[serde(rename = "IO")]
    Io,
}

impl SiteType {
    /// All site types in declaration order.
    pub const ALL: [SiteType; 5] = [
        SiteType::SliceL,
        SiteType::SliceM,
        SiteType::Dsp,
        SiteType::Bram,
        SiteType::Io,
    ];

    /// Returns `true` for both kinds of logic slice.
    pub fn is_slice(self) -> bool {
        matches!(self, SiteType::SliceL | SiteType::SliceM)
    }

    /// Prefix used in generated site names.
    pub fn name_prefix(self) -> &'static str {
        match self {
            SiteType::SliceL => "SLICEL",
            SiteType::SliceM => "SLICEM",
            SiteType::Dsp => "DSP",
            SiteType::Bram => "RAMB18",
            SiteType::Io => "IOB",
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_prefix())
    }
}

/// One physical placement site.
///
/// `column` and `row` index the site inside the columns of its own type
/// (left to right, bottom to top), which is how macro contiguity is checked.
/// They and the clock region indices are derived when the device is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceSite {
    /// Position in the device site arena.
    pub id: SiteId,
    /// Vendor-style site name.
    pub name: String,
    /// Functional type.
    pub site_type: SiteType,
    /// Horizontal location.
    pub x: f64,
    /// Vertical location.
    pub y: f64,
    /// Column index among the columns of this site type.
    #[serde(default)]
    pub column: u32,
    /// Row index inside the column.
    #[serde(default)]
    pub row: u32,
    /// Clock region column.
    #[serde(default)]
    pub clock_region_col: u32,
    /// Clock region row.
    #[serde(default)]
    pub clock_region_row: u32,
    /// Pre-occupied by a fixed element; never offered to legalizers.
    #[serde(default)]
    pub occupied: bool,
    #[serde(skip)]
    pub(crate) mapped: bool,
}

impl DeviceSite {
    /// Creates an unplaced, unmapped site. Derived indices are filled in by
    /// [`Device::new`](crate::Device::new).
    pub fn new(id: SiteId, name: impl Into<String>, site_type: SiteType, x: f64, y: f64) -> Self {
        Self {
            id,
            name: name.into(),
            site_type,
            x,
            y,
            column: 0,
            row: 0,
            clock_region_col: 0,
            clock_region_row: 0,
            occupied: false,
            mapped: false,
        }
    }

    /// Site location.
    pub fn location(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Returns `true` if a legalizer has bound a unit to this site.
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Returns `true` if neither occupied nor mapped.
    pub fn is_available(&self) -> bool {
        !self.occupied && !self.mapped
    }
}

/// A rectangular clock region of the device.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClockRegion {
    /// Column in the clock region grid.
    pub col: u32,
    /// Row in the clock region grid.
    pub row: u32,
    /// Covered area.
    pub bounds: Rect,
}

impl ClockRegion {
    /// Center of the region, the target of clock-region pseudo nets.
    pub fn center(&self) -> Point {
        self.bounds.center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_type_uses_vendor_names_in_json() {
        let json = serde_json::to_string(&SiteType::SliceM).unwrap();
        assert_eq!(json, "\"SLICEM\"");
        let back: SiteType = serde_json::from_str("\"BRAM\"").unwrap();
        assert_eq!(back, SiteType::Bram);
    }

    #[test]
    fn fresh_site_is_available() {
        let site = DeviceSite::new(SiteId::from_raw(0), "DSP_X0Y0", SiteType::Dsp, 3.0, 5.0);
        assert!(site.is_available());
        assert_eq!(site.location(), Point::new(3.0, 5.0));
        assert!(!SiteType::Dsp.is_slice());
        assert!(SiteType::SliceL.is_slice());
    }

    #[test]
    fn site_json_defaults_derived_fields() {
        let json = r#"{"id": 4, "name": "RAMB18_X0Y2", "site_type": "BRAM", "x": 10.0, "y": 2.5}"#;
        let site: DeviceSite = serde_json::from_str(json).unwrap();
        assert_eq!(site.id, SiteId::from_raw(4));
        assert_eq!(site.row, 0);
        assert!(!site.occupied);
        assert!(!site.is_mapped());
    }
}
