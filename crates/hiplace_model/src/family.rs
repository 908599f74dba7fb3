//! Resource families: the granularity of density bins.

use crate::design::CellType;
use hiplace_device::SiteType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A resource family tracked by its own bin grid.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum ResourceFamily {
    /// LUTs, including LUTs used as distributed RAM.
    Lut,
    /// Flip-flops.
    Ff,
    /// Carry-chain segments.
    Carry,
    /// F7 muxes.
    MuxF7,
    /// F8 muxes.
    MuxF8,
    /// DSP blocks.
    Dsp,
    /// Block RAM rows.
    Bram,
}

impl ResourceFamily {
    /// All families, in bin-grid order.
    pub const ALL: [ResourceFamily; 7] = [
        ResourceFamily::Lut,
        ResourceFamily::Ff,
        ResourceFamily::Carry,
        ResourceFamily::MuxF7,
        ResourceFamily::MuxF8,
        ResourceFamily::Dsp,
        ResourceFamily::Bram,
    ];

    /// Position in [`ALL`](Self::ALL).
    pub fn index(self) -> usize {
        self as usize
    }

    /// The family whose bins a cell of `cell_type` occupies.
    pub fn of(cell_type: CellType) -> Option<ResourceFamily> {
        match cell_type {
            CellType::Lut | CellType::Lutram => Some(ResourceFamily::Lut),
            CellType::Ff => Some(ResourceFamily::Ff),
            CellType::Carry => Some(ResourceFamily::Carry),
            CellType::MuxF7 => Some(ResourceFamily::MuxF7),
            CellType::MuxF8 => Some(ResourceFamily::MuxF8),
            CellType::Dsp => Some(ResourceFamily::Dsp),
            CellType::Bram36 | CellType::Bram18 => Some(ResourceFamily::Bram),
            CellType::Io | CellType::Other => None,
        }
    }

    /// How many elements of this family one site of `site_type` holds.
    pub fn capacity_per_site(self, site_type: SiteType) -> f64 {
        match (self, site_type.is_slice()) {
            (ResourceFamily::Lut, true) => 8.0,
            (ResourceFamily::Ff, true) => 16.0,
            (ResourceFamily::Carry, true) => 1.0,
            (ResourceFamily::MuxF7, true) => 4.0,
            (ResourceFamily::MuxF8, true) => 2.0,
            (ResourceFamily::Dsp, _) if site_type == SiteType::Dsp => 1.0,
            (ResourceFamily::Bram, _) if site_type == SiteType::Bram => 1.0,
            _ => 0.0,
        }
    }

    /// Default bin utilization contributed by one cell.
    pub fn default_occupation(cell_type: CellType) -> f64 {
        cell_type.site_span() as f64
    }

    /// Short name used in logs and trace files.
    pub fn name(self) -> &'static str {
        match self {
            ResourceFamily::Lut => "LUT",
            ResourceFamily::Ff => "FF",
            ResourceFamily::Carry => "CARRY8",
            ResourceFamily::MuxF7 => "MUXF7",
            ResourceFamily::MuxF8 => "MUXF8",
            ResourceFamily::Dsp => "DSP",
            ResourceFamily::Bram => "BRAM",
        }
    }
}

impl fmt::Display for ResourceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_position() {
        for (i, family) in ResourceFamily::ALL.iter().enumerate() {
            assert_eq!(family.index(), i);
        }
    }

    #[test]
    fn slice_capacities() {
        assert_eq!(ResourceFamily::Lut.capacity_per_site(SiteType::SliceM), 8.0);
        assert_eq!(ResourceFamily::Ff.capacity_per_site(SiteType::SliceL), 16.0);
        assert_eq!(ResourceFamily::MuxF8.capacity_per_site(SiteType::SliceL), 2.0);
        assert_eq!(ResourceFamily::Lut.capacity_per_site(SiteType::Dsp), 0.0);
        assert_eq!(ResourceFamily::Dsp.capacity_per_site(SiteType::Dsp), 1.0);
        assert_eq!(ResourceFamily::Bram.capacity_per_site(SiteType::SliceL), 0.0);
    }

    #[test]
    fn cell_families() {
        assert_eq!(ResourceFamily::of(CellType::Lutram), Some(ResourceFamily::Lut));
        assert_eq!(ResourceFamily::of(CellType::Bram36), Some(ResourceFamily::Bram));
        assert_eq!(ResourceFamily::of(CellType::Io), None);
        assert_eq!(ResourceFamily::default_occupation(CellType::Bram36), 2.0);
    }
}
