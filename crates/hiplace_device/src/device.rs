//! The device: sites indexed by type and column, plus clock regions.

use crate::types::{ClockRegion, DeviceSite, SiteType};
use hiplace_common::{InternalError, PlaceResult, Point, Rect, SiteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized form of a [`Device`]; derived indices are rebuilt on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceData {
    /// Device name.
    pub name: String,
    /// All sites, `sites[i].id == i`.
    pub sites: Vec<DeviceSite>,
    /// Vertical clock region boundaries, left to right (`cols + 1` values).
    #[serde(default)]
    pub clock_region_x_bounds: Vec<f64>,
    /// Horizontal clock region boundaries, bottom to top (`rows + 1` values).
    #[serde(default)]
    pub clock_region_y_bounds: Vec<f64>,
}

/// A placement target device.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "DeviceData", into = "DeviceData")]
pub struct Device {
    name: String,
    sites: Vec<DeviceSite>,
    bounds: Rect,
    cr_x_bounds: Vec<f64>,
    cr_y_bounds: Vec<f64>,
    clock_regions: Vec<ClockRegion>,
    by_type: BTreeMap<SiteType, Vec<SiteId>>,
    /// Per type: sites of each column sorted by row.
    columns: BTreeMap<SiteType, Vec<Vec<SiteId>>>,
    /// Per type: X of each column.
    column_x: BTreeMap<SiteType, Vec<f64>>,
}

impl Device {
    /// Builds a device from its sites and clock region boundaries.
    ///
    /// Empty boundary lists produce a single clock region covering the whole
    /// device. Column, row and clock-region indices of every site are
    /// recomputed here.
    pub fn new(
        name: impl Into<String>,
        mut sites: Vec<DeviceSite>,
        mut cr_x_bounds: Vec<f64>,
        mut cr_y_bounds: Vec<f64>,
    ) -> PlaceResult<Self> {
        if sites.is_empty() {
            return Err(InternalError::new("device has no sites"));
        }
        for (index, site) in sites.iter().enumerate() {
            if site.id.index() != index {
                return Err(InternalError::new(format!(
                    "site '{}' has id {} but is stored at position {index}",
                    site.name, site.id
                )));
            }
            if !site.location().is_finite() {
                return Err(InternalError::new(format!("site '{}' has no finite location", site.name)));
            }
        }

        let mut bounds = Rect::empty();
        for site in &sites {
            bounds.include(site.location());
        }
        if cr_x_bounds.len() < 2 {
            cr_x_bounds = vec![bounds.left, bounds.right];
        }
        if cr_y_bounds.len() < 2 {
            cr_y_bounds = vec![bounds.bottom, bounds.top];
        }
        for pair in cr_x_bounds.windows(2).chain(cr_y_bounds.windows(2)) {
            if pair[1] < pair[0] {
                return Err(InternalError::new("clock region boundaries must be sorted"));
            }
        }

        let mut clock_regions = Vec::new();
        for row in 0..cr_y_bounds.len() - 1 {
            for col in 0..cr_x_bounds.len() - 1 {
                clock_regions.push(ClockRegion {
                    col: col as u32,
                    row: row as u32,
                    bounds: Rect::new(
                        cr_x_bounds[col],
                        cr_x_bounds[col + 1],
                        cr_y_bounds[row],
                        cr_y_bounds[row + 1],
                    ),
                });
            }
        }

        // Columns per type: distinct X positions, sites inside sorted by Y.
        let mut by_type: BTreeMap<SiteType, Vec<SiteId>> = BTreeMap::new();
        for site in &sites {
            by_type.entry(site.site_type).or_default().push(site.id);
        }
        let mut columns = BTreeMap::new();
        let mut column_x = BTreeMap::new();
        for (&site_type, ids) in &by_type {
            let mut xs: Vec<f64> = ids.iter().map(|id| sites[id.index()].x).collect();
            xs.sort_by(f64::total_cmp);
            xs.dedup();
            let mut type_columns: Vec<Vec<SiteId>> = vec![Vec::new(); xs.len()];
            for &id in ids {
                let col = xs.partition_point(|&x| x < sites[id.index()].x);
                type_columns[col].push(id);
            }
            for (col, members) in type_columns.iter_mut().enumerate() {
                members.sort_by(|a, b| sites[a.index()].y.total_cmp(&sites[b.index()].y));
                for (row, id) in members.iter().enumerate() {
                    let site = &mut sites[id.index()];
                    site.column = col as u32;
                    site.row = row as u32;
                }
            }
            columns.insert(site_type, type_columns);
            column_x.insert(site_type, xs);
        }

        for site in &mut sites {
            site.clock_region_col = grid_index(&cr_x_bounds, site.x) as u32;
            site.clock_region_row = grid_index(&cr_y_bounds, site.y) as u32;
            site.mapped = false;
        }

        Ok(Self {
            name: name.into(),
            sites,
            bounds,
            cr_x_bounds,
            cr_y_bounds,
            clock_regions,
            by_type,
            columns,
            column_x,
        })
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All sites.
    pub fn sites(&self) -> &[DeviceSite] {
        &self.sites
    }

    /// One site by id.
    pub fn site(&self, id: SiteId) -> &DeviceSite {
        &self.sites[id.index()]
    }

    /// Bounding box of all site locations, the legal placement area.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Ids of all sites of a type, in arena order.
    pub fn sites_of_type(&self, site_type: SiteType) -> &[SiteId] {
        self.by_type.get(&site_type).map_or(&[], Vec::as_slice)
    }

    /// X of every column of a type, left to right.
    pub fn column_positions(&self, site_type: SiteType) -> &[f64] {
        self.column_x.get(&site_type).map_or(&[], Vec::as_slice)
    }

    /// Sites of one column, bottom to top.
    pub fn column_sites(&self, site_type: SiteType, column: usize) -> &[SiteId] {
        self.columns
            .get(&site_type)
            .and_then(|cols| cols.get(column))
            .map_or(&[], Vec::as_slice)
    }

    /// Clock regions in row-major order.
    pub fn clock_regions(&self) -> &[ClockRegion] {
        &self.clock_regions
    }

    /// Clock region grid dimensions as `(cols, rows)`.
    pub fn clock_region_grid(&self) -> (usize, usize) {
        (self.cr_x_bounds.len() - 1, self.cr_y_bounds.len() - 1)
    }

    /// The clock region at `(col, row)`.
    pub fn clock_region(&self, col: usize, row: usize) -> Option<&ClockRegion> {
        let (cols, rows) = self.clock_region_grid();
        if col >= cols || row >= rows {
            return None;
        }
        self.clock_regions.get(row * cols + col)
    }

    /// The clock region containing a point; points outside the device snap
    /// to the nearest region.
    pub fn clock_region_at(&self, p: Point) -> &ClockRegion {
        let (cols, _) = self.clock_region_grid();
        let col = grid_index(&self.cr_x_bounds, p.x);
        let row = grid_index(&self.cr_y_bounds, p.y);
        &self.clock_regions[row * cols + col]
    }

    /// Marks a site as an obstacle (or clears it).
    pub fn set_occupied(&mut self, id: SiteId, occupied: bool) {
        self.sites[id.index()].occupied = occupied;
    }

    /// Binds a site to a placement unit.
    ///
    /// Binding an already bound site means two units claimed it, which is a
    /// broken invariant.
    pub fn set_mapped(&mut self, id: SiteId) -> PlaceResult<()> {
        let site = &mut self.sites[id.index()];
        if site.is_mapped() {
            return Err(InternalError::new(format!(
                "site '{}' is already mapped to another placement unit",
                site.name
            )));
        }
        site.mapped = true;
        Ok(())
    }

    /// Releases one site.
    pub fn reset_mapped(&mut self, id: SiteId) {
        self.sites[id.index()].mapped = false;
    }

    /// Number of sites currently bound.
    pub fn mapped_count(&self) -> usize {
        self.sites.iter().filter(|s| s.mapped).count()
    }
}

/// Index of the cell of a sorted boundary list containing `v`, clamped.
fn grid_index(bounds: &[f64], v: f64) -> usize {
    let cells = bounds.len() - 1;
    let interior = &bounds[1..cells];
    interior.partition_point(|&b| b <= v).min(cells - 1)
}

impl TryFrom<DeviceData> for Device {
    type Error = InternalError;

    fn try_from(data: DeviceData) -> Result<Self, Self::Error> {
        Device::new(
            data.name,
            data.sites,
            data.clock_region_x_bounds,
            data.clock_region_y_bounds,
        )
    }
}

impl From<Device> for DeviceData {
    fn from(device: Device) -> Self {
        DeviceData {
            name: device.name,
            sites: device.sites,
            clock_region_x_bounds: device.cr_x_bounds,
            clock_region_y_bounds: device.cr_y_bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(id: u32, site_type: SiteType, x: f64, y: f64) -> DeviceSite {
        DeviceSite::new(SiteId::from_raw(id), format!("S{id}"), site_type, x, y)
    }

    fn small_device() -> Device {
        let sites = vec![
            site(0, SiteType::Bram, 4.0, 5.0),
            site(1, SiteType::Bram, 4.0, 0.0),
            site(2, SiteType::Bram, 8.0, 0.0),
            site(3, SiteType::SliceL, 0.0, 0.0),
            site(4, SiteType::SliceL, 0.0, 9.0),
        ];
        Device::new("small", sites, vec![0.0, 6.0, 8.0], vec![0.0, 5.0, 9.0]).unwrap()
    }

    #[test]
    fn columns_and_rows_are_derived() {
        let device = small_device();
        let lower = device.site(SiteId::from_raw(1));
        let upper = device.site(SiteId::from_raw(0));
        assert_eq!((lower.column, lower.row), (0, 0));
        assert_eq!((upper.column, upper.row), (0, 1));
        assert_eq!(device.site(SiteId::from_raw(2)).column, 1);
        assert_eq!(device.column_positions(SiteType::Bram), &[4.0, 8.0]);
        assert_eq!(
            device.column_sites(SiteType::Bram, 0),
            &[SiteId::from_raw(1), SiteId::from_raw(0)]
        );
        assert!(device.column_sites(SiteType::Dsp, 0).is_empty());
    }

    #[test]
    fn clock_regions_cover_the_grid() {
        let device = small_device();
        assert_eq!(device.clock_region_grid(), (2, 2));
        assert_eq!(device.clock_regions().len(), 4);
        let region = device.clock_region_at(Point::new(7.0, 6.0));
        assert_eq!((region.col, region.row), (1, 1));
        let outside = device.clock_region_at(Point::new(-3.0, 100.0));
        assert_eq!((outside.col, outside.row), (0, 1));
        let s = device.site(SiteId::from_raw(0));
        assert_eq!((s.clock_region_col, s.clock_region_row), (0, 1));
    }

    #[test]
    fn double_mapping_is_an_invariant_violation() {
        let mut device = small_device();
        let id = SiteId::from_raw(2);
        device.set_mapped(id).unwrap();
        assert!(device.site(id).is_mapped());
        assert!(device.set_mapped(id).is_err());
        device.reset_mapped(id);
        assert_eq!(device.mapped_count(), 0);
        assert!(device.set_mapped(id).is_ok());
        assert_eq!(device.mapped_count(), 1);
    }

    #[test]
    fn misnumbered_sites_are_rejected() {
        let sites = vec![site(1, SiteType::Dsp, 0.0, 0.0)];
        assert!(Device::new("bad", sites, vec![], vec![]).is_err());
    }

    #[test]
    fn json_round_trip_rebuilds_indices() {
        let device = small_device();
        let json = serde_json::to_string(&device).unwrap();
        let back: Device = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sites().len(), 5);
        assert_eq!(back.bounds(), device.bounds());
        assert_eq!(back.column_positions(SiteType::Bram).len(), 2);
        assert_eq!(back.clock_region_grid(), (2, 2));
    }
}
