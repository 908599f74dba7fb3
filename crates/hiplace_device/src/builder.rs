//! Programmatic construction of columnar devices.

use crate::device::Device;
use crate::types::{DeviceSite, SiteType};
use hiplace_common::{PlaceResult, SiteId};

struct ColumnSpec {
    x: f64,
    site_type: SiteType,
    rows: u32,
    pitch: f64,
    y0: f64,
}

/// Builds a device out of uniform site columns.
///
/// Real devices are columnar: every column holds one site type at a fixed
/// vertical pitch.
pub struct DeviceBuilder {
    name: String,
    columns: Vec<ColumnSpec>,
    clock_region_cols: usize,
    clock_region_rows: usize,
}

impl DeviceBuilder {
    /// Starts an empty device.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            clock_region_cols: 1,
            clock_region_rows: 1,
        }
    }

    /// Adds a column of `rows` sites at `x`, one site per unit of Y.
    pub fn column(self, x: f64, site_type: SiteType, rows: u32) -> Self {
        self.column_with_pitch(x, site_type, rows, 1.0, 0.0)
    }

    /// Adds a column with an explicit vertical pitch and start.
    pub fn column_with_pitch(mut self, x: f64, site_type: SiteType, rows: u32, pitch: f64, y0: f64) -> Self {
        self.columns.push(ColumnSpec {
            x,
            site_type,
            rows,
            pitch,
            y0,
        });
        self
    }

    /// Splits the device evenly into `cols x rows` clock regions.
    pub fn clock_regions(mut self, cols: usize, rows: usize) -> Self {
        self.clock_region_cols = cols.max(1);
        self.clock_region_rows = rows.max(1);
        self
    }

    /// Builds the device.
    pub fn build(self) -> PlaceResult<Device> {
        let mut sites = Vec::new();
        let mut type_column = std::collections::BTreeMap::<SiteType, u32>::new();
        for spec in &self.columns {
            let col = type_column.entry(spec.site_type).or_insert(0);
            for row in 0..spec.rows {
                let id = SiteId::from_index(sites.len());
                let name = format!("{}_X{}Y{}", spec.site_type.name_prefix(), col, row);
                let y = spec.y0 + f64::from(row) * spec.pitch;
                sites.push(DeviceSite::new(id, name, spec.site_type, spec.x, y));
            }
            *col += 1;
        }

        let (left, right, bottom, top) = sites.iter().fold(
            (f64::MAX, f64::MIN, f64::MAX, f64::MIN),
            |(l, r, b, t), s| (l.min(s.x), r.max(s.x), b.min(s.y), t.max(s.y)),
        );
        let split = |lo: f64, hi: f64, n: usize| -> Vec<f64> {
            (0..=n).map(|i| lo + (hi - lo) * i as f64 / n as f64).collect()
        };
        let (x_bounds, y_bounds) = if sites.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            (
                split(left, right, self.clock_region_cols),
                split(bottom, top, self.clock_region_rows),
            )
        };
        Device::new(self.name, sites, x_bounds, y_bounds)
    }
}
