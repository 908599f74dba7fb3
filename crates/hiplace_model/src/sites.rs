//! Spatial index over device sites for neighborhood queries.

use hiplace_common::{Point, SiteId};
use hiplace_device::{Device, SiteType};
use std::collections::BTreeMap;

/// Buckets the sites of each type into a coarse grid.
#[derive(Clone, Debug)]
pub struct SiteIndex {
    origin: Point,
    bucket_width: f64,
    bucket_height: f64,
    cols: usize,
    rows: usize,
    buckets: BTreeMap<SiteType, Vec<Vec<SiteId>>>,
}

impl SiteIndex {
    /// Indexes every site of `device` in buckets of the given size.
    pub fn new(device: &Device, bucket_width: f64, bucket_height: f64) -> Self {
        let bounds = device.bounds();
        let bucket_width = bucket_width.max(1e-3);
        let bucket_height = bucket_height.max(1e-3);
        let cols = (bounds.width() / bucket_width).floor() as usize + 1;
        let rows = (bounds.height() / bucket_height).floor() as usize + 1;
        let mut index = Self {
            origin: Point::new(bounds.left, bounds.bottom),
            bucket_width,
            bucket_height,
            cols,
            rows,
            buckets: BTreeMap::new(),
        };
        for site in device.sites() {
            let (col, row) = index.cell_of(site.location());
            index
                .buckets
                .entry(site.site_type)
                .or_insert_with(|| vec![Vec::new(); cols * rows])[row * cols + col]
                .push(site.id);
        }
        index
    }

    fn cell_of(&self, p: Point) -> (usize, usize) {
        let col = ((p.x - self.origin.x) / self.bucket_width).floor().max(0.0) as usize;
        let row = ((p.y - self.origin.y) / self.bucket_height).floor().max(0.0) as usize;
        (col.min(self.cols - 1), row.min(self.rows - 1))
    }

    /// Available sites of the given types whose displacement
    /// `|dx| + y2x * |dy|` from `p` is below `radius`, nearest first, at most
    /// `max_count` of them.
    pub fn find_near(
        &self,
        device: &Device,
        site_types: &[SiteType],
        p: Point,
        radius: f64,
        max_count: usize,
        y2x: f64,
    ) -> Vec<SiteId> {
        let dy_limit = if y2x > 0.0 { radius / y2x } else { radius };
        let (col_lo, row_lo) = self.cell_of(Point::new(p.x - radius, p.y - dy_limit));
        let (col_hi, row_hi) = self.cell_of(Point::new(p.x + radius, p.y + dy_limit));

        let mut found: Vec<(f64, SiteId)> = Vec::new();
        for site_type in site_types {
            let Some(buckets) = self.buckets.get(site_type) else {
                continue;
            };
            for row in row_lo..=row_hi {
                for col in col_lo..=col_hi {
                    for &id in &buckets[row * self.cols + col] {
                        let site = device.site(id);
                        if !site.is_available() {
                            continue;
                        }
                        let d = site.location().displacement(p, y2x);
                        if d < radius {
                            found.push((d, id));
                        }
                    }
                }
            }
        }
        found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        found.truncate(max_count);
        found.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiplace_device::DeviceBuilder;

    fn device() -> Device {
        DeviceBuilder::new("grid")
            .column(0.0, SiteType::Dsp, 10)
            .column(5.0, SiteType::Dsp, 10)
            .column(2.0, SiteType::SliceL, 10)
            .build()
            .unwrap()
    }

    #[test]
    fn nearest_first_within_radius() {
        let device = device();
        let index = SiteIndex::new(&device, 2.0, 2.0);
        let found = index.find_near(&device, &[SiteType::Dsp], Point::new(0.2, 4.0), 2.0, 10, 1.0);
        let ys: Vec<f64> = found.iter().map(|&id| device.site(id).y).collect();
        assert_eq!(ys, vec![4.0, 3.0, 5.0]);
        assert!(found.iter().all(|&id| device.site(id).x == 0.0));
    }

    #[test]
    fn skips_mapped_sites_and_truncates() {
        let mut device = device();
        let index = SiteIndex::new(&device, 2.0, 2.0);
        let first = index.find_near(&device, &[SiteType::Dsp], Point::new(0.0, 4.0), 30.0, 1, 1.0)[0];
        device.set_mapped(first).unwrap();
        let again = index.find_near(&device, &[SiteType::Dsp], Point::new(0.0, 4.0), 30.0, 3, 1.0);
        assert_eq!(again.len(), 3);
        assert!(!again.contains(&first));
    }

    #[test]
    fn other_types_are_ignored() {
        let device = device();
        let index = SiteIndex::new(&device, 2.0, 2.0);
        let found = index.find_near(&device, &[SiteType::Bram], Point::new(0.0, 0.0), 100.0, 10, 1.0);
        assert!(found.is_empty());
    }
}
