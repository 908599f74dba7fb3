//! The placement model: units, nets and bins over one device.
//!
//! The model owns the design and every piece of mutable placement state.
//! Phases borrow it one at a time; a unit's member cell locations are kept in
//! sync with its anchor by every mutating method here, while bin membership
//! is refreshed either incrementally (spreading) or in bulk through
//! [`update_element_bin_grid`](PlacementModel::update_element_bin_grid).

use crate::bins::BinGrid;
use crate::design::{CellType, Design, MacroKind};
use crate::family::ResourceFamily;
use crate::legal::LegalPlan;
use crate::net::{NetPin, PlacementNet};
use crate::sites::SiteIndex;
use crate::unit::{PlacementUnit, UnitKind, UnitMember};
use hiplace_common::{CellId, InternalError, PlaceResult, Point, Rect, SiteId, UnitId};
use hiplace_device::{Device, SiteType};
use log::debug;

/// Margin kept between member cells and the device boundary.
const AREA_MARGIN: f64 = 1e-3;
/// Distance within which a fixed cell sits on a site.
const SITE_EPS: f64 = 1e-6;

/// Geometry settings of a model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelSettings {
    /// Bin width in columns.
    pub bin_width: f64,
    /// Bin height in rows.
    pub bin_height: f64,
    /// Weight of vertical distance relative to horizontal.
    pub y2x: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            bin_width: 2.0,
            bin_height: 2.0,
            y2x: 1.0,
        }
    }
}

/// Resource demand against supply for one family.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FamilyUsage {
    /// The family.
    pub family: ResourceFamily,
    /// Summed cell occupation.
    pub demand: f64,
    /// Summed site capacity.
    pub supply: f64,
}

/// Mutable placement state of one design on one device.
#[derive(Clone, Debug)]
pub struct PlacementModel {
    design: Design,
    units: Vec<PlacementUnit>,
    cell_unit: Vec<UnitId>,
    cell_offset: Vec<Point>,
    cell_locations: Vec<Point>,
    cell_occupation: Vec<f64>,
    cell_bin: Vec<Option<usize>>,
    nets: Vec<PlacementNet>,
    unit_nets: Vec<Vec<usize>>,
    bin_grids: Vec<BinGrid>,
    site_index: SiteIndex,
    bounds: Rect,
    y2x: f64,
    progress: f64,
    legal: LegalPlan,
    user_clusters: Vec<Vec<UnitId>>,
    unit_clock_region: Vec<Option<(u32, u32)>>,
}

impl PlacementModel {
    /// Builds the model: one unit per macro declaration, one per remaining
    /// cell, a net per design net and a bin grid per resource family.
    ///
    /// Fails if a cell appears in two macros or a fixed location is not
    /// finite.
    pub fn new(design: Design, device: &Device, settings: ModelSettings) -> PlaceResult<Self> {
        let bounds = device.bounds();
        let center = bounds.center();
        let cell_count = design.cell_count();
        let mut owner: Vec<Option<UnitId>> = vec![None; cell_count];
        let mut cell_offset = vec![Point::default(); cell_count];
        let mut units: Vec<PlacementUnit> = Vec::new();

        for spec in design.macros() {
            let id = UnitId::from_index(units.len());
            let mut members = Vec::with_capacity(spec.members.len());
            for &(cell, offset) in &spec.members {
                if let Some(other) = owner[cell.index()] {
                    return Err(InternalError::new(format!(
                        "cell '{}' belongs to both unit {other} and macro '{}'",
                        design.cell(cell).name,
                        spec.name
                    )));
                }
                owner[cell.index()] = Some(id);
                cell_offset[cell.index()] = offset;
                members.push(UnitMember {
                    cell,
                    offset,
                    cell_type: design.cell(cell).cell_type,
                });
            }
            if members.is_empty() {
                return Err(InternalError::new(format!("macro '{}' has no members", spec.name)));
            }
            let kind = spec.kind.unwrap_or_else(|| derive_macro_kind(&members));
            // A fixed member cell pins the whole macro.
            let fixed_at = spec.fixed_at.or_else(|| {
                members.iter().find_map(|m| {
                    design
                        .cell(m.cell)
                        .fixed_at
                        .map(|p| Point::new(p.x - m.offset.x, p.y - m.offset.y))
                })
            });
            let mut unit = PlacementUnit::new(
                id,
                spec.name.clone(),
                UnitKind::Macro { kind, members },
                fixed_at.unwrap_or(center),
            );
            if let Some(at) = fixed_at {
                check_finite(&spec.name, at)?;
                unit.set_fixed(true);
                unit.set_locked(true);
            }
            units.push(unit);
        }

        for cell in design.cells() {
            if owner[cell.id.index()].is_some() {
                continue;
            }
            let id = UnitId::from_index(units.len());
            owner[cell.id.index()] = Some(id);
            let member = UnitMember {
                cell: cell.id,
                offset: Point::default(),
                cell_type: cell.cell_type,
            };
            let mut unit = PlacementUnit::new(
                id,
                cell.name.clone(),
                UnitKind::Unpacked(member),
                cell.fixed_at.unwrap_or(center),
            );
            if let Some(at) = cell.fixed_at {
                check_finite(&cell.name, at)?;
                unit.set_fixed(true);
                unit.set_locked(true);
            }
            units.push(unit);
        }

        let cell_unit: Vec<UnitId> = owner.into_iter().flatten().collect();
        if cell_unit.len() != cell_count {
            return Err(InternalError::new("a design cell was left without a placement unit"));
        }

        let mut nets = Vec::with_capacity(design.net_count());
        let mut unit_nets: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
        for (index, net) in design.nets().iter().enumerate() {
            let pins: Vec<NetPin> = net
                .pins
                .iter()
                .map(|&pin_id| {
                    let pin = design.pin(pin_id);
                    let offset = cell_offset[pin.cell.index()];
                    NetPin {
                        unit: cell_unit[pin.cell.index()],
                        cell: pin.cell,
                        offset: Point::new(offset.x + pin.offset.x, offset.y + pin.offset.y),
                        is_driver: pin.is_driver,
                    }
                })
                .collect();
            if !net.is_power {
                for pin in &pins {
                    let list = &mut unit_nets[pin.unit.index()];
                    if list.last() != Some(&index) {
                        list.push(index);
                    }
                }
            }
            nets.push(PlacementNet {
                id: net.id,
                pins,
                is_power: net.is_power,
                weight: net.weight,
            });
        }
        for (unit, list) in units.iter_mut().zip(unit_nets.iter_mut()) {
            list.dedup();
            unit.set_net_count(list.len());
        }

        let mut bin_grids = Vec::with_capacity(ResourceFamily::ALL.len());
        for family in ResourceFamily::ALL {
            let mut grid = BinGrid::new(family, bounds, settings.bin_width, settings.bin_height)?;
            for site in device.sites() {
                let amount = family.capacity_per_site(site.site_type);
                if amount > 0.0 {
                    let index = grid.locate(site.location());
                    grid.bin_mut(index).add_capacity(amount)?;
                }
            }
            bin_grids.push(grid);
        }

        let unit_clock_region = units
            .iter()
            .map(|u| u.cells().find_map(|c| design.cell(c).clock_region))
            .collect();
        let cell_occupation = design
            .cells()
            .iter()
            .map(|c| ResourceFamily::default_occupation(c.cell_type))
            .collect();

        debug!(
            "placement model for '{}': {} cells, {} units, {} nets",
            design.name,
            cell_count,
            units.len(),
            nets.len()
        );

        let mut model = Self {
            site_index: SiteIndex::new(device, settings.bin_width, settings.bin_height),
            design,
            units,
            cell_unit,
            cell_offset,
            cell_locations: vec![Point::default(); cell_count],
            cell_occupation,
            cell_bin: vec![None; cell_count],
            nets,
            unit_nets,
            bin_grids,
            bounds,
            y2x: settings.y2x,
            progress: 0.0,
            legal: LegalPlan::default(),
            user_clusters: Vec::new(),
            unit_clock_region,
        };
        model.sync_cell_locations();
        model.update_element_bin_grid();
        Ok(model)
    }

    /// The design being placed.
    pub fn design(&self) -> &Design {
        &self.design
    }

    /// All units, indexed by [`UnitId`].
    pub fn units(&self) -> &[PlacementUnit] {
        &self.units
    }

    /// One unit.
    pub fn unit(&self, id: UnitId) -> &PlacementUnit {
        &self.units[id.index()]
    }

    /// One unit, mutable. Moving it through this handle leaves member cell
    /// locations stale until [`sync_cell_locations`](Self::sync_cell_locations).
    pub fn unit_mut(&mut self, id: UnitId) -> &mut PlacementUnit {
        &mut self.units[id.index()]
    }

    /// Unit owning a cell.
    pub fn cell_unit(&self, cell: CellId) -> UnitId {
        self.cell_unit[cell.index()]
    }

    /// Offset of a cell from its unit anchor.
    pub fn cell_offset(&self, cell: CellId) -> Point {
        self.cell_offset[cell.index()]
    }

    /// Current location of one cell.
    pub fn cell_location(&self, cell: CellId) -> Point {
        self.cell_locations[cell.index()]
    }

    /// Current locations of all cells, indexed by [`CellId`].
    pub fn cell_locations(&self) -> &[Point] {
        &self.cell_locations
    }

    /// Bin utilization contributed by a cell.
    pub fn cell_occupation(&self, cell: CellId) -> f64 {
        self.cell_occupation[cell.index()]
    }

    /// Family of the bins a cell occupies.
    pub fn cell_family(&self, cell: CellId) -> Option<ResourceFamily> {
        ResourceFamily::of(self.design.cell(cell).cell_type)
    }

    /// All nets, indexed like the design nets.
    pub fn nets(&self) -> &[PlacementNet] {
        &self.nets
    }

    /// Indices of the non-power nets touching a unit.
    pub fn unit_nets(&self, unit: UnitId) -> &[usize] {
        &self.unit_nets[unit.index()]
    }

    /// The legal placement area.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Weight of vertical distance relative to horizontal.
    pub fn y2x(&self) -> f64 {
        self.y2x
    }

    /// Global placement progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Updates the placement progress, clamped to `[0, 1]`.
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = if progress.is_finite() { progress.clamp(0.0, 1.0) } else { 0.0 };
    }

    /// Recomputes every cell location from its unit anchor.
    pub fn sync_cell_locations(&mut self) {
        for unit in &self.units {
            let anchor = unit.location();
            for member in unit.members() {
                self.cell_locations[member.cell.index()] =
                    Point::new(anchor.x + member.offset.x, anchor.y + member.offset.y);
            }
        }
    }

    fn sync_unit_cells(&mut self, id: UnitId) {
        let unit = &self.units[id.index()];
        let anchor = unit.location();
        for member in unit.members() {
            self.cell_locations[member.cell.index()] =
                Point::new(anchor.x + member.offset.x, anchor.y + member.offset.y);
        }
    }

    /// Moves a unit anchor, remembering the previous one.
    pub fn set_anchor_location(&mut self, id: UnitId, p: Point) {
        self.units[id.index()].set_anchor_location(p);
        self.sync_unit_cells(id);
    }

    /// Moves a unit anchor and forgets the previous one.
    pub fn set_anchor_location_and_forget(&mut self, id: UnitId, p: Point) {
        self.units[id.index()].set_anchor_location_and_forget(p);
        self.sync_unit_cells(id);
    }

    /// Moves a unit to a spread location under `forget`, keeping member
    /// cells and their bins in sync. Returns the applied location.
    pub fn set_spread_location(&mut self, id: UnitId, p: Point, forget: f64) -> PlaceResult<Point> {
        let applied = self.units[id.index()].set_spread_location(p, forget)?;
        self.sync_unit_cells(id);
        let cells: Vec<CellId> = self.units[id.index()].cells().collect();
        for cell in cells {
            self.move_cell_bin(cell)?;
        }
        Ok(applied)
    }

    /// Records the current anchor of every unit as its spread location.
    pub fn record_spread_locations(&mut self) {
        for unit in &mut self.units {
            unit.record_spread_location();
        }
    }

    fn member_extent(&self, id: UnitId) -> Rect {
        let mut extent = Rect::empty();
        for member in self.units[id.index()].members() {
            extent.include(member.offset);
        }
        extent
    }

    /// Returns `true` if every member cell of the unit anchored at `p` lies
    /// inside the placement area.
    pub fn is_legal_location(&self, id: UnitId, p: Point) -> bool {
        self.units[id.index()]
            .members()
            .iter()
            .all(|m| self.bounds.contains(Point::new(p.x + m.offset.x, p.y + m.offset.y)))
    }

    /// Closest anchor to `p` that keeps every member cell inside the area.
    /// Units larger than the area are centered on it.
    pub fn legalize_xy_in_area(&self, id: UnitId, p: Point) -> Point {
        let extent = self.member_extent(id);
        let clamp = |v: f64, lo: f64, hi: f64| {
            if lo > hi {
                (lo + hi) / 2.0
            } else {
                v.clamp(lo, hi)
            }
        };
        let x = clamp(
            p.x,
            self.bounds.left - extent.left + AREA_MARGIN,
            self.bounds.right - extent.right - AREA_MARGIN,
        );
        let y = clamp(
            p.y,
            self.bounds.bottom - extent.bottom + AREA_MARGIN,
            self.bounds.top - extent.top - AREA_MARGIN,
        );
        Point::new(x, y)
    }

    /// Marks the device sites under every fixed cell as occupied, so no
    /// legalizer offers them to movable units. A cell spanning several site
    /// rows blocks all of them. Returns the number of sites marked.
    pub fn occupy_fixed_sites(&self, device: &mut Device) -> usize {
        let mut blocked = Vec::new();
        for unit in self.units.iter().filter(|u| u.is_fixed()) {
            for member in unit.members() {
                let at = self.cell_location(member.cell);
                for &site_type in member.cell_type.site_types() {
                    let Some(col) = device
                        .column_positions(site_type)
                        .iter()
                        .position(|&x| (x - at.x).abs() < SITE_EPS)
                    else {
                        continue;
                    };
                    let column = device.column_sites(site_type, col);
                    if let Some(row) = column.iter().position(|&s| (device.site(s).y - at.y).abs() < SITE_EPS) {
                        let span = member.cell_type.site_span().min(column.len() - row);
                        blocked.extend_from_slice(&column[row..row + span]);
                    }
                }
            }
        }
        blocked.sort_unstable();
        blocked.dedup();
        for &site in &blocked {
            device.set_occupied(site, true);
        }
        blocked.len()
    }

    /// The bin grid of a family.
    pub fn bin_grid(&self, family: ResourceFamily) -> &BinGrid {
        &self.bin_grids[family.index()]
    }

    /// The bin grid of a family, mutable.
    pub fn bin_grid_mut(&mut self, family: ResourceFamily) -> &mut BinGrid {
        &mut self.bin_grids[family.index()]
    }

    /// Bin a cell is recorded in.
    pub fn cell_bin(&self, cell: CellId) -> Option<usize> {
        self.cell_bin[cell.index()]
    }

    /// Rebuilds bin membership of every cell from current locations, keeping
    /// shrink ratios and overflow counters.
    pub fn update_element_bin_grid(&mut self) {
        for grid in &mut self.bin_grids {
            grid.clear_cells();
        }
        for cell in self.design.cells() {
            let index = cell.id.index();
            self.cell_bin[index] = ResourceFamily::of(cell.cell_type).map(|family| {
                let grid = &mut self.bin_grids[family.index()];
                let bin = grid.locate(self.cell_locations[index]);
                grid.bin_mut(bin).add_cell(cell.id, self.cell_occupation[index]);
                bin
            });
        }
    }

    /// Moves one cell to the bin matching its current location.
    pub fn move_cell_bin(&mut self, cell: CellId) -> PlaceResult<()> {
        let Some(family) = self.cell_family(cell) else {
            return Ok(());
        };
        let index = cell.index();
        let grid = &mut self.bin_grids[family.index()];
        let target = grid.locate(self.cell_locations[index]);
        let occupation = self.cell_occupation[index];
        match self.cell_bin[index] {
            Some(current) if current == target => return Ok(()),
            Some(current) => grid.bin_mut(current).remove_cell(cell, occupation)?,
            None => {}
        }
        grid.bin_mut(target).add_cell(cell, occupation);
        self.cell_bin[index] = Some(target);
        Ok(())
    }

    /// Available sites of the given types near `p`, nearest first.
    pub fn find_neighbor_sites(
        &self,
        device: &Device,
        site_types: &[SiteType],
        p: Point,
        radius: f64,
        max_count: usize,
    ) -> Vec<SiteId> {
        self.site_index.find_near(device, site_types, p, radius, max_count, self.y2x)
    }

    /// Total HPWL over non-power nets at the current locations.
    pub fn total_hpwl(&self) -> f64 {
        self.nets
            .iter()
            .filter(|n| !n.is_power)
            .map(|n| n.hpwl(&self.units, self.y2x))
            .sum()
    }

    /// HPWL change of the nets of `unit` if it moved to `to`, ignoring nets
    /// with more than `max_pins` pins.
    pub fn hpwl_change(&self, unit: UnitId, to: Point, max_pins: usize) -> f64 {
        self.unit_nets[unit.index()]
            .iter()
            .map(|&i| &self.nets[i])
            .filter(|net| net.pins.len() <= max_pins)
            .map(|net| net.hpwl_with_unit_at(&self.units, unit, to, self.y2x) - net.hpwl(&self.units, self.y2x))
            .sum()
    }

    /// Legalization results.
    pub fn legal_plan(&self) -> &LegalPlan {
        &self.legal
    }

    /// Legalization results, mutable.
    pub fn legal_plan_mut(&mut self) -> &mut LegalPlan {
        &mut self.legal
    }

    /// User-defined clusters.
    pub fn user_clusters(&self) -> &[Vec<UnitId>] {
        &self.user_clusters
    }

    /// Replaces the user clusters with clusters given as cells; each becomes
    /// the set of distinct units owning those cells.
    pub fn set_user_clusters(&mut self, clusters: Vec<Vec<CellId>>) {
        self.user_clusters = clusters
            .into_iter()
            .map(|cells| {
                let mut units: Vec<UnitId> = cells.into_iter().map(|c| self.cell_unit(c)).collect();
                units.sort_unstable();
                units.dedup();
                units
            })
            .filter(|units| !units.is_empty())
            .collect();
    }

    /// Clock region `(col, row)` a unit is constrained to.
    pub fn unit_clock_region(&self, unit: UnitId) -> Option<(u32, u32)> {
        self.unit_clock_region[unit.index()]
    }

    /// Demand and supply of every family.
    pub fn family_usage(&self) -> Vec<FamilyUsage> {
        ResourceFamily::ALL
            .iter()
            .map(|&family| FamilyUsage {
                family,
                demand: self
                    .design
                    .cells()
                    .iter()
                    .filter(|c| ResourceFamily::of(c.cell_type) == Some(family))
                    .map(|c| self.cell_occupation[c.id.index()])
                    .sum(),
                supply: self.bin_grids[family.index()].total_capacity(),
            })
            .collect()
    }
}

fn derive_macro_kind(members: &[UnitMember]) -> MacroKind {
    let has = |pred: fn(CellType) -> bool| members.iter().any(|m| pred(m.cell_type));
    if has(|t| t == CellType::Carry) {
        MacroKind::Carry
    } else if has(CellType::is_bram) {
        MacroKind::Bram
    } else if has(|t| t == CellType::Dsp) {
        MacroKind::Dsp
    } else if has(|t| t == CellType::Lutram) {
        MacroKind::Lutram
    } else {
        MacroKind::Generic
    }
}

fn check_finite(name: &str, p: Point) -> PlaceResult<()> {
    if p.is_finite() {
        Ok(())
    } else {
        Err(InternalError::new(format!("'{name}' is fixed at a non-finite location")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiplace_device::DeviceBuilder;

    fn device() -> Device {
        DeviceBuilder::new("small")
            .column(0.0, SiteType::SliceL, 8)
            .column(1.0, SiteType::SliceM, 8)
            .column(2.0, SiteType::SliceL, 8)
            .column(3.0, SiteType::Bram, 8)
            .clock_regions(1, 2)
            .build()
            .unwrap()
    }

    fn design() -> Design {
        let mut design = Design::new("toy");
        let a = design.add_cell("a", CellType::Lut);
        let b = design.add_cell("b", CellType::Ff);
        let c0 = design.add_cell("c0", CellType::Carry);
        let c1 = design.add_cell("c1", CellType::Carry);
        let ram = design.add_cell("ram", CellType::Bram36);
        design.fix_cell(ram, Point::new(3.0, 2.0));
        design.constrain_to_clock_region(b, 0, 1);
        design.add_macro("chain", None, vec![(c0, Point::new(0.0, 0.0)), (c1, Point::new(0.0, 1.0))]);
        let n0 = design.add_net("n0");
        design.connect(n0, a, Point::default(), true);
        design.connect(n0, b, Point::default(), false);
        design.connect(n0, c1, Point::default(), false);
        let n1 = design.add_net("n1");
        design.connect(n1, c0, Point::default(), true);
        design.connect(n1, a, Point::default(), false);
        let gnd = design.add_net("gnd");
        design.set_power(gnd, true);
        design.connect(gnd, a, Point::default(), false);
        design.connect(gnd, ram, Point::default(), false);
        design
    }

    fn model() -> PlacementModel {
        PlacementModel::new(design(), &device(), ModelSettings::default()).unwrap()
    }

    #[test]
    fn every_cell_has_one_unit() {
        let model = model();
        assert_eq!(model.units().len(), 4);
        let chain = &model.units()[0];
        assert_eq!(chain.macro_kind(), Some(MacroKind::Carry));
        assert_eq!(model.cell_unit(CellId::from_raw(3)), chain.id);
        assert_eq!(model.cell_offset(CellId::from_raw(3)), Point::new(0.0, 1.0));
        for cell in model.design().cells() {
            let unit = model.unit(model.cell_unit(cell.id));
            assert!(unit.cells().any(|c| c == cell.id));
        }
    }

    #[test]
    fn overlapping_macros_rejected() {
        let mut design = design();
        design.add_macro("again", None, vec![(CellId::from_raw(2), Point::default())]);
        assert!(PlacementModel::new(design, &device(), ModelSettings::default()).is_err());
    }

    #[test]
    fn fixed_cells_are_locked_in_place() {
        let model = model();
        let ram = model.unit(model.cell_unit(CellId::from_raw(4)));
        assert!(ram.is_fixed() && ram.is_locked());
        assert_eq!(ram.location(), Point::new(3.0, 2.0));
        let lut = model.unit(model.cell_unit(CellId::from_raw(0)));
        assert_eq!(lut.location(), model.bounds().center());
    }

    #[test]
    fn fixed_cells_block_their_sites() {
        let mut device = device();
        let model = PlacementModel::new(design(), &device, ModelSettings::default()).unwrap();
        assert_eq!(model.occupy_fixed_sites(&mut device), 2);
        let brams = device.column_sites(SiteType::Bram, 0);
        let available: Vec<bool> = brams.iter().map(|&s| device.site(s).is_available()).collect();
        assert_eq!(available, vec![true, true, false, false, true, true, true, true]);
    }

    #[test]
    fn net_counts_skip_power_nets() {
        let model = model();
        let lut = model.cell_unit(CellId::from_raw(0));
        assert_eq!(model.unit(lut).net_count(), 2);
        let ram = model.cell_unit(CellId::from_raw(4));
        assert_eq!(model.unit(ram).net_count(), 0);
        let chain = model.cell_unit(CellId::from_raw(2));
        assert_eq!(model.unit_nets(chain), &[0, 1]);
    }

    #[test]
    fn bins_hold_site_capacity_and_cells() {
        let model = model();
        let lut = model.bin_grid(ResourceFamily::Lut);
        assert_eq!(lut.total_capacity(), 3.0 * 8.0 * 8.0);
        assert_eq!(model.bin_grid(ResourceFamily::Bram).total_capacity(), 8.0);
        assert_eq!(lut.total_utilization(), 1.0);
        assert_eq!(model.bin_grid(ResourceFamily::Bram).total_utilization(), 2.0);
        let usage = model.family_usage();
        assert_eq!(usage[ResourceFamily::Carry.index()].demand, 2.0);
    }

    #[test]
    fn anchor_moves_carry_member_cells() {
        let mut model = model();
        let chain = model.cell_unit(CellId::from_raw(2));
        model.set_anchor_location(chain, Point::new(1.0, 4.0));
        assert_eq!(model.cell_location(CellId::from_raw(3)), Point::new(1.0, 5.0));
        assert_eq!(model.unit(chain).last_location(), model.bounds().center());
    }

    #[test]
    fn spreading_moves_cells_between_bins() {
        let mut model = model();
        let lut = model.cell_unit(CellId::from_raw(0));
        let before = model.cell_bin(CellId::from_raw(0)).unwrap();
        model.set_spread_location(lut, Point::new(0.0, 0.0), 1.0).unwrap();
        let after = model.cell_bin(CellId::from_raw(0)).unwrap();
        assert_ne!(before, after);
        let grid = model.bin_grid(ResourceFamily::Lut);
        assert!(grid.bin(before).cells().is_empty());
        assert_eq!(grid.bin(after).cells(), &[CellId::from_raw(0)]);
    }

    #[test]
    fn legalize_keeps_macro_members_inside() {
        let model = model();
        let chain = model.cell_unit(CellId::from_raw(2));
        let p = model.legalize_xy_in_area(chain, Point::new(-4.0, 10.0));
        assert!(model.is_legal_location(chain, p));
        assert!((p.y - (7.0 - 1.0)).abs() < 0.01);
        assert!(!model.is_legal_location(chain, Point::new(0.0, 7.0)));
    }

    #[test]
    fn hpwl_change_previews_a_move() {
        let mut model = model();
        let a = model.cell_unit(CellId::from_raw(0));
        let b = model.cell_unit(CellId::from_raw(1));
        let chain = model.cell_unit(CellId::from_raw(2));
        model.set_anchor_location(a, Point::new(0.0, 0.0));
        model.set_anchor_location(b, Point::new(2.0, 0.0));
        model.set_anchor_location(chain, Point::new(0.0, 0.0));
        // n0: a(0,0) b(2,0) c1(0,1) -> 3; n1: c0(0,0) a(0,0) -> 0
        assert_eq!(model.total_hpwl(), 3.0);
        assert_eq!(model.hpwl_change(b, Point::new(0.0, 0.0), 1000), -2.0);
        assert_eq!(model.hpwl_change(b, Point::new(0.0, 0.0), 2), 0.0);
    }

    #[test]
    fn user_clusters_collapse_to_units() {
        let mut model = model();
        model.set_user_clusters(vec![
            vec![CellId::from_raw(2), CellId::from_raw(3), CellId::from_raw(0)],
            vec![],
        ]);
        assert_eq!(model.user_clusters().len(), 1);
        assert_eq!(model.user_clusters()[0].len(), 2);
        let b = model.cell_unit(CellId::from_raw(1));
        assert_eq!(model.unit_clock_region(b), Some((0, 1)));
    }
}
