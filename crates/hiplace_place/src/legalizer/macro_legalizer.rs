//! Legalization of DSP, block RAM and carry macros onto their columns.

use super::rounds::MatchItem;
use super::{Legalizer, LegalizerCore, LegalizerParameters, PlannedUnit};
use hiplace_common::{PlaceResult, Point, UnitId};
use hiplace_device::{Device, SiteType};
use hiplace_diagnostics::DiagnosticSink;
use hiplace_model::{CellType, PlacementModel, PlacementUnit};

/// Share of a column's sites that column spreading aims to fill.
fn column_budget(site_type: SiteType) -> f64 {
    match site_type {
        SiteType::Dsp => 1.0,
        _ => 0.9,
    }
}

/// Legalizes every unit holding cells of the configured types.
///
/// Matching works per cell: each member of a handled type gets its own
/// site, and a macro's cost is the unit's HPWL change divided by its size.
/// Exact legalization stacks the handled members of a unit on consecutive
/// rows of one column.
#[derive(Debug)]
pub struct MacroLegalizer {
    core: LegalizerCore,
    cell_types: Vec<CellType>,
}

impl MacroLegalizer {
    /// Creates a legalizer for cells of `cell_types` onto sites of
    /// `site_types`, using `jobs` threads for matching.
    pub fn new(name: impl Into<String>, cell_types: Vec<CellType>, site_types: Vec<SiteType>, jobs: usize) -> Self {
        Self {
            core: LegalizerCore::new(name.into(), site_types, column_budget, jobs),
            cell_types,
        }
    }

    /// Logs progress at `info` instead of `debug`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.core.set_verbose(verbose);
        self
    }

    fn handles(&self, cell_type: CellType) -> bool {
        self.cell_types.contains(&cell_type)
    }

    fn plan_unit(&self, model: &PlacementModel, unit: &PlacementUnit) -> Option<PlannedUnit> {
        let share = unit.cell_count() as f64;
        let members: Vec<_> = unit.members().iter().filter(|m| self.handles(m.cell_type)).collect();
        let base = members
            .iter()
            .min_by(|a, b| a.offset.y.total_cmp(&b.offset.y).then(a.offset.x.total_cmp(&b.offset.x)))?;
        let items = members
            .iter()
            .map(|m| MatchItem {
                unit: unit.id,
                location: model.cell_location(m.cell),
                offset: m.offset,
                site_types: m.cell_type.site_types(),
                even_row: m.cell_type == CellType::Bram36,
                share,
                column: None,
            })
            .collect();
        Some(PlannedUnit {
            unit: unit.id,
            items,
            height: unit.site_span_of(|t| self.handles(t)),
            even_start: members.iter().any(|m| m.cell_type == CellType::Bram36),
            base_offset: base.offset,
        })
    }
}

impl Legalizer for MacroLegalizer {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn set_initial_parameters(&mut self, displacement_threshold: f64, max_candidates: usize, candidate_factor: Option<usize>) {
        self.core
            .set_initial_parameters(displacement_threshold, max_candidates, candidate_factor);
    }

    fn parameters(&self) -> LegalizerParameters {
        self.core.parameters()
    }

    fn legalize(
        &mut self,
        model: &mut PlacementModel,
        device: &mut Device,
        exact: bool,
        direct: bool,
        sink: &DiagnosticSink,
    ) -> PlaceResult<()> {
        let plan: Vec<PlannedUnit> = model
            .units()
            .iter()
            .filter(|u| !u.is_fixed() && !u.is_locked())
            .filter_map(|u| self.plan_unit(model, u))
            .collect();
        self.core.run(model, device, plan, exact, direct, sink)
    }

    fn rough_displacement(&self) -> f64 {
        self.core.rough_displacement()
    }

    fn exact_displacement(&self, model: &PlacementModel) -> f64 {
        self.core.exact_displacement(model)
    }

    fn reset_sites_mapped(&mut self, device: &mut Device) {
        self.core.reset_sites_mapped(device);
    }

    fn legalized_units(&self) -> &[UnitId] {
        self.core.units()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;
    use hiplace_common::SiteId;
    use hiplace_device::DeviceBuilder;
    use hiplace_model::{Design, ModelSettings};
    use std::collections::HashSet;

    fn dsp_legalizer() -> MacroLegalizer {
        MacroLegalizer::new("BRAM-DSP", vec![CellType::Dsp, CellType::Bram36, CellType::Bram18], vec![SiteType::Dsp, SiteType::Bram], 2)
    }

    fn add_dsp_chain(design: &mut Design, name: &str, len: usize) {
        let members = (0..len)
            .map(|i| {
                let cell = design.add_cell(format!("{name}/dsp{i}"), CellType::Dsp);
                (cell, Point::new(0.0, i as f64))
            })
            .collect();
        design.add_macro(name, None, members);
    }

    fn site_rows(device: &Device, sites: &[SiteId]) -> Vec<u32> {
        sites.iter().map(|&s| device.site(s).row).collect()
    }

    #[test]
    fn two_macros_share_one_five_site_column() {
        let mut device = DeviceBuilder::new("dsp").column(0.0, SiteType::Dsp, 5).build().unwrap();
        let mut design = Design::new("chains");
        add_dsp_chain(&mut design, "a", 3);
        add_dsp_chain(&mut design, "b", 2);
        let mut model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();
        model.set_anchor_location_and_forget(UnitId::from_index(0), Point::new(0.3, 0.2));
        model.set_anchor_location_and_forget(UnitId::from_index(1), Point::new(0.1, 2.6));
        model.sync_cell_locations();

        let sink = DiagnosticSink::new();
        let mut legalizer = dsp_legalizer();
        legalizer.legalize(&mut model, &mut device, true, false, &sink).unwrap();

        let mut used = HashSet::new();
        for unit in [UnitId::from_index(0), UnitId::from_index(1)] {
            let sites = model.legal_plan().sites(unit).unwrap();
            assert_eq!(sites.len(), model.unit(unit).cell_count());
            let rows = site_rows(&device, sites);
            assert!(rows.windows(2).all(|w| w[1] == w[0] + 1), "rows {rows:?} are not contiguous");
            let anchor = model.legal_plan().location(unit).unwrap();
            assert_eq!(anchor, device.site(sites[0]).location());
            for &site in sites {
                assert!(used.insert(site));
                assert!(device.site(site).is_mapped());
            }
        }
        assert_eq!(used.len(), 5);
        assert!(sink.diagnostics().is_empty());
        assert_eq!(legalizer.legalized_units().len(), 2);
    }

    #[test]
    fn tall_block_ram_starts_on_an_even_row() {
        let mut device = DeviceBuilder::new("bram").column(2.0, SiteType::Bram, 6).build().unwrap();
        let mut design = Design::new("rams");
        let big = design.add_cell("ram36", CellType::Bram36);
        design.add_cell("ram18", CellType::Bram18);
        let mut model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();
        model.set_anchor_location_and_forget(model.cell_unit(big), Point::new(2.0, 2.9));
        model.set_anchor_location_and_forget(UnitId::from_index(1), Point::new(2.0, 3.1));
        model.sync_cell_locations();

        let sink = DiagnosticSink::new();
        let mut legalizer = dsp_legalizer();
        legalizer.legalize(&mut model, &mut device, true, false, &sink).unwrap();

        let sites = model.legal_plan().sites(model.cell_unit(big)).unwrap();
        let rows = site_rows(&device, sites);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0] % 2, 0);
        assert_eq!(rows[1], rows[0] + 1);
        let other = model.legal_plan().sites(UnitId::from_index(1)).unwrap();
        assert!(!sites.contains(&other[0]));
    }

    #[test]
    fn blocked_column_keeps_matched_sites_and_warns() {
        let mut device = DeviceBuilder::new("dsp").column(0.0, SiteType::Dsp, 5).build().unwrap();
        let blocked = device.column_sites(SiteType::Dsp, 0)[2];
        device.set_occupied(blocked, true);
        let mut design = Design::new("chain");
        add_dsp_chain(&mut design, "a", 3);
        let mut model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();

        let sink = DiagnosticSink::new();
        let mut legalizer = dsp_legalizer();
        legalizer.legalize(&mut model, &mut device, true, false, &sink).unwrap();

        let codes: Vec<_> = sink.diagnostics().iter().map(|d| d.code).collect();
        assert!(codes.contains(&codes::COLUMN_INFEASIBLE));
        let sites = model.legal_plan().sites(UnitId::from_index(0)).unwrap();
        assert_eq!(sites.len(), 3);
        assert!(!sites.contains(&blocked));
    }

    #[test]
    fn surplus_macros_are_reported_and_sites_released() {
        let mut device = DeviceBuilder::new("dsp").column(0.0, SiteType::Dsp, 2).build().unwrap();
        let mut design = Design::new("dsps");
        for i in 0..3 {
            design.add_cell(format!("dsp{i}"), CellType::Dsp);
        }
        let mut model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();

        let sink = DiagnosticSink::new();
        let mut legalizer = dsp_legalizer();
        legalizer.legalize(&mut model, &mut device, false, false, &sink).unwrap();

        let codes: Vec<_> = sink.diagnostics().iter().map(|d| d.code).collect();
        assert!(codes.contains(&codes::UNMATCHED_UNITS));
        assert!(codes.contains(&codes::RELAXED_LEGALITY));
        assert_eq!(codes.iter().filter(|&&c| c == codes::RELAXED_LEGALITY).count(), 1);
        assert_eq!(device.mapped_count(), 2);
        assert!(legalizer.rough_displacement() < 1.0);

        legalizer.reset_sites_mapped(&mut device);
        assert_eq!(device.mapped_count(), 0);
    }

    #[test]
    fn exact_displacement_follows_the_units() {
        let mut device = DeviceBuilder::new("dsp").column(0.0, SiteType::Dsp, 4).build().unwrap();
        let mut design = Design::new("one");
        design.add_cell("dsp", CellType::Dsp);
        let mut model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();
        let unit = UnitId::from_index(0);
        model.set_anchor_location_and_forget(unit, Point::new(0.0, 1.0));
        model.sync_cell_locations();

        let sink = DiagnosticSink::new();
        let mut legalizer = dsp_legalizer();
        assert_eq!(legalizer.exact_displacement(&model), super::super::NO_DISPLACEMENT);
        legalizer.legalize(&mut model, &mut device, true, false, &sink).unwrap();
        let anchor = model.legal_plan().location(unit).unwrap();
        let expected = (anchor.y - 1.0).abs();
        assert!((legalizer.exact_displacement(&model) - expected).abs() < 1e-9);

        model.set_anchor_location_and_forget(unit, Point::new(anchor.x + 2.0, anchor.y));
        assert!((legalizer.exact_displacement(&model) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn direct_mode_uses_the_nearest_column() {
        let mut device = DeviceBuilder::new("dsp")
            .column(0.0, SiteType::Dsp, 3)
            .column(8.0, SiteType::Dsp, 3)
            .build()
            .unwrap();
        let mut design = Design::new("chain");
        add_dsp_chain(&mut design, "a", 2);
        let mut model = PlacementModel::new(design, &device, ModelSettings::default()).unwrap();
        let unit = UnitId::from_index(0);
        model.set_anchor_location_and_forget(unit, Point::new(7.0, 0.5));
        model.sync_cell_locations();

        let sink = DiagnosticSink::new();
        let mut legalizer = dsp_legalizer();
        legalizer.legalize(&mut model, &mut device, true, true, &sink).unwrap();
        let anchor = model.legal_plan().location(unit).unwrap();
        assert_eq!(anchor.x, 8.0);
    }
}
