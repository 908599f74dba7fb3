//! Legalization of whole units onto single slice sites.

use super::rounds::MatchItem;
use super::{Legalizer, LegalizerCore, LegalizerParameters, PlannedUnit};
use hiplace_common::{PlaceResult, Point, UnitId};
use hiplace_device::{Device, SiteType};
use hiplace_diagnostics::DiagnosticSink;
use hiplace_model::{CellType, MacroKind, PlacementModel, PlacementUnit};

fn single(site_type: SiteType) -> &'static [SiteType] {
    match site_type {
        SiteType::SliceL => &[SiteType::SliceL],
        SiteType::SliceM => &[SiteType::SliceM],
        SiteType::Dsp => &[SiteType::Dsp],
        SiteType::Bram => &[SiteType::Bram],
        SiteType::Io => &[SiteType::Io],
    }
}

/// Legalizes units that must occupy one slice of a given type.
///
/// A SLICEM legalizer takes every unit holding distributed RAM; a SLICEL
/// legalizer takes generic macros of slice logic. Each unit is matched as a
/// whole with its anchor on the site.
#[derive(Debug)]
pub struct ClbLegalizer {
    core: LegalizerCore,
    site_type: SiteType,
}

impl ClbLegalizer {
    /// Creates a legalizer for units of `site_type` slices.
    pub fn new(name: impl Into<String>, site_type: SiteType, jobs: usize) -> Self {
        Self {
            core: LegalizerCore::new(name.into(), vec![site_type], |_| 1.0, jobs),
            site_type,
        }
    }

    /// Logs progress at `info` instead of `debug`.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.core.set_verbose(verbose);
        self
    }

    fn handles(&self, unit: &PlacementUnit) -> bool {
        let lutram = unit.has_cell_type(|t| t == CellType::Lutram);
        match self.site_type {
            SiteType::SliceM => lutram,
            SiteType::SliceL => {
                !lutram
                    && unit.macro_kind() == Some(MacroKind::Generic)
                    && unit.members().iter().all(|m| m.cell_type.site_types().contains(&SiteType::SliceL))
            }
            _ => false,
        }
    }
}

impl Legalizer for ClbLegalizer {
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
        let site_types = single(self.site_type);
        let plan: Vec<PlannedUnit> = model
            .units()
            .iter()
            .filter(|u| !u.is_fixed() && !u.is_locked() && self.handles(u))
            .map(|u| PlannedUnit {
                unit: u.id,
                items: vec![MatchItem {
                    unit: u.id,
                    location: u.location(),
                    offset: Point::new(0.0, 0.0),
                    site_types,
                    even_row: false,
                    share: 1.0,
                    column: None,
                }],
                height: 1,
                even_start: false,
                base_offset: Point::new(0.0, 0.0),
            })
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
