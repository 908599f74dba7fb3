//! The `hiplace place` command: initial placement followed by global
//! placement, written out as a resumable JSON placement.

use std::collections::HashMap;
use std::error::Error;
use std::path::Path;

use hiplace_common::{Point, SiteId, UnitId};
use hiplace_diagnostics::DiagnosticSink;
use hiplace_model::PlacementModel;
use hiplace_place::{ClusterSummary, GlobalPlacementReport, GlobalPlacer, PseudoNetBookkeeping, TimingContext};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::inputs::{self, Inputs};
use crate::{render_diagnostics, GlobalArgs, PlaceArgs, ReportFormat};

/// Final location of one placement unit.
#[derive(Debug, Serialize, Deserialize)]
struct UnitPlacement {
    name: String,
    x: f64,
    y: f64,
    fixed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sites: Vec<SiteId>,
}

/// The JSON document written by `hiplace place`.
#[derive(Serialize)]
struct PlacementOutput<'a> {
    design: &'a str,
    device: &'a str,
    hpwl: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_placement: Option<ClusterSummary>,
    report: &'a GlobalPlacementReport,
    bookkeeping: PseudoNetBookkeeping,
    units: Vec<UnitPlacement>,
}

/// The subset of an earlier output a resumed run needs.
#[derive(Deserialize)]
struct ResumePoint {
    bookkeeping: PseudoNetBookkeeping,
    units: Vec<UnitPlacement>,
}

/// Runs placement and returns the process exit code.
pub fn run(args: &PlaceArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = inputs::load_config(global)?;
    let Inputs {
        config,
        mut device,
        mut model,
    } = inputs::load_inputs(&args.design, &args.device, config)?;

    let sink = DiagnosticSink::new();
    let mut placer = GlobalPlacer::new(&config)?;
    if let Some(path) = &args.timing {
        placer.set_timing(Some(TimingContext::load(path, &model, &sink)?));
    }

    let initial = match &args.resume {
        Some(path) => {
            let restored = resume(path, &mut model, &mut placer)?;
            info!("resumed {restored} units from {}", path.display());
            None
        }
        None => placer.cluster_placement(&mut model, &device),
    };

    let iterations = args.iterations.unwrap_or(config.global_placement_iterations);
    let result = placer.run(&mut model, &mut device, iterations, args.resume.is_some(), &sink);
    let diagnostics = sink.take_all();
    render_diagnostics(&diagnostics, args.format, global);

    // The sink already carries the broken invariant.
    let Ok(report) = result else {
        return Ok(1);
    };

    let output = PlacementOutput {
        design: &model.design().name,
        device: device.name(),
        hpwl: model.total_hpwl(),
        initial_placement: initial,
        report: &report,
        bookkeeping: placer.bookkeeping(),
        units: unit_placements(&model),
    };
    let json = serde_json::to_string_pretty(&output)?;
    match &args.output {
        Some(path) => std::fs::write(path, json + "\n")?,
        None if args.format == ReportFormat::Json => println!("{json}"),
        None => {}
    }

    if !global.quiet && args.format == ReportFormat::Text {
        let converged = match report.converged_by {
            Some(reason) => format!("converged ({reason})"),
            None => "stopped at the iteration limit".to_string(),
        };
        println!(
            "   Placed: {} units in {} iterations, {converged}, HPWL {:.1}",
            output.units.len(),
            report.iterations,
            output.hpwl
        );
    }

    let has_errors = diagnostics.iter().any(|d| d.severity.is_error());
    Ok(if has_errors { 1 } else { 0 })
}

fn unit_placements(model: &PlacementModel) -> Vec<UnitPlacement> {
    let legal = model.legal_plan();
    model
        .units()
        .iter()
        .map(|unit| UnitPlacement {
            name: unit.name.clone(),
            x: unit.x(),
            y: unit.y(),
            fixed: unit.is_fixed(),
            sites: legal.sites(unit.id).map(<[SiteId]>::to_vec).unwrap_or_default(),
        })
        .collect()
}

/// Moves units to the locations of an earlier run and restores the placer's
/// pseudo-net state. Returns the number of units restored.
fn resume(path: &Path, model: &mut PlacementModel, placer: &mut GlobalPlacer) -> Result<usize, Box<dyn Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read placement '{}': {e}", path.display()))?;
    let point: ResumePoint = serde_json::from_str(&content)
        .map_err(|e| format!("invalid placement '{}': {e}", path.display()))?;

    let by_name: HashMap<String, UnitId> = model.units().iter().map(|u| (u.name.clone(), u.id)).collect();
    let mut restored = 0;
    let mut unknown = 0;
    for record in &point.units {
        let Some(&id) = by_name.get(record.name.as_str()) else {
            unknown += 1;
            continue;
        };
        if model.unit(id).is_fixed() {
            continue;
        }
        model.set_anchor_location_and_forget(id, Point::new(record.x, record.y));
        if record.fixed {
            model.unit_mut(id).set_fixed(true);
        }
        restored += 1;
    }
    if unknown > 0 {
        warn!("{unknown} units in {} are not in the design", path.display());
    }
    placer.restore_bookkeeping(&point.bookkeeping);
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::tests::write_inputs;

    fn global() -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            verbose: false,
            color: false,
            config: None,
            overrides: vec!["GlobalPlacementIteration=20".to_string()],
        }
    }

    fn args(dir: &Path, output: &str) -> PlaceArgs {
        let (design, device) = write_inputs(dir);
        PlaceArgs {
            design,
            device,
            timing: None,
            output: Some(dir.join(output)),
            resume: None,
            iterations: None,
            format: ReportFormat::Text,
        }
    }

    #[test]
    fn place_writes_every_unit_inside_the_device() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), "out.json");
        assert_eq!(run(&args, &global()).unwrap(), 0);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("out.json")).unwrap()).unwrap();
        assert_eq!(written["design"], "counter");
        assert_eq!(written["device"], "tiny");
        let units = written["units"].as_array().unwrap();
        assert_eq!(units.len(), 25);
        for unit in units {
            let (x, y) = (unit["x"].as_f64().unwrap(), unit["y"].as_f64().unwrap());
            assert!((-2.0..=9.0).contains(&x), "x out of the device: {unit}");
            assert!((-2.0..=14.0).contains(&y), "y out of the device: {unit}");
        }
        assert!(written["report"]["iterations"].as_u64().unwrap() <= 20);
        assert!(written["bookkeeping"]["pseudo_net_weight"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn placement_can_be_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let first = args(dir.path(), "first.json");
        assert_eq!(run(&first, &global()).unwrap(), 0);

        let second = PlaceArgs {
            resume: Some(dir.path().join("first.json")),
            output: Some(dir.path().join("second.json")),
            iterations: Some(5),
            ..first
        };
        assert_eq!(run(&second, &global()).unwrap(), 0);
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("second.json")).unwrap()).unwrap();
        assert!(written.get("initial_placement").is_none());
        assert_eq!(written["units"].as_array().unwrap().len(), 25);
    }

    #[test]
    fn resume_from_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        let args = PlaceArgs {
            resume: Some(garbage),
            ..args(dir.path(), "out.json")
        };
        let err = run(&args, &global()).err().unwrap();
        assert!(err.to_string().contains("invalid placement"));
    }

    #[test]
    fn bad_override_fails_before_placing() {
        let dir = tempfile::tempdir().unwrap();
        let args = args(dir.path(), "out.json");
        let global = GlobalArgs {
            overrides: vec!["jobs=many".to_string()],
            ..global()
        };
        assert!(run(&args, &global).is_err());
        assert!(!dir.path().join("out.json").exists());
    }
}
