//! The `hiplace check` command: resource demand of a design against the
//! supply of a device, per resource family.

use std::error::Error;

use hiplace_diagnostics::{Diagnostic, DiagnosticSink};
use hiplace_model::{FamilyUsage, ResourceFamily};
use hiplace_place::codes;
use serde::Serialize;

use crate::inputs;
use crate::{render_diagnostics, CheckArgs, GlobalArgs, ReportFormat};

#[derive(Serialize)]
struct UsageRow {
    family: ResourceFamily,
    demand: f64,
    supply: f64,
    utilization: f64,
}

impl From<FamilyUsage> for UsageRow {
    fn from(usage: FamilyUsage) -> Self {
        Self {
            family: usage.family,
            demand: usage.demand,
            supply: usage.supply,
            utilization: utilization(usage.demand, usage.supply),
        }
    }
}

fn utilization(demand: f64, supply: f64) -> f64 {
    if supply > 0.0 {
        demand / supply
    } else if demand > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Emits one shortage warning per family whose demand exceeds its supply.
fn check_usage(rows: &[UsageRow], sink: &DiagnosticSink) {
    for row in rows.iter().filter(|r| r.demand > r.supply) {
        sink.emit(
            Diagnostic::warning(
                codes::RESOURCE_SHORTAGE,
                format!(
                    "design needs {:.1} {} slots but the device offers {:.1}",
                    row.demand, row.family, row.supply
                ),
            )
            .with_origin("resource check")
            .with_help("legalization will leave some units of this family unplaced"),
        );
    }
}

/// Runs the check and returns the process exit code.
pub fn run(args: &CheckArgs, global: &GlobalArgs) -> Result<i32, Box<dyn Error>> {
    let config = inputs::load_config(global)?;
    let inputs = inputs::load_inputs(&args.design, &args.device, config)?;
    let rows: Vec<UsageRow> = inputs.model.family_usage().into_iter().map(UsageRow::from).collect();

    let sink = DiagnosticSink::new();
    check_usage(&rows, &sink);

    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        ReportFormat::Text if !global.quiet => {
            println!("   {:<8} {:>10} {:>10} {:>7}", "family", "demand", "supply", "util");
            for row in &rows {
                println!(
                    "   {:<8} {:>10.1} {:>10.1} {:>6.1}%",
                    row.family.to_string(),
                    row.demand,
                    row.supply,
                    row.utilization * 100.0
                );
            }
        }
        ReportFormat::Text => {}
    }

    let has_errors = sink.has_errors();
    render_diagnostics(&sink.take_all(), args.format, global);
    Ok(if has_errors { 1 } else { 0 })
}
