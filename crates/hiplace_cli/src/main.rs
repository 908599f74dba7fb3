//! hiplace CLI: the command-line front end of the hiplace global placer.
//!
//! Provides `hiplace place` to run initial and global placement on a design
//! and `hiplace check` to compare a design's resource demand against a
//! device before placing it.

#![warn(missing_docs)]

mod check;
mod inputs;
mod place;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use hiplace_diagnostics::{Diagnostic, DiagnosticRenderer, JsonRenderer, Severity, TerminalRenderer};
use log::LevelFilter;

/// hiplace: analytical global placement for FPGAs.
#[derive(Parser, Debug)]
#[command(name = "hiplace", version, about = "FPGA global placer")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (info-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output.
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Path to a placer configuration file (`.toml` or `.json`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override one configuration option, e.g. `--set jobs=8`.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run initial and global placement.
    Place(PlaceArgs),
    /// Report resource demand against device supply.
    Check(CheckArgs),
}

/// Arguments for the `hiplace place` subcommand.
#[derive(Parser, Debug)]
pub struct PlaceArgs {
    /// Design description (JSON).
    #[arg(long)]
    pub design: PathBuf,

    /// Device description (JSON).
    #[arg(long)]
    pub device: PathBuf,

    /// Per-net timing data (JSON) enabling timing-driven pulls.
    #[arg(long)]
    pub timing: Option<PathBuf>,

    /// Where to write the placement (JSON). Printed to stdout in JSON
    /// format when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Continue from a placement written by an earlier run.
    #[arg(long)]
    pub resume: Option<PathBuf>,

    /// Global placement iterations (default: `GlobalPlacementIteration`).
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Output format for diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `hiplace check` subcommand.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Design description (JSON).
    #[arg(long)]
    pub design: PathBuf,

    /// Device description (JSON).
    #[arg(long)]
    pub device: PathBuf,

    /// Output format for the report and diagnostics.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Controls whether colored output is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Detect from terminal capabilities.
    Auto,
    /// Always produce colored output.
    Always,
    /// Never produce colored output.
    Never,
}

/// Diagnostic output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose information.
    pub verbose: bool,
    /// Whether to use colored output.
    pub color: bool,
    /// Optional path to a configuration file.
    pub config: Option<PathBuf>,
    /// `KEY=VALUE` option overrides.
    pub overrides: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let color = match cli.color {
        ColorChoice::Auto => std::io::stderr().is_terminal(),
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };
    env_logger::Builder::new()
        .filter_level(log_level(cli.quiet, cli.verbose))
        .parse_default_env()
        .init();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        color,
        config: cli.config,
        overrides: cli.overrides,
    };

    let result = match cli.command {
        Command::Place(ref args) => place::run(args, &global),
        Command::Check(ref args) => check::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Log level selected by the verbosity flags; `RUST_LOG` still overrides it.
fn log_level(quiet: bool, verbose: bool) -> LevelFilter {
    if quiet {
        LevelFilter::Error
    } else if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    }
}

/// Renders diagnostics to stderr and prints the summary line.
pub(crate) fn render_diagnostics(diagnostics: &[Diagnostic], format: ReportFormat, global: &GlobalArgs) {
    match format {
        ReportFormat::Text => {
            let renderer = TerminalRenderer::new(global.color);
            for diag in diagnostics {
                if global.quiet && !diag.severity.is_error() {
                    continue;
                }
                eprint!("{}", renderer.render(diag));
            }
            if !global.quiet {
                let errors = diagnostics.iter().filter(|d| d.severity.is_error()).count();
                let warnings = diagnostics.iter().filter(|d| d.severity == Severity::Warning).count();
                eprintln!("   Result: {errors} error(s), {warnings} warning(s)");
            }
        }
        ReportFormat::Json => eprint!("{}", JsonRenderer.render_all(diagnostics)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_place_minimal() {
        let cli = Cli::parse_from(["hiplace", "place", "--design", "d.json", "--device", "v.json"]);
        match cli.command {
            Command::Place(ref args) => {
                assert_eq!(args.design, PathBuf::from("d.json"));
                assert_eq!(args.device, PathBuf::from("v.json"));
                assert!(args.timing.is_none());
                assert!(args.output.is_none());
                assert!(args.resume.is_none());
                assert!(args.iterations.is_none());
                assert_eq!(args.format, ReportFormat::Text);
            }
            _ => panic!("expected Place command"),
        }
    }

    #[test]
    fn parse_place_with_args() {
        let cli = Cli::parse_from([
            "hiplace",
            "place",
            "--design",
            "d.json",
            "--device",
            "v.json",
            "--timing",
            "t.json",
            "-o",
            "out.json",
            "--iterations",
            "40",
            "--format",
            "json",
        ]);
        match cli.command {
            Command::Place(ref args) => {
                assert_eq!(args.timing.as_deref(), Some(std::path::Path::new("t.json")));
                assert_eq!(args.output.as_deref(), Some(std::path::Path::new("out.json")));
                assert_eq!(args.iterations, Some(40));
                assert_eq!(args.format, ReportFormat::Json);
            }
            _ => panic!("expected Place command"),
        }
    }

    #[test]
    fn parse_check() {
        let cli = Cli::parse_from(["hiplace", "check", "--design", "d.json", "--device", "v.json"]);
        assert!(matches!(cli.command, Command::Check(_)));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from([
            "hiplace",
            "--quiet",
            "--color",
            "never",
            "--config",
            "placer.toml",
            "check",
            "--design",
            "d.json",
            "--device",
            "v.json",
        ]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.color, ColorChoice::Never);
        assert_eq!(cli.config, Some(PathBuf::from("placer.toml")));
    }

    #[test]
    fn parse_repeated_overrides() {
        let cli = Cli::parse_from([
            "hiplace",
            "place",
            "--design",
            "d.json",
            "--device",
            "v.json",
            "--set",
            "jobs=4",
            "--set",
            "RandomSeed=7",
        ]);
        assert_eq!(cli.overrides, vec!["jobs=4", "RandomSeed=7"]);
    }

    #[test]
    fn missing_design_is_rejected() {
        assert!(Cli::try_parse_from(["hiplace", "place", "--device", "v.json"]).is_err());
    }

    #[test]
    fn verbosity_selects_the_log_level() {
        assert_eq!(log_level(false, false), LevelFilter::Warn);
        assert_eq!(log_level(false, true), LevelFilter::Info);
        assert_eq!(log_level(true, true), LevelFilter::Error);
    }
}
