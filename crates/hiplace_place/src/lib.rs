//! Analytical global placement for FPGA designs.
//!
//! The [`GlobalPlacer`] drives a [`PlacementModel`](hiplace_model::PlacementModel)
//! from an initial clustered placement to a spread, partially legalized one:
//!
//! 1. **Initial placement**: random, or clusters of connected units annealed
//!    over the clock regions ([`cluster`])
//! 2. **Lower bound**: bound-to-bound quadratic wirelength optimization
//!    ([`WirelengthOptimizer`])
//! 3. **Upper bound**: density-driven spreading per resource family
//!    ([`GeneralSpreader`])
//! 4. **Legalization**: DSP, block RAM, carry and distributed RAM units are
//!    matched to device sites ([`MacroLegalizer`], [`ClbLegalizer`])
//!
//! Every phase reports recoverable trouble to a
//! [`DiagnosticSink`](hiplace_diagnostics::DiagnosticSink) and returns
//! [`PlaceResult`](hiplace_common::PlaceResult) for broken invariants.
//!
//! # Usage
//!
//! ```ignore
//! use hiplace_place::GlobalPlacer;
//!
//! let mut placer = GlobalPlacer::new(&config)?;
//! placer.cluster_placement(&mut model, &device);
//! let report = placer.run(&mut model, &mut device, config.global_placement_iterations, false, &sink)?;
//! ```

#![warn(missing_docs)]

pub mod cluster;
pub mod codes;
pub mod global;
pub mod legalizer;
pub mod matching;
pub mod solver;
pub mod spreader;
pub mod timing;
pub mod trace;
pub mod wirelength;
pub mod workers;

pub use cluster::ClusterSummary;
pub use global::{Convergence, GlobalPlacementReport, GlobalPlacer, IterationRecord, PseudoNetBookkeeping};
pub use legalizer::{ClbLegalizer, Legalizer, LegalizerParameters, MacroLegalizer};
pub use matching::MinCostMatching;
pub use spreader::{GeneralSpreader, SpreadOutcome};
pub use timing::{NetTiming, TimingContext, TimingLoadError};
pub use trace::{CoordinateTrace, PlacementTraces};
pub use wirelength::{SolveReport, SolveRequest, WirelengthOptimizer};
pub use workers::WorkerPool;
