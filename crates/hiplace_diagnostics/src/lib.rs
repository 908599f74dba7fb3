//! Placement diagnostics: structured warnings and errors emitted by the placer.
//!
//! Phases running on worker threads push [`Diagnostic`]s into a shared
//! [`DiagnosticSink`]; the driver renders them at the end of a run with a
//! [`DiagnosticRenderer`]. Convergence and legalization pressure surface as
//! warnings, broken invariants as errors.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use renderer::{DiagnosticRenderer, JsonRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::DiagnosticSink;
