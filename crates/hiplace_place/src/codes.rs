//! Diagnostic codes raised by the placement phases.

use hiplace_diagnostics::{Category, DiagnosticCode};

/// A structural invariant broke and the run was aborted.
pub const INVARIANT_BROKEN: DiagnosticCode = DiagnosticCode::new(Category::Invariant, 1);

/// Spreading hit its loop cap with bins still overflowing.
pub const SPREAD_LOOP_CAP: DiagnosticCode = DiagnosticCode::new(Category::Convergence, 1);
/// A QP solve produced non-finite positions and was discarded.
pub const QP_SOLVE_DISCARDED: DiagnosticCode = DiagnosticCode::new(Category::Convergence, 2);
/// Global placement ran out of iterations before converging.
pub const ITERATION_LIMIT: DiagnosticCode = DiagnosticCode::new(Category::Convergence, 3);

/// A resource family needs more sites than the device has.
pub const RESOURCE_SHORTAGE: DiagnosticCode = DiagnosticCode::new(Category::Legalization, 1);
/// Rough legalization widened its search past the strict radius.
pub const RELAXED_LEGALITY: DiagnosticCode = DiagnosticCode::new(Category::Legalization, 2);
/// Column assignment left some columns over capacity.
pub const COLUMN_OVERFLOW: DiagnosticCode = DiagnosticCode::new(Category::Legalization, 3);
/// No contiguous assignment exists in a column.
pub const COLUMN_INFEASIBLE: DiagnosticCode = DiagnosticCode::new(Category::Legalization, 4);
/// Units stayed unmatched after the search radius was exhausted.
pub const UNMATCHED_UNITS: DiagnosticCode = DiagnosticCode::new(Category::Legalization, 5);

/// Timing data names a net the design does not have.
pub const UNKNOWN_TIMING_NET: DiagnosticCode = DiagnosticCode::new(Category::Timing, 1);

/// A coordinate trace could not be written and was disabled.
pub const TRACE_DISABLED: DiagnosticCode = DiagnosticCode::new(Category::Io, 1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_with_category_prefix() {
        assert_eq!(SPREAD_LOOP_CAP.to_string(), "C001");
        assert_eq!(RESOURCE_SHORTAGE.to_string(), "L001");
        assert_eq!(RELAXED_LEGALITY.to_string(), "L002");
        assert_eq!(COLUMN_OVERFLOW.to_string(), "L003");
        assert_eq!(COLUMN_INFEASIBLE.to_string(), "L004");
        assert_eq!(TRACE_DISABLED.to_string(), "F001");
    }
}
