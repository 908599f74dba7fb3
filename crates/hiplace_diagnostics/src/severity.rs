//! How serious a placement diagnostic is.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a diagnostic, ordered from informational to fatal.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Progress or context information.
    Note,
    /// A recoverable condition; the placer degraded gracefully and continued.
    Warning,
    /// A broken invariant; the run was aborted.
    Error,
}

impl Severity {
    /// Returns `true` for [`Severity::Error`].
    pub fn is_error(self) -> bool {
        self == Severity::Error
    }

    /// ANSI SGR color code used by the terminal renderer.
    pub fn ansi_color(self) -> &'static str {
        match self {
            Severity::Note => "36",
            Severity::Warning => "33",
            Severity::Error => "31",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(text)
    }
}
