//! Diagnostic codes grouped by the placement concern that raised them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The concern a diagnostic belongs to, shown as a one-letter prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// Structural invariant violations, prefixed with `I`.
    Invariant,
    /// Spreading and global placement convergence, prefixed with `C`.
    Convergence,
    /// Site assignment and column capacity pressure, prefixed with `L`.
    Legalization,
    /// Timing-driven optimization, prefixed with `T`.
    Timing,
    /// Trace files and other optional outputs, prefixed with `F`.
    Io,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Invariant => 'I',
            Category::Convergence => 'C',
            Category::Legalization => 'L',
            Category::Timing => 'T',
            Category::Io => 'F',
        }
    }
}

/// A category prefix plus a number, displayed as e.g. `L003`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}
