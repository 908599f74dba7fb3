//! Rendering of diagnostics for terminals and machine consumers.

use crate::diagnostic::Diagnostic;

/// Formats one diagnostic as a string.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic.
    fn render(&self, diag: &Diagnostic) -> String;

    /// Renders a batch, one after another.
    fn render_all(&self, diags: &[Diagnostic]) -> String {
        diags.iter().map(|d| self.render(d)).collect()
    }
}

/// Renders diagnostics in a rustc-like layout.
///
/// ```text
/// warning[L003]: column 4 still overflows by 2 macros
///   --> legalizer[BRAM-DSP]
///    = note: ...
///    = help: ...
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let mut out = String::new();
        let header = format!("{}[{}]", diag.severity, diag.code);
        if self.color {
            out.push_str(&format!(
                "\x1b[1;{}m{header}\x1b[0m\x1b[1m: {}\x1b[0m\n",
                diag.severity.ansi_color(),
                diag.message
            ));
        } else {
            out.push_str(&format!("{header}: {}\n", diag.message));
        }

        if let Some(origin) = &diag.origin {
            out.push_str(&format!("  --> {origin}\n"));
        }
        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }
        for help in &diag.help {
            out.push_str(&format!("   = help: {help}\n"));
        }
        out
    }
}

/// Renders each diagnostic as one JSON object per line.
pub struct JsonRenderer;

impl DiagnosticRenderer for JsonRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        match serde_json::to_string(diag) {
            Ok(line) => line + "\n",
            Err(e) => format!("{{\"severity\":\"error\",\"message\":\"unrenderable diagnostic: {e}\"}}\n"),
        }
    }
}
