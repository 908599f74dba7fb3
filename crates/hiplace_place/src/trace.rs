//! Gzip coordinate traces.
//!
//! A trace writes one file per dump, `{prefix}-{counter}.gz`, holding one
//! `X Y name` line per cell. Traces are debugging aids: a failed write is
//! reported once and the trace switches itself off.

use crate::codes;
use flate2::write::GzEncoder;
use flate2::Compression;
use hiplace_common::Point;
use hiplace_config::TraceConfig;
use hiplace_diagnostics::{Diagnostic, DiagnosticSink};
use hiplace_model::{CellType, PlacementModel};
use log::{debug, warn};
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One numbered series of coordinate dumps.
#[derive(Clone, Debug, Default)]
pub struct CoordinateTrace {
    prefix: Option<String>,
    counter: usize,
}

impl CoordinateTrace {
    /// Creates a trace writing under `prefix`, or a disabled one.
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
            counter: 0,
        }
    }

    /// Returns `true` while dumps are written.
    pub fn is_enabled(&self) -> bool {
        self.prefix.is_some()
    }

    /// Number of dumps written so far.
    pub fn count(&self) -> usize {
        self.counter
    }

    /// Writes one dump and returns its path. Returns `None` when disabled
    /// or when the write failed, in which case the trace is disabled.
    pub fn dump<'a>(
        &mut self,
        entries: impl IntoIterator<Item = (Point, &'a str)>,
        sink: &DiagnosticSink,
    ) -> Option<PathBuf> {
        let prefix = self.prefix.as_ref()?;
        let path = PathBuf::from(format!("{prefix}-{}.gz", self.counter));
        self.counter += 1;
        let mut text = String::new();
        for (p, name) in entries {
            let _ = writeln!(text, "{} {} {}", p.x, p.y, name);
        }
        match write_gzip(&path, text.as_bytes()) {
            Ok(()) => {
                debug!("coordinate trace written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("failed to write coordinate trace {}: {e}", path.display());
                sink.emit(
                    Diagnostic::warning(
                        codes::TRACE_DISABLED,
                        format!("cannot write trace '{}': {e}", path.display()),
                    )
                    .with_origin("trace")
                    .with_note(format!("traces with prefix '{prefix}' are disabled")),
                );
                self.prefix = None;
                None
            }
        }
    }

    /// Dumps the cells of the model whose type matches `filter`.
    pub fn dump_cells(
        &mut self,
        model: &PlacementModel,
        filter: impl Fn(CellType) -> bool,
        sink: &DiagnosticSink,
    ) -> Option<PathBuf> {
        if !self.is_enabled() {
            return None;
        }
        let entries = model
            .design()
            .cells()
            .iter()
            .filter(|c| filter(c.cell_type))
            .map(|c| (model.cell_location(c.id), c.name.as_str()));
        self.dump(entries, sink)
    }
}

fn write_gzip(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(())
}

/// The traces the global placer writes after every phase.
#[derive(Clone, Debug, Default)]
pub struct PlacementTraces {
    lut: CoordinateTrace,
    ff: CoordinateTrace,
    lut_ff: CoordinateTrace,
    carry: CoordinateTrace,
    dsp: CoordinateTrace,
    bram: CoordinateTrace,
    all: CoordinateTrace,
    /// LUT and FF locations after every spreading loop.
    pub spreader: CoordinateTrace,
    /// Legalized macro locations.
    pub macro_legalization: CoordinateTrace,
}

impl PlacementTraces {
    /// Creates the traces named in the configuration.
    pub fn new(config: &TraceConfig) -> Self {
        Self {
            lut: CoordinateTrace::new(config.lut.clone()),
            ff: CoordinateTrace::new(config.ff.clone()),
            lut_ff: CoordinateTrace::new(config.lut_ff.clone()),
            carry: CoordinateTrace::new(config.carry.clone()),
            dsp: CoordinateTrace::new(config.dsp.clone()),
            bram: CoordinateTrace::new(config.bram.clone()),
            all: CoordinateTrace::new(config.all.clone()),
            spreader: CoordinateTrace::new(config.spreader_lut_ff.clone()),
            macro_legalization: CoordinateTrace::new(config.macro_legalization.clone()),
        }
    }

    /// Returns `true` if any per-phase trace is enabled.
    pub fn any_enabled(&self) -> bool {
        [&self.lut, &self.ff, &self.lut_ff, &self.carry, &self.dsp, &self.bram, &self.all]
            .iter()
            .any(|t| t.is_enabled())
    }

    /// Writes one dump of every enabled per-phase trace.
    pub fn dump_phase(&mut self, model: &PlacementModel, sink: &DiagnosticSink) {
        self.lut.dump_cells(model, |t| matches!(t, CellType::Lut | CellType::Lutram), sink);
        self.ff.dump_cells(model, |t| t == CellType::Ff, sink);
        self.lut_ff
            .dump_cells(model, |t| matches!(t, CellType::Lut | CellType::Lutram | CellType::Ff), sink);
        self.carry.dump_cells(model, |t| t == CellType::Carry, sink);
        self.dsp.dump_cells(model, |t| t == CellType::Dsp, sink);
        self.bram.dump_cells(model, CellType::is_bram, sink);
        self.all.dump_cells(model, |_| true, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn read_gz(path: &std::path::Path) -> String {
        let mut text = String::new();
        GzDecoder::new(std::fs::File::open(path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[test]
    fn dumps_are_numbered_gzip_text() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("lut").display().to_string();
        let mut trace = CoordinateTrace::new(Some(prefix.clone()));
        let sink = DiagnosticSink::new();
        let first = trace
            .dump([(Point::new(1.5, 2.0), "a"), (Point::new(3.0, 4.25), "b")], &sink)
            .unwrap();
        let second = trace.dump([(Point::new(0.0, 0.0), "c")], &sink).unwrap();
        assert_eq!(first, PathBuf::from(format!("{prefix}-0.gz")));
        assert_eq!(second, PathBuf::from(format!("{prefix}-1.gz")));
        assert_eq!(read_gz(&first), "1.5 2 a\n3 4.25 b\n");
        assert_eq!(trace.count(), 2);
    }

    #[test]
    fn failed_write_disables_trace() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("missing").join("deeper").display().to_string();
        let mut trace = CoordinateTrace::new(Some(prefix));
        let sink = DiagnosticSink::new();
        assert!(trace.dump([(Point::default(), "a")], &sink).is_none());
        assert!(!trace.is_enabled());
        let diags = sink.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, codes::TRACE_DISABLED);
        assert!(trace.dump([(Point::default(), "a")], &sink).is_none());
        assert_eq!(sink.diagnostics().len(), 1);
    }

    #[test]
    fn empty_prefix_is_disabled() {
        assert!(!CoordinateTrace::new(Some(String::new())).is_enabled());
        assert!(!PlacementTraces::new(&TraceConfig::default()).any_enabled());
    }
}
