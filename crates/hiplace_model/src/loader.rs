//! Reading designs and user cluster files.

use crate::design::Design;
use hiplace_common::CellId;
use log::warn;
use std::path::Path;

/// Errors raised while loading design inputs.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    /// The file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The design JSON was malformed or inconsistent.
    #[error("invalid design '{path}': {message}")]
    Invalid {
        /// Path that failed.
        path: String,
        /// Parser message.
        message: String,
    },
}

fn read(path: &Path) -> Result<String, ModelLoadError> {
    std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Loads a JSON design description.
pub fn load_design(path: &Path) -> Result<Design, ModelLoadError> {
    let content = read(path)?;
    serde_json::from_str(&content).map_err(|e| ModelLoadError::Invalid {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Loads user clusters: one cluster per line, cell names separated by
/// whitespace. Names that are not in the design are skipped with a warning.
pub fn load_user_clusters(path: &Path, design: &Design) -> Result<Vec<Vec<CellId>>, ModelLoadError> {
    let content = read(path)?;
    Ok(parse_user_clusters(&content, design))
}

fn parse_user_clusters(content: &str, design: &Design) -> Vec<Vec<CellId>> {
    let mut unknown = 0usize;
    let clusters: Vec<Vec<CellId>> = content
        .lines()
        .map(|line| {
            line.split_whitespace()
                .filter_map(|name| {
                    let cell = design.cell_by_name(name);
                    if cell.is_none() {
                        unknown += 1;
                    }
                    cell
                })
                .collect::<Vec<_>>()
        })
        .filter(|cluster| !cluster.is_empty())
        .collect();
    if unknown > 0 {
        warn!("{unknown} cell names in the cluster file are not in the design");
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::CellType;

    fn design() -> Design {
        let mut design = Design::new("d");
        design.add_cell("a", CellType::Lut);
        design.add_cell("b", CellType::Ff);
        design.add_cell("c", CellType::Lut);
        design
    }

    #[test]
    fn clusters_skip_unknown_names_and_blank_lines() {
        let clusters = parse_user_clusters("a b ghost\n\n  c\nghost\n", &design());
        assert_eq!(
            clusters,
            vec![vec![CellId::from_raw(0), CellId::from_raw(1)], vec![CellId::from_raw(2)]]
        );
    }

    #[test]
    fn design_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.json");
        std::fs::write(&path, serde_json::to_string(&design()).unwrap()).unwrap();
        let loaded = load_design(&path).unwrap();
        assert_eq!(loaded.cell_count(), 3);

        let clusters = dir.path().join("clusters.txt");
        std::fs::write(&clusters, "c a\n").unwrap();
        assert_eq!(load_user_clusters(&clusters, &loaded).unwrap().len(), 1);
    }

    #[test]
    fn malformed_design_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_design(&path), Err(ModelLoadError::Invalid { .. })));
        assert!(matches!(
            load_design(&dir.path().join("missing.json")),
            Err(ModelLoadError::Io { .. })
        ));
    }
}
