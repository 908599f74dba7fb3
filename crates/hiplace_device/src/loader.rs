//! Reading a device description from disk.

use crate::device::Device;
use std::path::Path;

/// Errors raised while loading a device file.
#[derive(Debug, thiserror::Error)]
pub enum DeviceLoadError {
    /// The file could not be read.
    #[error("failed to read device '{path}': {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The JSON was malformed or described an inconsistent device.
    #[error("invalid device description '{path}': {message}")]
    Invalid {
        /// Path that failed.
        path: String,
        /// Parser or validation message.
        message: String,
    },
}

/// Loads a JSON device description.
pub fn load_device(path: &Path) -> Result<Device, DeviceLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| DeviceLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|e| DeviceLoadError::Invalid {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceBuilder, SiteType};

    #[test]
    fn load_written_device() {
        let device = DeviceBuilder::new("dev")
            .column(0.0, SiteType::SliceL, 3)
            .column(2.0, SiteType::Dsp, 2)
            .build()
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, serde_json::to_string(&device).unwrap()).unwrap();
        let loaded = load_device(&path).unwrap();
        assert_eq!(loaded.name(), "dev");
        assert_eq!(loaded.sites_of_type(SiteType::Dsp).len(), 2);
    }

    #[test]
    fn inconsistent_device_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, r#"{"name": "empty", "sites": []}"#).unwrap();
        let err = load_device(&path).unwrap_err();
        assert!(matches!(err, DeviceLoadError::Invalid { .. }));
        assert!(err.to_string().contains("no sites"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_device(Path::new("/nonexistent/device.json")).unwrap_err();
        assert!(matches!(err, DeviceLoadError::Io { .. }));
    }
}
