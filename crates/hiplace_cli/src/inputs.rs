//! Loading the configuration, device and design shared by every command.

use std::error::Error;
use std::path::Path;

use hiplace_config::PlacerConfig;
use hiplace_device::Device;
use hiplace_model::{ModelSettings, PlacementModel};
use log::info;

use crate::GlobalArgs;

/// Everything a command needs to work on one design.
pub struct Inputs {
    /// Validated placer configuration.
    pub config: PlacerConfig,
    /// The target device.
    pub device: Device,
    /// The design's placement model over the device.
    pub model: PlacementModel,
}

/// Loads the configuration file, if any, and applies `--set` overrides.
pub fn load_config(global: &GlobalArgs) -> Result<PlacerConfig, Box<dyn Error>> {
    let base = match &global.config {
        Some(path) => hiplace_config::load_config(path)?,
        None => PlacerConfig::default(),
    };
    if global.overrides.is_empty() {
        return Ok(base);
    }
    let pairs = global
        .overrides
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| format!("option override '{pair}' is not of the form KEY=VALUE"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hiplace_config::load_config_from_pairs(&base, pairs)?)
}

/// Loads the device and design and builds the placement model.
pub fn load_inputs(design: &Path, device: &Path, config: PlacerConfig) -> Result<Inputs, Box<dyn Error>> {
    let mut device = hiplace_device::load_device(device)?;
    let design = hiplace_model::load_design(design)?;
    let clusters = match &config.design_cluster {
        Some(path) => Some(hiplace_model::load_user_clusters(path, &design)?),
        None => None,
    };
    info!(
        "loaded design '{}' ({} cells, {} nets) for device '{}' ({} sites)",
        design.name,
        design.cell_count(),
        design.net_count(),
        device.name(),
        device.sites().len()
    );
    let settings = ModelSettings {
        bin_width: config.bin_width,
        bin_height: config.bin_height,
        y2x: config.y2x_ratio,
    };
    let mut model = PlacementModel::new(design, &device, settings)?;
    if let Some(clusters) = clusters {
        model.set_user_clusters(clusters);
    }
    let blocked = model.occupy_fixed_sites(&mut device);
    if blocked > 0 {
        info!("{blocked} sites are occupied by fixed cells");
    }
    Ok(Inputs { config, device, model })
}
