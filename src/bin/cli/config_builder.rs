//! Configuration loading for CLI commands.

use std::path::Path;

use tracing::{debug, info};

use speclens::SpecLensConfig;

/// Load and validate the configuration, falling back to defaults when no
/// file is given.
pub fn load_configuration(path: Option<&Path>) -> anyhow::Result<SpecLensConfig> {
    let config = match path {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            SpecLensConfig::from_yaml_file(path)?
        }
        None => {
            debug!("No configuration file given; using defaults");
            SpecLensConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}
