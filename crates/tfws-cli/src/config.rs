//! Builder configuration loading.

use std::path::Path;

use anyhow::{Context, Result};
use tfws_model::WorkspaceConfig;

/// Read a YAML or JSON builder configuration. `None` uses the default layout.
pub fn read_config(path: Option<&Path>) -> Result<WorkspaceConfig> {
    let Some(path) = path else {
        tracing::debug!("no config given, using the default region layout");
        return Ok(WorkspaceConfig::default());
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read config {}", path.display()))?;
    // YAML is a superset of JSON, so one parser covers both.
    let config: WorkspaceConfig = serde_yaml_ng::from_slice(&bytes)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config.validate().with_context(|| format!("invalid config {}", path.display()))?;
    tracing::info!(path = %path.display(), regions = config.regions.len(), "config loaded");
    Ok(config)
}

/// Default configuration as YAML.
pub fn default_config_yaml() -> Result<String> {
    Ok(serde_yaml_ng::to_string(&WorkspaceConfig::default())?)
}
