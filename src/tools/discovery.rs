//! Tool configuration discovery
//!
//! Reads JSON/YAML config files one by one. A bad file becomes a
//! `FailedConfig` entry and never stops the rest from loading.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use super::config::ToolConfig;

/// Identifier reported for a file whose `id` could not be read
pub const UNKNOWN_CONFIG_ID: &str = "unknown";

/// Why a single config file was rejected
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON/YAML
    #[error("Malformed config: {0}")]
    Malformed(String),

    /// A required field is absent
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    /// A known field has the wrong shape
    #[error("Invalid field: {0}")]
    InvalidField(String),
}

/// A config file that was rejected
#[derive(Debug)]
pub struct FailedConfig {
    pub file_path: PathBuf,
    pub config_id: String,
    pub error: DiscoveryError,
}

/// Summary of one discovery pass
#[derive(Debug, Default)]
pub struct ToolDiscoveryResult {
    pub successful_configs: Vec<ToolConfig>,
    pub failed_configs: Vec<FailedConfig>,
    pub total_files_scanned: usize,
}

/// Load and validate every config file in `paths`, in order.
///
/// Returns the validated configs plus a summary that also holds them.
pub fn discover<P: AsRef<Path>>(paths: &[P]) -> (Vec<ToolConfig>, ToolDiscoveryResult) {
    let mut result = ToolDiscoveryResult::default();

    for path in paths {
        let path = path.as_ref();
        result.total_files_scanned += 1;

        match load_config(path) {
            Ok(config) => {
                log::debug!("Discovered tool config '{}' from {}", config.id, path.display());
                result.successful_configs.push(config);
            }
            Err((config_id, error)) => {
                log::warn!("Failed to load tool config {}: {}", path.display(), error);
                result.failed_configs.push(FailedConfig {
                    file_path: path.to_path_buf(),
                    config_id,
                    error,
                });
            }
        }
    }

    log::info!(
        "Discovery scanned {} file(s): {} loaded, {} failed",
        result.total_files_scanned,
        result.successful_configs.len(),
        result.failed_configs.len()
    );

    (result.successful_configs.clone(), result)
}

fn load_config(path: &Path) -> Result<ToolConfig, (String, DiscoveryError)> {
    let unknown = || UNKNOWN_CONFIG_ID.to_string();

    let content = std::fs::read_to_string(path).map_err(|e| (unknown(), DiscoveryError::Io(e)))?;
    let document = parse_document(path, &content).map_err(|e| (unknown(), e))?;

    let id = document
        .get("id")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(unknown);

    validate_required(&document).map_err(|e| (id.clone(), e))?;

    let mut config: ToolConfig =
        serde_json::from_value(document).map_err(|e| (id.clone(), DiscoveryError::InvalidField(e.to_string())))?;
    config.source_file = Some(path.to_path_buf());
    Ok(config)
}

fn parse_document(path: &Path, content: &str) -> Result<Value, DiscoveryError> {
    if is_yaml(path) {
        serde_yaml::from_str(content).map_err(|e| DiscoveryError::Malformed(e.to_string()))
    } else {
        serde_json::from_str(content).map_err(|e| DiscoveryError::Malformed(e.to_string()))
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("yaml" | "yml")
    )
}

fn validate_required(document: &Value) -> Result<(), DiscoveryError> {
    let map = document
        .as_object()
        .ok_or_else(|| DiscoveryError::InvalidField("config must be a mapping".to_string()))?;

    for field in ["id", "type"] {
        match map.get(field) {
            None | Some(Value::Null) => return Err(DiscoveryError::MissingField(field)),
            Some(Value::String(_)) => {}
            Some(_) => return Err(DiscoveryError::InvalidField(format!("'{}' must be a string", field))),
        }
    }
    Ok(())
}
