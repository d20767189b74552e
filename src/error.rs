//! Error type for the fallible edges: config loading and report output

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid encounter config: {0}")]
    InvalidConfig(String),

    #[error("unit `{unit}` refers to unknown unit `{target}`")]
    UnknownUnit { unit: String, target: String },
}
