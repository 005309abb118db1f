//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use credence_core::api::ManifestDefinition;
use credence_core::assertion::ACTION_CREATED;
use serde_json::json;
use tracing::debug;

/// Claim generator written by the CLI, e.g. `credence/0.1.0`.
pub fn claim_generator() -> String {
    format!("credence/{}", env!("CARGO_PKG_VERSION"))
}

/// Load a manifest definition from a JSON file, or build the default one: a
/// single `c2pa.created` action titled after the asset.
pub fn load_definition(path: Option<&Path>, asset: &Path) -> Result<ManifestDefinition> {
    let value = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| {
                format!("Failed to read manifest definition: {}", path.display())
            })?;
            debug!(path = %path.display(), "Loaded manifest definition");
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid manifest definition: {}", path.display()))?
        }
        None => json!({
            "claim_generator": claim_generator(),
            "title": asset.file_name().map(|n| n.to_string_lossy().into_owned()),
            "assertions": [{
                "label": "c2pa.actions",
                "data": [{"action": ACTION_CREATED, "softwareAgent": claim_generator()}]
            }]
        }),
    };
    serde_json::from_value(value).context("Invalid manifest definition")
}

/// Format a claim timestamp as a human-readable UTC string.
pub fn format_timestamp(created: &DateTime<Utc>) -> String {
    created.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
