//! Verification and embedding settings
//!
//! Loaded from environment variables with sensible defaults.

use std::path::PathBuf;

use crate::error::{CredenceError, Result};
use crate::trust::TrustAnchors;

/// Default cap on the size of an embedded manifest store (16 MiB).
pub const DEFAULT_MAX_STORE_SIZE: usize = 16 * 1024 * 1024;

/// Settings shared by the file-level API, the CLI and the C boundary.
#[derive(Debug, Clone)]
pub struct Settings {
    /// PEM bundle of trust anchors (default: none, nothing is trusted)
    pub trust_anchors: Option<PathBuf>,
    /// Require chains to reach a trust anchor (default: true)
    pub verify_trust: bool,
    /// Largest manifest store accepted for embedding, in bytes (default: 16 MiB)
    pub max_store_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trust_anchors: None,
            verify_trust: true,
            max_store_size: DEFAULT_MAX_STORE_SIZE,
        }
    }
}

impl Settings {
    /// Load settings from environment variables
    ///
    /// - `CREDENCE_TRUST_ANCHORS`: path to a PEM bundle
    /// - `CREDENCE_VERIFY_TRUST`: `false` disables the anchor requirement
    /// - `CREDENCE_MAX_STORE_SIZE`: store size cap in bytes
    pub fn from_env() -> Self {
        let trust_anchors = std::env::var("CREDENCE_TRUST_ANCHORS")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let verify_trust = std::env::var("CREDENCE_VERIFY_TRUST")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let max_store_size = std::env::var("CREDENCE_MAX_STORE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_STORE_SIZE);

        Self {
            trust_anchors,
            verify_trust,
            max_store_size,
        }
    }

    pub fn with_trust_anchors(mut self, path: impl Into<PathBuf>) -> Self {
        self.trust_anchors = Some(path.into());
        self
    }

    /// Load the configured trust anchors; none configured yields an empty set.
    pub fn load_anchors(&self) -> Result<TrustAnchors> {
        match &self.trust_anchors {
            Some(path) => TrustAnchors::from_file(path).map_err(|e| {
                CredenceError::Config(format!(
                    "cannot load trust anchors from {}: {e}",
                    path.display()
                ))
            }),
            None => Ok(TrustAnchors::empty()),
        }
    }
}
