//! Persisted fingerprint index.
//!
//! One serialized record of parallel arrays: `ids[i]`, `descriptions[i]`,
//! and `fingerprints[i]` always refer to the same action. The index is
//! rebuilt from the whitelist, so every id it contains is whitelisted at
//! build time; the reverse does not hold (whitelisted actions may still be
//! pending fingerprint generation).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embedding::DynEmbedder;
use crate::error::MatchError;

/// Parallel-array fingerprint index, persisted as a single JSON record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FingerprintIndex {
    pub ids: Vec<String>,
    pub descriptions: Vec<String>,
    pub fingerprints: Vec<Vec<f32>>,
}

impl FingerprintIndex {
    /// Number of indexed actions.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if no actions are indexed.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Build an index by embedding each description in order.
    ///
    /// `ids` and `descriptions` must be positionally aligned; callers pass
    /// an empty description for actions whose source was unreadable, and
    /// the fingerprint is computed over that empty value so alignment is
    /// preserved.
    pub async fn build(
        ids: Vec<String>,
        descriptions: Vec<String>,
        embedder: &dyn DynEmbedder,
    ) -> Result<Self, MatchError> {
        debug_assert_eq!(ids.len(), descriptions.len());

        let mut fingerprints = Vec::with_capacity(descriptions.len());
        for description in &descriptions {
            let fingerprint = embedder
                .embed_boxed(description)
                .await
                .map_err(|e| MatchError::Embedding(e.to_string()))?;
            fingerprints.push(fingerprint);
        }

        info!(actions = ids.len(), "Fingerprint index built");

        Ok(Self {
            ids,
            descriptions,
            fingerprints,
        })
    }

    /// Load a persisted index.
    ///
    /// A missing or unparseable file is reported as [`MatchError::Unavailable`]:
    /// matching must not proceed against a half-built or absent index.
    pub fn load(path: &Path) -> Result<Self, MatchError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MatchError::Unavailable(format!("index not readable at {}: {}", path.display(), e))
        })?;
        let index: FingerprintIndex = serde_json::from_str(&content).map_err(|e| {
            MatchError::Unavailable(format!("index corrupt at {}: {}", path.display(), e))
        })?;
        Ok(index)
    }

    /// Persist the index atomically (write to a temp file, then rename).
    ///
    /// Readers never observe a half-written index.
    pub fn save(&self, path: &Path) -> Result<(), MatchError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        info!(path = %path.display(), actions = self.len(), "Fingerprint index saved");
        Ok(())
    }
}
