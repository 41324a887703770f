//! Intent matcher: free text to best whitelisted action.
//!
//! Pure read-side component. It never mutates the whitelist or the index;
//! staleness (an action added after the last index build) is the index
//! builder's concern, not the matcher's.

use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::{DynEmbedder, Embedder};
use crate::error::MatchError;
use crate::index::FingerprintIndex;

/// The best-matching action for one instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Whitelisted action id.
    pub action_id: String,
    /// Cosine similarity clamped to [0, 1].
    pub confidence: f32,
    /// The matched action's description.
    pub description: String,
}

/// Matcher holding the loaded fingerprint index and an embedding backend.
///
/// The index slot supports concurrent readers; a rebuild installs the new
/// index with an atomic swap, so in-flight matches see either the old or
/// the new index, never a partial one.
pub struct IntentMatcher {
    index: Arc<RwLock<Option<FingerprintIndex>>>,
    embedder: Box<dyn DynEmbedder>,
}

impl IntentMatcher {
    /// Create a matcher with no index loaded. Matching fails with
    /// [`MatchError::Unavailable`] until an index is installed.
    pub fn new(embedder: impl Embedder + 'static) -> Self {
        Self {
            index: Arc::new(RwLock::new(None)),
            embedder: Box::new(embedder),
        }
    }

    /// Create a matcher from a pre-boxed dynamic embedder.
    pub fn new_dyn(embedder: Box<dyn DynEmbedder>) -> Self {
        Self {
            index: Arc::new(RwLock::new(None)),
            embedder,
        }
    }

    /// Install an index, replacing whatever was loaded before.
    pub fn install_index(&self, index: FingerprintIndex) {
        let mut slot = self.index.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(index);
    }

    /// Load and install a persisted index from disk.
    pub fn load_index(&self, path: &Path) -> Result<(), MatchError> {
        let index = FingerprintIndex::load(path)?;
        self.install_index(index);
        Ok(())
    }

    /// True if an index with at least one entry is installed.
    pub fn has_index(&self) -> bool {
        self.index
            .read()
            .map(|slot| slot.as_ref().is_some_and(|idx| !idx.is_empty()))
            .unwrap_or(false)
    }

    /// Match free text against the indexed action descriptions.
    ///
    /// Returns the entry with maximum cosine similarity; exact ties resolve
    /// to the first entry in index order, so results are deterministic for
    /// a fixed index and embedder.
    pub async fn match_instruction(&self, text: &str) -> Result<MatchResult, MatchError> {
        // Embed before taking the lock; the embedder may suspend.
        let query = self
            .embedder
            .embed_boxed(text)
            .await
            .map_err(|e| MatchError::Embedding(e.to_string()))?;

        let slot = self
            .index
            .read()
            .map_err(|e| MatchError::Unavailable(format!("index lock poisoned: {}", e)))?;
        let index = match slot.as_ref() {
            Some(idx) if !idx.is_empty() => idx,
            _ => {
                return Err(MatchError::Unavailable(
                    "fingerprint index is missing or empty".to_string(),
                ))
            }
        };

        let mut best_idx = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        for (i, fingerprint) in index.fingerprints.iter().enumerate() {
            let score = cosine_similarity(&query, fingerprint);
            // Strictly greater keeps the first entry on exact ties.
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }

        let result = MatchResult {
            action_id: index.ids[best_idx].clone(),
            confidence: (best_score as f32).clamp(0.0, 1.0),
            description: index.descriptions[best_idx].clone(),
        };

        debug!(
            action = %result.action_id,
            confidence = result.confidence,
            "Instruction matched"
        );

        Ok(result)
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero magnitudes.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;

    async fn matcher_with(entries: &[(&str, &str)]) -> IntentMatcher {
        let ids = entries.iter().map(|(id, _)| id.to_string()).collect();
        let descriptions = entries.iter().map(|(_, d)| d.to_string()).collect();
        let embedder = HashEmbedder::new();
        let index = FingerprintIndex::build(ids, descriptions, &embedder)
            .await
            .unwrap();
        let matcher = IntentMatcher::new(HashEmbedder::new());
        matcher.install_index(index);
        matcher
    }

    #[tokio::test]
    async fn test_match_exact_description_wins() {
        let matcher = matcher_with(&[
            ("screenshot_taker.py", "take a screenshot of the screen"),
            ("screen_tiler_grid.py", "tile windows into a grid"),
        ])
        .await;

        // Hash embeddings only align for identical text, so querying with an
        // exact description must select that entry with similarity 1.0.
        let result = matcher
            .match_instruction("take a screenshot of the screen")
            .await
            .unwrap();
        assert_eq!(result.action_id, "screenshot_taker.py");
        assert!((result.confidence - 1.0).abs() < 1e-5);
        assert_eq!(result.description, "take a screenshot of the screen");
    }

    #[tokio::test]
    async fn test_match_deterministic() {
        let matcher = matcher_with(&[
            ("a.py", "first action"),
            ("b.py", "second action"),
            ("c.py", "third action"),
        ])
        .await;

        let r1 = matcher.match_instruction("some instruction").await.unwrap();
        let r2 = matcher.match_instruction("some instruction").await.unwrap();
        assert_eq!(r1, r2);
    }

    #[tokio::test]
    async fn test_tie_breaks_to_first_index_entry() {
        // Identical descriptions produce identical fingerprints, so every
        // score ties exactly; the first entry must win.
        let matcher = matcher_with(&[
            ("first.py", "duplicate description"),
            ("second.py", "duplicate description"),
            ("third.py", "duplicate description"),
        ])
        .await;

        let result = matcher
            .match_instruction("duplicate description")
            .await
            .unwrap();
        assert_eq!(result.action_id, "first.py");
    }

    #[tokio::test]
    async fn test_no_index_is_unavailable() {
        let matcher = IntentMatcher::new(HashEmbedder::new());
        let err = matcher.match_instruction("anything").await.unwrap_err();
        assert!(matches!(err, MatchError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_index_is_unavailable() {
        let matcher = IntentMatcher::new(HashEmbedder::new());
        matcher.install_index(FingerprintIndex::default());
        let err = matcher.match_instruction("anything").await.unwrap_err();
        assert!(matches!(err, MatchError::Unavailable(_)));
        assert!(!matcher.has_index());
    }

    #[tokio::test]
    async fn test_confidence_clamped_to_unit_interval() {
        let matcher = matcher_with(&[("a.py", "alpha"), ("b.py", "beta")]).await;
        // Hash vectors of unrelated text can have negative cosine; the
        // reported confidence must still land in [0, 1].
        let result = matcher
            .match_instruction("completely unrelated query text")
            .await
            .unwrap();
        assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[tokio::test]
    async fn test_load_index_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fp.json");

        let embedder = HashEmbedder::new();
        let index = FingerprintIndex::build(
            vec!["a.py".to_string()],
            vec!["only action".to_string()],
            &embedder,
        )
        .await
        .unwrap();
        index.save(&path).unwrap();

        let matcher = IntentMatcher::new(HashEmbedder::new());
        matcher.load_index(&path).unwrap();
        assert!(matcher.has_index());

        let result = matcher.match_instruction("only action").await.unwrap();
        assert_eq!(result.action_id, "a.py");
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0f32; 100];
        let b = vec![1.0f32; 100];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let mut a = vec![0.0f32; 100];
        let mut b = vec![0.0f32; 100];
        a[0] = 1.0;
        b[1] = 1.0;
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0f32; 100];
        let b = vec![1.0f32; 100];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        let a = vec![1.0f32; 10];
        let b = vec![1.0f32; 20];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
