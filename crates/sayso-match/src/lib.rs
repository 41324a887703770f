//! Semantic intent matching for sayso.
//!
//! Turns free-form instructions into whitelisted action ids by comparing
//! semantic fingerprints: each action's description is embedded once into a
//! persisted index, and incoming text is matched by cosine similarity.

pub mod embedding;
pub mod error;
pub mod index;
pub mod matcher;

pub use embedding::{DynEmbedder, Embedder, HashEmbedder, OnnxEmbedder};
pub use error::MatchError;
pub use index::FingerprintIndex;
pub use matcher::{IntentMatcher, MatchResult};
