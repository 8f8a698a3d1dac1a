//! Cache key derivation
//!
//! Keys are content-addressable: `{category}_{verseId}[_{hash}...]` where
//! each hash segment covers a variable input (verse text, user
//! preferences). Changing any input changes the key, so stale content is
//! never served across differing contexts. Hashing is pure and
//! deterministic; no randomness, no time component.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// Enrichment categories served through the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    AiInsights,
    MapData,
    Commentaries,
    CrossReferences,
    HistoricalContext,
    KeyFigures,
}

impl Category {
    /// Stable name used as the cache key prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AiInsights => "ai_insights",
            Category::MapData => "map_data",
            Category::Commentaries => "commentaries",
            Category::CrossReferences => "cross_references",
            Category::HistoricalContext => "historical_context",
            Category::KeyFigures => "key_figures",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash a raw input string (e.g. verse text) to a short stable digest.
///
/// Truncated to 16 bytes (32 hex chars); collision resistance at cache-key
/// scale, not security.
pub fn content_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Hash a serializable parameter object as canonical JSON.
///
/// An absent object hashes the `"{}"` placeholder rather than omitting the
/// segment, so "no preferences" and "empty preferences" share a key.
pub fn params_hash<T: Serialize>(params: Option<&T>) -> String {
    let json = params
        .and_then(|p| serde_json::to_string(p).ok())
        .unwrap_or_else(|| "{}".to_string());
    content_hash(&json)
}

/// Build the cache key for a category, verse id, and variable-input hashes
pub fn cache_key(category: Category, verse_id: &str, hashes: &[&str]) -> String {
    let mut key = format!("{}_{}", category, verse_id);
    for h in hashes {
        key.push('_');
        key.push_str(h);
    }
    key
}
