//! Enrichment record types
//!
//! One record shape per enrichment category, plus `SectionData`: the
//! per-section result that is always a value, never a propagated error,
//! so one failing category can't block the others for the same verse.

use serde::{Deserialize, Serialize};

/// Result of fetching one enrichment section for one verse
///
/// Serializes untagged: a failed section renders as `{"error": "..."}`
/// alongside its sibling sections' data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionData<T> {
    /// The section failed; `error` is a user-presentable message
    Failed {
        error: String,
    },
    Ready(T),
}

impl<T> SectionData<T> {
    /// Collapse a `Result` into a section value
    pub fn from_result(result: crate::types::Result<T>) -> Self {
        match result {
            Ok(value) => SectionData::Ready(value),
            Err(e) => SectionData::Failed {
                error: e.to_string(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SectionData::Ready(_))
    }

    /// The error message, if this section failed
    pub fn error(&self) -> Option<&str> {
        match self {
            SectionData::Failed { error } => Some(error),
            SectionData::Ready(_) => None,
        }
    }
}

/// Map placement for a verse with a known location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub lat: f64,
    pub lon: f64,
    /// Initial map zoom level
    pub zoom: u32,
    /// Marker label, e.g. "Jerusalem (Genesis 1 1)"
    pub popup_text: String,
}

/// A published commentary excerpt on a verse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commentary {
    pub source_name: String,
    pub commentary_text: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
}

/// A cross-reference from one verse to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossReference {
    pub target_verse_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Historical background for a verse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalContext {
    pub context_text: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A person linked to a verse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFigure {
    pub id: i64,
    pub figure_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub related_verses: Vec<String>,
    /// How the figure relates to the verse (from the link row); defaults
    /// to "related" when the link doesn't say
    #[serde(default = "default_mention_type")]
    pub mention_type: String,
}

fn default_mention_type() -> String {
    "related".to_string()
}
