//! Verse identifiers
//!
//! Every cache key, backend filter, and annotation record hangs off the
//! composite verse identifier `TRANSLATION_BOOK_CHAPTER_VERSE`
//! (e.g. `KJV_Genesis_1_1`). Parsing is consolidated here: call sites get
//! a typed result instead of re-deriving substrings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::StudyError;

/// A parsed verse identifier
///
/// Book names may contain spaces (`Song of Solomon`) but never the `_`
/// delimiter, so a well-formed identifier always splits into exactly four
/// segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerseId {
    /// Translation abbreviation (e.g. "KJV")
    pub translation: String,
    /// Book name (e.g. "Genesis")
    pub book: String,
    /// Chapter number, 1-based
    pub chapter: u32,
    /// Verse number, 1-based
    pub verse: u32,
}

impl VerseId {
    /// Parse a verse identifier string, rejecting malformed input with a
    /// typed validation error.
    pub fn parse(s: &str) -> Result<Self, StudyError> {
        let invalid = || {
            StudyError::Validation(format!(
                "Invalid verse ID format: '{s}'. Expected format 'VERSION_BOOK_CHAPTER_VERSE'."
            ))
        };

        let parts: Vec<&str> = s.split('_').collect();
        if parts.len() != 4 {
            return Err(invalid());
        }
        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(invalid());
        }

        let chapter: u32 = parts[2].parse().map_err(|_| invalid())?;
        let verse: u32 = parts[3].parse().map_err(|_| invalid())?;
        if chapter == 0 || verse == 0 {
            return Err(invalid());
        }

        Ok(Self {
            translation: parts[0].to_string(),
            book: parts[1].to_string(),
            chapter,
            verse,
        })
    }

    /// Human-readable reference without the translation, e.g. "Genesis 1 1"
    pub fn reference(&self) -> String {
        format!("{} {} {}", self.book, self.chapter, self.verse)
    }
}

impl FromStr for VerseId {
    type Err = StudyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VerseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.translation, self.book, self.chapter, self.verse
        )
    }
}
