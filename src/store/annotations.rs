//! Annotation store
//!
//! One record per verse id: `{verse_id, highlight, note}`. Put replaces the
//! whole record (callers merge fields before saving). Backed by a local
//! SQLite file; a single connection behind an async mutex serializes
//! writes, so concurrent saves for the same verse cannot interleave into a
//! corrupted record.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::{Result, StudyError};

/// Highlight colors offered by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Highlight {
    Yellow,
    Green,
    Pink,
}

impl Highlight {
    fn as_str(&self) -> &'static str {
        match self {
            Highlight::Yellow => "yellow",
            Highlight::Green => "green",
            Highlight::Pink => "pink",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "yellow" => Some(Highlight::Yellow),
            "green" => Some(Highlight::Green),
            "pink" => Some(Highlight::Pink),
            _ => None,
        }
    }
}

/// User-authored annotation for a single verse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnnotation {
    /// Verse identifier string, the record key
    pub verse_id: String,
    /// Highlight color, if any
    pub highlight: Option<Highlight>,
    /// Free-form note, if any
    pub note: Option<String>,
}

/// Durable annotation store over a local SQLite file
///
/// Cheaply cloneable; clones share the single serialized connection.
#[derive(Clone)]
pub struct AnnotationStore {
    conn: Arc<Mutex<Connection>>,
}

impl AnnotationStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| StudyError::Persistence(format!("Failed to open annotation store: {e}")))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS user_annotations (
                verse_id  TEXT PRIMARY KEY,
                highlight TEXT,
                note      TEXT
            );",
        )
        .map_err(|e| StudyError::Persistence(format!("Failed to initialize annotation store: {e}")))?;

        info!(path = %path.display(), "Annotation store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fetch the annotation for a verse, if any
    pub async fn get(&self, verse_id: &str) -> Result<Option<UserAnnotation>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT verse_id, highlight, note FROM user_annotations WHERE verse_id = ?1",
            params![verse_id],
            row_to_annotation,
        )
        .optional()
        .map_err(|e| StudyError::Persistence(format!("Failed to read annotation: {e}")))
    }

    /// Fetch all annotations (order irrelevant)
    pub async fn get_all(&self) -> Result<Vec<UserAnnotation>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT verse_id, highlight, note FROM user_annotations")
            .map_err(|e| StudyError::Persistence(format!("Failed to read annotations: {e}")))?;

        let rows = stmt
            .query_map([], row_to_annotation)
            .map_err(|e| StudyError::Persistence(format!("Failed to read annotations: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StudyError::Persistence(format!("Failed to read annotations: {e}")))
    }

    /// Upsert an annotation, replacing the full record for its verse id
    pub async fn put(&self, annotation: &UserAnnotation) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_annotations (verse_id, highlight, note)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(verse_id) DO UPDATE SET
                 highlight = excluded.highlight,
                 note = excluded.note",
            params![
                annotation.verse_id,
                annotation.highlight.map(|h| h.as_str()),
                annotation.note,
            ],
        )
        .map_err(|e| StudyError::Persistence(format!("Failed to save annotation: {e}")))?;

        debug!(verse_id = %annotation.verse_id, "Annotation saved");
        Ok(())
    }

    /// Delete the annotation for a verse. Deleting a missing record is a
    /// no-op.
    pub async fn delete(&self, verse_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM user_annotations WHERE verse_id = ?1",
            params![verse_id],
        )
        .map_err(|e| StudyError::Persistence(format!("Failed to delete annotation: {e}")))?;

        debug!(verse_id = verse_id, "Annotation deleted");
        Ok(())
    }
}

fn row_to_annotation(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserAnnotation> {
    let highlight: Option<String> = row.get(1)?;
    Ok(UserAnnotation {
        verse_id: row.get(0)?,
        highlight: highlight.as_deref().and_then(Highlight::from_str),
        note: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (AnnotationStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = AnnotationStore::open(dir.path().join("user.db")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (store, _dir) = temp_store();

        let annotation = UserAnnotation {
            verse_id: "KJV_Genesis_1_1".to_string(),
            highlight: Some(Highlight::Yellow),
            note: None,
        };
        store.put(&annotation).await.unwrap();

        let got = store.get("KJV_Genesis_1_1").await.unwrap().unwrap();
        assert_eq!(got, annotation);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (store, _dir) = temp_store();
        assert!(store.get("KJV_Genesis_1_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_full_record() {
        let (store, _dir) = temp_store();

        store
            .put(&UserAnnotation {
                verse_id: "KJV_John_3_16".to_string(),
                highlight: Some(Highlight::Green),
                note: Some("For God so loved".to_string()),
            })
            .await
            .unwrap();

        // Full-record replace: a put without the note drops the note
        store
            .put(&UserAnnotation {
                verse_id: "KJV_John_3_16".to_string(),
                highlight: Some(Highlight::Pink),
                note: None,
            })
            .await
            .unwrap();

        let got = store.get("KJV_John_3_16").await.unwrap().unwrap();
        assert_eq!(got.highlight, Some(Highlight::Pink));
        assert!(got.note.is_none());
    }

    #[tokio::test]
    async fn test_get_all() {
        let (store, _dir) = temp_store();

        for verse in ["KJV_Genesis_1_1", "KJV_Genesis_1_2", "KJV_Exodus_20_3"] {
            store
                .put(&UserAnnotation {
                    verse_id: verse.to_string(),
                    highlight: None,
                    note: Some("note".to_string()),
                })
                .await
                .unwrap();
        }

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = temp_store();

        store
            .put(&UserAnnotation {
                verse_id: "KJV_Psalms_23_1".to_string(),
                highlight: Some(Highlight::Yellow),
                note: None,
            })
            .await
            .unwrap();

        store.delete("KJV_Psalms_23_1").await.unwrap();
        assert!(store.get("KJV_Psalms_23_1").await.unwrap().is_none());

        // Deleting again is a no-op
        store.delete("KJV_Psalms_23_1").await.unwrap();
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user.db");

        {
            let store = AnnotationStore::open(&path).unwrap();
            store
                .put(&UserAnnotation {
                    verse_id: "KJV_Genesis_1_1".to_string(),
                    highlight: Some(Highlight::Yellow),
                    note: None,
                })
                .await
                .unwrap();
        }

        // Fresh handle, same file: simulated process restart
        let store = AnnotationStore::open(&path).unwrap();
        let got = store.get("KJV_Genesis_1_1").await.unwrap().unwrap();
        assert_eq!(got.highlight, Some(Highlight::Yellow));
    }
}
