//! Verse resolution and table access
//!
//! `StudyGateway` owns the reference caches (version/book/chapter id maps,
//! book and chapter listings) that the JS ancestor kept in module globals,
//! and the per-key locks that close the get-or-create insert race. The
//! four-stage resolve chain is the critical path for every per-verse
//! query: it short-circuits at the first missing link with an error naming
//! it.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::backend::{Filter, StudyBackend};
use crate::types::{Result, StudyError};
use crate::verse::VerseId;

/// One Bible book as listed by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub testament: String,
    pub book_order: i64,
}

/// A verse's place on the map, as stored in `verse_locations`
#[derive(Debug, Clone, PartialEq)]
pub struct VerseLocation {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub zoom: Option<u32>,
}

/// Row from the shared server-side AI-insight cache
#[derive(Debug, Clone)]
pub struct ServerInsight {
    pub insight_text: String,
    pub generated_at: DateTime<Utc>,
}

/// Gateway over the study backend with resolution and reference caching
pub struct StudyGateway {
    backend: Arc<dyn StudyBackend>,
    /// translation abbreviation -> bible_versions.id
    versions: DashMap<String, i64>,
    /// book name -> bible_books.id
    books: DashMap<String, i64>,
    /// (book id, chapter number) -> bible_chapters.id
    chapters: DashMap<(i64, u32), i64>,
    /// Ordered book listing, populated on first use
    book_list: tokio::sync::OnceCell<Vec<Book>>,
    /// book name -> ordered chapter numbers
    chapter_lists: DashMap<String, Vec<u32>>,
    /// Per-(table, match) locks serializing get_or_create
    create_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl StudyGateway {
    /// Create a gateway over the given transport
    pub fn new(backend: Arc<dyn StudyBackend>) -> Self {
        Self {
            backend,
            versions: DashMap::new(),
            books: DashMap::new(),
            chapters: DashMap::new(),
            book_list: tokio::sync::OnceCell::new(),
            chapter_lists: DashMap::new(),
            create_locks: DashMap::new(),
        }
    }

    /// The underlying transport (for function invocation)
    pub fn backend(&self) -> &Arc<dyn StudyBackend> {
        &self.backend
    }

    fn row_id(table: &str, row: &Value) -> Result<i64> {
        row.get("id").and_then(Value::as_i64).ok_or_else(|| {
            StudyError::Internal(format!("Row from '{table}' is missing an integer id"))
        })
    }

    async fn lookup_id(&self, table: &str, filters: &[Filter<'_>]) -> Result<Option<i64>> {
        match self.backend.select_one(table, "id", filters).await? {
            Some(row) => Ok(Some(Self::row_id(table, &row)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Verse resolution
    // ========================================================================

    /// Resolve a verse identifier to its backend row id.
    ///
    /// Stages: version -> book -> chapter -> verse, failing fast at the
    /// first missing link. Version, book, and chapter ids are cached; the
    /// verse id itself is not (one row per verse, rarely revisited by id).
    pub async fn resolve_verse_id(&self, verse: &VerseId) -> Result<i64> {
        let version_id = self.version_id(&verse.translation).await?;
        let book_id = self.book_id(&verse.book).await?;
        let chapter_id = self.chapter_id(book_id, &verse.book, verse.chapter).await?;

        let verse_row = self
            .lookup_id(
                "bible_verses",
                &[
                    ("version_id", json!(version_id)),
                    ("chapter_id", json!(chapter_id)),
                    ("verse_number", json!(verse.verse)),
                ],
            )
            .await?;

        verse_row.ok_or_else(|| {
            StudyError::NotFound(format!(
                "Verse {} not found in {} ch {} ({}).",
                verse.verse, verse.book, verse.chapter, verse.translation
            ))
        })
    }

    async fn version_id(&self, abbreviation: &str) -> Result<i64> {
        if let Some(id) = self.versions.get(abbreviation) {
            return Ok(*id);
        }
        let id = self
            .lookup_id("bible_versions", &[("abbreviation", json!(abbreviation))])
            .await?
            .ok_or_else(|| StudyError::NotFound(format!("Version '{abbreviation}' not found.")))?;
        self.versions.insert(abbreviation.to_string(), id);
        Ok(id)
    }

    async fn book_id(&self, name: &str) -> Result<i64> {
        if let Some(id) = self.books.get(name) {
            return Ok(*id);
        }
        let id = self
            .lookup_id("bible_books", &[("name", json!(name))])
            .await?
            .ok_or_else(|| StudyError::NotFound(format!("Book '{name}' not found.")))?;
        self.books.insert(name.to_string(), id);
        Ok(id)
    }

    async fn chapter_id(&self, book_id: i64, book_name: &str, chapter: u32) -> Result<i64> {
        if let Some(id) = self.chapters.get(&(book_id, chapter)) {
            return Ok(*id);
        }
        let id = self
            .lookup_id(
                "bible_chapters",
                &[
                    ("book_id", json!(book_id)),
                    ("chapter_number", json!(chapter)),
                ],
            )
            .await?
            .ok_or_else(|| {
                StudyError::NotFound(format!(
                    "Chapter {chapter} for book '{book_name}' not found."
                ))
            })?;
        self.chapters.insert((book_id, chapter), id);
        Ok(id)
    }

    // ========================================================================
    // Get-or-create
    // ========================================================================

    /// Look up a row by exact-match criteria, inserting `defaults` if
    /// absent. Returns the row id either way.
    ///
    /// Concurrent calls for the same missing row serialize through a
    /// per-(table, match) lock so exactly one insert happens; the remote
    /// unique constraint remains the backstop.
    pub async fn get_or_create(
        &self,
        table: &str,
        matches: &[Filter<'_>],
        defaults: Value,
    ) -> Result<i64> {
        let lock_key = format!(
            "{table}:{}",
            matches
                .iter()
                .map(|(c, v)| format!("{c}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        );
        let lock = self
            .create_locks
            .entry(lock_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            match self.lookup_id(table, matches).await {
                Ok(Some(id)) => Ok(id),
                Ok(None) => {
                    debug!(table = table, "get_or_create inserting new row");
                    match self.backend.insert(table, defaults).await {
                        Ok(row) => Self::row_id(table, &row),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            }
        };

        // Last holder out drops the map entry; waiters keep their own Arc
        self.create_locks
            .remove_if(&lock_key, |_, l| Arc::strong_count(l) <= 2);

        result
    }

    // ========================================================================
    // Verse-filtered queries
    // ========================================================================

    /// Select all rows from `table` whose `filter_column` references the
    /// resolved verse
    pub async fn query_rows(
        &self,
        table: &str,
        columns: &str,
        filter_column: &str,
        verse: &VerseId,
    ) -> Result<Vec<Value>> {
        let verse_row_id = self.resolve_verse_id(verse).await?;
        self.backend
            .select_many(table, columns, &[(filter_column, json!(verse_row_id))], None)
            .await
    }

    /// Select at most one row from `table` whose `filter_column` references
    /// the resolved verse
    pub async fn query_row(
        &self,
        table: &str,
        columns: &str,
        filter_column: &str,
        verse: &VerseId,
    ) -> Result<Option<Value>> {
        let verse_row_id = self.resolve_verse_id(verse).await?;
        self.backend
            .select_one(table, columns, &[(filter_column, json!(verse_row_id))])
            .await
    }

    // ========================================================================
    // Map locations
    // ========================================================================

    /// Fetch the map location attached to a verse, if any.
    ///
    /// A missing resolution stage means no location, not an error.
    pub async fn verse_location(&self, verse: &VerseId) -> Result<Option<VerseLocation>> {
        let verse_row_id = match self.resolve_verse_id(verse).await {
            Ok(id) => id,
            Err(StudyError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(row) = self
            .backend
            .select_one(
                "verse_locations",
                "location_name, latitude, longitude, zoom_level",
                &[("verse_id", json!(verse_row_id))],
            )
            .await?
        else {
            return Ok(None);
        };

        let name = row
            .get("location_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let (Some(lat), Some(lon)) = (
            coordinate(row.get("latitude")),
            coordinate(row.get("longitude")),
        ) else {
            warn!(verse = %verse, "Location row has unparseable coordinates");
            return Ok(None);
        };
        let zoom = row
            .get("zoom_level")
            .and_then(Value::as_u64)
            .map(|z| z as u32);

        Ok(Some(VerseLocation {
            name,
            lat,
            lon,
            zoom,
        }))
    }

    // ========================================================================
    // Server-side AI insight cache
    // ========================================================================

    /// Look up a shared server-cache entry for the given verse and input
    /// hashes
    pub async fn lookup_insight(
        &self,
        verse_row_id: i64,
        verse_text_hash: &str,
        preferences_hash: &str,
    ) -> Result<Option<ServerInsight>> {
        let Some(row) = self
            .backend
            .select_one(
                "ai_insights_cache",
                "insight_text, generated_at",
                &[
                    ("verse_id", json!(verse_row_id)),
                    ("verse_text_hash", json!(verse_text_hash)),
                    ("preferences_hash", json!(preferences_hash)),
                ],
            )
            .await?
        else {
            return Ok(None);
        };

        let insight_text = row
            .get("insight_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let generated_at = row
            .get("generated_at")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<DateTime<Utc>>().ok());

        match generated_at {
            Some(generated_at) => Ok(Some(ServerInsight {
                insight_text,
                generated_at,
            })),
            None => {
                warn!(verse_row_id, "Server cache row has unparseable generated_at");
                Ok(None)
            }
        }
    }

    /// Write an insight to the shared server cache. Best-effort: the local
    /// cache is the correctness path, so failures are logged and swallowed.
    pub async fn store_insight(
        &self,
        verse_row_id: i64,
        verse_text_hash: &str,
        preferences_hash: &str,
        insight: &str,
        model: &str,
    ) {
        let row = json!({
            "verse_id": verse_row_id,
            "verse_text_hash": verse_text_hash,
            "preferences_hash": preferences_hash,
            "insight_text": insight,
            "ai_model_version": model,
            "generated_at": Utc::now().to_rfc3339(),
        });

        if let Err(e) = self
            .backend
            .upsert(
                "ai_insights_cache",
                row,
                "verse_id,verse_text_hash,preferences_hash",
            )
            .await
        {
            warn!(verse_row_id, error = %e, "Failed to save insight to server cache");
        }
    }

    // ========================================================================
    // Reference listings
    // ========================================================================

    /// List all Bible books in canonical order. Fetched once and cached
    /// for the life of the gateway.
    pub async fn list_books(&self) -> Result<&[Book]> {
        let books = self
            .book_list
            .get_or_try_init(|| async {
                let rows = self
                    .backend
                    .select_many(
                        "bible_books",
                        "id, name, testament, book_order",
                        &[],
                        Some("book_order"),
                    )
                    .await?;
                let books: Vec<Book> = rows
                    .into_iter()
                    .filter_map(|row| serde_json::from_value(row).ok())
                    .collect();
                for book in &books {
                    self.books.insert(book.name.clone(), book.id);
                }
                Ok::<_, StudyError>(books)
            })
            .await?;
        Ok(books.as_slice())
    }

    /// Ordered chapter numbers for a book, cached per book
    pub async fn chapters_for_book(&self, book_name: &str) -> Result<Vec<u32>> {
        if let Some(chapters) = self.chapter_lists.get(book_name) {
            return Ok(chapters.clone());
        }

        let book_id = self.book_id(book_name).await?;
        let rows = self
            .backend
            .select_many(
                "bible_chapters",
                "chapter_number",
                &[("book_id", json!(book_id))],
                Some("chapter_number"),
            )
            .await?;

        let chapters: Vec<u32> = rows
            .iter()
            .filter_map(|row| row.get("chapter_number").and_then(Value::as_u64))
            .map(|n| n as u32)
            .collect();

        self.chapter_lists
            .insert(book_name.to_string(), chapters.clone());
        Ok(chapters)
    }
}

/// Parse a coordinate that the backend may store as a number or a string
fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
