//! End-to-end study flows against an in-memory backend
//!
//! The mock backend serves a tiny seeded Bible dataset and records every
//! call, so tests can assert not just what comes back but which queries
//! and function invocations actually happened.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use berea::cache::{content_hash, params_hash, CacheMedium, ExpiringCache, MemoryMedium};
use berea::gateway::backend::{Filter, StudyBackend};
use berea::gateway::StudyGateway;
use berea::manager::{PreloadReport, UserPreferences, VerseDataManager, VersePreview};
use berea::store::{AnnotationStore, Highlight, UserAnnotation};
use berea::types::Result;

// ============================================================================
// Mock backend
// ============================================================================

#[derive(Default)]
struct MockBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicI64,
    invokes: AtomicUsize,
    inserts: AtomicUsize,
}

impl MockBackend {
    /// Backend seeded with KJV Genesis 1:1-5 and supporting reference rows
    fn seeded() -> Self {
        let backend = MockBackend {
            next_id: AtomicI64::new(5000),
            ..Default::default()
        };
        {
            let mut tables = backend.tables.lock().unwrap();
            tables.insert(
                "bible_versions".into(),
                vec![json!({"id": 1, "abbreviation": "KJV"})],
            );
            tables.insert(
                "bible_books".into(),
                vec![
                    json!({"id": 10, "name": "Genesis", "testament": "OT", "book_order": 1}),
                    json!({"id": 43, "name": "John", "testament": "NT", "book_order": 43}),
                ],
            );
            tables.insert(
                "bible_chapters".into(),
                vec![json!({"id": 100, "book_id": 10, "chapter_number": 1})],
            );
            tables.insert(
                "bible_verses".into(),
                (1..=5)
                    .map(|v| {
                        json!({"id": 1000 + v, "version_id": 1, "chapter_id": 100, "verse_number": v})
                    })
                    .collect(),
            );
            tables.insert(
                "commentaries".into(),
                vec![json!({
                    "verse_id": 1001,
                    "source_name": "Matthew Henry",
                    "commentary_text": "In the beginning...",
                    "author": "Matthew Henry",
                    "publication_year": 1706
                })],
            );
        }
        backend
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls_touching(&self, table: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.ends_with(&format!(":{table}")))
            .count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn seed(&self, table: &str, row: Value) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    fn matching_rows(&self, table: &str, filters: &[Filter<'_>]) -> Vec<Value> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| {
                        filters
                            .iter()
                            .all(|(column, value)| row.get(*column) == Some(value))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl StudyBackend for MockBackend {
    async fn select_one(
        &self,
        table: &str,
        _columns: &str,
        filters: &[Filter<'_>],
    ) -> Result<Option<Value>> {
        self.record(format!("select_one:{table}"));
        Ok(self.matching_rows(table, filters).into_iter().next())
    }

    async fn select_many(
        &self,
        table: &str,
        _columns: &str,
        filters: &[Filter<'_>],
        _order: Option<&str>,
    ) -> Result<Vec<Value>> {
        self.record(format!("select_many:{table}"));
        Ok(self.matching_rows(table, filters))
    }

    async fn select_in(
        &self,
        table: &str,
        _columns: &str,
        column: &str,
        values: &[Value],
    ) -> Result<Vec<Value>> {
        self.record(format!("select_in:{table}"));
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get(column).is_some_and(|v| values.contains(v)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        self.record(format!("insert:{table}"));
        self.inserts.fetch_add(1, Ordering::SeqCst);

        let mut row = row;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        row["id"] = json!(id);
        self.seed(table, row.clone());
        Ok(row)
    }

    async fn upsert(&self, table: &str, row: Value, _on_conflict: &str) -> Result<()> {
        self.record(format!("upsert:{table}"));
        self.seed(table, row);
        Ok(())
    }

    async fn invoke(&self, function: &str, _payload: Value) -> Result<Value> {
        self.record(format!("invoke:{function}"));
        self.invokes.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"insight": "A generated insight.", "model": "test-model"}))
    }
}

fn manager_over(backend: Arc<MockBackend>) -> VerseDataManager {
    let medium: Arc<dyn CacheMedium> = Arc::new(MemoryMedium::new());
    let cache = ExpiringCache::new(medium);
    let gateway = Arc::new(StudyGateway::new(backend as Arc<dyn StudyBackend>));
    VerseDataManager::new(cache, gateway)
}

// ============================================================================
// AI insight tiers
// ============================================================================

#[tokio::test]
async fn test_ai_insight_generated_once_then_served_from_cache() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));
    let prefs = UserPreferences::default();

    let first = manager
        .get_ai_insights("KJV_Genesis_1_1", "In the beginning", "KJV", &prefs)
        .await;
    assert!(first.is_ready());
    assert_eq!(backend.invokes.load(Ordering::SeqCst), 1);
    // The generated insight was written back to the shared server cache
    assert_eq!(backend.calls_touching("ai_insights_cache"), 2);

    let second = manager
        .get_ai_insights("KJV_Genesis_1_1", "In the beginning", "KJV", &prefs)
        .await;
    assert_eq!(first, second);
    // Cache hit: no further invocation
    assert_eq!(backend.invokes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ai_insight_served_from_server_cache_without_invoking() {
    let backend = Arc::new(MockBackend::seeded());
    let prefs = UserPreferences {
        tone: Some("devotional".into()),
        ..Default::default()
    };
    backend.seed(
        "ai_insights_cache",
        json!({
            "verse_id": 1001,
            "verse_text_hash": content_hash("In the beginning"),
            "preferences_hash": params_hash(Some(&prefs)),
            "insight_text": "Shared insight from another reader.",
            "generated_at": Utc::now().to_rfc3339(),
        }),
    );

    let manager = manager_over(Arc::clone(&backend));
    let insight = manager
        .get_ai_insights("KJV_Genesis_1_1", "In the beginning", "KJV", &prefs)
        .await;

    assert!(insight.error().is_none());
    assert_eq!(backend.invokes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stale_server_cache_entry_regenerates() {
    let backend = Arc::new(MockBackend::seeded());
    let prefs = UserPreferences::default();
    backend.seed(
        "ai_insights_cache",
        json!({
            "verse_id": 1001,
            "verse_text_hash": content_hash("In the beginning"),
            "preferences_hash": params_hash(Some(&prefs)),
            "insight_text": "Yesterday's insight.",
            "generated_at": (Utc::now() - chrono::Duration::hours(25)).to_rfc3339(),
        }),
    );

    let manager = manager_over(Arc::clone(&backend));
    let insight = manager
        .get_ai_insights("KJV_Genesis_1_1", "In the beginning", "KJV", &prefs)
        .await;

    assert!(insight.is_ready());
    assert_eq!(backend.invokes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_different_preferences_generate_separately() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let plain = UserPreferences::default();
    let scholarly = UserPreferences {
        theological_viewpoint: Some("scholarly".into()),
        ..Default::default()
    };

    manager
        .get_ai_insights("KJV_Genesis_1_1", "In the beginning", "KJV", &plain)
        .await;
    manager
        .get_ai_insights("KJV_Genesis_1_1", "In the beginning", "KJV", &scholarly)
        .await;

    // Distinct preference hashes miss each other's cache entries
    assert_eq!(backend.invokes.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Validation short-circuit
// ============================================================================

#[tokio::test]
async fn test_invalid_verse_id_never_reaches_backend() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let result = manager
        .get_ai_insights("not-a-valid-id", "text", "KJV", &UserPreferences::default())
        .await;

    let error = result.error().expect("must fail");
    assert!(error.contains("format"));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_resolution_stops_at_first_missing_link() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let result = manager.get_commentaries("KJV_Atlantis_1_1").await;

    let error = result.error().expect("must fail");
    assert!(error.contains("Book 'Atlantis' not found."));
    // The chain stopped at the book stage
    assert_eq!(backend.calls_touching("bible_chapters"), 0);
    assert_eq!(backend.calls_touching("bible_verses"), 0);
}

// ============================================================================
// Per-category fetches
// ============================================================================

#[tokio::test]
async fn test_commentaries_fetch_then_cache() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let first = manager.get_commentaries("KJV_Genesis_1_1").await;
    match &first {
        berea::enrichment::SectionData::Ready(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].source_name, "Matthew Henry");
            assert_eq!(rows[0].publication_year, Some(1706));
        }
        other => panic!("expected commentaries, got {other:?}"),
    }

    let selects = backend.calls_touching("commentaries");
    manager.get_commentaries("KJV_Genesis_1_1").await;
    assert_eq!(backend.calls_touching("commentaries"), selects);
}

#[tokio::test]
async fn test_map_data_defaults_zoom_and_labels_marker() {
    let backend = Arc::new(MockBackend::seeded());
    backend.seed(
        "verse_locations",
        json!({
            "verse_id": 1001,
            "location_name": "Jerusalem",
            "latitude": "31.7683",
            "longitude": 35.2137,
            "zoom_level": null
        }),
    );

    let manager = manager_over(Arc::clone(&backend));
    let map = manager.get_map_data("KJV_Genesis_1_1").await;

    match map {
        berea::enrichment::SectionData::Ready(Some(data)) => {
            assert_eq!(data.lat, 31.7683);
            assert_eq!(data.lon, 35.2137);
            assert_eq!(data.zoom, 8);
            assert_eq!(data.popup_text, "Jerusalem (Genesis 1 1)");
        }
        other => panic!("expected map data, got {other:?}"),
    }
}

#[tokio::test]
async fn test_map_data_absent_location_is_ready_none() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let map = manager.get_map_data("KJV_Genesis_1_2").await;
    assert_eq!(map, berea::enrichment::SectionData::Ready(None));
}

#[tokio::test]
async fn test_key_figures_join_carries_mention_type() {
    let backend = Arc::new(MockBackend::seeded());
    backend.seed(
        "verse_key_figures",
        json!({"verse_id": 1001, "key_figure_id": 7, "mention_type": "central"}),
    );
    backend.seed(
        "key_figures",
        json!({"id": 7, "figure_name": "Adam", "description": "The first man"}),
    );

    let manager = manager_over(Arc::clone(&backend));
    let figures = manager.get_key_figures("KJV_Genesis_1_1").await;

    match figures {
        berea::enrichment::SectionData::Ready(list) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].figure_name, "Adam");
            assert_eq!(list[0].mention_type, "central");
        }
        other => panic!("expected key figures, got {other:?}"),
    }
}

#[tokio::test]
async fn test_key_figures_empty_links_skip_figure_lookup() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let figures = manager.get_key_figures("KJV_Genesis_1_1").await;
    assert_eq!(figures, berea::enrichment::SectionData::Ready(vec![]));
    assert_eq!(backend.calls_touching("key_figures"), 0);
}

#[tokio::test]
async fn test_historical_context_absent_is_ready_none() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let context = manager.get_historical_context("KJV_Genesis_1_1").await;
    assert_eq!(context, berea::enrichment::SectionData::Ready(None));
}

// ============================================================================
// Preloading
// ============================================================================

#[tokio::test]
async fn test_preload_warms_exactly_the_next_verses() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let verses: Vec<VersePreview> = (1..=5)
        .map(|v| VersePreview {
            id: format!("KJV_Genesis_1_{v}"),
            text: format!("verse {v} text"),
        })
        .collect();

    let report: PreloadReport = manager
        .preload_upcoming(&verses, 0, 3, "KJV", &UserPreferences::default())
        .await;

    // Indices 1, 2, 3 and nothing else: not the current verse, not index 4
    assert_eq!(
        report.verse_ids,
        vec!["KJV_Genesis_1_2", "KJV_Genesis_1_3", "KJV_Genesis_1_4"]
    );
    assert_eq!(report.fetches, 6);
    assert_eq!(report.failures, 0);
    assert_eq!(backend.invokes.load(Ordering::SeqCst), 3);

    // Navigating to a preloaded verse is now a pure cache hit
    let invokes_before = backend.invokes.load(Ordering::SeqCst);
    let insight = manager
        .get_ai_insights(
            "KJV_Genesis_1_2",
            "verse 2 text",
            "KJV",
            &UserPreferences::default(),
        )
        .await;
    assert!(insight.is_ready());
    assert_eq!(backend.invokes.load(Ordering::SeqCst), invokes_before);
}

#[tokio::test]
async fn test_preload_clamps_at_chapter_end() {
    let backend = Arc::new(MockBackend::seeded());
    let manager = manager_over(Arc::clone(&backend));

    let verses: Vec<VersePreview> = (1..=5)
        .map(|v| VersePreview {
            id: format!("KJV_Genesis_1_{v}"),
            text: format!("verse {v} text"),
        })
        .collect();

    let report = manager
        .preload_upcoming(&verses, 3, 3, "KJV", &UserPreferences::default())
        .await;
    assert_eq!(report.verse_ids, vec!["KJV_Genesis_1_5"]);
}

// ============================================================================
// Get-or-create
// ============================================================================

#[tokio::test]
async fn test_get_or_create_inserts_exactly_once() {
    let backend = Arc::new(MockBackend::seeded());
    let gateway = Arc::new(StudyGateway::new(
        Arc::clone(&backend) as Arc<dyn StudyBackend>
    ));

    let matches = [("reader_id", json!("r1")), ("verse_id", json!(1001))];
    let defaults = json!({"reader_id": "r1", "verse_id": 1001});

    let first = gateway
        .get_or_create("reading_progress", &matches, defaults.clone())
        .await
        .unwrap();
    let second = gateway
        .get_or_create("reading_progress", &matches, defaults)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.inserts.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Reference data
// ============================================================================

#[tokio::test]
async fn test_book_and_chapter_listings_fetch_once() {
    let backend = Arc::new(MockBackend::seeded());
    let gateway = Arc::new(StudyGateway::new(
        Arc::clone(&backend) as Arc<dyn StudyBackend>
    ));

    let books = gateway.list_books().await.unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].name, "Genesis");

    let chapters = gateway.chapters_for_book("Genesis").await.unwrap();
    assert_eq!(chapters, vec![1]);

    // Both listings are cached for the life of the gateway
    gateway.list_books().await.unwrap();
    gateway.chapters_for_book("Genesis").await.unwrap();
    assert_eq!(backend.calls_touching("bible_books"), 1);
    assert_eq!(backend.calls_touching("bible_chapters"), 1);
}

// ============================================================================
// Annotations
// ============================================================================

#[tokio::test]
async fn test_annotations_merge_and_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.db");

    {
        let store = AnnotationStore::open(&path).unwrap();
        store
            .put(&UserAnnotation {
                verse_id: "KJV_John_3_16".to_string(),
                highlight: Some(Highlight::Green),
                note: None,
            })
            .await
            .unwrap();

        // Caller-side merge: add a note without losing the highlight
        let mut annotation = store.get("KJV_John_3_16").await.unwrap().unwrap();
        annotation.note = Some("For God so loved the world".to_string());
        store.put(&annotation).await.unwrap();
    }

    let store = AnnotationStore::open(&path).unwrap();
    let got = store.get("KJV_John_3_16").await.unwrap().unwrap();
    assert_eq!(got.highlight, Some(Highlight::Green));
    assert_eq!(got.note.as_deref(), Some("For God so loved the world"));
}
