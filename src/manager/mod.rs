//! Verse data manager
//!
//! Orchestrates the expiring cache and the remote gateway per enrichment
//! category. Every retrieval follows the same shape: validate the verse
//! id, check the local cache, fall back to the backend (via the shared
//! server cache for AI insights), repopulate the cache, and return a
//! `SectionData` value. No error crosses this layer's boundary: one
//! failing category degrades to an inline error without cascading.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{cache_key, content_hash, Category, ExpiringCache};
use crate::cache::keys::params_hash;
use crate::enrichment::{
    Commentary, CrossReference, HistoricalContext, KeyFigure, MapData, SectionData,
};
use crate::gateway::StudyGateway;
use crate::verse::VerseId;

/// Fallback zoom when a location row doesn't carry one
const DEFAULT_MAP_ZOOM: u32 = 8;

/// Reader preferences that shape generated AI insights.
///
/// Hashed into the AI-insight cache key: changing any field yields fresh
/// content instead of a stale cache hit from another context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub theological_viewpoint: Option<String>,
    #[serde(default)]
    pub denomination: Option<String>,
}

/// A verse as displayed in the current chapter, for preloading
#[derive(Debug, Clone)]
pub struct VersePreview {
    pub id: String,
    pub text: String,
}

/// Outcome of a preload pass, countable by tests
#[derive(Debug, Default, Clone)]
pub struct PreloadReport {
    /// Verse ids a fetch was attempted for
    pub verse_ids: Vec<String>,
    /// Individual category fetches attempted
    pub fetches: usize,
    /// Fetches that ended in a failed section
    pub failures: usize,
}

/// Read-through orchestrator for per-verse enrichment data
pub struct VerseDataManager {
    cache: ExpiringCache,
    gateway: Arc<StudyGateway>,
}

impl VerseDataManager {
    pub fn new(cache: ExpiringCache, gateway: Arc<StudyGateway>) -> Self {
        Self { cache, gateway }
    }

    pub fn gateway(&self) -> &Arc<StudyGateway> {
        &self.gateway
    }

    // ========================================================================
    // AI insights
    // ========================================================================

    /// Fetch an AI insight for a verse.
    ///
    /// Tiers: local cache -> shared server cache (fresh rows only) ->
    /// remote function. A function hit repopulates both caches.
    pub async fn get_ai_insights(
        &self,
        verse_id: &str,
        verse_text: &str,
        translation: &str,
        preferences: &UserPreferences,
    ) -> SectionData<String> {
        let verse = match VerseId::parse(verse_id) {
            Ok(v) => v,
            Err(e) => return SectionData::Failed { error: e.to_string() },
        };

        let text_hash = content_hash(verse_text);
        let prefs_hash = params_hash(Some(preferences));
        let key = cache_key(Category::AiInsights, verse_id, &[&text_hash, &prefs_hash]);

        if let Some(cached) = self.cache.get::<String>(&key) {
            return SectionData::Ready(cached);
        }

        // Server cache tier: soft-fail, a broken tier never blocks the
        // function call.
        match self.gateway.resolve_verse_id(&verse).await {
            Ok(verse_row_id) => {
                match self
                    .gateway
                    .lookup_insight(verse_row_id, &text_hash, &prefs_hash)
                    .await
                {
                    Ok(Some(entry)) => {
                        let ttl = chrono::Duration::from_std(self.cache.ttl())
                            .unwrap_or_else(|_| chrono::Duration::hours(24));
                        if Utc::now() - entry.generated_at < ttl {
                            self.cache.set(&key, &entry.insight_text);
                            return SectionData::Ready(entry.insight_text);
                        }
                        debug!(verse_id, "Server cache entry stale, regenerating");
                    }
                    Ok(None) => {}
                    Err(e) => warn!(verse_id, error = %e, "Server cache check failed"),
                }
            }
            Err(e) => warn!(verse_id, error = %e, "Verse resolution for server cache failed"),
        }

        let payload = json!({
            "verseId": verse_id,
            "verseText": verse_text,
            "translation": translation,
            "preferences": preferences,
        });

        match self.gateway.backend().invoke("get-ai-insights", payload).await {
            Ok(response) => match response.get("insight").and_then(Value::as_str) {
                Some(insight) => {
                    let insight = insight.to_string();
                    self.cache.set(&key, &insight);

                    let model = response
                        .get("model")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    match self.gateway.resolve_verse_id(&verse).await {
                        Ok(verse_row_id) => {
                            self.gateway
                                .store_insight(verse_row_id, &text_hash, &prefs_hash, &insight, model)
                                .await;
                        }
                        Err(e) => {
                            warn!(verse_id, error = %e, "Skipping server cache write");
                        }
                    }

                    SectionData::Ready(insight)
                }
                None => SectionData::Failed {
                    error: "No AI insights available.".to_string(),
                },
            },
            Err(e) => SectionData::Failed { error: e.to_string() },
        }
    }

    // ========================================================================
    // Map data
    // ========================================================================

    /// Fetch map placement for a verse. `Ready(None)` means the verse has
    /// no known location; only located verses are cached.
    pub async fn get_map_data(&self, verse_id: &str) -> SectionData<Option<MapData>> {
        let verse = match VerseId::parse(verse_id) {
            Ok(v) => v,
            Err(e) => return SectionData::Failed { error: e.to_string() },
        };

        let key = cache_key(Category::MapData, verse_id, &[]);
        if let Some(cached) = self.cache.get::<MapData>(&key) {
            return SectionData::Ready(Some(cached));
        }

        match self.gateway.verse_location(&verse).await {
            Ok(Some(location)) => {
                let map = MapData {
                    lat: location.lat,
                    lon: location.lon,
                    zoom: location.zoom.unwrap_or(DEFAULT_MAP_ZOOM),
                    popup_text: format!("{} ({})", location.name, verse.reference()),
                };
                self.cache.set(&key, &map);
                SectionData::Ready(Some(map))
            }
            Ok(None) => SectionData::Ready(None),
            Err(e) => SectionData::Failed { error: e.to_string() },
        }
    }

    // ========================================================================
    // Commentaries and cross-references
    // ========================================================================

    /// Fetch published commentary excerpts for a verse
    pub async fn get_commentaries(&self, verse_id: &str) -> SectionData<Vec<Commentary>> {
        let verse = match VerseId::parse(verse_id) {
            Ok(v) => v,
            Err(e) => return SectionData::Failed { error: e.to_string() },
        };

        let key = cache_key(Category::Commentaries, verse_id, &[]);
        if let Some(cached) = self.cache.get::<Vec<Commentary>>(&key) {
            return SectionData::Ready(cached);
        }

        let result = self
            .gateway
            .query_rows(
                "commentaries",
                "source_name, commentary_text, author, publication_year",
                "verse_id",
                &verse,
            )
            .await
            .map(|rows| deserialize_rows(rows, "commentaries"));

        match result {
            Ok(commentaries) => {
                self.cache.set(&key, &commentaries);
                SectionData::Ready(commentaries)
            }
            Err(e) => SectionData::Failed { error: e.to_string() },
        }
    }

    /// Fetch cross-references out of a verse
    pub async fn get_cross_references(&self, verse_id: &str) -> SectionData<Vec<CrossReference>> {
        let verse = match VerseId::parse(verse_id) {
            Ok(v) => v,
            Err(e) => return SectionData::Failed { error: e.to_string() },
        };

        let key = cache_key(Category::CrossReferences, verse_id, &[]);
        if let Some(cached) = self.cache.get::<Vec<CrossReference>>(&key) {
            return SectionData::Ready(cached);
        }

        let result = self
            .gateway
            .query_rows(
                "cross_references",
                "target_verse_id, description",
                "source_verse_id",
                &verse,
            )
            .await
            .map(|rows| deserialize_rows(rows, "cross_references"));

        match result {
            Ok(refs) => {
                self.cache.set(&key, &refs);
                SectionData::Ready(refs)
            }
            Err(e) => SectionData::Failed { error: e.to_string() },
        }
    }

    // ========================================================================
    // Historical context
    // ========================================================================

    /// Fetch the historical-context record for a verse, if any
    pub async fn get_historical_context(
        &self,
        verse_id: &str,
    ) -> SectionData<Option<HistoricalContext>> {
        let verse = match VerseId::parse(verse_id) {
            Ok(v) => v,
            Err(e) => return SectionData::Failed { error: e.to_string() },
        };

        let key = cache_key(Category::HistoricalContext, verse_id, &[]);
        if let Some(cached) = self.cache.get::<HistoricalContext>(&key) {
            return SectionData::Ready(Some(cached));
        }

        match self
            .gateway
            .query_row("historical_contexts", "context_text, tags", "verse_id", &verse)
            .await
        {
            Ok(Some(row)) => match serde_json::from_value::<HistoricalContext>(row) {
                Ok(context) => {
                    self.cache.set(&key, &context);
                    SectionData::Ready(Some(context))
                }
                Err(e) => SectionData::Failed {
                    error: format!("Malformed historical context: {e}"),
                },
            },
            Ok(None) => SectionData::Ready(None),
            Err(e) => SectionData::Failed { error: e.to_string() },
        }
    }

    // ========================================================================
    // Key figures
    // ========================================================================

    /// Fetch the people linked to a verse, joining each link's mention
    /// type onto the figure record
    pub async fn get_key_figures(&self, verse_id: &str) -> SectionData<Vec<KeyFigure>> {
        let verse = match VerseId::parse(verse_id) {
            Ok(v) => v,
            Err(e) => return SectionData::Failed { error: e.to_string() },
        };

        let key = cache_key(Category::KeyFigures, verse_id, &[]);
        if let Some(cached) = self.cache.get::<Vec<KeyFigure>>(&key) {
            return SectionData::Ready(cached);
        }

        match self.fetch_key_figures(&verse).await {
            Ok(figures) => {
                self.cache.set(&key, &figures);
                SectionData::Ready(figures)
            }
            Err(e) => SectionData::Failed { error: e.to_string() },
        }
    }

    async fn fetch_key_figures(&self, verse: &VerseId) -> crate::types::Result<Vec<KeyFigure>> {
        let verse_row_id = self.gateway.resolve_verse_id(verse).await?;

        let links = self
            .gateway
            .backend()
            .select_many(
                "verse_key_figures",
                "key_figure_id, mention_type",
                &[("verse_id", json!(verse_row_id))],
                None,
            )
            .await?;

        if links.is_empty() {
            return Ok(Vec::new());
        }

        let figure_ids: Vec<Value> = links
            .iter()
            .filter_map(|link| link.get("key_figure_id").cloned())
            .collect();

        let rows = self
            .gateway
            .backend()
            .select_in(
                "key_figures",
                "id, figure_name, description, related_verses",
                "id",
                &figure_ids,
            )
            .await?;

        let mut figures: Vec<KeyFigure> = deserialize_rows(rows, "key_figures");
        for figure in &mut figures {
            if let Some(mention) = links.iter().find_map(|link| {
                (link.get("key_figure_id").and_then(Value::as_i64) == Some(figure.id))
                    .then(|| link.get("mention_type").and_then(Value::as_str))
                    .flatten()
            }) {
                figure.mention_type = mention.to_string();
            }
        }

        Ok(figures)
    }

    // ========================================================================
    // Preloading
    // ========================================================================

    /// Eagerly fetch AI insights and commentaries for the next `count`
    /// verses after `current_index`, warming the cache for likely
    /// navigation. Best-effort: failures are counted, never surfaced, and
    /// the current verse itself is never refetched here.
    pub async fn preload_upcoming(
        &self,
        verses: &[VersePreview],
        current_index: usize,
        count: usize,
        translation: &str,
        preferences: &UserPreferences,
    ) -> PreloadReport {
        let mut report = PreloadReport::default();
        let mut fetches = Vec::new();

        for offset in 1..=count {
            let Some(verse) = verses.get(current_index + offset) else {
                break;
            };
            if VerseId::parse(&verse.id).is_err() {
                continue;
            }
            report.verse_ids.push(verse.id.clone());

            let id = verse.id.clone();
            let text = verse.text.clone();
            fetches.push(async move {
                let insight = self
                    .get_ai_insights(&id, &text, translation, preferences)
                    .await;
                let commentaries = self.get_commentaries(&id).await;
                let failures =
                    usize::from(!insight.is_ready()) + usize::from(!commentaries.is_ready());
                if failures > 0 {
                    debug!(verse_id = %id, failures, "Preload fetch failed");
                }
                failures
            });
        }

        report.fetches = report.verse_ids.len() * 2;
        for failures in join_all(fetches).await {
            report.failures += failures;
        }

        debug!(
            verses = report.verse_ids.len(),
            failures = report.failures,
            "Preload pass complete"
        );
        report
    }
}

/// Deserialize backend rows into records, skipping malformed rows with a
/// warning rather than failing the whole section
fn deserialize_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>, table: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(table = table, error = %e, "Skipping malformed row");
                None
            }
        })
        .collect()
}
