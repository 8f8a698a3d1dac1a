//! Berea - local study data layer for Bible reading
//!
//! "They searched the scriptures daily" - Acts 17:11

use clap::Parser;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use berea::{
    cache::{CacheMedium, ExpiringCache, FileMedium},
    config::{Args, Command},
    gateway::{StudyGateway, SupabaseBackend},
    manager::{UserPreferences, VerseDataManager, VersePreview},
    store::{AnnotationStore, Highlight, UserAnnotation},
    VerseId,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("berea={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let data_dir = args.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    info!("======================================");
    info!("  Berea - Bible study data layer");
    info!("  \"They searched the scriptures daily\"");
    info!("======================================");
    info!("Backend: {}", args.backend_url);
    info!("Data dir: {}", data_dir.display());
    info!("Cache TTL: {}h", args.cache_ttl_hours);
    info!("======================================");

    let backend = SupabaseBackend::new(&args.backend_url, &args.api_key, args.request_timeout())?;
    let gateway = Arc::new(StudyGateway::new(Arc::new(backend)));

    let medium: Arc<dyn CacheMedium> = Arc::new(FileMedium::new(data_dir.join("cache"))?);
    let cache = ExpiringCache::with_ttl(medium, args.cache_ttl());

    let store = AnnotationStore::open(data_dir.join("annotations.db"))?;
    let manager = VerseDataManager::new(cache, gateway);

    match args.command {
        Command::Fetch {
            verse_id,
            verse_text,
            sections,
            tone,
            viewpoint,
            denomination,
        } => {
            let preferences = UserPreferences {
                tone,
                theological_viewpoint: viewpoint,
                denomination,
            };
            let output = fetch_sections(&manager, &verse_id, &verse_text, &sections, &preferences).await;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Note { verse_id, text } => {
            VerseId::parse(&verse_id)?;
            let mut annotation = store
                .get(&verse_id)
                .await?
                .unwrap_or_else(|| UserAnnotation {
                    verse_id: verse_id.clone(),
                    highlight: None,
                    note: None,
                });
            annotation.note = Some(text);
            store.put(&annotation).await?;
            info!(verse_id = %annotation.verse_id, "Note saved");
        }

        Command::Highlight { verse_id, color } => {
            VerseId::parse(&verse_id)?;
            let highlight = match color.as_str() {
                "none" => None,
                "yellow" => Some(Highlight::Yellow),
                "green" => Some(Highlight::Green),
                "pink" => Some(Highlight::Pink),
                other => anyhow::bail!(
                    "Unknown highlight color '{other}' (expected yellow, green, pink, or none)"
                ),
            };
            let mut annotation = store
                .get(&verse_id)
                .await?
                .unwrap_or_else(|| UserAnnotation {
                    verse_id: verse_id.clone(),
                    highlight: None,
                    note: None,
                });
            annotation.highlight = highlight;
            store.put(&annotation).await?;
            info!(verse_id = %annotation.verse_id, "Highlight saved");
        }

        Command::Annotations { verse_id } => {
            let output = match verse_id {
                Some(id) => serde_json::to_value(store.get(&id).await?)?,
                None => serde_json::to_value(store.get_all().await?)?,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Forget { verse_id } => {
            store.delete(&verse_id).await?;
            info!(verse_id = %verse_id, "Annotation deleted");
        }

        Command::Books => {
            let books = manager.gateway().list_books().await?;
            let listing: Vec<_> = books
                .iter()
                .map(|b| json!({"name": b.name, "testament": b.testament, "order": b.book_order}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }

        Command::Warm { verse_id, count } => {
            let start = VerseId::parse(&verse_id)?;
            // Spans of verse ids in the same chapter; texts are unknown
            // here, so only text-independent sections get warmed fully.
            let previews: Vec<VersePreview> = (0..=count as u32)
                .map(|offset| VersePreview {
                    id: VerseId {
                        verse: start.verse + offset,
                        ..start.clone()
                    }
                    .to_string(),
                    text: String::new(),
                })
                .collect();
            let report = manager
                .preload_upcoming(&previews, 0, count, &start.translation, &UserPreferences::default())
                .await;
            info!(
                verses = report.verse_ids.len(),
                fetches = report.fetches,
                failures = report.failures,
                "Cache warmed"
            );
        }
    }

    Ok(())
}

fn wants(sections: &[String], name: &str) -> bool {
    sections.is_empty() || sections.iter().any(|s| s == name)
}

/// Fetch the requested enrichment sections into one JSON object. Failed
/// sections render as `{"error": ...}` next to their siblings.
async fn fetch_sections(
    manager: &VerseDataManager,
    verse_id: &str,
    verse_text: &str,
    sections: &[String],
    preferences: &UserPreferences,
) -> serde_json::Value {
    let translation = VerseId::parse(verse_id)
        .map(|v| v.translation)
        .unwrap_or_default();
    let mut output = json!({ "verse_id": verse_id });

    if wants(sections, "insights") {
        let data = manager
            .get_ai_insights(verse_id, verse_text, &translation, preferences)
            .await;
        output["ai_insights"] = json!(data);
    }
    if wants(sections, "map") {
        output["map_data"] = json!(manager.get_map_data(verse_id).await);
    }
    if wants(sections, "commentaries") {
        output["commentaries"] = json!(manager.get_commentaries(verse_id).await);
    }
    if wants(sections, "cross_references") {
        output["cross_references"] = json!(manager.get_cross_references(verse_id).await);
    }
    if wants(sections, "historical") {
        output["historical_context"] = json!(manager.get_historical_context(verse_id).await);
    }
    if wants(sections, "figures") {
        output["key_figures"] = json!(manager.get_key_figures(verse_id).await);
    }

    output
}
