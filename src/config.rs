//! Configuration for Berea
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Berea - local study data layer for Bible reading
///
/// "They searched the scriptures daily" - Acts 17:11
#[derive(Parser, Debug, Clone)]
#[command(name = "berea")]
#[command(about = "Caching study-data layer over a hosted Bible backend")]
pub struct Args {
    /// Base URL of the hosted backend (e.g. https://xyz.supabase.co)
    #[arg(long, env = "SUPABASE_URL")]
    pub backend_url: String,

    /// Anonymous API key for the hosted backend
    #[arg(long, env = "SUPABASE_ANON_KEY")]
    pub api_key: String,

    /// Directory for the local cache and annotation database
    /// (defaults to the platform data dir, e.g. ~/.local/share/berea)
    #[arg(long, env = "BEREA_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Cache time-to-live in hours
    #[arg(long, env = "CACHE_TTL_HOURS", default_value = "24")]
    pub cache_ttl_hours: u64,

    /// How many upcoming verses to preload after a fetch
    #[arg(long, env = "PRELOAD_COUNT", default_value = "3")]
    pub preload_count: usize,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do once the data layer is wired up
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch enrichment data for a verse and print it as JSON
    Fetch {
        /// Verse identifier, e.g. KJV_Genesis_1_1
        verse_id: String,
        /// The verse text (required for AI insights)
        #[arg(long, default_value = "")]
        verse_text: String,
        /// Sections to fetch (default: all)
        #[arg(long, value_delimiter = ',')]
        sections: Vec<String>,
        /// Preferred tone for AI insights
        #[arg(long)]
        tone: Option<String>,
        /// Theological viewpoint for AI insights
        #[arg(long)]
        viewpoint: Option<String>,
        /// Denomination for AI insights
        #[arg(long)]
        denomination: Option<String>,
    },
    /// Save or update a note on a verse
    Note {
        verse_id: String,
        text: String,
    },
    /// Set or clear a highlight on a verse (yellow, green, pink, or "none")
    Highlight {
        verse_id: String,
        color: String,
    },
    /// Show the stored annotation for a verse (or all annotations)
    Annotations {
        verse_id: Option<String>,
    },
    /// Delete the stored annotation for a verse
    Forget {
        verse_id: String,
    },
    /// List the books of the Bible known to the backend
    Books,
    /// Warm the cache for a span of verses in a chapter
    Warm {
        /// First verse of the span, e.g. KJV_John_3_16
        verse_id: String,
        /// How many following verses to include
        #[arg(long, default_value = "3")]
        count: usize,
    },
}

impl Args {
    /// Effective data directory, created on demand by the caller
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("berea")
        })
    }

    /// Cache TTL as a duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours * 60 * 60)
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.backend_url.trim().is_empty() {
            return Err("SUPABASE_URL must not be empty".to_string());
        }
        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            return Err("SUPABASE_URL must be an http(s) URL".to_string());
        }
        if self.api_key.trim().is_empty() {
            return Err("SUPABASE_ANON_KEY must not be empty".to_string());
        }
        if self.cache_ttl_hours == 0 {
            return Err("CACHE_TTL_HOURS must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(backend_url: &str, api_key: &str) -> Args {
        Args {
            backend_url: backend_url.to_string(),
            api_key: api_key.to_string(),
            data_dir: None,
            cache_ttl_hours: 24,
            preload_count: 3,
            request_timeout_ms: 30000,
            log_level: "info".to_string(),
            command: Command::Books,
        }
    }

    #[test]
    fn test_validate_accepts_https_backend() {
        assert!(args("https://x.supabase.co", "anon-key").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url_and_empty_key() {
        assert!(args("ftp://x", "anon-key").validate().is_err());
        assert!(args("https://x.supabase.co", " ").validate().is_err());
    }

    #[test]
    fn test_cache_ttl_conversion() {
        assert_eq!(args("https://x", "k").cache_ttl(), Duration::from_secs(86400));
    }
}
