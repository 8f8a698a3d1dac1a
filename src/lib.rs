//! Berea - offline-first scripture study data layer
//!
//! "They searched the scriptures daily" - Acts 17:11
//!
//! Berea fronts a hosted study backend (structured tables plus named
//! serverless functions) with a local expiring cache and a durable
//! annotation store, so the reader keeps working between sessions and
//! repeat lookups never hit the network.
//!
//! ## Components
//!
//! - **Cache**: TTL key/value cache over a pluggable persistent medium
//! - **Store**: durable local store for user annotations (highlights, notes)
//! - **Gateway**: typed access to backend tables and remote functions
//! - **Manager**: per-category enrichment orchestration with preloading

pub mod cache;
pub mod config;
pub mod enrichment;
pub mod gateway;
pub mod manager;
pub mod store;
pub mod types;
pub mod verse;

pub use config::Args;
pub use manager::VerseDataManager;
pub use types::{Result, StudyError};
pub use verse::VerseId;
