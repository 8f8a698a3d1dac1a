//! Remote data gateway
//!
//! Typed access to the hosted study backend: equality-filtered table
//! selects, inserts, conflict-keyed upserts, and named function
//! invocation. `StudyGateway` layers verse-id resolution, get-or-create
//! semantics, and the shared server-side AI-insight cache on top of the
//! raw `StudyBackend` transport.

pub mod backend;
pub mod resolve;
pub mod rest;

pub use backend::StudyBackend;
pub use resolve::{Book, ServerInsight, StudyGateway, VerseLocation};
pub use rest::SupabaseBackend;
