//! Backend transport trait
//!
//! The seam between the study data layer and the hosted backend. "No
//! rows" is a normal outcome (`Ok(None)` / empty vec), never an error;
//! only transport and query failures propagate. Tests implement this
//! trait in memory.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Result;

/// Equality filter on a column
pub type Filter<'a> = (&'a str, Value);

/// Transport to the hosted study backend
#[async_trait]
pub trait StudyBackend: Send + Sync {
    /// Select at most one row matching all filters
    async fn select_one(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter<'_>],
    ) -> Result<Option<Value>>;

    /// Select all rows matching all filters, optionally ordered by a column
    async fn select_many(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter<'_>],
        order: Option<&str>,
    ) -> Result<Vec<Value>>;

    /// Select rows whose `column` value is one of `values`
    async fn select_in(
        &self,
        table: &str,
        columns: &str,
        column: &str,
        values: &[Value],
    ) -> Result<Vec<Value>>;

    /// Insert a row and return it (including generated columns)
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    /// Upsert a row, merging on the given conflict key
    async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<()>;

    /// Invoke a named remote function with a JSON payload.
    ///
    /// Both transport failures and an application-level `{error}` field in
    /// a successful response surface as the same error channel.
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value>;
}
