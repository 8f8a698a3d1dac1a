//! Supabase REST transport
//!
//! Speaks PostgREST conventions against `/rest/v1/{table}` and invokes
//! serverless functions at `/functions/v1/{name}`. A "maybe single" select
//! is a `limit=1` query whose empty result is `Ok(None)`, so an absent row
//! never becomes an HTTP error.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::backend::{Filter, StudyBackend};
use crate::types::{Result, StudyError};

/// HTTP transport to a Supabase-style backend
pub struct SupabaseBackend {
    base_url: String,
    client: reqwest::Client,
}

impl SupabaseBackend {
    /// Create a transport for the backend at `base_url` authenticated with
    /// `api_key`
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(api_key)
            .map_err(|e| StudyError::Internal(format!("Invalid API key header: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| StudyError::Internal(format!("Invalid API key header: {e}")))?;
        headers.insert("apikey", key_value);
        headers.insert("Authorization", bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| StudyError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn table_url(&self, table: &str, query: &[(String, String)]) -> String {
        let mut url = format!("{}/rest/v1/{}", self.base_url, table);
        let mut sep = '?';
        for (k, v) in query {
            url.push(sep);
            url.push_str(k);
            url.push('=');
            url.push_str(&urlencoding::encode(v));
            sep = '&';
        }
        url
    }

    /// Render a filter value as a PostgREST literal
    fn literal(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Render a value for an `in.(...)` list. Strings are double-quoted
    /// (with `\` and `"` escaped) so embedded `,` or `)` cannot split the
    /// list.
    fn in_literal(value: &Value) -> String {
        match value {
            Value::String(s) => {
                format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            other => other.to_string(),
        }
    }

    fn filter_query(columns: &str, filters: &[Filter<'_>]) -> Vec<(String, String)> {
        let mut query = vec![("select".to_string(), columns.to_string())];
        for (column, value) in filters {
            query.push((column.to_string(), format!("eq.{}", Self::literal(value))));
        }
        query
    }

    async fn fetch_rows(&self, table: &str, query: &[(String, String)]) -> Result<Vec<Value>> {
        let url = self.table_url(table, query);
        debug!(url = %url, "Backend select");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StudyError::Transport(format!("Request to '{table}' failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StudyError::Transport(format!(
                "Query on '{table}' returned HTTP {status}: {body}"
            )));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| StudyError::Transport(format!("Malformed response from '{table}': {e}")))
    }
}

#[async_trait]
impl StudyBackend for SupabaseBackend {
    async fn select_one(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter<'_>],
    ) -> Result<Option<Value>> {
        let mut query = Self::filter_query(columns, filters);
        query.push(("limit".to_string(), "1".to_string()));
        let mut rows = self.fetch_rows(table, &query).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.remove(0))
        })
    }

    async fn select_many(
        &self,
        table: &str,
        columns: &str,
        filters: &[Filter<'_>],
        order: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut query = Self::filter_query(columns, filters);
        if let Some(column) = order {
            query.push(("order".to_string(), format!("{column}.asc")));
        }
        self.fetch_rows(table, &query).await
    }

    async fn select_in(
        &self,
        table: &str,
        columns: &str,
        column: &str,
        values: &[Value],
    ) -> Result<Vec<Value>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let list = values
            .iter()
            .map(Self::in_literal)
            .collect::<Vec<_>>()
            .join(",");
        let query = vec![
            ("select".to_string(), columns.to_string()),
            (column.to_string(), format!("in.({list})")),
        ];
        self.fetch_rows(table, &query).await
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let url = self.table_url(table, &[("select".to_string(), "*".to_string())]);
        let response = self
            .client
            .post(&url)
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await
            .map_err(|e| StudyError::Transport(format!("Insert into '{table}' failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StudyError::Transport(format!(
                "Insert into '{table}' returned HTTP {status}: {body}"
            )));
        }

        let mut rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StudyError::Transport(format!("Malformed insert response from '{table}': {e}")))?;
        if rows.is_empty() {
            return Err(StudyError::Transport(format!(
                "Insert into '{table}' returned no row"
            )));
        }
        Ok(rows.remove(0))
    }

    async fn upsert(&self, table: &str, row: Value, on_conflict: &str) -> Result<()> {
        let url = self.table_url(
            table,
            &[("on_conflict".to_string(), on_conflict.to_string())],
        );
        let response = self
            .client
            .post(&url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await
            .map_err(|e| StudyError::Transport(format!("Upsert into '{table}' failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StudyError::Transport(format!(
                "Upsert into '{table}' returned HTTP {status}: {body}"
            )));
        }
        Ok(())
    }

    async fn invoke(&self, function: &str, payload: Value) -> Result<Value> {
        let url = format!("{}/functions/v1/{}", self.base_url, function);
        debug!(url = %url, "Invoking remote function");

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| StudyError::Transport(format!("Function '{function}' failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StudyError::Transport(format!(
                "Function '{function}' returned HTTP {status}: {body}"
            )));
        }

        let value: Value = response.json().await.map_err(|e| {
            StudyError::Transport(format!("Malformed response from function '{function}': {e}"))
        })?;

        // A 200 carrying an application error envelope is still a failure
        if let Some(message) = value.get("error").and_then(Value::as_str) {
            return Err(StudyError::Transport(format!(
                "Function '{function}' reported: {message}"
            )));
        }

        Ok(value)
    }
}
