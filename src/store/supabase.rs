//! Supabase REST client for the session document table.
//!
//! Documents live in one table, one row per rater: `user_id` (unique key)
//! plus a `data` JSON column holding the full session document. Saves are
//! whole-row upserts, so concurrent writers resolve to last-write-wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::store::{DocumentStore, StoreError};

/// Configuration for the Supabase store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project base URL, e.g. `https://abcdefgh.supabase.co`.
    pub url: String,
    pub anon_key: String,
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "ratings".to_string()
}

impl SupabaseConfig {
    /// Credentials with the default table.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            table: default_table(),
        }
    }
}

/// Supabase REST API client
pub struct SupabaseStore {
    base_url: String,
    anon_key: String,
    table: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Row {
    data: Value,
}

impl SupabaseStore {
    /// Create a new Supabase client
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            base_url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            table: table.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Create from config
    pub fn from_config(config: SupabaseConfig) -> Self {
        Self::new(config.url, config.anon_key, config.table)
    }

    /// Build the REST URL for the document table
    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl DocumentStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        let filter = format!("eq.{user_id}");
        let response = self
            .authed(self.client.get(self.table_url()))
            .query(&[("user_id", filter.as_str()), ("select", "data"), ("limit", "1")])
            .send()
            .await?;
        let response = Self::expect_success(response).await?;

        let bytes = response.bytes().await?;
        let rows: Vec<Row> = serde_json::from_slice(&bytes).map_err(StoreError::Decode)?;
        Ok(rows.into_iter().next().map(|row| row.data))
    }

    async fn upsert(&self, user_id: &str, document: &Value) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.post(self.table_url()))
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&json!([{ "user_id": user_id, "data": document }]))
            .send()
            .await?;
        Self::expect_success(response).await?;

        debug!(user = user_id, "document upserted");
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let filter = format!("eq.{user_id}");
        let response = self
            .authed(self.client.delete(self.table_url()))
            .query(&[("user_id", filter.as_str())])
            .send()
            .await?;
        Self::expect_success(response).await?;

        debug!(user = user_id, "document deleted");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let response = self
            .authed(self.client.get(self.table_url()))
            .query(&[("select", "user_id"), ("limit", "1")])
            .send()
            .await?;
        Self::expect_success(response).await?;
        Ok(())
    }
}
