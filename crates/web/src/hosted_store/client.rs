//! Supabase REST and storage client.

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{HostedStore, StoreError};
use crate::config::SupabaseConfig;

/// Uploaded objects are cacheable for an hour.
const UPLOAD_CACHE_CONTROL: &str = "max-age=3600";

/// Client for a Supabase project.
#[derive(Clone)]
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
}

impl SupabaseStore {
    /// Create a client with the project key set on every request.
    ///
    /// # Errors
    ///
    /// Returns error if the key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, StoreError> {
        let key = config.anon_key.expose_secret();

        let mut headers = HeaderMap::new();
        let mut apikey = HeaderValue::from_str(key)
            .map_err(|e| StoreError::Parse(format!("Invalid API key format: {e}")))?;
        apikey.set_sensitive(true);
        headers.insert("apikey", apikey);

        let mut bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| StoreError::Parse(format!("Invalid API key format: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{bucket}/{path}", self.base_url)
    }

    /// Public URL of an uploaded object.
    #[must_use]
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}

/// Turn a non-success response into [`StoreError::Api`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(StoreError::Api {
        status: status.as_u16(),
        message: store_message(&message),
    })
}

/// Extract the `message` field PostgREST and storage put in error bodies.
fn store_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl HostedStore for SupabaseStore {
    #[instrument(skip(self, row), fields(table = %table))]
    async fn insert(&self, table: &str, row: Value) -> Result<Value, StoreError> {
        let response = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let response = check_status(response).await?;

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        let stored = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Parse("insert returned no rows".to_string()))?;

        debug!("Row stored");
        Ok(stored)
    }

    #[instrument(skip(self), fields(table = %table, column = %column))]
    async fn delete_where(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let url = format!(
            "{}?{column}=eq.{}",
            self.table_url(table),
            urlencoding::encode(value)
        );
        let response = self.client.delete(url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(table = %table))]
    async fn probe(&self, table: &str) -> Result<(), StoreError> {
        let url = format!("{}?select=count&limit=1", self.table_url(table));
        let response = self.client.get(url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip(self, bytes), fields(bucket = %bucket, path = %path, size = bytes.len()))]
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<String, StoreError> {
        let response = self
            .client
            .post(self.object_url(bucket, path))
            .header(CONTENT_TYPE, content_type)
            .header("cache-control", UPLOAD_CACHE_CONTROL)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        check_status(response).await?;

        let url = self.public_url(bucket, path);
        debug!(url = %url, "File uploaded");
        Ok(url)
    }
}
