//! Index store client
//!
//! `IndexStore` is the boundary the handler writes through; `PilosaClient`
//! implements it over the store's HTTP API with reqwest.

use super::pql::PqlBatchQuery;
use super::schema::{Field, Schema};
use crate::core::errors::{HandlerError, HandlerResult};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Body of a successful query response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
}

/// Query body as the store returns it; a failed query may still come back 2xx
#[derive(Debug, Deserialize)]
struct QueryBody {
    #[serde(default)]
    results: Vec<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Operations the handler needs from the index store
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Fetch the schema currently stored on the server
    async fn read_schema(&self) -> HandlerResult<Schema>;

    /// Create an index; succeeds if it already exists
    async fn create_index(&self, index: &str) -> HandlerResult<()>;

    /// Create a field; succeeds if it already exists
    async fn create_field(&self, index: &str, field: &Field) -> HandlerResult<()>;

    /// Execute a batch of write queries as one request
    async fn query(&self, batch: &PqlBatchQuery) -> HandlerResult<QueryResponse>;

    /// Make the server schema contain everything `schema` declares.
    ///
    /// Idempotent: a second call against an up-to-date store creates nothing.
    async fn sync_schema(&self, schema: &Schema) -> HandlerResult<()> {
        let server = self.read_schema().await?;
        let diff = schema.diff(&server)?;
        if diff.is_empty() {
            debug!("Store schema is up to date");
            return Ok(());
        }

        for index in &diff.missing_indexes {
            info!("Creating index {}", index);
            self.create_index(index).await?;
        }
        for (index, field) in &diff.missing_fields {
            info!(
                "Creating field {}.{} ({})",
                index,
                field.name,
                field.options.type_name()
            );
            self.create_field(index, field).await?;
        }

        Ok(())
    }
}

/// Opens store connections for a configured address
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: IndexStore;

    async fn connect(&self, address: &str) -> HandlerResult<Self::Store>;
}

/// HTTP client for a single store node
#[derive(Debug, Clone)]
pub struct PilosaClient {
    base_url: String,
    http_client: Client,
}

impl PilosaClient {
    /// Create a client for `address` (`host:port` or a full http(s) URL)
    pub fn new(address: &str, timeout: Duration) -> HandlerResult<Self> {
        let base_url = normalize_address(address)?;
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> HandlerResult<Response> {
        request
            .send()
            .await
            .map_err(|e| HandlerError::connection_with_source(format!("request to {} failed", url), e))
    }

    /// POST a create request, treating 409 Conflict as "already exists"
    async fn create(&self, path: &str, options: serde_json::Value) -> HandlerResult<()> {
        let url = self.url(path);
        let body = serde_json::json!({ "options": options });
        let response = self
            .send(self.http_client.post(&url).json(&body), &url)
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            debug!("{} already exists", path);
            return Ok(());
        }
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl IndexStore for PilosaClient {
    async fn read_schema(&self) -> HandlerResult<Schema> {
        let url = self.url("/schema");
        let response = self.send(self.http_client.get(&url), &url).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn create_index(&self, index: &str) -> HandlerResult<()> {
        self.create(&format!("/index/{}", index), serde_json::json!({}))
            .await
    }

    async fn create_field(&self, index: &str, field: &Field) -> HandlerResult<()> {
        let options = serde_json::to_value(&field.options)?;
        self.create(&format!("/index/{}/field/{}", index, field.name), options)
            .await
    }

    async fn query(&self, batch: &PqlBatchQuery) -> HandlerResult<QueryResponse> {
        let url = self.url(&format!("/index/{}/query", batch.index()));
        let pql = batch.serialize();
        debug!("Submitting {} queries to {}", batch.len(), url);

        let response = self
            .send(self.http_client.post(&url).body(pql), &url)
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(response).await);
        }
        let body: QueryBody = serde_json::from_str(&response.text().await?)?;
        match body.error {
            Some(error) => Err(HandlerError::store(
                Some(status.as_u16()),
                format!("query failed: {}", error),
            )),
            None => Ok(QueryResponse {
                results: body.results,
            }),
        }
    }
}

/// Connector producing `PilosaClient`s with a fixed request timeout
#[derive(Debug, Clone)]
pub struct PilosaConnector {
    timeout: Duration,
}

impl PilosaConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl StoreConnector for PilosaConnector {
    type Store = PilosaClient;

    async fn connect(&self, address: &str) -> HandlerResult<PilosaClient> {
        let client = PilosaClient::new(address, self.timeout)?;
        info!("Using index store at {}", client.base_url());
        Ok(client)
    }
}

/// Turn `host:port` into `http://host:port`, dropping any trailing slash
pub fn normalize_address(address: &str) -> HandlerResult<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(HandlerError::config("Index store address cannot be empty"));
    }

    let url = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else if address.contains("://") {
        return Err(HandlerError::config(format!(
            "Unsupported scheme in index store address: {}",
            address
        )));
    } else {
        format!("http://{}", address)
    };

    Ok(url.trim_end_matches('/').to_string())
}

async fn error_from_response(response: Response) -> HandlerError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    HandlerError::store(Some(status.as_u16()), error_message(status, &body))
}

fn error_message(status: StatusCode, body: &str) -> String {
    let detail = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => body.trim().to_string(),
    };
    if detail.is_empty() {
        format!("server returned {}", status)
    } else {
        format!("server returned {}: {}", status, detail)
    }
}
