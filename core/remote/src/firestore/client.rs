//! Firestore REST API client.

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use reportsync_common::{AccessToken, Error, Result};

use super::value::{decode_fields, encode, encode_fields};
use crate::document::{Document, DocumentData};
use crate::store::{Connector, DocumentStore};

/// Firestore REST API base URL.
pub const FIRESTORE_API_BASE: &str = "https://firestore.googleapis.com/v1";
/// Database used when none is configured.
pub const DEFAULT_DATABASE: &str = "(default)";

/// Page size for collection listing.
const PAGE_SIZE: &str = "300";
/// Length of client-generated document IDs.
const AUTO_ID_LEN: usize = 20;

/// Connection settings for a Firestore database.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// Google Cloud project ID.
    pub project_id: String,
    /// Database ID inside the project.
    pub database_id: String,
    /// REST endpoint, overridable for the emulator.
    pub base_url: String,
    /// OAuth2 bearer token.
    pub access_token: AccessToken,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl FirestoreConfig {
    /// Create a configuration for the default database of a project.
    pub fn new(project_id: impl Into<String>, access_token: AccessToken) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: DEFAULT_DATABASE.to_string(),
            base_url: FIRESTORE_API_BASE.to_string(),
            access_token,
            timeout: Duration::from_secs(30),
        }
    }

    /// Use a named database.
    pub fn with_database(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = database_id.into();
        self
    }

    /// Point at another endpoint (e.g. the local emulator).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<RawDocument>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

/// Firestore client implementing [`DocumentStore`].
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base: Url,
    closed: AtomicBool,
}

impl FirestoreClient {
    /// Create a new client.
    ///
    /// # Errors
    /// - Empty project ID or token
    /// - Unparseable base URL
    /// - HTTP client construction failure
    pub fn new(config: FirestoreConfig) -> Result<Self> {
        if config.project_id.trim().is_empty() {
            return Err(Error::Config("Firestore project ID is empty".to_string()));
        }
        if config.access_token.is_empty() {
            return Err(Error::Config("Firestore access token is empty".to_string()));
        }

        let base = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid Firestore URL: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Firestore URL cannot be a base: {}",
                config.base_url
            )));
        }

        let http = Client::builder()
            .user_agent("reportsync/0.1")
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            base,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed(format!(
                "Firestore client for {}",
                self.config.project_id
            )));
        }
        Ok(())
    }

    /// Resource name of the documents root.
    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.config.project_id, self.config.database_id
        )
    }

    /// Full resource name of a document.
    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, id)
    }

    /// Build an endpoint URL from path segments below the documents root.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::Config("Firestore URL cannot be a base".to_string()))?;
            path.pop_if_empty();
            path.extend([
                "projects",
                self.config.project_id.as_str(),
                "databases",
                self.config.database_id.as_str(),
            ]);
            path.extend(segments);
        }
        Ok(url)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.config.access_token.secret())
    }

    /// Map a response to its JSON body or a store error.
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| Error::Serialization(format!("Invalid Firestore response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.error)
            .map(|e| {
                format!(
                    "{} ({})",
                    e.message.unwrap_or_default(),
                    e.status.unwrap_or_else(|| status.as_u16().to_string())
                )
            })
            .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body.trim()));

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(Error::Network(message))
        } else if status == StatusCode::NOT_FOUND {
            Err(Error::NotFound(message))
        } else {
            Err(Error::Storage(message))
        }
    }

    fn parse_document(raw: RawDocument) -> Result<Document> {
        let id = raw
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Serialization(format!("Bad document name: {}", raw.name)))?;
        Ok(Document::new(id, decode_fields(&raw.fields)))
    }

    /// Build a single commit write.
    ///
    /// `merge` restricts the write to the touched field paths; `exists`
    /// adds a precondition on the current document.
    fn build_write(
        &self,
        collection: &str,
        id: &str,
        data: &DocumentData,
        merge: bool,
        exists: Option<bool>,
    ) -> Value {
        let mut write = json!({
            "update": {
                "name": self.document_name(collection, id),
                "fields": encode_fields(data.fields()),
            }
        });

        if merge {
            let paths: Vec<String> = data.fields().keys().cloned().collect();
            write["updateMask"] = json!({ "fieldPaths": paths });
        }

        if !data.server_timestamp_fields().is_empty() {
            let transforms: Vec<Value> = data
                .server_timestamp_fields()
                .iter()
                .map(|path| json!({ "fieldPath": path, "setToServerValue": "REQUEST_TIME" }))
                .collect();
            write["updateTransforms"] = Value::Array(transforms);
        }

        if let Some(exists) = exists {
            write["currentDocument"] = json!({ "exists": exists });
        }

        write
    }

    async fn commit(&self, write: Value) -> Result<()> {
        let url = self.endpoint(&["documents:commit"])?;
        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, self.auth_header())
            .json(&json!({ "writes": [write] }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to commit write: {}", e)))?;

        let _: Value = self.handle_response(response).await?;
        Ok(())
    }

    async fn run_query(&self, collection: &str, filters: &[(&str, Value)]) -> Result<Vec<Document>> {
        self.ensure_open()?;

        let field_filters: Vec<Value> = filters
            .iter()
            .map(|(field, value)| {
                json!({
                    "fieldFilter": {
                        "field": { "fieldPath": field },
                        "op": "EQUAL",
                        "value": encode(value),
                    }
                })
            })
            .collect();

        let mut query = json!({ "from": [{ "collectionId": collection }] });
        match field_filters.len() {
            0 => {}
            1 => query["where"] = field_filters[0].clone(),
            _ => {
                query["where"] = json!({
                    "compositeFilter": { "op": "AND", "filters": field_filters }
                })
            }
        }

        let url = self.endpoint(&["documents:runQuery"])?;
        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, self.auth_header())
            .json(&json!({ "structuredQuery": query }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to query {}: {}", collection, e)))?;

        let items: Vec<RunQueryItem> = self.handle_response(response).await?;
        items
            .into_iter()
            .filter_map(|item| item.document)
            .map(Self::parse_document)
            .collect()
    }

    fn auto_id() -> String {
        Uuid::new_v4().simple().to_string()[..AUTO_ID_LEN].to_string()
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    fn name(&self) -> &str {
        "firestore"
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = self.endpoint(&["documents", collection])?;
            let mut request = self
                .http
                .get(url)
                .header(header::AUTHORIZATION, self.auth_header())
                .query(&[("pageSize", PAGE_SIZE)]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::Network(format!("Failed to list {}: {}", collection, e)))?;

            let page: ListResponse = self.handle_response(response).await?;
            for raw in page.documents {
                documents.push(Self::parse_document(raw)?);
            }

            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} documents from {}", documents.len(), collection);
        Ok(documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.ensure_open()?;
        let url = self.endpoint(&["documents", collection, id])?;
        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get {}/{}: {}", collection, id, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let raw: RawDocument = self.handle_response(response).await?;
        Self::parse_document(raw).map(Some)
    }

    async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        self.run_query(collection, &[(field, value.clone())]).await
    }

    async fn query_equal_all(
        &self,
        collection: &str,
        filters: &[(&str, Value)],
    ) -> Result<Vec<Document>> {
        self.run_query(collection, filters).await
    }

    async fn create(&self, collection: &str, data: DocumentData) -> Result<String> {
        self.ensure_open()?;
        let id = Self::auto_id();
        let write = self.build_write(collection, &id, &data, false, Some(false));
        self.commit(write).await?;
        debug!("Created {}/{}", collection, id);
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: DocumentData) -> Result<()> {
        self.ensure_open()?;
        let write = self.build_write(collection, id, &data, false, None);
        self.commit(write).await
    }

    async fn update(&self, collection: &str, id: &str, data: DocumentData) -> Result<()> {
        self.ensure_open()?;
        let write = self.build_write(collection, id, &data, true, Some(true));
        self.commit(write).await
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        let url = self.endpoint(&["documents:listCollectionIds"])?;
        let response = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, self.auth_header())
            .json(&json!({ "pageSize": 1 }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Firestore ping failed: {}", e)))?;

        let _: Value = self.handle_response(response).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        debug!("Closed Firestore client for {}", self.config.project_id);
        Ok(())
    }
}

/// Connector building a fresh [`FirestoreClient`] per call.
pub struct FirestoreConnector {
    config: FirestoreConfig,
}

impl FirestoreConnector {
    /// Create a connector for the given configuration.
    pub fn new(config: FirestoreConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for FirestoreConnector {
    async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        Ok(Arc::new(FirestoreClient::new(self.config.clone())?))
    }
}
