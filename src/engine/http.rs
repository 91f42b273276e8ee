use std::time::Duration;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, warn};

use super::{SearchEngine, SearchRequest, SearchResponse, TaskInfo};
use crate::{
    document::{DocumentChunk, attributes},
    error::{Error, Result, payload_sample},
};

pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:7700";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Which search engine implementation to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineBackend {
    /// An engine process reached over HTTP.
    #[default]
    Http,
    /// An embedded Tantivy index under the data directory.
    Local,
}

impl std::str::FromStr for EngineBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(EngineBackend::Http),
            "local" => Ok(EngineBackend::Local),
            other => Err(Error::Config(format!(
                "unknown engine backend '{other}' (expected 'http' or 'local')"
            ))),
        }
    }
}

impl std::fmt::Display for EngineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineBackend::Http => f.write_str("http"),
            EngineBackend::Local => f.write_str("local"),
        }
    }
}

/// Search engine connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub backend: EngineBackend,
    /// Base URL of the engine's HTTP API.
    pub url: String,
    /// Sent as a bearer token when set.
    pub api_key: Option<String>,
    /// Upper bound on every engine request.
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::default(),
            url: DEFAULT_ENGINE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "engine url must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config(
                "engine request timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Client for a search engine reached over HTTP.
pub struct HttpEngine {
    client: Client,
    base: String,
    api_key: Option<String>,
}

impl HttpEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            base: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn index_url(&self, uid: &str) -> String {
        format!(
            "{}/indexes/{}",
            self.base,
            utf8_percent_encode(uid, NON_ALPHANUMERIC)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Send a request, mapping transport failures and non-2xx replies.
    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<Response> {
        let response = builder.send().await.map_err(|e| {
            Error::EngineUnavailable(format!("request to {url} failed: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let snippet = payload_sample(&body);
        if status == StatusCode::NOT_FOUND {
            debug!(url, %snippet, "engine reported missing resource");
            return Err(Error::IndexNotFound(url.to_string()));
        }
        warn!(url, status = status.as_u16(), %snippet, "engine request failed");
        Err(Error::EngineStatus {
            status: status.as_u16(),
            url: url.to_string(),
            snippet,
        })
    }

    /// Decode a JSON body, keeping a sample of the payload when it does
    /// not have the expected shape.
    async fn decode<T: DeserializeOwned>(
        response: Response,
        context: &str,
    ) -> Result<T> {
        let body = response.text().await.map_err(|e| {
            Error::EngineUnavailable(format!("reading {context} response: {e}"))
        })?;
        serde_json::from_str(&body).map_err(|e| {
            let snippet = payload_sample(&body);
            warn!(context, error = %e, %snippet, "malformed engine response");
            Error::MalformedResponse {
                context: format!("{context}: {e}"),
                snippet,
            }
        })
    }

    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<&B>,
        context: &str,
    ) -> Result<T> {
        let mut builder = self.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.send(builder, &url).await?;
        Self::decode(response, context).await
    }
}

impl SearchEngine for HttpEngine {
    async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base);
        let response = self.send(self.request(Method::GET, &url), &url).await;
        match response {
            Ok(_) => Ok(()),
            Err(Error::EngineUnavailable(reason)) => {
                Err(Error::EngineUnavailable(reason))
            }
            Err(e) => Err(Error::EngineUnavailable(format!(
                "health check failed: {e}"
            ))),
        }
    }

    async fn create_index(&self, uid: &str) -> Result<TaskInfo> {
        let url = format!("{}/indexes", self.base);
        let body = json!({ "uid": uid, "primaryKey": attributes::ID });
        self.call(Method::POST, url, Some(&body), "create index").await
    }

    async fn delete_index(&self, uid: &str) -> Result<TaskInfo> {
        self.call::<(), _>(
            Method::DELETE,
            self.index_url(uid),
            None,
            "delete index",
        )
        .await
        .map_err(|e| match e {
            Error::IndexNotFound(_) => Error::IndexNotFound(uid.to_string()),
            other => other,
        })
    }

    async fn index_exists(&self, uid: &str) -> Result<bool> {
        let url = self.index_url(uid);
        match self.send(self.request(Method::GET, &url), &url).await {
            Ok(_) => Ok(true),
            Err(Error::IndexNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn add_documents(
        &self,
        uid: &str,
        chunks: &[DocumentChunk],
    ) -> Result<TaskInfo> {
        let url = format!(
            "{}/documents?primaryKey={}",
            self.index_url(uid),
            attributes::ID
        );
        self.call(Method::POST, url, Some(chunks), "add documents")
            .await
            .map_err(|e| match e {
                Error::IndexNotFound(_) => Error::IndexNotFound(uid.to_string()),
                other => other,
            })
    }

    async fn search(
        &self,
        uid: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        let url = format!("{}/search", self.index_url(uid));
        self.call(Method::POST, url, Some(request), "search")
            .await
            .map_err(|e| match e {
                Error::IndexNotFound(_) => Error::IndexNotFound(uid.to_string()),
                other => other,
            })
    }
}
