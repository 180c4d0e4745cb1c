//! Shelf HTTP client
//!
//! Every call goes through [`ShelfClient::execute`] (or one of its siblings),
//! which attaches the session's bearer token, refreshes ahead of expiry, and
//! recovers from a single 401 by refreshing and retrying once.

pub mod auth;
pub mod error;
pub mod library;
pub mod users;

pub use error::ClientError;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shelf_core::TokenPair;
use tracing::{debug, warn};

use crate::cache::LibraryCache;
use crate::config::ClientConfig;
use crate::refresh::{DEFAULT_REFRESH_BUFFER, DEFAULT_REFRESH_TIMEOUT, Refresher, TokenEndpoint};
use crate::scheduler::{RefreshScheduler, SchedulerHandle};
use crate::session::Session;
use crate::storage::CredentialStore;

const DEFAULT_USER_AGENT: &str = concat!("shelf-client/", env!("CARGO_PKG_VERSION"));

/// A request description that can be sent more than once
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    authenticated: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            authenticated: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Send without a bearer token and skip refresh handling
    pub fn public(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// Attach a JSON body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query_pair(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append every field of a flat struct as query parameters
    ///
    /// `None` fields are expected to be skipped by the struct's serializer;
    /// nulls that slip through are dropped here.
    pub fn query_params<T: Serialize>(mut self, params: &T) -> Result<Self, ClientError> {
        match serde_json::to_value(params)? {
            Value::Object(map) => {
                for (key, value) in map {
                    match value {
                        Value::Null => {}
                        Value::String(s) => self.query.push((key, s)),
                        other => self.query.push((key, other.to_string())),
                    }
                }
                Ok(self)
            }
            Value::Null => Ok(self),
            _ => Err(ClientError::Configuration(
                "query parameters must serialize to an object".into(),
            )),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

struct Inner {
    http: Client,
    base_url: String,
    session: Session,
    refresher: Refresher,
    cache: LibraryCache,
}

/// Session-aware Shelf API client
#[derive(Clone)]
pub struct ShelfClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ShelfClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShelfClient")
            .field("base_url", &self.inner.base_url)
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}

impl ShelfClient {
    /// Create a client with an in-memory session
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    pub fn builder() -> ShelfClientBuilder {
        ShelfClientBuilder::default()
    }

    /// Build a client from configuration
    ///
    /// Credentials persist under `storage_dir` when one is configured.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let store = match &config.storage_dir {
            Some(dir) => CredentialStore::persistent(dir),
            None => CredentialStore::in_memory(),
        };

        Self::builder()
            .base_url(&config.api_base_url)
            .session(Session::with_store(store))
            .request_timeout(config.request_timeout())
            .refresh_buffer(config.refresh_buffer())
            .refresh_timeout(config.refresh_timeout())
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn refresher(&self) -> &Refresher {
        &self.inner.refresher
    }

    pub fn cache(&self) -> &LibraryCache {
        &self.inner.cache
    }

    /// Start refreshing tokens in the background; stops when the handle drops
    pub fn spawn_refresh_scheduler(&self) -> SchedulerHandle {
        RefreshScheduler::spawn(self.inner.refresher.clone())
    }

    /// Execute a request and decode its JSON body
    pub async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let response = self.dispatch(&request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Execute a request whose response body is irrelevant
    pub async fn execute_empty(&self, request: ApiRequest) -> Result<(), ClientError> {
        self.dispatch(&request).await?;
        Ok(())
    }

    /// Execute a request and return the raw response body
    pub async fn execute_bytes(&self, request: ApiRequest) -> Result<Vec<u8>, ClientError> {
        let response = self.dispatch(&request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<reqwest::Response, ClientError> {
        if !request.authenticated {
            return send(&self.inner.http, &self.inner.base_url, request, None).await;
        }

        let session = &self.inner.session;
        let refresher = &self.inner.refresher;

        if let Err(err) = refresher.ensure_fresh().await {
            debug!(error = %err, "proactive refresh failed; sending without credentials");
        }

        let token = session.access_token();
        let err = match send(&self.inner.http, &self.inner.base_url, request, token.as_deref()).await
        {
            Err(err) if err.is_auth_expired() && session.has_refresh_token() => err,
            other => return other,
        };

        debug!(path = %request.path, "access token rejected; attempting recovery");
        if let Err(refresh_err) = refresher.recover(token.as_deref()).await {
            warn!(path = %request.path, error = %refresh_err, "session ended after failed refresh");
            return Err(err);
        }

        let token = session.access_token();
        send(&self.inner.http, &self.inner.base_url, request, token.as_deref()).await
    }
}

async fn send(
    http: &Client,
    base_url: &str,
    request: &ApiRequest,
    token: Option<&str>,
) -> Result<reqwest::Response, ClientError> {
    let url = format!("{}{}", base_url, request.path);
    let mut builder = http.request(request.method.clone(), url);

    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }

    let response = builder.send().await?;
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else {
        let message = response.text().await.unwrap_or_else(|_| status.to_string());
        Err(ClientError::from_status(status, message))
    }
}

/// `POST /auth/refresh` against the Shelf backend
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

impl HttpTokenEndpoint {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ClientError> {
        let request = ApiRequest::post("/auth/refresh")
            .public()
            .json(&RefreshRequest { refresh_token })?;
        let response = send(&self.http, &self.base_url, &request, None).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builder for [`ShelfClient`]
#[derive(Default)]
pub struct ShelfClientBuilder {
    base_url: Option<String>,
    session: Option<Session>,
    request_timeout: Option<Duration>,
    refresh_buffer: Option<Duration>,
    refresh_timeout: Option<Duration>,
    user_agent: Option<String>,
    token_endpoint: Option<Arc<dyn TokenEndpoint>>,
}

impl ShelfClientBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use an existing session instead of a fresh in-memory one
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = Some(buffer);
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Replace the HTTP refresh call, mainly for tests
    pub fn token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.token_endpoint = Some(endpoint);
        self
    }

    pub fn build(self) -> Result<ShelfClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        let base_url = base_url.trim_end_matches('/').to_string();
        url::Url::parse(&base_url)
            .map_err(|err| ClientError::Configuration(format!("invalid base_url {base_url:?}: {err}")))?;

        let mut client_builder = ClientBuilder::new()
            .user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT));

        #[cfg(not(target_arch = "wasm32"))]
        if let Some(timeout) = self.request_timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let http = client_builder.build()?;

        let session = self.session.unwrap_or_else(Session::ephemeral);
        let endpoint = self
            .token_endpoint
            .unwrap_or_else(|| Arc::new(HttpTokenEndpoint::new(http.clone(), base_url.clone())));
        let refresher = Refresher::new(session.clone(), endpoint)
            .with_buffer(self.refresh_buffer.unwrap_or(DEFAULT_REFRESH_BUFFER))
            .with_timeout(self.refresh_timeout.unwrap_or(DEFAULT_REFRESH_TIMEOUT));

        Ok(ShelfClient {
            inner: Arc::new(Inner {
                http,
                base_url,
                session,
                refresher,
                cache: LibraryCache::new(),
            }),
        })
    }
}
