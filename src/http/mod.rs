//! Outgoing request pipeline.
//!
//! Every request the sidebar makes goes through [`HttpPipeline`], which
//! decorates it at send time with:
//! - the CSRF token from the document's `XSRF-TOKEN` cookie, under the
//!   header name the backend expects (`X-CSRF-Token` rather than the usual
//!   `X-XSRF-TOKEN`);
//! - the streaming connection's client id (`X-Client-Id`), so the server
//!   can skip echoing a client's own changes back over its socket.
//!
//! Identifiers are read when the request is built, not when the pipeline
//! is configured, so there is no ordering race between components that set
//! them and components that send requests.

mod retry;

pub use retry::RetryPolicy;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::HeaderName;
use reqwest::{Client, Method, RequestBuilder, Response};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{BootError, BootResult};
use crate::host::CookieJar;

/// Header carrying the CSRF token
pub const CSRF_HEADER_NAME: &str = "X-CSRF-Token";

/// Cookie the CSRF token is read from
pub const CSRF_COOKIE_NAME: &str = "XSRF-TOKEN";

/// Header carrying the streaming client id
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent (from Cargo.toml)
const USER_AGENT: &str = concat!("sidebar-boot/", env!("CARGO_PKG_VERSION"));

/// Shared, request-scoped pipeline state and client.
pub struct HttpPipeline {
    client: Client,
    csrf_header: HeaderName,
    csrf_cookies: Option<Arc<dyn CookieJar>>,
    client_id: watch::Sender<Option<String>>,
    client_id_wait: Duration,
    retry: RetryPolicy,
}

impl HttpPipeline {
    /// Create the pipeline with the given CSRF header name.
    ///
    /// `client_id_wait` bounds how long [`send`](Self::send) holds a request
    /// back while the streaming client id is still unassigned.
    pub fn new(csrf_header_name: &str, client_id_wait: Duration) -> BootResult<Self> {
        let csrf_header = HeaderName::from_bytes(csrf_header_name.as_bytes()).map_err(|e| {
            BootError::Initialization(format!(
                "Invalid CSRF header name '{}': {}",
                csrf_header_name, e
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BootError::Initialization(format!("Failed to build HTTP client: {}", e)))?;

        let (client_id, _) = watch::channel(None);

        info!("HTTP pipeline configured (CSRF header: {})", csrf_header);

        Ok(Self {
            client,
            csrf_header,
            csrf_cookies: None,
            client_id,
            client_id_wait,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry schedule.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Read the CSRF token from `cookies` on every request.
    pub fn with_csrf_cookies(mut self, cookies: Arc<dyn CookieJar>) -> Self {
        self.csrf_cookies = Some(cookies);
        self
    }

    pub fn csrf_header(&self) -> &HeaderName {
        &self.csrf_header
    }

    /// Attach `client_id` to every request built from now on.
    pub fn set_client_id(&self, client_id: impl Into<String>) {
        let client_id = client_id.into();
        debug!("Requests will carry {}: {}", CLIENT_ID_HEADER, client_id);
        self.client_id.send_replace(Some(client_id));
    }

    pub fn client_id(&self) -> Option<String> {
        self.client_id.borrow().clone()
    }

    /// Apply the current defaults to a request.
    pub fn decorate(&self, mut request: RequestBuilder) -> RequestBuilder {
        let token = self
            .csrf_cookies
            .as_ref()
            .and_then(|cookies| cookies.get(CSRF_COOKIE_NAME))
            .filter(|token| !token.is_empty());
        if let Some(token) = token {
            request = request.header(self.csrf_header.clone(), token);
        }
        if let Some(client_id) = self.client_id() {
            request = request.header(CLIENT_ID_HEADER, client_id);
        }
        request
    }

    /// Start a decorated request.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.decorate(self.client.request(method, url))
    }

    /// Send a request built by `build`, decorating every attempt.
    ///
    /// If the client id has not been assigned yet, the request waits for it
    /// up to the configured bound and is then sent without it.
    pub async fn send(&self, build: impl Fn(&Client) -> RequestBuilder) -> Result<Response> {
        self.wait_for_client_id().await;
        retry::send_with_retry(self.retry, || self.decorate(build(&self.client)))
            .await
            .context("Request through HTTP pipeline failed")
    }

    /// GET `url` and decode a JSON body.
    pub async fn get_json<R>(&self, url: &Url, bearer: Option<&str>) -> Result<R>
    where
        R: for<'de> serde::Deserialize<'de>,
    {
        let response = self
            .send(|client| {
                let request = client.get(url.clone());
                match bearer {
                    Some(token) => request.bearer_auth(token),
                    None => request,
                }
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {} returned {}", url, status);
        }

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse response from {}", url))
    }

    async fn wait_for_client_id(&self) {
        let mut receiver = self.client_id.subscribe();
        if receiver.borrow().is_some() {
            return;
        }

        let assigned = tokio::time::timeout(
            self.client_id_wait,
            receiver.wait_for(|id| id.is_some()),
        )
        .await;

        if !matches!(assigned, Ok(Ok(_))) {
            warn!(
                "Sending request without {}: client id not assigned after {:?}",
                CLIENT_ID_HEADER, self.client_id_wait
            );
        }
    }
}

impl std::fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("csrf_header", &self.csrf_header)
            .field("csrf_cookie", &CSRF_COOKIE_NAME)
            .field("client_id", &self.client_id())
            .finish()
    }
}
