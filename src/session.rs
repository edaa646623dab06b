//! Session state.
//!
//! The session is what every route waits for before its view is built: who
//! the user is, which groups they belong to, which features are on. It is
//! loaded from the API's profile endpoint and cached briefly so that a burst
//! of navigations shares one request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::auth::AuthStrategy;
use crate::http::HttpPipeline;
use crate::settings::Settings;

/// How long a loaded profile is reused
pub const SESSION_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// A group the user can annotate in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public: bool,
}

/// Profile returned by the API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// `acct:user@authority`, absent for a logged-out user
    #[serde(default)]
    pub userid: Option<String>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
    #[serde(default)]
    pub preferences: serde_json::Map<String, serde_json::Value>,
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        self.userid.is_some()
    }

    pub fn feature(&self, flag: &str) -> bool {
        self.features.get(flag).copied().unwrap_or(false)
    }
}

/// Something that can load the session state.
pub trait SessionLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'static, Result<SessionState>>;
}

/// Session service registered as `session`, backed by the profile endpoint.
#[derive(Clone)]
pub struct HttpSession {
    inner: Arc<HttpSessionInner>,
}

struct HttpSessionInner {
    http: Arc<HttpPipeline>,
    auth: Arc<AuthStrategy>,
    profile_url: Url,
    cached: Mutex<Option<(Instant, SessionState)>>,
}

impl HttpSession {
    pub fn new(settings: &Settings, http: Arc<HttpPipeline>, auth: Arc<AuthStrategy>) -> Result<Self> {
        let profile_url = settings
            .api_url()
            .join("profile")
            .context("Could not derive profile endpoint from apiUrl")?;

        Ok(Self {
            inner: Arc::new(HttpSessionInner {
                http,
                auth,
                profile_url,
                cached: Mutex::new(None),
            }),
        })
    }

    /// Forget the cached profile, e.g. after login or logout.
    pub async fn invalidate(&self) {
        *self.inner.cached.lock().await = None;
    }
}

impl HttpSessionInner {
    async fn load(&self) -> Result<SessionState> {
        let mut cached = self.cached.lock().await;
        if let Some((loaded_at, state)) = cached.as_ref() {
            if loaded_at.elapsed() < SESSION_CACHE_TTL {
                debug!("Reusing cached session state");
                return Ok(state.clone());
            }
        }

        let identity = self.auth.get_identity().await?;
        let bearer = identity.as_ref().map(|i| i.access_token.as_str());
        let state: SessionState = self
            .http
            .get_json(&self.profile_url, bearer)
            .await
            .context("Failed to load session")?;

        info!(
            "Session loaded ({})",
            state.userid.as_deref().unwrap_or("logged out")
        );
        *cached = Some((Instant::now(), state.clone()));
        Ok(state)
    }
}

impl SessionLoader for HttpSession {
    fn load(&self) -> BoxFuture<'static, Result<SessionState>> {
        let inner = self.inner.clone();
        async move { inner.load().await }.boxed()
    }
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("profile_url", &self.inner.profile_url.as_str())
            .finish()
    }
}

/// Loader that always returns the same state. Used for dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    state: SessionState,
}

impl StaticSession {
    pub fn new(state: SessionState) -> Self {
        Self { state }
    }
}

impl SessionLoader for StaticSession {
    fn load(&self) -> BoxFuture<'static, Result<SessionState>> {
        let state = self.state.clone();
        async move { Ok(state) }.boxed()
    }
}
