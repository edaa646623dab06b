//! Authentication strategy selection.
//!
//! Two mutually exclusive strategies exist:
//! - **multi-service**: the host page enumerates external identity
//!   providers in `settings.services` and hands the sidebar a grant token
//!   to exchange for an access token;
//! - **session-cookie**: the sidebar shares a same-origin session with the
//!   service and fetches tokens with its cookie.
//!
//! The choice is made once, in [`AuthKind::select`], from the shape of
//! `services`. Nothing else in the crate looks at that shape; dependents
//! talk to the selected [`AuthStrategy`] through its capability methods.

mod cookie;
mod oauth;

pub use cookie::CookieAuth;
pub use oauth::OAuthAuth;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::http::HttpPipeline;
use crate::settings::Settings;

/// Which strategy a given `Settings` maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    MultiService,
    SessionCookie,
}

impl AuthKind {
    /// `services` given as a list, even an empty one, means multi-service.
    /// Any other shape, or no `services` at all, means session-cookie.
    pub fn select(settings: &Settings) -> Self {
        match settings.services() {
            Some(Value::Array(_)) => AuthKind::MultiService,
            _ => AuthKind::SessionCookie,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::MultiService => "multi-service",
            AuthKind::SessionCookie => "session-cookie",
        }
    }
}

/// The authenticated (or anonymous) user as seen by API requests.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub access_token: String,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// The selected authentication implementation, registered as `auth`.
#[derive(Debug)]
pub enum AuthStrategy {
    MultiService(OAuthAuth),
    SessionCookie(CookieAuth),
}

impl AuthStrategy {
    /// Construct the strategy that `settings` selects.
    pub fn select(settings: &Arc<Settings>, http: Arc<HttpPipeline>) -> Self {
        let kind = AuthKind::select(settings);
        info!("🔐 Using {} authentication", kind.as_str());
        match kind {
            AuthKind::MultiService => AuthStrategy::MultiService(OAuthAuth::new(settings, http)),
            AuthKind::SessionCookie => AuthStrategy::SessionCookie(CookieAuth::new(settings, http)),
        }
    }

    pub fn kind(&self) -> AuthKind {
        match self {
            AuthStrategy::MultiService(_) => AuthKind::MultiService,
            AuthStrategy::SessionCookie(_) => AuthKind::SessionCookie,
        }
    }

    /// Current identity; `None` for an anonymous user.
    pub async fn get_identity(&self) -> Result<Option<Identity>> {
        match self {
            AuthStrategy::MultiService(auth) => auth.get_identity().await,
            AuthStrategy::SessionCookie(auth) => auth.get_identity().await,
        }
    }

    /// Establish a fresh identity.
    pub async fn login(&self) -> Result<Option<Identity>> {
        self.logout().await;
        self.get_identity().await
    }

    /// Forget the cached identity.
    pub async fn logout(&self) {
        match self {
            AuthStrategy::MultiService(auth) => auth.clear_cache().await,
            AuthStrategy::SessionCookie(auth) => auth.clear_cache().await,
        }
    }

    /// Drop the cached token and fetch a new one.
    pub async fn refresh(&self) -> Result<Option<Identity>> {
        debug!("Refreshing {} identity", self.kind().as_str());
        self.logout().await;
        self.get_identity().await
    }
}

/// Result of one token fetch.
#[derive(Debug, Clone, Default)]
pub(crate) struct FetchedToken {
    pub token: Option<String>,
    pub expires_in: Option<Duration>,
}

#[derive(Debug)]
struct CachedToken {
    token: Option<String>,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// Single-slot token cache shared by both strategies.
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Return the cached token or run `fetch` to obtain one.
    ///
    /// The lock is held across the fetch so concurrent callers share a
    /// single request.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Option<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.token.clone());
        }

        let fetched = fetch().await?;
        *slot = Some(CachedToken {
            token: fetched.token.clone(),
            expires_at: fetched.expires_in.map(|ttl| Instant::now() + ttl),
        });
        Ok(fetched.token)
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}
