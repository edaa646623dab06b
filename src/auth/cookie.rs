//! Session-cookie authentication.
//!
//! The sidebar is served from the same origin as the API, so the browser's
//! session cookie authenticates a request to the token endpoint, which
//! answers with an access token (or an empty string for a logged-out user).

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use url::Url;

use super::{FetchedToken, Identity, TokenCache};
use crate::http::HttpPipeline;
use crate::settings::Settings;

/// Same-origin session strategy.
pub struct CookieAuth {
    http: Arc<HttpPipeline>,
    token_url: Option<Url>,
    cache: TokenCache,
}

impl CookieAuth {
    pub fn new(settings: &Settings, http: Arc<HttpPipeline>) -> Self {
        Self {
            http,
            token_url: settings.api_url().join("token").ok(),
            cache: TokenCache::default(),
        }
    }

    pub async fn get_identity(&self) -> Result<Option<Identity>> {
        let token = self.cache.get_or_fetch(|| self.fetch_token()).await?;
        Ok(token.map(|access_token| Identity { access_token }))
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn fetch_token(&self) -> Result<FetchedToken> {
        let token_url = self
            .token_url
            .as_ref()
            .context("Could not derive token endpoint from apiUrl")?;

        debug!("Fetching session token from {}", token_url);
        let token: String = self.http.get_json(token_url, None).await?;

        Ok(FetchedToken {
            token: Some(token).filter(|t| !t.is_empty()),
            expires_in: None,
        })
    }
}

impl std::fmt::Debug for CookieAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieAuth")
            .field("token_url", &self.token_url.as_ref().map(Url::as_str))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::CSRF_HEADER_NAME;
    use std::time::Duration;

    #[test]
    fn test_token_url_relative_to_api() {
        let settings = Settings::from_value(serde_json::json!({
            "apiUrl": "https://example.com/h/api/"
        }))
        .unwrap();
        let http = Arc::new(HttpPipeline::new(CSRF_HEADER_NAME, Duration::ZERO).unwrap());
        let auth = CookieAuth::new(&settings, http);
        assert_eq!(
            auth.token_url.as_ref().map(Url::as_str),
            Some("https://example.com/h/api/token")
        );
    }
}
