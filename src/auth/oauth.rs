//! Multi-service authentication.
//!
//! The host page lists the services it authenticates against in
//! `settings.services`. The first entry may carry a short-lived grant token,
//! which is exchanged at the API's token endpoint for an access token
//! (JWT bearer grant, RFC 7523). Without a grant token the user is
//! anonymous.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, error, info};
use url::Url;

use super::{FetchedToken, Identity, TokenCache};
use crate::http::HttpPipeline;
use crate::settings::Settings;

/// Grant type for exchanging a host-issued assertion
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// One entry of `settings.services`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default)]
    pub authority: Option<String>,
    #[serde(default)]
    pub grant_token: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Grant-token exchange strategy.
pub struct OAuthAuth {
    http: Arc<HttpPipeline>,
    token_url: Option<Url>,
    service: ServiceConfig,
    cache: TokenCache,
}

impl OAuthAuth {
    pub fn new(settings: &Settings, http: Arc<HttpPipeline>) -> Self {
        let service = settings
            .services()
            .and_then(|services| services.as_array())
            .and_then(|services| services.first())
            .and_then(|first| serde_json::from_value::<ServiceConfig>(first.clone()).ok())
            .unwrap_or_default();

        let token_url = settings.api_url().join("token").ok();

        if let Some(ref authority) = service.authority {
            debug!("Authenticating against service authority {}", authority);
        }

        Self {
            http,
            token_url,
            service,
            cache: TokenCache::default(),
        }
    }

    /// The first configured service.
    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub async fn get_identity(&self) -> Result<Option<Identity>> {
        let token = self.cache.get_or_fetch(|| self.exchange_grant()).await?;
        Ok(token.map(|access_token| Identity { access_token }))
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn exchange_grant(&self) -> Result<FetchedToken> {
        let Some(grant_token) = self.service.grant_token.as_deref().filter(|t| !t.is_empty())
        else {
            debug!("No grant token provided, continuing anonymously");
            return Ok(FetchedToken::default());
        };

        let token_url = self
            .token_url
            .clone()
            .context("Could not derive token endpoint from apiUrl")?;

        info!("Exchanging grant token at {}", token_url);

        let form = [
            ("grant_type", JWT_BEARER_GRANT_TYPE),
            ("assertion", grant_token),
        ];
        let response = self
            .http
            .send(|client| client.post(token_url.clone()).form(&form))
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("Grant token exchange failed with {}", status);
            anyhow::bail!("Failed to retrieve access token (HTTP {})", status.as_u16());
        }

        let body: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        Ok(FetchedToken {
            token: Some(body.access_token),
            expires_in: body.expires_in.map(Duration::from_secs),
        })
    }
}

impl std::fmt::Debug for OAuthAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthAuth")
            .field("token_url", &self.token_url.as_ref().map(Url::as_str))
            .field("authority", &self.service.authority)
            .finish()
    }
}
