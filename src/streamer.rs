//! Streaming connection identity.
//!
//! The real-time update socket itself lives outside this crate; what the
//! bootstrap needs from it is the client id it announces to the server,
//! which every HTTP request must also carry.

use std::sync::Arc;

use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::http::HttpPipeline;

/// Streaming connection service registered as `streamer`.
#[derive(Debug, Clone)]
pub struct Streamer {
    client_id: String,
    websocket_url: Option<Url>,
}

impl Streamer {
    /// Create the service; a fresh client id is assigned immediately.
    pub fn new(websocket_url: Option<Url>) -> Self {
        let client_id = Uuid::new_v4().to_string();
        debug!("Streamer assigned client id {}", client_id);
        Self {
            client_id,
            websocket_url,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn websocket_url(&self) -> Option<&Url> {
        self.websocket_url.as_ref()
    }
}

/// Run hook: tag outgoing requests with the streamer's client id.
pub fn setup_http(pipeline: &HttpPipeline, streamer: &Arc<Streamer>) {
    pipeline.set_client_id(streamer.client_id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::CSRF_HEADER_NAME;
    use std::time::Duration;

    #[test]
    fn test_client_ids_are_unique() {
        let a = Streamer::new(None);
        let b = Streamer::new(None);
        assert_ne!(a.client_id(), b.client_id());
        assert!(Uuid::parse_str(a.client_id()).is_ok());
    }

    #[test]
    fn test_setup_http_publishes_client_id() {
        let pipeline = HttpPipeline::new(CSRF_HEADER_NAME, Duration::ZERO).unwrap();
        let streamer = Arc::new(Streamer::new(
            Url::parse("wss://hypothes.is/ws").ok(),
        ));

        assert!(pipeline.client_id().is_none());
        setup_http(&pipeline, &streamer);
        assert_eq!(pipeline.client_id().as_deref(), Some(streamer.client_id()));
    }
}
