//! Development live-reload connection.
//!
//! Only used when `liveReloadServer` is configured. The bootstrap connects
//! after the registry and routes are in place; a connection failure is
//! logged and otherwise ignored.

use anyhow::Result;
use tracing::info;
use url::Url;

/// Connects the page to a live-reload server.
pub trait LiveReloadClient: Send + Sync {
    fn connect(&self, server: &Url) -> Result<()>;
}

/// Client that only logs the server it would connect to.
#[derive(Debug, Default)]
pub struct LoggingLiveReload;

impl LiveReloadClient for LoggingLiveReload {
    fn connect(&self, server: &Url) -> Result<()> {
        info!("Live reload server at {}", server);
        Ok(())
    }
}
