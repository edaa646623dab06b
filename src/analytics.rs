//! Analytics service for tracking user actions.
//!
//! Components call [`AnalyticsService::track`]; events are queued and
//! flushed to the analytics provider started during bootstrap, on a timer
//! (see [`AnalyticsService::start_flushing`]) or as soon as
//! [`FLUSH_THRESHOLD`] events are pending.
//! When analytics is not configured, or the user opted out through the
//! environment, tracking is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::subsystems::AnalyticsProvider;

/// Environment variable to opt out of analytics
pub const DISABLE_ANALYTICS_ENV: &str = "SIDEBAR_DISABLE_ANALYTICS";

/// How often queued events are sent
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Pending events that trigger an immediate flush
pub const FLUSH_THRESHOLD: usize = 20;

/// Check if analytics is allowed by the environment
pub fn is_analytics_allowed() -> bool {
    match std::env::var(DISABLE_ANALYTICS_ENV) {
        Ok(val) => {
            let val_lower = val.to_lowercase();
            // Disabled if set to "1", "true", "yes", "on"
            !matches!(val_lower.as_str(), "1" | "true" | "yes" | "on")
        }
        Err(_) => true,
    }
}

/// A tracked user action
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsEvent {
    pub action: String,
    pub label: Option<String>,
    pub event_time: DateTime<Utc>,
}

/// Analytics service registered as `analytics`
#[derive(Clone)]
pub struct AnalyticsService {
    events: Arc<RwLock<Vec<AnalyticsEvent>>>,
    provider: Option<Arc<dyn AnalyticsProvider>>,
}

impl AnalyticsService {
    /// Create the service; `provider` is `None` when analytics is not running.
    pub fn new(provider: Option<Arc<dyn AnalyticsProvider>>) -> Self {
        let provider = provider.filter(|_| {
            let allowed = is_analytics_allowed();
            if !allowed {
                debug!("Analytics disabled via {}", DISABLE_ANALYTICS_ENV);
            }
            allowed
        });
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            provider,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Record a user action
    pub async fn track(&self, action: impl Into<String>, label: Option<String>) {
        if !self.is_enabled() {
            return;
        }

        let event = AnalyticsEvent {
            action: action.into(),
            label,
            event_time: Utc::now(),
        };

        let pending = {
            let mut events = self.events.write().await;
            events.push(event);
            events.len()
        };
        debug!("Tracked analytics event, total pending: {}", pending);

        if pending >= FLUSH_THRESHOLD {
            self.flush().await;
        }
    }

    /// Send all pending events to the provider
    pub async fn flush(&self) {
        if let Some(provider) = &self.provider {
            send_pending(&self.events, provider.as_ref()).await;
        }
    }

    /// Flush every `period` on the current runtime until the service is dropped.
    ///
    /// Returns `None` when analytics is disabled or no runtime is running; the
    /// size threshold still applies then.
    pub fn start_flushing(&self, period: Duration) -> Option<JoinHandle<()>> {
        let provider = self.provider.clone()?;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                debug!("No async runtime, analytics flushes every {} events", FLUSH_THRESHOLD);
                return None;
            }
        };

        let events = Arc::downgrade(&self.events);
        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick is immediate
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(events) = events.upgrade() else {
                    debug!("Analytics service dropped, stopping flush task");
                    break;
                };
                send_pending(&events, provider.as_ref()).await;
            }
        }))
    }

    pub async fn pending_count(&self) -> usize {
        self.events.read().await.len()
    }
}

async fn send_pending(events: &RwLock<Vec<AnalyticsEvent>>, provider: &dyn AnalyticsProvider) {
    let events = {
        let mut events = events.write().await;
        std::mem::take(&mut *events)
    };

    if events.is_empty() {
        return;
    }

    debug!("Flushing {} analytics events", events.len());

    for event in &events {
        if let Err(e) = provider.send(event) {
            warn!("Failed to send analytics event {}: {}", event.action, e);
            // Dropped, not re-queued
        }
    }
}

impl std::fmt::Debug for AnalyticsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsService")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
