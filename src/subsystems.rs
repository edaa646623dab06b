//! Optional diagnostics subsystems.
//!
//! Error tracking and analytics are switched on by settings. Error tracking
//! has to be running before anything else is constructed so that later
//! construction failures reach it; analytics only has to start before the
//! registry is assembled.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info};

use crate::error::{BootError, BootResult};
use crate::settings::{ErrorTrackingConfig, Settings};

/// Error-tracking client supplied by the host integration.
pub trait ErrorTracker: Send + Sync {
    /// Start the client. Called at most once per bootstrap.
    fn init(&self, config: &ErrorTrackingConfig) -> Result<()>;

    /// Report a failure.
    fn capture(&self, error: &BootError);
}

/// Analytics client supplied by the host integration.
pub trait AnalyticsProvider: Send + Sync {
    /// Start the client with a tracking id. Called at most once per bootstrap.
    fn init(&self, tracking_id: &str) -> Result<()>;

    /// Deliver one tracked event.
    fn send(&self, event: &crate::analytics::AnalyticsEvent) -> Result<()>;
}

/// Error-tracking surface exposed to the rest of the application.
///
/// Always present in the registry so that dependents never need to branch
/// on whether error tracking is configured.
#[derive(Clone)]
pub enum ErrorTrackingIntegration {
    Active(Arc<dyn ErrorTracker>),
    Disabled,
}

impl ErrorTrackingIntegration {
    pub fn is_active(&self) -> bool {
        matches!(self, ErrorTrackingIntegration::Active(_))
    }

    /// Report a failure to the tracker, or just log it when disabled.
    pub fn capture(&self, err: &BootError) {
        match self {
            ErrorTrackingIntegration::Active(tracker) => tracker.capture(err),
            ErrorTrackingIntegration::Disabled => {
                debug!("Error tracking disabled, not reporting: {}", err)
            }
        }
    }
}

impl std::fmt::Debug for ErrorTrackingIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorTrackingIntegration::Active(_) => write!(f, "ErrorTrackingIntegration::Active"),
            ErrorTrackingIntegration::Disabled => write!(f, "ErrorTrackingIntegration::Disabled"),
        }
    }
}

/// Start error tracking if configured; otherwise hand back the no-op surface.
pub fn activate_error_tracking(
    config: Option<&ErrorTrackingConfig>,
    tracker: Arc<dyn ErrorTracker>,
) -> BootResult<ErrorTrackingIntegration> {
    let Some(config) = config else {
        debug!("Error tracking not configured, registering no-op integration");
        return Ok(ErrorTrackingIntegration::Disabled);
    };

    info!("Starting error tracking");
    tracker.init(config).map_err(|e| {
        error!("Error tracking failed to start: {:#}", e);
        BootError::Initialization(format!("error tracking: {:#}", e))
    })?;

    Ok(ErrorTrackingIntegration::Active(tracker))
}

/// Start analytics if a tracking id is configured.
///
/// Returns the provider when analytics is running.
pub fn activate_analytics(
    settings: &Settings,
    provider: Arc<dyn AnalyticsProvider>,
) -> BootResult<Option<Arc<dyn AnalyticsProvider>>> {
    let Some(tracking_id) = settings.analytics() else {
        debug!("Analytics not configured");
        return Ok(None);
    };

    info!("Starting analytics ({})", tracking_id);
    provider.init(tracking_id).map_err(|e| {
        error!("Analytics failed to start: {:#}", e);
        BootError::Initialization(format!("analytics: {:#}", e))
    })?;

    Ok(Some(provider))
}

/// Error tracker that writes failures to the log.
#[derive(Debug, Default)]
pub struct LoggingErrorTracker;

impl ErrorTracker for LoggingErrorTracker {
    fn init(&self, config: &ErrorTrackingConfig) -> Result<()> {
        info!("Error tracking reporting to {}", config.dsn);
        Ok(())
    }

    fn capture(&self, err: &BootError) {
        error!("[{}] {}", err.kind(), err);
    }
}

/// Analytics provider that writes events to the log.
#[derive(Debug, Default)]
pub struct LoggingAnalytics;

impl AnalyticsProvider for LoggingAnalytics {
    fn init(&self, tracking_id: &str) -> Result<()> {
        info!("Analytics tracking id {}", tracking_id);
        Ok(())
    }

    fn send(&self, event: &crate::analytics::AnalyticsEvent) -> Result<()> {
        info!("Analytics event {} ({:?})", event.action, event.label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTracker {
        fail: bool,
        inits: Mutex<Vec<String>>,
        captured: Mutex<Vec<String>>,
    }

    impl ErrorTracker for RecordingTracker {
        fn init(&self, config: &ErrorTrackingConfig) -> Result<()> {
            if self.fail {
                anyhow::bail!("bad dsn");
            }
            self.inits.lock().unwrap().push(config.dsn.clone());
            Ok(())
        }

        fn capture(&self, err: &BootError) {
            self.captured.lock().unwrap().push(err.kind().to_string());
        }
    }

    fn config() -> ErrorTrackingConfig {
        ErrorTrackingConfig {
            dsn: "x".to_string(),
            release: None,
        }
    }

    #[test]
    fn test_disabled_without_config() {
        let tracker = Arc::new(RecordingTracker::default());
        let integration = activate_error_tracking(None, tracker.clone()).unwrap();
        assert!(!integration.is_active());
        assert!(tracker.inits.lock().unwrap().is_empty());

        // No-op capture must not panic or reach the tracker.
        integration.capture(&BootError::Wiring("x".to_string()));
        assert!(tracker.captured.lock().unwrap().is_empty());
    }

    #[test]
    fn test_active_integration_captures() {
        let tracker = Arc::new(RecordingTracker::default());
        let integration = activate_error_tracking(Some(&config()), tracker.clone()).unwrap();
        assert!(integration.is_active());
        assert_eq!(*tracker.inits.lock().unwrap(), vec!["x".to_string()]);

        integration.capture(&BootError::Bootstrap("no anchor".to_string()));
        assert_eq!(
            *tracker.captured.lock().unwrap(),
            vec!["BootstrapError".to_string()]
        );
    }

    #[test]
    fn test_init_failure_is_initialization_error() {
        let tracker = Arc::new(RecordingTracker {
            fail: true,
            ..Default::default()
        });
        let err = activate_error_tracking(Some(&config()), tracker).unwrap_err();
        assert!(matches!(err, BootError::Initialization(_)));
        assert!(err.to_string().contains("bad dsn"));
    }

    #[test]
    fn test_analytics_only_with_tracking_id() {
        let settings = Settings::from_value(serde_json::json!({
            "apiUrl": "https://hypothes.is/api/"
        }))
        .unwrap();
        assert!(activate_analytics(&settings, Arc::new(LoggingAnalytics))
            .unwrap()
            .is_none());

        let settings = Settings::from_value(serde_json::json!({
            "apiUrl": "https://hypothes.is/api/",
            "googleAnalytics": "UA-1"
        }))
        .unwrap();
        assert!(activate_analytics(&settings, Arc::new(LoggingAnalytics))
            .unwrap()
            .is_some());
    }
}
