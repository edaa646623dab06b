//! Bootstrap sequencer.
//!
//! Runs the startup steps in a fixed order:
//! ```text
//! read document settings
//! start error tracking        (if configured)
//! merge host-page config      -> frozen Settings
//! set compatibility flag
//! reference rendering engine
//! start analytics             (if configured)
//! select auth strategy
//! build registry
//! configure routes and HTTP defaults
//! run hooks                   (client id, live reload)
//! locate anchor and attach    (strict wiring)
//! ```
//!
//! Any step failing aborts the bootstrap; nothing is attached. Once error
//! tracking is running, the failure is reported to it before being
//! returned.

mod engine;
mod trace;


pub use engine::{
    CompatFlag, EngineHandle, LoggingEngine, RenderingEngine, COMPAT_FLAG_ATTRIBUTE,
    ENGINE_BUILTINS,
};
pub use trace::{BootStep, BootTrace, TraceEvent};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use url::Url;

use crate::analytics::{AnalyticsService, FLUSH_INTERVAL as ANALYTICS_FLUSH_INTERVAL};
use crate::auth::AuthStrategy;
use crate::error::{BootError, BootResult};
use crate::host::{AnchorElement, HostDocument, HostWindow, APP_ANCHOR_SELECTOR};
use crate::http::{HttpPipeline, RetryPolicy, CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
use crate::livereload::{LiveReloadClient, LoggingLiveReload};
use crate::registry::{sidebar_registry, ComponentRegistry, CoreServices};
use crate::routes::{sidebar_routes, LocationMode, Navigator, RouteTable};
use crate::session::{HttpSession, SessionLoader};
use crate::settings::{self, host_page_config, Settings};
use crate::streamer::{setup_http, Streamer};
use crate::subsystems::{
    activate_analytics, activate_error_tracking, AnalyticsProvider, ErrorTracker,
    ErrorTrackingIntegration, LoggingAnalytics, LoggingErrorTracker,
};

/// Environment variable overriding the resolve-gate timeout, in seconds
pub const GATE_TIMEOUT_ENV: &str = "SIDEBAR_BOOT_GATE_TIMEOUT_SECS";

/// Environment variable overriding the early-request client-id wait, in milliseconds
pub const CLIENT_ID_WAIT_ENV: &str = "SIDEBAR_BOOT_CLIENT_ID_WAIT_MS";

const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CLIENT_ID_WAIT: Duration = Duration::from_secs(5);

/// Runtime knobs for the bootstrap.
#[derive(Debug, Clone)]
pub struct BootOptions {
    /// Upper bound on each resolve-gate precondition
    pub gate_timeout: Duration,
    /// How long a request waits for the streamer's client id
    pub client_id_wait: Duration,
    pub retry: RetryPolicy,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            client_id_wait: DEFAULT_CLIENT_ID_WAIT,
            retry: RetryPolicy::default(),
        }
    }
}

impl BootOptions {
    /// Defaults, overridden by the environment where set.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(secs) = env_u64(GATE_TIMEOUT_ENV) {
            options.gate_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_u64(CLIENT_ID_WAIT_ENV) {
            options.client_id_wait = Duration::from_millis(ms);
        }
        options
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a whole number", name, raw);
            None
        }
    }
}

/// Everything the bootstrap talks to but does not implement.
#[derive(Clone)]
pub struct Collaborators {
    pub error_tracker: Arc<dyn ErrorTracker>,
    pub analytics: Arc<dyn AnalyticsProvider>,
    pub engine: Arc<dyn RenderingEngine>,
    pub live_reload: Arc<dyn LiveReloadClient>,
    /// Replaces the HTTP-backed session when set
    pub session: Option<Arc<dyn SessionLoader>>,
}

impl Collaborators {
    /// Collaborators that log instead of acting.
    pub fn logging() -> Self {
        Self {
            error_tracker: Arc::new(LoggingErrorTracker),
            analytics: Arc::new(LoggingAnalytics),
            engine: Arc::new(LoggingEngine),
            live_reload: Arc::new(LoggingLiveReload),
            session: None,
        }
    }

    pub fn with_session(mut self, session: Arc<dyn SessionLoader>) -> Self {
        self.session = Some(session);
        self
    }
}

/// A bootstrapped, attached application.
pub struct Application {
    pub settings: Arc<Settings>,
    pub error_tracking: ErrorTrackingIntegration,
    pub analytics: Arc<AnalyticsService>,
    pub auth: Arc<AuthStrategy>,
    pub http: Arc<HttpPipeline>,
    pub streamer: Arc<Streamer>,
    pub registry: Arc<ComponentRegistry>,
    pub navigator: Arc<Navigator>,
    pub location_mode: LocationMode,
    pub anchor: AnchorElement,
    pub trace: BootTrace,
}

impl Application {
    /// App location the window is currently showing.
    pub fn initial_location(&self, window: &dyn HostWindow) -> BootResult<String> {
        let raw = window.location();
        let url = Url::parse(&raw)
            .map_err(|e| BootError::Configuration(format!("Invalid window location '{}': {}", raw, e)))?;
        Ok(self.location_mode.app_location(&url))
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("api_url", &self.settings.api_url().as_str())
            .field("auth", &self.auth.kind())
            .field("registry", &self.registry.len())
            .field("anchor", &self.anchor)
            .finish_non_exhaustive()
    }
}

/// One bootstrap run against a host document and window.
pub struct Bootstrap<'a> {
    document: &'a dyn HostDocument,
    window: &'a dyn HostWindow,
    collaborators: Collaborators,
    options: BootOptions,
    trace: BootTrace,
}

impl<'a> Bootstrap<'a> {
    pub fn new(
        document: &'a dyn HostDocument,
        window: &'a dyn HostWindow,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            document,
            window,
            collaborators,
            options: BootOptions::default(),
            trace: BootTrace::new(),
        }
    }

    pub fn with_options(mut self, options: BootOptions) -> Self {
        self.options = options;
        self
    }

    /// Record into an existing trace, e.g. one shared with collaborators.
    pub fn with_trace(mut self, trace: BootTrace) -> Self {
        self.trace = trace;
        self
    }

    /// Run every step and attach the application.
    pub fn run(self) -> BootResult<Application> {
        let mut sink = ErrorTrackingIntegration::Disabled;
        let result = self.run_steps(&mut sink);
        if let Err(err) = &result {
            error!("❌ Bootstrap aborted: {}", err);
            sink.capture(err);
        }
        result
    }

    fn run_steps(&self, sink: &mut ErrorTrackingIntegration) -> BootResult<Application> {
        let trace = &self.trace;
        let collaborators = &self.collaborators;

        info!("📄 Reading settings from host document...");
        let document_settings = settings::read_document_settings(self.document)?;
        trace.record(BootStep::DocumentSettingsRead);

        let error_tracking = activate_error_tracking(
            document_settings.error_tracking()?.as_ref(),
            collaborators.error_tracker.clone(),
        )?;
        if error_tracking.is_active() {
            *sink = error_tracking.clone();
            trace.record(BootStep::ErrorTrackingInitialized);
            info!("✅ Error tracking running");
        }

        let overrides = host_page_config(self.window)?;
        let settings = Arc::new(document_settings.merge(overrides)?);
        trace.record(BootStep::HostConfigMerged);
        info!("✅ Settings resolved (api: {})", settings.api_url());

        let flag = CompatFlag::set(self.document);
        trace.record(BootStep::CompatFlagSet);
        let engine = EngineHandle::reference(collaborators.engine.clone(), self.document, flag)?;
        trace.record(BootStep::EngineReferenced);

        let analytics_provider = activate_analytics(&settings, collaborators.analytics.clone())?;
        if analytics_provider.is_some() {
            trace.record(BootStep::AnalyticsInitialized);
        }
        let analytics = Arc::new(AnalyticsService::new(analytics_provider));
        if analytics.start_flushing(ANALYTICS_FLUSH_INTERVAL).is_some() {
            debug!("Analytics events flushed every {:?}", ANALYTICS_FLUSH_INTERVAL);
        }

        let http = Arc::new(
            HttpPipeline::new(CSRF_HEADER_NAME, self.options.client_id_wait)?
                .with_retry(self.options.retry)
                .with_csrf_cookies(self.document.cookies()),
        );
        let auth = Arc::new(AuthStrategy::select(&settings, http.clone()));
        trace.record(BootStep::AuthSelected(auth.kind().as_str()));
        info!("🔐 Auth strategy: {}", auth.kind().as_str());

        let streamer = Arc::new(Streamer::new(settings.websocket_url().cloned()));
        let session: Arc<dyn SessionLoader> = match &collaborators.session {
            Some(session) => session.clone(),
            None => Arc::new(
                HttpSession::new(&settings, http.clone(), auth.clone())
                    .map_err(|e| BootError::Initialization(format!("session: {:#}", e)))?,
            ),
        };

        info!("📦 Building component registry...");
        let registry = Arc::new(sidebar_registry(CoreServices {
            settings: settings.clone(),
            error_tracking: error_tracking.clone(),
            analytics: analytics.clone(),
            http: http.clone(),
            auth: auth.clone(),
            streamer: streamer.clone(),
            session: session.clone(),
        })?);
        trace.record(BootStep::RegistryBuilt);
        debug!("Registry holds {} entries", registry.len());

        let routes: Arc<RouteTable> = Arc::new(sidebar_routes(session)?);
        let navigator = Arc::new(Navigator::new(
            routes.clone(),
            engine.engine().view_factory(),
            self.options.gate_timeout,
        ));
        trace.record(BootStep::RoutesConfigured);
        debug!("{} routes, html5 location mode", routes.entries().len());

        debug!(
            "Requests carry the {} cookie in {}",
            CSRF_COOKIE_NAME,
            http.csrf_header()
        );
        trace.record(BootStep::HttpConfigured);

        setup_http(&http, &streamer);
        trace.record(BootStep::RunHooksApplied);

        if let Some(server) = settings.live_reload_server() {
            match collaborators.live_reload.connect(server) {
                Ok(()) => trace.record(BootStep::LiveReloadConnected),
                Err(e) => warn!("⚠️  Live reload connection to {} failed: {:#}", server, e),
            }
        }

        let anchor = self.document.query_selector(APP_ANCHOR_SELECTOR).ok_or_else(|| {
            BootError::Bootstrap(format!(
                "anchor element <{}> not found in host document",
                APP_ANCHOR_SELECTOR
            ))
        })?;

        let runtime = engine.engine();
        registry.verify_wiring(&runtime.modules(), &runtime.builtins())?;
        runtime
            .attach(&anchor, &registry, &navigator)
            .map_err(|e| BootError::Bootstrap(format!("attach failed: {:#}", e)))?;
        trace.record(BootStep::Attached);
        info!("🚀 Application attached to <{}>", anchor.selector);

        Ok(Application {
            settings,
            error_tracking,
            analytics,
            auth,
            http,
            streamer,
            registry,
            navigator,
            location_mode: LocationMode::Html5,
            anchor,
            trace: trace.clone(),
        })
    }
}
