//! The sidebar's component catalogue.
//!
//! Core services are constructed by the bootstrap and registered with their
//! instances. Everything else is a descriptor: the rendering engine builds
//! it when it attaches, from the dependencies listed here. `$`-prefixed
//! names and `toastr` come from the engine (see
//! [`ENGINE_BUILTINS`](crate::boot::ENGINE_BUILTINS)).

use std::sync::Arc;

use crate::analytics::AnalyticsService;
use crate::auth::AuthStrategy;
use crate::error::BootResult;
use crate::http::HttpPipeline;
use crate::session::SessionLoader;
use crate::settings::Settings;
use crate::streamer::Streamer;
use crate::subsystems::ErrorTrackingIntegration;

use super::{ComponentKind, ComponentRegistry, RegistryBuilder};

/// Name of the application module.
pub const SIDEBAR_MODULE: &str = "h";

/// Vendor modules the application module depends on.
pub const SIDEBAR_MODULE_REQUIRES: &[&str] = &[
    "angular-jwt",
    "angulartics",
    "angulartics.google.analytics",
    "ngRaven",
    "ngResource",
    "ngRoute",
    "ngSanitize",
    "ngTagsInput",
    "toastr",
    "ui.bootstrap",
];

/// Modules this crate defines itself instead of taking from the engine.
///
/// `ngRaven` always exists so the module list is the same whether or not
/// error tracking is configured.
pub const LOCAL_MODULES: &[&str] = &["ngRaven"];

type Entries = &'static [(&'static str, &'static [&'static str])];

const CONTROLLERS: Entries = &[
    (
        "AnnotationViewerController",
        &[
            "$location",
            "$routeParams",
            "$scope",
            "annotationMapper",
            "annotationUI",
            "rootThread",
            "store",
            "streamFilter",
            "streamer",
        ],
    ),
    (
        "StreamController",
        &[
            "$location",
            "$route",
            "$routeParams",
            "$scope",
            "annotationMapper",
            "annotationUI",
            "queryParser",
            "rootThread",
            "searchFilter",
            "store",
            "streamFilter",
            "streamer",
        ],
    ),
    (
        "WidgetController",
        &[
            "$scope",
            "VirtualThreadList",
            "analytics",
            "annotationMapper",
            "annotationUI",
            "drafts",
            "features",
            "frameSync",
            "groups",
            "rootThread",
            "settings",
            "store",
            "streamFilter",
            "streamer",
        ],
    ),
];

const COMPONENTS: Entries = &[
    (
        "annotation",
        &[
            "$document",
            "$q",
            "$timeout",
            "$window",
            "analytics",
            "annotationMapper",
            "annotationUI",
            "drafts",
            "features",
            "flash",
            "groups",
            "permissions",
            "serviceUrl",
            "session",
            "settings",
            "store",
            "streamer",
        ],
    ),
    ("annotationShareDialog", &["$element", "$scope", "analytics"]),
    ("annotationThread", &[]),
    ("dropdownMenuBtn", &[]),
    ("helpLink", &[]),
    ("helpPanel", &["$window", "annotationUI", "serviceUrl"]),
    ("loggedoutMessage", &["serviceUrl"]),
    ("loginControl", &["serviceUrl", "settings"]),
    ("loginForm", &[]),
    ("moderationBanner", &["annotationUI", "flash", "store"]),
    ("publishAnnotationBtn", &[]),
    ("searchInput", &["$element", "$scope", "http"]),
    ("searchStatusBar", &[]),
    ("selectionTabs", &["$element", "annotationUI", "features", "session"]),
    ("shareDialog", &["$element", "$scope", "analytics"]),
    ("sidebarTutorial", &["session"]),
    ("sortDropdown", &[]),
    ("svgIcon", &["$element"]),
    ("tagEditor", &["tags"]),
    ("threadList", &["$scope", "VirtualThreadList"]),
    ("timestamp", &["$scope", "time"]),
];

const DIRECTIVES: Entries = &[
    (
        "hypothesisApp",
        &[
            "$document",
            "$location",
            "$rootScope",
            "$route",
            "$scope",
            "$window",
            "analytics",
            "annotationUI",
            "auth",
            "bridge",
            "drafts",
            "features",
            "frameSync",
            "groups",
            "serviceUrl",
            "session",
            "settings",
            "streamer",
        ],
    ),
    ("excerpt", &["ExcerptOverflowMonitor"]),
    ("formInput", &[]),
    ("formValidate", &[]),
    ("groupList", &["$window", "analytics", "groups", "serviceUrl", "settings"]),
    ("hAutofocus", &[]),
    ("hOnTouch", &["$parse"]),
    ("hTooltip", &["$window"]),
    ("markdown", &["$sanitize", "$sce"]),
    ("spinner", &["$animate"]),
    ("statusButton", &[]),
    ("topBar", &[]),
    ("windowScroll", &[]),
];

const SERVICES: Entries = &[
    ("annotationMapper", &["$rootScope", "annotationUI", "store"]),
    ("annotationUI", &["$rootScope", "settings"]),
    ("bridge", &[]),
    ("drafts", &[]),
    ("features", &["$log", "session"]),
    ("flash", &["toastr"]),
    ("formRespond", &[]),
    ("frameSync", &["$rootScope", "$window", "Discovery", "annotationUI", "bridge"]),
    ("groups", &["$rootScope", "localStorage", "serviceUrl", "session", "store"]),
    ("host", &["bridge"]),
    ("localStorage", &["$window"]),
    ("permissions", &["localStorage", "session"]),
    ("queryParser", &[]),
    ("rootThread", &["$rootScope", "annotationUI", "drafts", "searchFilter", "viewFilter"]),
    ("searchFilter", &[]),
    ("serviceUrl", &["store"]),
    ("streamFilter", &[]),
    ("tags", &["localStorage"]),
    ("unicode", &[]),
    ("viewFilter", &["unicode"]),
];

const FACTORIES: Entries = &[("store", &["auth", "http", "settings"])];

const VALUES: Entries = &[
    ("Discovery", &[]),
    ("ExcerptOverflowMonitor", &[]),
    ("VirtualThreadList", &[]),
    ("time", &[]),
    ("urlEncodeFilter", &[]),
];

/// Instances built by the bootstrap before the registry is assembled.
pub struct CoreServices {
    pub settings: Arc<Settings>,
    pub error_tracking: ErrorTrackingIntegration,
    pub analytics: Arc<AnalyticsService>,
    pub http: Arc<HttpPipeline>,
    pub auth: Arc<AuthStrategy>,
    pub streamer: Arc<Streamer>,
    pub session: Arc<dyn SessionLoader>,
}

/// Assemble and freeze the sidebar registry.
pub fn sidebar_registry(core: CoreServices) -> BootResult<ComponentRegistry> {
    let registry = RegistryBuilder::new(SIDEBAR_MODULE, SIDEBAR_MODULE_REQUIRES)
        .value("settings", core.settings)?
        .value("errorTracking", Arc::new(core.error_tracking))?
        .service("http", &[], core.http)?
        .service("analytics", &["settings"], core.analytics)?
        .service("auth", &["http", "settings"], core.auth)?
        .service("streamer", &["settings"], core.streamer)?
        .service("session", &["auth", "http", "settings"], Arc::new(core.session))?
        .externals(ComponentKind::Controller, CONTROLLERS)?
        .externals(ComponentKind::Component, COMPONENTS)?
        .externals(ComponentKind::Directive, DIRECTIVES)?
        .externals(ComponentKind::Service, SERVICES)?
        .externals(ComponentKind::Factory, FACTORIES)?
        .externals(ComponentKind::Value, VALUES)?
        .freeze();
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::boot::ENGINE_BUILTINS;
    use crate::http::CSRF_HEADER_NAME;
    use crate::registry::Deps;
    use crate::session::StaticSession;

    fn core() -> CoreServices {
        let settings = Arc::new(
            Settings::from_value(serde_json::json!({"apiUrl": "https://hypothes.is/api/"}))
                .unwrap(),
        );
        let http = Arc::new(HttpPipeline::new(CSRF_HEADER_NAME, Duration::ZERO).unwrap());
        CoreServices {
            auth: Arc::new(AuthStrategy::select(&settings, http.clone())),
            settings,
            error_tracking: ErrorTrackingIntegration::Disabled,
            analytics: Arc::new(AnalyticsService::new(None)),
            http,
            streamer: Arc::new(Streamer::new(None)),
            session: Arc::new(StaticSession::default()),
        }
    }

    fn builtins() -> Vec<String> {
        ENGINE_BUILTINS.iter().map(|b| b.to_string()).collect()
    }

    fn modules() -> Vec<String> {
        SIDEBAR_MODULE_REQUIRES
            .iter()
            .filter(|m| !LOCAL_MODULES.contains(m))
            .map(|m| m.to_string())
            .collect()
    }

    #[test]
    fn test_catalogue_wires_strictly() {
        let registry = sidebar_registry(core()).unwrap();
        registry.verify_wiring(&modules(), &builtins()).unwrap();
        assert!(registry
            .keys()
            .all(|name| matches!(registry.def(name).unwrap().deps, Deps::Declared(_))));
    }

    #[test]
    fn test_catalogue_contents() {
        let registry = sidebar_registry(core()).unwrap();
        assert_eq!(
            registry.names_of(ComponentKind::Controller),
            vec!["AnnotationViewerController", "StreamController", "WidgetController"]
        );
        assert_eq!(registry.names_of(ComponentKind::Factory), vec!["store"]);
        for name in ["settings", "auth", "http", "session", "streamer", "analytics", "errorTracking"] {
            assert!(registry.def(name).unwrap().has_instance(), "{} has no instance", name);
        }
        assert!(!registry.def("groups").unwrap().has_instance());
    }

    #[test]
    fn test_core_instances_are_typed() {
        let registry = sidebar_registry(core()).unwrap();
        assert_eq!(
            registry.get::<Settings>("settings").unwrap().api_url().as_str(),
            "https://hypothes.is/api/"
        );
        assert!(registry.get::<Arc<dyn SessionLoader>>("session").is_some());
        assert!(!registry
            .get::<ErrorTrackingIntegration>("errorTracking")
            .unwrap()
            .is_active());
    }

    #[test]
    fn test_kinds_follow_registration_chain() {
        let registry = sidebar_registry(core()).unwrap();
        for name in ["markdown", "topBar", "groupList", "hypothesisApp"] {
            assert_eq!(registry.def(name).unwrap().kind, ComponentKind::Directive, "{}", name);
        }
        assert!(registry.names_of(ComponentKind::Component).contains(&"threadList"));
        assert!(!registry.contains("sidebarContent"));
    }

    #[test]
    fn test_misspelled_builtin_fails_wiring() {
        let registry = RegistryBuilder::new(SIDEBAR_MODULE, &[])
            .externals(ComponentKind::Component, &[("timestamp", &["$scpoe", "time"])])
            .unwrap()
            .externals(ComponentKind::Value, &[("time", &[])])
            .unwrap()
            .freeze();
        let err = registry.verify_wiring(&[], &builtins()).unwrap_err();
        assert!(err.to_string().contains("$scpoe"));
    }
}
