//! Settings resolution.
//!
//! Settings come from two places:
//! 1. A JSON payload embedded in the host document by the service that
//!    rendered the sidebar page.
//! 2. Host-page overrides passed through the window URL (see
//!    [`host_config`]).
//!
//! Overrides win on key collision. The merged result is frozen into a
//! [`Settings`] value that no component can mutate afterwards.

pub mod host_config;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use url::Url;

use crate::error::{BootError, BootResult};
use crate::host::{HostDocument, HostWindow, SETTINGS_ELEMENT_CLASS};

pub use host_config::{host_page_config, HOST_CONFIG_WHITELIST};

/// Error-tracking client parameters (`errorTracking`, formerly `raven`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorTrackingConfig {
    pub dsn: String,
    #[serde(default)]
    pub release: Option<String>,
}

/// Renamed keys, current name first.
const ERROR_TRACKING_KEYS: &[&str] = &["errorTracking", "raven"];
const ANALYTICS_KEYS: &[&str] = &["analytics", "googleAnalytics"];

/// Typed view over the recognised keys.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFields {
    api_url: String,
    #[serde(default)]
    auth_domain: Option<String>,
    #[serde(default)]
    service_url: Option<String>,
    #[serde(default)]
    websocket_url: Option<String>,
    #[serde(default)]
    live_reload_server: Option<String>,
    #[serde(default)]
    services: Option<Value>,
}

/// Frozen configuration snapshot.
///
/// There are no setters: once built, a `Settings` value is read-only and is
/// shared between components behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    values: Map<String, Value>,
    api_url: Url,
    auth_domain: Option<String>,
    service_url: Option<Url>,
    websocket_url: Option<Url>,
    error_tracking: Option<ErrorTrackingConfig>,
    analytics: Option<String>,
    live_reload_server: Option<Url>,
    services: Option<Value>,
}

impl Settings {
    /// Build settings from an already merged key/value map.
    pub fn from_map(values: Map<String, Value>) -> BootResult<Self> {
        let fields: SettingsFields = serde_json::from_value(Value::Object(values.clone()))
            .map_err(|e| BootError::Configuration(format!("Invalid settings: {}", e)))?;

        let api_url = parse_url("apiUrl", &fields.api_url)?;
        let service_url = optional_url("serviceUrl", fields.service_url)?;
        let websocket_url = optional_url("websocketUrl", fields.websocket_url)?;
        let live_reload_server = optional_url("liveReloadServer", fields.live_reload_server)?;

        let error_tracking = error_tracking_config(&values)?;
        let analytics = analytics_id(&values)?;

        Ok(Self {
            values,
            api_url,
            auth_domain: fields.auth_domain.filter(|d| !d.is_empty()),
            service_url,
            websocket_url,
            error_tracking,
            analytics,
            live_reload_server,
            services: fields.services,
        })
    }

    /// Build settings from a JSON object.
    pub fn from_value(value: Value) -> BootResult<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            other => Err(BootError::Configuration(format!(
                "Settings must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn auth_domain(&self) -> Option<&str> {
        self.auth_domain.as_deref()
    }

    pub fn service_url(&self) -> Option<&Url> {
        self.service_url.as_ref()
    }

    pub fn websocket_url(&self) -> Option<&Url> {
        self.websocket_url.as_ref()
    }

    pub fn error_tracking(&self) -> Option<&ErrorTrackingConfig> {
        self.error_tracking.as_ref()
    }

    /// Analytics tracking id, if analytics is enabled.
    pub fn analytics(&self) -> Option<&str> {
        self.analytics.as_deref()
    }

    pub fn live_reload_server(&self) -> Option<&Url> {
        self.live_reload_server.as_ref()
    }

    /// Raw `services` value, whatever its shape.
    pub fn services(&self) -> Option<&Value> {
        self.services.as_ref()
    }

    /// Raw value of any key, recognised or not.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// All keys, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Full snapshot as JSON, used to expose settings as a registry value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

/// Settings read from the document, before host-page overrides are merged.
#[derive(Debug, Clone)]
pub struct DocumentSettings {
    values: Map<String, Value>,
}

impl DocumentSettings {
    /// Error-tracking parameters from the document payload alone.
    ///
    /// Error tracking starts before host-page overrides are merged, so it
    /// only ever sees what the document carries.
    pub fn error_tracking(&self) -> BootResult<Option<ErrorTrackingConfig>> {
        error_tracking_config(&self.values)
    }

    /// Merge host-page overrides and freeze.
    pub fn merge(mut self, overrides: Map<String, Value>) -> BootResult<Settings> {
        for (key, value) in overrides {
            debug!("Host page overrides setting '{}'", key);
            self.values.insert(key, value);
        }
        Settings::from_map(self.values)
    }
}

/// Read the embedded settings payload from the host document.
pub fn read_document_settings(document: &dyn HostDocument) -> BootResult<DocumentSettings> {
    let payload = document.settings_payload().ok_or_else(|| {
        BootError::Configuration(format!(
            "Settings element '.{}' not found in host document",
            SETTINGS_ELEMENT_CLASS
        ))
    })?;

    let value: Value = serde_json::from_str(&payload)
        .map_err(|e| BootError::Configuration(format!("Settings payload is not JSON: {}", e)))?;

    match value {
        Value::Object(values) => {
            debug!("Read {} settings keys from host document", values.len());
            Ok(DocumentSettings { values })
        }
        other => Err(BootError::Configuration(format!(
            "Settings payload must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Resolve and freeze settings in one step.
pub fn resolve(document: &dyn HostDocument, window: &dyn HostWindow) -> BootResult<Settings> {
    let document_settings = read_document_settings(document)?;
    let overrides = host_page_config(window)?;
    let settings = document_settings.merge(overrides)?;
    info!("Settings resolved (api: {})", settings.api_url());
    Ok(settings)
}

/// First of `keys` present with a non-null value.
fn renamed<'a>(
    values: &'a Map<String, Value>,
    keys: &[&'static str],
) -> Option<(&'static str, &'a Value)> {
    keys.iter().find_map(|key| match values.get(*key) {
        None | Some(Value::Null) => None,
        Some(value) => Some((*key, value)),
    })
}

fn error_tracking_config(values: &Map<String, Value>) -> BootResult<Option<ErrorTrackingConfig>> {
    let Some((key, raw)) = renamed(values, ERROR_TRACKING_KEYS) else {
        return Ok(None);
    };
    let config: ErrorTrackingConfig = serde_json::from_value(raw.clone())
        .map_err(|e| BootError::Configuration(format!("Invalid {}: {}", key, e)))?;
    if config.dsn.trim().is_empty() {
        return Err(BootError::Configuration(format!(
            "{}.dsn must not be empty",
            key
        )));
    }
    Ok(Some(config))
}

/// Analytics tracking id; an empty id means disabled.
fn analytics_id(values: &Map<String, Value>) -> BootResult<Option<String>> {
    match renamed(values, ANALYTICS_KEYS) {
        None => Ok(None),
        Some((_, Value::String(id))) if id.is_empty() => Ok(None),
        Some((_, Value::String(id))) => Ok(Some(id.clone())),
        Some((key, other)) => Err(BootError::Configuration(format!(
            "{} must be a string, got {}",
            key,
            json_kind(other)
        ))),
    }
}

fn parse_url(key: &str, raw: &str) -> BootResult<Url> {
    Url::parse(raw)
        .map_err(|e| BootError::Configuration(format!("Invalid {} '{}': {}", key, raw, e)))
}

fn optional_url(key: &str, raw: Option<String>) -> BootResult<Option<Url>> {
    match raw {
        Some(raw) if !raw.is_empty() => parse_url(key, &raw).map(Some),
        _ => Ok(None),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{StaticDocument, StaticWindow};
    use serde_json::json;

    fn document(settings: Value) -> StaticDocument {
        StaticDocument::with_settings(&settings)
    }

    #[test]
    fn test_resolve_reads_document_payload() {
        let doc = document(json!({
            "apiUrl": "https://hypothes.is/api/",
            "raven": {"dsn": "https://key@sentry.io/1"},
            "googleAnalytics": "UA-1",
            "liveReloadServer": "ws://localhost:3000"
        }));

        let settings = resolve(&doc, &StaticWindow::default()).unwrap();
        assert_eq!(settings.api_url().as_str(), "https://hypothes.is/api/");
        assert_eq!(
            settings.error_tracking().map(|c| c.dsn.as_str()),
            Some("https://key@sentry.io/1")
        );
        assert_eq!(settings.analytics(), Some("UA-1"));
        assert!(settings.live_reload_server().is_some());
        assert!(settings.services().is_none());
    }

    #[test]
    fn test_missing_payload_is_configuration_error() {
        let doc = StaticDocument::new(None, vec![]);
        let err = resolve(&doc, &StaticWindow::default()).unwrap_err();
        assert!(matches!(err, BootError::Configuration(_)));
    }

    #[test]
    fn test_malformed_payload_is_configuration_error() {
        let doc = StaticDocument::new(Some("{not json".to_string()), vec![]);
        assert!(matches!(
            resolve(&doc, &StaticWindow::default()),
            Err(BootError::Configuration(_))
        ));

        let doc = document(json!(["apiUrl"]));
        assert!(matches!(
            resolve(&doc, &StaticWindow::default()),
            Err(BootError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_api_url_is_configuration_error() {
        let doc = document(json!({"googleAnalytics": "UA-1"}));
        let err = resolve(&doc, &StaticWindow::default()).unwrap_err();
        assert!(err.to_string().contains("apiUrl"));
    }

    #[test]
    fn test_host_page_overrides_win() {
        let doc = document(json!({
            "apiUrl": "https://hypothes.is/api/",
            "services": "not-a-list",
            "openSidebar": false
        }));
        let window = StaticWindow::new(
            "https://hypothes.is/app.html?config=%7B%22openSidebar%22%3Atrue%2C%22services%22%3A%5B%5D%7D",
        );

        let settings = resolve(&doc, &window).unwrap();
        assert_eq!(settings.get("openSidebar"), Some(&json!(true)));
        assert_eq!(settings.services(), Some(&json!([])));
    }

    #[test]
    fn test_empty_analytics_id_is_disabled() {
        let settings = Settings::from_value(json!({
            "apiUrl": "https://hypothes.is/api/",
            "analytics": ""
        }))
        .unwrap();
        assert_eq!(settings.analytics(), None);
    }

    #[test]
    fn test_document_error_tracking_ignores_overrides() {
        let doc = document(json!({
            "apiUrl": "https://hypothes.is/api/",
            "errorTracking": {"dsn": "x", "release": "1.0"}
        }));
        let partial = read_document_settings(&doc).unwrap();
        let tracking = partial.error_tracking().unwrap().unwrap();
        assert_eq!(tracking.dsn, "x");
        assert_eq!(tracking.release.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_current_keys_win_over_legacy_names() {
        let settings = Settings::from_value(json!({
            "apiUrl": "https://hypothes.is/api/",
            "errorTracking": {"dsn": "x"},
            "raven": {"dsn": "y"},
            "analytics": "UA-new",
            "googleAnalytics": "UA-old"
        }))
        .unwrap();
        assert_eq!(settings.error_tracking().map(|c| c.dsn.as_str()), Some("x"));
        assert_eq!(settings.analytics(), Some("UA-new"));

        let doc = document(json!({
            "apiUrl": "https://hypothes.is/api/",
            "errorTracking": {"dsn": "x"},
            "raven": {"dsn": "y"}
        }));
        let partial = read_document_settings(&doc).unwrap();
        assert_eq!(partial.error_tracking().unwrap().unwrap().dsn, "x");
    }

    #[test]
    fn test_legacy_name_read_when_current_is_null() {
        let settings = Settings::from_value(json!({
            "apiUrl": "https://hypothes.is/api/",
            "analytics": null,
            "googleAnalytics": "UA-old"
        }))
        .unwrap();
        assert_eq!(settings.analytics(), Some("UA-old"));
    }

    #[test]
    fn test_empty_dsn_rejected_before_merge() {
        let doc = document(json!({
            "apiUrl": "https://hypothes.is/api/",
            "raven": {"dsn": " "}
        }));
        let partial = read_document_settings(&doc).unwrap();
        let err = partial.error_tracking().unwrap_err();
        assert!(matches!(err, BootError::Configuration(_)));
        assert!(err.to_string().contains("raven.dsn"));
    }

    #[test]
    fn test_non_string_analytics_id_rejected() {
        let err = Settings::from_value(json!({
            "apiUrl": "https://hypothes.is/api/",
            "googleAnalytics": 42
        }))
        .unwrap_err();
        assert!(err.to_string().contains("googleAnalytics"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = Settings::from_value(json!({
            "apiUrl": "https://hypothes.is/api/",
            "websocketUrl": "not a url"
        }))
        .unwrap_err();
        assert!(err.to_string().contains("websocketUrl"));
    }
}
