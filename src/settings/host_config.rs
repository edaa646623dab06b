//! Host-page configuration.
//!
//! The page embedding the sidebar passes its configuration as a JSON object
//! in the `config` query parameter of the sidebar URL. Only a fixed set of
//! keys may be overridden this way.

use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::error::{BootError, BootResult};
use crate::host::HostWindow;

use super::json_kind;

/// Query parameter carrying the host-page configuration.
pub const CONFIG_QUERY_PARAM: &str = "config";

/// Keys the host page is allowed to set.
pub const HOST_CONFIG_WHITELIST: &[&str] = &[
    "annotations",
    "openLoginForm",
    "openSidebar",
    "showHighlights",
    "services",
];

/// Extract the whitelisted host-page overrides from the window location.
pub fn host_page_config(window: &dyn HostWindow) -> BootResult<Map<String, Value>> {
    let location = window.location();
    let url = Url::parse(&location).map_err(|e| {
        BootError::Configuration(format!("Invalid window location '{}': {}", location, e))
    })?;

    let raw = match url
        .query_pairs()
        .find(|(key, _)| key == CONFIG_QUERY_PARAM)
    {
        Some((_, value)) => value.into_owned(),
        None => return Ok(Map::new()),
    };

    let parsed: Value = serde_json::from_str(&raw).map_err(|e| {
        BootError::Configuration(format!("Host page config is not valid JSON: {}", e))
    })?;

    let config = match parsed {
        Value::Object(config) => config,
        other => {
            return Err(BootError::Configuration(format!(
                "Host page config must be a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut overrides = Map::new();
    for (key, value) in config {
        if HOST_CONFIG_WHITELIST.contains(&key.as_str()) {
            overrides.insert(key, value);
        } else {
            warn!("Ignoring host page config key '{}'", key);
        }
    }

    debug!("Host page config provides {} override(s)", overrides.len());
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticWindow;
    use serde_json::json;

    fn window_with_config(config: &Value) -> StaticWindow {
        let mut url = Url::parse("https://hypothes.is/app.html").unwrap();
        url.query_pairs_mut()
            .append_pair(CONFIG_QUERY_PARAM, &config.to_string());
        StaticWindow::new(url.to_string())
    }

    #[test]
    fn test_no_config_param_yields_empty_map() {
        let overrides = host_page_config(&StaticWindow::default()).unwrap();
        assert!(overrides.is_empty());
    }

    #[test]
    fn test_only_whitelisted_keys_are_kept() {
        let window = window_with_config(&json!({
            "openSidebar": true,
            "apiUrl": "https://evil.example.com/",
            "services": [{"authority": "a"}]
        }));

        let overrides = host_page_config(&window).unwrap();
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides.get("openSidebar"), Some(&json!(true)));
        assert!(overrides.get("apiUrl").is_none());
    }

    #[test]
    fn test_non_object_config_is_rejected() {
        let window = window_with_config(&json!([1, 2, 3]));
        assert!(matches!(
            host_page_config(&window),
            Err(BootError::Configuration(_))
        ));
    }

    #[test]
    fn test_malformed_config_is_rejected() {
        let window = StaticWindow::new("https://hypothes.is/app.html?config=%7Bbroken");
        assert!(matches!(
            host_page_config(&window),
            Err(BootError::Configuration(_))
        ));
    }
}
