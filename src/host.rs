//! Host environment seams.
//!
//! The sidebar runs inside a document it does not own. These traits cover
//! the few reads and writes the bootstrap needs from it, so the sequencer
//! can run against a real page binding or the in-memory fixtures below.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Deserialize;

/// Class of the element carrying the embedded settings payload.
pub const SETTINGS_ELEMENT_CLASS: &str = "js-hypothesis-settings";

/// Tag of the element the application is attached to.
pub const APP_ANCHOR_SELECTOR: &str = "hypothesis-app";

/// Handle to an element found in the host document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorElement {
    pub selector: String,
}

/// Read/write view of the hosting document.
pub trait HostDocument: Send + Sync {
    /// Raw text of the embedded settings payload, if the element exists.
    fn settings_payload(&self) -> Option<String>;

    /// Set an attribute on the document body.
    fn set_body_attribute(&self, name: &str, value: &str);

    /// Read an attribute from the document body.
    fn body_attribute(&self, name: &str) -> Option<String>;

    /// Find the first element matching a tag selector.
    fn query_selector(&self, selector: &str) -> Option<AnchorElement>;

    /// The document's cookies, read live on every lookup.
    fn cookies(&self) -> Arc<dyn CookieJar>;
}

/// Live view of the document's cookies.
pub trait CookieJar: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// In-memory cookie jar.
#[derive(Debug, Default)]
pub struct StaticCookies {
    values: Mutex<BTreeMap<String, String>>,
}

impl StaticCookies {
    pub fn set(&self, name: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(name.to_string(), value.to_string());
        }
    }
}

impl CookieJar for StaticCookies {
    fn get(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(name).cloned())
    }
}

/// Read-only view of the hosting window.
pub trait HostWindow: Send + Sync {
    /// Full location URL of the window.
    fn location(&self) -> String;
}

/// On-disk / in-memory description of a host document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFixture {
    /// Settings payload; a JSON string is taken verbatim, any other value is
    /// re-serialized.
    #[serde(default)]
    pub settings: Option<serde_json::Value>,
    /// Tags of the elements present in the body.
    #[serde(default)]
    pub elements: Vec<String>,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

/// In-memory document used by the dry-run binary and tests.
#[derive(Debug, Default)]
pub struct StaticDocument {
    settings: Option<String>,
    elements: Vec<String>,
    body_attributes: Mutex<BTreeMap<String, String>>,
    cookies: Arc<StaticCookies>,
}

impl StaticDocument {
    pub fn new(settings: Option<String>, elements: Vec<String>) -> Self {
        Self {
            settings,
            elements,
            body_attributes: Mutex::new(BTreeMap::new()),
            cookies: Arc::new(StaticCookies::default()),
        }
    }

    /// Cookie jar backing this document.
    pub fn cookie_jar(&self) -> &StaticCookies {
        &self.cookies
    }

    /// Document with a settings payload and the application anchor.
    pub fn with_settings(settings: &serde_json::Value) -> Self {
        Self::new(
            Some(settings.to_string()),
            vec![APP_ANCHOR_SELECTOR.to_string()],
        )
    }

    pub fn from_fixture(fixture: DocumentFixture) -> Self {
        let settings = fixture.settings.map(|value| match value {
            serde_json::Value::String(raw) => raw,
            other => other.to_string(),
        });
        let document = Self::new(settings, fixture.elements);
        for (name, value) in &fixture.cookies {
            document.cookies.set(name, value);
        }
        document
    }
}

impl HostDocument for StaticDocument {
    fn settings_payload(&self) -> Option<String> {
        self.settings.clone()
    }

    fn set_body_attribute(&self, name: &str, value: &str) {
        if let Ok(mut attributes) = self.body_attributes.lock() {
            attributes.insert(name.to_string(), value.to_string());
        }
    }

    fn body_attribute(&self, name: &str) -> Option<String> {
        self.body_attributes
            .lock()
            .ok()
            .and_then(|attributes| attributes.get(name).cloned())
    }

    fn query_selector(&self, selector: &str) -> Option<AnchorElement> {
        self.elements
            .iter()
            .find(|tag| tag.as_str() == selector)
            .map(|tag| AnchorElement {
                selector: tag.clone(),
            })
    }

    fn cookies(&self) -> Arc<dyn CookieJar> {
        self.cookies.clone()
    }
}

/// Window with a fixed location.
#[derive(Debug, Clone)]
pub struct StaticWindow {
    location: String,
}

impl StaticWindow {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

impl Default for StaticWindow {
    fn default() -> Self {
        Self::new("https://hypothes.is/app.html")
    }
}

impl HostWindow for StaticWindow {
    fn location(&self) -> String {
        self.location.clone()
    }
}
