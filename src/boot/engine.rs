//! Rendering engine seam.
//!
//! The engine must not be loaded until the document carries the
//! restricted-execution flag. [`EngineHandle::reference`] is the only way
//! to obtain a loaded engine, and it takes the [`CompatFlag`] token that
//! only [`CompatFlag::set`] can produce. The attribute itself is checked
//! again at load time in case something removed it in between.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::error::{BootError, BootResult};
use crate::host::{AnchorElement, HostDocument};
use crate::registry::{ComponentRegistry, LOCAL_MODULES, SIDEBAR_MODULE_REQUIRES};
use crate::routes::{Navigator, View, ViewFactory};

/// Body attribute that switches the engine into CSP-safe mode.
pub const COMPAT_FLAG_ATTRIBUTE: &str = "ng-csp";

/// Injectables the engine and its vendor modules provide.
pub const ENGINE_BUILTINS: &[&str] = &[
    "$animate",
    "$document",
    "$element",
    "$http",
    "$location",
    "$log",
    "$parse",
    "$q",
    "$rootScope",
    "$route",
    "$routeParams",
    "$sanitize",
    "$sce",
    "$scope",
    "$timeout",
    "$window",
    "toastr",
];

/// The UI engine that hosts the registry's components.
pub trait RenderingEngine: Send + Sync {
    /// First reference to the engine.
    fn load(&self, document: &dyn HostDocument) -> Result<()>;

    /// Vendor modules the engine can provide.
    fn modules(&self) -> Vec<String>;

    /// Services the engine injects itself (`$scope`, `$window`, ...).
    fn builtins(&self) -> Vec<String>;

    /// Where route views get built.
    fn view_factory(&self) -> Arc<dyn ViewFactory>;

    /// Mount the application on `anchor`.
    fn attach(
        &self,
        anchor: &AnchorElement,
        registry: &ComponentRegistry,
        navigator: &Arc<Navigator>,
    ) -> Result<()>;
}

/// Proof that the compatibility flag was set on the document.
#[derive(Debug)]
pub struct CompatFlag(());

impl CompatFlag {
    pub fn set(document: &dyn HostDocument) -> Self {
        document.set_body_attribute(COMPAT_FLAG_ATTRIBUTE, "");
        debug!("Set {} on document body", COMPAT_FLAG_ATTRIBUTE);
        CompatFlag(())
    }
}

/// A loaded rendering engine.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn RenderingEngine>,
}

impl EngineHandle {
    /// Reference the engine for the first time.
    pub fn reference(
        engine: Arc<dyn RenderingEngine>,
        document: &dyn HostDocument,
        _flag: CompatFlag,
    ) -> BootResult<Self> {
        if document.body_attribute(COMPAT_FLAG_ATTRIBUTE).is_none() {
            return Err(BootError::Initialization(format!(
                "rendering engine referenced without the {} flag on the document",
                COMPAT_FLAG_ATTRIBUTE
            )));
        }

        engine
            .load(document)
            .map_err(|e| BootError::Initialization(format!("rendering engine: {:#}", e)))?;
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &Arc<dyn RenderingEngine> {
        &self.engine
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

/// Engine that provides everything the sidebar asks for and logs instead
/// of rendering. Used by the dry-run binary.
#[derive(Debug, Default)]
pub struct LoggingEngine;

impl RenderingEngine for LoggingEngine {
    fn load(&self, _document: &dyn HostDocument) -> Result<()> {
        debug!("Rendering engine loaded");
        Ok(())
    }

    fn modules(&self) -> Vec<String> {
        SIDEBAR_MODULE_REQUIRES
            .iter()
            .filter(|m| !LOCAL_MODULES.contains(m))
            .map(|m| m.to_string())
            .collect()
    }

    fn builtins(&self) -> Vec<String> {
        ENGINE_BUILTINS.iter().map(|b| b.to_string()).collect()
    }

    fn view_factory(&self) -> Arc<dyn ViewFactory> {
        Arc::new(LoggingViews)
    }

    fn attach(
        &self,
        anchor: &AnchorElement,
        registry: &ComponentRegistry,
        _navigator: &Arc<Navigator>,
    ) -> Result<()> {
        info!(
            "Attached module '{}' ({} components) to <{}>",
            registry.module(),
            registry.len(),
            anchor.selector
        );
        Ok(())
    }
}

struct LoggingViews;

impl ViewFactory for LoggingViews {
    fn instantiate(&self, view: &View) {
        info!(
            "View {} for {} (navigation {})",
            view.controller, view.route.location.path, view.navigation
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StaticDocument;

    #[test]
    fn test_reference_requires_flag_on_document() {
        let document = StaticDocument::default();
        let flag = CompatFlag::set(&document);
        assert!(EngineHandle::reference(Arc::new(LoggingEngine), &document, flag).is_ok());
        assert_eq!(document.body_attribute(COMPAT_FLAG_ATTRIBUTE).as_deref(), Some(""));
    }

    #[test]
    fn test_reference_fails_fast_when_flag_missing() {
        // Flag set on one document, engine referenced against another.
        let flagged = StaticDocument::default();
        let flag = CompatFlag::set(&flagged);
        let other = StaticDocument::default();

        let err = EngineHandle::reference(Arc::new(LoggingEngine), &other, flag).unwrap_err();
        assert_eq!(err.kind(), "InitializationError");
    }
}
