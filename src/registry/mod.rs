//! Component registry.
//!
//! The registry maps symbolic names to the application's components:
//! controllers, view components, directives, services, factories and plain
//! values. Some entries carry an instance built by the composition root
//! (settings, auth, the HTTP pipeline); the rest describe components the
//! rendering engine instantiates itself at attach time.
//!
//! A [`RegistryBuilder`] collects entries and is frozen into an immutable
//! [`ComponentRegistry`]. Every entry declares its dependencies up front;
//! [`ComponentRegistry::verify_wiring`] rejects anything it cannot resolve.

pub mod catalog;

pub use catalog::{
    sidebar_registry, CoreServices, LOCAL_MODULES, SIDEBAR_MODULE, SIDEBAR_MODULE_REQUIRES,
};

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::{BootError, BootResult};

/// An instance held by the registry.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// What kind of component an entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ComponentKind {
    Controller,
    Component,
    Directive,
    Service,
    Factory,
    Value,
}

/// How an entry declares what it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deps {
    Declared(Vec<&'static str>),
    /// Dependencies inferred from parameter names; rejected by strict wiring
    Implicit,
}

/// One registry entry.
#[derive(Clone)]
pub struct ComponentDef {
    pub kind: ComponentKind,
    pub deps: Deps,
    instance: Option<Instance>,
}

impl ComponentDef {
    /// Entry the rendering engine will construct.
    pub fn external(kind: ComponentKind, deps: &[&'static str]) -> Self {
        Self {
            kind,
            deps: Deps::Declared(deps.to_vec()),
            instance: None,
        }
    }

    /// Entry backed by an already constructed instance.
    pub fn instance<T: Any + Send + Sync>(
        kind: ComponentKind,
        deps: &[&'static str],
        value: Arc<T>,
    ) -> Self {
        Self {
            kind,
            deps: Deps::Declared(deps.to_vec()),
            instance: Some(value as Instance),
        }
    }

    /// Entry that relies on implicit dependency inference.
    pub fn implicit(kind: ComponentKind) -> Self {
        Self {
            kind,
            deps: Deps::Implicit,
            instance: None,
        }
    }

    pub fn has_instance(&self) -> bool {
        self.instance.is_some()
    }
}

impl std::fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDef")
            .field("kind", &self.kind)
            .field("deps", &self.deps)
            .field("instance", &self.instance.is_some())
            .finish()
    }
}

/// Collects entries until frozen.
#[derive(Debug)]
pub struct RegistryBuilder {
    module: String,
    requires: Vec<String>,
    entries: BTreeMap<String, ComponentDef>,
}

impl RegistryBuilder {
    /// Start a module that depends on the given vendor modules.
    pub fn new(module: &str, requires: &[&str]) -> Self {
        Self {
            module: module.to_string(),
            requires: requires.iter().map(|m| m.to_string()).collect(),
            entries: BTreeMap::new(),
        }
    }

    /// Add an entry; a name can only be registered once.
    pub fn register(mut self, name: &str, def: ComponentDef) -> BootResult<Self> {
        if self.entries.contains_key(name) {
            return Err(BootError::RegistrationConflict(name.to_string()));
        }
        self.entries.insert(name.to_string(), def);
        Ok(self)
    }

    /// Register a constructed value with no dependencies.
    pub fn value<T: Any + Send + Sync>(self, name: &str, value: Arc<T>) -> BootResult<Self> {
        self.register(name, ComponentDef::instance(ComponentKind::Value, &[], value))
    }

    /// Register a constructed service and the names it was built from.
    pub fn service<T: Any + Send + Sync>(
        self,
        name: &str,
        deps: &[&'static str],
        value: Arc<T>,
    ) -> BootResult<Self> {
        self.register(name, ComponentDef::instance(ComponentKind::Service, deps, value))
    }

    /// Add a batch of engine-built entries.
    pub fn externals(
        mut self,
        kind: ComponentKind,
        entries: &[(&str, &[&'static str])],
    ) -> BootResult<Self> {
        for (name, deps) in entries {
            self = self.register(name, ComponentDef::external(kind, deps))?;
        }
        Ok(self)
    }

    /// Close the registry for new entries.
    pub fn freeze(self) -> ComponentRegistry {
        debug!(
            "Registry '{}' frozen with {} entries",
            self.module,
            self.entries.len()
        );
        ComponentRegistry {
            module: self.module,
            requires: self.requires,
            entries: self.entries,
        }
    }
}

/// Immutable name → component mapping.
#[derive(Debug)]
pub struct ComponentRegistry {
    module: String,
    requires: Vec<String>,
    entries: BTreeMap<String, ComponentDef>,
}

impl ComponentRegistry {
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn requires(&self) -> &[String] {
        &self.requires
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn def(&self, name: &str) -> Option<&ComponentDef> {
        self.entries.get(name)
    }

    /// Names of all entries of one kind.
    pub fn names_of(&self, kind: ComponentKind) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, def)| def.kind == kind)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Typed access to a constructed instance.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .get(name)?
            .instance
            .clone()?
            .downcast::<T>()
            .ok()
    }

    /// Strict wiring check.
    ///
    /// Every vendor module must be provided by the engine (or defined
    /// locally), every entry must declare its dependencies, and every
    /// declared dependency must name a registry entry or an engine builtin.
    pub fn verify_wiring(
        &self,
        engine_modules: &[String],
        engine_builtins: &[String],
    ) -> BootResult<()> {
        let modules: BTreeSet<&str> = engine_modules
            .iter()
            .map(String::as_str)
            .chain(LOCAL_MODULES.iter().copied())
            .collect();
        for required in &self.requires {
            if !modules.contains(required.as_str()) {
                return Err(BootError::Wiring(format!(
                    "module '{}' requires '{}', which is not available",
                    self.module, required
                )));
            }
        }

        let builtins: BTreeSet<&str> = engine_builtins.iter().map(String::as_str).collect();
        for (name, def) in &self.entries {
            let deps = match &def.deps {
                Deps::Declared(deps) => deps,
                Deps::Implicit => {
                    return Err(BootError::Wiring(format!(
                        "'{}' does not declare its dependencies",
                        name
                    )))
                }
            };
            for dep in deps {
                if !self.entries.contains_key(*dep) && !builtins.contains(dep) {
                    return Err(BootError::Wiring(format!(
                        "'{}' depends on unknown '{}'",
                        name, dep
                    )));
                }
            }
        }

        debug!("Strict wiring check passed for {} entries", self.entries.len());
        Ok(())
    }
}
