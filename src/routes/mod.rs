//! Route table and resolve gates.
//!
//! Routes are matched in declaration order; the first match wins and the
//! catch-all, if any, is always last (the builder only lets you add it as
//! the final step). Every route carries a [`ResolveGate`]: a set of named
//! async preconditions that must all succeed before the route's view is
//! constructed.

mod navigator;
mod pattern;

pub use navigator::{
    AbortReason, GateState, NavigationOutcome, NavigationStatus, Navigator, View, ViewFactory,
};
pub use pattern::{Location, RoutePattern};

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use tracing::debug;
use url::Url;

use crate::error::{BootError, BootResult, GateError};
use crate::session::SessionLoader;

/// Name under which the session state is injected into views
pub const SESSION_STATE: &str = "sessionState";

/// A value produced by a precondition.
pub type Resolved = Arc<dyn Any + Send + Sync>;

/// One asynchronous precondition of a gate.
pub trait Precondition: Send + Sync {
    fn resolve(&self) -> BoxFuture<'static, Result<Resolved>>;
}

/// Precondition that loads the session.
pub struct LoadSession {
    loader: Arc<dyn SessionLoader>,
}

impl LoadSession {
    pub fn new(loader: Arc<dyn SessionLoader>) -> Self {
        Self { loader }
    }
}

impl Precondition for LoadSession {
    fn resolve(&self) -> BoxFuture<'static, Result<Resolved>> {
        self.loader
            .load()
            .map(|state| state.map(|state| Arc::new(state) as Resolved))
            .boxed()
    }
}

/// Values resolved by a gate, keyed by precondition name.
#[derive(Clone, Default)]
pub struct ResolvedState {
    values: BTreeMap<String, Resolved>,
}

impl ResolvedState {
    /// Typed access to a resolved value.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ResolvedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Named async preconditions that must all succeed before a view is built.
#[derive(Clone, Default)]
pub struct ResolveGate {
    preconditions: Vec<(String, Arc<dyn Precondition>)>,
}

impl ResolveGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate that only waits for the session.
    pub fn session(loader: Arc<dyn SessionLoader>) -> Self {
        Self::new().with(SESSION_STATE, Arc::new(LoadSession::new(loader)))
    }

    pub fn with(mut self, name: impl Into<String>, precondition: Arc<dyn Precondition>) -> Self {
        self.preconditions.push((name.into(), precondition));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.preconditions.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Run every precondition concurrently, each bounded by `timeout`.
    ///
    /// Fails with the first precondition that fails or times out.
    pub async fn run(&self, timeout: Duration) -> Result<ResolvedState, GateError> {
        let pending = self.preconditions.iter().map(|(name, precondition)| {
            let name = name.clone();
            let fut = precondition.resolve();
            async move {
                match tokio::time::timeout(timeout, fut).await {
                    Ok(Ok(value)) => Ok((name, value)),
                    Ok(Err(e)) => Err(GateError::Failed {
                        precondition: name,
                        message: format!("{:#}", e),
                    }),
                    Err(_) => Err(GateError::TimedOut {
                        precondition: name,
                        after: timeout,
                    }),
                }
            }
        });

        let values = try_join_all(pending).await?;
        debug!("Resolve gate passed ({} precondition(s))", values.len());
        Ok(ResolvedState {
            values: values.into_iter().collect(),
        })
    }
}

impl std::fmt::Debug for ResolveGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// What a route leads to.
#[derive(Debug, Clone)]
pub struct RouteDef {
    pub controller: String,
    pub gate: ResolveGate,
    /// Rebuild the view when only the query string changes
    pub reload_on_search: bool,
}

impl RouteDef {
    pub fn new(controller: impl Into<String>, gate: ResolveGate) -> Self {
        Self {
            controller: controller.into(),
            gate,
            reload_on_search: true,
        }
    }

    pub fn reload_on_search(mut self, reload: bool) -> Self {
        self.reload_on_search = reload;
        self
    }
}

/// One row of the route table; `pattern` is `None` for the catch-all.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub pattern: Option<RoutePattern>,
    pub def: RouteDef,
}

impl RouteEntry {
    pub fn is_catch_all(&self) -> bool {
        self.pattern.is_none()
    }
}

/// Result of matching a location against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub index: usize,
    pub params: BTreeMap<String, String>,
    pub location: Location,
}

/// Ordered route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::default()
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&RouteEntry> {
        self.entries.get(index)
    }

    /// First entry matching the location's path.
    pub fn match_location(&self, location: &Location) -> Option<RouteMatch> {
        self.entries
            .iter()
            .enumerate()
            .find_map(|(index, entry)| {
                let params = match &entry.pattern {
                    Some(pattern) => pattern.matches(&location.path)?,
                    None => BTreeMap::new(),
                };
                Some(RouteMatch {
                    index,
                    params,
                    location: location.clone(),
                })
            })
    }
}

/// Builder enforcing "catch-all last".
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    entries: Vec<RouteEntry>,
}

impl RouteTableBuilder {
    pub fn when(mut self, path: &str, def: RouteDef) -> BootResult<Self> {
        let pattern = RoutePattern::compile(path).map_err(|e| {
            BootError::Initialization(format!("Invalid route pattern '{}': {}", path, e))
        })?;
        self.entries.push(RouteEntry {
            pattern: Some(pattern),
            def,
        });
        Ok(self)
    }

    /// Add the catch-all and finish the table.
    pub fn otherwise(mut self, def: RouteDef) -> RouteTable {
        self.entries.push(RouteEntry { pattern: None, def });
        RouteTable {
            entries: self.entries,
        }
    }

    /// Finish without a catch-all.
    pub fn build(self) -> RouteTable {
        RouteTable {
            entries: self.entries,
        }
    }
}

/// How app locations are encoded in the window URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationMode {
    /// History API paths: `/stream?q=...`
    Html5,
    /// Fragment paths: `#!/stream?q=...`
    Hashbang,
}

impl LocationMode {
    /// App-relative location for a full window URL.
    pub fn app_location(&self, url: &Url) -> String {
        match self {
            LocationMode::Html5 => match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            },
            LocationMode::Hashbang => {
                let fragment = url.fragment().unwrap_or("");
                let path = fragment.strip_prefix('!').unwrap_or(fragment);
                if path.is_empty() {
                    "/".to_string()
                } else {
                    path.to_string()
                }
            }
        }
    }
}

/// The sidebar's routes. Every view waits for the session.
pub fn sidebar_routes(session: Arc<dyn SessionLoader>) -> BootResult<RouteTable> {
    let gate = ResolveGate::session(session);
    let route = |controller: &str| RouteDef::new(controller, gate.clone()).reload_on_search(false);

    Ok(RouteTable::builder()
        .when("/a/:id", route("AnnotationViewerController"))?
        .when("/stream", route("StreamController"))?
        .otherwise(route("WidgetController")))
}
