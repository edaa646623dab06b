//! Navigation controller.
//!
//! Each call to [`Navigator::navigate`] is one navigation:
//!
//! ```text
//! Pending ──► Resolving ──► Ready      (gate passed, view built)
//!                  └──────► Aborted    (gate failed, timed out, or superseded)
//! ```
//!
//! A view is only ever built after its gate has passed, and only if no
//! newer navigation started in the meantime. A superseded navigation's
//! in-flight work is not cancelled; its result is discarded.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Location, ResolvedState, RouteMatch, RouteTable};
use crate::error::GateError;

/// Gate progress of one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Resolving,
    Ready,
    Aborted,
}

/// Latest navigation as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationStatus {
    pub id: u64,
    pub location: String,
    pub state: GateState,
    pub failure: Option<GateError>,
}

/// A constructed view.
#[derive(Debug, Clone)]
pub struct View {
    pub navigation: u64,
    pub controller: String,
    pub route: RouteMatch,
    pub resolved: ResolvedState,
    pub created_at: DateTime<Utc>,
}

/// Builds views once their gate has passed.
pub trait ViewFactory: Send + Sync {
    fn instantiate(&self, view: &View);
}

/// Why a navigation did not produce a view.
#[derive(Debug, Clone, PartialEq)]
pub enum AbortReason {
    /// The gate failed; the user should be told
    GateFailed(GateError),
    /// A newer navigation started before this one resolved
    Superseded,
    /// No route matched and the table has no catch-all
    NoRoute,
}

/// Result of one navigation.
#[derive(Debug, Clone)]
pub enum NavigationOutcome {
    /// A new view was built
    Ready(View),
    /// Only the query changed and the route keeps its view
    Retained(View),
    Aborted(AbortReason),
}

impl NavigationOutcome {
    pub fn view(&self) -> Option<&View> {
        match self {
            NavigationOutcome::Ready(view) | NavigationOutcome::Retained(view) => Some(view),
            NavigationOutcome::Aborted(_) => None,
        }
    }

    pub fn gate_failure(&self) -> Option<&GateError> {
        match self {
            NavigationOutcome::Aborted(AbortReason::GateFailed(e)) => Some(e),
            _ => None,
        }
    }
}

struct Active {
    latest: u64,
    view: Option<View>,
}

/// Drives navigations against a route table.
pub struct Navigator {
    table: Arc<RouteTable>,
    views: Arc<dyn ViewFactory>,
    gate_timeout: Duration,
    active: Mutex<Active>,
    status: watch::Sender<NavigationStatus>,
}

impl Navigator {
    pub fn new(table: Arc<RouteTable>, views: Arc<dyn ViewFactory>, gate_timeout: Duration) -> Self {
        let (status, _) = watch::channel(NavigationStatus {
            id: 0,
            location: String::new(),
            state: GateState::Pending,
            failure: None,
        });
        Self {
            table,
            views,
            gate_timeout,
            active: Mutex::new(Active {
                latest: 0,
                view: None,
            }),
            status,
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Observe the latest navigation's progress.
    pub fn subscribe(&self) -> watch::Receiver<NavigationStatus> {
        self.status.subscribe()
    }

    /// The view currently shown, if any.
    pub fn current_view(&self) -> Option<View> {
        self.active.lock().ok().and_then(|a| a.view.clone())
    }

    /// Navigate to an app-relative location.
    pub async fn navigate(&self, location: &str) -> NavigationOutcome {
        let (id, retained) = {
            let Ok(mut active) = self.active.lock() else {
                return NavigationOutcome::Aborted(AbortReason::NoRoute);
            };
            active.latest += 1;
            (active.latest, active.view.clone())
        };
        self.publish(id, location, GateState::Pending, None);

        let parsed = match Location::parse(location) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Cannot navigate to '{}': {}", location, e);
                self.publish(id, location, GateState::Aborted, None);
                return NavigationOutcome::Aborted(AbortReason::NoRoute);
            }
        };

        let Some(route) = self.table.match_location(&parsed) else {
            warn!("No route matches '{}'", parsed.path);
            self.publish(id, location, GateState::Aborted, None);
            return NavigationOutcome::Aborted(AbortReason::NoRoute);
        };
        let Some(entry) = self.table.entry(route.index) else {
            self.publish(id, location, GateState::Aborted, None);
            return NavigationOutcome::Aborted(AbortReason::NoRoute);
        };

        if let Some(view) = retained.filter(|v| is_search_only_change(v, &route)) {
            if !entry.def.reload_on_search {
                debug!("Query-only change on {}, keeping view", parsed.path);
                let view = View { route, ..view };
                if let Ok(mut active) = self.active.lock() {
                    if active.latest == id {
                        active.view = Some(view.clone());
                    }
                }
                self.publish(id, location, GateState::Ready, None);
                return NavigationOutcome::Retained(view);
            }
        }

        self.publish(id, location, GateState::Resolving, None);
        debug!(
            "Navigation {} to {} waiting on {:?}",
            id, parsed.path, entry.def.gate
        );

        let result = entry.def.gate.run(self.gate_timeout).await;

        // Checked and committed under the lock so a newer navigation cannot
        // slip in between the check and the view construction.
        let Ok(mut active) = self.active.lock() else {
            return NavigationOutcome::Aborted(AbortReason::Superseded);
        };
        if active.latest != id {
            debug!("Navigation {} superseded, discarding gate result", id);
            return NavigationOutcome::Aborted(AbortReason::Superseded);
        }

        match result {
            Ok(resolved) => {
                let view = View {
                    navigation: id,
                    controller: entry.def.controller.clone(),
                    route,
                    resolved,
                    created_at: Utc::now(),
                };
                self.views.instantiate(&view);
                active.view = Some(view.clone());
                drop(active);

                info!("Navigated to {} ({})", parsed.path, view.controller);
                self.publish(id, location, GateState::Ready, None);
                NavigationOutcome::Ready(view)
            }
            Err(e) => {
                drop(active);
                warn!("Navigation to {} blocked: {}", parsed.path, e);
                self.publish(id, location, GateState::Aborted, Some(e.clone()));
                NavigationOutcome::Aborted(AbortReason::GateFailed(e))
            }
        }
    }

    fn publish(&self, id: u64, location: &str, state: GateState, failure: Option<GateError>) {
        let latest = self.active.lock().map(|a| a.latest).unwrap_or(id);
        if latest != id {
            return;
        }
        self.status.send_replace(NavigationStatus {
            id,
            location: location.to_string(),
            state,
            failure,
        });
    }
}

fn is_search_only_change(view: &View, route: &RouteMatch) -> bool {
    view.route.index == route.index
        && view.route.location.path == route.location.path
        && view.route.params == route.params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{sidebar_routes, Precondition, Resolved, ResolveGate, RouteDef, SESSION_STATE};
    use crate::session::{SessionState, StaticSession};
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;

    #[derive(Default)]
    struct RecordingViews {
        built: Mutex<Vec<(String, u64)>>,
    }

    impl ViewFactory for RecordingViews {
        fn instantiate(&self, view: &View) {
            self.built
                .lock()
                .unwrap()
                .push((view.controller.clone(), view.navigation));
        }
    }

    /// Precondition released by a oneshot; fails if the sender is dropped.
    struct Released(Mutex<Option<tokio::sync::oneshot::Receiver<()>>>);

    impl Precondition for Released {
        fn resolve(&self) -> BoxFuture<'static, anyhow::Result<Resolved>> {
            let rx = self.0.lock().unwrap().take();
            async move {
                if let Some(rx) = rx {
                    if rx.await.is_err() {
                        return Err(anyhow::anyhow!("released without value"));
                    }
                }
                Ok(Arc::new(SessionState::default()) as Resolved)
            }
            .boxed()
        }
    }

    fn navigator(views: Arc<RecordingViews>) -> Navigator {
        let table = sidebar_routes(Arc::new(StaticSession::default())).unwrap();
        Navigator::new(Arc::new(table), views, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_navigation_builds_view_after_gate() {
        let views = Arc::new(RecordingViews::default());
        let nav = navigator(views.clone());
        let mut status = nav.subscribe();

        let outcome = nav.navigate("/a/123").await;
        let view = outcome.view().unwrap();
        assert_eq!(view.controller, "AnnotationViewerController");
        assert_eq!(view.route.params["id"], "123");
        assert!(view.resolved.get::<SessionState>(SESSION_STATE).is_some());

        assert_eq!(status.borrow_and_update().state, GateState::Ready);
        assert_eq!(
            *views.built.lock().unwrap(),
            vec![("AnnotationViewerController".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_query_only_change_keeps_view() {
        let views = Arc::new(RecordingViews::default());
        let nav = navigator(views.clone());

        nav.navigate("/stream?q=tag:a").await;
        let outcome = nav.navigate("/stream?q=tag:b").await;

        assert!(matches!(outcome, NavigationOutcome::Retained(_)));
        assert_eq!(views.built.lock().unwrap().len(), 1);
        assert_eq!(
            nav.current_view().unwrap().route.location.query["q"],
            "tag:b"
        );

        // A different path on the same catch-all route is a real navigation.
        nav.navigate("/x").await;
        nav.navigate("/y").await;
        assert_eq!(views.built.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_reload_on_search_rebuilds_view() {
        let views = Arc::new(RecordingViews::default());
        let table = RouteTable::builder()
            .otherwise(RouteDef::new("WidgetController", ResolveGate::new()).reload_on_search(true));
        let nav = Navigator::new(Arc::new(table), views.clone(), Duration::from_secs(1));

        nav.navigate("/?q=a").await;
        let outcome = nav.navigate("/?q=b").await;
        assert!(matches!(outcome, NavigationOutcome::Ready(_)));
        assert_eq!(views.built.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_superseded_navigation_never_builds() {
        let views = Arc::new(RecordingViews::default());
        let (release, rx) = tokio::sync::oneshot::channel();
        let gate = ResolveGate::new().with(SESSION_STATE, Arc::new(Released(Mutex::new(Some(rx)))));
        let table = RouteTable::builder()
            .when("/slow", RouteDef::new("SlowController", gate))
            .unwrap()
            .otherwise(RouteDef::new("WidgetController", ResolveGate::new()));
        let nav = Arc::new(Navigator::new(Arc::new(table), views.clone(), Duration::from_secs(5)));
        let mut status = nav.subscribe();

        let slow = {
            let nav = nav.clone();
            tokio::spawn(async move { nav.navigate("/slow").await })
        };
        status
            .wait_for(|s| s.id == 1 && s.state == GateState::Resolving)
            .await
            .unwrap();

        let fast = nav.navigate("/fast").await;
        assert!(matches!(fast, NavigationOutcome::Ready(_)));

        release.send(()).unwrap();
        let slow = slow.await.unwrap();
        assert!(matches!(slow, NavigationOutcome::Aborted(AbortReason::Superseded)));

        assert_eq!(
            *views.built.lock().unwrap(),
            vec![("WidgetController".to_string(), 2)]
        );
        assert_eq!(nav.current_view().unwrap().controller, "WidgetController");
        assert_eq!(nav.subscribe().borrow().id, 2);
    }

    #[tokio::test]
    async fn test_no_route_without_catch_all() {
        let views = Arc::new(RecordingViews::default());
        let table = RouteTable::builder()
            .when("/stream", RouteDef::new("StreamController", ResolveGate::new()))
            .unwrap()
            .build();
        let nav = Navigator::new(Arc::new(table), views.clone(), Duration::from_secs(1));

        let outcome = nav.navigate("/elsewhere").await;
        assert!(matches!(outcome, NavigationOutcome::Aborted(AbortReason::NoRoute)));
        assert!(views.built.lock().unwrap().is_empty());
    }
}
