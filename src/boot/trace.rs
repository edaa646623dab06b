//! Ordered record of what the bootstrap did.
//!
//! The sequencer appends one event per step. Collaborators may append their
//! own events to the same trace, which is how ordering guarantees are
//! observed from the outside.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// A single bootstrap step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootStep {
    DocumentSettingsRead,
    ErrorTrackingInitialized,
    HostConfigMerged,
    CompatFlagSet,
    EngineReferenced,
    AnalyticsInitialized,
    AuthSelected(&'static str),
    RegistryBuilt,
    RoutesConfigured,
    HttpConfigured,
    RunHooksApplied,
    LiveReloadConnected,
    Attached,
    /// Event recorded by a collaborator.
    Collaborator(String),
}

impl fmt::Display for BootStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootStep::DocumentSettingsRead => write!(f, "document settings read"),
            BootStep::ErrorTrackingInitialized => write!(f, "error tracking initialized"),
            BootStep::HostConfigMerged => write!(f, "host config merged"),
            BootStep::CompatFlagSet => write!(f, "compatibility flag set"),
            BootStep::EngineReferenced => write!(f, "rendering engine referenced"),
            BootStep::AnalyticsInitialized => write!(f, "analytics initialized"),
            BootStep::AuthSelected(kind) => write!(f, "auth strategy selected: {}", kind),
            BootStep::RegistryBuilt => write!(f, "registry built"),
            BootStep::RoutesConfigured => write!(f, "routes configured"),
            BootStep::HttpConfigured => write!(f, "http defaults configured"),
            BootStep::RunHooksApplied => write!(f, "run hooks applied"),
            BootStep::LiveReloadConnected => write!(f, "live reload connected"),
            BootStep::Attached => write!(f, "application attached"),
            BootStep::Collaborator(name) => write!(f, "collaborator: {}", name),
        }
    }
}

/// One recorded step with its position and wall-clock time.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub seq: u64,
    pub step: BootStep,
    pub at: DateTime<Utc>,
}

/// Shared, append-only trace.
#[derive(Debug, Clone, Default)]
pub struct BootTrace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl BootTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, step: BootStep) {
        if let Ok(mut events) = self.events.lock() {
            let seq = events.len() as u64;
            events.push(TraceEvent {
                seq,
                step,
                at: Utc::now(),
            });
        }
    }

    /// Record a collaborator event by name.
    pub fn note(&self, name: impl Into<String>) {
        self.record(BootStep::Collaborator(name.into()));
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn steps(&self) -> Vec<BootStep> {
        self.events().into_iter().map(|e| e.step).collect()
    }

    /// Sequence number of the first occurrence of `step`.
    pub fn position(&self, step: &BootStep) -> Option<u64> {
        self.events()
            .into_iter()
            .find(|e| &e.step == step)
            .map(|e| e.seq)
    }

    pub fn contains(&self, step: &BootStep) -> bool {
        self.position(step).is_some()
    }

    /// Whether `first` was recorded, and recorded before `second` if
    /// `second` was recorded at all.
    pub fn precedes(&self, first: &BootStep, second: &BootStep) -> bool {
        match (self.position(first), self.position(second)) {
            (Some(a), Some(b)) => a < b,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_ordering() {
        let trace = BootTrace::new();
        trace.record(BootStep::CompatFlagSet);
        trace.note("engine loaded");
        trace.record(BootStep::EngineReferenced);

        assert_eq!(trace.position(&BootStep::CompatFlagSet), Some(0));
        assert!(trace.precedes(&BootStep::CompatFlagSet, &BootStep::EngineReferenced));
        assert!(!trace.precedes(&BootStep::EngineReferenced, &BootStep::CompatFlagSet));
        assert!(trace.contains(&BootStep::Collaborator("engine loaded".to_string())));
        assert!(!trace.contains(&BootStep::Attached));
    }

    #[test]
    fn test_clones_share_events() {
        let trace = BootTrace::new();
        let clone = trace.clone();
        clone.record(BootStep::RegistryBuilt);
        assert_eq!(trace.steps(), vec![BootStep::RegistryBuilt]);
    }
}
