//! Process-wide run registry with supersession.
//!
//! At most one active run per session. Registering a new run signals the
//! prior one with reason "superseded" before taking its slot, so the
//! older orchestrator exits at its next suspension point.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::cancel::CancelToken;

/// Reason recorded on a superseded run's cancel token.
pub const SUPERSEDED: &str = "superseded";

#[derive(Debug, Clone)]
struct ActiveRun {
    run_id: String,
    cancel: CancelToken,
}

/// session_id -> active run map.
#[derive(Debug, Default)]
pub struct RunRegistry {
    inner: Mutex<HashMap<String, ActiveRun>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run, cancelling and evicting any prior run for the
    /// same session first.
    pub fn register(&self, session_id: &str, run_id: &str, cancel: CancelToken) {
        let previous = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.insert(
                session_id.to_string(),
                ActiveRun {
                    run_id: run_id.to_string(),
                    cancel,
                },
            )
        };
        if let Some(previous) = previous {
            tracing::info!(
                session_id,
                superseded_run = %previous.run_id,
                "superseding in-flight run"
            );
            previous.cancel.cancel(SUPERSEDED);
        }
    }

    /// Remove the entry only if this run still owns it.
    pub fn unregister_if_current(&self, session_id: &str, run_id: &str) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if map.get(session_id).is_some_and(|run| run.run_id == run_id) {
            map.remove(session_id);
        }
    }

    /// The run currently registered for a session.
    pub fn current_run(&self, session_id: &str) -> Option<String> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(session_id).map(|run| run.run_id.clone())
    }
}
