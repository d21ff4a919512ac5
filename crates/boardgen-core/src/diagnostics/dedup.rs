//! Signature-based deduplication and severity-ordered prioritization.

use std::collections::HashMap;

use super::model::Diagnostic;

/// How many blocking diagnostics the focused subset carries.
const FOCUSED_BLOCKING: usize = 14;
/// Advisory slots when nothing is blocking.
const FOCUSED_ADVISORY_ALONE: usize = 10;
/// Advisory slots when blocking diagnostics are present.
const FOCUSED_ADVISORY_WITH_BLOCKING: usize = 4;

/// Collapse diagnostics that share a signature, keeping the
/// highest-severity member of each group. First-seen order is preserved.
pub fn dedup(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut by_signature: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<Diagnostic> = Vec::new();

    for diag in diagnostics {
        match by_signature.get(&diag.signature) {
            Some(&idx) => {
                if diag.severity > kept[idx].severity {
                    kept[idx] = diag;
                }
            }
            None => {
                by_signature.insert(diag.signature.clone(), kept.len());
                kept.push(diag);
            }
        }
    }
    kept
}

/// A deduplicated diagnostic set split into blocking and advisory lists,
/// each sorted by descending severity.
#[derive(Debug, Clone, Default)]
pub struct Prioritized {
    pub blocking: Vec<Diagnostic>,
    pub advisory: Vec<Diagnostic>,
}

impl Prioritized {
    /// Split an already-deduplicated set.
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let (mut blocking, mut advisory): (Vec<_>, Vec<_>) = diagnostics
            .iter()
            .cloned()
            .partition(|d| d.is_blocking());
        blocking.sort_by(|a, b| b.severity.cmp(&a.severity));
        advisory.sort_by(|a, b| b.severity.cmp(&a.severity));
        Self { blocking, advisory }
    }

    /// The focused subset surfaced to the client on each attempt.
    pub fn focused(&self) -> Vec<Diagnostic> {
        let advisory_slots = if self.blocking.is_empty() {
            FOCUSED_ADVISORY_ALONE
        } else {
            FOCUSED_ADVISORY_WITH_BLOCKING
        };
        self.blocking
            .iter()
            .take(FOCUSED_BLOCKING)
            .chain(self.advisory.iter().take(advisory_slots))
            .cloned()
            .collect()
    }
}
