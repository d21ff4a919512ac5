//! Diagnostic taxonomy: normalization, classification, dedup, priority.

pub mod classify;
pub mod dedup;
pub mod model;
pub mod signature;

pub use classify::{annotate, annotate_all, infer_family};
pub use dedup::{dedup, Prioritized};
pub use model::{attempt_score, Diagnostic, DiagnosticSource, Family, Handling, RawFinding};
pub use signature::{normalize_volatile, set_signature, signature_for};
