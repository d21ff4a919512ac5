//! Normalized validation diagnostics.
//!
//! Raw findings from either checker are annotated into immutable
//! [`Diagnostic`] records carrying the inferred family, the planner
//! handling, and a dedup-stable signature.

use serde::{Deserialize, Serialize};

/// Which checker produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSource {
    Tscircuit,
    Kicad,
}

/// Planner handling decision for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handling {
    AutoFixable,
    ShouldDemote,
    MustRepair,
}

/// Coarse diagnostic class inferred from (category, message).
///
/// The named variants are the classes the repair machinery dispatches on;
/// anything else is carried verbatim as `Other` (the lowercased category).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Family {
    KicadUnconnectedPin,
    FloatingLabel,
    OffGrid,
    KicadBomProperty,
    PinConflictLowSignal,
    PinConflictWarning,
    DuplicateReference,
    PcbAutorouterExhaustion,
    PcbTraceError,
    PcbViaClearanceError,
    PcbComponentOutOfBounds,
    PcbFootprintOverlap,
    SourceTraceMissingEndpoint,
    SourceTraceRebuildInsufficientIntent,
    Validation,
    Other(String),
}

impl Family {
    /// Canonical wire string for this family.
    pub fn as_str(&self) -> &str {
        match self {
            Family::KicadUnconnectedPin => "kicad_unconnected_pin",
            Family::FloatingLabel => "floating_label",
            Family::OffGrid => "off_grid",
            Family::KicadBomProperty => "kicad_bom_property",
            Family::PinConflictLowSignal => "pin_conflict_low_signal",
            Family::PinConflictWarning => "pin_conflict_warning",
            Family::DuplicateReference => "duplicate_reference",
            Family::PcbAutorouterExhaustion => "pcb_autorouter_exhaustion",
            Family::PcbTraceError => "pcb_trace_error",
            Family::PcbViaClearanceError => "pcb_via_clearance_error",
            Family::PcbComponentOutOfBounds => "pcb_component_out_of_bounds_error",
            Family::PcbFootprintOverlap => "pcb_footprint_overlap_error",
            Family::SourceTraceMissingEndpoint => "source_trace_missing_endpoint",
            Family::SourceTraceRebuildInsufficientIntent => {
                "source_trace_rebuild_insufficient_intent"
            }
            Family::Validation => "validation",
            Family::Other(s) => s.as_str(),
        }
    }

    /// Map a lowercased category string to a known variant, else `Other`.
    pub fn from_category(category: &str) -> Self {
        match category {
            "kicad_unconnected_pin" => Family::KicadUnconnectedPin,
            "floating_label" => Family::FloatingLabel,
            "off_grid" => Family::OffGrid,
            "kicad_bom_property" => Family::KicadBomProperty,
            "pin_conflict_low_signal" => Family::PinConflictLowSignal,
            "pin_conflict_warning" => Family::PinConflictWarning,
            "duplicate_reference" => Family::DuplicateReference,
            // pcb_autorouting_error is an alias for the exhaustion family
            "pcb_autorouter_exhaustion" | "pcb_autorouting_error" => {
                Family::PcbAutorouterExhaustion
            }
            "pcb_trace_error" => Family::PcbTraceError,
            "pcb_via_clearance_error" => Family::PcbViaClearanceError,
            "pcb_component_out_of_bounds_error" => Family::PcbComponentOutOfBounds,
            "pcb_footprint_overlap_error" => Family::PcbFootprintOverlap,
            "source_trace_missing_endpoint" => Family::SourceTraceMissingEndpoint,
            "source_trace_rebuild_insufficient_intent" => {
                Family::SourceTraceRebuildInsufficientIntent
            }
            "" => Family::Validation,
            other => Family::Other(other.to_string()),
        }
    }

    /// Families routed to the structural trace rebuild strategy.
    pub fn wants_trace_rebuild(&self) -> bool {
        matches!(
            self,
            Family::SourceTraceMissingEndpoint | Family::SourceTraceRebuildInsufficientIntent
        ) || matches!(self, Family::Other(s) if s.starts_with("source_trace"))
    }

    /// Families routed to the congestion-relief ladder.
    pub fn wants_congestion_relief(&self) -> bool {
        matches!(
            self,
            Family::PcbTraceError
                | Family::PcbViaClearanceError
                | Family::PcbComponentOutOfBounds
                | Family::PcbFootprintOverlap
                | Family::PcbAutorouterExhaustion
        )
    }

    /// Low-signal families whose open review findings are auto-dismissed
    /// at the end of a run.
    pub fn is_low_signal(&self) -> bool {
        matches!(
            self,
            Family::PinConflictLowSignal | Family::KicadBomProperty | Family::OffGrid
        )
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for Family {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Family {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Family::from_category(&s))
    }
}

/// A raw finding as reported by a checker, before annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    pub category: String,
    pub message: String,
    /// 1..=10; values outside the range are clamped during annotation.
    pub severity: u8,
    pub source: DiagnosticSource,
}

impl RawFinding {
    pub fn new(
        category: impl Into<String>,
        message: impl Into<String>,
        severity: u8,
        source: DiagnosticSource,
    ) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
            severity,
            source,
        }
    }
}

/// An annotated, immutable diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: String,
    pub message: String,
    pub severity: u8,
    pub signature: String,
    pub source: DiagnosticSource,
    pub family: Family,
    pub handling: Handling,
}

/// Category substrings that make a must-repair diagnostic blocking.
const BLOCKING_CATEGORY_MARKERS: &[&str] = &[
    "compile",
    "missing_code_block",
    "short",
    "collision",
    "trace_error",
    "via_clearance_error",
    "out_of_bounds",
    "kicad_schema_missing",
    "kicad_schema_analysis_error",
];

impl Diagnostic {
    /// Whether this diagnostic prevents the validation gate from passing.
    pub fn is_blocking(&self) -> bool {
        if self.handling != Handling::MustRepair {
            return false;
        }
        let cat = self.category.to_ascii_lowercase();
        BLOCKING_CATEGORY_MARKERS.iter().any(|m| cat.contains(m))
            || self.severity >= 8
            || (cat.contains("clearance") && self.severity >= 7)
    }
}

/// Ordering key for an attempt's diagnostic set. Never surfaced in contracts.
pub fn attempt_score(diagnostics: &[Diagnostic], compile_failed: bool) -> i64 {
    let base: i64 = diagnostics.iter().map(|d| 100 * d.severity as i64).sum();
    base + if compile_failed { 5000 } else { 0 }
}
