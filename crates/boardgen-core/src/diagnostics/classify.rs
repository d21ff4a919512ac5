//! Family inference and handling classification.
//!
//! Both are total functions over (category, message); rules apply in order
//! and the first match wins. String dispatch on diagnostic content lives
//! here and nowhere else.

use super::model::{Diagnostic, DiagnosticSource, Family, Handling, RawFinding};
use super::signature::signature_for;

/// Pin names that indicate a functional connection when left unconnected.
const FUNCTIONAL_PIN_NAMES: &[&str] = &[
    "VIN", "VOUT", "VCC", "VDD", "EN", "FB", "GATE", "SW", "CS", "SDA", "SCL", "CLK", "DATA",
    "MOSI", "MISO", "TX", "RX", "RST", "INT",
];

/// Reference prefixes of parts that are active (ICs, transistors, regulators).
const ACTIVE_REFERENCE_PREFIXES: &[&str] = &["MCU", "REG", "IC", "VR", "U", "Q"];

/// Designators that name power symbols rather than real parts.
const POWER_DESIGNATORS: &[&str] = &[
    "GND", "VCC", "VDD", "VSS", "3V3", "V3V3", "5V", "+3V3", "+5V",
];

/// Category substrings that force must-repair handling.
const MUST_REPAIR_CATEGORY_MARKERS: &[&str] = &[
    "compile",
    "autorouter_exhaustion",
    "out_of_bounds",
    "missing_code_block",
    "short",
    "collision",
    "trace_error",
    "via_clearance_error",
    "kicad_schema_missing",
    "kicad_schema_analysis_error",
];

/// Infer the coarse family from a raw (category, message) pair.
pub fn infer_family(category: &str, message: &str) -> Family {
    let cat = category.to_ascii_lowercase();
    let text = format!("{} {}", cat, message.to_ascii_lowercase());
    // tolerate "off-grid" / "off_grid" spellings
    let text_spaced: String = text
        .chars()
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();

    if text.contains("unconnected pin") {
        Family::KicadUnconnectedPin
    } else if text.contains("floating label") {
        Family::FloatingLabel
    } else if text_spaced.contains("off grid") {
        Family::OffGrid
    } else if text.contains("bom") {
        Family::KicadBomProperty
    } else if text.contains("pin conflict") {
        if text.contains("unspecified connected to unspecified") {
            Family::PinConflictLowSignal
        } else {
            Family::PinConflictWarning
        }
    } else if text.contains("duplicate reference") {
        Family::DuplicateReference
    } else if cat == "pcb_autorouting_error" {
        Family::PcbAutorouterExhaustion
    } else {
        Family::from_category(&cat)
    }
}

/// Whether an unconnected pin looks functional (must be repaired) rather
/// than a generic numeric pin (safe to auto-fix).
pub fn references_functional_pin(message: &str) -> bool {
    let upper = message.to_ascii_uppercase();
    let tokens: Vec<&str> = upper
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '+' || c == '_'))
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.iter().any(|t| FUNCTIONAL_PIN_NAMES.contains(t)) {
        return true;
    }

    // e.g. "pin 3 of U2 is unconnected" - the surrounding part is active
    tokens.iter().any(|t| {
        ACTIVE_REFERENCE_PREFIXES.iter().any(|p| {
            t.strip_prefix(p)
                .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        })
    })
}

/// Extract the designator a finding is about, when one is present.
pub fn parse_designator(message: &str) -> Option<String> {
    let upper = message.to_ascii_uppercase();
    for token in upper.split(|c: char| !(c.is_ascii_alphanumeric() || c == '+')) {
        if token.is_empty() {
            continue;
        }
        if POWER_DESIGNATORS.contains(&token) {
            return Some(token.to_string());
        }
        let split = token
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(token.len());
        let (head, tail) = token.split_at(split);
        if !head.is_empty()
            && head.len() <= 3
            && !tail.is_empty()
            && tail.chars().all(|c| c.is_ascii_digit())
        {
            return Some(token.to_string());
        }
    }
    None
}

/// Whether the designator names a power symbol (GND, VCC, rails).
pub fn is_power_designator(designator: &str) -> bool {
    POWER_DESIGNATORS.contains(&designator.to_ascii_uppercase().as_str())
}

/// Classify handling for an inferred family, possibly clamping severity.
pub fn classify_handling(family: &Family, category: &str, message: &str, severity: u8) -> (Handling, u8) {
    let msg = message.to_ascii_lowercase();
    match family {
        Family::PinConflictLowSignal | Family::KicadBomProperty => {
            (Handling::ShouldDemote, severity.min(5))
        }
        Family::PinConflictWarning => (Handling::MustRepair, severity),
        Family::OffGrid => {
            if msg.contains("connect") || msg.contains("junction") {
                (Handling::MustRepair, severity)
            } else {
                (Handling::AutoFixable, severity)
            }
        }
        Family::FloatingLabel => {
            if msg.contains("missing net") || msg.contains("ambiguous") {
                (Handling::MustRepair, severity)
            } else {
                (Handling::AutoFixable, severity)
            }
        }
        Family::KicadUnconnectedPin => {
            if references_functional_pin(message) {
                (Handling::MustRepair, severity)
            } else {
                (Handling::AutoFixable, severity)
            }
        }
        Family::DuplicateReference => {
            let power = parse_designator(message)
                .map(|d| is_power_designator(&d))
                .unwrap_or(false);
            if power {
                (Handling::ShouldDemote, severity)
            } else {
                (Handling::MustRepair, severity)
            }
        }
        _ => {
            let cat = category.to_ascii_lowercase();
            let fam = family.as_str();
            if MUST_REPAIR_CATEGORY_MARKERS
                .iter()
                .any(|m| cat.contains(m) || fam.contains(m))
            {
                (Handling::MustRepair, severity)
            } else if severity >= 8 {
                (Handling::MustRepair, severity)
            } else {
                (Handling::ShouldDemote, severity)
            }
        }
    }
}

/// Annotate a raw finding into a full [`Diagnostic`].
pub fn annotate(raw: RawFinding) -> Diagnostic {
    let severity = raw.severity.clamp(1, 10);
    let family = infer_family(&raw.category, &raw.message);
    let (handling, severity) = classify_handling(&family, &raw.category, &raw.message, severity);
    let signature = signature_for(&family, &raw.message);
    Diagnostic {
        category: raw.category,
        message: raw.message,
        severity,
        signature,
        source: raw.source,
        family,
        handling,
    }
}

/// Annotate a batch of raw findings.
pub fn annotate_all(raw: Vec<RawFinding>) -> Vec<Diagnostic> {
    raw.into_iter().map(annotate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(category: &str, message: &str, severity: u8) -> RawFinding {
        RawFinding::new(category, message, severity, DiagnosticSource::Kicad)
    }

    #[test]
    fn test_infer_family_rule_order() {
        assert_eq!(
            infer_family("ERC", "unconnected pin 3 of U1"),
            Family::KicadUnconnectedPin
        );
        assert_eq!(
            infer_family("ERC", "floating label NET_A"),
            Family::FloatingLabel
        );
        assert_eq!(infer_family("ERC", "symbol is off-grid"), Family::OffGrid);
        assert_eq!(infer_family("ERC", "item off_grid by 0.1mm"), Family::OffGrid);
        assert_eq!(
            infer_family("DRC", "missing BOM property"),
            Family::KicadBomProperty
        );
        assert_eq!(
            infer_family(
                "ERC",
                "pin conflict: unspecified connected to unspecified"
            ),
            Family::PinConflictLowSignal
        );
        assert_eq!(
            infer_family("ERC", "pin conflict: output connected to output"),
            Family::PinConflictWarning
        );
        assert_eq!(
            infer_family("ERC", "duplicate reference GND"),
            Family::DuplicateReference
        );
        assert_eq!(
            infer_family("pcb_autorouting_error", "router gave up"),
            Family::PcbAutorouterExhaustion
        );
    }

    #[test]
    fn test_infer_family_passthrough_and_empty() {
        assert_eq!(
            infer_family("PCB_TRACE_ERROR", "overlap"),
            Family::PcbTraceError
        );
        assert_eq!(infer_family("", "something odd"), Family::Validation);
        assert_eq!(
            infer_family("Custom_Check", "something odd"),
            Family::Other("custom_check".into())
        );
    }

    #[test]
    fn test_functional_pin_detection() {
        assert!(references_functional_pin("unconnected pin VIN of U1"));
        assert!(references_functional_pin("unconnected pin SDA"));
        assert!(references_functional_pin("pin 4 of MCU1 unconnected"));
        assert!(references_functional_pin("pin 2 of Q3 unconnected"));
        assert!(!references_functional_pin("unconnected pin 3 of R5"));
        assert!(!references_functional_pin("unconnected pin 1 of C2"));
    }

    #[test]
    fn test_handling_demotions_clamp_severity() {
        let d = annotate(raw(
            "ERC",
            "pin conflict: unspecified connected to unspecified",
            9,
        ));
        assert_eq!(d.handling, Handling::ShouldDemote);
        assert_eq!(d.severity, 5);

        let d = annotate(raw("kicad_bom_property", "missing bom field", 6));
        assert_eq!(d.handling, Handling::ShouldDemote);
        assert_eq!(d.severity, 5);
    }

    #[test]
    fn test_off_grid_and_floating_label_escalations() {
        let d = annotate(raw("ERC", "pin off grid", 6));
        assert_eq!(d.handling, Handling::AutoFixable);

        let d = annotate(raw("ERC", "off grid junction cannot connect", 6));
        assert_eq!(d.handling, Handling::MustRepair);

        let d = annotate(raw("ERC", "floating label VOUT_SENSE", 5));
        assert_eq!(d.handling, Handling::AutoFixable);

        let d = annotate(raw("ERC", "floating label with missing net", 5));
        assert_eq!(d.handling, Handling::MustRepair);
    }

    #[test]
    fn test_duplicate_reference_power_demotes() {
        let d = annotate(raw("ERC", "duplicate reference GND", 7));
        assert_eq!(d.handling, Handling::ShouldDemote);

        let d = annotate(raw("ERC", "duplicate reference +3V3", 7));
        assert_eq!(d.handling, Handling::ShouldDemote);

        let d = annotate(raw("ERC", "duplicate reference R7", 7));
        assert_eq!(d.handling, Handling::MustRepair);
    }

    #[test]
    fn test_category_markers_force_must_repair() {
        for category in [
            "compile_error",
            "pcb_autorouting_error",
            "pcb_component_out_of_bounds_error",
            "missing_code_block",
            "pcb_short",
            "pcb_trace_error",
            "kicad_schema_missing",
        ] {
            let d = annotate(raw(category, "boom", 3));
            assert_eq!(d.handling, Handling::MustRepair, "category {}", category);
        }
    }

    #[test]
    fn test_severity_fallback_split() {
        let d = annotate(raw("styling", "ugly silkscreen", 8));
        assert_eq!(d.handling, Handling::MustRepair);

        let d = annotate(raw("styling", "ugly silkscreen", 7));
        assert_eq!(d.handling, Handling::ShouldDemote);
    }
}
