//! Surgical-edit grammar.
//!
//! Parses a prompt that reads as a direct schematic edit into a typed
//! operation. Rules apply in precedence order; the first match wins.
//! Prompts that do not look like direct edits parse to `None` and take
//! the normal generation path.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Component kind inferred from nearby keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Capacitor,
    Resistor,
    Inductor,
    Diode,
    Transistor,
    Mosfet,
}

impl ComponentKind {
    /// Default value used when the prompt does not name one.
    pub fn default_value(&self) -> &'static str {
        match self {
            ComponentKind::Capacitor => "100nF",
            ComponentKind::Resistor => "10k",
            ComponentKind::Inductor => "10uH",
            ComponentKind::Diode => "1N4148",
            ComponentKind::Transistor => "2N3904",
            ComponentKind::Mosfet => "AO3400",
        }
    }
}

/// Offset applied when placing a component near a reference.
pub const NEAR_OFFSET: (f64, f64) = (5.0, 5.0);

/// A parsed surgical edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOp {
    SetComponentValue {
        reference: String,
        value: String,
    },
    AddComponentNear {
        reference: String,
        kind: ComponentKind,
        value: String,
        offset: (f64, f64),
    },
    AddWireByReferences {
        from_reference: String,
        to_reference: String,
    },
    AddWireByCoordinates {
        from: (f64, f64),
        to: (f64, f64),
    },
    RemoveComponent {
        reference: String,
    },
}

const REFERENCE: &str = r"[A-Z]{1,3}\d+[A-Z]?";

fn change_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?:change|set|modify|update|adjust)\b.*?\b({REFERENCE})\b.*?(?:\bto\b|=)\s*([\w.µμΩ/+-]+)"
        ))
        .expect("change regex")
    })
}

fn add_near_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?:add|insert|place|put)\b.*?\b(?:near|next\s+to|beside|close\s+to|by)\b.*?\b({REFERENCE})\b"
        ))
        .expect("add-near regex")
    })
}

fn wire_refs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(?:connect|wire)\b.*?\b({REFERENCE})\b\s*(?:to|and|with)\s*\b({REFERENCE})\b"
        ))
        .expect("wire-refs regex")
    })
}

fn wire_coords_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:add|draw|route)\b.*?\bwire\b.*?(?:from\s+)?(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s+(?:to|and)\s+(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)",
        )
        .expect("wire-coords regex")
    })
}

fn remove_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b(?:remove|delete)\b.*?\b({REFERENCE})\b"))
            .expect("remove regex")
    })
}

/// Normalize a component value: canonical unit casing, no trailing noise.
pub fn normalize_value(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches(['.', ',']);
    let lower = trimmed.to_ascii_lowercase();
    for (suffix, canonical) in [
        ("uf", "uF"),
        ("nf", "nF"),
        ("pf", "pF"),
        ("uh", "uH"),
        ("mh", "mH"),
        ("ohm", "Ω"),
    ] {
        if let Some(stem) = lower.strip_suffix(suffix) {
            if stem.chars().all(|c| c.is_ascii_digit() || c == '.') && !stem.is_empty() {
                return format!("{}{}", stem, canonical);
            }
        }
    }
    trimmed.to_string()
}

fn infer_kind(prompt: &str) -> ComponentKind {
    let lower = prompt.to_ascii_lowercase();
    if lower.contains("mosfet") || lower.contains("fet") {
        ComponentKind::Mosfet
    } else if lower.contains("transistor") {
        ComponentKind::Transistor
    } else if lower.contains("diode") {
        ComponentKind::Diode
    } else if lower.contains("inductor") {
        ComponentKind::Inductor
    } else if lower.contains("resistor") {
        ComponentKind::Resistor
    } else {
        ComponentKind::Capacitor
    }
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"\b{REFERENCE}\b")).expect("reference regex"))
}

/// Whether the prompt reads as a direct edit at all.
fn has_edit_intent(prompt: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let verb = RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(change|set|modify|update|adjust|add|insert|place|put|connect|wire|draw|route|remove|delete)\b",
        )
        .expect("edit intent regex")
    });
    verb.is_match(prompt)
        && (reference_re().is_match(prompt) || prompt.to_ascii_lowercase().contains("wire"))
}

/// Parse a prompt into a surgical edit, if it is one.
pub fn parse_edit(prompt: &str) -> Option<EditOp> {
    if !has_edit_intent(prompt) {
        return None;
    }

    if let Some(caps) = change_re().captures(prompt) {
        return Some(EditOp::SetComponentValue {
            reference: caps[1].to_string(),
            value: normalize_value(&caps[2]),
        });
    }
    if let Some(caps) = add_near_re().captures(prompt) {
        let kind = infer_kind(prompt);
        return Some(EditOp::AddComponentNear {
            reference: caps[1].to_string(),
            kind,
            value: kind.default_value().to_string(),
            offset: NEAR_OFFSET,
        });
    }
    if let Some(caps) = wire_refs_re().captures(prompt) {
        return Some(EditOp::AddWireByReferences {
            from_reference: caps[1].to_string(),
            to_reference: caps[2].to_string(),
        });
    }
    if let Some(caps) = wire_coords_re().captures(prompt) {
        let parse = |s: &str| s.parse::<f64>().ok();
        if let (Some(x1), Some(y1), Some(x2), Some(y2)) = (
            parse(&caps[1]),
            parse(&caps[2]),
            parse(&caps[3]),
            parse(&caps[4]),
        ) {
            return Some(EditOp::AddWireByCoordinates {
                from: (x1, y1),
                to: (x2, y2),
            });
        }
    }
    if let Some(caps) = remove_re().captures(prompt) {
        return Some(EditOp::RemoveComponent {
            reference: caps[1].to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_change() {
        let op = parse_edit("change R5 to 22k").expect("parses");
        assert_eq!(
            op,
            EditOp::SetComponentValue {
                reference: "R5".into(),
                value: "22k".into()
            }
        );

        let op = parse_edit("set C3 = 4.7uf please").expect("parses");
        assert_eq!(
            op,
            EditOp::SetComponentValue {
                reference: "C3".into(),
                value: "4.7uF".into()
            }
        );
    }

    #[test]
    fn test_add_near_with_kind_inference() {
        let op = parse_edit("add a decoupling capacitor near U1").expect("parses");
        assert_eq!(
            op,
            EditOp::AddComponentNear {
                reference: "U1".into(),
                kind: ComponentKind::Capacitor,
                value: "100nF".into(),
                offset: NEAR_OFFSET,
            }
        );

        let op = parse_edit("place a pull-up resistor next to MCU1").expect("parses");
        match op {
            EditOp::AddComponentNear { kind, value, .. } => {
                assert_eq!(kind, ComponentKind::Resistor);
                assert_eq!(value, "10k");
            }
            other => panic!("expected add-near, got {:?}", other),
        }
    }

    #[test]
    fn test_wire_by_references_and_coordinates() {
        let op = parse_edit("connect R1 to C2").expect("parses");
        assert_eq!(
            op,
            EditOp::AddWireByReferences {
                from_reference: "R1".into(),
                to_reference: "C2".into()
            }
        );

        let op = parse_edit("draw wire from 10,20 to 30.5,40").expect("parses");
        assert_eq!(
            op,
            EditOp::AddWireByCoordinates {
                from: (10.0, 20.0),
                to: (30.5, 40.0)
            }
        );
    }

    #[test]
    fn test_remove() {
        let op = parse_edit("remove D4 from the board").expect("parses");
        assert_eq!(op, EditOp::RemoveComponent { reference: "D4".into() });
    }

    #[test]
    fn test_precedence_change_wins_over_remove() {
        // both verbs present: the value-change rule is tried first
        let op = parse_edit("update R2 to 1k and remove R3").expect("parses");
        assert!(matches!(op, EditOp::SetComponentValue { .. }));
    }

    #[test]
    fn test_non_edit_prompts_pass_through() {
        assert_eq!(parse_edit("design a compact regulator board"), None);
        assert_eq!(parse_edit("what does R1 do?"), None);
        assert_eq!(parse_edit("make it better"), None);
    }

    #[test]
    fn test_reference_shape() {
        assert!(parse_edit("remove MCU12A").is_some());
        assert!(parse_edit("remove resistor").is_none());
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value("4.7UF"), "4.7uF");
        assert_eq!(normalize_value("100NF"), "100nF");
        assert_eq!(normalize_value("10k"), "10k");
        assert_eq!(normalize_value("22ohm"), "22Ω");
        assert_eq!(normalize_value("1N4148"), "1N4148");
    }
}
