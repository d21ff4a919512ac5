//! Congestion relief transforms.
//!
//! Two escalation levels over the same mechanics: a parameterized minor
//! relief (bounded growth + bounded outward shift, applied as a staged
//! ramp) and the fixed structural layout spread.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::{fmt_mm, TransformOutcome};
use crate::source_model::{parse_mm, SourceModel};

fn element_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([a-zA-Z][\w]*)\b([^<>]*?)(/?)>").expect("element regex"))
}

fn dim_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(width|height|pcbX|pcbY)\s*=\s*(?:"([^"]*)"|\{([^{}]*)\})"#)
            .expect("dim attr regex")
    })
}

/// Parameters for one targeted congestion-relief pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReliefParams {
    pub board_scale: f64,
    pub max_board_growth_pct: f64,
    pub component_shift_mm: f64,
    pub component_shift_cap_mm: f64,
}

impl ReliefParams {
    /// Pass `k` of `n` in the staged ramp toward the configured ceilings.
    pub fn ramped(growth_cap_pct: u32, shift_mm: u32, pass: u32, total_passes: u32) -> Self {
        let ratio = pass as f64 / total_passes.max(1) as f64;
        Self {
            board_scale: 1.0 + (growth_cap_pct as f64 / 100.0) * ratio,
            max_board_growth_pct: growth_cap_pct as f64,
            component_shift_mm: shift_mm as f64 * ratio,
            component_shift_cap_mm: shift_mm as f64,
        }
    }
}

/// Grow the board and nudge components outward, both capped.
pub fn relieve_congestion(code: &str, params: &ReliefParams) -> TransformOutcome {
    let model = SourceModel::parse(code);
    if model.board.is_none() {
        return TransformOutcome::unchanged(code);
    }

    let growth_ceiling = 1.0 + params.max_board_growth_pct / 100.0;
    let scale = params.board_scale.min(growth_ceiling);
    let shift = params.component_shift_mm.min(params.component_shift_cap_mm);

    let mut adjusted = 0usize;
    let code = rewrite_dimensions(code, |tag, attr, value| match (tag, attr) {
        ("board", "width") | ("board", "height") => Some(round2(value * scale)),
        (_, "pcbX") | (_, "pcbY") => {
            // f64::signum treats +0.0 as positive; centred parts must not move
            let sign = if value > f64::EPSILON {
                1.0
            } else if value < -f64::EPSILON {
                -1.0
            } else {
                0.0
            };
            let moved = value + sign * shift;
            if (moved - value).abs() > f64::EPSILON {
                adjusted += 1;
            }
            Some(round2(moved))
        }
        _ => None,
    });
    // pcbX and pcbY count separately above; components move as one
    let components_adjusted = adjusted.div_ceil(2);

    TransformOutcome {
        code,
        actions: vec![
            format!("congestion_relief:board_scale_{:.2}", scale),
            format!("congestion_relief:max_move_mm_{}", fmt_mm(shift)),
            format!("congestion_relief:components_adjusted_{}", components_adjusted),
        ],
        diagnostics: Vec::new(),
    }
}

/// Board multiplier for the structural layout spread.
const SPREAD_SCALE: f64 = 1.2;

/// The non-parameterized structural spread: board dimensions times 1.2
/// (rounded to whole units) and component coordinates times 1.2.
pub fn spread_layout(code: &str) -> TransformOutcome {
    let model = SourceModel::parse(code);
    if model.board.is_none() {
        return TransformOutcome::unchanged(code);
    }

    let mut adjusted = 0usize;
    let code = rewrite_dimensions(code, |tag, attr, value| match (tag, attr) {
        ("board", "width") | ("board", "height") => Some((value * SPREAD_SCALE).round()),
        (_, "pcbX") | (_, "pcbY") => {
            if value.abs() > f64::EPSILON {
                adjusted += 1;
            }
            Some(round2(value * SPREAD_SCALE))
        }
        _ => None,
    });
    let components_adjusted = adjusted.div_ceil(2);

    TransformOutcome {
        code,
        actions: vec![
            format!("layout_spread:board_scale_{}", SPREAD_SCALE),
            format!("layout_spread:components_adjusted_{}", components_adjusted),
        ],
        diagnostics: Vec::new(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Apply a numeric rewrite to board/component dimension attributes,
/// preserving each attribute's quoting style and unit suffix.
fn rewrite_dimensions<F>(code: &str, mut f: F) -> String
where
    F: FnMut(&str, &str, f64) -> Option<f64>,
{
    element_re()
        .replace_all(code, |element: &Captures<'_>| {
            let tag = element[1].to_string();
            let attrs = element[2].to_string();
            let close = element[3].to_string();

            let rewritten = dim_attr_re()
                .replace_all(&attrs, |attr: &Captures<'_>| {
                    let name = &attr[1];
                    let quoted = attr.get(2).is_some();
                    let raw = attr
                        .get(2)
                        .or_else(|| attr.get(3))
                        .map(|m| m.as_str())
                        .unwrap_or("");
                    let Some(value) = parse_mm(raw) else {
                        return attr[0].to_string();
                    };
                    let Some(new_value) = f(&tag, name, value) else {
                        return attr[0].to_string();
                    };
                    let suffix = if raw.trim().ends_with("mm") { "mm" } else { "" };
                    if quoted {
                        format!(r#"{}="{}{}""#, name, fmt_mm(new_value), suffix)
                    } else {
                        format!("{}={{{}{}}}", name, fmt_mm(new_value), suffix)
                    }
                })
                .into_owned();

            format!("<{}{}{}>", tag, rewritten, close)
        })
        .into_owned()
}
