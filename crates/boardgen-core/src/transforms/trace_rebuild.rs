//! Structural trace rebuild.
//!
//! Rebuilds the routing layer from declared net intent: every existing
//! `<trace>` is discarded and each net with two or more bound endpoints is
//! re-emitted as a star rooted at its first endpoint.

use std::sync::OnceLock;

use regex::Regex;

use super::TransformOutcome;
use crate::diagnostics::{DiagnosticSource, RawFinding};
use crate::source_model::SourceModel;

const INSUFFICIENT_INTENT: &str = "source_trace_rebuild_insufficient_intent";

fn trace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]*<trace\b[^<>]*?/>\n?").expect("trace regex"))
}

/// Rebuild all traces from net-intent bindings.
pub fn rebuild_traces(code: &str) -> TransformOutcome {
    let model = SourceModel::parse(code);
    let by_net = model.endpoints_by_net();

    let mut lines: Vec<String> = Vec::new();
    for (net, endpoints) in &by_net {
        if endpoints.len() < 2 {
            continue;
        }
        let root = &endpoints[0];
        for endpoint in &endpoints[1..] {
            lines.push(format!(r#"<trace from="{}" to="{}" />"#, root, endpoint));
        }
        lines.push(format!(r#"<trace from="{}" to="net.{}" />"#, root, net));
    }

    if lines.is_empty() {
        let mut outcome = TransformOutcome::unchanged(code);
        outcome.diagnostics.push(RawFinding::new(
            INSUFFICIENT_INTENT,
            "no usable net intent found; traces left untouched",
            3,
            DiagnosticSource::Tscircuit,
        ));
        return outcome;
    }

    let stripped = trace_re().replace_all(code, "").into_owned();
    let rebuilt = insert_traces(&stripped, &lines);

    TransformOutcome {
        code: rebuilt,
        actions: vec![format!("rebuild_traces:{}", lines.len())],
        diagnostics: Vec::new(),
    }
}

fn insert_traces(code: &str, lines: &[String]) -> String {
    let block: String = lines
        .iter()
        .map(|l| format!("    {}\n", l))
        .collect();
    match code.find("</board>") {
        Some(idx) => {
            let mut out = String::with_capacity(code.len() + block.len());
            out.push_str(&code[..idx]);
            out.push_str(&block);
            out.push_str(&code[idx..]);
            out
        }
        None => {
            let mut out = code.to_string();
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            out
        }
    }
}
