//! Pre-validation source rewrites.
//!
//! Applied to extracted code before it reaches the checkers. The transform
//! is idempotent: running it on its own output yields no further actions.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::source_model::{is_net_selector, is_pin_selector};

fn net_decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<net\s+name="([^"]*)"\s*/>"#).expect("net decl regex"))
}

fn trace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<trace\b[^<>]*?/>").expect("trace regex"))
}

fn trace_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(from|to)\s*=\s*"([^"]*)""#).expect("trace attr regex"))
}

/// Result of a guardrails pass: rewritten code plus applied action tags.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardrailOutcome {
    pub code: String,
    pub actions: Vec<String>,
}

/// Apply all guardrails to a source document.
pub fn apply(code: &str) -> GuardrailOutcome {
    let mut actions = Vec::new();
    let code = normalize_net_names(code, &mut actions);
    let code = dedupe_net_declarations(&code, &mut actions);
    let code = remove_malformed_traces(&code, &mut actions);
    GuardrailOutcome { code, actions }
}

/// Net names must not start with a digit; `3V3` becomes `V3V3`, and every
/// `net.3V3` reference in the document follows.
fn normalize_net_names(code: &str, actions: &mut Vec<String>) -> String {
    let mut renames: BTreeMap<String, String> = BTreeMap::new();
    for caps in net_decl_re().captures_iter(code) {
        let name = &caps[1];
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            renames
                .entry(name.to_string())
                .or_insert_with(|| format!("V{}", name));
        }
    }

    let mut out = code.to_string();
    for (old, new) in &renames {
        let decl_re = Regex::new(&format!(r#"<net\s+name="{}"\s*/>"#, regex::escape(old)))
            .expect("rename decl regex");
        out = decl_re
            .replace_all(&out, format!(r#"<net name="{}" />"#, new))
            .into_owned();

        let ref_re =
            Regex::new(&format!(r"net\.{}\b", regex::escape(old))).expect("rename ref regex");
        out = ref_re.replace_all(&out, format!("net.{}", new)).into_owned();

        actions.push(format!("normalize_net_name:{}->{}", old, new));
    }
    out
}

/// Drop repeat declarations of the same net, keeping the first.
fn dedupe_net_declarations(code: &str, actions: &mut Vec<String>) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut removed: Vec<String> = Vec::new();
    let out = net_decl_re()
        .replace_all(code, |caps: &regex::Captures<'_>| {
            let name = caps[1].to_string();
            if seen.contains(&name) {
                removed.push(name);
                String::new()
            } else {
                seen.push(name);
                caps[0].to_string()
            }
        })
        .into_owned();

    removed.sort();
    removed.dedup();
    for name in removed {
        actions.push(format!("dedupe_net_declaration:{}", name));
    }
    strip_blank_lines(&out)
}

/// Remove `<trace>` nodes missing `to` or whose selectors do not parse.
fn remove_malformed_traces(code: &str, actions: &mut Vec<String>) -> String {
    let out = trace_re()
        .replace_all(code, |caps: &regex::Captures<'_>| {
            let element = &caps[0];
            let mut from = None;
            let mut to = None;
            for attr in trace_attr_re().captures_iter(element) {
                match &attr[1] {
                    "from" => from = Some(attr[2].to_string()),
                    "to" => to = Some(attr[2].to_string()),
                    _ => {}
                }
            }
            let valid = matches!((&from, &to), (Some(f), Some(t))
                if selector_ok(f) && selector_ok(t));
            if valid {
                element.to_string()
            } else {
                let signature = format!(
                    "{}->{}",
                    from.as_deref().unwrap_or("?"),
                    to.as_deref().unwrap_or("?")
                )
                .replace(' ', "");
                actions.push(format!("remove_malformed_trace:{}", signature));
                String::new()
            }
        })
        .into_owned();
    strip_blank_lines(&out)
}

fn selector_ok(selector: &str) -> bool {
    is_pin_selector(selector) || is_net_selector(selector)
}

fn strip_blank_lines(code: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in code.lines() {
        let blank = line.trim().is_empty();
        if !(blank && previous_blank) {
            out.push(line);
        }
        previous_blank = blank;
    }
    let mut joined = out.join("\n");
    if code.ends_with('\n') {
        joined.push('\n');
    }
    joined
}
