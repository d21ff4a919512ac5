//! Dedup-stable diagnostic signatures.
//!
//! Signatures must survive volatile text: checker output embeds UUIDs for
//! every board item, so those are normalized to a placeholder and runs of
//! whitespace collapse to a single space.

use std::sync::OnceLock;

use regex::Regex;

use super::classify::parse_designator;
use super::model::{Diagnostic, Family};

const UUID_PLACEHOLDER: &str = "<uuid>";

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("uuid regex")
    })
}

/// Replace UUIDs with a placeholder and collapse whitespace. Idempotent.
pub fn normalize_volatile(text: &str) -> String {
    let replaced = uuid_re().replace_all(text, UUID_PLACEHOLDER);
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Compute the identity signature for a finding.
pub fn signature_for(family: &Family, message: &str) -> String {
    match family {
        // all low-signal pin conflicts collapse into one bucket
        Family::PinConflictLowSignal => family.as_str().to_string(),
        Family::DuplicateReference | Family::KicadBomProperty => {
            let designator = parse_designator(message)
                .unwrap_or_else(|| normalize_volatile(message));
            format!("{}|{}", family.as_str(), designator)
        }
        _ => format!("{}|{}", family.as_str(), normalize_volatile(message)),
    }
}

/// Sorted, deduplicated join of a diagnostic set's signatures.
pub fn set_signature(diagnostics: &[Diagnostic]) -> String {
    let mut signatures: Vec<&str> = diagnostics.iter().map(|d| d.signature.as_str()).collect();
    signatures.sort_unstable();
    signatures.dedup();
    signatures.join(";")
}
