//! Fenced code-block extraction from model output.

use std::sync::OnceLock;

use regex::Regex;

fn tsx_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```tsx[ \t]*\r?\n(.*?)```").expect("tsx fence regex")
    })
}

fn any_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[a-zA-Z]*[ \t]*\r?\n(.*?)```").expect("fence regex")
    })
}

/// Extract the last fenced `tsx` block from the accumulated text. Falls
/// back to the last fence of any language when no tsx fence exists.
pub fn extract_code(text: &str) -> Option<String> {
    let tsx = tsx_fence_re()
        .captures_iter(text)
        .last()
        .map(|caps| caps[1].trim_end().to_string());
    if tsx.is_some() {
        return tsx;
    }
    any_fence_re()
        .captures_iter(text)
        .last()
        .map(|caps| caps[1].trim_end().to_string())
}

/// Whether the text already contains one complete tsx fence; used to gate
/// the speculative compile while the stream is still running.
pub fn has_complete_tsx_fence(text: &str) -> bool {
    tsx_fence_re().is_match(text)
}
