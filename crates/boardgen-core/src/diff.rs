//! Attempt-over-attempt source diffs for the evidence stream.

use serde::{Deserialize, Serialize};

use crate::source_model::SourceModel;

/// Structural differences between two attempts' extracted code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationDiff {
    pub added_components: Vec<String>,
    pub removed_components: Vec<String>,
    pub changed_component_values: Vec<String>,
    pub trace_count_delta: i64,
    pub summary: String,
}

/// Compare the previous attempt's code with the new one.
pub fn diff_iterations(previous: &str, current: &str) -> IterationDiff {
    let before = SourceModel::parse(previous);
    let after = SourceModel::parse(current);

    let mut added: Vec<String> = after
        .components
        .iter()
        .filter(|c| before.component(&c.name).is_none())
        .map(|c| c.name.clone())
        .collect();
    added.sort();

    let mut removed: Vec<String> = before
        .components
        .iter()
        .filter(|c| after.component(&c.name).is_none())
        .map(|c| c.name.clone())
        .collect();
    removed.sort();

    let mut changed: Vec<String> = after
        .components
        .iter()
        .filter_map(|c| {
            let previous = before.component(&c.name)?;
            if previous.value != c.value {
                Some(format!(
                    "{}: {} -> {}",
                    c.name,
                    previous.value.as_deref().unwrap_or("?"),
                    c.value.as_deref().unwrap_or("?"),
                ))
            } else {
                None
            }
        })
        .collect();
    changed.sort();

    let trace_count_delta = after.traces.len() as i64 - before.traces.len() as i64;

    let summary = format!(
        "{} added, {} removed, {} value changes, trace delta {}",
        added.len(),
        removed.len(),
        changed.len(),
        trace_count_delta,
    );

    IterationDiff {
        added_components: added,
        removed_components: removed,
        changed_component_values: changed,
        trace_count_delta,
        summary,
    }
}
