//! Durable session context and its merge rules.
//!
//! Requirements and architecture merge by id; review findings merge by id
//! while preserving any non-open status, and open findings a phase no
//! longer produces transition to dismissed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostic, Family};
use crate::phase::Phase;

/// Review finding lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    Accepted,
    Dismissed,
}

/// A reviewable finding surfaced to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFinding {
    pub id: String,
    pub category: String,
    pub message: String,
    /// Severity label: "info", "warning", or "error".
    pub severity: String,
    pub is_blocking: bool,
    pub status: FindingStatus,
    pub phase: Phase,
    pub family: String,
}

impl ReviewFinding {
    pub fn from_diagnostic(diag: &Diagnostic, phase: Phase) -> Self {
        let blocking = diag.is_blocking();
        let severity = if blocking || diag.severity >= 8 {
            "error"
        } else if diag.severity >= 6 {
            "warning"
        } else {
            "info"
        };
        Self {
            id: format!("{}::{}", diag.category, diag.signature),
            category: diag.category.clone(),
            message: diag.message.clone(),
            severity: severity.to_string(),
            is_blocking: blocking,
            status: FindingStatus::Open,
            phase,
            family: diag.family.as_str().to_string(),
        }
    }
}

/// One derived requirement item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementItem {
    pub id: String,
    pub title: String,
}

/// One architecture block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureBlock {
    pub id: String,
    pub label: String,
    pub status: String,
}

/// Durable per-session context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub id: String,
    pub project_id: Option<String>,
    pub requirements: Vec<RequirementItem>,
    pub architecture: Vec<ArchitectureBlock>,
    pub review_findings: BTreeMap<String, ReviewFinding>,
    pub last_phase: Option<Phase>,
    pub last_schematic: Option<String>,
    pub last_generated_code: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(id: impl Into<String>, project_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            project_id,
            requirements: Vec::new(),
            architecture: Vec::new(),
            review_findings: BTreeMap::new(),
            last_phase: None,
            last_schematic: None,
            last_generated_code: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether this session has produced anything yet.
    pub fn has_history(&self) -> bool {
        self.last_phase.is_some()
            || self.last_generated_code.is_some()
            || !self.requirements.is_empty()
    }

    /// Merge requirement items, deduplicating by id and keeping order.
    pub fn merge_requirements(&mut self, items: Vec<RequirementItem>) {
        for item in items {
            if !self.requirements.iter().any(|r| r.id == item.id) {
                self.requirements.push(item);
            }
        }
        self.updated_at = Utc::now();
    }

    /// Merge architecture blocks, deduplicating by id and keeping order.
    pub fn merge_architecture(&mut self, blocks: Vec<ArchitectureBlock>) {
        for block in blocks {
            if !self.architecture.iter().any(|b| b.id == block.id) {
                self.architecture.push(block);
            }
        }
        self.updated_at = Utc::now();
    }

    /// Merge the findings one attempt produced for a phase. Existing
    /// non-open statuses survive the rewrite; open findings of the same
    /// phase that were not re-produced transition to dismissed. Returns
    /// the ids that were dismissed.
    pub fn merge_review_findings(
        &mut self,
        phase: Phase,
        produced: Vec<ReviewFinding>,
    ) -> Vec<String> {
        let produced_ids: Vec<String> = produced.iter().map(|f| f.id.clone()).collect();

        for mut finding in produced {
            if let Some(existing) = self.review_findings.get(&finding.id) {
                if existing.status != FindingStatus::Open {
                    finding.status = existing.status;
                }
            }
            self.review_findings.insert(finding.id.clone(), finding);
        }

        let mut dismissed = Vec::new();
        for (id, finding) in self.review_findings.iter_mut() {
            if finding.phase == phase
                && finding.status == FindingStatus::Open
                && !produced_ids.contains(id)
            {
                finding.status = FindingStatus::Dismissed;
                dismissed.push(id.clone());
            }
        }
        self.updated_at = Utc::now();
        dismissed
    }

    /// Apply a client review decision. Returns false for unknown ids.
    pub fn apply_review_decision(&mut self, finding_id: &str, accept: bool) -> bool {
        match self.review_findings.get_mut(finding_id) {
            Some(finding) => {
                finding.status = if accept {
                    FindingStatus::Accepted
                } else {
                    FindingStatus::Dismissed
                };
                self.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Dismiss remaining open findings from known low-signal families.
    /// Returns the dismissed ids.
    pub fn auto_dismiss_low_signal(&mut self) -> Vec<String> {
        let mut dismissed = Vec::new();
        for (id, finding) in self.review_findings.iter_mut() {
            if finding.status == FindingStatus::Open
                && Family::from_category(&finding.family).is_low_signal()
            {
                finding.status = FindingStatus::Dismissed;
                dismissed.push(id.clone());
            }
        }
        if !dismissed.is_empty() {
            self.updated_at = Utc::now();
        }
        dismissed
    }

    /// Open findings that carry error-level severity.
    pub fn open_critical_count(&self) -> usize {
        self.review_findings
            .values()
            .filter(|f| f.status == FindingStatus::Open && f.severity == "error")
            .count()
    }
}

/// Derive up to four requirement items from a free-form prompt.
pub fn derive_requirements(prompt: &str) -> Vec<RequirementItem> {
    let mut items = Vec::new();
    for clause in prompt
        .split(|c| c == '.' || c == ';' || c == '\n')
        .flat_map(|part| part.split(" and "))
    {
        let clause = clause.trim().trim_start_matches(|c: char| !c.is_alphanumeric());
        if clause.len() < 12 {
            continue;
        }
        let mut title: String = clause.chars().take(80).collect();
        if clause.len() > 80 {
            title.push('…');
        }
        items.push(RequirementItem {
            id: format!("req-{}", items.len() + 1),
            title,
        });
        if items.len() == 4 {
            break;
        }
    }
    items
}

const SUBSYSTEM_KEYWORDS: &[(&str, &str)] = &[
    ("power", "Power input & regulation"),
    ("regulator", "Power input & regulation"),
    ("mcu", "Controller"),
    ("microcontroller", "Controller"),
    ("controller", "Controller"),
    ("connector", "I/O & connectors"),
    ("usb", "I/O & connectors"),
    ("sensor", "Sensing"),
    ("led", "Indication"),
];

/// Small fallback when the architecture model is unavailable. Always
/// yields at least one block.
pub fn heuristic_architecture(prompt: &str) -> Vec<ArchitectureBlock> {
    let lower = prompt.to_ascii_lowercase();
    let mut blocks: Vec<ArchitectureBlock> = Vec::new();
    for (keyword, label) in SUBSYSTEM_KEYWORDS {
        if lower.contains(keyword) && !blocks.iter().any(|b| b.label == *label) {
            blocks.push(ArchitectureBlock {
                id: format!("blk-{}", blocks.len() + 1),
                label: label.to_string(),
                status: "proposed".to_string(),
            });
        }
    }
    if blocks.is_empty() {
        blocks.push(ArchitectureBlock {
            id: "blk-1".to_string(),
            label: "Core circuit".to_string(),
            status: "proposed".to_string(),
        });
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{annotate, DiagnosticSource, RawFinding};

    fn finding(id: &str, phase: Phase, status: FindingStatus) -> ReviewFinding {
        ReviewFinding {
            id: id.to_string(),
            category: "ERC".to_string(),
            message: "msg".to_string(),
            severity: "warning".to_string(),
            is_blocking: false,
            status,
            phase,
            family: "validation".to_string(),
        }
    }

    #[test]
    fn test_merge_preserves_non_open_status() {
        let mut ctx = SessionContext::new("s1", None);
        ctx.merge_review_findings(Phase::Review, vec![finding("f1", Phase::Review, FindingStatus::Open)]);
        ctx.apply_review_decision("f1", true);

        ctx.merge_review_findings(
            Phase::Review,
            vec![finding("f1", Phase::Review, FindingStatus::Open)],
        );
        assert_eq!(ctx.review_findings["f1"].status, FindingStatus::Accepted);
    }

    #[test]
    fn test_unproduced_open_findings_dismiss() {
        let mut ctx = SessionContext::new("s1", None);
        ctx.merge_review_findings(
            Phase::Review,
            vec![
                finding("f1", Phase::Review, FindingStatus::Open),
                finding("f2", Phase::Review, FindingStatus::Open),
            ],
        );

        let dismissed = ctx.merge_review_findings(
            Phase::Review,
            vec![finding("f1", Phase::Review, FindingStatus::Open)],
        );
        assert_eq!(dismissed, vec!["f2".to_string()]);
        assert_eq!(ctx.review_findings["f2"].status, FindingStatus::Dismissed);

        // findings from another phase are untouched
        ctx.merge_review_findings(
            Phase::Implementation,
            vec![finding("f3", Phase::Implementation, FindingStatus::Open)],
        );
        assert_eq!(ctx.review_findings["f1"].status, FindingStatus::Open);
    }

    #[test]
    fn test_requirement_and_architecture_merge_dedupe() {
        let mut ctx = SessionContext::new("s1", None);
        ctx.merge_requirements(vec![
            RequirementItem { id: "req-1".into(), title: "a".into() },
            RequirementItem { id: "req-1".into(), title: "b".into() },
        ]);
        assert_eq!(ctx.requirements.len(), 1);
        assert_eq!(ctx.requirements[0].title, "a");

        ctx.merge_architecture(vec![
            ArchitectureBlock { id: "blk-1".into(), label: "x".into(), status: "proposed".into() },
            ArchitectureBlock { id: "blk-1".into(), label: "y".into(), status: "proposed".into() },
        ]);
        assert_eq!(ctx.architecture.len(), 1);
    }

    #[test]
    fn test_auto_dismiss_low_signal() {
        let diag = annotate(RawFinding::new(
            "ERC",
            "pin conflict: unspecified connected to unspecified",
            4,
            DiagnosticSource::Kicad,
        ));
        let mut ctx = SessionContext::new("s1", None);
        ctx.merge_review_findings(
            Phase::Implementation,
            vec![ReviewFinding::from_diagnostic(&diag, Phase::Implementation)],
        );

        let dismissed = ctx.auto_dismiss_low_signal();
        assert_eq!(dismissed.len(), 1);
    }

    #[test]
    fn test_finding_from_demoted_diagnostic_is_info() {
        let diag = annotate(RawFinding::new(
            "PIN_CONFLICT_WARNING",
            "pin conflict: unspecified connected to unspecified",
            9,
            DiagnosticSource::Kicad,
        ));
        let finding = ReviewFinding::from_diagnostic(&diag, Phase::Implementation);
        assert_eq!(finding.severity, "info");
        assert!(!finding.is_blocking);
        assert_eq!(finding.category, "PIN_CONFLICT_WARNING");
        assert!(finding.id.contains("PIN_CONFLICT_WARNING"));
    }

    #[test]
    fn test_derive_requirements_caps_at_four() {
        let prompt = "Design a compact regulator board. Use USB-C input. \
                      Provide 3.3V at 2A and keep ripple under 20mV. \
                      Add thermal relief. Include mounting holes.";
        let items = derive_requirements(prompt);
        assert!(items.len() <= 4);
        assert!(items.len() >= 2);
        assert_eq!(items[0].id, "req-1");
    }

    #[test]
    fn test_heuristic_architecture_never_empty() {
        assert!(!heuristic_architecture("blinky").is_empty());
        let blocks = heuristic_architecture("usb powered mcu board with sensors");
        assert!(blocks.len() >= 3);
    }
}
