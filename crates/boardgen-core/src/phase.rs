//! Design phases and phase inference from the prompt.

use serde::{Deserialize, Serialize};

/// The phase a request runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Requirements,
    Architecture,
    Implementation,
    Review,
    Export,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Requirements => "requirements",
            Phase::Architecture => "architecture",
            Phase::Implementation => "implementation",
            Phase::Review => "review",
            Phase::Export => "export",
        }
    }

    /// Phases that run the compile+validate gate and the repair loop.
    pub fn has_validation_gate(&self) -> bool {
        matches!(self, Phase::Implementation | Phase::Review | Phase::Export)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const REVIEW_KEYWORDS: &[&str] = &["review", "audit", "check", "validate"];
const ARCHITECTURE_KEYWORDS: &[&str] = &["architecture", "block diagram", "topology", "system design"];
const SUPPLY_KEYWORDS: &[&str] = &["supply chain", "bom", "dfm", "erc", "drc"];

/// Infer the phase when the request does not name one.
pub fn infer_phase(prompt: &str, has_history: bool) -> Phase {
    let lower = prompt.to_ascii_lowercase();
    if lower.contains("export") {
        return Phase::Export;
    }
    if REVIEW_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Phase::Review;
    }
    if !has_history {
        return Phase::Requirements;
    }
    if ARCHITECTURE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Phase::Architecture;
    }
    if SUPPLY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return Phase::Review;
    }
    Phase::Implementation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_phase_precedence() {
        assert_eq!(infer_phase("export the board files", true), Phase::Export);
        assert_eq!(infer_phase("please review the layout", true), Phase::Review);
        assert_eq!(infer_phase("design a sensor board", false), Phase::Requirements);
        assert_eq!(
            infer_phase("sketch the architecture for this", true),
            Phase::Architecture
        );
        assert_eq!(infer_phase("run a DFM pass", true), Phase::Review);
        assert_eq!(infer_phase("add a pull-up to the I2C bus", true), Phase::Implementation);
    }

    #[test]
    fn test_gated_phases() {
        assert!(Phase::Implementation.has_validation_gate());
        assert!(Phase::Review.has_validation_gate());
        assert!(Phase::Export.has_validation_gate());
        assert!(!Phase::Requirements.has_validation_gate());
        assert!(!Phase::Architecture.has_validation_gate());
    }
}
