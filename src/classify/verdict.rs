use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scrape::SourceKind;

/// Classification outcome for one identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudienceLabel {
    Ideal,
    Possible,
    #[default]
    NonTarget,
}

impl AudienceLabel {
    /// Sort rank, best first
    pub fn rank(&self) -> u8 {
        match self {
            AudienceLabel::Ideal => 0,
            AudienceLabel::Possible => 1,
            AudienceLabel::NonTarget => 2,
        }
    }

    /// Name used in prompts and exports
    pub fn wire_name(&self) -> &'static str {
        match self {
            AudienceLabel::Ideal => "IDEAL TARGET",
            AudienceLabel::Possible => "POSSIBLE TARGET",
            AudienceLabel::NonTarget => "NON-TARGET",
        }
    }

    /// Lenient read of a model-emitted label
    pub fn from_wire(text: &str) -> Self {
        let upper = text.to_uppercase();
        if upper.contains("IDEAL") {
            AudienceLabel::Ideal
        } else if upper.contains("POSSIBLE") {
            AudienceLabel::Possible
        } else {
            AudienceLabel::NonTarget
        }
    }
}

impl fmt::Display for AudienceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// One classified identity with its supporting evidence
#[derive(Debug, Clone, Serialize)]
pub struct AudienceVerdict {
    pub identity: String,
    pub label: AudienceLabel,
    /// Model confidence, 0 to 100
    pub score: u8,
    pub evidence: Vec<String>,
    pub caveats: Vec<String>,
    pub source_kind: SourceKind,
    pub discovery_context: String,
    pub target_key: String,
}

/// Order verdicts best first: by label rank, then score descending. Equal
/// keys keep their existing order.
pub fn rank_verdicts(verdicts: &mut [AudienceVerdict]) {
    verdicts.sort_by(|a, b| {
        a.label
            .rank()
            .cmp(&b.label.rank())
            .then(b.score.cmp(&a.score))
    });
}
