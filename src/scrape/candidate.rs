use serde::{Deserialize, Serialize};
use std::fmt;

/// How a candidate was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Author of a scraped content item
    PrimaryOwner,
    /// Someone engaging with a scraped content item
    EngagedUser,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::PrimaryOwner => write!(f, "primary_owner"),
            SourceKind::EngagedUser => write!(f, "engaged_user"),
        }
    }
}

/// An identity discovered by the scrape pipeline, pending classification
#[derive(Debug, Clone, Serialize)]
pub struct CandidateIdentity {
    /// Platform handle without any leading marker
    pub identity: String,
    pub source_kind: SourceKind,
    /// Where the candidate was found, usually the item URL
    pub discovery_context: String,
    /// The grouping that led to the item
    pub target_key: String,
}

impl CandidateIdentity {
    pub fn new(
        identity: impl Into<String>,
        source_kind: SourceKind,
        discovery_context: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            source_kind,
            discovery_context: discovery_context.into(),
            target_key: target_key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&SourceKind::PrimaryOwner).unwrap(),
            "\"primary_owner\""
        );
        assert_eq!(SourceKind::EngagedUser.to_string(), "engaged_user");
    }
}
