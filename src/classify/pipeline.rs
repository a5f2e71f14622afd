use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::parser::parse_response;
use super::prompt::build_prompt;
use super::verdict::{rank_verdicts, AudienceLabel, AudienceVerdict};
use crate::cli::config::{AudienceProfile, ClassifySettings};
use crate::inference::InferenceService;
use crate::scrape::CandidateIdentity;

/// Batched audience classification with a guaranteed verdict per candidate
pub struct AudienceClassifier {
    inference: Arc<dyn InferenceService>,
    batch_size: usize,
}

impl AudienceClassifier {
    pub fn new(inference: Arc<dyn InferenceService>, settings: &ClassifySettings) -> Self {
        Self {
            inference,
            batch_size: settings.batch_size.max(1),
        }
    }

    /// Classify every candidate. Exactly one verdict per distinct identity
    /// comes back, ordered best first. Failed batches and short responses
    /// degrade to NON-TARGET verdicts instead of dropping candidates.
    pub async fn classify(
        &self,
        audience: &AudienceProfile,
        candidates: &[CandidateIdentity],
    ) -> Vec<AudienceVerdict> {
        let unique = dedup_candidates(candidates);
        if unique.is_empty() {
            return Vec::new();
        }
        debug!(
            "classifying {} candidates for '{}' in batches of {}",
            unique.len(),
            audience.key,
            self.batch_size
        );

        let batches: Vec<&[CandidateIdentity]> = unique.chunks(self.batch_size).collect();
        let requests = batches.iter().map(|batch| {
            let service = Arc::clone(&self.inference);
            let prompt = build_prompt(audience, batch);
            async move { service.submit(&prompt).await }
        });
        let responses = join_all(requests).await;

        let mut verdicts = Vec::with_capacity(unique.len());
        for (batch, response) in batches.iter().zip(responses) {
            match response {
                Ok(text) => {
                    let blocks = parse_response(&text);
                    if blocks.len() < batch.len() {
                        warn!(
                            "response yielded {} blocks for {} candidates",
                            blocks.len(),
                            batch.len()
                        );
                    }
                    // Blocks pair with candidates by position, extras are
                    // ignored and the shortfall degrades
                    for (index, candidate) in batch.iter().enumerate() {
                        match blocks.get(index) {
                            Some(block) => verdicts.push(AudienceVerdict {
                                identity: candidate.identity.clone(),
                                label: block.label,
                                score: block.score,
                                evidence: block.evidence.clone(),
                                caveats: block.caveats.clone(),
                                source_kind: candidate.source_kind,
                                discovery_context: candidate.discovery_context.clone(),
                                target_key: candidate.target_key.clone(),
                            }),
                            None => verdicts.push(fallback_verdict(
                                candidate,
                                "no classification block in response",
                            )),
                        }
                    }
                }
                Err(e) => {
                    warn!("classification batch failed: {:#}", e);
                    for candidate in batch.iter() {
                        verdicts.push(fallback_verdict(
                            candidate,
                            &format!("classification failed: {}", e),
                        ));
                    }
                }
            }
        }

        rank_verdicts(&mut verdicts);
        verdicts
    }
}

/// Keep the first occurrence of each identity
fn dedup_candidates(candidates: &[CandidateIdentity]) -> Vec<CandidateIdentity> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|c| seen.insert(c.identity.clone()))
        .cloned()
        .collect()
}

fn fallback_verdict(candidate: &CandidateIdentity, caveat: &str) -> AudienceVerdict {
    AudienceVerdict {
        identity: candidate.identity.clone(),
        label: AudienceLabel::NonTarget,
        score: 0,
        evidence: Vec::new(),
        caveats: vec![caveat.to_string()],
        source_kind: candidate.source_kind,
        discovery_context: candidate.discovery_context.clone(),
        target_key: candidate.target_key.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::PilotConfig;
    use crate::inference::MockInferenceService;
    use crate::scrape::SourceKind;

    fn candidate(name: &str) -> CandidateIdentity {
        CandidateIdentity::new(
            name,
            SourceKind::EngagedUser,
            "https://example.com/p/X/",
            "#topic",
        )
    }

    fn settings(batch_size: usize) -> ClassifySettings {
        let mut settings = PilotConfig::default().classify;
        settings.batch_size = batch_size;
        settings
    }

    fn test_audience() -> AudienceProfile {
        AudienceProfile {
            key: "test".to_string(),
            name: "Test audience".to_string(),
            definition: "anyone at all".to_string(),
            groupings: vec!["#one".to_string()],
        }
    }

    fn block(label: &str, score: u8) -> String {
        format!(
            "CLASSIFICATION: {}\nSCORE: {}/100\nSIGNALS USED:\n- looks right\nUNCERTAINTIES:\n- none\n",
            label, score
        )
    }

    fn response_for(count: usize, label: &str, score: u8) -> String {
        (0..count)
            .map(|_| block(label, score))
            .collect::<Vec<_>>()
            .join("---\n")
    }

    #[tokio::test]
    async fn test_every_candidate_gets_exactly_one_verdict() {
        let candidates: Vec<CandidateIdentity> = (1..=13)
            .map(|i| candidate(&format!("cand{:02}", i)))
            .collect();

        // three batches of 5/5/3, the middle one times out
        let mut mock = MockInferenceService::new();
        mock.expect_submit().times(3).returning(|prompt| {
            if prompt.contains("cand06") {
                Err(anyhow::anyhow!("inference timeout"))
            } else if prompt.contains("cand11") {
                Ok(response_for(3, "POSSIBLE TARGET", 60))
            } else {
                Ok(response_for(5, "IDEAL TARGET", 90))
            }
        });

        let classifier = AudienceClassifier::new(Arc::new(mock), &settings(5));
        let verdicts = classifier.classify(&test_audience(), &candidates).await;

        assert_eq!(verdicts.len(), 13);
        assert!(verdicts[0..5].iter().all(|v| v.label == AudienceLabel::Ideal));
        assert!(verdicts[5..8]
            .iter()
            .all(|v| v.label == AudienceLabel::Possible));

        let tail: Vec<&str> = verdicts[8..].iter().map(|v| v.identity.as_str()).collect();
        assert_eq!(tail, vec!["cand06", "cand07", "cand08", "cand09", "cand10"]);
        for v in &verdicts[8..] {
            assert_eq!(v.label, AudienceLabel::NonTarget);
            assert_eq!(v.score, 0);
            assert!(v.evidence.is_empty());
            assert!(v.caveats[0].contains("timeout"));
        }
    }

    #[tokio::test]
    async fn test_short_response_synthesizes_missing_verdicts() {
        let candidates = vec![candidate("alpha"), candidate("beta"), candidate("gamma")];
        let mut mock = MockInferenceService::new();
        mock.expect_submit()
            .times(1)
            .returning(|_| Ok(response_for(2, "IDEAL TARGET", 80)));

        let classifier = AudienceClassifier::new(Arc::new(mock), &settings(5));
        let verdicts = classifier.classify(&test_audience(), &candidates).await;

        assert_eq!(verdicts.len(), 3);
        let alpha = verdicts.iter().find(|v| v.identity == "alpha").unwrap();
        let gamma = verdicts.iter().find(|v| v.identity == "gamma").unwrap();
        assert_eq!(alpha.label, AudienceLabel::Ideal);
        assert_eq!(gamma.label, AudienceLabel::NonTarget);
        assert!(gamma.caveats[0].contains("no classification block"));
    }

    #[tokio::test]
    async fn test_duplicate_identities_classified_once() {
        let mut first = candidate("alpha");
        first.discovery_context = "https://example.com/p/FIRST/".to_string();
        let mut dup = candidate("alpha");
        dup.discovery_context = "https://example.com/p/SECOND/".to_string();
        let candidates = vec![first, dup, candidate("beta")];

        let mut mock = MockInferenceService::new();
        mock.expect_submit()
            .withf(|prompt| prompt.contains("FIRST") && !prompt.contains("SECOND"))
            .times(1)
            .returning(|_| Ok(response_for(2, "POSSIBLE TARGET", 50)));

        let classifier = AudienceClassifier::new(Arc::new(mock), &settings(5));
        let verdicts = classifier.classify(&test_audience(), &candidates).await;

        assert_eq!(verdicts.len(), 2);
        let alpha = verdicts.iter().find(|v| v.identity == "alpha").unwrap();
        assert_eq!(alpha.discovery_context, "https://example.com/p/FIRST/");
    }

    #[tokio::test]
    async fn test_equal_verdicts_keep_discovery_order() {
        let candidates = vec![candidate("one"), candidate("two"), candidate("three")];
        let mut mock = MockInferenceService::new();
        mock.expect_submit()
            .times(1)
            .returning(|_| Ok(response_for(3, "POSSIBLE TARGET", 50)));

        let classifier = AudienceClassifier::new(Arc::new(mock), &settings(5));
        let verdicts = classifier.classify(&test_audience(), &candidates).await;

        let order: Vec<&str> = verdicts.iter().map(|v| v.identity.as_str()).collect();
        assert_eq!(order, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_requests() {
        let mock = MockInferenceService::new();
        let classifier = AudienceClassifier::new(Arc::new(mock), &settings(5));
        let verdicts = classifier.classify(&test_audience(), &[]).await;
        assert!(verdicts.is_empty());
    }
}
