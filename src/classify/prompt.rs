use crate::cli::config::AudienceProfile;
use crate::scrape::CandidateIdentity;

/// Build the batch classification prompt. One numbered block per candidate,
/// with the response contract spelled out so the parser can rely on it.
pub fn build_prompt(audience: &AudienceProfile, batch: &[CandidateIdentity]) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are screening social profiles for an outreach campaign.\n\n");
    prompt.push_str(&format!("Audience definition: {}\n\n", audience.definition));
    prompt.push_str(&format!(
        "Classify each of the {} profiles below as IDEAL TARGET, POSSIBLE TARGET or NON-TARGET.\n\n",
        batch.len()
    ));

    for (index, candidate) in batch.iter().enumerate() {
        prompt.push_str(&format!("Profile {}:\n", index + 1));
        prompt.push_str(&format!("- handle: @{}\n", candidate.identity));
        prompt.push_str(&format!("- role: {}\n", candidate.source_kind));
        prompt.push_str(&format!(
            "- found via: {} ({})\n\n",
            candidate.target_key, candidate.discovery_context
        ));
    }

    prompt.push_str(
        "Respond with one block per profile, in the same order, using exactly this format:\n\
         CLASSIFICATION: <IDEAL TARGET | POSSIBLE TARGET | NON-TARGET>\n\
         SCORE: <0-100>/100\n\
         SIGNALS USED:\n\
         - <signal>\n\
         UNCERTAINTIES:\n\
         - <uncertainty, or 'none'>\n\n\
         Separate blocks with a line containing only ---\n",
    );
    prompt
}
