use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::cli::config::ScrapeSettings;
use crate::surface::PageMetadata;

/// Pulls identities out of hrefs and page metadata
#[derive(Debug)]
pub struct IdentityExtractor {
    /// Full-match shape of a valid identity
    identity_shape: Regex,
    /// Marked handle, e.g. "@name" inside free text
    handle_marker: Regex,
    item_shape: Regex,
    reserved: Vec<String>,
    title_marker: String,
    acting_identity: Option<String>,
}

impl IdentityExtractor {
    pub fn new(settings: &ScrapeSettings, acting_identity: Option<String>) -> Result<Self> {
        let identity_shape = Regex::new(&format!("^(?:{})$", settings.identity_pattern))
            .context("Invalid identity pattern")?;
        let handle_marker = Regex::new(&format!("@({})", settings.identity_pattern))
            .context("Invalid identity pattern")?;
        let item_shape =
            Regex::new(&settings.item_pattern).context("Invalid item pattern")?;

        Ok(Self {
            identity_shape,
            handle_marker,
            item_shape,
            reserved: settings
                .reserved_names
                .iter()
                .map(|name| name.to_lowercase())
                .collect(),
            title_marker: settings.title_marker.clone(),
            acting_identity: acting_identity
                .map(|name| name.trim_start_matches('@').to_lowercase()),
        })
    }

    /// Whether an href points at a content item
    pub fn is_item_href(&self, href: &str) -> bool {
        self.item_shape.is_match(href)
    }

    /// Well-shaped, non-reserved identity that is not the acting account
    pub fn is_valid_identity(&self, identity: &str) -> bool {
        if !self.identity_shape.is_match(identity) {
            return false;
        }
        let lowered = identity.to_lowercase();
        if self.reserved.iter().any(|name| name == &lowered) {
            return false;
        }
        if let Some(acting) = &self.acting_identity {
            if acting == &lowered {
                return false;
            }
        }
        true
    }

    /// Identity from a profile-shaped href: exactly one non-empty path
    /// segment matching the identity shape.
    pub fn identity_from_href(&self, href: &str) -> Option<String> {
        let path = match Url::parse(href) {
            Ok(url) => url.path().to_string(),
            Err(_) => href
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() != 1 {
            return None;
        }
        let candidate = segments[0];
        if self.is_valid_identity(candidate) {
            Some(candidate.to_string())
        } else {
            None
        }
    }

    /// Owner of the current item. Tried in order: marked handle in the
    /// description, the title prefix, then nothing.
    pub fn owner_from_metadata(&self, metadata: &PageMetadata) -> Option<String> {
        if let Some(description) = &metadata.description {
            if let Some(captures) = self.handle_marker.captures(description) {
                let candidate = captures[1].to_string();
                if self.is_valid_identity(&candidate) {
                    debug!("owner from description: {}", candidate);
                    return Some(candidate);
                }
            }
        }
        if let Some(title) = &metadata.title {
            if let Some(candidate) = self.owner_from_title(title) {
                debug!("owner from title: {}", candidate);
                return Some(candidate);
            }
        }
        None
    }

    fn owner_from_title(&self, title: &str) -> Option<String> {
        let prefix = match title.split_once(&self.title_marker) {
            Some((prefix, _)) => prefix.trim(),
            None => return None,
        };
        if let Some(captures) = self.handle_marker.captures(prefix) {
            let candidate = captures[1].to_string();
            if self.is_valid_identity(&candidate) {
                return Some(candidate);
            }
        }
        // No marked handle, the prefix itself may be a bare one
        let bare = prefix.trim_start_matches('@');
        if self.is_valid_identity(bare) {
            return Some(bare.to_string());
        }
        None
    }

    /// The identity whose profile link appears most often. Ties keep the
    /// first one seen.
    pub fn owner_from_link_majority(&self, hrefs: &[String]) -> Option<String> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for href in hrefs {
            if let Some(identity) = self.identity_from_href(href) {
                match counts.iter_mut().find(|(name, _)| name == &identity) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((identity, 1)),
                }
            }
        }

        let mut best: Option<(String, usize)> = None;
        for (name, count) in counts {
            match &best {
                Some((_, best_count)) if *best_count >= count => {}
                _ => best = Some((name, count)),
            }
        }
        best.map(|(name, _)| name)
    }
}
