use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use super::candidate::{CandidateIdentity, SourceKind};
use super::extract::IdentityExtractor;
use crate::cli::config::{AudienceProfile, ScrapeSettings};
use crate::registry::{StopFlag, TaskLog};
use crate::session::sampler::Sampler;
use crate::surface::{AutomationSurface, LinkClass, ScrollDirection, SearchKind};

/// Walks a sample of the audience's groupings, opens fresh items, and
/// harvests their owners plus engaged users. Items already in the visited
/// set are never opened again.
pub struct Scraper {
    surface: Arc<dyn AutomationSurface>,
    settings: ScrapeSettings,
    extractor: IdentityExtractor,
    base_url: Url,
}

/// Borrowed working state for one collect() run
struct RunScope<'a> {
    visited: &'a mut HashSet<String>,
    sampler: &'a mut Sampler,
    stop: &'a StopFlag,
    log: &'a TaskLog,
    seen: HashSet<String>,
    collected: Vec<CandidateIdentity>,
}

impl Scraper {
    pub fn new(
        surface: Arc<dyn AutomationSurface>,
        settings: &ScrapeSettings,
        base_url: &str,
        acting_identity: Option<String>,
    ) -> Result<Self> {
        let extractor = IdentityExtractor::new(settings, acting_identity)?;
        let base_url = Url::parse(base_url).context("Invalid base URL")?;

        Ok(Self {
            surface,
            settings: settings.clone(),
            extractor,
            base_url,
        })
    }

    /// One discovery run. Surface failures are absorbed and logged so a bad
    /// page never kills the session.
    pub async fn collect(
        &self,
        audience: &AudienceProfile,
        visited: &mut HashSet<String>,
        sampler: &mut Sampler,
        stop: &StopFlag,
        log: &TaskLog,
    ) -> Vec<CandidateIdentity> {
        let groupings: Vec<String> = sampler
            .pick_many(&audience.groupings, self.settings.groupings_per_call)
            .into_iter()
            .cloned()
            .collect();
        if groupings.is_empty() {
            log.push("no groupings configured for this audience").await;
            return Vec::new();
        }

        let mut scope = RunScope {
            visited,
            sampler,
            stop,
            log,
            seen: HashSet::new(),
            collected: Vec::new(),
        };
        scope
            .log
            .push(format!(
                "scraping {} groupings for '{}'",
                groupings.len(),
                audience.key
            ))
            .await;

        for (index, grouping) in groupings.iter().enumerate() {
            if scope.stop.is_stopped() || self.call_full(&scope) {
                break;
            }
            if index > 0 {
                self.pause(scope.sampler, self.settings.pacing.between_groupings_secs)
                    .await;
            }
            self.harvest_grouping(grouping, &mut scope).await;
        }

        scope
            .log
            .push(format!(
                "scrape finished: {} new candidates",
                scope.collected.len()
            ))
            .await;
        scope.collected
    }

    async fn harvest_grouping(&self, grouping: &str, scope: &mut RunScope<'_>) {
        scope.log.push(format!("searching grouping {}", grouping)).await;
        match self.surface.search(grouping, SearchKind::Topic).await {
            Ok(true) => {}
            Ok(false) => {
                scope.log.push(format!("no results for {}", grouping)).await;
                return;
            }
            Err(e) => {
                scope
                    .log
                    .push(format!("search failed for {}: {}", grouping, e))
                    .await;
                return;
            }
        }
        self.pause(scope.sampler, self.settings.pacing.page_load_secs).await;

        // Let the result grid load a few rows
        let warmup = scope.sampler.count(self.settings.warmup_scrolls);
        for _ in 0..warmup {
            if self.surface.scroll_step(ScrollDirection::Down).await.is_err() {
                break;
            }
            self.pause(scope.sampler, self.settings.pacing.scroll_secs).await;
        }

        let hrefs = match self.surface.extract_links(LinkClass::Items).await {
            Ok(hrefs) => hrefs,
            Err(e) => {
                scope
                    .log
                    .push(format!("could not list items for {}: {}", grouping, e))
                    .await;
                return;
            }
        };

        let mut fresh: Vec<String> = Vec::new();
        for href in hrefs {
            let Ok(absolute) = self.base_url.join(&href) else {
                continue;
            };
            let absolute = absolute.to_string();
            if !self.extractor.is_item_href(&absolute) || scope.visited.contains(&absolute) {
                continue;
            }
            if !fresh.contains(&absolute) {
                fresh.push(absolute);
            }
        }
        fresh.truncate(self.settings.items_per_grouping);
        scope
            .log
            .push(format!("{}: {} fresh items", grouping, fresh.len()))
            .await;

        for (index, item) in fresh.iter().enumerate() {
            if scope.stop.is_stopped() || self.call_full(scope) {
                return;
            }
            if index > 0 {
                self.pause(scope.sampler, self.settings.pacing.between_items_secs)
                    .await;
            }
            // Marked visited up front so a failed item is never retried
            scope.visited.insert(item.clone());
            self.harvest_item(item, grouping, scope).await;
            self.maybe_break(scope).await;
        }
    }

    async fn harvest_item(&self, item: &str, grouping: &str, scope: &mut RunScope<'_>) {
        if let Err(e) = self.surface.navigate(item).await {
            scope.log.push(format!("could not open {}: {}", item, e)).await;
            return;
        }
        self.pause(scope.sampler, self.settings.pacing.page_load_secs).await;
        self.pause(scope.sampler, self.settings.pacing.read_content_secs).await;

        let owner = self.detect_owner().await;
        match &owner {
            Some(name) => {
                if scope.seen.insert(name.clone()) {
                    debug!("owner {} from {}", name, item);
                    scope.collected.push(CandidateIdentity::new(
                        name.clone(),
                        SourceKind::PrimaryOwner,
                        item,
                        grouping,
                    ));
                }
            }
            None => {
                scope.log.push(format!("no owner detected for {}", item)).await;
            }
        }

        if self.call_full(scope) {
            return;
        }

        // Surface more of the engagement area before reading it
        for _ in 0..self.settings.expansion_attempts {
            match self.surface.expand_engagement().await {
                Ok(true) => {
                    self.pause(scope.sampler, self.settings.pacing.engagement_secs)
                        .await;
                    if scope.sampler.chance(self.settings.expansion_stop_chance) {
                        break;
                    }
                }
                Ok(false) => break,
                Err(e) => {
                    debug!("expand failed on {}: {}", item, e);
                    break;
                }
            }
        }

        let hrefs = match self.surface.extract_links(LinkClass::Engagement).await {
            Ok(hrefs) => hrefs,
            Err(e) => {
                scope
                    .log
                    .push(format!("could not read engagement on {}: {}", item, e))
                    .await;
                return;
            }
        };

        let mut engaged = 0usize;
        for href in hrefs {
            if engaged >= self.settings.engaged_per_item || self.call_full(scope) {
                break;
            }
            let Some(identity) = self.extractor.identity_from_href(&href) else {
                continue;
            };
            if Some(&identity) == owner.as_ref() || !scope.seen.insert(identity.clone()) {
                continue;
            }
            scope.collected.push(CandidateIdentity::new(
                identity,
                SourceKind::EngagedUser,
                item,
                grouping,
            ));
            engaged += 1;
        }
        scope
            .log
            .push(format!(
                "{}: owner {}, {} engaged users",
                item,
                owner.as_deref().unwrap_or("unknown"),
                engaged
            ))
            .await;
    }

    async fn detect_owner(&self) -> Option<String> {
        match self.surface.page_metadata().await {
            Ok(metadata) => {
                if let Some(owner) = self.extractor.owner_from_metadata(&metadata) {
                    return Some(owner);
                }
            }
            Err(e) => debug!("metadata unavailable: {}", e),
        }
        // Fall back to the most frequent profile link on the page
        match self.surface.extract_links(LinkClass::Identities).await {
            Ok(hrefs) => self.extractor.owner_from_link_majority(&hrefs),
            Err(e) => {
                debug!("identity links unavailable: {}", e);
                None
            }
        }
    }

    fn call_full(&self, scope: &RunScope<'_>) -> bool {
        scope.collected.len() >= self.settings.max_identities_per_call
    }

    async fn pause(&self, sampler: &mut Sampler, range_secs: (f64, f64)) {
        sleep(sampler.duration_between(range_secs)).await;
    }

    async fn maybe_break(&self, scope: &mut RunScope<'_>) {
        if scope.sampler.chance(self.settings.pacing.break_chance) {
            let duration = scope
                .sampler
                .duration_between(self.settings.pacing.break_secs);
            scope
                .log
                .push(format!("taking a {:.0}s break", duration.as_secs_f64()))
                .await;
            sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::config::PilotConfig;
    use crate::registry::TaskRegistry;
    use crate::surface::fake::FakeSurface;

    fn fast_settings() -> ScrapeSettings {
        let mut settings = PilotConfig::default().scrape;
        settings.pacing.page_load_secs = (0.0, 0.0);
        settings.pacing.read_content_secs = (0.0, 0.0);
        settings.pacing.between_items_secs = (0.0, 0.0);
        settings.pacing.between_groupings_secs = (0.0, 0.0);
        settings.pacing.scroll_secs = (0.0, 0.0);
        settings.pacing.engagement_secs = (0.0, 0.0);
        settings.pacing.break_chance = 0.0;
        settings.warmup_scrolls = (0, 0);
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

    async fn test_log() -> (Arc<TaskRegistry>, TaskLog) {
        let registry = Arc::new(TaskRegistry::new());
        let (record, _flag) = registry.create("scrape test").await;
        let log = TaskLog::new(Arc::clone(&registry), record.id);
        (registry, log)
    }

    fn scraper(surface: &Arc<FakeSurface>, settings: &ScrapeSettings) -> Scraper {
        Scraper::new(
            Arc::clone(surface) as Arc<dyn AutomationSurface>,
            settings,
            "https://example.com",
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_collect_gathers_owners_and_engaged_users() {
        let surface = Arc::new(FakeSurface::new());
        surface.push_links(LinkClass::Items, vec!["/p/AAA111/", "/p/BBB222/"]);
        // first item: owner via description, engaged users from links
        surface.push_metadata("A photo", "shared by @alice");
        surface.push_links(LinkClass::Engagement, vec!["/bob/", "/carol/", "/alice/"]);
        // second item: blank metadata, owner via link majority
        surface.push_metadata("", "");
        surface.push_links(LinkClass::Identities, vec!["/dave/", "/dave/", "/erin/"]);
        surface.push_links(LinkClass::Engagement, vec!["/frank/"]);

        let settings = fast_settings();
        let (_registry, log) = test_log().await;
        let mut visited = HashSet::new();
        let mut sampler = Sampler::seeded(11);
        let stop = StopFlag::new();

        let candidates = scraper(&surface, &settings)
            .collect(&test_audience(), &mut visited, &mut sampler, &stop, &log)
            .await;

        let names: Vec<&str> = candidates.iter().map(|c| c.identity.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol", "dave", "frank"]);

        let alice = candidates.iter().find(|c| c.identity == "alice").unwrap();
        assert_eq!(alice.source_kind, SourceKind::PrimaryOwner);
        assert_eq!(alice.target_key, "#one");
        assert!(alice.discovery_context.contains("/p/AAA111"));

        let bob = candidates.iter().find(|c| c.identity == "bob").unwrap();
        assert_eq!(bob.source_kind, SourceKind::EngagedUser);

        assert_eq!(visited.len(), 2);
        assert!(visited.iter().all(|v| v.starts_with("https://example.com/p/")));
    }

    #[tokio::test]
    async fn test_visited_items_never_rescraped() {
        let surface = Arc::new(FakeSurface::new());
        // both runs list the same item
        surface.push_links(LinkClass::Items, vec!["/p/AAA111/"]);
        surface.push_links(LinkClass::Items, vec!["/p/AAA111/"]);
        surface.push_metadata("x", "shared by @alice");
        surface.push_links(LinkClass::Engagement, vec![]);

        let settings = fast_settings();
        let (_registry, log) = test_log().await;
        let mut visited = HashSet::new();
        let mut sampler = Sampler::seeded(5);
        let stop = StopFlag::new();
        let scraper = scraper(&surface, &settings);

        let first = scraper
            .collect(&test_audience(), &mut visited, &mut sampler, &stop, &log)
            .await;
        assert_eq!(first.len(), 1);
        assert_eq!(visited.len(), 1);

        let second = scraper
            .collect(&test_audience(), &mut visited, &mut sampler, &stop, &log)
            .await;
        assert!(second.is_empty());
        assert_eq!(visited.len(), 1);
        assert_eq!(surface.calls_matching("navigate:"), 1);
    }

    #[tokio::test]
    async fn test_failed_item_still_marked_visited() {
        let surface = Arc::new(FakeSurface::new());
        surface.push_links(LinkClass::Items, vec!["/p/BAD111/", "/p/GOOD22/"]);
        surface.fail_navigation_containing("BAD111");
        surface.push_metadata("x", "shared by @alice");
        surface.push_links(LinkClass::Engagement, vec![]);

        let settings = fast_settings();
        let (_registry, log) = test_log().await;
        let mut visited = HashSet::new();
        let mut sampler = Sampler::seeded(2);
        let stop = StopFlag::new();

        let candidates = scraper(&surface, &settings)
            .collect(&test_audience(), &mut visited, &mut sampler, &stop, &log)
            .await;

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identity, "alice");
        // the failed item is burned, it will not be retried next run
        assert_eq!(visited.len(), 2);
        assert!(visited.iter().any(|v| v.contains("BAD111")));
    }

    #[tokio::test]
    async fn test_collect_respects_identity_cap() {
        let surface = Arc::new(FakeSurface::new());
        surface.push_links(LinkClass::Items, vec!["/p/AAA111/"]);
        surface.push_metadata("x", "shared by @alice");
        surface.push_links(
            LinkClass::Engagement,
            vec!["/u1/", "/u2/", "/u3/", "/u4/", "/u5/"],
        );

        let mut settings = fast_settings();
        settings.max_identities_per_call = 2;
        let (_registry, log) = test_log().await;
        let mut visited = HashSet::new();
        let mut sampler = Sampler::seeded(9);
        let stop = StopFlag::new();

        let candidates = scraper(&surface, &settings)
            .collect(&test_audience(), &mut visited, &mut sampler, &stop, &log)
            .await;
        assert_eq!(candidates.len(), 2);
    }

    #[tokio::test]
    async fn test_engagement_filters_invalid_identities() {
        let surface = Arc::new(FakeSurface::new());
        surface.push_links(LinkClass::Items, vec!["/p/AAA111/"]);
        surface.push_metadata("x", "shared by @alice");
        surface.push_links(
            LinkClass::Engagement,
            vec!["/explore/", "/myself/", "/a/b/", "/way too long/", "/bob/"],
        );

        let settings = fast_settings();
        let (_registry, log) = test_log().await;
        let mut visited = HashSet::new();
        let mut sampler = Sampler::seeded(4);
        let stop = StopFlag::new();
        let scraper = Scraper::new(
            Arc::clone(&surface) as Arc<dyn AutomationSurface>,
            &settings,
            "https://example.com",
            Some("myself".to_string()),
        )
        .unwrap();

        let candidates = scraper
            .collect(&test_audience(), &mut visited, &mut sampler, &stop, &log)
            .await;
        let names: Vec<&str> = candidates.iter().map(|c| c.identity.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_stop_flag_halts_collection() {
        let surface = Arc::new(FakeSurface::new());
        surface.push_links(LinkClass::Items, vec!["/p/AAA111/"]);

        let settings = fast_settings();
        let (_registry, log) = test_log().await;
        let mut visited = HashSet::new();
        let mut sampler = Sampler::seeded(6);
        let stop = StopFlag::new();
        stop.request_stop();

        let candidates = scraper(&surface, &settings)
            .collect(&test_audience(), &mut visited, &mut sampler, &stop, &log)
            .await;
        assert!(candidates.is_empty());
        assert_eq!(surface.calls_matching("navigate:"), 0);
    }
}
