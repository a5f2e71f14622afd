use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use super::sampler::Sampler;
use super::state::{SessionState, SessionStats};
use crate::classify::{AudienceClassifier, AudienceLabel};
use crate::cli::config::{AudienceProfile, PhaseSettings, PilotConfig, SessionSettings};
use crate::inference::InferenceService;
use crate::registry::{StopFlag, TaskLog};
use crate::scrape::Scraper;
use crate::storage::dataset;
use crate::surface::{AutomationSurface, ScrollDirection, SearchKind};

/// Outcome of a single bounded session
#[derive(Debug)]
pub struct SessionOutcome {
    pub stats: SessionStats,
    pub cancelled: bool,
    pub queued_remaining: usize,
    pub total_enqueued: u64,
}

/// Outcome of a whole run, one or more sessions
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub stats: SessionStats,
    pub sessions: u32,
    pub cancelled: bool,
}

/// Drives engagement sessions: a scrolling heartbeat with at most one
/// conditional phase per cycle, explore before scrape-trigger before visit.
pub struct Orchestrator {
    surface: Arc<dyn AutomationSurface>,
    classifier: AudienceClassifier,
    scraper: Scraper,
    audience: AudienceProfile,
    explore_targets: Vec<String>,
    phases: PhaseSettings,
    session: SessionSettings,
    sampler: Sampler,
    log: TaskLog,
    stop: StopFlag,
}

impl Orchestrator {
    pub fn new(
        surface: Arc<dyn AutomationSurface>,
        inference: Arc<dyn InferenceService>,
        config: &PilotConfig,
        audience: AudienceProfile,
        explore_targets: Vec<String>,
        acting_identity: Option<String>,
        sampler: Sampler,
        log: TaskLog,
        stop: StopFlag,
    ) -> Result<Self> {
        let classifier = AudienceClassifier::new(inference, &config.classify);
        let scraper = Scraper::new(
            Arc::clone(&surface),
            &config.scrape,
            &config.surface.base_url,
            acting_identity,
        )?;

        Ok(Self {
            surface,
            classifier,
            scraper,
            audience,
            explore_targets,
            phases: config.phases.clone(),
            session: config.session.clone(),
            sampler,
            log,
            stop,
        })
    }

    /// One bounded session over fresh state
    pub async fn run_session(&mut self, duration: Duration) -> Result<SessionOutcome> {
        let mut state = SessionState::new(self.phases.scrape_trigger.queue_cap);
        let started = Instant::now();
        let mut cancelled = false;
        self.log
            .push(format!(
                "session started: {:.0}s planned, {} explore targets, audience '{}'",
                duration.as_secs_f64(),
                self.explore_targets.len(),
                self.audience.key
            ))
            .await;

        while started.elapsed() < duration {
            if self.stop.is_stopped() {
                cancelled = true;
                self.log.push("stop requested, ending session").await;
                break;
            }

            state.stats.scrolls += 1;
            debug!(
                "scroll #{} | {:.0}s/{:.0}s | {} likes | {} queued | {} visited",
                state.stats.scrolls,
                started.elapsed().as_secs_f64(),
                duration.as_secs_f64(),
                state.stats.likes,
                state.queue_len(),
                state.stats.profiles_visited
            );
            self.scroll_once(&mut state).await;

            // At most one conditional phase per cycle
            let explored = self.try_explore(&mut state).await;
            if !explored {
                let scraped = self.try_scrape_trigger(&mut state).await?;
                if !scraped {
                    self.try_visit(&mut state).await;
                }
            }
        }

        if self.stop.is_stopped() {
            cancelled = true;
        }
        self.log
            .push(format!(
                "session complete: {} scrolls, {} likes, {} explores, {} scrape runs, {} visits, {} still queued",
                state.stats.scrolls,
                state.stats.likes,
                state.stats.explores,
                state.stats.scrape_triggers,
                state.stats.profiles_visited,
                state.queue_len()
            ))
            .await;

        Ok(SessionOutcome {
            stats: state.stats.clone(),
            cancelled,
            queued_remaining: state.queue_len(),
            total_enqueued: state.total_enqueued,
        })
    }

    /// Run sessions until stopped, resting in between. The rest sleep is
    /// taken in small increments so a stop lands within one poll interval.
    pub async fn run_infinite(&mut self) -> Result<RunOutcome> {
        let mut total = SessionStats::default();
        let mut sessions = 0u32;
        let mut cancelled = false;
        self.log
            .push(format!(
                "infinite mode: {:.0}-{:.0}s active, {:.0}-{:.0}s rest",
                self.session.active_range_secs.0,
                self.session.active_range_secs.1,
                self.session.rest_range_secs.0,
                self.session.rest_range_secs.1
            ))
            .await;

        while !self.stop.is_stopped() {
            sessions += 1;
            let active = self.sampler.duration_between(self.session.active_range_secs);
            self.log.push(format!("session #{} starting", sessions)).await;
            let outcome = self.run_session(active).await?;
            total.absorb(&outcome.stats);
            if outcome.cancelled {
                cancelled = true;
                break;
            }

            let rest = self.sampler.duration_between(self.session.rest_range_secs);
            self.log.push(format!("resting {:.0}s", rest.as_secs_f64())).await;
            let rest_started = Instant::now();
            while rest_started.elapsed() < rest {
                if self.stop.is_stopped() {
                    break;
                }
                let remaining = rest.saturating_sub(rest_started.elapsed());
                let step =
                    Duration::from_secs_f64(self.session.rest_poll_secs.max(0.01)).min(remaining);
                sleep(step).await;
            }
            if self.stop.is_stopped() {
                cancelled = true;
                break;
            }
        }

        if self.stop.is_stopped() {
            cancelled = true;
        }
        self.log
            .push(format!(
                "run ended after {} sessions: {} scrolls, {} likes, {} visits",
                sessions, total.scrolls, total.likes, total.profiles_visited
            ))
            .await;

        Ok(RunOutcome {
            stats: total,
            sessions,
            cancelled,
        })
    }

    async fn scroll_once(&mut self, state: &mut SessionState) {
        let back_chance = self.phases.scroll.back_chance;
        let like_range = self.phases.scroll.like_chance;
        let pause_range = self.phases.scroll.pause_secs;
        let back_pause = self.phases.scroll.back_pause_secs;

        if let Err(e) = self.surface.scroll_step(ScrollDirection::Down).await {
            debug!("scroll failed: {}", e);
            return;
        }
        self.pause(pause_range).await;

        // Occasionally drift back up before continuing
        if self.sampler.chance(back_chance) {
            if self.surface.scroll_step(ScrollDirection::Up).await.is_ok() {
                self.pause(back_pause).await;
                let _ = self.surface.scroll_step(ScrollDirection::Down).await;
                self.pause(back_pause).await;
            }
        }

        let like_chance = self.sampler.between(like_range);
        if self.sampler.chance(like_chance) {
            match self.surface.attempt_like().await {
                Ok(true) => {
                    state.stats.likes += 1;
                    debug!("liked a feed item ({} total)", state.stats.likes);
                }
                Ok(false) => {}
                Err(e) => debug!("like failed: {}", e),
            }
        }
    }

    async fn try_explore(&mut self, state: &mut SessionState) -> bool {
        let explore = self.phases.explore.clone();
        let eligible = self.sampler.chance(explore.chance)
            && state.last_explore.elapsed().as_secs_f64() >= explore.cooldown_secs
            && !self.explore_targets.is_empty();
        if !eligible {
            return false;
        }

        // Counter and cooldown advance even if the search goes nowhere
        state.stats.explores += 1;
        state.last_explore = Instant::now();

        let Some(target) = self.sampler.pick(&self.explore_targets).cloned() else {
            return true;
        };
        let kind = if target.starts_with('#') {
            SearchKind::Topic
        } else {
            SearchKind::Identity
        };
        self.log.push(format!("exploring {}", target)).await;

        match self.surface.search(&target, kind).await {
            Ok(true) => {
                self.pause(explore.settle_secs).await;
                let scrolls = self.sampler.count(explore.page_scrolls);
                let likes = self
                    .scroll_page(scrolls, explore.page_back_chance, explore.page_like_chance, state)
                    .await;
                self.log
                    .push(format!("explored {} with {} scrolls, {} likes", target, scrolls, likes))
                    .await;
            }
            Ok(false) => {
                self.log.push(format!("nothing found for {}", target)).await;
            }
            Err(e) => {
                self.log.push(format!("explore failed for {}: {}", target, e)).await;
            }
        }
        self.go_home().await;
        true
    }

    async fn try_scrape_trigger(&mut self, state: &mut SessionState) -> Result<bool> {
        let trigger = self.phases.scrape_trigger.clone();
        let eligible = state.queue_has_room()
            && self.sampler.chance(trigger.chance)
            && state.last_scrape.elapsed().as_secs_f64() >= trigger.cooldown_secs;
        if !eligible {
            return Ok(false);
        }

        state.stats.scrape_triggers += 1;
        state.last_scrape = Instant::now();
        self.log
            .push(format!(
                "scrape run #{} starting ({} items already seen)",
                state.stats.scrape_triggers,
                state.visited_items.len()
            ))
            .await;

        let candidates = self
            .scraper
            .collect(
                &self.audience,
                &mut state.visited_items,
                &mut self.sampler,
                &self.stop,
                &self.log,
            )
            .await;
        if candidates.is_empty() {
            self.log.push("scrape found nothing new").await;
            self.go_home().await;
            return Ok(true);
        }

        let verdicts = self.classifier.classify(&self.audience, &candidates).await;
        let ideal = verdicts
            .iter()
            .filter(|v| v.label == AudienceLabel::Ideal)
            .count();
        let possible = verdicts
            .iter()
            .filter(|v| v.label == AudienceLabel::Possible)
            .count();
        self.log
            .push(format!(
                "classified {}: {} ideal, {} possible, {} non-target",
                verdicts.len(),
                ideal,
                possible,
                verdicts.len() - ideal - possible
            ))
            .await;

        if trigger.export_results && !verdicts.is_empty() {
            let path = dataset::export_results(
                Path::new(&trigger.export_dir),
                &self.audience.key,
                &verdicts,
            )?;
            self.log
                .push(format!("exported verdicts to {}", path.display()))
                .await;
        }

        // Verdicts arrive best first, so stop at the first label below the
        // visit threshold
        let min_rank = trigger.visit_min_label.rank();
        let mut queued = 0u32;
        for verdict in &verdicts {
            if verdict.label.rank() > min_rank || !state.queue_has_room() {
                break;
            }
            if state.enqueue_visit(&verdict.identity) {
                queued += 1;
            }
        }
        self.log
            .push(format!(
                "queued {} identities to visit ({} waiting)",
                queued,
                state.queue_len()
            ))
            .await;
        self.go_home().await;
        Ok(true)
    }

    async fn try_visit(&mut self, state: &mut SessionState) -> bool {
        let visit = self.phases.visit.clone();
        let eligible = state.queue_len() > 0
            && self.sampler.chance(visit.chance)
            && state.last_visit.elapsed().as_secs_f64() >= visit.cooldown_secs;
        if !eligible {
            return false;
        }
        let Some(identity) = state.dequeue_visit() else {
            return false;
        };

        // Counter and cooldown advance whether or not the profile is found
        state.stats.profiles_visited += 1;
        state.last_visit = Instant::now();
        self.log
            .push(format!(
                "visiting @{} ({} still queued)",
                identity,
                state.queue_len()
            ))
            .await;

        match self.surface.search(&identity, SearchKind::Identity).await {
            Ok(true) => {
                self.pause(visit.settle_secs).await;
                let scrolls = self.sampler.count(visit.page_scrolls);
                self.scroll_page(scrolls, 0.0, visit.page_like_chance, state).await;
                match self.surface.click_follow(&identity).await {
                    Ok(true) => self.log.push(format!("followed @{}", identity)).await,
                    Ok(false) => debug!("no follow control for @{}", identity),
                    Err(e) => debug!("follow failed for @{}: {}", identity, e),
                }
            }
            Ok(false) => {
                self.log.push(format!("could not find @{}", identity)).await;
            }
            Err(e) => {
                self.log
                    .push(format!("visit failed for @{}: {}", identity, e))
                    .await;
            }
        }
        self.go_home().await;
        self.pause(visit.after_visit_secs).await;
        true
    }

    /// Scroll a secondary page with its own back and like chances. Returns
    /// how many likes landed.
    async fn scroll_page(
        &mut self,
        scrolls: u32,
        back_chance: f64,
        like_chance: f64,
        state: &mut SessionState,
    ) -> u64 {
        let mut likes = 0u64;
        for _ in 0..scrolls {
            if self.stop.is_stopped() {
                break;
            }
            if self.surface.scroll_step(ScrollDirection::Down).await.is_err() {
                break;
            }
            self.pause(self.phases.scroll.pause_secs).await;

            if self.sampler.chance(back_chance) {
                let _ = self.surface.scroll_step(ScrollDirection::Up).await;
                self.pause(self.phases.scroll.back_pause_secs).await;
                let _ = self.surface.scroll_step(ScrollDirection::Down).await;
            }
            if self.sampler.chance(like_chance) {
                if let Ok(true) = self.surface.attempt_like().await {
                    likes += 1;
                    state.stats.likes += 1;
                }
            }
        }
        likes
    }

    async fn go_home(&mut self) {
        if let Err(e) = self.surface.go_home().await {
            debug!("could not return home: {}", e);
        }
        self.pause(self.phases.scroll.pause_secs).await;
    }

    async fn pause(&mut self, range_secs: (f64, f64)) {
        sleep(self.sampler.duration_between(range_secs)).await;
    }
}
