use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::orchestrator::{Orchestrator, RunOutcome};
use super::sampler::Sampler;
use crate::cli::config::{AudienceProfile, PilotConfig};
use crate::inference::OllamaClient;
use crate::registry::{StopFlag, TaskLog, TaskRegistry, TaskStatus};
use crate::storage::{dataset, CredentialStore, PgCredentialStore};
use crate::surface::{AutomationSurface, WebDriverSurface};

/// Everything a session task needs beyond the shared config
#[derive(Debug, Clone)]
pub struct SessionJob {
    pub user_id: i64,
    pub audience_key: String,
    pub duration_secs: f64,
    pub infinite: bool,
    pub explore_targets: Vec<String>,
    pub targets_csv: Option<String>,
    pub acting_identity: Option<String>,
    pub seed: Option<u64>,
}

/// Entry point for spawned session tasks. Owns the registry record's
/// lifecycle: Running on entry, then Completed, Stopped or Failed.
pub async fn execute_session_task(
    registry: Arc<TaskRegistry>,
    config: Arc<PilotConfig>,
    task_id: String,
    stop: StopFlag,
    job: SessionJob,
) {
    registry
        .update(&task_id, |record| {
            record.status = TaskStatus::Running;
            record.message = format!("session running for audience '{}'", job.audience_key);
        })
        .await;
    let log = TaskLog::new(Arc::clone(&registry), task_id.clone());

    match drive(&config, &log, &stop, &job).await {
        Ok(outcome) => {
            let status = if outcome.cancelled {
                TaskStatus::Stopped
            } else {
                TaskStatus::Completed
            };
            let message = format!(
                "{} sessions, {} scrolls, {} likes, {} profiles visited",
                outcome.sessions,
                outcome.stats.scrolls,
                outcome.stats.likes,
                outcome.stats.profiles_visited
            );
            info!("task {} finished: {}", task_id, message);
            registry
                .update(&task_id, |record| {
                    record.status = status;
                    record.message = message;
                    record.result = serde_json::to_value(&outcome).ok();
                })
                .await;
        }
        Err(e) => {
            error!("task {} failed: {:#}", task_id, e);
            registry
                .update(&task_id, |record| {
                    record.status = TaskStatus::Failed;
                    record.message = format!("{:#}", e);
                })
                .await;
        }
    }
}

async fn drive(
    config: &PilotConfig,
    log: &TaskLog,
    stop: &StopFlag,
    job: &SessionJob,
) -> Result<RunOutcome> {
    let audience = config
        .audiences
        .iter()
        .find(|profile| profile.key == job.audience_key)
        .cloned()
        .ok_or_else(|| anyhow!("unknown audience '{}'", job.audience_key))?;

    let mut explore_targets = job.explore_targets.clone();
    if let Some(path) = &job.targets_csv {
        let list = dataset::load_targets(Path::new(path))?;
        log.push(format!(
            "loaded {} {} from {}",
            list.targets.len(),
            list.kind,
            path
        ))
        .await;
        explore_targets.extend(list.targets);
    }

    let store = PgCredentialStore::connect(&config.credentials)
        .await
        .context("Failed to connect to credential store")?;
    let cookies = store.fetch_latest(job.user_id).await?.ok_or_else(|| {
        anyhow!(
            "no stored cookies for user {}; save a session first",
            job.user_id
        )
    })?;
    log.push(format!(
        "restored {} cookies for user {}",
        cookies.len(),
        job.user_id
    ))
    .await;

    let driver = WebDriverSurface::connect(&config.surface).await?;
    if let Err(e) = driver.restore_cookies(&cookies).await {
        if let Err(close_err) = driver.close().await {
            debug!("browser close failed: {}", close_err);
        }
        return Err(e);
    }
    let surface: Arc<dyn AutomationSurface> = Arc::new(driver);

    // The browser must come down on every path from here on
    let result = run_sessions(
        Arc::clone(&surface),
        config,
        audience,
        explore_targets,
        log,
        stop,
        job,
    )
    .await;
    if let Err(e) = surface.close().await {
        debug!("browser close failed: {}", e);
    }
    result
}

async fn run_sessions(
    surface: Arc<dyn AutomationSurface>,
    config: &PilotConfig,
    audience: AudienceProfile,
    explore_targets: Vec<String>,
    log: &TaskLog,
    stop: &StopFlag,
    job: &SessionJob,
) -> Result<RunOutcome> {
    let inference = Arc::new(OllamaClient::new(&config.classify.inference)?);
    let sampler = match job.seed {
        Some(seed) => Sampler::seeded(seed),
        None => Sampler::new(),
    };
    let mut orchestrator = Orchestrator::new(
        surface,
        inference,
        config,
        audience,
        explore_targets,
        job.acting_identity.clone(),
        sampler,
        log.clone(),
        stop.clone(),
    )?;

    if job.infinite {
        orchestrator.run_infinite().await
    } else {
        let duration = Duration::from_secs_f64(job.duration_secs.max(0.0));
        let outcome = orchestrator.run_session(duration).await?;
        Ok(RunOutcome {
            stats: outcome.stats,
            sessions: 1,
            cancelled: outcome.cancelled,
        })
    }
}
