use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::cli::config::PilotConfig;
use crate::registry::{TaskRegistry, TaskStatus};
use crate::session::{execute_session_task, SessionJob};

fn load_config(profile: Option<&str>) -> Result<PilotConfig> {
    match profile {
        Some(name) => {
            PilotConfig::load_profile(name).context(format!("Failed to load profile: {}", name))
        }
        None => PilotConfig::load_default(),
    }
}

/// Serve the control API until the process is killed
pub async fn serve(profile: Option<String>, bind: Option<String>) -> Result<()> {
    let mut config = load_config(profile.as_deref())?;
    if let Some(addr) = bind {
        config.api.bind_addr = addr;
    }

    let state = AppState {
        registry: Arc::new(TaskRegistry::new()),
        config: Arc::new(config),
    };
    api::serve(state).await
}

/// Run one session task in the foreground
pub async fn run(
    audience: String,
    user: i64,
    duration: Option<f64>,
    infinite: bool,
    targets: Option<PathBuf>,
    acting: Option<String>,
    seed: Option<u64>,
    profile: Option<String>,
) -> Result<()> {
    let config = Arc::new(load_config(profile.as_deref())?);
    let registry = Arc::new(TaskRegistry::new());
    let (record, stop) = registry
        .create(&format!("engagement session for '{}'", audience))
        .await;
    let task_id = record.id;

    let job = SessionJob {
        user_id: user,
        audience_key: audience,
        duration_secs: duration.unwrap_or(config.session.duration_secs),
        infinite,
        explore_targets: Vec::new(),
        targets_csv: targets.map(|path| path.display().to_string()),
        acting_identity: acting,
        seed,
    };

    // Ctrl-C flips the stop flag and the session winds down on its own
    let watcher = tokio::spawn({
        let registry = Arc::clone(&registry);
        let task_id = task_id.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping task {}", task_id);
                registry.request_stop(&task_id).await;
            }
        }
    });

    execute_session_task(
        Arc::clone(&registry),
        config,
        task_id.clone(),
        stop,
        job,
    )
    .await;
    watcher.abort();

    let record = registry
        .get(&task_id)
        .await
        .context("Task record disappeared")?;
    info!("task {} ended as {}", task_id, record.status);
    for line in &record.logs {
        println!("{}", line);
    }
    println!("Result: {}", record.message);

    if record.status == TaskStatus::Failed {
        bail!("session failed: {}", record.message);
    }
    Ok(())
}

/// List the audiences a session can screen against
pub async fn audiences(profile: Option<String>) -> Result<()> {
    let config = load_config(profile.as_deref())?;

    println!("Configured audiences:");
    for audience in &config.audiences {
        println!("  {} - {}", audience.key, audience.name);
        println!("    groupings: {}", audience.groupings.join(", "));
    }

    Ok(())
}

/// List all available configuration profiles
pub async fn list_profiles() -> Result<()> {
    let profiles = PilotConfig::list_profiles()?;

    println!("Available configuration profiles:");
    for profile in profiles {
        println!("  - {}", profile);
    }

    Ok(())
}

/// Manage a specific configuration profile
pub async fn manage_profile(profile_name: String) -> Result<()> {
    match PilotConfig::load_profile(&profile_name) {
        Ok(config) => {
            println!("Profile: {}", profile_name);
            println!("{:#?}", config);
        }
        Err(_) => {
            warn!(
                "Profile '{}' does not exist. Creating a default profile.",
                profile_name
            );
            let config = PilotConfig::default();
            config.save_as_profile(&profile_name)?;
            println!("Created default profile: {}", profile_name);
        }
    }

    Ok(())
}

/// Show the current configuration
pub async fn show_config() -> Result<()> {
    let config = PilotConfig::load_default()?;
    println!("Current configuration:");
    println!("{:#?}", config);

    Ok(())
}
