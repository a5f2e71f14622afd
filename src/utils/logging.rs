use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber: filtered console output plus an optional
/// plain-text file mirror.
pub fn init_logging(verbose: bool, log_file: Option<PathBuf>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("feedpilot={}", level).parse()?)
        .add_directive("warn".parse()?);

    let console = fmt::layer().with_target(true).with_span_events(FmtSpan::CLOSE);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }
            // Append so a restarted daemon keeps earlier history
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let file_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(file);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console)
                .init();
        }
    }

    Ok(())
}

/// Default log path under the platform data directory
pub fn default_log_file() -> PathBuf {
    let mut path = match directories::ProjectDirs::from("com", "feed-pilot", "feed-pilot") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => PathBuf::from("./logs"),
    };
    path.push("feedpilot.log");
    path
}
