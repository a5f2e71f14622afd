use anyhow::{bail, Context, Result};
use chrono::Local;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::classify::AudienceVerdict;

const TOPIC_COLUMNS: &[&str] = &["hashtag", "hashtags", "#", "tag", "tags", "topic", "topics"];
const IDENTITY_COLUMNS: &[&str] = &[
    "username",
    "usernames",
    "user",
    "users",
    "profile",
    "profiles",
    "identity",
    "identities",
];

/// What a loaded target file contains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Topics,
    Identities,
    Mixed,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Topics => write!(f, "topics"),
            TargetKind::Identities => write!(f, "identities"),
            TargetKind::Mixed => write!(f, "mixed"),
        }
    }
}

/// Targets loaded from a CSV file, normalized and merged into one list.
/// Topics carry a leading '#', identities carry no marker.
#[derive(Debug, Clone)]
pub struct TargetList {
    pub kind: TargetKind,
    pub targets: Vec<String>,
}

/// Load explore targets from a simple comma-separated file. The header row
/// decides how columns are read; a file with no recognizable header is
/// treated as identities in the first column.
pub fn load_targets(path: &Path) -> Result<TargetList> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read target file {}", path.display()))?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        bail!("Target file {} is empty", path.display());
    };

    let headers: Vec<String> = header
        .split(',')
        .map(|cell| cell.trim().to_lowercase())
        .collect();
    let topic_col = headers
        .iter()
        .position(|h| TOPIC_COLUMNS.contains(&h.as_str()));
    let identity_col = headers
        .iter()
        .position(|h| IDENTITY_COLUMNS.contains(&h.as_str()));

    let mut targets = Vec::new();
    let mut seen = HashSet::new();

    let kind = match (topic_col, identity_col) {
        (Some(topic), Some(identity)) => {
            // Mixed files are anchored on the topic column: rows without a
            // topic cell are skipped entirely.
            for line in lines {
                let cells: Vec<&str> = line.split(',').collect();
                let topic_cell = cells.get(topic).map(|c| c.trim()).unwrap_or_default();
                if topic_cell.is_empty() {
                    continue;
                }
                push_unique(&mut targets, &mut seen, normalize_topic(topic_cell));
                let identity_cell = cells.get(identity).map(|c| c.trim()).unwrap_or_default();
                if !identity_cell.is_empty() {
                    push_unique(&mut targets, &mut seen, normalize_identity(identity_cell));
                }
            }
            TargetKind::Mixed
        }
        (Some(topic), None) => {
            for line in lines {
                if let Some(cell) = line.split(',').nth(topic) {
                    push_unique(&mut targets, &mut seen, normalize_topic(cell));
                }
            }
            TargetKind::Topics
        }
        (None, Some(identity)) => {
            for line in lines {
                if let Some(cell) = line.split(',').nth(identity) {
                    push_unique(&mut targets, &mut seen, normalize_identity(cell));
                }
            }
            TargetKind::Identities
        }
        (None, None) => {
            // No recognizable header, read the first column as identities
            for line in lines {
                let cell = line.split(',').next().unwrap_or_default();
                push_unique(&mut targets, &mut seen, normalize_identity(cell));
            }
            TargetKind::Identities
        }
    };

    if targets.is_empty() {
        bail!("No targets found in {}", path.display());
    }
    debug!(
        "loaded {} targets ({}) from {}",
        targets.len(),
        kind,
        path.display()
    );
    Ok(TargetList { kind, targets })
}

fn push_unique(targets: &mut Vec<String>, seen: &mut HashSet<String>, value: String) {
    if !value.is_empty() && seen.insert(value.clone()) {
        targets.push(value);
    }
}

fn normalize_topic(cell: &str) -> String {
    let cell = cell.trim();
    if cell.is_empty() || cell.starts_with('#') {
        cell.to_string()
    } else {
        format!("#{}", cell)
    }
}

fn normalize_identity(cell: &str) -> String {
    cell.trim().trim_start_matches('@').to_string()
}

/// Write verdicts to `<dir>/<audience_key>_<timestamp>.csv`, one row per
/// distinct identity, in the order given.
pub fn export_results(
    dir: &Path,
    audience_key: &str,
    results: &[AudienceVerdict],
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}.csv", audience_key, timestamp));

    let mut csv = String::from("identity,source,audience,label,score,evidence,caveats\n");
    let mut seen = HashSet::new();
    for verdict in results {
        if !seen.insert(verdict.identity.as_str()) {
            continue;
        }
        let row = [
            verdict.identity.clone(),
            verdict.source_kind.to_string(),
            audience_key.to_string(),
            verdict.label.wire_name().to_string(),
            verdict.score.to_string(),
            verdict.evidence.join(" | "),
            verdict.caveats.join(" | "),
        ];
        let encoded: Vec<String> = row.iter().map(|cell| csv_field(cell)).collect();
        csv.push_str(&encoded.join(","));
        csv.push('\n');
    }

    fs::write(&path, csv)
        .with_context(|| format!("Failed to write export file {}", path.display()))?;
    debug!("exported {} identities to {}", seen.len(), path.display());
    Ok(path)
}

fn csv_field(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
