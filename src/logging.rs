use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use time::{macros::format_description, OffsetDateTime};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const MAX_LOG_FILES: usize = 15;
const LOG_PREFIX: &str = "mod_manager_";

/// Installs the global subscriber: a DEBUG file log under `logs_dir` plus a
/// stderr layer driven by `RUST_LOG` (`warn` unless `verbose`).
pub fn init(logs_dir: &Path, verbose: bool) -> Result<PathBuf> {
    fs::create_dir_all(logs_dir).context("create logs dir")?;
    cleanup_old_logs(logs_dir, MAX_LOG_FILES.saturating_sub(1))?;

    let log_path = logs_dir.join(log_file_name(OffsetDateTime::now_utc()));
    let file = fs::File::create(&log_path).context("create log file")?;

    let default_level = if verbose { "debug" } else { "warn" };
    let stderr_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new("debug"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("install log subscriber")?;
    Ok(log_path)
}

fn log_file_name(now: OffsetDateTime) -> String {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now.format(&format).unwrap_or_default();
    format!("{LOG_PREFIX}{stamp}.log")
}

/// Deletes the oldest log files until at most `keep` remain.
pub fn cleanup_old_logs(logs_dir: &Path, keep: usize) -> Result<usize> {
    let mut logs = list_logs(logs_dir)?;
    if logs.len() <= keep {
        return Ok(0);
    }
    logs.sort_by_key(|(_, modified)| *modified);
    let excess = logs.len() - keep;
    for (path, _) in logs.iter().take(excess) {
        fs::remove_file(path).with_context(|| format!("remove old log {}", path.display()))?;
    }
    Ok(excess)
}

pub fn latest_log(logs_dir: &Path) -> Option<PathBuf> {
    list_logs(logs_dir)
        .ok()?
        .into_iter()
        .max_by_key(|(_, modified)| *modified)
        .map(|(path, _)| path)
}

fn list_logs(logs_dir: &Path) -> Result<Vec<(PathBuf, std::time::SystemTime)>> {
    if !logs_dir.exists() {
        return Ok(Vec::new());
    }
    let mut logs = Vec::new();
    for entry in fs::read_dir(logs_dir).context("read logs dir")? {
        let entry = entry.context("read logs dir entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("log") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .context("stat log file")?;
        logs.push((path, modified));
    }
    Ok(logs)
}
