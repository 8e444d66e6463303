use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

const RELEASES_URL: &str = "https://api.github.com/repos/philornot/EasyModAPI/releases";
pub const RELEASE_PAGE_URL: &str = "https://github.com/philornot/EasyModAPI/releases";
const USER_AGENT: &str = "forest-modman";
const CHECK_INTERVAL: time::Duration = time::Duration::days(1);

pub type Version = (u64, u64, u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    UpToDate,
    Available { version: String, url: String },
    /// Last check is less than a day old.
    Skipped,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
}

/// Newest stable release strictly newer than `current`, as `vX.Y.Z`.
pub fn newest_release(releases: &[Release], current: &str) -> Option<String> {
    let current = parse_version(current)?;
    releases
        .iter()
        .filter(|release| !release.prerelease)
        .filter_map(|release| parse_version(&release.tag_name))
        .filter(|version| *version > current)
        .max()
        .map(|(major, minor, patch)| format!("v{major}.{minor}.{patch}"))
}

pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw
        .trim()
        .trim_start_matches('v')
        .split('-')
        .next()?
        .split('+')
        .next()?;
    let mut parts = raw.split('.').map(|part| part.parse::<u64>().ok());
    let major = parts.next().flatten()?;
    let minor = parts.next().flatten()?;
    let patch = parts.next().flatten()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// True when no check was recorded or the last one is older than a day.
pub fn is_check_due(last_check: Option<&str>, now: OffsetDateTime) -> bool {
    match last_check.and_then(parse_timestamp) {
        Some(last) => last + CHECK_INTERVAL < now,
        None => true,
    }
}

pub fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Accepts RFC 3339 and naive ISO-8601 (assumed UTC).
fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Some(dt);
    }
    let with_fraction =
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");
    if let Ok(dt) = PrimitiveDateTime::parse(trimmed, &with_fraction) {
        return Some(dt.assume_utc());
    }
    let plain = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(trimmed, &plain)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

pub fn check_for_updates(current_version: &str) -> Result<UpdateStatus> {
    let releases = fetch_releases()?;
    Ok(match newest_release(&releases, current_version) {
        Some(version) => UpdateStatus::Available {
            version,
            url: RELEASE_PAGE_URL.to_string(),
        },
        None => UpdateStatus::UpToDate,
    })
}

fn fetch_releases() -> Result<Vec<Release>> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(10))
        .timeout_write(Duration::from_secs(10))
        .build();
    let response = agent
        .get(RELEASES_URL)
        .set("User-Agent", USER_AGENT)
        .set("Accept", "application/vnd.github.v3+json")
        .call()
        .context("fetch releases")?;
    let releases: Vec<Release> = response.into_json().context("decode releases")?;
    Ok(releases)
}
