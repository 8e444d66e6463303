use crate::{
    archive,
    config::{AppPaths, ArchiveRecord, Settings},
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::{
    fs,
    path::{Component, Path, PathBuf},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};

/// Display view of one imported archive.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub name: String,
    pub path: PathBuf,
    pub imported_at: Option<String>,
    pub size: u64,
    /// `None` when the cached copy can no longer be read as a ZIP.
    pub entries: Option<usize>,
}

pub fn cached_path(paths: &AppPaths, filename: &str) -> PathBuf {
    paths.mods_cache.join(filename)
}

/// True for a bare file name such as `mods.zip`: one normal component, no
/// separators, no `..`, no root.
pub fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Cached copy for a recorded archive. Records that name anything other than
/// a file directly inside the cache are refused.
pub fn managed_copy(paths: &AppPaths, filename: &str) -> Result<PathBuf> {
    if !is_plain_file_name(filename) {
        bail!("archive record {filename:?} does not name a file in the mods cache");
    }
    Ok(cached_path(paths, filename))
}

/// Copies `source` into the managed cache and records it. A previous copy
/// with the same file name is overwritten. The caller saves `settings`.
pub fn import_archive(paths: &AppPaths, settings: &mut Settings, source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        bail!("{} is not a file", source.display());
    }
    let filename = source
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .context("archive has no file name")?;
    archive::validate(source).with_context(|| format!("check {}", source.display()))?;

    fs::create_dir_all(&paths.mods_cache).context("create mods cache")?;
    let target = cached_path(paths, &filename);
    if !same_file(source, &target) {
        fs::copy(source, &target).context("copy archive into cache")?;
    }
    info!("copied mod file to {}", target.display());

    let imported_at = now_rfc3339();
    match settings
        .archives
        .iter_mut()
        .find(|record| record.filename == filename)
    {
        Some(record) => record.imported_at = imported_at,
        None => settings.archives.push(ArchiveRecord {
            imported_at,
            ..ArchiveRecord::new(filename)
        }),
    }
    Ok(target)
}

/// Forgets the record and deletes the cached copy; never touches anything
/// outside the cache. Returns whether a record existed.
pub fn remove_archive(paths: &AppPaths, settings: &mut Settings, filename: &str) -> Result<bool> {
    let before = settings.archives.len();
    settings.archives.retain(|record| record.filename != filename);
    let existed = settings.archives.len() != before;

    match managed_copy(paths, filename) {
        Ok(path) if path.is_file() => {
            fs::remove_file(&path).context("remove cached archive")?;
            info!("removed mod file {filename}");
        }
        Ok(_) => {}
        Err(err) => warn!("not deleting {filename}: {err}"),
    }
    Ok(existed)
}

/// Drops records whose cached file has disappeared. Returns the dropped names.
pub fn prune_missing(paths: &AppPaths, settings: &mut Settings) -> Vec<String> {
    let mut dropped = Vec::new();
    settings.archives.retain(|record| {
        let keep = cached_path(paths, &record.filename).is_file();
        if !keep {
            warn!("mod file not found: {}", record.filename);
            dropped.push(record.filename.clone());
        }
        keep
    });
    dropped
}

pub fn describe(paths: &AppPaths, record: &ArchiveRecord) -> ArchiveInfo {
    let path = cached_path(paths, &record.filename);
    let size = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
    let entries = archive::entry_count(&path).ok();
    ArchiveInfo {
        name: record.filename.clone(),
        path,
        imported_at: record.imported_at.clone(),
        size,
        entries,
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn now_rfc3339() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_zip;
    use tempfile::TempDir;

    fn setup() -> (TempDir, AppPaths, Settings) {
        let temp = TempDir::new().unwrap();
        let paths = AppPaths::under(&temp.path().join("home"));
        (temp, paths, Settings::default())
    }

    #[test]
    fn import_copies_into_cache_and_records_once() {
        let (temp, paths, mut settings) = setup();
        let original = temp.path().join("mods.zip");
        write_zip(&original, &[("a.dll", b"a")]);

        let cached = import_archive(&paths, &mut settings, &original).unwrap();
        import_archive(&paths, &mut settings, &original).unwrap();

        assert_eq!(cached, paths.mods_cache.join("mods.zip"));
        assert_eq!(fs::read(&cached).unwrap(), fs::read(&original).unwrap());
        assert_eq!(settings.archives.len(), 1);
        assert_eq!(settings.archives[0].filename, "mods.zip");
        assert!(settings.archives[0].imported_at.is_some());
    }

    #[test]
    fn import_rejects_non_zip() {
        let (temp, paths, mut settings) = setup();
        let fake = temp.path().join("mods.zip");
        fs::write(&fake, "text").unwrap();

        assert!(import_archive(&paths, &mut settings, &fake).is_err());
        assert!(settings.archives.is_empty());
        assert!(!paths.mods_cache.join("mods.zip").exists());
    }

    #[test]
    fn reimport_with_same_name_overwrites_copy() {
        let (temp, paths, mut settings) = setup();
        let first_dir = temp.path().join("first");
        let second_dir = temp.path().join("second");
        fs::create_dir_all(&first_dir).unwrap();
        fs::create_dir_all(&second_dir).unwrap();
        write_zip(&first_dir.join("mods.zip"), &[("a.dll", b"a")]);
        write_zip(&second_dir.join("mods.zip"), &[("b.dll", b"b"), ("c.dll", b"c")]);

        import_archive(&paths, &mut settings, &first_dir.join("mods.zip")).unwrap();
        let cached = import_archive(&paths, &mut settings, &second_dir.join("mods.zip")).unwrap();

        assert_eq!(archive::entry_count(&cached).unwrap(), 2);
        assert_eq!(settings.archives.len(), 1);
    }

    #[test]
    fn remove_deletes_cache_copy_but_not_original() {
        let (temp, paths, mut settings) = setup();
        let original = temp.path().join("mods.zip");
        write_zip(&original, &[("a.dll", b"a")]);
        let cached = import_archive(&paths, &mut settings, &original).unwrap();

        assert!(remove_archive(&paths, &mut settings, "mods.zip").unwrap());

        assert!(!cached.exists());
        assert!(original.exists());
        assert!(settings.archives.is_empty());
        assert!(!remove_archive(&paths, &mut settings, "mods.zip").unwrap());
    }

    #[test]
    fn remove_ignores_names_outside_cache() {
        let (temp, paths, mut settings) = setup();
        let outside = temp.path().join("home").join("precious.zip");
        fs::create_dir_all(outside.parent().unwrap()).unwrap();
        write_zip(&outside, &[("a.dll", b"a")]);

        remove_archive(&paths, &mut settings, "../../precious.zip").unwrap();

        assert!(outside.exists());
    }

    #[test]
    fn only_bare_names_map_into_cache() {
        let (_temp, paths, _) = setup();

        assert!(is_plain_file_name("mods.zip"));
        assert!(!is_plain_file_name("../mods.zip"));
        assert!(!is_plain_file_name("sub/mods.zip"));
        assert!(!is_plain_file_name("/tmp/mods.zip"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(""));

        assert_eq!(
            managed_copy(&paths, "mods.zip").unwrap(),
            paths.mods_cache.join("mods.zip")
        );
        assert!(managed_copy(&paths, "../outside.zip").is_err());
    }

    #[test]
    fn prune_drops_records_without_files() {
        let (temp, paths, mut settings) = setup();
        let original = temp.path().join("kept.zip");
        write_zip(&original, &[("a.dll", b"a")]);
        import_archive(&paths, &mut settings, &original).unwrap();
        settings.archives.push(ArchiveRecord::new("gone.zip"));

        let dropped = prune_missing(&paths, &mut settings);

        assert_eq!(dropped, vec!["gone.zip".to_string()]);
        assert_eq!(settings.archives.len(), 1);
        assert_eq!(settings.archives[0].filename, "kept.zip");
    }

    #[test]
    fn describe_reads_entry_count_lazily() {
        let (temp, paths, mut settings) = setup();
        let original = temp.path().join("pack.zip");
        write_zip(&original, &[("a.dll", b"a"), ("b.dll", b"bb")]);
        import_archive(&paths, &mut settings, &original).unwrap();

        let info = describe(&paths, &settings.archives[0]);

        assert_eq!(info.name, "pack.zip");
        assert_eq!(info.entries, Some(2));
        assert!(info.size > 0);
    }
}
