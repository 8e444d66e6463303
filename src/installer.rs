use crate::{
    archive::{self, ArchiveError, ExtractError},
    game,
};
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{debug, info, warn};

const STALE_LOCK_AFTER: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid install root {}: expected {} inside it", .root.display(), game::mod_subpath().display())]
    InvalidInstallRoot { root: PathBuf },
    #[error("could not inspect install root {}: {source}", .root.display())]
    VerifyFailed {
        root: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a valid ZIP archive: {source}", .path.display())]
    InvalidArchive {
        path: PathBuf,
        #[source]
        source: ArchiveError,
    },
    #[error("failed to clear {}: {source}", .path.display())]
    ClearFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to extract into {}: {source}", .dest.display())]
    ExtractFailed {
        dest: PathBuf,
        #[source]
        source: ExtractError,
    },
    #[error("failed to swap staged mods into {}: {source}", .dest.display())]
    SwapFailed {
        dest: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("another install is already running (lock {})", .lock.display())]
    Busy { lock: PathBuf },
    #[error("could not take install lock {}: {source}", .lock.display())]
    LockFailed {
        lock: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStrategy {
    /// Clear the live folder, then extract into it.
    #[default]
    Destructive,
    /// Extract beside the live folder and swap it in once extraction succeeded.
    Staged,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub strategy: InstallStrategy,
    pub mod_dir: PathBuf,
    pub removed: usize,
    pub files: usize,
    pub dirs: usize,
}

/// `Ok(false)` when the root or its `mods/TheForest` folder is missing.
/// Only unexpected I/O failures are errors.
pub fn verify_install_root(root: &Path) -> io::Result<bool> {
    if !is_existing_dir(root)? {
        return Ok(false);
    }
    is_existing_dir(&game::mod_dir(root))
}

fn is_existing_dir(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_dir()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

pub struct Installer {
    root: PathBuf,
    strategy: InstallStrategy,
}

impl Installer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            strategy: InstallStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: InstallStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn mod_dir(&self) -> PathBuf {
        game::mod_dir(&self.root)
    }

    pub fn verify(&self) -> Result<(), InstallError> {
        match verify_install_root(&self.root) {
            Ok(true) => Ok(()),
            Ok(false) => Err(InstallError::InvalidInstallRoot {
                root: self.root.clone(),
            }),
            Err(source) => Err(InstallError::VerifyFailed {
                root: self.root.clone(),
                source,
            }),
        }
    }

    pub fn install(&self, zip_path: &Path) -> Result<InstallReport, InstallError> {
        self.verify()?;
        let entries =
            archive::validate(zip_path).map_err(|source| InstallError::InvalidArchive {
                path: zip_path.to_path_buf(),
                source,
            })?;
        info!(
            archive = %zip_path.display(),
            entries,
            strategy = ?self.strategy,
            "installing mods"
        );

        match self.strategy {
            InstallStrategy::Destructive => self.install_in_place(zip_path),
            InstallStrategy::Staged => self.install_staged(zip_path),
        }
    }

    fn install_in_place(&self, zip_path: &Path) -> Result<InstallReport, InstallError> {
        let mod_dir = self.mod_dir();
        let removed = clear_dir(&mod_dir).map_err(|source| InstallError::ClearFailed {
            path: mod_dir.clone(),
            source,
        })?;
        debug!(removed, "cleared mod folder");

        let stats =
            archive::extract(zip_path, &mod_dir).map_err(|source| InstallError::ExtractFailed {
                dest: mod_dir.clone(),
                source,
            })?;

        Ok(InstallReport {
            strategy: InstallStrategy::Destructive,
            mod_dir,
            removed,
            files: stats.files,
            dirs: stats.dirs,
        })
    }

    fn install_staged(&self, zip_path: &Path) -> Result<InstallReport, InstallError> {
        let mod_dir = self.mod_dir();
        let staging = game::staging_dir(&self.root);
        let previous = game::previous_dir(&self.root);

        for leftover in [&staging, &previous] {
            remove_path(leftover).map_err(|source| InstallError::ClearFailed {
                path: leftover.clone(),
                source,
            })?;
        }
        fs::create_dir(&staging).map_err(|source| InstallError::ExtractFailed {
            dest: staging.clone(),
            source: ExtractError::Write {
                path: staging.clone(),
                source,
            },
        })?;

        let stats = match archive::extract(zip_path, &staging) {
            Ok(stats) => stats,
            Err(source) => {
                if let Err(err) = remove_path(&staging) {
                    warn!("failed to remove staging folder: {err}");
                }
                return Err(InstallError::ExtractFailed {
                    dest: staging,
                    source,
                });
            }
        };

        let removed = count_entries(&mod_dir).map_err(|source| InstallError::ClearFailed {
            path: mod_dir.clone(),
            source,
        })?;
        fs::rename(&mod_dir, &previous).map_err(|source| InstallError::SwapFailed {
            dest: mod_dir.clone(),
            source,
        })?;
        if let Err(source) = fs::rename(&staging, &mod_dir) {
            if let Err(err) = fs::rename(&previous, &mod_dir) {
                warn!("failed to restore previous mod folder: {err}");
            }
            return Err(InstallError::SwapFailed {
                dest: mod_dir,
                source,
            });
        }
        if let Err(err) = remove_path(&previous) {
            warn!("failed to remove previous mod folder {}: {err}", previous.display());
        }

        Ok(InstallReport {
            strategy: InstallStrategy::Staged,
            mod_dir,
            removed,
            files: stats.files,
            dirs: stats.dirs,
        })
    }
}

/// Removes every entry directly inside `dir`; stops at the first failure.
fn clear_dir(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}

fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn count_entries(dir: &Path) -> io::Result<usize> {
    Ok(fs::read_dir(dir)?.count())
}

/// Exclusive install lock held for the duration of one install.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
}

impl InstallLock {
    pub fn acquire(path: &Path) -> Result<Self, InstallError> {
        match Self::create(path) {
            Ok(lock) => return Ok(lock),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
            Err(source) => {
                return Err(InstallError::LockFailed {
                    lock: path.to_path_buf(),
                    source,
                })
            }
        }

        if !lock_is_stale(path) {
            return Err(InstallError::Busy {
                lock: path.to_path_buf(),
            });
        }
        warn!("reclaiming stale install lock {}", path.display());
        let _ = fs::remove_file(path);
        Self::create(path).map_err(|source| InstallError::LockFailed {
            lock: path.to_path_buf(),
            source,
        })
    }

    fn create(path: &Path) -> io::Result<Self> {
        use std::io::Write;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        writeln!(file, "{} {stamp}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// A lock is stale when its recorded owner is gone. When liveness cannot be
/// determined, fall back to the lock's age.
fn lock_is_stale(path: &Path) -> bool {
    let owner = fs::read_to_string(path).ok().and_then(|raw| parse_lock_owner(&raw));
    if let Some(alive) = owner.and_then(process_alive) {
        return !alive;
    }
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(|age| age > STALE_LOCK_AFTER)
        .unwrap_or(false)
}

fn parse_lock_owner(raw: &str) -> Option<u32> {
    raw.split_whitespace().next()?.parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> Option<bool> {
    Some(Path::new("/proc").join(pid.to_string()).exists())
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> Option<bool> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::write_zip;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn game_root(temp: &TempDir) -> PathBuf {
        let root = temp.path().join("game");
        fs::create_dir_all(game::mod_dir(&root)).unwrap();
        root
    }

    /// Relative path -> contents (`None` for directories).
    fn snapshot(dir: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
        WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .map(|entry| {
                let rel = entry
                    .path()
                    .strip_prefix(dir)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                let data = entry
                    .file_type()
                    .is_file()
                    .then(|| fs::read(entry.path()).unwrap());
                (rel, data)
            })
            .collect()
    }

    #[test]
    fn verify_reports_missing_structure_as_false() {
        let temp = TempDir::new().unwrap();
        assert!(!verify_install_root(&temp.path().join("missing")).unwrap());

        let bare = temp.path().join("bare");
        fs::create_dir_all(bare.join("mods")).unwrap();
        assert!(!verify_install_root(&bare).unwrap());

        let root = game_root(&temp);
        assert!(verify_install_root(&root).unwrap());
    }

    #[test]
    fn verify_rejects_file_in_place_of_mod_dir() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("game");
        fs::create_dir_all(root.join("mods")).unwrap();
        fs::write(game::mod_dir(&root), "not a dir").unwrap();

        assert!(!verify_install_root(&root).unwrap());
    }

    #[test]
    fn install_replaces_old_files() {
        let temp = TempDir::new().unwrap();
        let root = game_root(&temp);
        let mod_dir = game::mod_dir(&root);
        fs::write(mod_dir.join("old.dll"), "old").unwrap();
        let zip_path = temp.path().join("new.zip");
        write_zip(&zip_path, &[("new.dll", b"new")]);

        let report = Installer::new(&root).install(&zip_path).unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.files, 1);
        assert!(!mod_dir.join("old.dll").exists());
        assert_eq!(
            snapshot(&mod_dir),
            BTreeMap::from([("new.dll".to_string(), Some(b"new".to_vec()))])
        );
    }

    #[test]
    fn install_refuses_missing_root_and_creates_nothing() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let zip_path = temp.path().join("mods.zip");
        write_zip(&zip_path, &[("new.dll", b"new")]);

        let err = Installer::new(&missing).install(&zip_path).unwrap_err();

        assert!(matches!(err, InstallError::InvalidInstallRoot { .. }));
        assert!(!missing.exists());
    }

    #[test]
    fn install_rejects_fake_zip_before_clearing() {
        let temp = TempDir::new().unwrap();
        let root = game_root(&temp);
        let mod_dir = game::mod_dir(&root);
        fs::write(mod_dir.join("keep.dll"), "keep").unwrap();
        fs::create_dir(mod_dir.join("cfg")).unwrap();
        fs::write(mod_dir.join("cfg/settings.ini"), "a=1").unwrap();
        let before = snapshot(&mod_dir);
        let fake = temp.path().join("mods.zip");
        fs::write(&fake, "PK but not really").unwrap();

        let err = Installer::new(&root).install(&fake).unwrap_err();

        assert!(matches!(err, InstallError::InvalidArchive { .. }));
        assert_eq!(snapshot(&mod_dir), before);
    }

    #[test]
    fn install_rejects_escaping_entries_before_clearing() {
        let temp = TempDir::new().unwrap();
        let root = game_root(&temp);
        let mod_dir = game::mod_dir(&root);
        fs::write(mod_dir.join("keep.dll"), "keep").unwrap();
        let zip_path = temp.path().join("evil.zip");
        write_zip(&zip_path, &[("ok.dll", b"ok"), ("../../outside.dll", b"x")]);

        let err = Installer::new(&root).install(&zip_path).unwrap_err();

        assert!(matches!(err, InstallError::InvalidArchive { .. }));
        assert!(mod_dir.join("keep.dll").exists());
        assert!(!root.join("outside.dll").exists());
    }

    #[test]
    fn install_twice_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let root = game_root(&temp);
        let zip_path = temp.path().join("mods.zip");
        write_zip(&zip_path, &[("a.dll", b"a"), ("lib/b.dll", b"b")]);
        let installer = Installer::new(&root);

        installer.install(&zip_path).unwrap();
        let first = snapshot(&installer.mod_dir());
        installer.install(&zip_path).unwrap();

        assert_eq!(snapshot(&installer.mod_dir()), first);
    }

    #[test]
    fn installing_b_after_a_leaves_only_b() {
        let temp = TempDir::new().unwrap();
        let root = game_root(&temp);
        let zip_a = temp.path().join("a.zip");
        let zip_b = temp.path().join("b.zip");
        write_zip(&zip_a, &[("a.dll", b"a"), ("shared/x.cfg", b"from a"), ("only_a/", b"")]);
        write_zip(&zip_b, &[("b.dll", b"b"), ("shared/x.cfg", b"from b")]);
        let installer = Installer::new(&root);

        installer.install(&zip_a).unwrap();
        installer.install(&zip_b).unwrap();

        assert_eq!(
            snapshot(&installer.mod_dir()),
            BTreeMap::from([
                ("b.dll".to_string(), Some(b"b".to_vec())),
                ("shared".to_string(), None),
                ("shared/x.cfg".to_string(), Some(b"from b".to_vec())),
            ])
        );
    }

    #[test]
    fn staged_install_matches_destructive_result() {
        let temp = TempDir::new().unwrap();
        let root = game_root(&temp);
        fs::write(game::mod_dir(&root).join("old.dll"), "old").unwrap();
        let zip_path = temp.path().join("mods.zip");
        write_zip(&zip_path, &[("new.dll", b"new"), ("assets/tex.png", b"png")]);

        let report = Installer::new(&root)
            .with_strategy(InstallStrategy::Staged)
            .install(&zip_path)
            .unwrap();

        assert_eq!(report.strategy, InstallStrategy::Staged);
        assert_eq!(report.removed, 1);
        assert_eq!(
            snapshot(&game::mod_dir(&root)),
            BTreeMap::from([
                ("assets".to_string(), None),
                ("assets/tex.png".to_string(), Some(b"png".to_vec())),
                ("new.dll".to_string(), Some(b"new".to_vec())),
            ])
        );
        assert!(!game::staging_dir(&root).exists());
        assert!(!game::previous_dir(&root).exists());
    }

    #[test]
    fn staged_extract_failure_keeps_live_folder() {
        let temp = TempDir::new().unwrap();
        let root = game_root(&temp);
        let mod_dir = game::mod_dir(&root);
        fs::write(mod_dir.join("old.dll"), "old").unwrap();
        let zip_path = temp.path().join("broken.zip");
        // `a` is written as a file, so `a/b` cannot get its parent directory.
        write_zip(&zip_path, &[("a", b"file"), ("a/b", b"nested")]);

        let err = Installer::new(&root)
            .with_strategy(InstallStrategy::Staged)
            .install(&zip_path)
            .unwrap_err();

        assert!(matches!(err, InstallError::ExtractFailed { .. }));
        assert_eq!(
            snapshot(&mod_dir),
            BTreeMap::from([("old.dll".to_string(), Some(b"old".to_vec()))])
        );
        assert!(!game::staging_dir(&root).exists());
        assert!(!game::previous_dir(&root).exists());
    }

    #[test]
    fn destructive_extract_failure_leaves_partial_folder() {
        let temp = TempDir::new().unwrap();
        let root = game_root(&temp);
        let mod_dir = game::mod_dir(&root);
        fs::write(mod_dir.join("old.dll"), "old").unwrap();
        let zip_path = temp.path().join("broken.zip");
        write_zip(&zip_path, &[("a", b"file"), ("a/b", b"nested")]);

        let err = Installer::new(&root).install(&zip_path).unwrap_err();

        assert!(matches!(err, InstallError::ExtractFailed { .. }));
        assert!(!mod_dir.join("old.dll").exists());
        assert_eq!(fs::read(mod_dir.join("a")).unwrap(), b"file");
        assert!(!mod_dir.join("a/b").exists());
    }

    #[test]
    fn lock_owned_by_live_process_is_never_stale() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("install.lock");
        fs::write(&lock_path, format!("{} 0\n", std::process::id())).unwrap();
        filetime::set_file_mtime(&lock_path, filetime::FileTime::from_unix_time(0, 0)).unwrap();

        let result = InstallLock::acquire(&lock_path);

        if cfg!(target_os = "linux") {
            assert!(matches!(result, Err(InstallError::Busy { .. })));
        } else {
            assert!(result.is_ok());
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn lock_left_by_dead_process_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("install.lock");
        fs::write(&lock_path, format!("{} 0\n", u32::MAX)).unwrap();

        let lock = InstallLock::acquire(&lock_path).unwrap();

        let owner = parse_lock_owner(&fs::read_to_string(&lock_path).unwrap());
        assert_eq!(owner, Some(std::process::id()));
        drop(lock);
    }

    #[test]
    fn ownerless_lock_falls_back_to_age() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("install.lock");
        fs::write(&lock_path, "garbage").unwrap();

        assert!(matches!(
            InstallLock::acquire(&lock_path),
            Err(InstallError::Busy { .. })
        ));

        filetime::set_file_mtime(&lock_path, filetime::FileTime::from_unix_time(0, 0)).unwrap();
        assert!(InstallLock::acquire(&lock_path).is_ok());
    }

    #[test]
    fn lock_rejects_second_holder_until_dropped() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("install.lock");

        let first = InstallLock::acquire(&lock_path).unwrap();
        assert!(matches!(
            InstallLock::acquire(&lock_path),
            Err(InstallError::Busy { .. })
        ));
        drop(first);

        assert!(!lock_path.exists());
        assert!(InstallLock::acquire(&lock_path).is_ok());
    }
}
