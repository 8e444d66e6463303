use crate::{
    config::{AppPaths, ArchiveRecord, Settings},
    game,
    installer::{self, InstallLock, InstallReport, InstallStrategy, Installer},
    lang::{self, Language, Message},
    library::{self, ArchiveInfo},
    update::{self, UpdateStatus},
};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub install_root: Option<PathBuf>,
    pub install_root_valid: bool,
    pub mod_dir: Option<PathBuf>,
    pub installed_files: usize,
    pub archives: Vec<ArchiveInfo>,
    pub language: &'static str,
    pub egg_chance: u8,
}

/// Owns the loaded settings; every state change goes through here and is
/// saved before returning.
pub struct App {
    pub paths: AppPaths,
    pub settings: Settings,
}

impl App {
    pub fn initialize(paths: AppPaths) -> Result<Self> {
        std::fs::create_dir_all(&paths.mods_cache).context("create mods cache")?;
        let settings = Settings::load(&paths)?;
        Ok(Self { paths, settings })
    }

    pub fn language(&self) -> Language {
        self.settings.language()
    }

    pub fn text(&self, message: Message) -> &'static str {
        lang::text(self.language(), message)
    }

    pub fn format(&self, message: Message, args: &[(&str, &str)]) -> String {
        lang::format(self.language(), message, args)
    }

    fn save(&self) -> Result<()> {
        self.settings.save(&self.paths)
    }

    /// Verifies `path` and stores it as the install root. The stored value is
    /// left alone when verification fails.
    pub fn select_install_root(&mut self, path: &Path) -> Result<PathBuf> {
        let root = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let valid = installer::verify_install_root(&root)
            .with_context(|| format!("inspect {}", root.display()))?;
        if !valid {
            warn!("invalid MODAPI folder structure: {}", root.display());
            bail!("{}", self.text(Message::InvalidRoot));
        }
        info!("selected MODAPI folder {}", root.display());
        self.settings.install_root = Some(root.clone());
        self.save()?;
        Ok(root)
    }

    pub fn clear_install_root(&mut self) -> Result<()> {
        self.settings.install_root = None;
        self.save()
    }

    fn require_install_root(&self) -> Result<PathBuf> {
        self.settings
            .current_install_root()
            .map(Path::to_path_buf)
            .ok_or_else(|| anyhow!("{}", self.text(Message::SelectRootFirst)))
    }

    pub fn import_archive(&mut self, source: &Path) -> Result<PathBuf> {
        self.require_install_root()?;
        let cached = library::import_archive(&self.paths, &mut self.settings, source)?;
        self.save()?;
        Ok(cached)
    }

    pub fn remove_archive(&mut self, filename: &str) -> Result<bool> {
        let existed = library::remove_archive(&self.paths, &mut self.settings, filename)?;
        self.save()?;
        Ok(existed)
    }

    /// Lists imported archives after dropping records whose copy vanished.
    pub fn archives(&mut self) -> Result<Vec<ArchiveInfo>> {
        if !library::prune_missing(&self.paths, &mut self.settings).is_empty() {
            self.save()?;
        }
        Ok(self
            .settings
            .archives
            .iter()
            .map(|record| library::describe(&self.paths, record))
            .collect())
    }

    /// `target` is either the name of an imported archive or a path to a ZIP,
    /// which is imported first. Installation always reads the managed copy.
    pub fn install(&mut self, target: &str, strategy: InstallStrategy) -> Result<InstallReport> {
        let root = self.require_install_root()?;
        let archive = self.resolve_archive(target)?;

        let _lock = InstallLock::acquire(&self.paths.install_lock)?;
        let report = Installer::new(root)
            .with_strategy(strategy)
            .install(&archive)?;
        info!(
            files = report.files,
            removed = report.removed,
            "mods installed from {}",
            archive.display()
        );
        Ok(report)
    }

    fn resolve_archive(&mut self, target: &str) -> Result<PathBuf> {
        if let Some(ArchiveRecord { filename, .. }) = self.settings.find_archive(target) {
            return library::managed_copy(&self.paths, filename);
        }
        let candidate = Path::new(target);
        if candidate.is_file() {
            return self.import_archive(candidate);
        }
        bail!("no imported archive named {target}")
    }

    pub fn mods_folder(&self) -> Result<PathBuf> {
        let root = self.require_install_root()?;
        let mod_dir = game::mod_dir(&root);
        if !mod_dir.is_dir() {
            bail!("{}", self.text(Message::ModsFolderMissing));
        }
        Ok(mod_dir)
    }

    pub fn status(&mut self) -> Result<Status> {
        let archives = self.archives()?;
        let root = self.settings.install_root.clone();
        let valid = match root.as_deref() {
            Some(root) => installer::verify_install_root(root).unwrap_or(false),
            None => false,
        };
        let mod_dir = root.as_deref().map(game::mod_dir);
        let installed_files = match (&mod_dir, valid) {
            (Some(dir), true) => WalkDir::new(dir)
                .min_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .count(),
            _ => 0,
        };
        Ok(Status {
            install_root: root,
            install_root_valid: valid,
            mod_dir,
            installed_files,
            archives,
            language: self.language().code(),
            egg_chance: self.settings.egg_chance,
        })
    }

    pub fn set_language(&mut self, language: Language) -> Result<()> {
        info!("changing language to {}", language.code());
        self.settings.set_language(language);
        self.save()
    }

    pub fn toggle_language(&mut self) -> Result<Language> {
        let next = self.language().toggled();
        self.set_language(next)?;
        Ok(next)
    }

    pub fn set_egg_chance(&mut self, chance: u32) -> Result<u8> {
        self.settings.set_egg_chance(chance);
        self.save()?;
        Ok(self.settings.egg_chance)
    }

    pub fn should_show_tutorial(&self) -> bool {
        !self.settings.tutorial_shown
    }

    pub fn set_tutorial_shown(&mut self, shown: bool) -> Result<()> {
        self.settings.tutorial_shown = shown;
        self.save()
    }

    /// Runs at most once a day unless `force`. Network failures are logged
    /// and reported as up to date.
    pub fn check_for_updates(&mut self, force: bool) -> Result<UpdateStatus> {
        let last = self.settings.last_update_check.as_deref();
        if !force && !update::is_check_due(last, OffsetDateTime::now_utc()) {
            return Ok(UpdateStatus::Skipped);
        }

        let status = match update::check_for_updates(env!("CARGO_PKG_VERSION")) {
            Ok(status) => status,
            Err(err) => {
                warn!("failed to check for updates: {err:#}");
                UpdateStatus::UpToDate
            }
        };
        self.settings.last_update_check = Some(update::now_timestamp());
        self.save()?;
        Ok(status)
    }
}
