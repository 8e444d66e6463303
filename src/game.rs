use std::path::{Path, PathBuf};

pub const GAME_NAME: &str = "TheForest";
pub const DISPLAY_NAME: &str = "The Forest";
const MODS_DIR: &str = "mods";

/// Relative location of the game's mod folder beneath a ModAPI root.
pub fn mod_subpath() -> PathBuf {
    Path::new(MODS_DIR).join(GAME_NAME)
}

pub fn mod_dir(install_root: &Path) -> PathBuf {
    install_root.join(mod_subpath())
}

pub fn mods_parent(install_root: &Path) -> PathBuf {
    install_root.join(MODS_DIR)
}

pub fn staging_dir(install_root: &Path) -> PathBuf {
    mods_parent(install_root).join(format!(".{GAME_NAME}.staging"))
}

pub fn previous_dir(install_root: &Path) -> PathBuf {
    mods_parent(install_root).join(format!(".{GAME_NAME}.previous"))
}
