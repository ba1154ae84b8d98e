use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::models::Component;

const APP_DIR_NAME: &str = ".Industricraft";
const STAGING_DIR: &str = ".staging";
const MOD_LOADER_MARKER: &str = "neoforge";

/// Returns the per-user base directory of the installation.
pub fn default_app_dir() -> PathBuf {
    let base = match env::consts::OS {
        "windows" => env::var_os("APPDATA")
            .or_else(|| env::var_os("LOCALAPPDATA"))
            .map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Application Support")),
        _ => env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| {
                env::var_os("HOME")
                    .map(PathBuf::from)
                    .map(|home| home.join(".local").join("share"))
            }),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR_NAME)
}

/// Fixed directory layout of one installation.
#[derive(Clone, Debug)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn component_dir(&self, component: Component) -> PathBuf {
        self.root.join(component.dir_name())
    }

    /// Game runtime directory; also the working directory of the game.
    pub fn runtime_dir(&self) -> PathBuf {
        self.component_dir(Component::Minecraft)
    }

    pub fn mod_loader_marker(&self) -> PathBuf {
        self.runtime_dir().join(MOD_LOADER_MARKER)
    }

    pub fn launch_script(&self) -> PathBuf {
        let name = if cfg!(target_os = "windows") {
            "launch.bat"
        } else {
            "launch.sh"
        };
        self.runtime_dir().join(name)
    }

    /// Scratch area for downloads and staged trees; never read by the game.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Create the base directory. Component directories appear on install.
    pub fn ensure_base_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root)
    }
}

impl Default for InstallLayout {
    fn default() -> Self {
        Self::new(default_app_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_places_components_under_root() {
        let layout = InstallLayout::new("/data/.Industricraft");
        assert_eq!(
            layout.component_dir(Component::Main),
            PathBuf::from("/data/.Industricraft/launcher")
        );
        assert_eq!(
            layout.mod_loader_marker(),
            PathBuf::from("/data/.Industricraft/minecraft/neoforge")
        );
        assert!(layout.launch_script().starts_with(layout.runtime_dir()));
        assert_eq!(
            layout.staging_dir(),
            PathBuf::from("/data/.Industricraft/.staging")
        );
    }

    #[test]
    fn default_dir_ends_with_app_name() {
        assert!(default_app_dir().ends_with(APP_DIR_NAME));
    }
}
