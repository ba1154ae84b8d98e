use std::path::PathBuf;

use thiserror::Error;

/// Every failure the launcher core can report.
///
/// Installer-level variants (`Download`, `CorruptPayload`, `Apply`,
/// `ExternalInstaller`) abort an update cycle but never the process; config
/// variants are fatal to the whole run.
#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed manifest: {0}")]
    ManifestFormat(String),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("corrupt payload for {component}: {reason}")]
    CorruptPayload { component: String, reason: String },

    #[error("failed to apply {component} at {path:?}: {source}")]
    Apply {
        component: String,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("external installer failed: {0}")]
    ExternalInstaller(String),

    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("config file {path:?} is unreadable: {reason}")]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("config io error at {path:?}: {source}")]
    Config {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to launch game: {0}")]
    Launch(String),

    #[error("failed to restart launcher: {0}")]
    Restart(String),
}

pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    pub fn apply(component: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Apply {
            component: component.into(),
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(component: impl Into<String>, reason: impl Into<String>) -> Self {
        LauncherError::CorruptPayload {
            component: component.into(),
            reason: reason.into(),
        }
    }

    pub fn download(url: impl Into<String>, reason: impl ToString) -> Self {
        LauncherError::Download {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
