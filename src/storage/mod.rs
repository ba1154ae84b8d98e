use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::engine::models::LauncherConfig;
use crate::error::{LauncherError, LauncherResult};

const CONFIG_FILE: &str = "config.json";

/// Durable home of the launcher config and its version record.
pub trait VersionStore {
    /// Read the persisted config, creating and persisting the default when absent.
    fn load(&self) -> LauncherResult<LauncherConfig>;

    /// Replace the persisted config. Readers see either the old or the new document.
    fn save(&self, config: &LauncherConfig) -> LauncherResult<()>;
}

/// `config.json` in the launcher base directory.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LauncherError {
        LauncherError::Config {
            path: self.path.clone(),
            source,
        }
    }
}

impl VersionStore for JsonFileStore {
    fn load(&self) -> LauncherResult<LauncherConfig> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    "storage: no config at {}, writing defaults",
                    self.path.display()
                );
                let config = LauncherConfig::default();
                self.save(&config)?;
                return Ok(config);
            }
            Err(err) => return Err(self.io_error(err)),
        };

        let config = serde_json::from_slice(&bytes).map_err(|e| LauncherError::ConfigCorrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        debug!("storage: loaded {}", self.path.display());
        Ok(config)
    }

    fn save(&self, config: &LauncherConfig) -> LauncherResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let mut body = serde_json::to_vec_pretty(config).map_err(|e| LauncherError::ConfigCorrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        body.push(b'\n');

        // Write a sibling then rename over the target so a crash never leaves
        // a truncated document behind.
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| self.io_error(e))?;
        file.write_all(&body).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            self.io_error(e)
        })?;
        debug!("storage: saved {}", self.path.display());
        Ok(())
    }
}
