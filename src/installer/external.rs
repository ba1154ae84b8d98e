use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};

use crate::error::{LauncherError, LauncherResult};

/// Runs a downloaded installer against an installation directory.
pub trait ExternalInstaller {
    fn run(&self, installer: &Path, target_dir: &Path) -> LauncherResult<()>;
}

/// Mod-loader installers in headless client mode.
///
/// `.jar` installers run through `java -jar`; anything else is executed
/// directly. Both receive `--install-client <target_dir>`.
#[derive(Clone, Debug)]
pub struct HeadlessInstaller {
    java: PathBuf,
}

impl HeadlessInstaller {
    pub fn new(java: impl Into<PathBuf>) -> Self {
        Self { java: java.into() }
    }

    fn command(&self, installer: &Path, target_dir: &Path) -> Command {
        let is_jar = installer
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"));
        let mut cmd = if is_jar {
            let mut cmd = Command::new(&self.java);
            cmd.arg("-jar").arg(installer);
            cmd
        } else {
            Command::new(installer)
        };
        cmd.arg("--install-client").arg(target_dir);
        if let Some(parent) = installer.parent() {
            cmd.current_dir(parent);
        }
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl Default for HeadlessInstaller {
    fn default() -> Self {
        Self::new("java")
    }
}

impl ExternalInstaller for HeadlessInstaller {
    fn run(&self, installer: &Path, target_dir: &Path) -> LauncherResult<()> {
        let mut cmd = self.command(installer, target_dir);
        info!(
            "external installer: running {} into {}",
            installer.display(),
            target_dir.display()
        );

        let output = cmd.output().map_err(|e| {
            LauncherError::ExternalInstaller(format!("failed to run {}: {e}", installer.display()))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(LauncherError::ExternalInstaller(format!(
                "{} exited with {}: {}",
                installer.display(),
                output.status,
                if stderr.trim().is_empty() {
                    stdout.trim().to_owned()
                } else {
                    stderr.trim().to_owned()
                }
            )));
        }
        debug!(
            "external installer: output {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}
