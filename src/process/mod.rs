use std::convert::Infallible;
use std::process::{Command, Stdio};

use chrono::Local;
use log::{debug, info, warn};

use crate::engine::models::LauncherConfig;
use crate::env::InstallLayout;
use crate::error::{LauncherError, LauncherResult};
use crate::storage::VersionStore;

/// Starts the game from a completed installation.
#[derive(Clone, Debug)]
pub struct LaunchSupervisor {
    layout: InstallLayout,
}

impl LaunchSupervisor {
    pub fn new(layout: InstallLayout) -> Self {
        Self { layout }
    }

    pub fn is_mod_loader_installed(&self) -> bool {
        self.layout.mod_loader_marker().is_dir()
    }

    /// Record the launch request and start the game detached.
    ///
    /// Nothing is written when the installation is incomplete.
    pub fn launch<S: VersionStore>(
        &self,
        store: &S,
        config: &mut LauncherConfig,
        username: &str,
    ) -> LauncherResult<()> {
        if !self.is_mod_loader_installed() {
            warn!(
                "launch: mod loader missing at {}",
                self.layout.mod_loader_marker().display()
            );
            return Err(LauncherError::NotInstalled("mod loader".into()));
        }
        let script = self.layout.launch_script();
        if !script.is_file() {
            warn!("launch: entry point missing at {}", script.display());
            return Err(LauncherError::NotInstalled(format!(
                "launch script {}",
                script.display()
            )));
        }

        config.username = username.to_owned();
        config.last_played = Local::now().to_rfc3339();
        store.save(config)?;

        info!("launch: starting game for player {username}");
        let runtime_dir = self.layout.runtime_dir();
        debug!(
            "launch: script={} cwd={}",
            script.display(),
            runtime_dir.display()
        );

        let mut cmd = if cfg!(target_os = "windows") {
            let mut command = Command::new("cmd");
            command.arg("/C").arg(&script);
            command
        } else {
            Command::new(&script)
        };
        cmd.arg(username)
            .current_dir(&runtime_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            // CREATE_NEW_CONSOLE
            cmd.creation_flags(0x00000010);
        }

        cmd.spawn()
            .map_err(|e| LauncherError::Launch(format!("failed to start {}: {e}", script.display())))?;
        info!("launch: process started");
        Ok(())
    }
}

/// Replace the running launcher with a fresh instance using the same arguments.
pub fn restart() -> LauncherResult<Infallible> {
    let exe = std::env::current_exe().map_err(|e| LauncherError::Restart(e.to_string()))?;
    let args: Vec<_> = std::env::args_os().skip(1).collect();
    info!("restart: re-executing {}", exe.display());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Only returns on failure.
        let err = Command::new(&exe).args(&args).exec();
        Err(LauncherError::Restart(err.to_string()))
    }

    #[cfg(not(unix))]
    {
        Command::new(&exe)
            .args(&args)
            .spawn()
            .map_err(|e| LauncherError::Restart(e.to_string()))?;
        std::process::exit(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    #[test]
    fn refuses_without_mod_loader() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        std::fs::create_dir_all(layout.runtime_dir()).unwrap();
        let store = MemoryStore::default();
        let mut config = LauncherConfig::default();

        let supervisor = LaunchSupervisor::new(layout);
        assert!(!supervisor.is_mod_loader_installed());
        let err = supervisor.launch(&store, &mut config, "Steve").unwrap_err();

        assert!(matches!(err, LauncherError::NotInstalled(_)));
        assert_eq!(config.username, "");
        assert_eq!(store.saves.get(), 0);
    }

    #[test]
    fn refuses_without_launch_script() {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        std::fs::create_dir_all(layout.mod_loader_marker()).unwrap();
        let store = MemoryStore::default();
        let mut config = LauncherConfig::default();

        let supervisor = LaunchSupervisor::new(layout);
        assert!(supervisor.is_mod_loader_installed());
        let err = supervisor.launch(&store, &mut config, "Steve").unwrap_err();
        assert!(matches!(err, LauncherError::NotInstalled(what) if what.contains("launch")));
        assert!(config.last_played.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn records_request_and_runs_script_in_runtime_dir() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::{Duration, Instant};

        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        std::fs::create_dir_all(layout.mod_loader_marker()).unwrap();
        let script = layout.launch_script();
        std::fs::write(&script, "#!/bin/sh\necho \"$1\" > player.txt\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = MemoryStore::default();
        let mut config = LauncherConfig::default();
        LaunchSupervisor::new(layout.clone())
            .launch(&store, &mut config, "Alex")
            .unwrap();

        assert_eq!(config.username, "Alex");
        assert!(chrono::DateTime::parse_from_rfc3339(&config.last_played).is_ok());
        assert_eq!(store.current().unwrap(), config);

        let marker = layout.runtime_dir().join("player.txt");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        // The shell may still be flushing when the file first appears.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "Alex");
    }
}
