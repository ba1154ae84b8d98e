use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use reqwest::Url;

use crate::engine::models::Component;
use crate::error::{LauncherError, LauncherResult};
use crate::networking::NetworkClient;

pub mod archive;
pub mod external;

use self::archive::PayloadKind;
use self::external::ExternalInstaller;

const MOD_LOADER_LABEL: &str = "mod_loader";

/// A resolved download: where to fetch it and the digest to expect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub url: Url,
    pub sha256: Option<String>,
}

impl Payload {
    pub fn new(url: Url, sha256: Option<String>) -> Self {
        Self { url, sha256 }
    }

    /// Last path segment of the URL, used to pick the payload kind.
    fn file_name(&self, fallback: &str) -> String {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or(fallback)
            .to_owned()
    }
}

/// Applies one component's payload to the installation.
pub trait ComponentInstaller {
    /// Replace `target_dir` with the payload's content.
    ///
    /// On error `target_dir` is left exactly as it was before the call.
    async fn install(&self, component: Component, payload: &Payload, target_dir: &Path) -> LauncherResult<()>;

    /// Download the mod-loader installer and run it against `runtime_dir`.
    async fn install_mod_loader(&self, payload: &Payload, runtime_dir: &Path) -> LauncherResult<()>;
}

/// Downloads into a scratch area next to the installation and swaps finished
/// trees into place.
pub struct PayloadInstaller<X> {
    network: NetworkClient,
    staging_root: PathBuf,
    external: X,
}

impl<X> PayloadInstaller<X>
where
    X: ExternalInstaller + Clone + Send + 'static,
{
    /// `staging_root` must live on the same filesystem as the install targets
    /// so the final swap is a rename.
    pub fn new(network: NetworkClient, staging_root: impl Into<PathBuf>, external: X) -> Self {
        Self {
            network,
            staging_root: staging_root.into(),
            external,
        }
    }

    /// Fresh scratch directory for one unit, discarding leftovers of a crashed run.
    fn scratch(&self, label: &str) -> LauncherResult<PathBuf> {
        let work = self.staging_root.join(label);
        if work.exists() {
            debug!("{label}: removing stale staging dir {}", work.display());
            fs::remove_dir_all(&work).map_err(|e| LauncherError::apply(label, &work, e))?;
        }
        fs::create_dir_all(&work).map_err(|e| LauncherError::apply(label, &work, e))?;
        Ok(work)
    }

    /// Where the live tree waits while its replacement is moved in. Kept
    /// outside the scratch directory so cleanup never touches it.
    fn backup_path(&self, label: &str) -> PathBuf {
        self.staging_root.join(format!("{label}.previous"))
    }

    async fn stage(&self, component: Component, payload: &Payload, work: &Path) -> LauncherResult<PathBuf> {
        let label = component.name();
        let file_name = payload.file_name(label);
        let download = work.join("download").join(&file_name);

        self.network
            .download_to_path(&payload.url, &download, label)
            .await?;

        let tree = work.join("tree");
        let sha256 = payload.sha256.clone();
        let staged = tree.clone();
        blocking(label, work, move || {
            archive::verify_payload(label, &download, sha256.as_deref())?;
            let kind = PayloadKind::from_file_name(&file_name);
            archive::unpack(label, kind, &download, &file_name, &staged)?;

            let files = archive::count_files(&staged);
            if files == 0 {
                return Err(LauncherError::corrupt(label, "payload contains no files"));
            }
            debug!("{label}: staged {files} file(s) as {kind:?}");
            Ok(())
        })
        .await?;
        Ok(tree)
    }
}

impl<X> ComponentInstaller for PayloadInstaller<X>
where
    X: ExternalInstaller + Clone + Send + 'static,
{
    async fn install(&self, component: Component, payload: &Payload, target_dir: &Path) -> LauncherResult<()> {
        let label = component.name();
        info!("install {label}: fetching {}", payload.url);
        let work = self.scratch(label)?;

        let result = match self.stage(component, payload, &work).await {
            Ok(tree) => swap_into_place(label, &tree, target_dir, &self.backup_path(label)),
            Err(err) => Err(err),
        };

        if let Err(e) = fs::remove_dir_all(&work) {
            warn!("install {label}: failed to clean {}: {e}", work.display());
        }
        if result.is_ok() {
            info!("install {label}: applied to {}", target_dir.display());
        }
        result
    }

    async fn install_mod_loader(&self, payload: &Payload, runtime_dir: &Path) -> LauncherResult<()> {
        if !runtime_dir.is_dir() {
            return Err(LauncherError::ExternalInstaller(format!(
                "game runtime missing at {}",
                runtime_dir.display()
            )));
        }
        info!("install {MOD_LOADER_LABEL}: fetching {}", payload.url);
        let work = self.scratch(MOD_LOADER_LABEL)?;
        let installer = work.join(payload.file_name("installer.jar"));

        let result = match self
            .network
            .download_to_path(&payload.url, &installer, MOD_LOADER_LABEL)
            .await
        {
            Ok(_) => {
                let external = self.external.clone();
                let sha256 = payload.sha256.clone();
                let runtime_dir = runtime_dir.to_path_buf();
                blocking(MOD_LOADER_LABEL, &work, move || {
                    archive::verify_payload(MOD_LOADER_LABEL, &installer, sha256.as_deref())?;
                    external.run(&installer, &runtime_dir)
                })
                .await
            }
            Err(err) => Err(err),
        };

        if let Err(e) = fs::remove_dir_all(&work) {
            warn!("install {MOD_LOADER_LABEL}: failed to clean {}: {e}", work.display());
        }
        result
    }
}

/// Run filesystem-heavy or process-bound work off the async workers.
async fn blocking<T, F>(label: &str, work: &Path, task: F) -> LauncherResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> LauncherResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| LauncherError::apply(label, work, io::Error::other(e)))?
}

/// Move `staged` to `target`, keeping the previous tree at `backup` until the
/// move succeeds.
///
/// A `backup` left without a `target` is the tree an earlier failed restore
/// kept; it is treated as the previous tree.
fn swap_into_place(label: &str, staged: &Path, target: &Path, backup: &Path) -> LauncherResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| LauncherError::apply(label, parent, e))?;
    }

    if target.exists() {
        if backup.exists() {
            fs::remove_dir_all(backup).map_err(|e| LauncherError::apply(label, backup, e))?;
        }
        fs::rename(target, backup).map_err(|e| LauncherError::apply(label, target, e))?;
    }
    let has_backup = backup.exists();

    if let Err(err) = fs::rename(staged, target) {
        if has_backup && let Err(restore) = fs::rename(backup, target) {
            warn!(
                "install {label}: could not restore {} from {}: {restore}",
                target.display(),
                backup.display()
            );
            return Err(LauncherError::apply(
                label,
                backup,
                io::Error::new(
                    restore.kind(),
                    format!("{err}; previous tree left at this path ({restore})"),
                ),
            ));
        }
        return Err(LauncherError::apply(label, target, err));
    }

    if has_backup && let Err(e) = fs::remove_dir_all(backup) {
        warn!("install {label}: failed to remove old tree {}: {e}", backup.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::archive::fixtures::{write_targz, write_zip};
    use super::*;

    /// Records invocations and optionally drops a marker like a real loader would.
    #[derive(Clone, Default)]
    struct FakeExternal {
        calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
        fail: bool,
    }

    impl ExternalInstaller for FakeExternal {
        fn run(&self, installer: &Path, target_dir: &Path) -> LauncherResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push((installer.to_path_buf(), target_dir.to_path_buf()));
            if self.fail {
                return Err(LauncherError::ExternalInstaller("exit status 1".into()));
            }
            fs::create_dir_all(target_dir.join("neoforge")).unwrap();
            Ok(())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        installer: PayloadInstaller<FakeExternal>,
    }

    impl Fixture {
        fn new(fail_external: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let installer = PayloadInstaller::new(
                NetworkClient::new(),
                dir.path().join("root").join(".staging"),
                FakeExternal {
                    fail: fail_external,
                    ..Default::default()
                },
            );
            Self { dir, installer }
        }

        fn target(&self, name: &str) -> PathBuf {
            self.dir.path().join("root").join(name)
        }

        fn payload(&self, file: &str) -> Payload {
            Payload::new(Url::from_file_path(self.dir.path().join(file)).unwrap(), None)
        }

        fn mirror(&self, file: &str) -> PathBuf {
            self.dir.path().join(file)
        }
    }

    #[tokio::test]
    async fn replaces_existing_tree_and_cleans_staging() {
        let fx = Fixture::new(false);
        let target = fx.target("theme");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("old.css"), b"old").unwrap();
        write_zip(&fx.mirror("theme.zip"), &[("style.css", b"body{}")]);

        fx.installer
            .install(Component::Theme, &fx.payload("theme.zip"), &target)
            .await
            .unwrap();

        assert_eq!(fs::read(target.join("style.css")).unwrap(), b"body{}");
        assert!(!target.join("old.css").exists());
        assert!(!fx.target(".staging").join("theme").exists());
    }

    #[tokio::test]
    async fn corrupt_archive_leaves_target_untouched() {
        let fx = Fixture::new(false);
        let target = fx.target("mods");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("jei.jar"), b"jar").unwrap();
        fs::write(fx.mirror("mods.zip"), b"definitely not an archive, only some bytes").unwrap();

        let err = fx
            .installer
            .install(Component::Mods, &fx.payload("mods.zip"), &target)
            .await
            .unwrap_err();

        assert!(matches!(err, LauncherError::CorruptPayload { .. }));
        assert_eq!(fs::read(target.join("jei.jar")).unwrap(), b"jar");
        assert_eq!(archive::count_files(&target), 1);
        assert!(!fx.target(".staging").join("mods").exists());
    }

    #[tokio::test]
    async fn checksum_mismatch_is_rejected_before_apply() {
        let fx = Fixture::new(false);
        let target = fx.target("assets");
        write_targz(&fx.mirror("assets.tar.gz"), &[("logo.png", b"png")]);
        let mut payload = fx.payload("assets.tar.gz");
        payload.sha256 = Some("00".repeat(32));

        let err = fx
            .installer
            .install(Component::Assets, &payload, &target)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::CorruptPayload { .. }));
        assert!(!target.exists());

        payload.sha256 = Some(archive::sha256_file(&fx.mirror("assets.tar.gz")).unwrap());
        fx.installer
            .install(Component::Assets, &payload, &target)
            .await
            .unwrap();
        assert_eq!(fs::read(target.join("logo.png")).unwrap(), b"png");
    }

    #[tokio::test]
    async fn plain_files_land_under_their_name() {
        let fx = Fixture::new(false);
        let target = fx.target("launcher");
        fs::write(fx.mirror("launcher.py"), b"print('hi')").unwrap();

        fx.installer
            .install(Component::Main, &fx.payload("launcher.py"), &target)
            .await
            .unwrap();
        assert_eq!(fs::read(target.join("launcher.py")).unwrap(), b"print('hi')");
    }

    #[tokio::test]
    async fn empty_archive_is_corrupt() {
        let fx = Fixture::new(false);
        write_zip(&fx.mirror("autre.zip"), &[]);
        let err = fx
            .installer
            .install(Component::Autre, &fx.payload("autre.zip"), &fx.target("autre"))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::CorruptPayload { .. }));
    }

    #[tokio::test]
    async fn missing_payload_is_a_download_error() {
        let fx = Fixture::new(false);
        let err = fx
            .installer
            .install(Component::Versions, &fx.payload("versions.zip"), &fx.target("versions"))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::Download { .. }));
    }

    #[tokio::test]
    async fn mod_loader_runs_delegated_installer() {
        let fx = Fixture::new(false);
        let runtime = fx.target("minecraft");
        fs::create_dir_all(&runtime).unwrap();
        fs::write(fx.mirror("neoforge-installer.jar"), b"jar bytes").unwrap();

        fx.installer
            .install_mod_loader(&fx.payload("neoforge-installer.jar"), &runtime)
            .await
            .unwrap();

        let calls = fx.installer.external.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.ends_with("neoforge-installer.jar"));
        assert_eq!(calls[0].1, runtime);
        assert!(runtime.join("neoforge").is_dir());
    }

    #[tokio::test]
    async fn mod_loader_failure_is_reported() {
        let fx = Fixture::new(true);
        let runtime = fx.target("minecraft");
        fs::create_dir_all(&runtime).unwrap();
        fs::write(fx.mirror("neoforge-installer.jar"), b"jar bytes").unwrap();

        let err = fx
            .installer
            .install_mod_loader(&fx.payload("neoforge-installer.jar"), &runtime)
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::ExternalInstaller(_)));

        let missing_runtime = fx
            .installer
            .install_mod_loader(&fx.payload("neoforge-installer.jar"), &fx.target("nowhere"))
            .await
            .unwrap_err();
        assert!(matches!(missing_runtime, LauncherError::ExternalInstaller(_)));
    }

    #[test]
    fn failed_swap_restores_previous_tree() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("root").join("theme");
        let backup = dir.path().join("root").join(".staging").join("theme.previous");
        fs::create_dir_all(target.join("css")).unwrap();
        fs::write(target.join("css").join("main.css"), b"body{color:red}").unwrap();

        let err = swap_into_place("theme", &dir.path().join("never-staged"), &target, &backup)
            .unwrap_err();

        assert!(matches!(err, LauncherError::Apply { ref path, .. } if path == &target));
        assert_eq!(
            fs::read(target.join("css").join("main.css")).unwrap(),
            b"body{color:red}"
        );
        assert_eq!(archive::count_files(&target), 1);
        assert!(!backup.exists());
    }

    #[test]
    fn leftover_backup_is_recovered_or_superseded() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("root").join("assets");
        let backup = dir.path().join("root").join(".staging").join("assets.previous");
        fs::create_dir_all(&backup).unwrap();
        fs::write(backup.join("logo.png"), b"old png").unwrap();

        // No live tree: a failed swap brings the kept tree back.
        swap_into_place("assets", &dir.path().join("never-staged"), &target, &backup).unwrap_err();
        assert_eq!(fs::read(target.join("logo.png")).unwrap(), b"old png");
        assert!(!backup.exists());

        // A stale backup next to a live tree is discarded before the swap.
        fs::create_dir_all(&backup).unwrap();
        fs::write(backup.join("stale.png"), b"stale").unwrap();
        let staged = dir.path().join("staged");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("logo.png"), b"new png").unwrap();
        swap_into_place("assets", &staged, &target, &backup).unwrap();
        assert_eq!(fs::read(target.join("logo.png")).unwrap(), b"new png");
        assert!(!backup.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn installed_runtime_is_launchable() {
        use std::time::{Duration, Instant};

        use super::archive::fixtures::write_zip_with_modes;
        use crate::engine::models::LauncherConfig;
        use crate::env::InstallLayout;
        use crate::process::LaunchSupervisor;
        use crate::storage::memory::MemoryStore;

        let fx = Fixture::new(false);
        let layout = InstallLayout::new(fx.dir.path().join("root"));
        write_zip_with_modes(
            &fx.mirror("minecraft.zip"),
            &[
                ("neoforge/marker.txt", &b"21.1.77"[..], 0o644),
                ("launch.sh", &b"#!/bin/sh\necho \"$1\" > player.txt\n"[..], 0o755),
            ],
        );

        fx.installer
            .install(Component::Minecraft, &fx.payload("minecraft.zip"), &layout.runtime_dir())
            .await
            .unwrap();

        let store = MemoryStore::default();
        let mut config = LauncherConfig::default();
        LaunchSupervisor::new(layout.clone())
            .launch(&store, &mut config, "Steve")
            .unwrap();

        let marker = layout.runtime_dir().join("player.txt");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(fs::read_to_string(marker).unwrap().trim(), "Steve");
    }
}
