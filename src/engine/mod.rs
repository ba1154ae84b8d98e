use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::engine::models::{Component, LauncherConfig, RemoteManifest, VersionRecord};
use crate::engine::planner::UpdatePlan;
use crate::engine::state::{UpdateOutcome, UpdateState};
use crate::env::InstallLayout;
use crate::error::{LauncherError, LauncherResult};
use crate::installer::{ComponentInstaller, Payload};
use crate::networking::ManifestSource;
use crate::storage::VersionStore;

pub mod models;
pub mod planner;
pub mod state;

/// Drives update cycles against one installation directory.
///
/// Cycles are sequential by construction: every entry point borrows the
/// caller's config mutably and awaits each install before the next.
pub struct UpdateOrchestrator<S, M, I> {
    store: S,
    manifests: M,
    installer: I,
    layout: InstallLayout,
}

impl<S, M, I> UpdateOrchestrator<S, M, I>
where
    S: VersionStore,
    M: ManifestSource,
    I: ComponentInstaller,
{
    pub fn new(store: S, manifests: M, installer: I, layout: InstallLayout) -> Self {
        Self {
            store,
            manifests,
            installer,
            layout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch the manifest and report what an update would install, without installing.
    pub async fn preview(&self, config: &LauncherConfig) -> LauncherResult<UpdatePlan> {
        let manifest = self.manifests.fetch_manifest().await?;
        Ok(planner::plan(&config.versions, &manifest))
    }

    /// Bring the installation in line with the remote manifest.
    ///
    /// `config` and the store are only touched when every planned component
    /// installed; any failure leaves both exactly as they were.
    pub async fn check_and_update(
        &self,
        config: &mut LauncherConfig,
        updates: &mpsc::UnboundedSender<UpdateState>,
    ) -> LauncherResult<UpdateOutcome> {
        updates.send(UpdateState::Checking).ok();
        info!("check_and_update: fetching manifest");
        let manifest = self
            .manifests
            .fetch_manifest()
            .await
            .inspect_err(|err| fail(updates, "check_and_update", err))?;

        let plan = planner::plan(&config.versions, &manifest);
        if plan.is_empty() {
            info!("check_and_update: up to date");
            updates.send(UpdateState::UpToDate).ok();
            return Ok(UpdateOutcome::UpToDate);
        }
        info!("check_and_update: plan {:?}", plan.components());
        updates
            .send(UpdateState::PlanReady {
                components: plan.components().to_vec(),
            })
            .ok();

        let mut next = config.clone();
        let result = async {
            self.install_plan(&plan, &manifest, &mut next.versions, false, updates)
                .await?;
            // Swapping the runtime replaces the loader installed inside it.
            if plan.contains(Component::Minecraft) {
                match manifest.mod_loader() {
                    Some(_) => self.install_mod_loader(&manifest, updates).await?,
                    None => warn!("check_and_update: runtime updated but manifest has no mod loader"),
                }
            }
            self.store.save(&next)
        }
        .await;
        if let Err(err) = result {
            fail(updates, "check_and_update", &err);
            return Err(err);
        }
        *config = next;

        let restart_required = plan.requires_restart();
        info!("check_and_update: done, restart required={restart_required}");
        updates
            .send(UpdateState::Installed { restart_required })
            .ok();
        Ok(UpdateOutcome::Updated {
            installed: plan.components().to_vec(),
            restart_required,
        })
    }

    /// Install every component and the mod loader on an empty installation.
    ///
    /// Success always asks for a restart; failure records nothing.
    pub async fn first_time_setup(
        &self,
        config: &mut LauncherConfig,
        updates: &mpsc::UnboundedSender<UpdateState>,
    ) -> LauncherResult<UpdateOutcome> {
        updates.send(UpdateState::Checking).ok();
        info!("first_time_setup: fetching manifest");
        let manifest = self
            .manifests
            .fetch_manifest()
            .await
            .inspect_err(|err| fail(updates, "first_time_setup", err))?;
        if manifest.mod_loader().is_none() {
            let err = LauncherError::ManifestFormat("missing entry for mod_loader".into());
            fail(updates, "first_time_setup", &err);
            return Err(err);
        }

        let plan = UpdatePlan::full();
        updates
            .send(UpdateState::PlanReady {
                components: plan.components().to_vec(),
            })
            .ok();

        let mut next = config.clone();
        let result = async {
            self.install_plan(&plan, &manifest, &mut next.versions, true, updates)
                .await?;
            self.install_mod_loader(&manifest, updates).await?;
            next.first_launch = false;
            self.store.save(&next)
        }
        .await;
        if let Err(err) = result {
            fail(updates, "first_time_setup", &err);
            return Err(err);
        }
        *config = next;

        info!("first_time_setup: installation complete");
        updates
            .send(UpdateState::Installed {
                restart_required: true,
            })
            .ok();
        Ok(UpdateOutcome::Updated {
            installed: plan.components().to_vec(),
            restart_required: true,
        })
    }

    /// Install planned components in order, stopping at the first failure.
    ///
    /// `versions` advances one component at a time; `mods` is only recorded
    /// when `record_mods` is set.
    async fn install_plan(
        &self,
        plan: &UpdatePlan,
        manifest: &RemoteManifest,
        versions: &mut VersionRecord,
        record_mods: bool,
        updates: &mpsc::UnboundedSender<UpdateState>,
    ) -> LauncherResult<()> {
        let total = plan.len();
        for (index, &component) in plan.components().iter().enumerate() {
            updates
                .send(UpdateState::Installing {
                    component,
                    index,
                    total,
                })
                .ok();
            let entry = manifest.entry(component);
            let url = manifest.resolve_payload_location(component.name())?;
            let payload = Payload::new(url, entry.sha256.clone());
            self.installer
                .install(component, &payload, &self.layout.component_dir(component))
                .await?;

            if record_mods || component != Component::Mods {
                versions.set(component, entry.version.clone());
            }
            debug!(
                "install_plan: {component} now at {} ({}/{total})",
                entry.version,
                index + 1
            );
        }
        Ok(())
    }

    async fn install_mod_loader(
        &self,
        manifest: &RemoteManifest,
        updates: &mpsc::UnboundedSender<UpdateState>,
    ) -> LauncherResult<()> {
        let Some(entry) = manifest.mod_loader() else {
            return Ok(());
        };
        updates
            .send(UpdateState::InstallingModLoader {
                version: entry.version.clone(),
            })
            .ok();
        let payload = Payload::new(manifest.resolve(entry)?, entry.sha256.clone());
        self.installer
            .install_mod_loader(&payload, &self.layout.runtime_dir())
            .await
    }
}

fn fail(updates: &mpsc::UnboundedSender<UpdateState>, stage: &str, err: &LauncherError) {
    error!("{stage}: {err}");
    updates.send(UpdateState::Failed(err.to_string())).ok();
}
