use std::fmt;

use crate::engine::models::Component;

// Progress of an update cycle, published to whoever presents it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateState {
    Checking,
    UpToDate,
    PlanReady {
        components: Vec<Component>,
    },
    Installing {
        component: Component,
        index: usize,
        total: usize,
    },
    InstallingModLoader {
        version: String,
    },
    Installed {
        restart_required: bool,
    },
    Failed(String),
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateState::Checking => f.write_str("Checking for updates..."),
            UpdateState::UpToDate => f.write_str("The launcher is up to date."),
            UpdateState::PlanReady { components } => {
                write!(f, "{} update(s) available:", components.len())?;
                for component in components {
                    write!(f, "\n  - {component}")?;
                }
                Ok(())
            }
            UpdateState::Installing {
                component,
                index,
                total,
            } => write!(f, "[{}/{}] Installing {component}...", index + 1, total),
            UpdateState::InstallingModLoader { version } => {
                write!(f, "Installing mod loader {version}...")
            }
            UpdateState::Installed { restart_required } => {
                if *restart_required {
                    f.write_str("Updates installed, restarting the launcher to apply them...")
                } else {
                    f.write_str("Mods updated successfully.")
                }
            }
            UpdateState::Failed(reason) => write!(f, "Update failed: {reason}"),
        }
    }
}

/// Result of a completed cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    Updated {
        installed: Vec<Component>,
        restart_required: bool,
    },
}

impl UpdateOutcome {
    pub fn restart_required(&self) -> bool {
        matches!(
            self,
            UpdateOutcome::Updated {
                restart_required: true,
                ..
            }
        )
    }
}
