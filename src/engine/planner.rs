use crate::engine::models::{Component, RemoteManifest, VersionRecord};

/// Components that need fetching this cycle, in install priority order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    components: Vec<Component>,
}

impl UpdatePlan {
    /// Every component, regardless of installed versions.
    pub fn full() -> Self {
        Self {
            components: Component::ALL.to_vec(),
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn contains(&self, component: Component) -> bool {
        self.components.contains(&component)
    }

    /// True when any planned component changes launcher code or data in use.
    pub fn requires_restart(&self) -> bool {
        self.components.iter().any(|c| c.requires_restart())
    }
}

/// Compare installed versions against the manifest.
///
/// Plain string inequality decides: `"1.0.0"` vs `"0.9.9"` is as much an
/// update as `"1.0.0"` vs `"1.0.1"`.
pub fn plan(local: &VersionRecord, remote: &RemoteManifest) -> UpdatePlan {
    let components = Component::ALL
        .into_iter()
        .filter(|&component| local.get(component) != remote.version(component))
        .collect();
    UpdatePlan { components }
}
