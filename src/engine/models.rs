use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::debug;
use reqwest::Url;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{LauncherError, LauncherResult};

/// Version assumed for a component that has never been installed.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Installable units of the launcher, declared in install priority order.
///
/// `Ord` follows declaration order, so sorting by it yields the order in which
/// components must be applied: later components assume earlier ones exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Main,
    Theme,
    Assets,
    Versions,
    Minecraft,
    Autre,
    Mods,
}

impl Component {
    pub const ALL: [Component; 7] = [
        Component::Main,
        Component::Theme,
        Component::Assets,
        Component::Versions,
        Component::Minecraft,
        Component::Autre,
        Component::Mods,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Component::Main => "main",
            Component::Theme => "theme",
            Component::Assets => "assets",
            Component::Versions => "versions",
            Component::Minecraft => "minecraft",
            Component::Autre => "autre",
            Component::Mods => "mods",
        }
    }

    /// Directory under the base directory that holds this component.
    pub fn dir_name(self) -> &'static str {
        match self {
            Component::Main => "launcher",
            other => other.name(),
        }
    }

    /// Mods are content only and can be swapped while the launcher runs.
    pub fn requires_restart(self) -> bool {
        self != Component::Mods
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Component {
    type Err = LauncherError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Component::ALL
            .into_iter()
            .find(|component| component.name() == value)
            .ok_or_else(|| LauncherError::UnknownComponent(value.to_owned()))
    }
}

/// Installed version of every component.
///
/// Missing or empty entries read as [`DEFAULT_VERSION`], meaning "needs
/// everything".
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "BTreeMap<String, String>")]
pub struct VersionRecord {
    versions: BTreeMap<Component, String>,
}

impl VersionRecord {
    pub fn get(&self, component: Component) -> &str {
        self.versions
            .get(&component)
            .map(String::as_str)
            .filter(|version| !version.is_empty())
            .unwrap_or(DEFAULT_VERSION)
    }

    pub fn set(&mut self, component: Component, version: impl Into<String>) {
        self.versions.insert(component, version.into());
    }
}

impl Default for VersionRecord {
    fn default() -> Self {
        let versions = Component::ALL
            .into_iter()
            .map(|component| (component, DEFAULT_VERSION.to_owned()))
            .collect();
        Self { versions }
    }
}

impl From<BTreeMap<String, String>> for VersionRecord {
    fn from(raw: BTreeMap<String, String>) -> Self {
        let mut record = VersionRecord::default();
        for (name, version) in raw {
            match name.parse::<Component>() {
                Ok(component) => record.set(component, version),
                Err(_) => debug!("versions: ignoring unknown component entry {name}"),
            }
        }
        record
    }
}

impl<S: Into<String>> FromIterator<(Component, S)> for VersionRecord {
    fn from_iter<I: IntoIterator<Item = (Component, S)>>(entries: I) -> Self {
        let mut record = VersionRecord::default();
        for (component, version) in entries {
            record.set(component, version);
        }
        record
    }
}

impl Serialize for VersionRecord {
    // Written in priority order so the file reads the same way it installs.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Component::ALL.len()))?;
        for component in Component::ALL {
            map.serialize_entry(component.name(), self.get(component))?;
        }
        map.end()
    }
}

fn default_first_launch() -> bool {
    true
}

/// Process-wide launcher state persisted as `config.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub versions: VersionRecord,
    #[serde(default = "default_first_launch")]
    pub first_launch: bool,
    #[serde(default)]
    pub username: String,
    /// ISO-8601 timestamp of the last launch request, empty if never played.
    #[serde(default)]
    pub last_played: String,
    /// Fields written by newer launchers, kept as-is on rewrite.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            versions: VersionRecord::default(),
            first_launch: true,
            username: String::new(),
            last_played: String::new(),
            extra: Map::new(),
        }
    }
}

/// One downloadable unit described by the remote manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub version: String,
    pub location: String,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Authoritative component versions and payload locations for one cycle.
#[derive(Clone, Debug)]
pub struct RemoteManifest {
    source: Url,
    components: BTreeMap<Component, ManifestEntry>,
    mod_loader: Option<ManifestEntry>,
}

const MOD_LOADER_KEY: &str = "mod_loader";

impl RemoteManifest {
    /// Parse a manifest document fetched from `source`.
    ///
    /// All seven components are required; unknown top-level keys are ignored.
    pub fn parse(source: Url, body: &str) -> LauncherResult<Self> {
        let mut document: Map<String, Value> = serde_json::from_str(body)
            .map_err(|e| LauncherError::ManifestFormat(format!("invalid JSON document: {e}")))?;

        let mut components = BTreeMap::new();
        for component in Component::ALL {
            let raw = document.remove(component.name()).ok_or_else(|| {
                LauncherError::ManifestFormat(format!("missing entry for {component}"))
            })?;
            components.insert(component, parse_entry(component.name(), raw)?);
        }

        let mod_loader = document
            .remove(MOD_LOADER_KEY)
            .map(|raw| parse_entry(MOD_LOADER_KEY, raw))
            .transpose()?;

        if !document.is_empty() {
            debug!(
                "manifest: ignoring unknown keys {:?}",
                document.keys().collect::<Vec<_>>()
            );
        }

        Ok(Self {
            source,
            components,
            mod_loader,
        })
    }

    /// Build a manifest directly from entries; every component must be present.
    #[cfg(test)]
    pub fn from_entries(
        source: Url,
        components: BTreeMap<Component, ManifestEntry>,
        mod_loader: Option<ManifestEntry>,
    ) -> LauncherResult<Self> {
        if let Some(missing) = Component::ALL
            .into_iter()
            .find(|component| !components.contains_key(component))
        {
            return Err(LauncherError::ManifestFormat(format!(
                "missing entry for {missing}"
            )));
        }
        Ok(Self {
            source,
            components,
            mod_loader,
        })
    }

    pub fn entry(&self, component: Component) -> &ManifestEntry {
        // Construction guarantees every component is present.
        &self.components[&component]
    }

    pub fn version(&self, component: Component) -> &str {
        &self.entry(component).version
    }

    pub fn mod_loader(&self) -> Option<&ManifestEntry> {
        self.mod_loader.as_ref()
    }

    /// Resolve the payload URL of a component given by name.
    pub fn resolve_payload_location(&self, name: &str) -> LauncherResult<Url> {
        let component = name.parse::<Component>()?;
        self.resolve(self.entry(component))
    }

    /// Resolve an entry's location, relative locations against the manifest URL.
    pub fn resolve(&self, entry: &ManifestEntry) -> LauncherResult<Url> {
        self.source.join(&entry.location).map_err(|e| {
            LauncherError::ManifestFormat(format!("invalid location {:?}: {e}", entry.location))
        })
    }
}

fn parse_entry(key: &str, raw: Value) -> LauncherResult<ManifestEntry> {
    let entry: ManifestEntry = serde_json::from_value(raw)
        .map_err(|e| LauncherError::ManifestFormat(format!("bad entry for {key}: {e}")))?;
    if entry.version.trim().is_empty() {
        return Err(LauncherError::ManifestFormat(format!(
            "empty version for {key}"
        )));
    }
    if entry.location.trim().is_empty() {
        return Err(LauncherError::ManifestFormat(format!(
            "empty location for {key}"
        )));
    }
    Ok(entry)
}
