//! Tree configuration and the key-value stores backing persisted state.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, warn};

use super::errors::TreeError;

const TAG_SETTING_PREFIX: &str = "armTag.";

/// How the cloud tree partitions resources under each source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum GroupBySetting {
    #[default]
    ResourceGroup,
    ResourceType,
    Location,
    /// Group by the value of the named tag.
    Tag(String),
}

impl FromStr for GroupBySetting {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resourceGroup" => Ok(Self::ResourceGroup),
            "resourceType" => Ok(Self::ResourceType),
            "location" => Ok(Self::Location),
            _ => match s.strip_prefix(TAG_SETTING_PREFIX) {
                Some(tag) if !tag.is_empty() => Ok(Self::Tag(tag.to_string())),
                _ => Err(TreeError::UnknownGroupBy(s.to_string())),
            },
        }
    }
}

impl fmt::Display for GroupBySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResourceGroup => write!(f, "resourceGroup"),
            Self::ResourceType => write!(f, "resourceType"),
            Self::Location => write!(f, "location"),
            Self::Tag(tag) => write!(f, "{}{}", TAG_SETTING_PREFIX, tag),
        }
    }
}

impl GroupBySetting {
    /// Parse a setting value, falling back to the default on unknown input.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_else(|e| {
            warn!("{}; grouping by resource group", e);
            Self::default()
        })
    }
}

impl Serialize for GroupBySetting {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for GroupBySetting {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

fn deserialize_group_by_lenient<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<GroupBySetting, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(GroupBySetting::parse_or_default(&value))
}

/// Which settings store holds the pinned item list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PinnedItemsScope {
    #[default]
    Global,
    Workspace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeSettings {
    #[serde(deserialize_with = "deserialize_group_by_lenient")]
    pub group_by: GroupBySetting,
    /// Show resources whose type is not in the supported type registry.
    pub show_hidden_types: bool,
    /// Separate members listed from different sources inside one group.
    pub show_source_separators: bool,
    pub pinned_items_scope: PinnedItemsScope,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            group_by: GroupBySetting::default(),
            show_hidden_types: false,
            show_source_separators: true,
            pinned_items_scope: PinnedItemsScope::default(),
        }
    }
}

impl TreeSettings {
    /// `<config dir>/resource-tree/settings.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("resource-tree");
        Ok(config_dir.join("settings.json"))
    }

    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load settings, using defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).context("Failed to read settings file")?;
        serde_json::from_str(&contents).context("Failed to parse settings JSON")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        write_atomic(path, &json)
    }
}

/// Write through a temp file and rename, so readers never see a partial file.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, contents).context("Failed to write temp settings file")?;
    fs::rename(&temp_path, path).context("Failed to rename temp settings file")?;
    Ok(())
}

/// Key-value store for small pieces of persisted state.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn update(&self, key: &str, value: Value) -> Result<()>;

    fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Ignoring malformed value for '{}': {}", key, e);
                Vec::new()
            }),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn update(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| anyhow::anyhow!("Settings store poisoned: {}", e))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store persisted as one JSON object, rewritten on every update.
#[derive(Debug)]
pub struct JsonFileSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileSettingsStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let contents = fs::read_to_string(&path).context("Failed to read state file")?;
            serde_json::from_str(&contents).context("Failed to parse state JSON")?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn update(&self, key: &str, value: Value) -> Result<()> {
        let json = {
            let mut values = self
                .values
                .lock()
                .map_err(|e| anyhow::anyhow!("State file store poisoned: {}", e))?;
            values.insert(key.to_string(), value);
            serde_json::to_string_pretty(&*values).context("Failed to serialize state")?
        };
        write_atomic(&self.path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_group_by_setting_parses_all_forms() {
        assert_eq!("resourceGroup".parse::<GroupBySetting>().unwrap(), GroupBySetting::ResourceGroup);
        assert_eq!("resourceType".parse::<GroupBySetting>().unwrap(), GroupBySetting::ResourceType);
        assert_eq!("location".parse::<GroupBySetting>().unwrap(), GroupBySetting::Location);
        assert_eq!(
            "armTag.environment".parse::<GroupBySetting>().unwrap(),
            GroupBySetting::Tag("environment".to_string())
        );
        assert!("armTag.".parse::<GroupBySetting>().is_err());
        assert!("bogus".parse::<GroupBySetting>().is_err());
    }

    #[test]
    fn test_group_by_setting_display_matches_input() {
        for value in ["resourceGroup", "resourceType", "location", "armTag.owner"] {
            assert_eq!(value.parse::<GroupBySetting>().unwrap().to_string(), value);
        }
    }

    #[test]
    fn test_settings_defaults_and_unknown_group_by() {
        let settings: TreeSettings = serde_json::from_value(json!({})).unwrap();
        assert_eq!(settings, TreeSettings::default());
        assert!(settings.show_source_separators);

        let settings: TreeSettings =
            serde_json::from_value(json!({ "groupBy": "nonsense", "showHiddenTypes": true })).unwrap();
        assert_eq!(settings.group_by, GroupBySetting::ResourceGroup);
        assert!(settings.show_hidden_types);
    }

    #[test]
    fn test_memory_store_string_list() {
        let store = MemorySettingsStore::new();
        assert!(store.get_string_list("pinned").is_empty());
        store.update("pinned", json!(["a", "b"])).unwrap();
        assert_eq!(store.get_string_list("pinned"), vec!["a".to_string(), "b".to_string()]);
        store.update("pinned", json!(42)).unwrap();
        assert!(store.get_string_list("pinned").is_empty());
    }
}
