use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Resource type tag of container resources (resource groups).
pub const RESOURCE_GROUP_TYPE: &str = "microsoft.resources/resourcegroups";

/// The resource domains a provider manager can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceDomain {
    Cloud,
    Workspace,
}

impl fmt::Display for ResourceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceDomain::Cloud => write!(f, "cloud"),
            ResourceDomain::Workspace => write!(f, "workspace"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    #[default]
    Subscription,
    WorkspaceFolder,
}

/// Where a resource was listed from: a subscription or a workspace folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSource {
    #[serde(default)]
    pub kind: SourceKind,
    pub id: String,
    pub name: String,
    /// Tenant or account the source belongs to. Used as the id prefix when
    /// the same logical ids show up under several accounts.
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl ResourceSource {
    pub fn subscription(subscription_id: &str, name: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Subscription,
            id: format!("/subscriptions/{}", subscription_id),
            name: name.into(),
            tenant_id: None,
        }
    }

    pub fn workspace() -> Self {
        Self {
            kind: SourceKind::WorkspaceFolder,
            id: "/workspace".to_string(),
            name: "Workspace".to_string(),
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// One listed real-world entity. Immutable snapshot owned by the provider
/// that listed it; recreated on every listing call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub source: ResourceSource,
    #[serde(default)]
    pub portal_url: Option<String>,
}

impl Resource {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_resource_group(mut self, resource_group: impl Into<String>) -> Self {
        self.resource_group = Some(resource_group.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: ResourceSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_portal_url(mut self, url: impl Into<String>) -> Self {
        self.portal_url = Some(url.into());
        self
    }

    /// True for resource-group resources, which double as grouping containers.
    pub fn is_container(&self) -> bool {
        self.resource_type.eq_ignore_ascii_case(RESOURCE_GROUP_TYPE)
    }

    /// Resource group the resource lives in: the explicit field when set,
    /// otherwise parsed out of the id, and for containers their own name.
    pub fn resource_group_name(&self) -> Option<String> {
        if let Some(rg) = &self.resource_group {
            return Some(rg.clone());
        }
        if self.is_container() {
            return Some(self.name.clone());
        }
        parse_resource_group(&self.id)
    }

    /// Case-insensitive tag lookup.
    pub fn tag_value(&self, tag_name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(tag_name))
            .map(|(_, v)| v.as_str())
    }
}

/// Extract the resource group segment from an id of the form
/// `/subscriptions/<s>/resourceGroups/<rg>/...`.
pub fn parse_resource_group(id: &str) -> Option<String> {
    let mut segments = id.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case("resourceGroups") {
            return segments.next().map(str::to_string);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollapsibleState {
    #[default]
    None,
    Collapsed,
    Expanded,
}

/// Display metadata returned by `get_tree_item`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeItem {
    pub id: Option<String>,
    pub label: String,
    pub description: Option<String>,
    pub tooltip: Option<String>,
    pub icon: Option<String>,
    pub collapsible_state: CollapsibleState,
    pub context_value: Option<String>,
}

impl TreeItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_collapsible_state(mut self, state: CollapsibleState) -> Self {
        self.collapsible_state = state;
        self
    }

    pub fn with_context_value(mut self, context_value: impl Into<String>) -> Self {
        self.context_value = Some(context_value.into());
        self
    }

    /// The classification tags carried in `context_value`.
    pub fn context_values(&self) -> BTreeSet<String> {
        self.context_value
            .as_deref()
            .map(parse_context_value)
            .unwrap_or_default()
    }

    pub fn has_context_value(&self, value: &str) -> bool {
        self.context_values().contains(value)
    }

    /// Union `values` into the existing classification tags.
    pub fn add_context_values<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged = self.context_values();
        merged.extend(values.into_iter().map(Into::into));
        self.context_value = Some(create_context_value(merged));
    }
}

/// Split a `;`-separated context value into its tags.
pub fn parse_context_value(value: &str) -> BTreeSet<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join tags into a de-duplicated, sorted `;`-separated context value.
pub fn create_context_value<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let set: BTreeSet<String> = values
        .into_iter()
        .map(Into::into)
        .filter(|v: &String| !v.is_empty())
        .collect();
    set.into_iter().collect::<Vec<_>>().join(";")
}

/// Hint that a model has a properties document worth showing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewProperties {
    pub label: String,
    pub data: serde_json::Value,
}
