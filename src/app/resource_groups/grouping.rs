//! Partitioning of flat resource lists into group nodes.
//!
//! One [`GroupingItem`] implementation serves every grouping dimension; the
//! dimension itself is data ([`GroupingKind`]). Group nodes resolve their
//! members lazily through the branch data layer when expanded.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use super::branch_providers::BranchDataProviderManager;
use super::errors::TreeError;
use super::item_cache::BranchDataItemCache;
use super::model::{create_context_value, CollapsibleState, Resource, TreeItem};
use super::placeholders::{InvalidItem, SeparatorItem};
use super::settings::GroupBySetting;
use super::supported_types::SupportedTypeRegistry;
use super::tree_node::{ids_equal, is_ancestor_id, join_id, ResourceGroupsItem, TreeNodeRef};
use super::wrapper::{BranchDataItemOptions, BranchDataItemWrapper};

pub const UNGROUPED_LABEL: &str = "Ungrouped";

/// The dimension a group node partitions by.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupingKind {
    /// `container` is the resource-group resource itself, when it was listed.
    ResourceGroup { container: Option<Resource> },
    ResourceType { resource_type: String },
    Location,
    Tag { tag: String },
    /// Members without a value for the grouping key.
    Ungrouped,
}

impl GroupingKind {
    fn context_value(&self) -> &'static str {
        match self {
            GroupingKind::ResourceGroup { .. } => "resourceGroup",
            GroupingKind::ResourceType { .. } => "resourceTypeGroup",
            GroupingKind::Location => "locationGroup",
            GroupingKind::Tag { .. } => "tagGroup",
            GroupingKind::Ungrouped => "ungroupedGroup",
        }
    }

    fn container(&self) -> Option<&Resource> {
        match self {
            GroupingKind::ResourceGroup { container } => container.as_ref(),
            _ => None,
        }
    }
}

/// Per-call inputs for [`GroupingManager::group_resources`].
#[derive(Debug, Clone, Default)]
pub struct GroupingContext {
    /// Prefix applied to member ids, e.g. the tenant of the source.
    pub id_prefix: Option<String>,
    pub show_hidden_types: bool,
    pub show_source_separators: bool,
}

/// Names compare ignoring case first. Names equal up to case put the
/// lowercase spelling first, as locale collation does.
pub fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        // The first difference is a case difference; lowercase has the higher code point.
        .then_with(|| b.cmp(a))
}

/// Stable sort of resources by name.
pub fn sort_resources(resources: &mut [Resource]) {
    resources.sort_by(|a, b| collate(&a.name, &b.name));
}

/// Resolve `resource` through its branch data provider and wrap the result.
/// A failing provider yields an [`InvalidItem`] in place of the resource.
pub(crate) async fn resolve_resource_node(
    branch_manager: &BranchDataProviderManager,
    item_cache: &Arc<BranchDataItemCache>,
    generation: u64,
    resource: &Resource,
    id_prefix: Option<&str>,
    parent_id: &str,
) -> TreeNodeRef {
    let provider = branch_manager.get_provider(&resource.resource_type);
    let result = match provider.get_resource_item(resource).await {
        Ok(Some(model)) => Ok(model),
        Ok(None) => Err(TreeError::EmptyProviderResult {
            resource_type: resource.resource_type.to_ascii_lowercase(),
            operation: "getResourceItem",
        }
        .into()),
        Err(e) => Err(e),
    };

    match result {
        Ok(model) => {
            let options = BranchDataItemOptions {
                id_prefix: id_prefix.map(str::to_string),
                default_id: Some(resource.id.clone()),
                parent_id: Some(parent_id.to_string()),
                portal_url: resource.portal_url.clone(),
                ..Default::default()
            };
            BranchDataItemWrapper::create_in(generation, model, provider, Arc::clone(item_cache), options)
                as TreeNodeRef
        }
        Err(e) => {
            warn!("Failed to resolve '{}': {:#}", resource.id, e);
            Arc::new(InvalidItem::for_resource(id_prefix, resource, &e)) as TreeNodeRef
        }
    }
}

/// One partition bucket.
pub struct GroupingItem {
    id: String,
    label: String,
    icon: String,
    kind: GroupingKind,
    members: Vec<Resource>,
    context_values: Vec<String>,
    id_prefix: Option<String>,
    show_source_separators: bool,
    branch_manager: Arc<BranchDataProviderManager>,
    item_cache: Arc<BranchDataItemCache>,
}

impl fmt::Debug for GroupingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupingItem")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("members", &self.members.len())
            .finish()
    }
}

impl GroupingItem {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &GroupingKind {
        &self.kind
    }

    pub fn members(&self) -> &[Resource] {
        &self.members
    }

    pub fn container(&self) -> Option<&Resource> {
        self.kind.container()
    }

    pub fn contains_type(&self, resource_type: &str) -> bool {
        self.members
            .iter()
            .any(|r| r.resource_type.eq_ignore_ascii_case(resource_type))
    }

    fn member_id(&self, resource: &Resource) -> String {
        match &self.id_prefix {
            Some(prefix) => join_id(prefix, &resource.id),
            None => resource.id.clone(),
        }
    }

    /// Split sorted members into one block per source, ordered by source name.
    fn source_blocks(&self, members: Vec<Resource>) -> Vec<Vec<Resource>> {
        let mut blocks: Vec<(String, String, Vec<Resource>)> = Vec::new();
        for resource in members {
            match blocks.iter_mut().find(|(id, _, _)| ids_equal(id, &resource.source.id)) {
                Some((_, _, block)) => block.push(resource),
                None => blocks.push((
                    resource.source.id.clone(),
                    resource.source.name.clone(),
                    vec![resource],
                )),
            }
        }
        blocks.sort_by(|a, b| collate(&a.1, &b.1));
        blocks.into_iter().map(|(_, _, block)| block).collect()
    }
}

#[async_trait]
impl ResourceGroupsItem for GroupingItem {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_children(&self) -> Result<Vec<TreeNodeRef>> {
        let generation = self.item_cache.generation();
        let mut members = self.members.clone();
        sort_resources(&mut members);

        let blocks = if self.show_source_separators {
            self.source_blocks(members)
        } else {
            vec![members]
        };

        let mut children = Vec::new();
        for (index, block) in blocks.iter().enumerate() {
            if index > 0 {
                let separator_id = join_id(&self.id, &format!("separator/{}", index));
                children.push(Arc::new(SeparatorItem::new(separator_id)) as TreeNodeRef);
            }
            let resolved = join_all(block.iter().map(|r| {
                resolve_resource_node(
                    &self.branch_manager,
                    &self.item_cache,
                    generation,
                    r,
                    self.id_prefix.as_deref(),
                    &self.id,
                )
            }))
            .await;
            children.extend(resolved);
        }

        debug!("Group '{}' resolved {} children", self.id, children.len());
        Ok(children)
    }

    async fn get_tree_item(&self) -> Result<TreeItem> {
        let mut context_values = self.context_values.clone();
        if self.container().and_then(|c| c.portal_url.as_ref()).is_some() {
            context_values.push("hasPortalUrl".to_string());
        }

        let mut item = TreeItem::new(self.label.clone())
            .with_icon(self.icon.clone())
            .with_collapsible_state(CollapsibleState::Collapsed)
            .with_context_value(create_context_value(context_values));
        item.id = Some(self.id.clone());
        item.tooltip = Some(format!("{} ({} resources)", self.label, self.members.len()));
        Ok(item)
    }

    /// Type, location and tag groups are not id prefixes of their members,
    /// so membership counts as well.
    fn is_ancestor_of(&self, id: &str) -> bool {
        is_ancestor_id(&self.id, id)
            || self.members.iter().any(|member| {
                let member_id = self.member_id(member);
                ids_equal(&member_id, id) || is_ancestor_id(&member_id, id)
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct GroupBucket {
    key: Option<String>,
    label: String,
    kind: GroupingKind,
    members: Vec<Resource>,
}

/// Builds group nodes and remembers the ones currently rendered.
pub struct GroupingManager {
    registry: Arc<SupportedTypeRegistry>,
    branch_manager: Arc<BranchDataProviderManager>,
    item_cache: Arc<BranchDataItemCache>,
    rendered: RwLock<HashMap<String, Arc<GroupingItem>>>,
}

impl GroupingManager {
    pub fn new(
        registry: Arc<SupportedTypeRegistry>,
        branch_manager: Arc<BranchDataProviderManager>,
        item_cache: Arc<BranchDataItemCache>,
    ) -> Self {
        Self {
            registry,
            branch_manager,
            item_cache,
            rendered: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SupportedTypeRegistry> {
        &self.registry
    }

    /// Partition `resources` into group nodes under the node `parent_id`.
    pub fn group_resources(
        &self,
        parent_id: Option<&str>,
        context: &GroupingContext,
        resources: &[Resource],
        setting: &GroupBySetting,
    ) -> Vec<Arc<GroupingItem>> {
        let parent_id = parent_id.unwrap_or("");
        let mut buckets: Vec<GroupBucket> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        // Empty containers and supported types still get a group.
        match setting {
            GroupBySetting::ResourceGroup => {
                for container in resources.iter().filter(|r| r.is_container()) {
                    let bucket = bucket_for(&mut buckets, &mut index, Some(container.name.as_str()), || {
                        GroupingKind::ResourceGroup { container: None }
                    });
                    bucket.label = container.name.clone();
                    bucket.kind = GroupingKind::ResourceGroup {
                        container: Some(container.clone()),
                    };
                }
            }
            GroupBySetting::ResourceType => {
                for supported in self.registry.types() {
                    let bucket = bucket_for(&mut buckets, &mut index, Some(supported.key.as_str()), || {
                        GroupingKind::ResourceType {
                            resource_type: supported.key.clone(),
                        }
                    });
                    bucket.label = supported.display_name.clone();
                }
            }
            _ => {}
        }

        let mut hidden = 0usize;
        for resource in resources {
            if matches!(setting, GroupBySetting::ResourceGroup) && resource.is_container() {
                continue;
            }
            if !context.show_hidden_types && !self.registry.is_supported(&resource.resource_type) {
                hidden += 1;
                continue;
            }

            let key = match setting {
                GroupBySetting::ResourceGroup => resource.resource_group_name(),
                GroupBySetting::ResourceType => Some(resource.resource_type.clone()),
                GroupBySetting::Location => resource.location.clone(),
                GroupBySetting::Tag(tag) => resource.tag_value(tag).map(str::to_string),
            }
            .filter(|k| !k.is_empty());

            let bucket = bucket_for(&mut buckets, &mut index, key.as_deref(), || match setting {
                GroupBySetting::ResourceGroup => GroupingKind::ResourceGroup { container: None },
                GroupBySetting::ResourceType => GroupingKind::ResourceType {
                    resource_type: resource.resource_type.clone(),
                },
                GroupBySetting::Location => GroupingKind::Location,
                GroupBySetting::Tag(tag) => GroupingKind::Tag { tag: tag.clone() },
            });
            if bucket.label.is_empty() {
                bucket.label = match (&bucket.kind, &key) {
                    (GroupingKind::ResourceType { .. }, _) => {
                        self.registry.display_name_for(&resource.resource_type)
                    }
                    (_, Some(key)) => key.clone(),
                    (_, None) => UNGROUPED_LABEL.to_string(),
                };
            }
            bucket.members.push(resource.clone());
        }
        if hidden > 0 {
            debug!("Hid {} resources of unsupported types", hidden);
        }

        // Ungrouped goes last, the rest by label.
        buckets.sort_by(|a, b| match (&a.key, &b.key) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            _ => collate(&a.label, &b.label),
        });

        let groups: Vec<Arc<GroupingItem>> = buckets
            .into_iter()
            .map(|bucket| self.create_group(parent_id, context, setting, bucket))
            .collect();

        match self.rendered.write() {
            Ok(mut rendered) => {
                for group in &groups {
                    rendered.insert(group.id.to_ascii_lowercase(), Arc::clone(group));
                }
            }
            Err(e) => warn!("Rendered group index poisoned: {}", e),
        }

        debug!("Grouped {} resources into {} groups by {}", resources.len(), groups.len(), setting);
        groups
    }

    fn create_group(
        &self,
        parent_id: &str,
        context: &GroupingContext,
        setting: &GroupBySetting,
        bucket: GroupBucket,
    ) -> Arc<GroupingItem> {
        let key = bucket.key.as_deref().unwrap_or("ungrouped");
        let (id, icon) = match &bucket.kind {
            GroupingKind::ResourceGroup { container: Some(container) } => {
                let id = match &context.id_prefix {
                    Some(prefix) => join_id(prefix, &container.id),
                    None => container.id.clone(),
                };
                (id, "resourceGroup".to_string())
            }
            GroupingKind::ResourceGroup { container: None } => (
                join_id(parent_id, &format!("resourceGroups/{}", bucket.label)),
                "resourceGroup".to_string(),
            ),
            GroupingKind::ResourceType { resource_type } => (
                join_id(parent_id, &format!("resourceTypes/{}", key)),
                self.registry.icon_for(resource_type),
            ),
            GroupingKind::Location => (
                join_id(parent_id, &format!("locations/{}", key)),
                "location".to_string(),
            ),
            GroupingKind::Tag { tag } => (
                join_id(parent_id, &format!("tags/{}/{}", tag, key)),
                "tag".to_string(),
            ),
            GroupingKind::Ungrouped => (
                join_id(parent_id, &format!("{}/ungrouped", setting)),
                "ungrouped".to_string(),
            ),
        };

        Arc::new(GroupingItem {
            id,
            label: bucket.label,
            icon,
            context_values: vec![bucket.kind.context_value().to_string()],
            kind: bucket.kind,
            members: bucket.members,
            id_prefix: context.id_prefix.clone(),
            show_source_separators: context.show_source_separators,
            branch_manager: Arc::clone(&self.branch_manager),
            item_cache: Arc::clone(&self.item_cache),
        })
    }

    /// Rendered groups with at least one member of `resource_type`.
    pub fn groups_containing_type(&self, resource_type: &str) -> Vec<Arc<GroupingItem>> {
        match self.rendered.read() {
            Ok(rendered) => rendered
                .values()
                .filter(|g| g.contains_type(resource_type))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn find_rendered(&self, id: &str) -> Option<Arc<GroupingItem>> {
        self.rendered.read().ok()?.get(&id.to_ascii_lowercase()).cloned()
    }

    pub fn clear(&self) {
        if let Ok(mut rendered) = self.rendered.write() {
            rendered.clear();
        }
    }
}

/// Bucket for the case-normalised `key`, created on first use. `None` is
/// the ungrouped bucket.
fn bucket_for<'a, F>(
    buckets: &'a mut Vec<GroupBucket>,
    index: &mut HashMap<String, usize>,
    key: Option<&str>,
    kind: F,
) -> &'a mut GroupBucket
where
    F: FnOnce() -> GroupingKind,
{
    let normalized = key.map(str::to_lowercase);
    let lookup = normalized.clone().unwrap_or_default();
    let position = match index.get(&lookup) {
        Some(&position) => position,
        None => {
            let kind = if normalized.is_some() { kind() } else { GroupingKind::Ungrouped };
            buckets.push(GroupBucket {
                key: normalized,
                label: String::new(),
                kind,
                members: Vec::new(),
            });
            index.insert(lookup, buckets.len() - 1);
            buckets.len() - 1
        }
    };
    &mut buckets[position]
}
