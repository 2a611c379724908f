//! Root of the cloud resource tree: one node per source, grouped below.

use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::sync::Cache;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

use super::grouping::{collate, GroupingContext, GroupingManager};
use super::model::{CollapsibleState, Resource, ResourceSource, SourceKind, TreeItem};
use super::resource_providers::ResourceProviderManager;
use super::settings::TreeSettings;
use super::tree_data_provider::TreeRoot;
use super::tree_node::{join_id, ResourceGroupsItem, TreeNodeRef};

/// Lists the sources (subscriptions) the cloud tree shows.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn get_sources(&self) -> Result<Vec<ResourceSource>>;
}

#[derive(Debug, Default)]
pub struct StaticSourceProvider {
    sources: Mutex<Vec<ResourceSource>>,
}

impl StaticSourceProvider {
    pub fn new(sources: Vec<ResourceSource>) -> Self {
        Self {
            sources: Mutex::new(sources),
        }
    }

    pub fn set_sources(&self, sources: Vec<ResourceSource>) {
        if let Ok(mut current) = self.sources.lock() {
            *current = sources;
        }
    }
}

#[async_trait]
impl SourceProvider for StaticSourceProvider {
    async fn get_sources(&self) -> Result<Vec<ResourceSource>> {
        let sources = self
            .sources
            .lock()
            .map_err(|e| anyhow::anyhow!("Source list poisoned: {}", e))?;
        Ok(sources.clone())
    }
}

/// State shared between the root and its source nodes.
struct CloudShared {
    resource_manager: Arc<ResourceProviderManager>,
    grouping: Arc<GroupingManager>,
    settings: Arc<RwLock<TreeSettings>>,
    /// Resource lists per source id. Lifetime is tied to refreshes only.
    resources: Cache<String, Arc<Vec<Resource>>>,
    epoch: AtomicU64,
}

impl CloudShared {
    fn settings(&self) -> TreeSettings {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn resources_for(&self, source: &ResourceSource) -> Arc<Vec<Resource>> {
        let key = source.id.to_ascii_lowercase();
        if let Some(cached) = self.resources.get(&key) {
            trace_debug!("Resource list cache hit for '{}'", source.id);
            return cached;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let resources = Arc::new(self.resource_manager.get_resources(source).await);
        // A refresh during the fetch makes the list stale; hand it out uncached.
        if epoch == self.epoch.load(Ordering::SeqCst) {
            self.resources.insert(key, Arc::clone(&resources));
        }
        resources
    }

    fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.resources.invalidate_all();
    }
}

/// Node for one subscription.
pub struct SourceItem {
    id: String,
    source: ResourceSource,
    shared: Arc<CloudShared>,
}

impl std::fmt::Debug for SourceItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceItem")
            .field("id", &self.id)
            .field("source", &self.source)
            .finish()
    }
}

impl SourceItem {
    pub fn source(&self) -> &ResourceSource {
        &self.source
    }

    fn id_prefix(&self) -> Option<String> {
        self.source.tenant_id.clone()
    }
}

#[async_trait]
impl ResourceGroupsItem for SourceItem {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_children(&self) -> Result<Vec<TreeNodeRef>> {
        let resources = self.shared.resources_for(&self.source).await;
        let settings = self.shared.settings();
        let context = GroupingContext {
            id_prefix: self.id_prefix(),
            show_hidden_types: settings.show_hidden_types,
            show_source_separators: settings.show_source_separators,
        };

        Ok(self
            .shared
            .grouping
            .group_resources(Some(&self.id), &context, &resources, &settings.group_by)
            .into_iter()
            .map(|group| group as TreeNodeRef)
            .collect())
    }

    async fn get_tree_item(&self) -> Result<TreeItem> {
        let context = match self.source.kind {
            SourceKind::Subscription => "subscription",
            SourceKind::WorkspaceFolder => "workspaceFolder",
        };
        let mut item = TreeItem::new(self.source.name.clone())
            .with_icon("subscription")
            .with_collapsible_state(CollapsibleState::Collapsed)
            .with_context_value(context);
        item.id = Some(self.id.clone());
        item.tooltip = Some(self.source.id.clone());
        Ok(item)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct CloudResourceRoot {
    sources: Arc<dyn SourceProvider>,
    shared: Arc<CloudShared>,
}

impl CloudResourceRoot {
    pub fn new(
        sources: Arc<dyn SourceProvider>,
        resource_manager: Arc<ResourceProviderManager>,
        grouping: Arc<GroupingManager>,
        settings: Arc<RwLock<TreeSettings>>,
    ) -> Self {
        Self {
            sources,
            shared: Arc::new(CloudShared {
                resource_manager,
                grouping,
                settings,
                resources: Cache::builder().build(),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn cached_source_count(&self) -> u64 {
        self.shared.resources.run_pending_tasks();
        self.shared.resources.entry_count()
    }
}

#[async_trait]
impl TreeRoot for CloudResourceRoot {
    async fn get_children(&self) -> Result<Vec<TreeNodeRef>> {
        let mut sources = self
            .sources
            .get_sources()
            .await
            .context("Failed to list resource sources")?;
        sources.sort_by(|a, b| collate(&a.name, &b.name));
        debug!("Cloud tree has {} sources", sources.len());

        Ok(sources
            .into_iter()
            .map(|source| {
                let id = match &source.tenant_id {
                    Some(tenant) => join_id(tenant, &source.id),
                    None => source.id.clone(),
                };
                Arc::new(SourceItem {
                    id,
                    source,
                    shared: Arc::clone(&self.shared),
                }) as TreeNodeRef
            })
            .collect())
    }

    fn invalidate(&self) {
        debug!("Invalidating cloud resource lists");
        self.shared.invalidate();
        self.shared.grouping.clear();
    }

    fn invalidate_resources(&self) {
        self.shared.invalidate();
    }

    fn find_rendered(&self, id: &str) -> Option<TreeNodeRef> {
        self.shared
            .grouping
            .find_rendered(id)
            .map(|group| group as TreeNodeRef)
    }

    fn nodes_for_type(&self, resource_type: &str) -> Option<Vec<TreeNodeRef>> {
        Some(
            self.shared
                .grouping
                .groups_containing_type(resource_type)
                .into_iter()
                .map(|group| group as TreeNodeRef)
                .collect(),
        )
    }
}
