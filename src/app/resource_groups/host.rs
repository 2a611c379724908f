//! Public entry point: wires the managers, caches and trees of both
//! resource domains and exposes the registration API plugins use.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use super::activation::{ExtensionActivator, NoopActivator};
use super::branch_providers::{BranchDataProvider, BranchDataProviderManager, DefaultBranchDataProvider};
use super::cloud_tree::{CloudResourceRoot, SourceProvider};
use super::events::{Disposable, EventEmitter};
use super::grouping::GroupingManager;
use super::item_cache::BranchDataItemCache;
use super::item_state::TreeItemStateStore;
use super::model::ResourceDomain;
use super::pinned::PinnedItems;
use super::resource_providers::{ResourceProvider, ResourceProviderManager};
use super::settings::{MemorySettingsStore, SettingsStore, TreeSettings};
use super::supported_types::SupportedTypeRegistry;
use super::tree_data_provider::{RefreshRequest, ResourceTreeDataProvider, RevealTarget};
use super::workspace_tree::WorkspaceResourceRoot;

/// Construction inputs for [`ResourceGroupsHost`].
pub struct HostOptions {
    sources: Arc<dyn SourceProvider>,
    settings: TreeSettings,
    activator: Arc<dyn ExtensionActivator>,
    registry: SupportedTypeRegistry,
    global_store: Arc<dyn SettingsStore>,
    workspace_store: Arc<dyn SettingsStore>,
}

impl HostOptions {
    pub fn new(sources: Arc<dyn SourceProvider>) -> Self {
        Self {
            sources,
            settings: TreeSettings::default(),
            activator: Arc::new(NoopActivator),
            registry: SupportedTypeRegistry::new(),
            global_store: Arc::new(MemorySettingsStore::new()),
            workspace_store: Arc::new(MemorySettingsStore::new()),
        }
    }

    pub fn with_settings(mut self, settings: TreeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_activator(mut self, activator: Arc<dyn ExtensionActivator>) -> Self {
        self.activator = activator;
        self
    }

    pub fn with_registry(mut self, registry: SupportedTypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_stores(
        mut self,
        global_store: Arc<dyn SettingsStore>,
        workspace_store: Arc<dyn SettingsStore>,
    ) -> Self {
        self.global_store = global_store;
        self.workspace_store = workspace_store;
        self
    }
}

/// The managers of one resource domain.
struct DomainManagers {
    resources: Arc<ResourceProviderManager>,
    branches: Arc<BranchDataProviderManager>,
}

impl DomainManagers {
    fn new(
        domain: ResourceDomain,
        registry: &Arc<SupportedTypeRegistry>,
        activator: &Arc<dyn ExtensionActivator>,
    ) -> Self {
        let default_provider: Arc<dyn BranchDataProvider> =
            Arc::new(DefaultBranchDataProvider::new(Arc::clone(registry)));
        Self {
            resources: Arc::new(ResourceProviderManager::new(domain, Arc::clone(activator))),
            branches: Arc::new(BranchDataProviderManager::new(
                default_provider,
                Arc::clone(activator),
            )),
        }
    }
}

pub struct ResourceGroupsHost {
    settings: Arc<RwLock<TreeSettings>>,
    cloud: DomainManagers,
    workspace: DomainManagers,
    cloud_tree: Arc<ResourceTreeDataProvider>,
    workspace_tree: Arc<ResourceTreeDataProvider>,
    state_store: Arc<TreeItemStateStore>,
    pinned: Arc<PinnedItems>,
    refresh_requests: EventEmitter<RefreshRequest>,
    disposed: AtomicBool,
}

impl ResourceGroupsHost {
    pub fn new(options: HostOptions) -> Self {
        let registry = Arc::new(options.registry);
        let settings = Arc::new(RwLock::new(options.settings.clone()));
        let state_store = Arc::new(TreeItemStateStore::new());
        // The scope is fixed for the lifetime of the host.
        let pinned = Arc::new(PinnedItems::for_scope(
            options.settings.pinned_items_scope,
            options.global_store,
            options.workspace_store,
        ));
        let refresh_requests = EventEmitter::new();

        let cloud = DomainManagers::new(ResourceDomain::Cloud, &registry, &options.activator);
        let workspace = DomainManagers::new(ResourceDomain::Workspace, &registry, &options.activator);

        let cloud_cache = Arc::new(BranchDataItemCache::new());
        let grouping = Arc::new(GroupingManager::new(
            Arc::clone(&registry),
            Arc::clone(&cloud.branches),
            Arc::clone(&cloud_cache),
        ));
        let cloud_root = Arc::new(CloudResourceRoot::new(
            options.sources,
            Arc::clone(&cloud.resources),
            grouping,
            Arc::clone(&settings),
        ));
        let cloud_tree = ResourceTreeDataProvider::new(
            "cloud",
            cloud_root,
            cloud_cache,
            Arc::clone(&state_store),
            Some(Arc::clone(&pinned)),
        );
        Self::watch(&cloud_tree, &cloud, &refresh_requests);

        let workspace_cache = Arc::new(BranchDataItemCache::new());
        let workspace_root = Arc::new(WorkspaceResourceRoot::new(
            Arc::clone(&workspace.resources),
            Arc::clone(&workspace.branches),
            Arc::clone(&workspace_cache),
        ));
        let workspace_tree = ResourceTreeDataProvider::new(
            "workspace",
            workspace_root,
            workspace_cache,
            Arc::clone(&state_store),
            Some(Arc::clone(&pinned)),
        );
        Self::watch(&workspace_tree, &workspace, &refresh_requests);

        log_info!("Resource groups host ready ({} supported types)", registry.len());
        Self {
            settings,
            cloud,
            workspace,
            cloud_tree,
            workspace_tree,
            state_store,
            pinned,
            refresh_requests,
            disposed: AtomicBool::new(false),
        }
    }

    fn watch(
        tree: &Arc<ResourceTreeDataProvider>,
        managers: &DomainManagers,
        refresh_requests: &EventEmitter<RefreshRequest>,
    ) {
        tree.watch_branch_changes(&managers.branches);
        tree.watch_resource_changes(&managers.resources);
        tree.watch_provider_registrations(&managers.branches);
        tree.watch_refresh_requests(refresh_requests);
    }

    pub fn cloud_tree(&self) -> &Arc<ResourceTreeDataProvider> {
        &self.cloud_tree
    }

    pub fn workspace_tree(&self) -> &Arc<ResourceTreeDataProvider> {
        &self.workspace_tree
    }

    pub fn cloud_branch_providers(&self) -> &Arc<BranchDataProviderManager> {
        &self.cloud.branches
    }

    pub fn workspace_branch_providers(&self) -> &Arc<BranchDataProviderManager> {
        &self.workspace.branches
    }

    pub fn cloud_resource_providers(&self) -> &Arc<ResourceProviderManager> {
        &self.cloud.resources
    }

    pub fn workspace_resource_providers(&self) -> &Arc<ResourceProviderManager> {
        &self.workspace.resources
    }

    pub fn state_store(&self) -> &Arc<TreeItemStateStore> {
        &self.state_store
    }

    pub fn pinned_items(&self) -> &Arc<PinnedItems> {
        &self.pinned
    }

    pub fn settings(&self) -> TreeSettings {
        match self.settings.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn register_cloud_resource_provider(&self, provider: Arc<dyn ResourceProvider>) -> Disposable {
        register_resource_provider(&self.cloud.resources, provider)
    }

    pub fn register_workspace_resource_provider(&self, provider: Arc<dyn ResourceProvider>) -> Disposable {
        register_resource_provider(&self.workspace.resources, provider)
    }

    pub fn register_cloud_branch_data_provider(
        &self,
        resource_type: &str,
        provider: Arc<dyn BranchDataProvider>,
    ) -> Disposable {
        register_branch_data_provider(&self.cloud.branches, resource_type, provider)
    }

    pub fn register_workspace_branch_data_provider(
        &self,
        resource_type: &str,
        provider: Arc<dyn BranchDataProvider>,
    ) -> Disposable {
        register_branch_data_provider(&self.workspace.branches, resource_type, provider)
    }

    /// Apply new settings and refresh the cloud tree.
    pub fn update_settings(&self, settings: TreeSettings) {
        let previous = match self.settings.write() {
            Ok(mut current) => std::mem::replace(&mut *current, settings.clone()),
            Err(e) => {
                warn!("Tree settings poisoned: {}", e);
                return;
            }
        };
        if previous.pinned_items_scope != settings.pinned_items_scope {
            log_warn!("Pinned item scope changes take effect on the next start");
        }
        info!("Grouping cloud resources by {}", settings.group_by);
        self.cloud_tree.refresh(None);
    }

    pub fn refresh(&self, request: RefreshRequest) {
        self.refresh_requests.fire(&request);
    }

    /// Reveal a node in the cloud tree, falling back to the workspace tree.
    pub async fn reveal(&self, target: RevealTarget) -> Result<bool> {
        if self.cloud_tree.reveal(target.clone()).await? {
            return Ok(true);
        }
        self.workspace_tree.reveal(target).await
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Tear down every subscription. Later calls do nothing.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cloud_tree.dispose();
        self.workspace_tree.dispose();
        log_info!("Resource groups host disposed");
    }
}

impl Drop for ResourceGroupsHost {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn register_resource_provider(
    manager: &Arc<ResourceProviderManager>,
    provider: Arc<dyn ResourceProvider>,
) -> Disposable {
    manager.add_provider(Arc::clone(&provider));
    let manager = Arc::downgrade(manager);
    Disposable::new(move || {
        if let Some(manager) = manager.upgrade() {
            manager.remove_provider(&provider);
        }
    })
}

fn register_branch_data_provider(
    manager: &Arc<BranchDataProviderManager>,
    resource_type: &str,
    provider: Arc<dyn BranchDataProvider>,
) -> Disposable {
    manager.add_provider(resource_type, provider);
    let manager = Arc::downgrade(manager);
    let resource_type = resource_type.to_string();
    Disposable::new(move || {
        if let Some(manager) = manager.upgrade() {
            manager.remove_provider(&resource_type);
        }
    })
}
