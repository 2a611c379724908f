//! Per-view orchestrator between the host tree widget and the tree layer.
//!
//! The orchestrator owns no tree structure. It fetches root children from a
//! [`TreeRoot`], delegates everything below to the nodes themselves, and
//! translates the upstream change streams (branch data, resource lists,
//! provider registrations, explicit refresh requests and per-node state)
//! into host-facing [`TreeChange`] notifications.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, info, warn};

use super::branch_model::BranchModel;
use super::branch_providers::{BranchChange, BranchDataProviderManager};
use super::events::{DisposableStore, EventEmitter};
use super::item_cache::BranchDataItemCache;
use super::item_state::TreeItemStateStore;
use super::model::TreeItem;
use super::pinned::{PinnedItems, PINNED_CONTEXT};
use super::resource_providers::{ResourceChange, ResourceProviderManager};
use super::tree_node::{ids_equal, TreeNodeRef};

/// Source of a tree's top-level nodes.
#[async_trait]
pub trait TreeRoot: Send + Sync {
    async fn get_children(&self) -> Result<Vec<TreeNodeRef>>;

    /// Drop cached root state ahead of a root-level refresh.
    fn invalidate(&self) {}

    /// Drop cached resource lists after a resource change.
    fn invalidate_resources(&self) {}

    /// A node this root rendered in the current generation, by id.
    fn find_rendered(&self, _id: &str) -> Option<TreeNodeRef> {
        None
    }

    /// Rendered nodes showing resources of `resource_type`. `None` means the
    /// root cannot tell and the whole tree should refresh.
    fn nodes_for_type(&self, _resource_type: &str) -> Option<Vec<TreeNodeRef>> {
        None
    }
}

/// Change notification delivered to the host tree widget.
#[derive(Debug, Clone)]
pub enum TreeChange {
    All,
    Items(Vec<TreeNodeRef>),
}

/// Explicit refresh request from a command or the host API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshRequest {
    All,
    Item(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Fetching,
}

/// The host tree widget, as far as revealing nodes goes.
#[async_trait]
pub trait TreeViewHost: Send + Sync {
    async fn reveal(&self, node: TreeNodeRef) -> Result<()>;
}

/// What to reveal: a node of this tree, or a model handed out by a legacy
/// provider that has to be mapped to one first.
#[derive(Debug, Clone)]
pub enum RevealTarget {
    Native(TreeNodeRef),
    Legacy(BranchModel),
}

struct FetchGuard<'a>(&'a Mutex<RefreshState>);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            *state = RefreshState::Idle;
        }
    }
}

pub struct ResourceTreeDataProvider {
    name: String,
    root: Arc<dyn TreeRoot>,
    item_cache: Arc<BranchDataItemCache>,
    state_store: Arc<TreeItemStateStore>,
    pinned: Option<Arc<PinnedItems>>,
    host: RwLock<Option<Arc<dyn TreeViewHost>>>,
    refresh_state: Mutex<RefreshState>,
    on_did_change_tree_data: EventEmitter<TreeChange>,
    subscriptions: DisposableStore,
}

impl ResourceTreeDataProvider {
    pub fn new(
        name: impl Into<String>,
        root: Arc<dyn TreeRoot>,
        item_cache: Arc<BranchDataItemCache>,
        state_store: Arc<TreeItemStateStore>,
        pinned: Option<Arc<PinnedItems>>,
    ) -> Arc<Self> {
        let provider = Arc::new(Self {
            name: name.into(),
            root,
            item_cache,
            state_store,
            pinned,
            host: RwLock::new(None),
            refresh_state: Mutex::new(RefreshState::Idle),
            on_did_change_tree_data: EventEmitter::new(),
            subscriptions: DisposableStore::new(),
        });
        provider.watch_state_changes();
        provider
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn on_did_change_tree_data(&self) -> &EventEmitter<TreeChange> {
        &self.on_did_change_tree_data
    }

    pub fn item_cache(&self) -> &Arc<BranchDataItemCache> {
        &self.item_cache
    }

    pub fn state_store(&self) -> &Arc<TreeItemStateStore> {
        &self.state_store
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.refresh_state.lock().map(|s| *s).unwrap_or_default()
    }

    pub fn set_host(&self, host: Arc<dyn TreeViewHost>) {
        if let Ok(mut current) = self.host.write() {
            *current = Some(host);
        }
    }

    /// Children of `element`, or the root children when `element` is `None`.
    ///
    /// A root fetch starts a new tree generation: the item cache is cleared
    /// and the root drops its cached state first.
    pub async fn get_children(&self, element: Option<&TreeNodeRef>) -> Result<Vec<TreeNodeRef>> {
        match element {
            Some(node) => node.get_children().await,
            None => {
                if let Ok(mut state) = self.refresh_state.lock() {
                    *state = RefreshState::Fetching;
                }
                let _guard = FetchGuard(&self.refresh_state);
                debug!("Refreshing root of the {} tree", self.name);
                self.item_cache.clear();
                self.root.invalidate();
                self.root.get_children().await
            }
        }
    }

    /// Display metadata with transient state and pinning applied.
    pub async fn get_tree_item(&self, element: &TreeNodeRef) -> Result<TreeItem> {
        let mut item = element.get_tree_item().await?;
        self.state_store.apply(element.id(), &mut item);
        if let Some(pinned) = &self.pinned {
            if pinned.is_pinned(element.id()) {
                item.add_context_values([PINNED_CONTEXT]);
            }
        }
        Ok(item)
    }

    pub async fn get_parent(&self, element: &TreeNodeRef) -> Result<Option<TreeNodeRef>> {
        element.get_parent().await
    }

    pub async fn resolve_tree_item(&self, element: &TreeNodeRef, item: TreeItem) -> Result<TreeItem> {
        element.resolve_tree_item(item).await
    }

    /// Ask the host to refetch `element`, or the whole tree.
    pub fn refresh(&self, element: Option<&TreeNodeRef>) {
        match element {
            Some(node) => self.fire(TreeChange::Items(vec![Arc::clone(node)])),
            None => self.fire(TreeChange::All),
        }
    }

    fn fire(&self, change: TreeChange) {
        match &change {
            TreeChange::All => debug!("{} tree changed", self.name),
            TreeChange::Items(items) => debug!("{} tree changed at {} nodes", self.name, items.len()),
        }
        self.on_did_change_tree_data.fire(&change);
    }

    /// A node of the current generation by id, without fetching anything.
    fn lookup_rendered(&self, id: &str) -> Option<TreeNodeRef> {
        self.item_cache
            .get_item_for_id(id)
            .map(|item| item as TreeNodeRef)
            .or_else(|| self.root.find_rendered(id))
    }

    fn handle_branch_change(&self, change: &BranchChange) {
        match change {
            BranchChange::All => self.fire(TreeChange::All),
            BranchChange::Items(models) => {
                let nodes: Vec<TreeNodeRef> = models
                    .iter()
                    .filter_map(|model| self.item_cache.get_item_for_branch_item(model))
                    .map(|item| item as TreeNodeRef)
                    .collect();
                if nodes.is_empty() {
                    // Never rendered, nothing to update.
                    debug!("Ignoring change for {} unrendered models", models.len());
                    return;
                }
                self.fire(TreeChange::Items(nodes));
            }
        }
    }

    fn handle_resource_change(&self, change: &ResourceChange) {
        if let ResourceChange::Resource(resource) = change {
            debug!("Resource '{}' changed", resource.id);
        }
        self.root.invalidate_resources();
        self.fire(TreeChange::All);
    }

    fn handle_refresh_request(&self, request: &RefreshRequest) {
        match request {
            RefreshRequest::All => self.fire(TreeChange::All),
            RefreshRequest::Item(id) => match self.lookup_rendered(id) {
                Some(node) => self.fire(TreeChange::Items(vec![node])),
                None => self.fire(TreeChange::All),
            },
        }
    }

    fn handle_provider_registration(&self, resource_type: &str) {
        match self.root.nodes_for_type(resource_type) {
            Some(nodes) if nodes.is_empty() => {
                debug!("No rendered {} nodes show '{}'", self.name, resource_type);
            }
            Some(nodes) => self.fire(TreeChange::Items(nodes)),
            None => self.fire(TreeChange::All),
        }
    }

    fn handle_node_state_change(&self, id: &str) {
        if let Some(node) = self.lookup_rendered(id) {
            self.fire(TreeChange::Items(vec![node]));
        }
    }

    fn watch_state_changes(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.subscriptions
            .add(self.state_store.on_did_change().subscribe(move |id: &String| {
                if let Some(provider) = weak.upgrade() {
                    provider.handle_node_state_change(id);
                }
            }));

        if let Some(pinned) = &self.pinned {
            let weak = Arc::downgrade(self);
            self.subscriptions
                .add(pinned.on_did_change().subscribe(move |id: &String| {
                    if let Some(provider) = weak.upgrade() {
                        provider.handle_node_state_change(id);
                    }
                }));
        }
    }

    /// Translate branch data changes into scoped tree changes.
    pub fn watch_branch_changes(self: &Arc<Self>, manager: &BranchDataProviderManager) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.subscriptions
            .add(manager.on_did_change_tree_data().subscribe(move |change| {
                if let Some(provider) = weak.upgrade() {
                    provider.handle_branch_change(change);
                }
            }));
    }

    /// Refresh the tree whenever the listed resources change.
    pub fn watch_resource_changes(self: &Arc<Self>, manager: &ResourceProviderManager) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.subscriptions
            .add(manager.on_did_change_resource().subscribe(move |change| {
                if let Some(provider) = weak.upgrade() {
                    provider.handle_resource_change(change);
                }
            }));
    }

    pub fn watch_refresh_requests(self: &Arc<Self>, requests: &EventEmitter<RefreshRequest>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.subscriptions.add(requests.subscribe(move |request| {
            if let Some(provider) = weak.upgrade() {
                provider.handle_refresh_request(request);
            }
        }));
    }

    /// Refresh nodes showing a type once its branch data provider changes.
    pub fn watch_provider_registrations(self: &Arc<Self>, manager: &BranchDataProviderManager) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.subscriptions
            .add(manager.on_did_change_providers().subscribe(move |resource_type| {
                if let Some(provider) = weak.upgrade() {
                    provider.handle_provider_registration(resource_type);
                }
            }));
    }

    /// Locate the node with `id` (case-insensitive).
    ///
    /// Starting at the root children, each level is scanned for an exact
    /// match; otherwise the search descends into the first node that is an
    /// ancestor of `id`. Nothing is cleared along the way.
    pub async fn find_item_by_id(&self, id: &str) -> Result<Option<TreeNodeRef>> {
        if let Some(item) = self.item_cache.get_item_for_id(id) {
            return Ok(Some(item));
        }

        let mut children = self.root.get_children().await?;
        let mut depth = 0usize;
        loop {
            let mut ancestor = None;
            for child in children {
                if ids_equal(child.id(), id) {
                    debug!("Found '{}' after {} descents", id, depth);
                    return Ok(Some(child));
                }
                if ancestor.is_none() && child.is_ancestor_of(id) {
                    ancestor = Some(child);
                }
            }

            match ancestor {
                Some(node) => {
                    depth += 1;
                    children = node.get_children().await?;
                }
                None => {
                    debug!("No node with id '{}' in the {} tree", id, self.name);
                    return Ok(None);
                }
            }
        }
    }

    /// Map `target` to a node of this tree and hand it to the host.
    /// Returns false when no such node exists or no host is attached.
    pub async fn reveal(&self, target: RevealTarget) -> Result<bool> {
        let node = match target {
            RevealTarget::Native(node) => Some(node),
            RevealTarget::Legacy(model) => match self.item_cache.get_item_for_branch_item(&model) {
                Some(item) => Some(item as TreeNodeRef),
                None => match model.own_id() {
                    Some(id) => self.find_item_by_id(id).await?,
                    None => None,
                },
            },
        };

        let Some(node) = node else {
            warn!("Nothing to reveal in the {} tree", self.name);
            return Ok(false);
        };

        let host = self.host.read().ok().and_then(|h| h.clone());
        match host {
            Some(host) => {
                host.reveal(node).await?;
                Ok(true)
            }
            None => {
                warn!("No host attached to the {} tree", self.name);
                Ok(false)
            }
        }
    }

    pub fn dispose(&self) {
        if !self.subscriptions.is_disposed() {
            info!("Disposing the {} tree", self.name);
        }
        self.subscriptions.dispose();
    }
}
