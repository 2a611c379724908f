//! Registry of branch data providers keyed by resource type.
//!
//! A branch data provider expands one resource into a provider-defined
//! sub-tree. Types without a registered provider get the default provider
//! and a fire-and-forget activation request, so the tree renders a minimal
//! placeholder until the owning plugin registers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, error, info, warn, Instrument};

use super::activation::{ActivationRequest, ExtensionActivator};
use super::branch_model::{BranchItem, BranchModel};
use super::errors::TreeError;
use super::events::{Disposable, EventEmitter};
use super::model::{CollapsibleState, Resource, TreeItem};
use super::supported_types::SupportedTypeRegistry;

/// Payload of a branch data change notification.
#[derive(Debug, Clone)]
pub enum BranchChange {
    /// Refresh everything the provider contributed.
    All,
    Items(Vec<BranchModel>),
}

/// Plugin-supplied component that expands resources into branch models.
#[async_trait]
pub trait BranchDataProvider: Send + Sync {
    async fn get_children(&self, element: &BranchModel) -> Result<Vec<BranchModel>>;

    /// Resolve a listed resource into the root model of its sub-tree.
    /// Returning `Ok(None)` breaks the provider contract.
    async fn get_resource_item(&self, resource: &Resource) -> Result<Option<BranchModel>>;

    async fn get_tree_item(&self, element: &BranchModel) -> Result<TreeItem>;

    /// Whether [`get_parent`](Self::get_parent) is implemented.
    fn supports_parent(&self) -> bool {
        false
    }

    async fn get_parent(&self, _element: &BranchModel) -> Result<Option<BranchModel>> {
        Ok(None)
    }

    /// Fill in expensive details of an already displayed item.
    async fn resolve_tree_item(&self, item: TreeItem, _element: &BranchModel) -> Result<TreeItem> {
        Ok(item)
    }

    fn on_did_change_tree_data(&self) -> Option<&EventEmitter<BranchChange>> {
        None
    }
}

/// Model the default provider resolves every resource to.
#[derive(Debug, Clone)]
pub struct DefaultResourceModel {
    pub resource: Resource,
}

impl BranchItem for DefaultResourceModel {
    fn id(&self) -> Option<&str> {
        Some(&self.resource.id)
    }

    fn portal_url(&self) -> Option<&str> {
        self.resource.portal_url.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Placeholder provider for types whose plugin has not registered yet.
pub struct DefaultBranchDataProvider {
    registry: Arc<SupportedTypeRegistry>,
}

impl DefaultBranchDataProvider {
    pub fn new(registry: Arc<SupportedTypeRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl BranchDataProvider for DefaultBranchDataProvider {
    async fn get_children(&self, _element: &BranchModel) -> Result<Vec<BranchModel>> {
        Ok(Vec::new())
    }

    async fn get_resource_item(&self, resource: &Resource) -> Result<Option<BranchModel>> {
        Ok(Some(BranchModel::native(DefaultResourceModel {
            resource: resource.clone(),
        })))
    }

    async fn get_tree_item(&self, element: &BranchModel) -> Result<TreeItem> {
        let model = element
            .downcast_ref::<DefaultResourceModel>()
            .context("Default provider received a model it did not create")?;
        Ok(TreeItem::new(model.resource.name.clone())
            .with_icon(self.registry.icon_for(&model.resource.resource_type))
            .with_collapsible_state(CollapsibleState::None)
            .with_context_value("resource"))
    }
}

/// Adds failure context, tracing spans and the empty-result check around
/// every call into a registered provider.
pub struct InstrumentedBranchDataProvider {
    inner: Arc<dyn BranchDataProvider>,
    resource_type: String,
}

impl InstrumentedBranchDataProvider {
    pub fn new(resource_type: impl Into<String>, inner: Arc<dyn BranchDataProvider>) -> Self {
        Self {
            inner,
            resource_type: resource_type.into(),
        }
    }

    fn report(&self, operation: &str, error: &anyhow::Error) {
        warn!(
            "Branch data provider for '{}' failed in {}: {:#}",
            self.resource_type, operation, error
        );
    }
}

#[async_trait]
impl BranchDataProvider for InstrumentedBranchDataProvider {
    async fn get_children(&self, element: &BranchModel) -> Result<Vec<BranchModel>> {
        let span = tracing::debug_span!("branch.getChildren", resource_type = %self.resource_type);
        let result = self
            .inner
            .get_children(element)
            .instrument(span)
            .await
            .with_context(|| format!("getChildren failed for '{}'", self.resource_type));
        if let Err(e) = &result {
            self.report("getChildren", e);
        }
        result
    }

    async fn get_resource_item(&self, resource: &Resource) -> Result<Option<BranchModel>> {
        let span = tracing::debug_span!("branch.getResourceItem", resource_type = %self.resource_type);
        let result = self
            .inner
            .get_resource_item(resource)
            .instrument(span)
            .await
            .with_context(|| format!("getResourceItem failed for '{}'", resource.id));

        match result {
            Ok(Some(model)) => Ok(Some(model)),
            Ok(None) => {
                error!(
                    "Branch data provider for '{}' returned nothing for resource '{}'",
                    self.resource_type, resource.id
                );
                Err(TreeError::EmptyProviderResult {
                    resource_type: self.resource_type.clone(),
                    operation: "getResourceItem",
                }
                .into())
            }
            Err(e) => {
                self.report("getResourceItem", &e);
                Err(e)
            }
        }
    }

    async fn get_tree_item(&self, element: &BranchModel) -> Result<TreeItem> {
        let span = tracing::debug_span!("branch.getTreeItem", resource_type = %self.resource_type);
        let result = self
            .inner
            .get_tree_item(element)
            .instrument(span)
            .await
            .with_context(|| format!("getTreeItem failed for '{}'", self.resource_type));
        if let Err(e) = &result {
            self.report("getTreeItem", e);
        }
        result
    }

    fn supports_parent(&self) -> bool {
        self.inner.supports_parent()
    }

    async fn get_parent(&self, element: &BranchModel) -> Result<Option<BranchModel>> {
        let result = self
            .inner
            .get_parent(element)
            .await
            .with_context(|| format!("getParent failed for '{}'", self.resource_type));
        if let Err(e) = &result {
            self.report("getParent", e);
        }
        result
    }

    async fn resolve_tree_item(&self, item: TreeItem, element: &BranchModel) -> Result<TreeItem> {
        self.inner
            .resolve_tree_item(item, element)
            .await
            .with_context(|| format!("resolveTreeItem failed for '{}'", self.resource_type))
    }

    fn on_did_change_tree_data(&self) -> Option<&EventEmitter<BranchChange>> {
        self.inner.on_did_change_tree_data()
    }
}

struct Registration {
    provider: Arc<dyn BranchDataProvider>,
    _listener: Option<Disposable>,
}

pub struct BranchDataProviderManager {
    providers: RwLock<HashMap<String, Registration>>,
    default_provider: Arc<dyn BranchDataProvider>,
    activator: Arc<dyn ExtensionActivator>,
    requested_types: Mutex<HashSet<String>>,
    on_did_change_tree_data: EventEmitter<BranchChange>,
    on_did_change_providers: EventEmitter<String>,
}

fn type_key(resource_type: &str) -> String {
    resource_type.to_ascii_lowercase()
}

impl BranchDataProviderManager {
    pub fn new(
        default_provider: Arc<dyn BranchDataProvider>,
        activator: Arc<dyn ExtensionActivator>,
    ) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            default_provider,
            activator,
            requested_types: Mutex::new(HashSet::new()),
            on_did_change_tree_data: EventEmitter::new(),
            on_did_change_providers: EventEmitter::new(),
        }
    }

    /// Aggregated change stream of every registered provider.
    pub fn on_did_change_tree_data(&self) -> &EventEmitter<BranchChange> {
        &self.on_did_change_tree_data
    }

    /// Fired with the (lower-cased) type tag whenever its provider is added
    /// or removed.
    pub fn on_did_change_providers(&self) -> &EventEmitter<String> {
        &self.on_did_change_providers
    }

    pub fn has_provider(&self, resource_type: &str) -> bool {
        self.providers
            .read()
            .map(|p| p.contains_key(&type_key(resource_type)))
            .unwrap_or(false)
    }

    pub fn add_provider(&self, resource_type: &str, provider: Arc<dyn BranchDataProvider>) {
        let key = type_key(resource_type);
        let instrumented: Arc<dyn BranchDataProvider> =
            Arc::new(InstrumentedBranchDataProvider::new(key.clone(), provider));

        let listener = instrumented.on_did_change_tree_data().map(|emitter| {
            let aggregate = self.on_did_change_tree_data.clone();
            emitter.subscribe(move |change| aggregate.fire(change))
        });

        let previous = match self.providers.write() {
            Ok(mut providers) => providers.insert(
                key.clone(),
                Registration {
                    provider: instrumented,
                    _listener: listener,
                },
            ),
            Err(e) => {
                error!("Branch data provider registry poisoned: {}", e);
                return;
            }
        };

        if previous.is_some() {
            info!("Replaced branch data provider for '{}'", key);
        } else {
            info!("Registered branch data provider for '{}'", key);
        }
        // Disposes the replaced provider's listener.
        drop(previous);

        self.on_did_change_providers.fire(&key);
    }

    pub fn remove_provider(&self, resource_type: &str) -> bool {
        let key = type_key(resource_type);
        let removed = match self.providers.write() {
            Ok(mut providers) => providers.remove(&key),
            Err(e) => {
                error!("Branch data provider registry poisoned: {}", e);
                None
            }
        };

        match removed {
            Some(registration) => {
                drop(registration);
                info!("Removed branch data provider for '{}'", key);
                // Let the type be activated again on next request.
                if let Ok(mut requested) = self.requested_types.lock() {
                    requested.remove(&key);
                }
                self.on_did_change_providers.fire(&key);
                true
            }
            None => false,
        }
    }

    /// Provider registered for `resource_type`, or the default provider.
    ///
    /// Falling back also starts activation for the type in the background;
    /// the eventual registration fires [`on_did_change_providers`](Self::on_did_change_providers).
    pub fn get_provider(&self, resource_type: &str) -> Arc<dyn BranchDataProvider> {
        let key = type_key(resource_type);
        if let Ok(providers) = self.providers.read() {
            if let Some(registration) = providers.get(&key) {
                return Arc::clone(&registration.provider);
            }
        }

        self.request_activation(key);
        Arc::clone(&self.default_provider)
    }

    fn request_activation(&self, key: String) {
        let first_request = self
            .requested_types
            .lock()
            .map(|mut requested| requested.insert(key.clone()))
            .unwrap_or(false);
        if !first_request {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available to activate extensions for '{}'", key);
            return;
        };

        debug!("Requesting extension activation for '{}'", key);
        let activator = Arc::clone(&self.activator);
        runtime.spawn(async move {
            if let Err(e) = activator
                .activate(ActivationRequest::ResourceType(key.clone()))
                .await
            {
                warn!("Extension activation for '{}' failed: {:#}", key, e);
            }
        });
    }
}
