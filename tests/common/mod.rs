//! Shared fakes for the integration tests: scripted providers for both
//! provider contracts, a recording tree host and resource builders.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use resource_tree::app::resource_groups::{
    ActivationRequest, BranchChange, BranchDataProvider, BranchItem, BranchModel, CollapsibleState, Disposable,
    EventEmitter, ExtensionActivator, HostOptions, LegacyBranchItem, Resource, ResourceGroupsHost, ResourceGroupsItem,
    ResourceProvider,
    ResourceSource, StaticResourceProvider, StaticSourceProvider, TreeItem, TreeNodeRef,
    TreeSettings, TreeViewHost,
};

// ============================================================================
// Activation
// ============================================================================

/// Activator that only records what was asked of it.
#[derive(Debug, Default)]
pub struct RecordingActivator {
    requests: Mutex<Vec<ActivationRequest>>,
}

impl RecordingActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ActivationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, request: &ActivationRequest) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| *r == request).count()
    }
}

#[async_trait]
impl ExtensionActivator for RecordingActivator {
    async fn activate(&self, request: ActivationRequest) -> Result<()> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

pub const STORAGE_TYPE: &str = "Microsoft.Storage/storageAccounts";
pub const SITES_TYPE: &str = "Microsoft.Web/sites";
pub const RG_TYPE: &str = "Microsoft.Resources/resourceGroups";

pub fn subscription() -> ResourceSource {
    ResourceSource::subscription("S", "Subscription S")
}

/// Resource `name` of `resource_type` in resource group `rg` of subscription S.
pub fn resource(rg: &str, name: &str, resource_type: &str) -> Resource {
    Resource::new(
        format!("/subscriptions/S/resourceGroups/{}/providers/{}/{}", rg, resource_type, name),
        name,
        resource_type,
    )
    .with_source(subscription())
}

pub fn container(rg: &str) -> Resource {
    Resource::new(format!("/subscriptions/S/resourceGroups/{}", rg), rg, RG_TYPE).with_source(subscription())
}

/// A host over subscription S serving `resources` from one static provider.
pub struct TestHost {
    pub host: ResourceGroupsHost,
    pub resources: Arc<StaticResourceProvider>,
    _registration: Disposable,
}

pub fn host_with(resources: Vec<Resource>, settings: TreeSettings) -> TestHost {
    let sources = Arc::new(StaticSourceProvider::new(vec![subscription()]));
    let host = ResourceGroupsHost::new(HostOptions::new(sources).with_settings(settings));
    let provider = Arc::new(StaticResourceProvider::new(resources));
    let registration = host.register_cloud_resource_provider(provider.clone());
    TestHost {
        host,
        resources: provider,
        _registration: registration,
    }
}

/// Labels of `nodes` as the cloud tree renders them.
pub async fn labels(host: &ResourceGroupsHost, nodes: &[TreeNodeRef]) -> Vec<String> {
    let mut labels = Vec::new();
    for node in nodes {
        labels.push(host.cloud_tree().get_tree_item(node).await.unwrap().label);
    }
    labels
}

/// The single subscription node and its group nodes.
pub async fn source_and_groups(host: &ResourceGroupsHost) -> (TreeNodeRef, Vec<TreeNodeRef>) {
    let roots = host.cloud_tree().get_children(None).await.unwrap();
    assert_eq!(roots.len(), 1, "expected one subscription node");
    let source = Arc::clone(&roots[0]);
    let groups = host.cloud_tree().get_children(Some(&source)).await.unwrap();
    (source, groups)
}

// ============================================================================
// Branch data providers
// ============================================================================

/// Native model handed out by [`ScriptedBranchProvider`].
#[derive(Debug, Clone)]
pub struct TestModel {
    pub id: Option<String>,
    pub label: String,
    pub portal_url: Option<String>,
}

impl TestModel {
    pub fn new(id: Option<&str>, label: &str) -> Self {
        Self {
            id: id.map(str::to_string),
            label: label.to_string(),
            portal_url: None,
        }
    }
}

impl BranchItem for TestModel {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn portal_url(&self) -> Option<&str> {
        self.portal_url.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub struct TestLegacyModel {
    pub full_id: String,
}

impl LegacyBranchItem for TestLegacyModel {
    fn full_id(&self) -> &str {
        &self.full_id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Branch provider with scripted children and failures. Every call builds
/// fresh model instances, like real providers do.
#[derive(Default)]
pub struct ScriptedBranchProvider {
    /// Child `(id, label)` pairs by parent id.
    pub children: Mutex<HashMap<String, Vec<(Option<String>, String)>>>,
    pub failing_resources: Mutex<Vec<String>>,
    pub empty_result: bool,
    pub child_failure: Mutex<Option<String>>,
    pub resolve_calls: AtomicUsize,
    pub changes: EventEmitter<BranchChange>,
}

impl ScriptedBranchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning_nothing() -> Self {
        Self {
            empty_result: true,
            ..Default::default()
        }
    }

    pub fn with_children(self, parent_id: &str, children: &[(Option<&str>, &str)]) -> Self {
        self.children.lock().unwrap().insert(
            parent_id.to_string(),
            children
                .iter()
                .map(|(id, label)| (id.map(str::to_string), label.to_string()))
                .collect(),
        );
        self
    }

    pub fn fail_for(self, resource_id: &str) -> Self {
        self.failing_resources.lock().unwrap().push(resource_id.to_string());
        self
    }

    pub fn resolve_count(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BranchDataProvider for ScriptedBranchProvider {
    async fn get_children(&self, element: &BranchModel) -> Result<Vec<BranchModel>> {
        let Some(parent_id) = element.own_id() else {
            return Ok(Vec::new());
        };
        if let Some(message) = self.child_failure.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        let children = self.children.lock().unwrap().get(parent_id).cloned().unwrap_or_default();
        Ok(children
            .into_iter()
            .map(|(id, label)| BranchModel::native(TestModel::new(id.as_deref(), &label)))
            .collect())
    }

    async fn get_resource_item(&self, resource: &Resource) -> Result<Option<BranchModel>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.empty_result {
            return Ok(None);
        }
        if self.failing_resources.lock().unwrap().contains(&resource.id) {
            return Err(anyhow!("AuthorizationFailed: cannot read {}", resource.name));
        }
        Ok(Some(BranchModel::native(TestModel::new(Some(&resource.id), &resource.name))))
    }

    async fn get_tree_item(&self, element: &BranchModel) -> Result<TreeItem> {
        let model = element
            .downcast_ref::<TestModel>()
            .ok_or_else(|| anyhow!("unexpected model"))?;
        let mut item = TreeItem::new(model.label.clone())
            .with_collapsible_state(CollapsibleState::Collapsed)
            .with_context_value("scripted");
        // Display-only id that must not leak into node identity.
        item.id = Some("provider-local-id".to_string());
        Ok(item)
    }

    fn on_did_change_tree_data(&self) -> Option<&EventEmitter<BranchChange>> {
        Some(&self.changes)
    }
}

// ============================================================================
// Resource providers
// ============================================================================

pub struct FailingResourceProvider;

#[async_trait]
impl ResourceProvider for FailingResourceProvider {
    async fn get_resources(&self, _source: &ResourceSource) -> Result<Option<Vec<Resource>>> {
        Err(anyhow!("ServiceUnavailable: listing failed"))
    }
}

pub struct PanickingResourceProvider;

#[async_trait]
impl ResourceProvider for PanickingResourceProvider {
    async fn get_resources(&self, _source: &ResourceSource) -> Result<Option<Vec<Resource>>> {
        panic!("provider bug");
    }
}

pub struct NoListResourceProvider;

#[async_trait]
impl ResourceProvider for NoListResourceProvider {
    async fn get_resources(&self, _source: &ResourceSource) -> Result<Option<Vec<Resource>>> {
        Ok(None)
    }
}

// ============================================================================
// Host tree widget
// ============================================================================

#[derive(Default)]
pub struct RecordingTreeHost {
    pub revealed: Mutex<Vec<String>>,
}

#[async_trait]
impl TreeViewHost for RecordingTreeHost {
    async fn reveal(&self, node: TreeNodeRef) -> Result<()> {
        self.revealed.lock().unwrap().push(node.id().to_string());
        Ok(())
    }
}

/// Collects every event fired on an emitter.
pub fn record<T: Clone + Send + 'static>(emitter: &EventEmitter<T>) -> (Arc<Mutex<Vec<T>>>, Disposable) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let subscription = emitter.subscribe(move |event: &T| sink.lock().unwrap().push(event.clone()));
    (events, subscription)
}
