use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

use super::branch_providers::BranchDataProviderManager;
use super::grouping::{resolve_resource_node, sort_resources};
use super::item_cache::BranchDataItemCache;
use super::model::ResourceSource;
use super::resource_providers::ResourceProviderManager;
use super::tree_data_provider::TreeRoot;
use super::tree_node::TreeNodeRef;

/// Root of the workspace tree: every workspace resource at the top level,
/// sorted by name, expanded through its branch data provider.
pub struct WorkspaceResourceRoot {
    resource_manager: Arc<ResourceProviderManager>,
    branch_manager: Arc<BranchDataProviderManager>,
    item_cache: Arc<BranchDataItemCache>,
}

impl WorkspaceResourceRoot {
    pub fn new(
        resource_manager: Arc<ResourceProviderManager>,
        branch_manager: Arc<BranchDataProviderManager>,
        item_cache: Arc<BranchDataItemCache>,
    ) -> Self {
        Self {
            resource_manager,
            branch_manager,
            item_cache,
        }
    }
}

#[async_trait]
impl TreeRoot for WorkspaceResourceRoot {
    async fn get_children(&self) -> Result<Vec<TreeNodeRef>> {
        let generation = self.item_cache.generation();
        let source = ResourceSource::workspace();
        let mut resources = self.resource_manager.get_resources(&source).await;
        sort_resources(&mut resources);
        debug!("Workspace tree has {} resources", resources.len());

        Ok(join_all(resources.iter().map(|resource| {
            resolve_resource_node(
                &self.branch_manager,
                &self.item_cache,
                generation,
                resource,
                None,
                &source.id,
            )
        }))
        .await)
    }
}
