use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use super::branch_model::BranchModel;
use super::branch_providers::BranchDataProvider;
use super::errors::is_contract_violation;
use super::item_cache::BranchDataItemCache;
use super::model::{create_context_value, ViewProperties, TreeItem};
use super::placeholders::InvalidItem;
use super::tree_node::{join_id, ResourceGroupsItem, TreeNodeRef};

pub const HAS_PORTAL_URL_CONTEXT: &str = "hasPortalUrl";
pub const HAS_PROPERTIES_CONTEXT: &str = "hasProperties";

#[derive(Debug, Clone, Default)]
pub struct BranchDataItemOptions {
    /// Prepended to the derived id to keep ids from different accounts apart.
    pub id_prefix: Option<String>,
    /// Used when the model carries no id of its own.
    pub default_id: Option<String>,
    /// Id of the parent node; models without any id get a random id under it.
    pub parent_id: Option<String>,
    /// Extra classification tags merged into the tree item.
    pub context_values: Vec<String>,
    pub portal_url: Option<String>,
    pub view_properties: Option<ViewProperties>,
}

/// Tree node wrapping one provider-owned model.
pub struct BranchDataItemWrapper {
    id: String,
    branch_item: RwLock<BranchModel>,
    provider: RwLock<Arc<dyn BranchDataProvider>>,
    item_cache: Arc<BranchDataItemCache>,
    options: BranchDataItemOptions,
}

impl BranchDataItemWrapper {
    pub fn new(
        branch_item: BranchModel,
        provider: Arc<dyn BranchDataProvider>,
        item_cache: Arc<BranchDataItemCache>,
        options: BranchDataItemOptions,
    ) -> Self {
        let id = Self::stable_id(&branch_item, &options).unwrap_or_else(|| {
            let random = Uuid::new_v4().to_string();
            match (&options.parent_id, &options.id_prefix) {
                // The parent id already carries the prefix.
                (Some(parent), _) => join_id(parent, &random),
                (None, Some(prefix)) => join_id(prefix, &random),
                (None, None) => random,
            }
        });

        Self {
            id,
            branch_item: RwLock::new(branch_item),
            provider: RwLock::new(provider),
            item_cache,
            options,
        }
    }

    /// Wrap `branch_item`, reusing the cached node for its entity if any.
    pub fn create(
        branch_item: BranchModel,
        provider: Arc<dyn BranchDataProvider>,
        item_cache: Arc<BranchDataItemCache>,
        options: BranchDataItemOptions,
    ) -> Arc<Self> {
        let generation = item_cache.generation();
        Self::create_in(generation, branch_item, provider, item_cache, options)
    }

    pub(crate) fn create_in(
        generation: u64,
        branch_item: BranchModel,
        provider: Arc<dyn BranchDataProvider>,
        item_cache: Arc<BranchDataItemCache>,
        options: BranchDataItemOptions,
    ) -> Arc<Self> {
        let cache = Arc::clone(&item_cache);
        let lookup_options = options.clone();
        let current = Arc::clone(&provider);
        let item = cache.create_or_get_item_in(generation, branch_item, &lookup_options, move |model| {
            Self::new(model, provider, item_cache, options)
        });
        // A reused node may predate the registration of the type's provider.
        if !Arc::ptr_eq(&item.provider(), &current) {
            item.set_provider(current);
        }
        item
    }

    /// The id a model derives without falling back to a random id:
    /// legacy full id, else the model's own id, else `default_id`, each
    /// behind `id_prefix` when one is set.
    pub fn stable_id(branch_item: &BranchModel, options: &BranchDataItemOptions) -> Option<String> {
        let base = branch_item
            .own_id()
            .map(str::to_string)
            .or_else(|| options.default_id.clone())?;

        Some(match &options.id_prefix {
            Some(prefix) => join_id(prefix, &base),
            None => base,
        })
    }

    pub fn branch_item(&self) -> BranchModel {
        match self.branch_item.read() {
            Ok(item) => item.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn set_branch_item(&self, branch_item: BranchModel) {
        match self.branch_item.write() {
            Ok(mut item) => *item = branch_item,
            Err(poisoned) => *poisoned.into_inner() = branch_item,
        }
    }

    fn provider(&self) -> Arc<dyn BranchDataProvider> {
        match self.provider.read() {
            Ok(provider) => Arc::clone(&provider),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn set_provider(&self, provider: Arc<dyn BranchDataProvider>) {
        match self.provider.write() {
            Ok(mut current) => *current = provider,
            Err(poisoned) => *poisoned.into_inner() = provider,
        }
    }

    pub fn options(&self) -> &BranchDataItemOptions {
        &self.options
    }

    fn context_extras(&self, branch_item: &BranchModel) -> Vec<String> {
        let mut extras = Vec::new();
        if branch_item.portal_url().is_some() || self.options.portal_url.is_some() {
            extras.push(HAS_PORTAL_URL_CONTEXT.to_string());
        }
        if branch_item.view_properties().is_some() || self.options.view_properties.is_some() {
            extras.push(HAS_PROPERTIES_CONTEXT.to_string());
        }
        extras
    }
}

impl fmt::Debug for BranchDataItemWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BranchDataItemWrapper")
            .field("id", &self.id)
            .field("branch_item", &self.branch_item())
            .finish()
    }
}

#[async_trait]
impl ResourceGroupsItem for BranchDataItemWrapper {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_children(&self) -> Result<Vec<TreeNodeRef>> {
        let generation = self.item_cache.generation();
        let branch_item = self.branch_item();

        let provider = self.provider();

        let children = match provider.get_children(&branch_item).await {
            Ok(children) => children,
            Err(e) if is_contract_violation(&e) => return Err(e),
            Err(e) => {
                warn!("Failed to load children of '{}': {:#}", self.id, e);
                let placeholder = InvalidItem::new(
                    join_id(&self.id, "error"),
                    "Failed to load children",
                    &e,
                );
                return Ok(vec![Arc::new(placeholder) as TreeNodeRef]);
            }
        };
        debug!("'{}' resolved {} children", self.id, children.len());

        let child_options = BranchDataItemOptions {
            id_prefix: self.options.id_prefix.clone(),
            parent_id: Some(self.id.clone()),
            ..Default::default()
        };

        Ok(children
            .into_iter()
            .map(|child| {
                Self::create_in(
                    generation,
                    child,
                    Arc::clone(&provider),
                    Arc::clone(&self.item_cache),
                    child_options.clone(),
                ) as TreeNodeRef
            })
            .collect())
    }

    async fn get_tree_item(&self) -> Result<TreeItem> {
        let branch_item = self.branch_item();
        let mut item = self.provider().get_tree_item(&branch_item).await?;

        // The provider's id is display-only.
        item.id = Some(self.id.clone());
        let merged = item
            .context_values()
            .into_iter()
            .chain(self.options.context_values.iter().cloned())
            .chain(self.context_extras(&branch_item));
        item.context_value = Some(create_context_value(merged));
        Ok(item)
    }

    async fn get_parent(&self) -> Result<Option<TreeNodeRef>> {
        let provider = self.provider();
        if !provider.supports_parent() {
            return Ok(None);
        }
        let branch_item = self.branch_item();
        let parent = provider.get_parent(&branch_item).await?;
        Ok(parent
            .and_then(|model| self.item_cache.get_item_for_branch_item(&model))
            .map(|item| item as TreeNodeRef))
    }

    async fn resolve_tree_item(&self, item: TreeItem) -> Result<TreeItem> {
        let branch_item = self.branch_item();
        let mut resolved = self.provider().resolve_tree_item(item, &branch_item).await?;
        resolved.id = Some(self.id.clone());
        Ok(resolved)
    }

    fn branch_item(&self) -> Option<BranchModel> {
        Some(BranchDataItemWrapper::branch_item(self))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
