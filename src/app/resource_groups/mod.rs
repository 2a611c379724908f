//! Resource groups: aggregation of plugin-contributed resources into
//! groupable, lazily loaded trees.
//!
//! # Components
//!
//! - [`resource_providers`] - registry of resource listing providers per domain
//! - [`branch_providers`] - registry of branch data providers per resource type
//! - [`item_cache`] - provider model to tree node mapping with stable ids
//! - [`wrapper`] - the node wrapping one provider model
//! - [`grouping`] - partitioning of resource lists into group nodes
//! - [`tree_data_provider`] - per-view orchestrator and change translation
//! - [`host`] - wiring of both domains and the plugin-facing API
//!
//! Supporting modules cover events, activation, settings, pinned items,
//! transient node state and the two tree roots.

pub mod activation;
pub mod branch_model;
pub mod branch_providers;
pub mod cloud_tree;
pub mod errors;
pub mod events;
pub mod grouping;
pub mod host;
pub mod item_cache;
pub mod item_state;
pub mod model;
pub mod pinned;
pub mod placeholders;
pub mod resource_providers;
pub mod settings;
pub mod supported_types;
pub mod tree_data_provider;
pub mod tree_node;
pub mod workspace_tree;
pub mod wrapper;

pub use activation::{ActivationRequest, ExtensionActivator, NoopActivator};
pub use branch_model::{BranchItem, BranchModel, LegacyBranchItem, ModelKey};
pub use branch_providers::{
    BranchChange, BranchDataProvider, BranchDataProviderManager, DefaultBranchDataProvider,
    DefaultResourceModel,
};
pub use cloud_tree::{CloudResourceRoot, SourceItem, SourceProvider, StaticSourceProvider};
pub use errors::{parse_error, ParsedError, TreeError};
pub use events::{Disposable, DisposableStore, EventEmitter};
pub use grouping::{GroupingContext, GroupingItem, GroupingKind, GroupingManager};
pub use host::{HostOptions, ResourceGroupsHost};
pub use item_cache::BranchDataItemCache;
pub use item_state::TreeItemStateStore;
pub use model::{
    CollapsibleState, Resource, ResourceDomain, ResourceSource, SourceKind, TreeItem, ViewProperties,
};
pub use pinned::PinnedItems;
pub use placeholders::{InvalidItem, SeparatorItem};
pub use resource_providers::{
    ResourceChange, ResourceProvider, ResourceProviderManager, StaticResourceProvider,
};
pub use settings::{
    GroupBySetting, JsonFileSettingsStore, MemorySettingsStore, PinnedItemsScope, SettingsStore,
    TreeSettings,
};
pub use supported_types::{SupportedType, SupportedTypeRegistry};
pub use tree_data_provider::{
    RefreshRequest, RefreshState, ResourceTreeDataProvider, RevealTarget, TreeChange, TreeRoot,
    TreeViewHost,
};
pub use tree_node::{ResourceGroupsItem, TreeNodeRef};
pub use workspace_tree::WorkspaceResourceRoot;
pub use wrapper::{BranchDataItemOptions, BranchDataItemWrapper};
