use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use super::events::EventEmitter;
use super::settings::{PinnedItemsScope, SettingsStore};
use super::tree_node::ids_equal;

pub const PINNED_ITEMS_KEY: &str = "resourceGroups.pinnedItems";
pub const PINNED_CONTEXT: &str = "pinned";

/// Ordered list of pinned node ids, persisted as a string array.
pub struct PinnedItems {
    store: Arc<dyn SettingsStore>,
    on_did_change: EventEmitter<String>,
}

impl PinnedItems {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            on_did_change: EventEmitter::new(),
        }
    }

    /// Pick the global or workspace store according to `scope`.
    pub fn for_scope(
        scope: PinnedItemsScope,
        global: Arc<dyn SettingsStore>,
        workspace: Arc<dyn SettingsStore>,
    ) -> Self {
        debug!("Pinned items use the {:?} store", scope);
        match scope {
            PinnedItemsScope::Global => Self::new(global),
            PinnedItemsScope::Workspace => Self::new(workspace),
        }
    }

    /// Fired with the id of every pinned or unpinned node.
    pub fn on_did_change(&self) -> &EventEmitter<String> {
        &self.on_did_change
    }

    pub fn items(&self) -> Vec<String> {
        self.store.get_string_list(PINNED_ITEMS_KEY)
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.items().iter().any(|pinned| ids_equal(pinned, id))
    }

    /// Returns false when the id was already pinned.
    pub fn pin(&self, id: &str) -> Result<bool> {
        let mut items = self.items();
        if items.iter().any(|pinned| ids_equal(pinned, id)) {
            return Ok(false);
        }
        items.push(id.to_string());
        self.store.update(PINNED_ITEMS_KEY, json!(items))?;
        info!("Pinned '{}'", id);
        self.on_did_change.fire(&id.to_string());
        Ok(true)
    }

    /// Returns false when the id was not pinned.
    pub fn unpin(&self, id: &str) -> Result<bool> {
        let mut items = self.items();
        let before = items.len();
        items.retain(|pinned| !ids_equal(pinned, id));
        if items.len() == before {
            return Ok(false);
        }
        self.store.update(PINNED_ITEMS_KEY, json!(items))?;
        info!("Unpinned '{}'", id);
        self.on_did_change.fire(&id.to_string());
        Ok(true)
    }
}
