use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tracing::{debug, error};

use super::events::EventEmitter;
use super::model::TreeItem;

/// Transient per-node display state, keyed by node id so it survives the
/// node being rebuilt.
#[derive(Debug, Default)]
pub struct TreeItemStateStore {
    descriptions: Mutex<HashMap<String, String>>,
    on_did_change: EventEmitter<String>,
}

/// Clears the temporary description when the operation ends or is dropped.
struct DescriptionGuard<'a> {
    store: &'a TreeItemStateStore,
    id: String,
}

impl Drop for DescriptionGuard<'_> {
    fn drop(&mut self) {
        self.store.clear_description(&self.id);
    }
}

impl TreeItemStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired with the node id whenever its state changes.
    pub fn on_did_change(&self) -> &EventEmitter<String> {
        &self.on_did_change
    }

    pub fn description(&self, id: &str) -> Option<String> {
        self.descriptions.lock().ok()?.get(id).cloned()
    }

    pub fn set_description(&self, id: &str, description: impl Into<String>) {
        match self.descriptions.lock() {
            Ok(mut descriptions) => {
                descriptions.insert(id.to_string(), description.into());
            }
            Err(e) => {
                error!("Tree item state poisoned: {}", e);
                return;
            }
        }
        self.on_did_change.fire(&id.to_string());
    }

    pub fn clear_description(&self, id: &str) {
        let removed = match self.descriptions.lock() {
            Ok(mut descriptions) => descriptions.remove(id).is_some(),
            Err(e) => {
                error!("Tree item state poisoned: {}", e);
                false
            }
        };
        if removed {
            self.on_did_change.fire(&id.to_string());
        }
    }

    /// Overlay the stored state onto a freshly built tree item.
    pub fn apply(&self, id: &str, item: &mut TreeItem) {
        if let Some(description) = self.description(id) {
            item.description = Some(description);
        }
    }

    /// Show `description` on node `id` while `operation` runs.
    pub async fn run_with_temporary_description<F, T>(
        &self,
        id: &str,
        description: impl Into<String>,
        operation: F,
    ) -> T
    where
        F: Future<Output = T>,
    {
        let description = description.into();
        debug!("Showing '{}' on '{}'", description, id);
        self.set_description(id, description);
        let _guard = DescriptionGuard {
            store: self,
            id: id.to_string(),
        };
        operation.await
    }
}
