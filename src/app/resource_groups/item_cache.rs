//! Mapping between provider models and the wrapper nodes built for them.
//!
//! Provider models are not identity-stable: a provider may hand out a new
//! instance for the same entity on every call. The cache therefore keeps an
//! id index next to the identity map, so a fresh instance resolves to the
//! node that already represents it. Reusing that node keeps any state the
//! host attached to it (selection, pending description) across refreshes.
//!
//! Lifetime is tied to tree refreshes only: [`BranchDataItemCache::clear`]
//! is called on a root-level refresh and nothing is ever evicted otherwise.
//! Each clear starts a new generation; results of fetches that began in an
//! older generation are handed back to their caller but not registered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

use super::branch_model::{BranchModel, ModelKey};
use super::tree_node::ResourceGroupsItem;
use super::wrapper::{BranchDataItemOptions, BranchDataItemWrapper};

struct CachedItem {
    // Held so the model allocation, and with it the key, stays unique.
    model: BranchModel,
    item: Arc<BranchDataItemWrapper>,
}

#[derive(Default)]
struct CacheMaps {
    by_model: HashMap<ModelKey, CachedItem>,
    by_id: HashMap<String, ModelKey>,
}

impl CacheMaps {
    fn insert(&mut self, model: &BranchModel, item: &Arc<BranchDataItemWrapper>) {
        let key = model.key();
        // The node may have been registered under an older instance.
        if let Some(previous) = self.by_id.insert(item.id().to_string(), key) {
            if previous != key {
                self.by_model.remove(&previous);
            }
        }
        self.by_model.insert(
            key,
            CachedItem {
                model: model.clone(),
                item: Arc::clone(item),
            },
        );
    }

    fn lookup_id(&self, id: &str) -> Option<Arc<BranchDataItemWrapper>> {
        self.by_id
            .get(id)
            .and_then(|key| self.by_model.get(key))
            .map(|cached| Arc::clone(&cached.item))
    }

    fn lookup_model(&self, model: &BranchModel) -> Option<Arc<BranchDataItemWrapper>> {
        if let Some(cached) = self.by_model.get(&model.key()) {
            return Some(Arc::clone(&cached.item));
        }

        let own_id = model.own_id()?;
        if let Some(item) = self.lookup_id(own_id) {
            return Some(item);
        }

        // Prefixed nodes are indexed under their full id; fall back to the
        // model's own id.
        self.by_model
            .values()
            .find(|cached| cached.model.own_id() == Some(own_id))
            .map(|cached| Arc::clone(&cached.item))
    }
}

#[derive(Default)]
pub struct BranchDataItemCache {
    maps: RwLock<CacheMaps>,
    generation: AtomicU64,
}

impl BranchDataItemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cache generation; bumped by every [`clear`](Self::clear).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.maps.read().map(|m| m.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_branch_item(&self, model: &BranchModel, item: &Arc<BranchDataItemWrapper>) {
        match self.maps.write() {
            Ok(mut maps) => maps.insert(model, item),
            Err(e) => error!("Branch item cache poisoned: {}", e),
        }
    }

    /// Node for `model`: by instance first, then by the model's id.
    pub fn get_item_for_branch_item(&self, model: &BranchModel) -> Option<Arc<BranchDataItemWrapper>> {
        self.maps.read().ok()?.lookup_model(model)
    }

    /// Node whose stable id equals `id` (exact match first, then ignoring case).
    pub fn get_item_for_id(&self, id: &str) -> Option<Arc<BranchDataItemWrapper>> {
        let maps = self.maps.read().ok()?;
        if let Some(item) = maps.lookup_id(id) {
            return Some(item);
        }
        maps.by_id
            .iter()
            .find(|(cached_id, _)| cached_id.eq_ignore_ascii_case(id))
            .and_then(|(_, key)| maps.by_model.get(key))
            .map(|cached| Arc::clone(&cached.item))
    }

    /// Reuse the node already representing `model`'s entity, or build one
    /// with `create`. A reused node is re-pointed at the fresh instance.
    pub fn create_or_get_item<F>(
        &self,
        model: BranchModel,
        options: &BranchDataItemOptions,
        create: F,
    ) -> Arc<BranchDataItemWrapper>
    where
        F: FnOnce(BranchModel) -> BranchDataItemWrapper,
    {
        self.create_or_get_item_in(self.generation(), model, options, create)
    }

    /// Like [`create_or_get_item`](Self::create_or_get_item) for a fetch that
    /// started in `generation`. Stale results get a fresh node that is
    /// returned unregistered.
    pub fn create_or_get_item_in<F>(
        &self,
        generation: u64,
        model: BranchModel,
        options: &BranchDataItemOptions,
        create: F,
    ) -> Arc<BranchDataItemWrapper>
    where
        F: FnOnce(BranchModel) -> BranchDataItemWrapper,
    {
        let mut maps = match self.maps.write() {
            Ok(maps) => maps,
            Err(e) => {
                error!("Branch item cache poisoned: {}", e);
                return Arc::new(create(model));
            }
        };

        // Nodes in the cache belong to the current generation; a late result
        // must neither repoint nor reuse them.
        if generation != self.generation() {
            debug!(
                "Discarding cache registration from generation {} (current {})",
                generation,
                self.generation()
            );
            drop(maps);
            return Arc::new(create(model));
        }

        let existing = match maps.by_model.get(&model.key()) {
            Some(cached) => Some(Arc::clone(&cached.item)),
            None => BranchDataItemWrapper::stable_id(&model, options)
                .and_then(|id| maps.lookup_id(&id)),
        };

        if let Some(item) = existing {
            item.set_branch_item(model.clone());
            maps.insert(&model, &item);
            return item;
        }

        let item = Arc::new(create(model.clone()));
        maps.insert(&model, &item);
        item
    }

    /// Drop every mapping and start a new generation.
    pub fn clear(&self) {
        match self.maps.write() {
            Ok(mut maps) => {
                let count = maps.by_id.len();
                maps.by_model.clear();
                maps.by_id.clear();
                // Bumped under the lock so registrations see a consistent pair.
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Cleared {} cached tree items, generation {}", count, generation);
            }
            Err(e) => error!("Branch item cache poisoned: {}", e),
        }
    }
}
