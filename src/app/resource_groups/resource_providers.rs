//! Registry of resource listing providers for one resource domain.
//!
//! Providers are contributed by lazily activated plugins. The first listing
//! request activates every plugin declaring support for the domain; while
//! that pass runs, change notifications are held back and collapsed into a
//! single refresh once activation finishes.

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use super::activation::{ActivationRequest, ExtensionActivator};
use super::events::{Disposable, EventEmitter};
use super::model::{Resource, ResourceDomain, ResourceSource};

/// Payload of a resource change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceChange {
    /// The provider set or an unspecified part of the data changed.
    All,
    Resource(Resource),
}

/// Plugin-supplied component that lists resources for a source.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// `Ok(None)` means the provider produced no list; it contributes nothing.
    async fn get_resources(&self, source: &ResourceSource) -> Result<Option<Vec<Resource>>>;

    fn on_did_change_resource(&self) -> Option<&EventEmitter<ResourceChange>> {
        None
    }
}

struct ProviderEntry {
    provider: Arc<dyn ResourceProvider>,
    order: u64,
    _listener: Option<Disposable>,
}

/// Change state shared with the listeners attached to each provider.
struct ChangeGate {
    activating: AtomicBool,
    pending: AtomicBool,
    emitter: EventEmitter<ResourceChange>,
}

impl ChangeGate {
    fn notify(&self, change: ResourceChange) {
        if self.activating.load(Ordering::SeqCst) {
            self.pending.store(true, Ordering::SeqCst);
            debug!("Suppressing resource change during extension activation");
            return;
        }
        self.emitter.fire(&change);
    }
}

/// Resets the activating flag even if the activator panics.
struct ActivationGuard<'a>(&'a ChangeGate);

impl Drop for ActivationGuard<'_> {
    fn drop(&mut self) {
        self.0.activating.store(false, Ordering::SeqCst);
    }
}

pub struct ResourceProviderManager {
    domain: ResourceDomain,
    providers: Mutex<HashMap<usize, ProviderEntry>>,
    next_order: AtomicU64,
    activator: Arc<dyn ExtensionActivator>,
    activated: AtomicBool,
    gate: Arc<ChangeGate>,
}

fn provider_key(provider: &Arc<dyn ResourceProvider>) -> usize {
    Arc::as_ptr(provider) as *const () as usize
}

impl ResourceProviderManager {
    pub fn new(domain: ResourceDomain, activator: Arc<dyn ExtensionActivator>) -> Self {
        Self {
            domain,
            providers: Mutex::new(HashMap::new()),
            next_order: AtomicU64::new(0),
            activator,
            activated: AtomicBool::new(false),
            gate: Arc::new(ChangeGate {
                activating: AtomicBool::new(false),
                pending: AtomicBool::new(false),
                emitter: EventEmitter::new(),
            }),
        }
    }

    pub fn domain(&self) -> ResourceDomain {
        self.domain
    }

    /// Fired when the provider set changes or a provider reports new data.
    pub fn on_did_change_resource(&self) -> &EventEmitter<ResourceChange> {
        &self.gate.emitter
    }

    pub fn is_activating(&self) -> bool {
        self.gate.activating.load(Ordering::SeqCst)
    }

    pub fn has_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    pub fn provider_count(&self) -> usize {
        self.providers.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn add_provider(&self, provider: Arc<dyn ResourceProvider>) {
        let key = provider_key(&provider);
        let listener = provider.on_did_change_resource().map(|emitter| {
            let gate = Arc::clone(&self.gate);
            emitter.subscribe(move |change| gate.notify(change.clone()))
        });

        let entry = ProviderEntry {
            provider,
            order: self.next_order.fetch_add(1, Ordering::Relaxed),
            _listener: listener,
        };

        // A re-added provider replaces its old entry; the old listener is
        // dropped after the lock is released.
        let replaced = match self.providers.lock() {
            Ok(mut providers) => providers.insert(key, entry),
            Err(e) => {
                error!("Resource provider registry poisoned: {}", e);
                return;
            }
        };
        drop(replaced);

        info!("Registered {} resource provider", self.domain);
        self.gate.notify(ResourceChange::All);
    }

    pub fn remove_provider(&self, provider: &Arc<dyn ResourceProvider>) -> bool {
        let removed = match self.providers.lock() {
            Ok(mut providers) => providers.remove(&provider_key(provider)),
            Err(e) => {
                error!("Resource provider registry poisoned: {}", e);
                None
            }
        };

        match removed {
            Some(entry) => {
                drop(entry);
                info!("Removed {} resource provider", self.domain);
                self.gate.notify(ResourceChange::All);
                true
            }
            None => false,
        }
    }

    /// List resources for `source` from every registered provider.
    ///
    /// Providers run concurrently. A provider that fails, panics or returns
    /// no list is logged and skipped; the call itself never fails.
    pub async fn get_resources(&self, source: &ResourceSource) -> Vec<Resource> {
        let providers = self.get_resource_providers().await;
        debug!(
            "Listing {} resources for '{}' from {} providers",
            self.domain,
            source.id,
            providers.len()
        );

        let calls = providers
            .iter()
            .map(|provider| AssertUnwindSafe(provider.get_resources(source)).catch_unwind());
        let results = join_all(calls).await;

        let mut resources = Vec::new();
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(Some(list))) => resources.extend(list),
                Ok(Ok(None)) => {
                    warn!(
                        "{} resource provider #{} returned no resource list for '{}'",
                        self.domain, index, source.id
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        "{} resource provider #{} failed for '{}': {:#}",
                        self.domain, index, source.id, e
                    );
                }
                Err(_) => {
                    error!(
                        "{} resource provider #{} panicked while listing '{}'",
                        self.domain, index, source.id
                    );
                }
            }
        }

        resources
    }

    /// Registered providers in registration order, activating plugins first
    /// if that has not happened yet.
    async fn get_resource_providers(&self) -> Vec<Arc<dyn ResourceProvider>> {
        self.ensure_activated().await;

        let mut entries: Vec<(u64, Arc<dyn ResourceProvider>)> = match self.providers.lock() {
            Ok(providers) => providers
                .values()
                .map(|entry| (entry.order, Arc::clone(&entry.provider)))
                .collect(),
            Err(e) => {
                error!("Resource provider registry poisoned: {}", e);
                Vec::new()
            }
        };
        entries.sort_by_key(|(order, _)| *order);
        entries.into_iter().map(|(_, provider)| provider).collect()
    }

    async fn ensure_activated(&self) {
        if self.activated.load(Ordering::SeqCst) {
            return;
        }

        // Calls made while activation is running (including calls from the
        // activator itself) use whatever providers are registered so far.
        if self
            .gate
            .activating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("{} activation already in progress", self.domain);
            return;
        }

        {
            let _guard = ActivationGuard(&self.gate);
            info!("Activating extensions for {} resources", self.domain);
            if let Err(e) = self
                .activator
                .activate(ActivationRequest::Domain(self.domain))
                .await
            {
                warn!("Extension activation for {} failed: {:#}", self.domain, e);
            }
            self.activated.store(true, Ordering::SeqCst);
        }

        if self.gate.pending.swap(false, Ordering::SeqCst) {
            debug!("Flushing resource changes held during activation");
            self.gate.emitter.fire(&ResourceChange::All);
        }
    }
}

/// In-memory provider serving a fixed resource list, filtered by source.
#[derive(Default)]
pub struct StaticResourceProvider {
    resources: Mutex<Vec<Resource>>,
    on_did_change: EventEmitter<ResourceChange>,
}

impl StaticResourceProvider {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources: Mutex::new(resources),
            on_did_change: EventEmitter::new(),
        }
    }

    /// Replace the served list and notify listeners.
    pub fn set_resources(&self, resources: Vec<Resource>) {
        if let Ok(mut current) = self.resources.lock() {
            *current = resources;
        }
        self.on_did_change.fire(&ResourceChange::All);
    }
}

#[async_trait]
impl ResourceProvider for StaticResourceProvider {
    async fn get_resources(&self, source: &ResourceSource) -> Result<Option<Vec<Resource>>> {
        let resources = self
            .resources
            .lock()
            .map_err(|e| anyhow::anyhow!("Static resource list poisoned: {}", e))?;
        Ok(Some(
            resources
                .iter()
                .filter(|r| r.source.id.is_empty() || r.source.id == source.id)
                .cloned()
                .collect(),
        ))
    }

    fn on_did_change_resource(&self) -> Option<&EventEmitter<ResourceChange>> {
        Some(&self.on_did_change)
    }
}
