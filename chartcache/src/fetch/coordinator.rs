// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Fetch coordinator
//!
//! Issues reads and searches against the remote API, merges the results into
//! the store and relationship index, caches them, and tracks loading/error
//! state per resource type.
//!
//! Identical cache keys are serialised through an in-flight ledger: a caller
//! that arrives while the same key is already on the wire waits for it and
//! then reuses what the first caller cached instead of issuing a second
//! request.
//!
//! Every call may be dropped mid-flight (timeouts, aborted tasks). The status
//! board and the ledger are settled by guards, never by code after an await.

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::status::{FetchState, StatusBoard};
use super::{ApiError, ClinicalApi, FetchError};
use crate::cache::keys::{resource_key, search_key};
use crate::cache::CacheManager;
use crate::resource::{Resource, ResourceType, SearchParams, SearchResult};
use crate::store::ClinicalStore;

/// One entry of the in-flight ledger
#[derive(Default)]
struct FlightGate {
    lock: tokio::sync::Mutex<()>,
    /// Number of remote calls completed through this gate
    completed: AtomicU64,
}

/// A caller's hold on a ledger entry; the entry is removed when the last
/// caller lets go
struct FlightTicket<'a> {
    ledger: &'a Mutex<HashMap<String, Arc<FlightGate>>>,
    key: String,
    gate: Arc<FlightGate>,
}

impl Drop for FlightTicket<'_> {
    fn drop(&mut self) {
        let mut ledger = self.ledger.lock();
        // The ledger's reference plus ours
        let idle = ledger
            .get(&self.key)
            .map_or(false, |entry| {
                Arc::ptr_eq(entry, &self.gate) && Arc::strong_count(entry) == 2
            });
        if idle {
            ledger.remove(&self.key);
        }
    }
}

/// One request on the status board; counts as cancelled if dropped unsettled
struct StatusTicket<'a> {
    status: &'a RwLock<StatusBoard>,
    resource_type: ResourceType,
    epoch: u64,
    settled: bool,
}

impl<'a> StatusTicket<'a> {
    fn begin(status: &'a RwLock<StatusBoard>, resource_type: ResourceType) -> Self {
        let epoch = {
            let mut board = status.write();
            board.begin(resource_type);
            board.epoch()
        };
        Self {
            status,
            resource_type,
            epoch,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.status.write().succeed(self.resource_type);
    }

    fn fail(mut self, message: String) {
        self.settled = true;
        self.status.write().fail(self.resource_type, message);
    }
}

impl Drop for StatusTicket<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("{} request dropped before completing", self.resource_type);
            self.status.write().cancel(self.resource_type, self.epoch);
        }
    }
}

pub struct FetchCoordinator {
    api: Arc<dyn ClinicalApi>,
    cache: Arc<CacheManager>,
    store: Arc<RwLock<ClinicalStore>>,
    status: RwLock<StatusBoard>,
    in_flight: Mutex<HashMap<String, Arc<FlightGate>>>,
}

impl FetchCoordinator {
    pub fn new(
        api: Arc<dyn ClinicalApi>,
        cache: Arc<CacheManager>,
        store: Arc<RwLock<ClinicalStore>>,
    ) -> Self {
        Self {
            api,
            cache,
            store,
            status: RwLock::new(StatusBoard::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<RwLock<ClinicalStore>> {
        &self.store
    }

    /// Read one resource, from cache unless `force_refresh`
    pub async fn fetch_resource(
        &self,
        resource_type: ResourceType,
        id: &str,
        force_refresh: bool,
    ) -> Result<Resource, FetchError> {
        if !force_refresh {
            if let Some(resource) = self.cache.get_resource(resource_type, id) {
                debug!("Cache hit for {}/{}", resource_type, id);
                return Ok(resource);
            }
        }

        let ticket = self.flight(resource_key(resource_type, id));
        let gate = &ticket.gate;
        let seen = gate.completed.load(Ordering::SeqCst);
        let _permit = gate.lock.lock().await;

        if !force_refresh || gate.completed.load(Ordering::SeqCst) != seen {
            if let Some(resource) = self.cache.get_resource(resource_type, id) {
                debug!("Reusing in-flight result for {}/{}", resource_type, id);
                return Ok(resource);
            }
        }

        debug!("Fetching {}/{} from remote", resource_type, id);
        let resource = self
            .tracked(resource_type, self.api.read(resource_type, id))
            .await?;
        self.store.write().merge(std::slice::from_ref(&resource));
        self.cache.put_resource(&resource);
        gate.completed.fetch_add(1, Ordering::SeqCst);
        Ok(resource)
    }

    /// Run a search, from cache unless `force_refresh`.
    ///
    /// Results are always merged into the store, cache hit or not, because the
    /// store may have lost entities the cached result still lists. When the
    /// parameters filter on a subject, results are indexed under it.
    pub async fn search_resources(
        &self,
        resource_type: ResourceType,
        params: &SearchParams,
        force_refresh: bool,
    ) -> Result<SearchResult, FetchError> {
        if !force_refresh {
            if let Some(result) = self.cache.get_search(resource_type, params) {
                debug!("Cache hit for {} search '{}'", resource_type, params.serialize());
                self.merge_search(params, &result);
                return Ok(result);
            }
        }

        let ticket = self.flight(search_key(resource_type, params));
        let gate = &ticket.gate;
        let seen = gate.completed.load(Ordering::SeqCst);
        let _permit = gate.lock.lock().await;

        if !force_refresh || gate.completed.load(Ordering::SeqCst) != seen {
            if let Some(result) = self.cache.get_search(resource_type, params) {
                debug!("Reusing in-flight {} search", resource_type);
                self.merge_search(params, &result);
                return Ok(result);
            }
        }

        debug!(
            "Searching {} remotely with '{}'",
            resource_type,
            params.serialize()
        );
        let result = self
            .tracked(resource_type, self.api.search(resource_type, params))
            .await?;
        self.merge_search(params, &result);
        self.cache.put_search(resource_type, params, &result);
        gate.completed.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    /// Create a resource remotely and write the server's copy through
    pub async fn create_resource(&self, resource: Resource) -> Result<Resource, FetchError> {
        let resource_type = resource.resource_type();
        let created = self
            .tracked(resource_type, self.api.create(resource))
            .await?;
        self.write_through(&created);
        Ok(created)
    }

    /// Replace a resource remotely and write the server's copy through
    pub async fn save_resource(&self, resource: Resource) -> Result<Resource, FetchError> {
        let resource_type = resource.resource_type();
        let saved = self
            .tracked(resource_type, self.api.update(resource))
            .await?;
        self.write_through(&saved);
        Ok(saved)
    }

    /// Delete remotely, then drop the resource from store, index and cache
    pub async fn delete_resource(
        &self,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<(), FetchError> {
        self.tracked(resource_type, self.api.delete(resource_type, id))
            .await?;

        let removed = {
            let mut store = self.store.write();
            let removed = store.remove_resource(resource_type, id);
            if let Some(subject) = removed.as_ref().and_then(Resource::subject_id) {
                store.unindex(subject, resource_type, id);
            }
            removed
        };

        self.cache.invalidate_type(resource_type);
        if let Some(subject) = removed.as_ref().and_then(Resource::subject_id) {
            self.cache.invalidate_subject_bundles(subject);
        }
        Ok(())
    }

    pub fn state(&self, resource_type: ResourceType) -> FetchState {
        self.status.read().state(resource_type)
    }

    pub fn is_loading(&self, resource_type: ResourceType) -> bool {
        self.status.read().is_loading(resource_type)
    }

    pub fn error(&self, resource_type: ResourceType) -> Option<String> {
        self.status.read().error(resource_type)
    }

    pub fn states(&self) -> std::collections::BTreeMap<ResourceType, FetchState> {
        self.status.read().snapshot()
    }

    /// Forget loading/error state and drop every in-flight gate
    pub fn reset(&self) {
        self.status.write().clear();
        self.in_flight.lock().clear();
    }

    fn merge_search(&self, params: &SearchParams, result: &SearchResult) {
        let mut store = self.store.write();
        match params.subject_id() {
            Some(subject) => store.merge_for_subject(subject, &result.resources),
            None => store.merge(&result.resources),
        }
    }

    fn write_through(&self, resource: &Resource) {
        let subject = resource.subject_id().map(str::to_owned);
        {
            let mut store = self.store.write();
            match subject.as_deref() {
                Some(subject) => store.merge_for_subject(subject, std::slice::from_ref(resource)),
                None => store.merge(std::slice::from_ref(resource)),
            }
        }

        // Searches of this type may now be missing or listing stale copies
        self.cache.invalidate_type(resource.resource_type());
        self.cache.put_resource(resource);
        if let Some(subject) = subject {
            self.cache.invalidate_subject_bundles(&subject);
        }
    }

    /// Await a remote call while keeping the type's status board current
    async fn tracked<T, F>(&self, resource_type: ResourceType, call: F) -> Result<T, FetchError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let ticket = StatusTicket::begin(&self.status, resource_type);
        match call.await {
            Ok(value) => {
                ticket.succeed();
                Ok(value)
            }
            Err(error) => {
                warn!("{} request failed: {}", resource_type, error);
                ticket.fail(error.to_string());
                Err(FetchError::api(resource_type, error))
            }
        }
    }

    fn flight(&self, key: String) -> FlightTicket<'_> {
        let gate = self.in_flight.lock().entry(key.clone()).or_default().clone();
        FlightTicket {
            ledger: &self.in_flight,
            key,
            gate,
        }
    }
}
