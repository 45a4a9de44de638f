// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Chart session: the one object a workspace front-end holds
//!
//! Owns the cache, store, fetch coordinator, progressive loader and
//! invalidation listener for the lifetime of one page session. Views read
//! through the accessors here; nothing is global.

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::SessionError;
use crate::cache::{CacheConfig, CacheManager, CacheStats};
use crate::fetch::{ClinicalApi, FetchCoordinator, FetchState};
use crate::loader::{
    InvalidationListener, InvalidationRecord, InvalidationSignal, InvalidationStats, LoadTier,
    ProgressiveLoader, SubjectContext,
};
use crate::resource::{PatientBundle, Resource, ResourceType, SearchParams, SearchResult};
use crate::store::ClinicalStore;

const SIGNAL_CHANNEL_CAPACITY: usize = 64;

pub struct ChartSession {
    cache: Arc<CacheManager>,
    store: Arc<RwLock<ClinicalStore>>,
    coordinator: Arc<FetchCoordinator>,
    loader: Arc<ProgressiveLoader>,
    listener: Arc<InvalidationListener>,
    signals: broadcast::Sender<InvalidationSignal>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChartSession {
    /// Build a session over `api`. Nothing runs until [`start`](Self::start).
    pub fn new(api: Arc<dyn ClinicalApi>, config: CacheConfig) -> Result<Arc<Self>, SessionError> {
        let history = config.invalidation_history;
        let cache = Arc::new(CacheManager::new(config)?);
        let store = Arc::new(RwLock::new(ClinicalStore::new()));
        let coordinator = Arc::new(FetchCoordinator::new(api, cache.clone(), store.clone()));
        let loader = Arc::new(ProgressiveLoader::new(coordinator.clone()));
        let listener = Arc::new(InvalidationListener::new(loader.clone(), history));
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);

        Ok(Arc::new(Self {
            cache,
            store,
            coordinator,
            loader,
            listener,
            signals,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Start the expiry sweep and the invalidation listener. Idempotent.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        tasks.push(self.cache.spawn_sweeper());
        tasks.push(self.listener.spawn(self.signals.subscribe()));
        info!("Chart session started");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Stop background work and drop every cached and stored resource
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.loader.reset();
        self.coordinator.reset();
        self.cache.clear();
        self.store.write().clear();
        self.listener.clear_history();
        info!("Chart session shut down");
    }

    // ---- patient context ----

    pub async fn set_current_patient(&self, subject_id: &str) -> SubjectContext {
        self.loader.set_current_patient(subject_id).await
    }

    pub fn current_patient(&self) -> Option<SubjectContext> {
        self.loader.context()
    }

    /// True while a patient switch waits on its critical tier
    pub fn is_loading_patient(&self) -> bool {
        self.loader.is_loading()
    }

    pub async fn refresh_patient_resources(&self, subject_id: &str) -> Option<PatientBundle> {
        self.loader.refresh_patient_resources(subject_id).await
    }

    pub async fn fetch_patient_bundle(
        &self,
        subject_id: &str,
        force_refresh: bool,
        tier: LoadTier,
    ) -> PatientBundle {
        self.loader
            .fetch_patient_bundle(subject_id, force_refresh, tier)
            .await
    }

    // ---- invalidation ----

    /// Sender for "resources changed" signals, e.g. for a push-notification bridge
    pub fn invalidation_sender(&self) -> broadcast::Sender<InvalidationSignal> {
        self.signals.clone()
    }

    /// Publish a change signal for `subject_id`; returns the number of listeners reached
    pub fn notify_resources_changed(&self, subject_id: &str) -> usize {
        match self.signals.send(InvalidationSignal::new(subject_id)) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No invalidation listener running for {}", subject_id);
                0
            }
        }
    }

    pub fn invalidation_history(&self, limit: usize) -> Vec<InvalidationRecord> {
        self.listener.recent(limit)
    }

    pub fn invalidation_stats(&self) -> InvalidationStats {
        self.listener.stats()
    }

    // ---- remote operations ----

    pub async fn fetch_resource(
        &self,
        resource_type: ResourceType,
        id: &str,
        force_refresh: bool,
    ) -> Result<Resource, SessionError> {
        Ok(self
            .coordinator
            .fetch_resource(resource_type, id, force_refresh)
            .await?)
    }

    pub async fn search_resources(
        &self,
        resource_type: ResourceType,
        params: &SearchParams,
        force_refresh: bool,
    ) -> Result<SearchResult, SessionError> {
        Ok(self
            .coordinator
            .search_resources(resource_type, params, force_refresh)
            .await?)
    }

    pub async fn create_resource(&self, resource: Resource) -> Result<Resource, SessionError> {
        Ok(self.coordinator.create_resource(resource).await?)
    }

    pub async fn save_resource(&self, resource: Resource) -> Result<Resource, SessionError> {
        Ok(self.coordinator.save_resource(resource).await?)
    }

    pub async fn delete_resource(
        &self,
        resource_type: ResourceType,
        id: &str,
    ) -> Result<(), SessionError> {
        Ok(self.coordinator.delete_resource(resource_type, id).await?)
    }

    // ---- local read model ----

    pub fn get_resource(&self, resource_type: ResourceType, id: &str) -> Option<Resource> {
        self.store.read().get_resource(resource_type, id)
    }

    pub fn get_resources_by_type(&self, resource_type: ResourceType) -> Vec<Resource> {
        self.store.read().get_resources_by_type(resource_type)
    }

    pub fn get_patient_resources(
        &self,
        subject_id: &str,
        resource_type: Option<ResourceType>,
    ) -> Vec<Resource> {
        self.store
            .read()
            .get_patient_resources(subject_id, resource_type)
    }

    pub fn add_resource(
        &self,
        resource_type: ResourceType,
        resource: Resource,
    ) -> Result<(), SessionError> {
        Ok(self.store.write().add_resource(resource_type, resource)?)
    }

    pub fn set_resources(
        &self,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Result<usize, SessionError> {
        Ok(self.store.write().set_resources(resource_type, resources)?)
    }

    pub fn update_resource(
        &self,
        resource_type: ResourceType,
        id: &str,
        partial: &Value,
    ) -> Result<Resource, SessionError> {
        Ok(self
            .store
            .write()
            .update_resource(resource_type, id, partial)?)
    }

    pub fn remove_resource(&self, resource_type: ResourceType, id: &str) -> Option<Resource> {
        self.store.write().remove_resource(resource_type, id)
    }

    // ---- status ----

    pub fn is_loading(&self, resource_type: ResourceType) -> bool {
        self.coordinator.is_loading(resource_type)
    }

    pub fn error(&self, resource_type: ResourceType) -> Option<String> {
        self.coordinator.error(resource_type)
    }

    pub fn fetch_state(&self, resource_type: ResourceType) -> FetchState {
        self.coordinator.state(resource_type)
    }

    pub fn fetch_states(&self) -> BTreeMap<ResourceType, FetchState> {
        self.coordinator.states()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }
}

impl Drop for ChartSession {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}
