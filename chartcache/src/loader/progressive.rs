// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Progressive patient loading
//!
//! Switching the current patient loads the critical tier before returning,
//! then schedules the important tier and the full bundle in the background.
//! Every switch bumps a generation counter; a delayed tier whose generation
//! is no longer current is skipped. A switch runs on its own task and always
//! finishes, even when the caller stops waiting for it.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};

use super::tiers::{standard_params, LoadTier};
use crate::fetch::FetchCoordinator;
use crate::resource::{PatientBundle, Resource, ResourceType};

/// The current patient and what was loaded for them
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectContext {
    pub subject_id: String,
    pub patient: Option<Resource>,
    pub current_encounter: Option<Resource>,
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

/// Holds the loading flag up until dropped
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ProgressiveLoader {
    coordinator: Arc<FetchCoordinator>,
    context: RwLock<Option<SubjectContext>>,
    generation: AtomicU64,
    loading: AtomicBool,
    /// Serialises subject switches
    switching: tokio::sync::Mutex<()>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl ProgressiveLoader {
    pub fn new(coordinator: Arc<FetchCoordinator>) -> Self {
        Self {
            coordinator,
            context: RwLock::new(None),
            generation: AtomicU64::new(0),
            loading: AtomicBool::new(false),
            switching: tokio::sync::Mutex::new(()),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn context(&self) -> Option<SubjectContext> {
        self.context.read().clone()
    }

    pub fn current_subject(&self) -> Option<String> {
        self.context.read().as_ref().map(|c| c.subject_id.clone())
    }

    pub fn is_current(&self, subject_id: &str) -> bool {
        self.context
            .read()
            .as_ref()
            .map_or(false, |c| c.subject_id == subject_id)
    }

    /// True while a subject switch is waiting on its critical tier
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fetch one tier of a patient's resources.
    ///
    /// Types are fetched concurrently. A failed type is recorded in the
    /// bundle with an empty list; the bundle itself never fails. Only complete
    /// bundles are cached, so a failed type is retried on the next call.
    pub async fn fetch_patient_bundle(
        &self,
        subject_id: &str,
        force_refresh: bool,
        tier: LoadTier,
    ) -> PatientBundle {
        let cache = self.coordinator.cache();

        if !force_refresh {
            if let Some(bundle) = cache.get_bundle(subject_id, tier.as_str()) {
                debug!("Using cached {} bundle for subject {}", tier, subject_id);
                let resources: Vec<Resource> =
                    bundle.resources.values().flatten().cloned().collect();
                self.coordinator
                    .store()
                    .write()
                    .merge_for_subject(subject_id, &resources);
                return bundle;
            }
        }

        let mut tasks = JoinSet::new();
        for resource_type in tier.resource_types() {
            let coordinator = Arc::clone(&self.coordinator);
            let params = standard_params(subject_id, resource_type);
            tasks.spawn(async move {
                let result = coordinator
                    .search_resources(resource_type, &params, force_refresh)
                    .await;
                (resource_type, result)
            });
        }

        let mut bundle = PatientBundle::new(subject_id);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((resource_type, Ok(result))) => bundle.insert(resource_type, result.resources),
                Ok((resource_type, Err(error))) => {
                    bundle.record_error(resource_type, error.to_string())
                }
                Err(error) => warn!("Bundle fetch task for {} failed: {}", subject_id, error),
            }
        }
        // A task that panicked reported nothing for its type
        for resource_type in tier.resource_types() {
            if !bundle.resources.contains_key(&resource_type) {
                bundle.record_error(resource_type, "Fetch task did not complete");
            }
        }

        if bundle.is_complete() {
            cache.put_bundle(
                subject_id,
                tier.as_str(),
                &bundle,
                tier.bundle_ttl(cache.config()),
                tier.cache_priority(),
            );
        } else {
            warn!(
                "{} bundle for subject {} is partial: {} type(s) failed",
                tier,
                subject_id,
                bundle.errors.len()
            );
        }

        debug!(
            "Assembled {} bundle for subject {} ({} resources)",
            tier,
            subject_id,
            bundle.resource_count()
        );
        bundle
    }

    /// Make `subject_id` the current patient.
    ///
    /// Returns as soon as the patient and the critical tier are loaded. Asking
    /// for the patient that is already current returns its context without
    /// touching the network.
    pub async fn set_current_patient(self: &Arc<Self>, subject_id: &str) -> SubjectContext {
        if let Some(context) = self.current_context_for(subject_id) {
            return context;
        }

        // Detached: dropping this future does not interrupt the switch
        let loader = Arc::clone(self);
        let subject = subject_id.to_string();
        match tokio::spawn(async move { loader.switch_to(&subject).await }).await {
            Ok(context) => context,
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => {
                warn!("Switch to subject {} did not complete: {}", subject_id, error);
                SubjectContext {
                    subject_id: subject_id.to_string(),
                    patient: None,
                    current_encounter: None,
                    generation: self.generation(),
                    loaded_at: Utc::now(),
                }
            }
        }
    }

    async fn switch_to(self: &Arc<Self>, subject_id: &str) -> SubjectContext {
        let _switching = self.switching.lock().await;
        if let Some(context) = self.current_context_for(subject_id) {
            return context;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Switching current subject to {}", subject_id);
        let loading = LoadingFlag::raise(&self.loading);
        self.coordinator
            .store()
            .write()
            .set_current_subject(Some(subject_id.to_string()));

        let patient = match self
            .coordinator
            .fetch_resource(ResourceType::Patient, subject_id, false)
            .await
        {
            Ok(patient) => Some(patient),
            Err(error) => {
                warn!("Could not load patient {}: {}", subject_id, error);
                None
            }
        };
        let critical = self
            .fetch_patient_bundle(subject_id, false, LoadTier::Critical)
            .await;

        let context = SubjectContext {
            subject_id: subject_id.to_string(),
            patient,
            current_encounter: select_current_encounter(critical.get(ResourceType::Encounter)),
            generation,
            loaded_at: Utc::now(),
        };
        if self.generation() != generation {
            debug!("Subject {} was reset while loading", subject_id);
            return context;
        }
        *self.context.write() = Some(context.clone());
        drop(loading);

        let config = self.coordinator.cache().config();
        self.schedule(
            subject_id,
            generation,
            LoadTier::Important,
            config.important_tier_delay,
        );
        self.schedule(subject_id, generation, LoadTier::Full, config.full_tier_delay);

        context
    }

    /// Re-fetch everything for the current patient, bypassing the cache.
    ///
    /// Does nothing (and returns `None`) for any other subject.
    pub async fn refresh_patient_resources(&self, subject_id: &str) -> Option<PatientBundle> {
        if !self.is_current(subject_id) {
            debug!("Ignoring refresh for non-current subject {}", subject_id);
            return None;
        }

        info!("Refreshing resources for subject {}", subject_id);
        let cache = self.coordinator.cache();
        cache.invalidate_subject_bundles(subject_id);
        for resource_type in LoadTier::Full.resource_types() {
            cache.invalidate_search(resource_type, &standard_params(subject_id, resource_type));
        }
        self.coordinator
            .store()
            .write()
            .clear_subject_index(subject_id);

        Some(
            self.fetch_patient_bundle(subject_id, true, LoadTier::Full)
                .await,
        )
    }

    /// Forget the current patient and stop pending background tiers
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
        *self.context.write() = None;
        self.loading.store(false, Ordering::SeqCst);
        self.coordinator.store().write().set_current_subject(None);
    }

    fn current_context_for(&self, subject_id: &str) -> Option<SubjectContext> {
        self.context
            .read()
            .as_ref()
            .filter(|c| c.subject_id == subject_id)
            .cloned()
    }

    fn schedule(
        self: &Arc<Self>,
        subject_id: &str,
        generation: u64,
        tier: LoadTier,
        delay: std::time::Duration,
    ) {
        let loader = Arc::clone(self);
        let subject_id = subject_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if loader.generation() != generation {
                debug!(
                    "Skipping {} tier for subject {}: subject switched",
                    tier, subject_id
                );
                return;
            }
            loader.fetch_patient_bundle(&subject_id, false, tier).await;
        });

        let mut background = self.background.lock();
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }
}

/// First in-progress encounter, else the one that started most recently
fn select_current_encounter(encounters: &[Resource]) -> Option<Resource> {
    let start = |e: &Resource| {
        e.field("period")
            .and_then(|p| p.get("start"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    };
    encounters
        .iter()
        .find(|e| e.status() == Some("in-progress"))
        .or_else(|| encounters.iter().max_by_key(|e| start(e)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheManager};
    use crate::fetch::{ApiError, ClinicalApi, InMemoryApi};
    use crate::resource::{patient_reference, SearchParams, SearchResult};
    use async_trait::async_trait;
    use crate::store::ClinicalStore;
    use serde_json::json;
    use std::time::Duration;

    fn encounter(id: &str, subject: &str, status: &str, start: &str) -> Resource {
        Resource::new(
            ResourceType::Encounter,
            id,
            json!({"subject": patient_reference(subject), "status": status, "period": {"start": start}}),
        )
    }

    fn chart(subject: &str) -> Vec<Resource> {
        vec![
            Resource::new(ResourceType::Patient, subject, json!({})),
            encounter(&format!("{}-e1", subject), subject, "finished", "2024-01-01"),
            encounter(&format!("{}-e2", subject), subject, "finished", "2024-05-01"),
            Resource::new(
                ResourceType::Condition,
                format!("{}-c1", subject),
                json!({"subject": patient_reference(subject)}),
            ),
            Resource::new(
                ResourceType::Observation,
                format!("{}-o1", subject),
                json!({"subject": patient_reference(subject), "effectiveDateTime": "2024-02-01"}),
            ),
            Resource::new(
                ResourceType::Immunization,
                format!("{}-i1", subject),
                json!({"patient": patient_reference(subject)}),
            ),
        ]
    }

    fn setup(resources: Vec<Resource>) -> (Arc<InMemoryApi>, Arc<ProgressiveLoader>) {
        let api = Arc::new(InMemoryApi::with_resources(resources));
        (api.clone(), loader_over(api))
    }

    fn loader_over(api: Arc<dyn ClinicalApi>) -> Arc<ProgressiveLoader> {
        let cache = Arc::new(CacheManager::new(CacheConfig::default()).unwrap());
        let store = Arc::new(RwLock::new(ClinicalStore::new()));
        let coordinator = Arc::new(FetchCoordinator::new(api, cache, store));
        Arc::new(ProgressiveLoader::new(coordinator))
    }

    /// Crashes while searching one resource type
    struct CrashingApi {
        inner: InMemoryApi,
        crash_on: ResourceType,
    }

    #[async_trait]
    impl ClinicalApi for CrashingApi {
        async fn read(&self, resource_type: ResourceType, id: &str) -> Result<Resource, ApiError> {
            self.inner.read(resource_type, id).await
        }

        async fn search(
            &self,
            resource_type: ResourceType,
            params: &SearchParams,
        ) -> Result<SearchResult, ApiError> {
            if resource_type == self.crash_on {
                panic!("{} search handler crashed", resource_type);
            }
            self.inner.search(resource_type, params).await
        }

        async fn create(&self, resource: Resource) -> Result<Resource, ApiError> {
            self.inner.create(resource).await
        }

        async fn update(&self, resource: Resource) -> Result<Resource, ApiError> {
            self.inner.update(resource).await
        }

        async fn delete(&self, resource_type: ResourceType, id: &str) -> Result<(), ApiError> {
            self.inner.delete(resource_type, id).await
        }
    }

    #[test]
    fn test_current_encounter_prefers_in_progress() {
        let encounters = vec![
            encounter("old", "1", "finished", "2024-01-01"),
            encounter("open", "1", "in-progress", "2023-06-01"),
            encounter("new", "1", "finished", "2024-06-01"),
        ];
        assert_eq!(select_current_encounter(&encounters).unwrap().id(), "open");
        assert_eq!(select_current_encounter(&encounters[2..]).unwrap().id(), "new");
        assert_eq!(
            select_current_encounter(&[encounters[0].clone(), encounters[2].clone()])
                .unwrap()
                .id(),
            "new"
        );
        assert!(select_current_encounter(&[]).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_tier_is_loaded_before_return() {
        let (api, loader) = setup(chart("1"));

        let context = loader.set_current_patient("1").await;

        assert_eq!(context.subject_id, "1");
        assert!(context.patient.is_some());
        assert_eq!(context.current_encounter.unwrap().id(), "1-e2");
        assert!(!loader.is_loading());
        assert_eq!(api.search_count_for(ResourceType::Observation), 0);

        let store = loader.coordinator().store().read();
        assert_eq!(
            store
                .get_patient_resources("1", Some(ResourceType::Condition))
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_tiers_follow() {
        let (api, loader) = setup(chart("1"));
        loader.set_current_patient("1").await;

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(api.search_count_for(ResourceType::Observation), 1);
        assert_eq!(api.search_count_for(ResourceType::Immunization), 1);
        // Critical types were served from the search cache by the full tier
        assert_eq!(api.search_count_for(ResourceType::Condition), 1);
        let store = loader.coordinator().store().read();
        assert_eq!(store.get_patient_resources("1", None).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_subject_skips_stale_tiers() {
        let mut resources = chart("1");
        resources.extend(chart("2"));
        let (api, loader) = setup(resources);

        loader.set_current_patient("1").await;
        loader.set_current_patient("2").await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(api.search_count_for(ResourceType::Observation), 1);
        assert!(loader
            .coordinator()
            .store()
            .read()
            .get_resource(ResourceType::Observation, "1-o1")
            .is_none());
        assert_eq!(loader.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_bundle_failure() {
        let (api, loader) = setup(chart("1"));
        api.fail_type(ResourceType::Condition, ApiError::status(500, "boom"));

        let bundle = loader
            .fetch_patient_bundle("1", false, LoadTier::Critical)
            .await;

        assert_eq!(bundle.resources.len(), 4);
        assert!(bundle.get(ResourceType::Condition).is_empty());
        assert_eq!(bundle.get(ResourceType::Encounter).len(), 2);
        assert!(bundle.errors.contains_key(&ResourceType::Condition));
        assert!(loader
            .coordinator()
            .cache()
            .get_bundle("1", "critical")
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ignores_non_current_subject() {
        let (api, loader) = setup(chart("1"));
        loader.set_current_patient("1").await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        api.reset_counters();

        assert!(loader.refresh_patient_resources("2").await.is_none());
        assert_eq!(api.call_count(), 0);

        let bundle = loader.refresh_patient_resources("1").await.unwrap();
        assert_eq!(bundle.resource_count(), 5);
        assert_eq!(api.search_count(), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_forgets_subject() {
        let (api, loader) = setup(chart("1"));
        loader.set_current_patient("1").await;
        loader.reset();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(loader.context().is_none());
        assert_eq!(api.search_count_for(ResourceType::Observation), 0);
        assert!(loader.coordinator().store().read().current_subject().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_crashed_type_task_marks_bundle_partial() {
        let loader = loader_over(Arc::new(CrashingApi {
            inner: InMemoryApi::with_resources(chart("1")),
            crash_on: ResourceType::Condition,
        }));

        let bundle = loader
            .fetch_patient_bundle("1", false, LoadTier::Critical)
            .await;

        assert_eq!(bundle.resources.len(), 4);
        assert!(bundle.get(ResourceType::Condition).is_empty());
        assert!(bundle.errors.contains_key(&ResourceType::Condition));
        assert!(!bundle.is_complete());
        assert_eq!(bundle.get(ResourceType::Encounter).len(), 2);
        assert!(loader
            .coordinator()
            .cache()
            .get_bundle("1", "critical")
            .is_none());
        assert!(!loader.coordinator().is_loading(ResourceType::Condition));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_switch_still_completes() {
        let (api, loader) = setup(chart("1"));
        api.set_latency(Some(Duration::from_millis(100)));

        let dropped =
            tokio::time::timeout(Duration::from_millis(10), loader.set_current_patient("1")).await;
        assert!(dropped.is_err());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(!loader.is_loading());
        assert_eq!(loader.current_subject().as_deref(), Some("1"));
        assert!(loader.context().unwrap().patient.is_some());
    }
}
