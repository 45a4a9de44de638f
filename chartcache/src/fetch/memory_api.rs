// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory clinical API for testing and offline demos
//!
//! Serves resources from a map, understands subject filters, `_count` and
//! `_sort`, and can be told to fail or slow down per resource type. Call
//! counters make redundant network traffic observable.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{ApiError, ClinicalApi};
use crate::resource::{Resource, ResourceType, SearchParams, SearchResult};

/// Fields consulted, in order, when sorting by `date`
const DATE_FIELDS: [&str; 8] = [
    "date",
    "effectiveDateTime",
    "issued",
    "recordedDate",
    "authoredOn",
    "onsetDateTime",
    "occurrenceDateTime",
    "performedDateTime",
];

/// In-memory API backend
#[derive(Default)]
pub struct InMemoryApi {
    resources: RwLock<HashMap<ResourceType, BTreeMap<String, Resource>>>,
    failures: RwLock<HashMap<ResourceType, ApiError>>,
    latency: RwLock<Option<Duration>>,
    reads: AtomicUsize,
    searches: AtomicUsize,
    writes: AtomicUsize,
    searches_by_type: RwLock<HashMap<ResourceType, usize>>,
}

impl InMemoryApi {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(resources: impl IntoIterator<Item = Resource>) -> Self {
        let api = Self::new();
        for resource in resources {
            api.insert(resource);
        }
        api
    }

    /// Load every `*.json` file of a directory (FHIR Bundles or single resources)
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let api = Self::new();
        let entries = std::fs::read_dir(path.as_ref())
            .map_err(|e| ApiError::Decode(format!("{}: {}", path.as_ref().display(), e)))?;

        for entry in entries {
            let entry = entry.map_err(|e| ApiError::Decode(e.to_string()))?;
            let file = entry.path();
            if file.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let text = std::fs::read_to_string(&file)
                .map_err(|e| ApiError::Decode(format!("{}: {}", file.display(), e)))?;
            let value: Value = serde_json::from_str(&text)
                .map_err(|e| ApiError::Decode(format!("{}: {}", file.display(), e)))?;
            let loaded = api.load_json(value)?;
            log::debug!("Loaded {} resources from {}", loaded, file.display());
        }

        Ok(api)
    }

    /// Load a FHIR Bundle (every `entry[].resource`) or a single resource
    pub fn load_json(&self, value: Value) -> Result<usize, ApiError> {
        if value.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
            let entries = value
                .get("entry")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let mut loaded = 0;
            for entry in entries {
                if let Some(resource) = entry.get("resource") {
                    self.insert(Self::decode(resource.clone())?);
                    loaded += 1;
                }
            }
            Ok(loaded)
        } else {
            self.insert(Self::decode(value)?);
            Ok(1)
        }
    }

    fn decode(value: Value) -> Result<Resource, ApiError> {
        Resource::from_json(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub fn insert(&self, resource: Resource) {
        self.resources
            .write()
            .entry(resource.resource_type())
            .or_default()
            .insert(resource.id().to_string(), resource);
    }

    /// Make every call for `resource_type` fail with `error`
    pub fn fail_type(&self, resource_type: ResourceType, error: ApiError) {
        self.failures.write().insert(resource_type, error);
    }

    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn search_count_for(&self, resource_type: ResourceType) -> usize {
        self.searches_by_type
            .read()
            .get(&resource_type)
            .copied()
            .unwrap_or(0)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total number of remote calls of any kind
    pub fn call_count(&self) -> usize {
        self.read_count() + self.search_count() + self.write_count()
    }

    pub fn reset_counters(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.searches.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
        self.searches_by_type.write().clear();
    }

    /// Apply configured latency, then any configured failure
    async fn simulate(&self, resource_type: ResourceType) -> Result<(), ApiError> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match self.failures.read().get(&resource_type) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn matches(resource: &Resource, params: &SearchParams) -> bool {
        if let Some(subject) = params.subject_id() {
            if resource.subject_id() != Some(subject) {
                return false;
            }
        }
        params
            .iter()
            .filter(|(name, _)| {
                !name.starts_with('_') && !matches!(*name, "patient" | "subject" | "beneficiary")
            })
            .all(|(name, expected)| match resource.field(name) {
                Some(Value::String(actual)) => actual == expected,
                _ => true,
            })
    }

    fn date_of(resource: &Resource) -> Option<&str> {
        DATE_FIELDS
            .iter()
            .find_map(|field| resource.field(field).and_then(Value::as_str))
            .or_else(|| {
                resource
                    .field("period")
                    .and_then(|period| period.get("start"))
                    .and_then(Value::as_str)
            })
    }

    fn sort(resources: &mut [Resource], directive: &str) {
        let (descending, field) = match directive.strip_prefix('-') {
            Some(field) => (true, field),
            None => (false, directive),
        };
        resources.sort_by(|a, b| {
            let ordering = if field == "date" {
                Self::date_of(a).cmp(&Self::date_of(b))
            } else {
                let key = |r: &Resource| r.field(field).and_then(Value::as_str).map(str::to_owned);
                key(a).cmp(&key(b))
            };
            if descending {
                ordering.reverse()
            } else {
                ordering
            }
        });
    }
}

#[async_trait]
impl ClinicalApi for InMemoryApi {
    async fn read(&self, resource_type: ResourceType, id: &str) -> Result<Resource, ApiError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.simulate(resource_type).await?;

        self.resources
            .read()
            .get(&resource_type)
            .and_then(|table| table.get(id))
            .cloned()
            .ok_or_else(|| ApiError::not_found(resource_type, id))
    }

    async fn search(
        &self,
        resource_type: ResourceType,
        params: &SearchParams,
    ) -> Result<SearchResult, ApiError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        *self
            .searches_by_type
            .write()
            .entry(resource_type)
            .or_insert(0) += 1;
        self.simulate(resource_type).await?;

        let mut matches: Vec<Resource> = self
            .resources
            .read()
            .get(&resource_type)
            .map(|table| {
                table
                    .values()
                    .filter(|r| Self::matches(r, params))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(directive) = params.get("_sort") {
            Self::sort(&mut matches, directive);
        }
        let total = matches.len();
        if let Some(count) = params.page_size() {
            matches.truncate(count);
        }

        Ok(SearchResult::new(matches, total))
    }

    async fn create(&self, resource: Resource) -> Result<Resource, ApiError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.simulate(resource.resource_type()).await?;

        let created = if resource.id().is_empty() {
            resource.with_id(uuid::Uuid::new_v4().to_string())
        } else {
            resource
        };
        self.insert(created.clone());
        Ok(created)
    }

    async fn update(&self, resource: Resource) -> Result<Resource, ApiError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let resource_type = resource.resource_type();
        self.simulate(resource_type).await?;

        let exists = self
            .resources
            .read()
            .get(&resource_type)
            .map(|table| table.contains_key(resource.id()))
            .unwrap_or(false);
        if !exists {
            return Err(ApiError::not_found(resource_type, resource.id()));
        }
        self.insert(resource.clone());
        Ok(resource)
    }

    async fn delete(&self, resource_type: ResourceType, id: &str) -> Result<(), ApiError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.simulate(resource_type).await?;

        self.resources
            .write()
            .get_mut(&resource_type)
            .and_then(|table| table.remove(id))
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(resource_type, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::patient_reference;
    use serde_json::json;

    fn observation(id: &str, subject: &str, date: &str) -> Resource {
        Resource::new(
            ResourceType::Observation,
            id,
            json!({"subject": patient_reference(subject), "effectiveDateTime": date, "status": "final"}),
        )
    }

    #[tokio::test]
    async fn test_search_filters_sorts_and_pages() {
        let api = InMemoryApi::with_resources([
            observation("a", "1", "2024-01-01"),
            observation("b", "1", "2024-03-01"),
            observation("c", "1", "2024-02-01"),
            observation("d", "2", "2024-04-01"),
        ]);

        let params = SearchParams::new().patient("1").sort("-date").count(2);
        let result = api.search(ResourceType::Observation, &params).await.unwrap();

        assert_eq!(result.total, 3);
        let ids: Vec<&str> = result.resources.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(api.search_count_for(ResourceType::Observation), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_returned() {
        let api = InMemoryApi::with_resources([observation("a", "1", "2024-01-01")]);
        api.fail_type(ResourceType::Observation, ApiError::status(503, "unavailable"));

        let err = api.read(ResourceType::Observation, "a").await.unwrap_err();
        assert_eq!(err, ApiError::status(503, "unavailable"));

        api.clear_failures();
        assert!(api.read(ResourceType::Observation, "a").await.is_ok());
        assert_eq!(api.read_count(), 2);
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let api = InMemoryApi::new();
        let created = api
            .create(Resource::new(ResourceType::Condition, "", json!({})))
            .await
            .unwrap();

        assert!(!created.id().is_empty());
        assert!(api.read(ResourceType::Condition, created.id()).await.is_ok());
    }

    #[test]
    fn test_load_bundle_json() {
        let api = InMemoryApi::new();
        let loaded = api
            .load_json(json!({
                "resourceType": "Bundle",
                "entry": [
                    {"resource": {"resourceType": "Patient", "id": "1"}},
                    {"resource": {"resourceType": "Encounter", "id": "e1", "subject": {"reference": "Patient/1"}}}
                ]
            }))
            .unwrap();

        assert_eq!(loaded, 2);
        assert!(api.load_json(json!({"resourceType": "Nope", "id": "x"})).is_err());
    }
}
