// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Central cache management and coordination

use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::keys::{
    bundle_key, bundle_prefix, resource_key, search_key, subject_tag, type_tag, CacheNamespace,
};
use super::{
    CacheConfig, CacheEntryMetadata, CacheOptions, CachePriority, CacheStats, ConfigError,
    TieredCache,
};
use crate::resource::{PatientBundle, Resource, ResourceType, SearchParams, SearchResult};

/// Anything the workspace caches
#[derive(Debug, Clone)]
pub enum CachedValue {
    Resource(Resource),
    Search(SearchResult),
    Bundle(PatientBundle),
}

/// Typed front of the shared tiered cache.
///
/// Owns key derivation for both namespaces so callers never build keys by hand.
pub struct CacheManager {
    cache: Arc<TieredCache<CachedValue>>,
}

impl CacheManager {
    /// Create new cache manager with configuration
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cache: Arc::new(TieredCache::new(config)),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        self.cache.config()
    }

    fn enabled(&self) -> bool {
        self.cache.config().enabled
    }

    /// Cached copy of a single resource
    pub fn get_resource(&self, resource_type: ResourceType, id: &str) -> Option<Resource> {
        if !self.enabled() {
            return None;
        }
        match self.cache.get(&resource_key(resource_type, id)) {
            Some(CachedValue::Resource(resource)) => Some(resource),
            _ => None,
        }
    }

    /// Cache a single read, tagged with its type
    pub fn put_resource(&self, resource: &Resource) {
        if !self.enabled() {
            return;
        }
        let resource_type = resource.resource_type();
        let mut options = CacheOptions::new()
            .resource_type(resource_type)
            .ttl(self.config().resource_ttl)
            .tag(type_tag(resource_type));
        if let Some(subject) = resource.subject_id() {
            options = options.tag(subject_tag(subject));
        }
        self.cache.set(
            resource_key(resource_type, resource.id()),
            CachedValue::Resource(resource.clone()),
            options,
        );
    }

    pub fn resource_metadata(&self, resource_type: ResourceType, id: &str) -> Option<CacheEntryMetadata> {
        self.cache.metadata(&resource_key(resource_type, id))
    }

    /// Cached result of a search
    pub fn get_search(&self, resource_type: ResourceType, params: &SearchParams) -> Option<SearchResult> {
        if !self.enabled() {
            return None;
        }
        match self.cache.get(&search_key(resource_type, params)) {
            Some(CachedValue::Search(result)) => Some(result),
            _ => None,
        }
    }

    /// Cache a search result, tagged with its type and subject filter
    pub fn put_search(&self, resource_type: ResourceType, params: &SearchParams, result: &SearchResult) {
        if !self.enabled() {
            return;
        }
        let mut options = CacheOptions::new()
            .resource_type(resource_type)
            .ttl(self.config().search_ttl)
            .tag(type_tag(resource_type));
        if let Some(subject) = params.subject_id() {
            options = options.tag(subject_tag(subject));
        }
        self.cache.set(
            search_key(resource_type, params),
            CachedValue::Search(result.clone()),
            options,
        );
    }

    pub fn invalidate_search(&self, resource_type: ResourceType, params: &SearchParams) -> bool {
        self.cache.delete(&search_key(resource_type, params))
    }

    /// Cached bundle of one subject and tier
    pub fn get_bundle(&self, subject_id: &str, tier: &str) -> Option<PatientBundle> {
        if !self.enabled() {
            return None;
        }
        match self.cache.get(&bundle_key(subject_id, tier)) {
            Some(CachedValue::Bundle(bundle)) => Some(bundle),
            _ => None,
        }
    }

    pub fn put_bundle(
        &self,
        subject_id: &str,
        tier: &str,
        bundle: &PatientBundle,
        ttl: Duration,
        priority: CachePriority,
    ) {
        if !self.enabled() {
            return;
        }
        self.cache.set(
            bundle_key(subject_id, tier),
            CachedValue::Bundle(bundle.clone()),
            CacheOptions::new()
                .priority(priority)
                .ttl(ttl)
                .tag("bundle")
                .tag(subject_tag(subject_id)),
        );
    }

    /// Drop every cached bundle of a subject
    pub fn invalidate_subject_bundles(&self, subject_id: &str) -> usize {
        let removed = self.cache.clear_by_prefix(&bundle_prefix(subject_id));
        debug!("Dropped {} cached bundles for subject {}", removed, subject_id);
        removed
    }

    /// Drop every single-read and search entry of one resource type
    pub fn invalidate_type(&self, resource_type: ResourceType) -> usize {
        self.cache.clear_by_resource_type(resource_type)
    }

    /// Drop every entry of a namespace
    pub fn clear_namespace(&self, namespace: CacheNamespace) -> usize {
        namespace
            .prefixes()
            .iter()
            .map(|prefix| self.cache.clear_by_prefix(prefix))
            .sum()
    }

    pub fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        self.cache.spawn_sweeper()
    }
}
