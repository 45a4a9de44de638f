// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Generic TTL cache with priority tiers
//!
//! Expiry is derived from the entry's priority unless a custom TTL is given.
//! Expired entries are dropped lazily on read and eagerly by a background
//! sweep. When the entry count exceeds the configured ceiling, entries are
//! evicted least-recently-accessed first, lowest priority first; critical
//! entries are never evicted for capacity.

use log::debug;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{CacheConfig, CacheEntryMetadata, CachePriority};
use crate::resource::ResourceType;

/// Options accepted by [`TieredCache::set`]
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub priority: Option<CachePriority>,
    pub resource_type: Option<ResourceType>,
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: CachePriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub expirations: u64,
    pub evictions: u64,
    pub total_requests: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    data: V,
    metadata: CacheEntryMetadata,
}

/// Key/value cache with priority-derived expiry
pub struct TieredCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    config: CacheConfig,
    stats: Mutex<CacheStats>,
}

impl<V: Clone + Send + Sync + 'static> TieredCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Resolve the priority and TTL an entry will be stored with.
    ///
    /// TTL precedence: custom TTL, then the explicit priority's TTL, then the
    /// resource type's default priority, then the normal tier.
    fn resolve(&self, options: &CacheOptions) -> (CachePriority, Duration) {
        let priority = options
            .priority
            .or_else(|| options.resource_type.map(|t| self.config.priority_for(t)))
            .unwrap_or(CachePriority::Normal);
        let ttl = options
            .ttl
            .unwrap_or_else(|| self.config.priority_ttls.ttl_for(priority));
        (priority, ttl)
    }

    /// Insert or replace the entry at `key`, returning its metadata
    pub fn set(&self, key: impl Into<String>, data: V, options: CacheOptions) -> CacheEntryMetadata {
        let key = key.into();
        let (priority, ttl) = self.resolve(&options);

        let mut metadata = CacheEntryMetadata::new(Instant::now(), ttl, priority);
        metadata.resource_type = options.resource_type;
        metadata.tags = options.tags.into_iter().collect();

        let evicted = {
            let mut entries = self.entries.write();
            entries.insert(
                key,
                CacheEntry {
                    data,
                    metadata: metadata.clone(),
                },
            );
            if entries.len() > self.config.max_entries {
                self.enforce_capacity(&mut entries)
            } else {
                (0, 0)
            }
        };

        let mut stats = self.stats.lock();
        stats.insertions += 1;
        stats.expirations += evicted.0 as u64;
        stats.evictions += evicted.1 as u64;

        metadata
    }

    /// Get the data at `key`; expired entries are removed and reported as misses
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut expired = false;

        let result = {
            let mut entries = self.entries.write();
            match entries.get_mut(key) {
                Some(entry) if entry.metadata.is_expired_at(now) => {
                    entries.remove(key);
                    expired = true;
                    None
                }
                Some(entry) => {
                    entry.metadata.update_access(now);
                    Some(entry.data.clone())
                }
                None => None,
            }
        };

        let mut stats = self.stats.lock();
        stats.total_requests += 1;
        if result.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        if expired {
            stats.expirations += 1;
            debug!("Cache entry '{}' expired on read", key);
        }

        result
    }

    /// Whether a live entry exists at `key`
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .map(|entry| !entry.metadata.is_expired_at(now))
            .unwrap_or(false)
    }

    /// Metadata of a live entry, without touching its access bookkeeping
    pub fn metadata(&self, key: &str) -> Option<CacheEntryMetadata> {
        let now = Instant::now();
        self.entries
            .read()
            .get(key)
            .filter(|entry| !entry.metadata.is_expired_at(now))
            .map(|entry| entry.metadata.clone())
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove every entry carrying `tag`
    pub fn clear_by_tag(&self, tag: &str) -> usize {
        self.remove_where(|_, metadata| metadata.tags.contains(tag))
    }

    /// Remove every entry owned by `resource_type`
    pub fn clear_by_resource_type(&self, resource_type: ResourceType) -> usize {
        self.remove_where(|_, metadata| metadata.resource_type == Some(resource_type))
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn clear_by_prefix(&self, prefix: &str) -> usize {
        self.remove_where(|key, _| key.starts_with(prefix))
    }

    /// Remove all expired entries
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let removed = self.remove_where(|_, metadata| metadata.is_expired_at(now));
        if removed > 0 {
            self.stats.lock().expirations += removed as u64;
            debug!("Cache sweep removed {} expired entries", removed);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Physical entry count, including expired entries not yet swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Spawn the periodic expiry sweep.
    ///
    /// The task holds only a weak reference and stops once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.cleanup_expired();
                    }
                    None => break,
                }
            }
        })
    }

    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str, &CacheEntryMetadata) -> bool,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, entry| !predicate(key, &entry.metadata));
        before - entries.len()
    }

    /// Bring the entry count back under the ceiling.
    ///
    /// Expired entries go first, then batches of the least recently accessed
    /// entries of each evictable priority. Returns `(expired, evicted)`.
    fn enforce_capacity(&self, entries: &mut HashMap<String, CacheEntry<V>>) -> (usize, usize) {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.metadata.is_expired_at(now));
        let expired = before - entries.len();

        let max_entries = self.config.max_entries;
        let batch_size = self.config.eviction_batch_size;
        let mut evicted = 0;

        for priority in CachePriority::EVICTION_ORDER {
            while entries.len() > max_entries {
                let mut candidates: Vec<(&String, Instant)> = entries
                    .iter()
                    .filter(|(_, entry)| entry.metadata.priority == priority)
                    .map(|(key, entry)| (key, entry.metadata.last_accessed))
                    .collect();
                if candidates.is_empty() {
                    break;
                }
                candidates.sort_by_key(|(_, last_accessed)| *last_accessed);

                let batch: Vec<String> = candidates
                    .into_iter()
                    .take(batch_size)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in &batch {
                    entries.remove(key);
                }
                evicted += batch.len();
            }
        }

        if evicted > 0 {
            debug!(
                "Capacity eviction removed {} entries ({} remaining, ceiling {})",
                evicted,
                entries.len(),
                max_entries
            );
        }

        (expired, evicted)
    }
}
