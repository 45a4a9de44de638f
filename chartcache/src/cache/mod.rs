// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Priority-tiered caching
//!
//! This module provides:
//! - A generic TTL cache with priority-derived expiry and capacity eviction
//! - Cache configuration (TTL table, per-type priorities, capacity)
//! - Namespaced key derivation for resource, search and bundle entries
//! - The cache manager the fetch and loading layers talk to

pub mod cache_config;
pub mod cache_manager;
pub mod keys;
pub mod tiered_cache;

pub use cache_config::{BundleTtls, CacheConfig, ConfigError, PriorityTtls};
pub use cache_manager::{CacheManager, CachedValue};
pub use keys::CacheNamespace;
pub use tiered_cache::{CacheOptions, CacheStats, TieredCache};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::resource::ResourceType;

/// Cache priority tiers, most to least important
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    Critical,
    Important,
    Normal,
    Low,
}

impl CachePriority {
    /// Order in which capacity eviction considers priorities.
    /// Critical entries are never eviction candidates.
    pub const EVICTION_ORDER: [CachePriority; 3] = [
        CachePriority::Low,
        CachePriority::Normal,
        CachePriority::Important,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CachePriority::Critical => "critical",
            CachePriority::Important => "important",
            CachePriority::Normal => "normal",
            CachePriority::Low => "low",
        }
    }
}

impl fmt::Display for CachePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache entry metadata
#[derive(Debug, Clone)]
pub struct CacheEntryMetadata {
    pub created_at: Instant,
    pub expires_at: Instant,
    pub ttl: Duration,
    pub priority: CachePriority,
    pub resource_type: Option<ResourceType>,
    pub tags: HashSet<String>,
    pub last_accessed: Instant,
    pub access_count: u32,
}

impl CacheEntryMetadata {
    pub fn new(now: Instant, ttl: Duration, priority: CachePriority) -> Self {
        Self {
            created_at: now,
            expires_at: now + ttl,
            ttl,
            priority,
            resource_type: None,
            tags: HashSet::new(),
            last_accessed: now,
            access_count: 0,
        }
    }

    /// An entry is logically gone once `now` passes its expiry
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn update_access(&mut self, now: Instant) {
        self.last_accessed = now;
        self.access_count = self.access_count.saturating_add(1);
    }
}
