// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache key derivation
//!
//! Two namespaces share one [`TieredCache`](super::TieredCache):
//!
//! - `Resources` holds single reads (`resource:Condition/123`) and searches
//!   (`search:Condition?_count=50&patient=1`)
//! - `Bundles` holds assembled patient bundles (`bundle:1:critical`)
//!
//! Every key starts with its namespace prefix, so keys from different
//! namespaces can never collide.

use crate::resource::{ResourceType, SearchParams};

/// Cache namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    Resources,
    Bundles,
}

impl CacheNamespace {
    /// Key prefixes owned by this namespace
    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            CacheNamespace::Resources => &["resource:", "search:"],
            CacheNamespace::Bundles => &["bundle:"],
        }
    }
}

pub fn resource_key(resource_type: ResourceType, id: &str) -> String {
    format!("resource:{}/{}", resource_type, id)
}

pub fn search_key(resource_type: ResourceType, params: &SearchParams) -> String {
    format!("search:{}?{}", resource_type, params.serialize())
}

pub fn bundle_key(subject_id: &str, tier: &str) -> String {
    format!("bundle:{}:{}", subject_id, tier)
}

/// Prefix shared by every bundle of one subject
pub fn bundle_prefix(subject_id: &str) -> String {
    format!("bundle:{}:", subject_id)
}

/// Tag attached to every entry derived from one subject's data
pub fn subject_tag(subject_id: &str) -> String {
    format!("subject:{}", subject_id)
}

/// Tag attached to every entry owned by one resource type
pub fn type_tag(resource_type: ResourceType) -> String {
    format!("type:{}", resource_type)
}
