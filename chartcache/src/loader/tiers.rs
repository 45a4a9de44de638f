// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Load tiers and per-type fetch policies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::cache::{CacheConfig, CachePriority};
use crate::resource::{ResourceType, SearchParams};

const CRITICAL_TYPES: &[ResourceType] = &[
    ResourceType::Encounter,
    ResourceType::Condition,
    ResourceType::MedicationRequest,
    ResourceType::AllergyIntolerance,
];

const IMPORTANT_TYPES: &[ResourceType] = &[
    ResourceType::Observation,
    ResourceType::Procedure,
    ResourceType::DiagnosticReport,
    ResourceType::Coverage,
];

const OPTIONAL_TYPES: &[ResourceType] = &[
    ResourceType::Immunization,
    ResourceType::CarePlan,
    ResourceType::CareTeam,
    ResourceType::DocumentReference,
    ResourceType::ImagingStudy,
];

/// Staged loading tier. `Full` is the union of the other three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTier {
    Critical,
    Important,
    Optional,
    Full,
}

impl LoadTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadTier::Critical => "critical",
            LoadTier::Important => "important",
            LoadTier::Optional => "optional",
            LoadTier::Full => "full",
        }
    }

    pub fn resource_types(&self) -> Vec<ResourceType> {
        match self {
            LoadTier::Critical => CRITICAL_TYPES.to_vec(),
            LoadTier::Important => IMPORTANT_TYPES.to_vec(),
            LoadTier::Optional => OPTIONAL_TYPES.to_vec(),
            LoadTier::Full => CRITICAL_TYPES
                .iter()
                .chain(IMPORTANT_TYPES)
                .chain(OPTIONAL_TYPES)
                .copied()
                .collect(),
        }
    }

    /// How long an assembled bundle of this tier stays cached
    pub fn bundle_ttl(&self, config: &CacheConfig) -> Duration {
        match self {
            LoadTier::Critical => config.bundle_ttls.critical,
            LoadTier::Important => config.bundle_ttls.important,
            LoadTier::Optional | LoadTier::Full => config.bundle_ttls.optional,
        }
    }

    pub fn cache_priority(&self) -> CachePriority {
        match self {
            LoadTier::Critical => CachePriority::Critical,
            LoadTier::Important => CachePriority::Important,
            LoadTier::Optional => CachePriority::Low,
            LoadTier::Full => CachePriority::Normal,
        }
    }
}

impl fmt::Display for LoadTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page size and sort order used when loading one type for a patient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub count: usize,
    pub sort: Option<&'static str>,
}

pub fn fetch_policy(resource_type: ResourceType) -> FetchPolicy {
    let (count, sort) = match resource_type {
        ResourceType::Observation => (200, Some("-date")),
        ResourceType::Encounter => (20, Some("-date")),
        ResourceType::DiagnosticReport | ResourceType::DocumentReference => (50, Some("-date")),
        ResourceType::Procedure | ResourceType::Immunization => (50, Some("-date")),
        _ => (100, None),
    };
    FetchPolicy { count, sort }
}

/// Search parameters used for `resource_type` when loading `subject_id`.
///
/// Invalidation relies on these being deterministic so it can drop exactly
/// the search entries a bundle load produced.
pub fn standard_params(subject_id: &str, resource_type: ResourceType) -> SearchParams {
    let policy = fetch_policy(resource_type);
    let field = resource_type.subject_field().unwrap_or("subject");
    let mut params = SearchParams::new()
        .with(field, subject_id)
        .count(policy.count);
    if let Some(sort) = policy.sort {
        params = params.sort(sort);
    }
    params
}
