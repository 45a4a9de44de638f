// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-patient bundle of resources assembled by the progressive loader

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Resource, ResourceType};

/// Resources of one patient grouped by type.
///
/// Every requested type has an entry in `resources`; a type whose fetch
/// failed has an empty list and its error message in `errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientBundle {
    pub subject_id: String,
    pub resources: BTreeMap<ResourceType, Vec<Resource>>,
    pub errors: BTreeMap<ResourceType, String>,
    pub assembled_at: DateTime<Utc>,
}

impl PatientBundle {
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            resources: BTreeMap::new(),
            errors: BTreeMap::new(),
            assembled_at: Utc::now(),
        }
    }

    pub fn insert(&mut self, resource_type: ResourceType, resources: Vec<Resource>) {
        self.resources.insert(resource_type, resources);
    }

    /// Record a failed type: empty list plus the error message
    pub fn record_error(&mut self, resource_type: ResourceType, message: impl Into<String>) {
        self.resources.insert(resource_type, Vec::new());
        self.errors.insert(resource_type, message.into());
    }

    /// Resources of one type; empty when the type was not requested
    pub fn get(&self, resource_type: ResourceType) -> &[Resource] {
        self.resources
            .get(&resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}
