// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Resource store and relationship index
//!
//! [`ClinicalStore`] pairs the authoritative [`ResourceStore`] with the
//! per-patient [`RelationshipIndex`] and the current-subject pointer that
//! decides which writes get indexed.
//!
//! `remove_resource` only touches the store. The index may therefore point
//! at ids the store no longer holds; readers skip those ids instead of
//! failing. Callers that need the index consistent clear or rebuild the
//! relevant bucket themselves, since several subjects may reference one
//! resource.

pub mod relationship_index;
pub mod resource_store;

pub use relationship_index::RelationshipIndex;
pub use resource_store::ResourceStore;

use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::resource::{Resource, ResourceType};

/// Store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Resource {resource_type}/{id} not found")]
    NotFound {
        resource_type: ResourceType,
        id: String,
    },

    #[error("Expected a {expected} resource, got {actual}")]
    TypeMismatch {
        expected: ResourceType,
        actual: ResourceType,
    },

    #[error("Partial update for {0} must be a JSON object")]
    InvalidPatch(String),
}

#[derive(Debug, Default)]
pub struct ClinicalStore {
    resources: ResourceStore,
    index: RelationshipIndex,
    current_subject: Option<String>,
}

impl ClinicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_subject(&self) -> Option<&str> {
        self.current_subject.as_deref()
    }

    pub fn set_current_subject(&mut self, subject_id: Option<String>) {
        self.current_subject = subject_id;
    }

    fn check_type(expected: ResourceType, resource: &Resource) -> Result<(), StoreError> {
        if resource.resource_type() == expected {
            Ok(())
        } else {
            Err(StoreError::TypeMismatch {
                expected,
                actual: resource.resource_type(),
            })
        }
    }

    /// Upsert and index under the current subject when the resource belongs to it
    fn upsert(&mut self, resource: Resource) {
        let current_owner = match (self.current_subject.as_deref(), resource.subject_id()) {
            (Some(current), Some(owner)) if current == owner => Some(current.to_string()),
            _ => None,
        };
        if let Some(subject) = current_owner {
            self.index
                .insert(&subject, resource.resource_type(), resource.id());
        }
        self.resources.upsert(resource);
    }

    /// Upsert several resources of one type.
    ///
    /// Fails without writing anything if any resource has another type.
    pub fn set_resources(
        &mut self,
        resource_type: ResourceType,
        resources: Vec<Resource>,
    ) -> Result<usize, StoreError> {
        for resource in &resources {
            Self::check_type(resource_type, resource)?;
        }
        let count = resources.len();
        for resource in resources {
            self.upsert(resource);
        }
        Ok(count)
    }

    pub fn add_resource(
        &mut self,
        resource_type: ResourceType,
        resource: Resource,
    ) -> Result<(), StoreError> {
        Self::check_type(resource_type, &resource)?;
        self.upsert(resource);
        Ok(())
    }

    /// Replace a stored resource with a copy that has `partial` merged in
    pub fn update_resource(
        &mut self,
        resource_type: ResourceType,
        id: &str,
        partial: &Value,
    ) -> Result<Resource, StoreError> {
        let patch: &Map<String, Value> = partial
            .as_object()
            .ok_or_else(|| StoreError::InvalidPatch(format!("{}/{}", resource_type, id)))?;
        let current = self
            .resources
            .get(resource_type, id)
            .ok_or_else(|| StoreError::NotFound {
                resource_type,
                id: id.to_string(),
            })?;

        let updated = current.merged(patch);
        self.upsert(updated.clone());
        Ok(updated)
    }

    /// Delete from the store only; the index is left untouched
    pub fn remove_resource(&mut self, resource_type: ResourceType, id: &str) -> Option<Resource> {
        self.resources.remove(resource_type, id)
    }

    pub fn get_resource(&self, resource_type: ResourceType, id: &str) -> Option<Resource> {
        self.resources.get(resource_type, id).cloned()
    }

    pub fn get_resources_by_type(&self, resource_type: ResourceType) -> Vec<Resource> {
        self.resources.by_type(resource_type).cloned().collect()
    }

    /// Resources indexed for a subject, optionally restricted to one type.
    ///
    /// Indexed ids missing from the store are skipped.
    pub fn get_patient_resources(
        &self,
        subject_id: &str,
        resource_type: Option<ResourceType>,
    ) -> Vec<Resource> {
        let lookup = |(ty, id): (ResourceType, &str)| self.resources.get(ty, id).cloned();
        match resource_type {
            Some(ty) => self
                .index
                .ids(subject_id, ty)
                .filter_map(|id| lookup((ty, id)))
                .collect(),
            None => self.index.entries(subject_id).filter_map(lookup).collect(),
        }
    }

    /// Upsert search results and index them under an explicit subject,
    /// whether or not it is the current one
    pub fn merge_for_subject(&mut self, subject_id: &str, resources: &[Resource]) {
        for resource in resources {
            self.index
                .insert(subject_id, resource.resource_type(), resource.id());
            self.upsert(resource.clone());
        }
    }

    /// Upsert without indexing beyond the current-subject rule
    pub fn merge(&mut self, resources: &[Resource]) {
        for resource in resources {
            self.upsert(resource.clone());
        }
    }

    /// Drop every index bucket of a subject; store entries are kept
    pub fn clear_subject_index(&mut self, subject_id: &str) -> usize {
        let removed = self.index.clear_subject(subject_id);
        debug!("Cleared {} index entries for subject {}", removed, subject_id);
        removed
    }

    /// Drop an id from a subject's bucket (used after a remote delete)
    pub fn unindex(&mut self, subject_id: &str, resource_type: ResourceType, id: &str) -> bool {
        self.index.remove(subject_id, resource_type, id)
    }

    pub fn index(&self) -> &RelationshipIndex {
        &self.index
    }

    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    pub fn clear(&mut self) {
        self.resources.clear();
        self.index.clear();
        self.current_subject = None;
    }
}
