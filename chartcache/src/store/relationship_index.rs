// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Subject → resource relationship index
//!
//! Maps a patient id to the ids it owns, per resource type. Built up
//! incrementally as resources are fetched; buckets are sets so repeated
//! inserts of one id are no-ops.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::resource::ResourceType;

type Buckets = BTreeMap<ResourceType, BTreeSet<String>>;

#[derive(Debug, Default, Clone)]
pub struct RelationshipIndex {
    subjects: HashMap<String, Buckets>,
}

impl RelationshipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to the subject's bucket; returns false if it was already there
    pub fn insert(&mut self, subject_id: &str, resource_type: ResourceType, id: &str) -> bool {
        self.subjects
            .entry(subject_id.to_string())
            .or_default()
            .entry(resource_type)
            .or_default()
            .insert(id.to_string())
    }

    /// Ids indexed for one subject and type
    pub fn ids(&self, subject_id: &str, resource_type: ResourceType) -> impl Iterator<Item = &str> {
        self.subjects
            .get(subject_id)
            .and_then(|buckets| buckets.get(&resource_type))
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    /// Every (type, id) pair indexed for one subject
    pub fn entries(&self, subject_id: &str) -> impl Iterator<Item = (ResourceType, &str)> {
        self.subjects
            .get(subject_id)
            .into_iter()
            .flat_map(|buckets| {
                buckets
                    .iter()
                    .flat_map(|(ty, ids)| ids.iter().map(move |id| (*ty, id.as_str())))
            })
    }

    pub fn contains(&self, subject_id: &str, resource_type: ResourceType, id: &str) -> bool {
        self.subjects
            .get(subject_id)
            .and_then(|buckets| buckets.get(&resource_type))
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }

    /// Remove one id from one subject's bucket
    pub fn remove(&mut self, subject_id: &str, resource_type: ResourceType, id: &str) -> bool {
        let Some(buckets) = self.subjects.get_mut(subject_id) else {
            return false;
        };
        let removed = buckets
            .get_mut(&resource_type)
            .map(|ids| ids.remove(id))
            .unwrap_or(false);
        buckets.retain(|_, ids| !ids.is_empty());
        if buckets.is_empty() {
            self.subjects.remove(subject_id);
        }
        removed
    }

    /// Drop every bucket of a subject, returning how many ids they held
    pub fn clear_subject(&mut self, subject_id: &str) -> usize {
        self.subjects
            .remove(subject_id)
            .map(|buckets| buckets.values().map(BTreeSet::len).sum())
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.subjects.clear();
    }
}
