// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Typed resource table
//!
//! Holds the latest known copy of every fetched resource, keyed by
//! `(ResourceType, id)`. Writes replace whole resources; last write wins.

use std::collections::{BTreeMap, HashMap};

use crate::resource::{Resource, ResourceType};

#[derive(Debug, Default, Clone)]
pub struct ResourceStore {
    tables: HashMap<ResourceType, BTreeMap<String, Resource>>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a resource, returning the previous copy
    pub fn upsert(&mut self, resource: Resource) -> Option<Resource> {
        self.tables
            .entry(resource.resource_type())
            .or_default()
            .insert(resource.id().to_string(), resource)
    }

    pub fn get(&self, resource_type: ResourceType, id: &str) -> Option<&Resource> {
        self.tables.get(&resource_type)?.get(id)
    }

    pub fn contains(&self, resource_type: ResourceType, id: &str) -> bool {
        self.get(resource_type, id).is_some()
    }

    pub fn remove(&mut self, resource_type: ResourceType, id: &str) -> Option<Resource> {
        let table = self.tables.get_mut(&resource_type)?;
        let removed = table.remove(id);
        if table.is_empty() {
            self.tables.remove(&resource_type);
        }
        removed
    }

    /// All resources of one type, ordered by id
    pub fn by_type(&self, resource_type: ResourceType) -> impl Iterator<Item = &Resource> {
        self.tables
            .get(&resource_type)
            .into_iter()
            .flat_map(|table| table.values())
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
