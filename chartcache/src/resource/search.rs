// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Search parameters and results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Resource;

/// Parameter names that filter a search down to one patient
const SUBJECT_PARAMS: [&str; 3] = ["patient", "subject", "beneficiary"];

/// Parameters of a remote search.
///
/// Stored sorted by name so that two logically equal parameter sets always
/// serialize to the same cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchParams {
    params: BTreeMap<String, String>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an arbitrary parameter, replacing any previous value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Restrict the search to one patient
    pub fn patient(self, subject_id: &str) -> Self {
        self.with("patient", subject_id)
    }

    /// Page size (`_count`)
    pub fn count(self, count: usize) -> Self {
        self.with("_count", count.to_string())
    }

    /// Sort directive (`_sort`), e.g. `-date`
    pub fn sort(self, sort: impl Into<String>) -> Self {
        self.with("_sort", sort)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Patient id named by a subject filter, without any `Patient/` prefix
    pub fn subject_id(&self) -> Option<&str> {
        SUBJECT_PARAMS
            .iter()
            .find_map(|name| self.get(name))
            .map(|value| value.strip_prefix("Patient/").unwrap_or(value))
    }

    /// Requested page size, if any
    pub fn page_size(&self) -> Option<usize> {
        self.get("_count").and_then(|c| c.parse().ok())
    }

    /// Canonical `name=value&name=value` form, sorted by name
    pub fn serialize(&self) -> String {
        self.params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Output of a search: one page of resources plus the server's total
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub resources: Vec<Resource>,
    pub total: usize,
}

impl SearchResult {
    pub fn new(resources: Vec<Resource>, total: usize) -> Self {
        Self { resources, total }
    }
}
