// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Remote clinical-data API seam
//!
//! The cache never talks HTTP itself. Whatever transport the host
//! application uses implements [`ClinicalApi`]; reads and searches are
//! assumed idempotent, create/update/delete are not.

use async_trait::async_trait;

use super::ApiError;
use crate::resource::{Resource, ResourceType, SearchParams, SearchResult};

#[async_trait]
pub trait ClinicalApi: Send + Sync {
    /// Read one resource by id
    async fn read(&self, resource_type: ResourceType, id: &str) -> Result<Resource, ApiError>;

    /// Run a parameterized search
    async fn search(
        &self,
        resource_type: ResourceType,
        params: &SearchParams,
    ) -> Result<SearchResult, ApiError>;

    /// Create a resource; the returned copy carries the server-assigned id
    async fn create(&self, resource: Resource) -> Result<Resource, ApiError>;

    /// Replace an existing resource
    async fn update(&self, resource: Resource) -> Result<Resource, ApiError>;

    async fn delete(&self, resource_type: ResourceType, id: &str) -> Result<(), ApiError>;
}
