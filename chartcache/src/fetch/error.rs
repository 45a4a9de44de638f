// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Fetch error types

use thiserror::Error;

use crate::resource::ResourceType;

/// Transport-level failures reported by a [`ClinicalApi`](super::ClinicalApi)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{resource_type}/{id} not found")]
    NotFound {
        resource_type: ResourceType,
        id: String,
    },

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Create an HTTP status error
    pub fn status<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(resource_type: ResourceType, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }
}

/// Errors returned by the fetch coordinator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("{resource_type} request failed: {source}")]
    Api {
        resource_type: ResourceType,
        #[source]
        source: ApiError,
    },
}

impl FetchError {
    pub fn api(resource_type: ResourceType, source: ApiError) -> Self {
        Self::Api {
            resource_type,
            source,
        }
    }

    /// Resource type whose request failed
    pub fn resource_type(&self) -> Option<ResourceType> {
        match self {
            FetchError::Api { resource_type, .. } => Some(*resource_type),
        }
    }

    /// Underlying transport error
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            FetchError::Api { source, .. } => Some(source),
        }
    }
}
