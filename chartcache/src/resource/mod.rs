// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Clinical resource model and search result shapes

pub mod bundle;
pub mod model;
pub mod search;

pub use bundle::PatientBundle;
pub use model::{patient_reference, Resource, ResourceBody, ResourceType, UnknownResourceType};
pub use search::{SearchParams, SearchResult};
