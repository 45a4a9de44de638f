// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Remote fetching
//!
//! The [`ClinicalApi`] trait is the transport seam; [`FetchCoordinator`]
//! layers cache checks, store merging, request de-duplication and per-type
//! status tracking on top of it.

pub mod api;
pub mod coordinator;
pub mod error;
pub mod memory_api;
pub mod status;

pub use api::ClinicalApi;
pub use coordinator::FetchCoordinator;
pub use error::{ApiError, FetchError};
pub use memory_api::InMemoryApi;
pub use status::{FetchState, StatusBoard};
