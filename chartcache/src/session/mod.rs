// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session lifecycle and the front-end facing API

pub mod chart_session;

pub use chart_session::ChartSession;

use thiserror::Error;

use crate::cache::ConfigError;
use crate::fetch::FetchError;
use crate::store::StoreError;

/// Errors surfaced at the session boundary
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid cache configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
