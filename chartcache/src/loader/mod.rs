// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Staged patient loading and invalidation

pub mod invalidation;
pub mod progressive;
pub mod tiers;

pub use invalidation::{
    InvalidationListener, InvalidationOutcome, InvalidationRecord, InvalidationSignal,
    InvalidationStats,
};
pub use progressive::{ProgressiveLoader, SubjectContext};
pub use tiers::{fetch_policy, standard_params, FetchPolicy, LoadTier};
