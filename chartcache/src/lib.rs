// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! chartcache - clinical resource cache and progressive synchronization
//!
//! chartcache sits between a clinical workspace front-end and a remote
//! clinical-data API. It keeps fetched resources in a typed store with a
//! per-patient relationship index, caches reads, searches and patient
//! bundles with priority-tiered expiry, and loads a patient's chart in
//! stages so safety-critical data is available first.
//!
//! # Features
//!
//! - **Tiered cache**: TTL derived from priority or resource type, lazy expiry
//!   on read, periodic sweeps and capacity eviction that never drops critical
//!   entries
//! - **Store and index**: idempotent upserts, subject-scoped views that skip
//!   ids the store no longer holds
//! - **Fetch coordination**: cache-first reads and searches with per-type
//!   loading/error state and de-duplicated in-flight requests
//! - **Progressive loading**: critical tier before first paint, important and
//!   full tiers in the background
//! - **Invalidation**: subject change signals over a broadcast channel
//!
//! # Usage
//!
//! ```ignore
//! let api = Arc::new(InMemoryApi::from_dir("./chart")?);
//! let session = ChartSession::new(api, CacheConfig::default())?;
//! session.start();
//!
//! let context = session.set_current_patient("1").await;
//! let conditions = session.get_patient_resources("1", Some(ResourceType::Condition));
//! ```

pub mod cache;
pub mod fetch;
pub mod loader;
pub mod resource;
pub mod session;
pub mod store;

pub use cache::{CacheConfig, CacheManager, CachePriority, CacheStats};
pub use fetch::{ApiError, ClinicalApi, FetchError, FetchState, InMemoryApi};
pub use loader::{InvalidationSignal, LoadTier, SubjectContext};
pub use resource::{PatientBundle, Resource, ResourceType, SearchParams, SearchResult};
pub use session::{ChartSession, SessionError};
pub use store::{ClinicalStore, StoreError};

/// chartcache version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// chartcache crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
