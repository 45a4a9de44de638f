// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache configuration and policies

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::CachePriority;
use crate::resource::ResourceType;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid cache configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durations stored as whole seconds
mod secs {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Durations stored as milliseconds
mod millis {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Global cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable/disable caching entirely (reads always go to the API when off)
    pub enabled: bool,

    /// Entry count above which capacity eviction runs
    pub max_entries: usize,

    /// Number of entries evicted per eviction round
    pub eviction_batch_size: usize,

    /// Interval of the background expiry sweep
    #[serde(with = "secs")]
    pub sweep_interval: Duration,

    /// Fixed TTL per priority tier
    pub priority_ttls: PriorityTtls,

    /// Default priority of entries owned by a resource type
    pub type_priorities: HashMap<ResourceType, CachePriority>,

    /// TTL of single-resource reads
    #[serde(with = "secs")]
    pub resource_ttl: Duration,

    /// TTL of search results
    #[serde(with = "secs")]
    pub search_ttl: Duration,

    /// TTL of assembled patient bundles, per loading tier
    pub bundle_ttls: BundleTtls,

    /// Delay before the important tier loads after a patient switch
    #[serde(with = "millis")]
    pub important_tier_delay: Duration,

    /// Delay before the full bundle loads after a patient switch
    #[serde(with = "millis")]
    pub full_tier_delay: Duration,

    /// Number of handled invalidation signals kept for inspection
    pub invalidation_history: usize,
}

/// TTL table indexed by priority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityTtls {
    #[serde(with = "secs")]
    pub critical: Duration,
    #[serde(with = "secs")]
    pub important: Duration,
    #[serde(with = "secs")]
    pub normal: Duration,
    #[serde(with = "secs")]
    pub low: Duration,
}

impl PriorityTtls {
    pub fn ttl_for(&self, priority: CachePriority) -> Duration {
        match priority {
            CachePriority::Critical => self.critical,
            CachePriority::Important => self.important,
            CachePriority::Normal => self.normal,
            CachePriority::Low => self.low,
        }
    }
}

impl Default for PriorityTtls {
    fn default() -> Self {
        Self {
            critical: Duration::from_secs(30 * 60),
            important: Duration::from_secs(15 * 60),
            normal: Duration::from_secs(10 * 60),
            low: Duration::from_secs(5 * 60),
        }
    }
}

/// Bundle TTLs; the full bundle uses the optional TTL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleTtls {
    #[serde(with = "secs")]
    pub critical: Duration,
    #[serde(with = "secs")]
    pub important: Duration,
    #[serde(with = "secs")]
    pub optional: Duration,
}

impl Default for BundleTtls {
    fn default() -> Self {
        Self {
            critical: Duration::from_secs(10 * 60),
            important: Duration::from_secs(5 * 60),
            optional: Duration::from_secs(2 * 60),
        }
    }
}

fn default_type_priorities() -> HashMap<ResourceType, CachePriority> {
    use CachePriority::*;
    use ResourceType::*;

    [
        (Patient, Critical),
        (AllergyIntolerance, Critical),
        (MedicationRequest, Critical),
        (Condition, Critical),
        (Encounter, Important),
        (Observation, Important),
        (DiagnosticReport, Important),
        (Procedure, Important),
        (Coverage, Normal),
        (Practitioner, Normal),
        (ServiceRequest, Normal),
        (Immunization, Low),
        (CarePlan, Low),
        (CareTeam, Low),
        (DocumentReference, Low),
        (ImagingStudy, Low),
    ]
    .into_iter()
    .collect()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1000,
            eviction_batch_size: 50,
            sweep_interval: Duration::from_secs(60),
            priority_ttls: PriorityTtls::default(),
            type_priorities: default_type_priorities(),
            resource_ttl: Duration::from_secs(10 * 60),
            search_ttl: Duration::from_secs(5 * 60),
            bundle_ttls: BundleTtls::default(),
            important_tier_delay: Duration::from_millis(100),
            full_tier_delay: Duration::from_millis(1000),
            invalidation_history: 100,
        }
    }
}

impl CacheConfig {
    /// Create configuration for memory-constrained environments
    pub fn memory_constrained() -> Self {
        Self {
            max_entries: 200,
            eviction_batch_size: 20,
            sweep_interval: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file; missing fields keep defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: CacheConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Default priority for entries owned by `resource_type`
    pub fn priority_for(&self, resource_type: ResourceType) -> CachePriority {
        self.type_priorities
            .get(&resource_type)
            .copied()
            .unwrap_or(CachePriority::Normal)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "max_entries must be greater than 0".to_string(),
            ));
        }

        if self.eviction_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "eviction_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sweep_interval must be non-zero".to_string(),
            ));
        }

        let ttls = &self.priority_ttls;
        if ttls.low.is_zero() {
            return Err(ConfigError::Invalid(
                "priority TTLs must be non-zero".to_string(),
            ));
        }
        if !(ttls.critical >= ttls.important
            && ttls.important >= ttls.normal
            && ttls.normal >= ttls.low)
        {
            return Err(ConfigError::Invalid(format!(
                "priority TTLs must not increase as priority drops (critical {:?}, important {:?}, normal {:?}, low {:?})",
                ttls.critical, ttls.important, ttls.normal, ttls.low
            )));
        }

        let bundles = &self.bundle_ttls;
        if !(bundles.critical >= bundles.important && bundles.important >= bundles.optional) {
            return Err(ConfigError::Invalid(
                "bundle TTLs must scale with tier importance".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(CacheConfig::memory_constrained().validate().is_ok());
    }

    #[test]
    fn test_inverted_ttl_table_is_rejected() {
        let mut config = CacheConfig::default();
        config.priority_ttls.low = Duration::from_secs(3600);

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_type_defaults_to_normal() {
        let mut config = CacheConfig::default();
        config.type_priorities.clear();

        assert_eq!(
            config.priority_for(ResourceType::Condition),
            CachePriority::Normal
        );
    }

    #[test]
    fn test_durations_serialize_as_plain_numbers() {
        let json = serde_json::to_value(CacheConfig::default()).unwrap();
        assert_eq!(json["search_ttl"], 300);
        assert_eq!(json["priority_ttls"]["critical"], 1800);
        assert_eq!(json["full_tier_delay"], 1000);

        let parsed: CacheConfig =
            serde_json::from_value(serde_json::json!({"important_tier_delay": 250})).unwrap();
        assert_eq!(parsed.important_tier_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_partial_json_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"max_entries": 25, "type_priorities": {{"Observation": "low"}}}}"#
        )
        .unwrap();

        let config = CacheConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_entries, 25);
        assert_eq!(
            config.priority_for(ResourceType::Observation),
            CachePriority::Low
        );
        assert_eq!(config.search_ttl, Duration::from_secs(300));
    }
}
