//! Chart session fixture
//!
//! Wraps a `ChartSession` over an `InMemoryApi` so tests can drive the public
//! session API and still observe remote traffic through the API counters.

use chartcache::{CacheConfig, ChartSession, InMemoryApi, Resource};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::sample_chart;

pub struct ChartFixture {
    pub api: Arc<InMemoryApi>,
    pub session: Arc<ChartSession>,
}

impl ChartFixture {
    /// Fixture over the sample chart with default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self::with_resources(sample_chart::full_chart(), config)
    }

    pub fn with_resources(resources: Vec<Resource>, config: CacheConfig) -> Self {
        let api = Arc::new(InMemoryApi::with_resources(resources));
        let session = ChartSession::new(api.clone(), config).expect("valid cache config");
        Self { api, session }
    }

    /// Fixture whose API was loaded from a Bundle JSON file on disk
    pub fn from_bundle_file() -> Result<(Self, tempfile::TempDir), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let entries: Vec<_> = sample_chart::full_chart()
            .iter()
            .map(|r| json!({"resource": r.to_json()}))
            .collect();
        let bundle = json!({"resourceType": "Bundle", "type": "collection", "entry": entries});
        std::fs::write(
            dir.path().join("chart.json"),
            serde_json::to_string_pretty(&bundle)?,
        )?;
        std::fs::write(dir.path().join("README.txt"), "not a bundle")?;

        let api = Arc::new(InMemoryApi::from_dir(dir.path())?);
        let session = ChartSession::new(api.clone(), CacheConfig::default())?;
        Ok((Self { api, session }, dir))
    }

    /// Let background tiers of the last patient switch finish
    pub async fn settle(&self) {
        let config = self.session.cache().config();
        let wait = config.full_tier_delay + config.important_tier_delay + Duration::from_secs(1);
        tokio::time::sleep(wait).await;
    }
}
