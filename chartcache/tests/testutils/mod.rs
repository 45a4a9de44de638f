//! Test utilities for chartcache integration tests
//!
//! - `sample_chart`: FHIR resources for a small two-patient chart
//! - `ChartFixture`: a chart session over an in-memory API holding that chart

pub mod chart_fixture;
pub mod sample_chart;
