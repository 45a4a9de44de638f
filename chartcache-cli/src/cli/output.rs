// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Output formatting for CLI commands

use chartcache::{CacheStats, FetchState, LoadTier, PatientBundle, Resource, ResourceType, SubjectContext};
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::commands::OutputFormat;

/// Formats load results and statistics
pub struct ReportFormatter;

impl ReportFormatter {
    pub fn format_context(context: &SubjectContext, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => {
                let name = context
                    .patient
                    .as_ref()
                    .map(Self::patient_name)
                    .unwrap_or_else(|| "(patient record unavailable)".to_string());
                let encounter = context
                    .current_encounter
                    .as_ref()
                    .map(|e| format!("{} ({})", e.id(), e.status().unwrap_or("unknown")))
                    .unwrap_or_else(|| "none".to_string());
                format!(
                    "{} {} {}\nCurrent encounter: {}\n",
                    "Patient".bold().green(),
                    context.subject_id.bold(),
                    name,
                    encounter
                )
            }
            OutputFormat::Json => Self::pretty(&json!({
                "subject_id": context.subject_id,
                "patient": context.patient.as_ref().map(Resource::to_json),
                "current_encounter": context.current_encounter.as_ref().map(Resource::id),
                "generation": context.generation,
                "loaded_at": context.loaded_at.to_rfc3339(),
            })),
        }
    }

    pub fn format_bundle(tier: LoadTier, bundle: &PatientBundle, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::bundle_table(tier, bundle),
            OutputFormat::Json => Self::pretty(&json!({
                "tier": tier.as_str(),
                "subject_id": bundle.subject_id,
                "resources": bundle
                    .resources
                    .iter()
                    .map(|(ty, list)| (ty.as_str().to_string(), json!(list.iter().map(Resource::to_json).collect::<Vec<_>>())))
                    .collect::<serde_json::Map<_, _>>(),
                "errors": bundle
                    .errors
                    .iter()
                    .map(|(ty, e)| (ty.as_str().to_string(), json!(e)))
                    .collect::<serde_json::Map<_, _>>(),
            })),
        }
    }

    fn bundle_table(tier: LoadTier, bundle: &PatientBundle) -> String {
        let mut output = format!(
            "{} {} tier: {} resources\n",
            "Loaded".bold().green(),
            tier,
            bundle.resource_count()
        );

        if bundle.resource_count() > 0 {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(
                ["Type", "Id", "Status", "Date", "Summary"]
                    .iter()
                    .map(|h| Cell::new(h).fg(Color::Green))
                    .collect::<Vec<_>>(),
            );
            for resource in bundle.resources.values().flatten() {
                table.add_row(vec![
                    resource.resource_type().to_string(),
                    resource.id().to_string(),
                    resource.status().unwrap_or("").to_string(),
                    Self::date_of(resource),
                    Self::summary_of(resource),
                ]);
            }
            output.push_str(&table.to_string());
            output.push('\n');
        }

        if !bundle.errors.is_empty() {
            output.push_str(&format!("{}\n", "Failed types:".bold().yellow()));
            for (resource_type, error) in &bundle.errors {
                output.push_str(&format!("  {}: {}\n", resource_type, error.yellow()));
            }
        }
        output
    }

    pub fn format_stats(
        stats: &CacheStats,
        states: &BTreeMap<ResourceType, FetchState>,
        remote_calls: usize,
        format: OutputFormat,
    ) -> String {
        match format {
            OutputFormat::Table => {
                let mut table = Table::new();
                table.load_preset(UTF8_FULL);
                table.set_header(vec![
                    Cell::new("Metric").fg(Color::Green),
                    Cell::new("Value").fg(Color::Green),
                ]);
                table.add_row(vec!["Requests".to_string(), stats.total_requests.to_string()]);
                table.add_row(vec!["Hits".to_string(), stats.hits.to_string()]);
                table.add_row(vec!["Misses".to_string(), stats.misses.to_string()]);
                table.add_row(vec![
                    "Hit rate".to_string(),
                    format!("{:.1}%", stats.hit_rate() * 100.0),
                ]);
                table.add_row(vec!["Insertions".to_string(), stats.insertions.to_string()]);
                table.add_row(vec!["Expirations".to_string(), stats.expirations.to_string()]);
                table.add_row(vec!["Evictions".to_string(), stats.evictions.to_string()]);
                table.add_row(vec!["Remote calls".to_string(), remote_calls.to_string()]);

                let mut output = format!("{}\n{}\n", "Cache Statistics".bold().green(), table);
                output.push_str(&format!("\n{}\n", "Fetch State".bold().green()));
                for (resource_type, state) in states {
                    let label = match state {
                        FetchState::Loaded => "loaded".green(),
                        FetchState::Loading => "loading".cyan(),
                        FetchState::Idle => "idle".normal(),
                        FetchState::Error(e) => format!("error: {}", e).red(),
                    };
                    output.push_str(&format!("  {:<20} {}\n", resource_type.as_str(), label));
                }
                output
            }
            OutputFormat::Json => Self::pretty(&json!({
                "cache": {
                    "total_requests": stats.total_requests,
                    "hits": stats.hits,
                    "misses": stats.misses,
                    "hit_rate": stats.hit_rate(),
                    "insertions": stats.insertions,
                    "expirations": stats.expirations,
                    "evictions": stats.evictions,
                },
                "remote_calls": remote_calls,
                "fetch_states": states
                    .iter()
                    .map(|(ty, state)| (ty.as_str().to_string(), json!(state)))
                    .collect::<serde_json::Map<_, _>>(),
            })),
        }
    }

    fn patient_name(patient: &Resource) -> String {
        let name = patient
            .field("name")
            .and_then(Value::as_array)
            .and_then(|names| names.first());
        match name {
            Some(name) => {
                let given = name
                    .get("given")
                    .and_then(Value::as_array)
                    .map(|g| {
                        g.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                let family = name.get("family").and_then(Value::as_str).unwrap_or("");
                format!("{} {}", given, family).trim().to_string()
            }
            None => String::new(),
        }
    }

    fn date_of(resource: &Resource) -> String {
        ["effectiveDateTime", "recordedDate", "authoredOn", "occurrenceDateTime", "date"]
            .iter()
            .find_map(|f| resource.field(f).and_then(Value::as_str))
            .or_else(|| {
                resource
                    .field("period")
                    .and_then(|p| p.get("start"))
                    .and_then(Value::as_str)
            })
            .unwrap_or("")
            .to_string()
    }

    fn summary_of(resource: &Resource) -> String {
        ["code", "medicationCodeableConcept", "vaccineCode", "type"]
            .iter()
            .find_map(|f| {
                let concept = resource.field(f)?;
                let concept = concept.as_array().and_then(|a| a.first()).unwrap_or(concept);
                concept
                    .get("text")
                    .and_then(Value::as_str)
                    .or_else(|| {
                        concept
                            .get("coding")
                            .and_then(Value::as_array)
                            .and_then(|c| c.first())
                            .and_then(|c| c.get("display"))
                            .and_then(Value::as_str)
                    })
                    .map(str::to_owned)
            })
            .unwrap_or_default()
    }

    fn pretty(value: &Value) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|_| "{\"status\": \"error\"}".to_string())
    }
}
