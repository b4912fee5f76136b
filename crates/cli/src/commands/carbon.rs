//! `carbon-advise` command

use advisor_lib::carbon::{
    CarbonAdvisorParams, CarbonAdvisorPlugin, InMemoryEmissionsSource, FIELD_PLOTTED_POINTS,
    FIELD_SUGGESTIONS,
};
use advisor_lib::{EmissionsRecord, PluginRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::Tabled;
use tracing::info;

use super::read_records;
use crate::output::{print_info, print_records, print_table, print_warning, OutputFormat};

/// Row for the suggestions table
#[derive(Tabled, Serialize)]
struct SuggestionRow {
    #[tabled(rename = "Record")]
    record: usize,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Rating")]
    rating: f64,
    #[tabled(rename = "Duration")]
    duration: String,
}

/// Where emissions data comes from
pub enum Emissions {
    Api,
    File(PathBuf),
}

/// Command options resolved from flags and configuration
pub struct CarbonOptions {
    pub params: CarbonAdvisorParams,
    pub emissions: Emissions,
    pub now: Option<DateTime<Utc>>,
}

/// Run the carbon advisor over the records in `input`
pub async fn run(options: CarbonOptions, input: &Path, format: OutputFormat) -> Result<()> {
    let records = read_records(input).await?;

    let plugin = match &options.emissions {
        Emissions::Api => CarbonAdvisorPlugin::new(options.params),
        Emissions::File(path) => {
            let source = InMemoryEmissionsSource::from_file(path)
                .await
                .with_context(|| format!("Failed to load emissions from {}", path.display()))?;
            if source.is_empty() {
                print_warning(&format!("No emissions records in {}", path.display()));
            }
            info!(path = %path.display(), records = source.len(), "Loaded emissions file");
            CarbonAdvisorPlugin::with_source(options.params, Arc::new(source))
        }
    }
    .context("Invalid carbon advisor configuration")?;
    let plugin = match options.now {
        Some(now) => plugin.with_now(now),
        None => plugin,
    };

    let outputs = plugin
        .execute(records)
        .await
        .context("Carbon advisor failed")?;

    match format {
        OutputFormat::Json => print_records(&outputs)?,
        OutputFormat::Table => {
            print_table(&suggestion_rows(&outputs), format)?;
            let plotted: usize = outputs
                .iter()
                .map(|r| records_in(r, FIELD_PLOTTED_POINTS).len())
                .sum();
            if plotted > 0 {
                print_info(&format!(
                    "{} plotted point(s); use --format json to list them",
                    plotted
                ));
            }
        }
    }

    Ok(())
}

fn suggestion_rows(outputs: &[PluginRecord]) -> Vec<SuggestionRow> {
    outputs
        .iter()
        .enumerate()
        .flat_map(|(index, record)| {
            records_in(record, FIELD_SUGGESTIONS)
                .into_iter()
                .map(move |s| SuggestionRow {
                    record: index,
                    location: s.location,
                    time: s.time.to_rfc3339(),
                    rating: s.rating,
                    duration: s.duration.unwrap_or_else(|| "-".into()),
                })
        })
        .collect()
}

fn records_in(record: &PluginRecord, key: &str) -> Vec<EmissionsRecord> {
    record
        .get(key)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}
