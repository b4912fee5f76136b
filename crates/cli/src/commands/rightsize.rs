//! `right-size` command

use advisor_lib::rightsizing::{
    RightSizingConfig, RightSizingPlugin, FIELD_CPU_UTIL, FIELD_INSTANCE_TYPE, FIELD_MEM_UTIL,
    FIELD_OLD_INSTANCE, FIELD_PRICE_CHANGE, FIELD_TOTAL_MEMORY,
};
use advisor_lib::PluginRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tabled::Tabled;

use super::read_records;
use crate::output::{
    color_price_change, format_percent, print_records, print_success, print_table, print_warning,
    OutputFormat,
};

/// Row for the right-sizing results table
#[derive(Tabled, Serialize)]
struct RightSizingRow {
    #[tabled(rename = "Original")]
    original: String,
    #[tabled(rename = "Instance")]
    instance: String,
    #[tabled(rename = "CPU")]
    cpu_util: String,
    #[tabled(rename = "Memory")]
    mem_util: String,
    #[tabled(rename = "RAM (GB)")]
    ram_gb: String,
    #[tabled(rename = "Price change")]
    price_change: String,
}

impl RightSizingRow {
    /// `None` for records passed through without right-sizing
    fn from_record(record: &PluginRecord) -> Option<Self> {
        let original = text(record, FIELD_OLD_INSTANCE)?;
        Some(Self {
            original,
            instance: text(record, FIELD_INSTANCE_TYPE).unwrap_or_default(),
            cpu_util: percent(record, FIELD_CPU_UTIL),
            mem_util: percent(record, FIELD_MEM_UTIL),
            ram_gb: record
                .get(FIELD_TOTAL_MEMORY)
                .and_then(Value::as_f64)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".into()),
            price_change: text(record, FIELD_PRICE_CHANGE)
                .map(|m| color_price_change(&m))
                .unwrap_or_default(),
        })
    }
}

fn text(record: &PluginRecord, key: &str) -> Option<String> {
    record.get(key).and_then(Value::as_str).map(str::to_string)
}

fn percent(record: &PluginRecord, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_f64)
        .map(format_percent)
        .unwrap_or_else(|| "-".into())
}

/// Right-size the records in `input`
pub async fn run(config: RightSizingConfig, input: &Path, format: OutputFormat) -> Result<()> {
    let records = read_records(input).await?;
    let plugin = RightSizingPlugin::new(config).context("Invalid right-sizing configuration")?;
    let outputs = plugin
        .execute(records)
        .await
        .context("Right-sizing failed")?;

    match format {
        OutputFormat::Json => print_records(&outputs)?,
        OutputFormat::Table => {
            let rows: Vec<RightSizingRow> =
                outputs.iter().filter_map(RightSizingRow::from_record).collect();
            let skipped = outputs.len() - rows.len();

            print_table(&rows, format)?;
            if skipped > 0 {
                print_warning(&format!("{} record(s) passed through unchanged", skipped));
            }
            print_success(&format!("{} output row(s)", outputs.len()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_from_right_sized_record() {
        colored::control::set_override(false);
        let record = json!({
            "old-instance": "m5.2xlarge",
            "cloud-instance-type": "m5.xlarge",
            "cpu-util": 50.0,
            "mem-util": 37.5,
            "total-memoryGB": 16.0,
            "price-change": "Price decreased by 50%"
        });
        let row = RightSizingRow::from_record(record.as_object().unwrap()).unwrap();

        assert_eq!(row.original, "m5.2xlarge");
        assert_eq!(row.instance, "m5.xlarge");
        assert_eq!(row.cpu_util, "50.0%");
        assert_eq!(row.mem_util, "37.5%");
        assert_eq!(row.ram_gb, "16");
        assert_eq!(row.price_change, "Price decreased by 50%");
    }

    #[test]
    fn test_passthrough_record_has_no_row() {
        let record = json!({"cloud-instance-type": "m5.large", "cpu-util": 500});
        assert!(RightSizingRow::from_record(record.as_object().unwrap()).is_none());
    }
}
