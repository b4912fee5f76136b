//! Subcommand implementations

pub mod carbon;
pub mod catalog;
pub mod rightsize;

use advisor_lib::PluginRecord;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read plugin input records from a JSON file, or stdin for `-`.
///
/// Accepts either an array of records or an object with an `inputs` array.
pub async fn read_records(path: &Path) -> Result<Vec<PluginRecord>> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("Failed to read input from stdin")?;
        buffer
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read input file {}", path.display()))?
    };

    parse_records(&content)
}

fn parse_records(content: &str) -> Result<Vec<PluginRecord>> {
    let document: Value = serde_json::from_str(content).context("Input is not valid JSON")?;
    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("inputs") {
            Some(Value::Array(items)) => items,
            _ => bail!("Input object must contain an \"inputs\" array"),
        },
        _ => bail!("Input must be an array of records"),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            _ => bail!("Input record {} is not an object", index),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array_and_inputs_object() {
        let records = parse_records(r#"[{"cpu-util": 50}, {"cpu-util": 20}]"#).unwrap();
        assert_eq!(records.len(), 2);

        let records = parse_records(r#"{"inputs": [{"cpu-util": 50}]}"#).unwrap();
        assert_eq!(records[0]["cpu-util"], 50);
    }

    #[test]
    fn test_parse_rejects_non_records() {
        assert!(parse_records("[1, 2]").is_err());
        assert!(parse_records(r#"{"outputs": []}"#).is_err());
        assert!(parse_records("42").is_err());
        assert!(parse_records("not json").is_err());
    }

    #[tokio::test]
    async fn test_read_records_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, r#"[{"cloud-vendor": "aws"}]"#).unwrap();

        let records = read_records(&path).await.unwrap();
        assert_eq!(records[0]["cloud-vendor"], "aws");
    }
}
