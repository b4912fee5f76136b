//! `catalog` commands

use advisor_lib::catalog::{CatalogRegistry, CloudInstance, JsonCatalogLoader, CUSTOM_VENDOR};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

use crate::output::{format_currency, print_table, OutputFormat};

/// Row for the instance table
#[derive(Tabled, Serialize)]
struct InstanceRow {
    #[tabled(rename = "Family")]
    family: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "vCPUs")]
    vcpus: u32,
    #[tabled(rename = "RAM (GB)")]
    ram_gb: f64,
    #[tabled(rename = "Price")]
    price: String,
}

impl InstanceRow {
    fn new(family: &str, instance: &CloudInstance, region: Option<&str>) -> Self {
        let price = match region {
            Some(region) => instance
                .price_in(region)
                .map(|p| format_currency(p, "USD"))
                .unwrap_or_else(|| "n/a".into()),
            None => format!("{} region(s)", instance.prices.len()),
        };
        Self {
            family: family.to_string(),
            model: instance.model.clone(),
            vcpus: instance.vcpus,
            ram_gb: instance.ram_gb,
            price,
        }
    }
}

/// Row for the vendor summary table
#[derive(Tabled, Serialize)]
struct VendorRow {
    #[tabled(rename = "Vendor")]
    vendor: String,
    #[tabled(rename = "Families")]
    families: usize,
    #[tabled(rename = "Instances")]
    instances: usize,
}

fn registry(data_path: Option<PathBuf>) -> CatalogRegistry {
    let mut loader = JsonCatalogLoader::with_builtin();
    if let Some(path) = data_path {
        loader = loader.with_file(CUSTOM_VENDOR, path);
    }
    CatalogRegistry::new(Arc::new(loader))
}

/// List a vendor catalog, optionally narrowed to one family
pub async fn show(
    vendor: &str,
    family: Option<&str>,
    region: Option<&str>,
    data_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let catalog = registry(data_path)
        .get_or_load(vendor)
        .await
        .with_context(|| format!("Failed to load catalog for vendor {}", vendor))?;

    let families: Vec<_> = match family {
        Some(name) => vec![catalog
            .require_family(name)
            .with_context(|| format!("Vendor {} has no such family", vendor))?],
        None => catalog.families().iter().collect(),
    };

    let rows: Vec<InstanceRow> = families
        .iter()
        .flat_map(|f| f.members.iter().map(|m| InstanceRow::new(&f.name, m, region)))
        .collect();
    print_table(&rows, format)
}

/// Summarize every vendor catalog that can be loaded
pub async fn vendors(data_path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let registry = registry(data_path);
    registry
        .preload_all()
        .await
        .context("Failed to load vendor catalogs")?;

    let rows: Vec<VendorRow> = registry
        .known_vendors()
        .into_iter()
        .filter_map(|vendor| {
            let catalog = registry.get(&vendor)?;
            Some(VendorRow {
                vendor,
                families: catalog.families().len(),
                instances: catalog.instance_count(),
            })
        })
        .collect();
    print_table(&rows, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_price_for_region() {
        colored::control::set_override(false);
        let instance = CloudInstance::new("Test1_8_16", 8, 16.0)
            .with_price("eastus", 0.8)
            .with_price("westus", 0.85);

        let row = InstanceRow::new("Test1", &instance, Some("eastus"));
        assert_eq!(row.price, "$0.80");

        let row = InstanceRow::new("Test1", &instance, Some("northeurope"));
        assert_eq!(row.price, "n/a");

        let row = InstanceRow::new("Test1", &instance, None);
        assert_eq!(row.price, "2 region(s)");
    }

    #[tokio::test]
    async fn test_show_unknown_family_fails() {
        let err = show("aws", Some("no-such-family"), None, None, OutputFormat::Json)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("no family data for no-such-family"));
    }

    #[tokio::test]
    async fn test_vendors_includes_custom_catalog() {
        let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../advisor-lib/tests/fixtures/test-instances.json");
        assert!(vendors(Some(fixture), OutputFormat::Json).await.is_ok());

        let missing = PathBuf::from("/nonexistent/instances.json");
        assert!(vendors(Some(missing), OutputFormat::Json).await.is_err());
    }
}
