//! JSON catalog loading
//!
//! Catalog files map a family name to its SKUs:
//!
//! ```json
//! { "m5": [ { "model": "m5.large", "vCPUs": 2, "RAM": 8.0,
//!             "Price": { "us-east-1": 0.096, "ap-east-1": "Not available" } } ] }
//! ```

use super::{CatalogLoader, CloudInstance, InstanceFamily};
use crate::error::{AdvisorError, Result};
use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::debug;

/// Vendor name used for catalogs supplied through `data-path`
pub const CUSTOM_VENDOR: &str = "custom";

/// Vendors with catalogs compiled into the library
pub const BUILTIN_VENDORS: &[&str] = &["aws", "azure"];

const AWS_INSTANCES: &str = include_str!("../../data/aws-instances.json");
const AZURE_INSTANCES: &str = include_str!("../../data/azure-instances.json");

#[derive(Debug, Deserialize)]
struct RawInstance {
    model: String,
    #[serde(rename = "vCPUs")]
    vcpus: u32,
    #[serde(rename = "RAM")]
    ram: f64,
    #[serde(rename = "Price", alias = "price", default)]
    price: HashMap<String, RawPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPrice {
    Amount(f64),
    // "Not available", null, ...
    Unavailable(IgnoredAny),
}

/// Parse a catalog document into families, ordered by family name
pub fn parse_families(json: &str) -> Result<Vec<InstanceFamily>> {
    let raw: BTreeMap<String, Vec<RawInstance>> = serde_json::from_str(json)?;

    Ok(raw
        .into_iter()
        .map(|(name, models)| {
            let members = models
                .into_iter()
                .map(|m| CloudInstance {
                    model: m.model,
                    vcpus: m.vcpus,
                    ram_gb: m.ram,
                    prices: m
                        .price
                        .into_iter()
                        .filter_map(|(region, price)| match price {
                            RawPrice::Amount(amount) => Some((region, amount)),
                            RawPrice::Unavailable(_) => None,
                        })
                        .collect(),
                })
                .collect();
            InstanceFamily::new(name, members)
        })
        .collect())
}

/// Where a vendor's catalog document lives
#[derive(Debug, Clone)]
pub enum CatalogSource {
    /// Document compiled into the binary
    Embedded(&'static str),
    /// Document read from disk on first use
    File(PathBuf),
}

/// Loader resolving vendors to JSON catalog documents
#[derive(Debug, Clone, Default)]
pub struct JsonCatalogLoader {
    sources: HashMap<String, CatalogSource>,
}

impl JsonCatalogLoader {
    /// Loader with no vendors registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader serving the built-in `aws` and `azure` catalogs
    pub fn with_builtin() -> Self {
        Self::new()
            .with_source("aws", CatalogSource::Embedded(AWS_INSTANCES))
            .with_source("azure", CatalogSource::Embedded(AZURE_INSTANCES))
    }

    /// Register (or replace) the source for a vendor
    pub fn with_source(mut self, vendor: &str, source: CatalogSource) -> Self {
        self.sources.insert(normalize_vendor(vendor), source);
        self
    }

    /// Register a catalog file for a vendor
    pub fn with_file(self, vendor: &str, path: impl Into<PathBuf>) -> Self {
        self.with_source(vendor, CatalogSource::File(path.into()))
    }
}

#[async_trait]
impl CatalogLoader for JsonCatalogLoader {
    async fn load(&self, vendor: &str) -> Result<Vec<InstanceFamily>> {
        let key = normalize_vendor(vendor);
        let source = self
            .sources
            .get(&key)
            .ok_or_else(|| AdvisorError::UnknownVendor(vendor.to_string()))?;

        let families = match source {
            CatalogSource::Embedded(document) => parse_families(document),
            CatalogSource::File(path) => {
                debug!(vendor = %key, path = %path.display(), "Reading catalog file");
                let document = tokio::fs::read_to_string(path).await.map_err(|e| {
                    AdvisorError::CatalogLoad(format!("{}: {}", path.display(), e))
                })?;
                parse_families(&document)
            }
        }
        .map_err(|e| match e {
            AdvisorError::Json(err) => AdvisorError::CatalogLoad(format!("{} catalog: {}", key, err)),
            other => other,
        })?;

        Ok(families)
    }

    fn vendors(&self) -> Vec<String> {
        let mut vendors: Vec<String> = self.sources.keys().cloned().collect();
        vendors.sort();
        vendors
    }
}

/// Vendor keys are case-insensitive
pub(crate) fn normalize_vendor(vendor: &str) -> String {
    vendor.trim().to_ascii_lowercase()
}
