//! Right-sizing plugin: validates input records, selects the vendor catalog
//! and expands each record into one output row per recommended instance.

use super::optimizer::{Outcome, Recommendation, RightSizingOptimizer};
use crate::catalog::{CatalogLoader, CatalogRegistry, JsonCatalogLoader, CUSTOM_VENDOR};
use crate::error::{AdvisorError, Result};
use crate::models::{record_f64, record_str, require_f64, require_str, PluginRecord};
use crate::observability::{AdvisorMetrics, StructuredLogger};
use crate::util::{fix_float, fraction_to_percent, percent_to_fraction, round_to};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub const FIELD_INSTANCE_TYPE: &str = "cloud-instance-type";
pub const FIELD_VENDOR: &str = "cloud-vendor";
pub const FIELD_CPU_UTIL: &str = "cpu-util";
pub const FIELD_TARGET_CPU_UTIL: &str = "target-cpu-util";
pub const FIELD_MEM_UTIL: &str = "mem-util";
pub const FIELD_TOTAL_MEMORY: &str = "total-memoryGB";
pub const FIELD_LOCATION: &str = "location";
pub const FIELD_OLD_INSTANCE: &str = "old-instance";
pub const FIELD_OLD_CPU_UTIL: &str = "old-cpu-util";
pub const FIELD_OLD_MEM_UTIL: &str = "old-mem-util";
pub const FIELD_OUTPUT_ID: &str = "output-id";
pub const FIELD_PRICE_DIFFERENCE: &str = "price-difference";
pub const FIELD_PRICE_CHANGE: &str = "price-change";

/// Marker written to `price-change` when the original instance is kept
pub const SIZE_ALREADY_OPTIMAL: &str = "Size already optimal";

/// Plugin configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RightSizingConfig {
    /// Catalog file registered as the `custom` vendor
    #[serde(default)]
    pub data_path: Option<PathBuf>,
    /// Default target CPU utilization percentage, in (0, 100]
    #[serde(default)]
    pub target_cpu_util: Option<f64>,
}

impl RightSizingConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(target) = self.target_cpu_util {
            if !(target > 0.0 && target <= 100.0) {
                return Err(AdvisorError::Configuration(format!(
                    "target-cpu-util must be in (0, 100], got {}",
                    target
                )));
            }
        }
        Ok(())
    }

    fn default_target(&self) -> f64 {
        self.target_cpu_util.unwrap_or(100.0)
    }
}

/// Validated view of one input record
#[derive(Debug, Clone, PartialEq)]
struct RightSizingInput<'a> {
    instance_type: &'a str,
    vendor: &'a str,
    cpu_util: f64,
    target_cpu_util: f64,
    mem_util: f64,
    region: Option<&'a str>,
}

impl<'a> RightSizingInput<'a> {
    fn parse(record: &'a PluginRecord, default_target: f64) -> Result<Self> {
        let instance_type = require_str(record, FIELD_INSTANCE_TYPE)?;
        let vendor = require_str(record, FIELD_VENDOR)?;
        let cpu_util = percentage(require_f64(record, FIELD_CPU_UTIL)?, FIELD_CPU_UTIL)?;
        let target_cpu_util = percentage(
            record_f64(record, FIELD_TARGET_CPU_UTIL)?.unwrap_or(default_target),
            FIELD_TARGET_CPU_UTIL,
        )?;
        if target_cpu_util == 0.0 {
            return Err(AdvisorError::InputValidation(format!(
                "{} must be greater than 0",
                FIELD_TARGET_CPU_UTIL
            )));
        }
        let mem_util = percentage(
            record_f64(record, FIELD_MEM_UTIL)?.unwrap_or(100.0),
            FIELD_MEM_UTIL,
        )?;
        if let Some(total) = record_f64(record, FIELD_TOTAL_MEMORY)? {
            if total < 0.0 {
                return Err(AdvisorError::InputValidation(format!(
                    "{} must not be negative",
                    FIELD_TOTAL_MEMORY
                )));
            }
        }
        let region = record_str(record, FIELD_LOCATION)?;

        Ok(Self {
            instance_type,
            vendor,
            cpu_util,
            target_cpu_util,
            mem_util,
            region,
        })
    }
}

fn percentage(value: f64, field: &str) -> Result<f64> {
    if !(0.0..=100.0).contains(&value) {
        return Err(AdvisorError::InputValidation(format!(
            "{} must be a percentage in [0, 100], got {}",
            field, value
        )));
    }
    Ok(value)
}

/// Human-readable summary of a price difference
pub fn price_change_message(recommendation: &Recommendation) -> String {
    if recommendation.outcome == Outcome::Unpriced {
        return "Price difference unavailable".to_string();
    }
    if recommendation.keeps_original() {
        return SIZE_ALREADY_OPTIMAL.to_string();
    }
    match recommendation.price_difference().map(|d| round_to(d, 2)) {
        None => "Price difference unavailable".to_string(),
        Some(diff) if diff > 0.0 => format!("Price decreased by {}%", diff),
        Some(diff) if diff < 0.0 => format!("Price increased by {}%", -diff),
        Some(_) => "Price unchanged".to_string(),
    }
}

/// Right-sizing plugin over lazily loaded vendor catalogs
pub struct RightSizingPlugin {
    config: RightSizingConfig,
    registry: CatalogRegistry,
    metrics: AdvisorMetrics,
    logger: StructuredLogger,
}

impl RightSizingPlugin {
    /// Plugin serving the built-in catalogs plus `data-path` as `custom`
    pub fn new(config: RightSizingConfig) -> Result<Self> {
        let mut loader = JsonCatalogLoader::with_builtin();
        if let Some(path) = &config.data_path {
            loader = loader.with_file(CUSTOM_VENDOR, path.clone());
        }
        Self::with_loader(config, Arc::new(loader))
    }

    /// Plugin reading catalogs through a caller-supplied loader
    pub fn with_loader(config: RightSizingConfig, loader: Arc<dyn CatalogLoader>) -> Result<Self> {
        config.validate()?;
        let logger = StructuredLogger::new("right-sizing");
        logger.log_configured(&format!(
            "vendors={:?} target-cpu-util={}",
            loader.vendors(),
            config.default_target()
        ));

        Ok(Self {
            config,
            registry: CatalogRegistry::new(loader),
            metrics: AdvisorMetrics::new(),
            logger,
        })
    }

    pub fn config(&self) -> &RightSizingConfig {
        &self.config
    }

    pub fn registry(&self) -> &CatalogRegistry {
        &self.registry
    }

    /// Right-size every input record.
    ///
    /// Records that fail validation are copied to the output unchanged.
    /// Catalog failures abort the batch.
    pub async fn execute(&self, inputs: Vec<PluginRecord>) -> Result<Vec<PluginRecord>> {
        let mut outputs = Vec::with_capacity(inputs.len());

        for record in inputs {
            match self.process_record(&record).await {
                Ok(rows) => {
                    self.metrics.inc_records_right_sized();
                    outputs.extend(rows);
                }
                Err(e) if e.is_record_error() => {
                    self.metrics.inc_records_passed_through();
                    self.logger.log_passthrough(&e.to_string());
                    outputs.push(record);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(outputs)
    }

    async fn process_record(&self, record: &PluginRecord) -> Result<Vec<PluginRecord>> {
        let input = RightSizingInput::parse(record, self.config.default_target())?;
        let catalog = self.registry.get_or_load(input.vendor).await?;

        let started = Instant::now();
        let recommendation = RightSizingOptimizer::new(&catalog).optimize(
            input.instance_type,
            percent_to_fraction(input.cpu_util),
            percent_to_fraction(input.target_cpu_util),
            percent_to_fraction(input.mem_util),
            input.region,
        )?;
        self.metrics
            .observe_optimizer_latency(started.elapsed().as_secs_f64());

        if recommendation.outcome == Outcome::Fallback {
            self.metrics.inc_optimizer_fallbacks();
            self.logger.log_fallback(
                input.instance_type,
                recommendation.demand.vcpus,
                recommendation.demand.ram_gb,
            );
        }

        let output_id = Uuid::new_v4().to_string();
        let price_change = price_change_message(&recommendation);
        let price_difference = recommendation.price_difference().map(fix_float);

        let rows = recommendation
            .members
            .iter()
            .map(|member| {
                let mut row = record.clone();
                row.insert(FIELD_INSTANCE_TYPE.into(), json!(member.instance.model));
                row.insert(FIELD_CPU_UTIL.into(), json!(fix_float(fraction_to_percent(member.cpu_util))));
                row.insert(FIELD_MEM_UTIL.into(), json!(fix_float(fraction_to_percent(member.mem_util))));
                row.insert(FIELD_TOTAL_MEMORY.into(), json!(member.instance.ram_gb));
                row.insert(FIELD_OLD_INSTANCE.into(), json!(input.instance_type));
                row.insert(FIELD_OLD_CPU_UTIL.into(), json!(input.cpu_util));
                row.insert(FIELD_OLD_MEM_UTIL.into(), json!(input.mem_util));
                row.insert(FIELD_OUTPUT_ID.into(), Value::String(output_id.clone()));
                if let Some(diff) = price_difference {
                    row.insert(FIELD_PRICE_DIFFERENCE.into(), json!(diff));
                }
                row.insert(FIELD_PRICE_CHANGE.into(), Value::String(price_change.clone()));
                row
            })
            .collect();

        let models: Vec<&str> = recommendation
            .members
            .iter()
            .map(|m| m.instance.model.as_str())
            .collect();
        self.logger
            .log_right_sizing(&output_id, input.instance_type, &models, price_difference);

        Ok(rows)
    }
}
