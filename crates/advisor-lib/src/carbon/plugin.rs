//! Carbon advisor plugin: attaches `suggestions` (and `plotted_points` when
//! sampling) to every input record.

use super::config::{CarbonAdvisorConfig, CarbonAdvisorParams};
use super::locations::LocationTable;
use super::search::{CarbonSearch, SearchResult};
use super::source::{EmissionsSource, HttpEmissionsSource};
use crate::error::Result;
use crate::models::{EmissionsRecord, PluginRecord};
use crate::observability::{AdvisorMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::Arc;

pub const FIELD_SUGGESTIONS: &str = "suggestions";
pub const FIELD_PLOTTED_POINTS: &str = "plotted_points";

pub struct CarbonAdvisorPlugin {
    params: CarbonAdvisorParams,
    config: CarbonAdvisorConfig,
    table: LocationTable,
    source: Arc<dyn EmissionsSource>,
    now: Option<DateTime<Utc>>,
    metrics: AdvisorMetrics,
    logger: StructuredLogger,
}

impl CarbonAdvisorPlugin {
    /// Plugin querying the carbon-aware web API at `api-url`
    pub fn new(params: CarbonAdvisorParams) -> Result<Self> {
        let table = LocationTable::builtin()?;
        let config = params.validate(&table)?;
        let source = HttpEmissionsSource::new(config.api_url.clone())?;
        Self::build(params, config, table, Arc::new(source))
    }

    /// Plugin reading emissions from a caller-supplied source
    pub fn with_source(params: CarbonAdvisorParams, source: Arc<dyn EmissionsSource>) -> Result<Self> {
        let table = LocationTable::builtin()?;
        let config = params.validate(&table)?;
        Self::build(params, config, table, source)
    }

    fn build(
        params: CarbonAdvisorParams,
        config: CarbonAdvisorConfig,
        table: LocationTable,
        source: Arc<dyn EmissionsSource>,
    ) -> Result<Self> {
        let logger = StructuredLogger::new("carbon-advisor");
        logger.log_configured(&format!(
            "locations={} windows={} sampling={:?}",
            config.locations.len(),
            config.windows.len(),
            config.sampling
        ));

        Ok(Self {
            params,
            config,
            table,
            source,
            now: None,
            metrics: AdvisorMetrics::new(),
            logger,
        })
    }

    /// Fix the current time, for reproducible forecasting
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn config(&self) -> &CarbonAdvisorConfig {
        &self.config
    }

    /// Run the search for every record. Any invalid parameter aborts the
    /// batch.
    pub async fn execute(&self, inputs: Vec<PluginRecord>) -> Result<Vec<PluginRecord>> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut outputs = Vec::with_capacity(inputs.len());

        for mut record in inputs {
            let overridden;
            let config = if CarbonAdvisorParams::has_override(&record) {
                overridden = self.params.overridden_by(&record)?.validate(&self.table)?;
                &overridden
            } else {
                &self.config
            };

            let mut search = CarbonSearch::new(self.source.as_ref(), config);
            if let Some(now) = self.now {
                search = search.at(now);
            }
            let result = search.run(&mut rng).await?;
            self.report(&result);

            record.insert(FIELD_SUGGESTIONS.into(), to_array(&result.suggestions));
            if let Some(points) = &result.plotted_points {
                record.insert(FIELD_PLOTTED_POINTS.into(), to_array(points));
            }
            outputs.push(record);
        }

        Ok(outputs)
    }

    fn report(&self, result: &SearchResult) {
        let count = result.suggestions.len();
        self.metrics.set_last_suggestion_count(count as i64);
        self.logger.log_suggestions(
            count,
            result.suggestions.first().map(|s| s.rating),
            result.plotted_points.as_ref().map_or(0, Vec::len),
        );
    }
}

fn to_array(records: &[EmissionsRecord]) -> Value {
    Value::Array(records.iter().map(EmissionsRecord::to_output).collect())
}
