//! Carbon advisor parameters and their validated form

use super::locations::LocationTable;
use crate::error::{AdvisorError, Result};
use crate::models::{PluginRecord, TimeWindow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub const PARAM_ALLOWED_LOCATIONS: &str = "allowed-locations";
pub const PARAM_ALLOWED_TIMEFRAMES: &str = "allowed-timeframes";
pub const PARAM_SAMPLING: &str = "sampling";

pub const DEFAULT_API_URL: &str = "http://localhost:5073";
pub const DEFAULT_LOOKBACK_DAYS: u32 = 10;
pub const DEFAULT_MAX_LOOKBACK_YEARS: u32 = 5;

/// Raw plugin parameters, as written in a manifest or config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CarbonAdvisorParams {
    #[serde(default)]
    pub allowed_locations: Option<Vec<String>>,
    /// Windows in the form `"<from> - <to>"`
    #[serde(default)]
    pub allowed_timeframes: Option<Vec<String>>,
    /// Number of plotted points to return; absent or 0 disables sampling
    #[serde(default)]
    pub sampling: Option<usize>,
    /// Seed for sampling and tie breaking
    #[serde(default)]
    pub seed: Option<u64>,
    /// Base URL of the carbon-aware web API
    #[serde(default)]
    pub api_url: Option<String>,
    /// Days of recent data averaged into forecasts
    #[serde(default)]
    pub lookback_days: Option<u32>,
    /// How many years back a future window may be looked up
    #[serde(default)]
    pub max_lookback_years: Option<u32>,
}

/// Validated configuration consumed by the search
#[derive(Debug, Clone, PartialEq)]
pub struct CarbonAdvisorConfig {
    /// Concrete locations, groups already expanded
    pub locations: Vec<String>,
    pub windows: Vec<TimeWindow>,
    pub sampling: Option<usize>,
    pub seed: Option<u64>,
    pub api_url: Url,
    pub lookback_days: u32,
    pub max_lookback_years: u32,
}

impl CarbonAdvisorParams {
    /// Validate against the location table
    pub fn validate(&self, table: &LocationTable) -> Result<CarbonAdvisorConfig> {
        let locations = required_list(&self.allowed_locations, PARAM_ALLOWED_LOCATIONS)?;
        let locations = table.expand(locations)?;

        let timeframes = required_list(&self.allowed_timeframes, PARAM_ALLOWED_TIMEFRAMES)?;
        let mut windows: Vec<TimeWindow> = Vec::with_capacity(timeframes.len());
        for timeframe in timeframes {
            let window = TimeWindow::parse(timeframe)?;
            if !windows.contains(&window) {
                windows.push(window);
            }
        }

        let sampling = self.sampling.filter(|s| *s > 0);
        if let Some(sampling) = sampling {
            if sampling < windows.len() {
                return Err(AdvisorError::Configuration(
                    "Sampling must be greater than or equal to the number of allowed timeframes."
                        .into(),
                ));
            }
        }

        let api_url = self.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
        let api_url = Url::parse(api_url)
            .map_err(|e| AdvisorError::Configuration(format!("api-url {} is invalid: {}", api_url, e)))?;

        let lookback_days = self.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS);
        if lookback_days == 0 {
            return Err(AdvisorError::Configuration(
                "lookback-days must be greater than 0".into(),
            ));
        }

        Ok(CarbonAdvisorConfig {
            locations,
            windows,
            sampling,
            seed: self.seed,
            api_url,
            lookback_days,
            max_lookback_years: self.max_lookback_years.unwrap_or(DEFAULT_MAX_LOOKBACK_YEARS),
        })
    }

    /// Parameters with per-record `allowed-locations`, `allowed-timeframes`
    /// and `sampling` taking precedence
    pub fn overridden_by(&self, record: &PluginRecord) -> Result<Self> {
        let mut params = self.clone();
        if let Some(locations) = string_list(record, PARAM_ALLOWED_LOCATIONS)? {
            params.allowed_locations = Some(locations);
        }
        if let Some(timeframes) = string_list(record, PARAM_ALLOWED_TIMEFRAMES)? {
            params.allowed_timeframes = Some(timeframes);
        }
        match record.get(PARAM_SAMPLING) {
            None | Some(Value::Null) => {}
            Some(value) => {
                let sampling = value.as_u64().ok_or_else(|| {
                    AdvisorError::Configuration(format!(
                        "{} must be a non-negative integer, got {}",
                        PARAM_SAMPLING, value
                    ))
                })?;
                params.sampling = Some(sampling as usize);
            }
        }
        Ok(params)
    }

    /// Whether the record carries any parameter override
    pub fn has_override(record: &PluginRecord) -> bool {
        [PARAM_ALLOWED_LOCATIONS, PARAM_ALLOWED_TIMEFRAMES, PARAM_SAMPLING]
            .iter()
            .any(|key| record.contains_key(*key))
    }
}

fn required_list<'a>(value: &'a Option<Vec<String>>, name: &str) -> Result<&'a [String]> {
    match value {
        None => Err(AdvisorError::Configuration(format!(
            "Required Parameter {} not provided",
            name
        ))),
        Some(list) if list.is_empty() => Err(AdvisorError::Configuration(format!(
            "Required Parameter {} is empty",
            name
        ))),
        Some(list) => Ok(list),
    }
}

fn string_list(record: &PluginRecord, key: &str) -> Result<Option<Vec<String>>> {
    let invalid = || AdvisorError::Configuration(format!("{} must be a list of strings", key));
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect::<Result<Vec<_>>>()
            .map(Some),
        Some(_) => Err(invalid()),
    }
}
