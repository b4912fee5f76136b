//! Configuration management for the CLI
//!
//! Settings come from an optional file (YAML, TOML or JSON) overlaid with
//! `IFA_`-prefixed environment variables, e.g.
//! `IFA_CARBON_ADVISOR__API_URL=http://localhost:5073`. Command-line flags
//! are applied on top by each command.

use advisor_lib::carbon::CarbonAdvisorParams;
use advisor_lib::rightsizing::RightSizingConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub right_sizing: RightSizingSection,
    #[serde(default)]
    pub carbon_advisor: CarbonAdvisorSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RightSizingSection {
    pub data_path: Option<PathBuf>,
    pub target_cpu_util: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarbonAdvisorSection {
    pub allowed_locations: Option<Vec<String>>,
    pub allowed_timeframes: Option<Vec<String>>,
    pub sampling: Option<usize>,
    pub seed: Option<u64>,
    pub api_url: Option<String>,
    pub lookback_days: Option<u32>,
    pub max_lookback_years: Option<u32>,
    /// Read emissions from this JSON file instead of the web API
    pub emissions_file: Option<PathBuf>,
}

impl CliConfig {
    /// Load from `path` (when given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("IFA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("carbon_advisor.allowed_locations")
                    .with_list_parse_key("carbon_advisor.allowed_timeframes"),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }
}

impl RightSizingSection {
    pub fn to_plugin_config(&self) -> RightSizingConfig {
        RightSizingConfig {
            data_path: self.data_path.clone(),
            target_cpu_util: self.target_cpu_util,
        }
    }
}

impl CarbonAdvisorSection {
    pub fn to_params(&self) -> CarbonAdvisorParams {
        CarbonAdvisorParams {
            allowed_locations: self.allowed_locations.clone(),
            allowed_timeframes: self.allowed_timeframes.clone(),
            sampling: self.sampling,
            seed: self.seed,
            api_url: self.api_url.clone(),
            lookback_days: self.lookback_days,
            max_lookback_years: self.max_lookback_years,
        }
    }
}
