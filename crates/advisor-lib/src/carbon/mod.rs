//! Carbon-aware advice: the best time and location to run a workload
//!
//! Parameters are validated into a [`CarbonAdvisorConfig`], then a
//! [`CarbonSearch`] queries an [`EmissionsSource`] window by window and keeps
//! the lowest-rated records.

mod config;
mod locations;
mod plugin;
mod sampling;
mod search;
mod source;

pub use config::{
    CarbonAdvisorConfig, CarbonAdvisorParams, DEFAULT_API_URL, DEFAULT_LOOKBACK_DAYS,
    DEFAULT_MAX_LOOKBACK_YEARS, PARAM_ALLOWED_LOCATIONS, PARAM_ALLOWED_TIMEFRAMES, PARAM_SAMPLING,
};
pub use locations::LocationTable;
pub use plugin::{CarbonAdvisorPlugin, FIELD_PLOTTED_POINTS, FIELD_SUGGESTIONS};
pub use sampling::{allocate_samples, select_plotted_points, WindowPool};
pub use search::{CarbonSearch, SearchResult, WindowOutcome, WindowState, HISTORICAL_WEIGHT};
pub use source::{EmissionsSource, HttpEmissionsSource, InMemoryEmissionsSource, RetryPolicy};
