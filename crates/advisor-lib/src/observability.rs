//! Observability infrastructure for the plugins
//!
//! Provides:
//! - Prometheus metrics (optimizer latency, records sized or passed through,
//!   emissions queries, forecasting)
//! - Structured JSON logging with tracing

use prometheus::{register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for optimizer latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AdvisorMetricsInner> = OnceLock::new();

struct AdvisorMetricsInner {
    optimizer_latency_seconds: Histogram,
    records_right_sized: IntCounter,
    records_passed_through: IntCounter,
    optimizer_fallbacks: IntCounter,
    emissions_queries: IntCounter,
    emissions_retries: IntCounter,
    forecast_windows: IntCounter,
    last_suggestion_count: IntGauge,
}

impl AdvisorMetricsInner {
    fn new() -> Self {
        Self {
            optimizer_latency_seconds: register_histogram!(
                "if_advisor_optimizer_latency_seconds",
                "Time spent searching an instance family for the fittest combination",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register optimizer_latency_seconds"),

            records_right_sized: register_int_counter!(
                "if_advisor_records_right_sized_total",
                "Input records that received a right-sizing recommendation"
            )
            .expect("Failed to register records_right_sized"),

            records_passed_through: register_int_counter!(
                "if_advisor_records_passed_through_total",
                "Input records passed through unchanged after failing validation"
            )
            .expect("Failed to register records_passed_through"),

            optimizer_fallbacks: register_int_counter!(
                "if_advisor_optimizer_fallbacks_total",
                "Searches where no combination met demand and the original instance was kept"
            )
            .expect("Failed to register optimizer_fallbacks"),

            emissions_queries: register_int_counter!(
                "if_advisor_emissions_queries_total",
                "Queries sent to the emissions source"
            )
            .expect("Failed to register emissions_queries"),

            emissions_retries: register_int_counter!(
                "if_advisor_emissions_retries_total",
                "Emissions queries retried after a transient failure"
            )
            .expect("Failed to register emissions_retries"),

            forecast_windows: register_int_counter!(
                "if_advisor_forecast_windows_total",
                "Time windows answered from historical data"
            )
            .expect("Failed to register forecast_windows"),

            last_suggestion_count: register_int_gauge!(
                "if_advisor_last_suggestion_count",
                "Number of suggestions produced by the last carbon advisor search"
            )
            .expect("Failed to register last_suggestion_count"),
        }
    }
}

/// Lightweight handle to the global plugin metrics.
///
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AdvisorMetrics {
    _private: (),
}

impl Default for AdvisorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AdvisorMetricsInner {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new)
    }

    pub fn observe_optimizer_latency(&self, duration_secs: f64) {
        self.inner().optimizer_latency_seconds.observe(duration_secs);
    }

    pub fn inc_records_right_sized(&self) {
        self.inner().records_right_sized.inc();
    }

    pub fn inc_records_passed_through(&self) {
        self.inner().records_passed_through.inc();
    }

    pub fn inc_optimizer_fallbacks(&self) {
        self.inner().optimizer_fallbacks.inc();
    }

    pub fn inc_emissions_queries(&self) {
        self.inner().emissions_queries.inc();
    }

    pub fn inc_emissions_retries(&self) {
        self.inner().emissions_retries.inc();
    }

    pub fn inc_forecast_windows(&self) {
        self.inner().forecast_windows.inc();
    }

    pub fn set_last_suggestion_count(&self, count: i64) {
        self.inner().last_suggestion_count.set(count);
    }
}

/// Structured logger for plugin events
///
/// Provides consistent JSON-formatted logging for recommendations,
/// pass-throughs, forecasting and source retries.
#[derive(Clone)]
pub struct StructuredLogger {
    plugin: String,
}

impl StructuredLogger {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
        }
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Log a right-sizing recommendation for one input record
    pub fn log_right_sizing(
        &self,
        output_id: &str,
        old_instance: &str,
        new_instances: &[&str],
        price_difference_percent: Option<f64>,
    ) {
        info!(
            event = "record_right_sized",
            plugin = %self.plugin,
            output_id = %output_id,
            old_instance = %old_instance,
            new_instances = ?new_instances,
            price_difference_percent = ?price_difference_percent,
            "Generated right-sizing recommendation"
        );
    }

    /// Log an input record passed through unchanged
    pub fn log_passthrough(&self, reason: &str) {
        warn!(
            event = "record_passed_through",
            plugin = %self.plugin,
            reason = %reason,
            "Input record failed validation, passing it through unchanged"
        );
    }

    /// Log a search that kept the original instance
    pub fn log_fallback(&self, instance: &str, required_vcpus: f64, required_ram_gb: f64) {
        info!(
            event = "optimizer_fallback",
            plugin = %self.plugin,
            instance = %instance,
            required_vcpus = required_vcpus,
            required_ram_gb = required_ram_gb,
            "No combination meets demand, keeping original instance"
        );
    }

    /// Log a window answered from historical data
    pub fn log_forecast(&self, window_from: &str, window_to: &str, years_back: u32, found: bool) {
        if found {
            info!(
                event = "forecast_window",
                plugin = %self.plugin,
                window_from = %window_from,
                window_to = %window_to,
                years_back = years_back,
                "Forecast built from historical emissions"
            );
        } else {
            warn!(
                event = "forecast_exhausted",
                plugin = %self.plugin,
                window_from = %window_from,
                window_to = %window_to,
                years_back = years_back,
                "No historical emissions found, window yields no suggestion"
            );
        }
    }

    /// Log the suggestions produced for a batch
    pub fn log_suggestions(&self, count: usize, best_rating: Option<f64>, plotted_points: usize) {
        info!(
            event = "suggestions_generated",
            plugin = %self.plugin,
            count = count,
            best_rating = ?best_rating,
            plotted_points = plotted_points,
            "Carbon-aware suggestions generated"
        );
    }

    /// Log a retried emissions query
    pub fn log_emissions_retry(&self, attempt: u32, delay_ms: u64, reason: &str) {
        warn!(
            event = "emissions_retry",
            plugin = %self.plugin,
            attempt = attempt,
            delay_ms = delay_ms,
            reason = %reason,
            "Transient emissions source failure, retrying"
        );
    }

    /// Log plugin configuration
    pub fn log_configured(&self, details: &str) {
        debug!(
            event = "plugin_configured",
            plugin = %self.plugin,
            details = %details,
            "Plugin configured"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisor_metrics_creation() {
        let metrics = AdvisorMetrics::new();
        let clone = metrics.clone();

        metrics.observe_optimizer_latency(0.001);
        metrics.inc_records_right_sized();
        clone.inc_records_passed_through();
        clone.inc_optimizer_fallbacks();
        metrics.inc_emissions_queries();
        metrics.inc_emissions_retries();
        metrics.inc_forecast_windows();
        metrics.set_last_suggestion_count(3);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "if_advisor_records_right_sized_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("right-sizing");
        assert_eq!(logger.plugin(), "right-sizing");
    }
}
