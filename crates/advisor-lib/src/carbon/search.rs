//! Best time and location search over the allowed windows
//!
//! Each window is queried as is. A future window without data is answered
//! from the same dates in earlier years, blended with the recent average
//! rating of each location and moved forward to the requested year.

use super::config::CarbonAdvisorConfig;
use super::sampling::{allocate_samples, select_plotted_points, WindowPool};
use super::source::EmissionsSource;
use crate::error::Result;
use crate::models::{EmissionsRecord, TimeWindow};
use crate::observability::{AdvisorMetrics, StructuredLogger};
use crate::util::fix_float;
use chrono::{DateTime, Duration, Months, Utc};
use rand::rngs::StdRng;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Weight of the historical rating in a forecast; the rest goes to the
/// trailing average
pub const HISTORICAL_WEIGHT: f64 = 0.5;

/// How a window was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Data found for the requested dates
    Current,
    /// Data found this many years earlier
    Forecast { years_back: u32 },
    /// Future window with no data within the lookback limit
    Exhausted,
    /// Past window with no data
    Empty,
}

/// Records of one window, split into its minimum-rating records and the rest
#[derive(Debug, Clone)]
pub struct WindowOutcome {
    pub window: TimeWindow,
    pub state: WindowState,
    pub best: Vec<EmissionsRecord>,
    pub others: Vec<EmissionsRecord>,
}

impl WindowOutcome {
    fn new(window: TimeWindow, state: WindowState, records: Vec<EmissionsRecord>) -> Self {
        let min = records
            .iter()
            .map(|r| fix_float(r.rating))
            .min_by(|a, b| a.total_cmp(b));
        let (best, others): (Vec<EmissionsRecord>, Vec<EmissionsRecord>) = match min {
            Some(min) => records.into_iter().partition(|r| fix_float(r.rating) == min),
            None => (Vec::new(), Vec::new()),
        };
        Self {
            window,
            state,
            best,
            others,
        }
    }

    pub fn best_rating(&self) -> Option<f64> {
        self.best.first().map(|r| r.rating)
    }
}

/// Outcome of a search over every allowed window
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Records with the lowest rating across all windows
    pub suggestions: Vec<EmissionsRecord>,
    /// Present when sampling is enabled
    pub plotted_points: Option<Vec<EmissionsRecord>>,
    pub windows: Vec<WindowOutcome>,
}

pub struct CarbonSearch<'a> {
    source: &'a dyn EmissionsSource,
    config: &'a CarbonAdvisorConfig,
    now: DateTime<Utc>,
    metrics: AdvisorMetrics,
    logger: StructuredLogger,
}

impl<'a> CarbonSearch<'a> {
    pub fn new(source: &'a dyn EmissionsSource, config: &'a CarbonAdvisorConfig) -> Self {
        Self {
            source,
            config,
            now: Utc::now(),
            metrics: AdvisorMetrics::new(),
            logger: StructuredLogger::new("carbon-advisor"),
        }
    }

    /// Evaluate "future" and the trailing average relative to `now`
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub async fn run(&self, rng: &mut StdRng) -> Result<SearchResult> {
        let mut averages: HashMap<String, Option<f64>> = HashMap::new();
        let mut windows = Vec::with_capacity(self.config.windows.len());

        for window in &self.config.windows {
            windows.push(self.search_window(*window, &mut averages).await?);
        }

        let suggestions = lowest_rated(&windows);

        let plotted_points = match self.config.sampling {
            Some(sampling) => {
                let allocations = allocate_samples(&self.config.windows, sampling)?;
                let pools = windows
                    .iter()
                    .map(|w| WindowPool::new(w.best.clone(), w.others.clone()))
                    .collect();
                Some(select_plotted_points(pools, &allocations, rng))
            }
            None => None,
        };

        Ok(SearchResult {
            suggestions,
            plotted_points,
            windows,
        })
    }

    async fn search_window(
        &self,
        window: TimeWindow,
        averages: &mut HashMap<String, Option<f64>>,
    ) -> Result<WindowOutcome> {
        let records = self
            .source
            .query(&self.config.locations, window.from, window.to)
            .await?;
        if !records.is_empty() {
            return Ok(WindowOutcome::new(window, WindowState::Current, records));
        }
        if window.to <= self.now {
            debug!(from = %window.from, to = %window.to, "No emissions data for past window");
            return Ok(WindowOutcome::new(window, WindowState::Empty, records));
        }

        for years_back in 1..=self.config.max_lookback_years {
            let months = Months::new(12 * years_back);
            let (Some(from), Some(to)) = (
                window.from.checked_sub_months(months),
                window.to.checked_sub_months(months),
            ) else {
                break;
            };

            let historical = self.source.query(&self.config.locations, from, to).await?;
            if historical.is_empty() {
                continue;
            }

            let forecast = self.forecast(historical, months, averages).await?;
            self.metrics.inc_forecast_windows();
            self.logger.log_forecast(
                &window.from.to_rfc3339(),
                &window.to.to_rfc3339(),
                years_back,
                true,
            );
            return Ok(WindowOutcome::new(
                window,
                WindowState::Forecast { years_back },
                forecast,
            ));
        }

        self.logger.log_forecast(
            &window.from.to_rfc3339(),
            &window.to.to_rfc3339(),
            self.config.max_lookback_years,
            false,
        );
        Ok(WindowOutcome::new(window, WindowState::Exhausted, Vec::new()))
    }

    /// Blend historical ratings with each location's recent average and move
    /// them forward by `months`
    async fn forecast(
        &self,
        historical: Vec<EmissionsRecord>,
        months: Months,
        averages: &mut HashMap<String, Option<f64>>,
    ) -> Result<Vec<EmissionsRecord>> {
        let mut forecast = Vec::with_capacity(historical.len());

        for mut record in historical {
            if !averages.contains_key(&record.location) {
                let average = self.trailing_average(&record.location).await?;
                averages.insert(record.location.clone(), average);
            }
            if let Some(Some(average)) = averages.get(&record.location) {
                record.rating = HISTORICAL_WEIGHT * record.rating + (1.0 - HISTORICAL_WEIGHT) * average;
            }
            let Some(time) = record.time.checked_add_months(months) else {
                continue;
            };
            record.time = time;
            forecast.push(record);
        }

        Ok(forecast)
    }

    /// Mean rating of a location over the last `lookback_days` days
    async fn trailing_average(&self, location: &str) -> Result<Option<f64>> {
        let from = self.now - Duration::days(i64::from(self.config.lookback_days));
        let records = self
            .source
            .query(&[location.to_string()], from, self.now)
            .await?;
        if records.is_empty() {
            return Ok(None);
        }
        let total: f64 = records.iter().map(|r| r.rating).sum();
        Ok(Some(total / records.len() as f64))
    }
}

/// Best records of every window that share the overall lowest rating. A
/// record found by overlapping windows is suggested once.
fn lowest_rated(windows: &[WindowOutcome]) -> Vec<EmissionsRecord> {
    let Some(min) = windows
        .iter()
        .filter_map(WindowOutcome::best_rating)
        .map(fix_float)
        .min_by(|a, b| a.total_cmp(b))
    else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    windows
        .iter()
        .flat_map(|w| w.best.iter())
        .filter(|r| fix_float(r.rating) == min)
        .filter(|r| seen.insert((r.location.clone(), r.time)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carbon::source::InMemoryEmissionsSource;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use url::Url;

    fn config(locations: &[&str], windows: Vec<TimeWindow>) -> CarbonAdvisorConfig {
        CarbonAdvisorConfig {
            locations: locations.iter().map(|s| s.to_string()).collect(),
            windows,
            sampling: None,
            seed: None,
            api_url: Url::parse("http://localhost:5073").unwrap(),
            lookback_days: 10,
            max_lookback_years: 5,
        }
    }

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> TimeWindow {
        TimeWindow::new(from, to).unwrap()
    }

    #[tokio::test]
    async fn test_boundary_record_is_suggested() {
        let source = InMemoryEmissionsSource::new(vec![
            EmissionsRecord::new("eastus", ts(2024, 1, 15, 11, 30), 1.0).with_duration("00:30:00"),
            EmissionsRecord::new("eastus", ts(2024, 1, 15, 13, 0), 4.0).with_duration("00:30:00"),
        ]);
        let config = config(&["eastus"], vec![window(ts(2024, 1, 15, 12, 0), ts(2024, 1, 15, 18, 0))]);

        let result = CarbonSearch::new(&source, &config)
            .at(ts(2024, 6, 1, 0, 0))
            .run(&mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        assert_eq!(result.suggestions.len(), 1);
        let output = result.suggestions[0].to_output();
        assert_eq!(output["location"], "eastus");
        assert_eq!(output["time"], "2024-01-15T11:30:00+00:00");
        assert_eq!(output["rating"], 1.0);
        assert!(result.plotted_points.is_none());
    }

    #[tokio::test]
    async fn test_ties_across_windows_and_locations() {
        let source = InMemoryEmissionsSource::new(vec![
            EmissionsRecord::new("eastus", ts(2024, 1, 15, 12, 0), 3.0),
            EmissionsRecord::new("westus", ts(2024, 1, 15, 13, 0), 2.0),
            EmissionsRecord::new("eastus", ts(2024, 1, 16, 12, 0), 2.0),
            EmissionsRecord::new("westus", ts(2024, 1, 16, 13, 0), 9.0),
        ]);
        let config = config(
            &["eastus", "westus"],
            vec![
                window(ts(2024, 1, 15, 0, 0), ts(2024, 1, 15, 23, 0)),
                window(ts(2024, 1, 16, 0, 0), ts(2024, 1, 16, 23, 0)),
            ],
        );

        let result = CarbonSearch::new(&source, &config)
            .at(ts(2024, 6, 1, 0, 0))
            .run(&mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        let suggested: Vec<(&str, DateTime<Utc>)> = result
            .suggestions
            .iter()
            .map(|r| (r.location.as_str(), r.time))
            .collect();
        assert_eq!(
            suggested,
            vec![("westus", ts(2024, 1, 15, 13, 0)), ("eastus", ts(2024, 1, 16, 12, 0))]
        );
    }

    #[tokio::test]
    async fn test_overlapping_windows_suggest_record_once() {
        let source = InMemoryEmissionsSource::new(vec![
            EmissionsRecord::new("eastus", ts(2024, 1, 15, 13, 0), 1.0),
            EmissionsRecord::new("eastus", ts(2024, 1, 15, 16, 0), 1.0),
            EmissionsRecord::new("westus", ts(2024, 1, 15, 14, 0), 3.0),
        ]);
        let config = config(
            &["eastus", "westus"],
            vec![
                window(ts(2024, 1, 15, 12, 0), ts(2024, 1, 15, 15, 0)),
                window(ts(2024, 1, 15, 12, 30), ts(2024, 1, 15, 18, 0)),
            ],
        );

        let result = CarbonSearch::new(&source, &config)
            .at(ts(2024, 6, 1, 0, 0))
            .run(&mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        let times: Vec<DateTime<Utc>> = result.suggestions.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![ts(2024, 1, 15, 13, 0), ts(2024, 1, 15, 16, 0)]);
    }

    #[tokio::test]
    async fn test_future_window_uses_last_year_blended_with_average() {
        let now = ts(2024, 1, 20, 0, 0);
        let source = InMemoryEmissionsSource::new(vec![
            // Same window one year earlier
            EmissionsRecord::new("eastus", ts(2023, 3, 1, 12, 0), 100.0),
            EmissionsRecord::new("westus", ts(2023, 3, 1, 14, 0), 60.0),
            // Trailing ten days
            EmissionsRecord::new("eastus", ts(2024, 1, 15, 0, 0), 20.0),
            EmissionsRecord::new("eastus", ts(2024, 1, 18, 0, 0), 40.0),
        ]);
        let config = config(
            &["eastus", "westus"],
            vec![window(ts(2024, 3, 1, 0, 0), ts(2024, 3, 1, 23, 0))],
        );

        let result = CarbonSearch::new(&source, &config)
            .at(now)
            .run(&mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        assert_eq!(result.windows[0].state, WindowState::Forecast { years_back: 1 });
        // eastus: 0.5 * 100 + 0.5 * 30 = 65; westus has no average and keeps 60
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.suggestions[0].location, "westus");
        assert_eq!(result.suggestions[0].rating, 60.0);
        assert_eq!(result.suggestions[0].time, ts(2024, 3, 1, 14, 0));

        let eastus = &result.windows[0].others[0];
        assert_eq!(eastus.rating, 65.0);
        assert_eq!(eastus.time, ts(2024, 3, 1, 12, 0));
    }

    #[tokio::test]
    async fn test_forecast_steps_back_several_years() {
        let source = InMemoryEmissionsSource::new(vec![EmissionsRecord::new(
            "eastus",
            ts(2021, 7, 4, 10, 0),
            7.0,
        )]);
        let config = config(&["eastus"], vec![window(ts(2024, 7, 4, 0, 0), ts(2024, 7, 5, 0, 0))]);

        let result = CarbonSearch::new(&source, &config)
            .at(ts(2024, 1, 1, 0, 0))
            .run(&mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        assert_eq!(result.windows[0].state, WindowState::Forecast { years_back: 3 });
        assert_eq!(result.suggestions[0].time, ts(2024, 7, 4, 10, 0));
        assert_eq!(result.suggestions[0].rating, 7.0);
    }

    #[tokio::test]
    async fn test_far_future_window_yields_nothing() {
        let source = InMemoryEmissionsSource::new(vec![EmissionsRecord::new(
            "eastus",
            ts(2024, 1, 15, 12, 0),
            1.0,
        )]);
        let config = config(&["eastus"], vec![window(ts(2031, 1, 15, 0, 0), ts(2031, 1, 16, 0, 0))]);

        let result = CarbonSearch::new(&source, &config)
            .at(ts(2024, 2, 1, 0, 0))
            .run(&mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        assert_eq!(result.windows[0].state, WindowState::Exhausted);
        assert!(result.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_past_window_without_data_is_empty() {
        let source = InMemoryEmissionsSource::new(vec![EmissionsRecord::new(
            "eastus",
            ts(2023, 1, 15, 12, 0),
            1.0,
        )]);
        let config = config(&["eastus"], vec![window(ts(2024, 1, 15, 0, 0), ts(2024, 1, 16, 0, 0))]);

        let result = CarbonSearch::new(&source, &config)
            .at(ts(2024, 2, 1, 0, 0))
            .run(&mut StdRng::seed_from_u64(1))
            .await
            .unwrap();

        assert_eq!(result.windows[0].state, WindowState::Empty);
        assert!(result.suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_sampling_returns_requested_points() {
        let mut records = Vec::new();
        for hour in 0..12 {
            records.push(EmissionsRecord::new("eastus", ts(2024, 1, 15, hour, 0), 10.0 + hour as f64));
            records.push(EmissionsRecord::new("westus", ts(2024, 1, 16, hour, 0), 5.0 + hour as f64));
        }
        let source = InMemoryEmissionsSource::new(records);
        let mut config = config(
            &["eastus", "westus"],
            vec![
                window(ts(2024, 1, 15, 0, 0), ts(2024, 1, 15, 12, 0)),
                window(ts(2024, 1, 16, 0, 0), ts(2024, 1, 16, 6, 0)),
            ],
        );
        config.sampling = Some(7);

        let result = CarbonSearch::new(&source, &config)
            .at(ts(2024, 6, 1, 0, 0))
            .run(&mut StdRng::seed_from_u64(42))
            .await
            .unwrap();

        let points = result.plotted_points.unwrap();
        assert_eq!(points.len(), 7);
        for point in &points {
            assert!(config.locations.contains(&point.location));
            assert!(config.windows.iter().any(|w| point.overlaps(w)));
        }
        assert!(points.iter().any(|p| p.rating == 10.0));
        assert!(points.iter().any(|p| p.rating == 5.0));
    }
}
