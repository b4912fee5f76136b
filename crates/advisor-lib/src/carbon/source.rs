//! Emissions data sources
//!
//! - `InMemoryEmissionsSource`: fixed records, for offline runs and tests
//! - `HttpEmissionsSource`: carbon-aware web API with bounded retries

use crate::error::{AdvisorError, Result};
use crate::models::{EmissionsRecord, TimeWindow};
use crate::observability::{AdvisorMetrics, StructuredLogger};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Source of carbon-intensity records
#[async_trait]
pub trait EmissionsSource: Send + Sync {
    /// Records for any of `locations` overlapping `[from, to]`
    async fn query(
        &self,
        locations: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EmissionsRecord>>;
}

/// Source answering from a fixed set of records.
///
/// A record matches when its span `[time, time + duration]` touches the
/// requested range, both ends inclusive.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEmissionsSource {
    records: Vec<EmissionsRecord>,
}

impl InMemoryEmissionsSource {
    pub fn new(records: Vec<EmissionsRecord>) -> Self {
        Self { records }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Load a JSON array of records from disk
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let document = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&document)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl EmissionsSource for InMemoryEmissionsSource {
    async fn query(
        &self,
        locations: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EmissionsRecord>> {
        let window = TimeWindow { from, to };
        Ok(self
            .records
            .iter()
            .filter(|r| locations.iter().any(|l| *l == r.location) && r.overlaps(&window))
            .cloned()
            .collect())
    }
}

/// Bounded exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        std::cmp::min(self.initial_backoff.saturating_mul(factor), self.max_backoff)
    }
}

/// Failure of a single request
enum FetchError {
    Transient(String),
    Fatal(String),
}

/// Client for the carbon-aware web API `emissions/bylocations` route
pub struct HttpEmissionsSource {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    metrics: AdvisorMetrics,
    logger: StructuredLogger,
}

impl HttpEmissionsSource {
    pub fn new(base_url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdvisorError::EmissionsSource(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::default(),
            metrics: AdvisorMetrics::new(),
            logger: StructuredLogger::new("carbon-advisor"),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn query_url(&self, locations: &[String], from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AdvisorError::Configuration(format!("api-url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["emissions", "bylocations"]);

        {
            let mut query = url.query_pairs_mut();
            for location in locations {
                query.append_pair("location", location);
            }
            query.append_pair("time", &from.to_rfc3339_opts(SecondsFormat::Secs, true));
            query.append_pair("toTime", &to.to_rfc3339_opts(SecondsFormat::Secs, true));
        }

        Ok(url)
    }

    async fn fetch(&self, url: &Url) -> std::result::Result<Vec<EmissionsRecord>, FetchError> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                FetchError::Transient(e.to_string())
            } else {
                FetchError::Fatal(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if status.is_server_error() {
            return Err(FetchError::Transient(format!("API error ({})", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Fatal(format!("API error ({}): {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| FetchError::Fatal(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl EmissionsSource for HttpEmissionsSource {
    async fn query(
        &self,
        locations: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EmissionsRecord>> {
        let url = self.query_url(locations, from, to)?;
        let mut attempt = 0;

        loop {
            self.metrics.inc_emissions_queries();
            debug!(url = %url, attempt = attempt, "Querying emissions");

            match self.fetch(&url).await {
                Ok(records) => return Ok(records),
                Err(FetchError::Transient(reason)) if attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    attempt += 1;
                    self.metrics.inc_emissions_retries();
                    self.logger
                        .log_emissions_retry(attempt, delay.as_millis() as u64, &reason);
                    tokio::time::sleep(delay).await;
                }
                Err(FetchError::Transient(reason)) | Err(FetchError::Fatal(reason)) => {
                    return Err(AdvisorError::EmissionsSource(reason));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_in_memory_filters_location_and_window() {
        let source = InMemoryEmissionsSource::new(vec![
            EmissionsRecord::new("eastus", at(15, 11, 30), 1.0).with_duration("00:30:00"),
            EmissionsRecord::new("eastus", at(15, 14, 0), 5.0),
            EmissionsRecord::new("westus", at(15, 14, 0), 2.0),
            EmissionsRecord::new("eastus", at(15, 19, 0), 0.5),
        ]);

        let records = source
            .query(&["eastus".to_string()], at(15, 12, 0), at(15, 18, 0))
            .await
            .unwrap();
        let ratings: Vec<f64> = records.iter().map(|r| r.rating).collect();
        assert_eq!(ratings, vec![1.0, 5.0]);
    }

    #[tokio::test]
    async fn test_in_memory_from_json() {
        let source = InMemoryEmissionsSource::from_json(
            r#"[{"location": "eastus", "time": "2024-01-15T11:30:00+00:00", "rating": 1, "duration": "00:30:00"}]"#,
        )
        .unwrap();
        assert_eq!(source.len(), 1);
        assert!(InMemoryEmissionsSource::from_json("{}").is_err());
    }

    #[test]
    fn test_retry_backoff_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_http_query_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/emissions/bylocations")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("location".into(), "eastus".into()),
                Matcher::UrlEncoded("location".into(), "westus".into()),
                Matcher::UrlEncoded("time".into(), "2024-01-15T12:00:00Z".into()),
                Matcher::UrlEncoded("toTime".into(), "2024-01-15T18:00:00Z".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"location": "eastus", "time": "2024-01-15T13:00:00+00:00", "rating": 42.5, "duration": "00:05:00"}]"#,
            )
            .create_async()
            .await;

        let source = HttpEmissionsSource::new(Url::parse(&server.url()).unwrap()).unwrap();
        let records = source
            .query(&["eastus".to_string(), "westus".to_string()], at(15, 12, 0), at(15, 18, 0))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rating, 42.5);
        assert_eq!(records[0].time, at(15, 13, 0));
    }

    #[tokio::test]
    async fn test_http_no_content_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/emissions/bylocations")
            .match_query(Matcher::Any)
            .with_status(204)
            .create_async()
            .await;

        let source = HttpEmissionsSource::new(Url::parse(&server.url()).unwrap()).unwrap();
        let records = source
            .query(&["eastus".to_string()], at(15, 12, 0), at(15, 18, 0))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_http_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/emissions/bylocations")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let source = HttpEmissionsSource::new(Url::parse(&server.url()).unwrap())
            .unwrap()
            .with_retry_policy(fast_retry(2));
        let err = source
            .query(&["eastus".to_string()], at(15, 12, 0), at(15, 18, 0))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, AdvisorError::EmissionsSource(_)));
    }

    #[tokio::test]
    async fn test_http_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/emissions/bylocations")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body("bad location")
            .expect(1)
            .create_async()
            .await;

        let source = HttpEmissionsSource::new(Url::parse(&server.url()).unwrap())
            .unwrap()
            .with_retry_policy(fast_retry(3));
        let err = source
            .query(&["nowhere".to_string()], at(15, 12, 0), at(15, 18, 0))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("bad location"));
    }

    #[test]
    fn test_query_url_keeps_base_path() {
        let source = HttpEmissionsSource::new(Url::parse("http://localhost:5073/api/").unwrap()).unwrap();
        let url = source
            .query_url(&["eastus".to_string()], at(15, 12, 0), at(15, 18, 0))
            .unwrap();
        assert_eq!(url.path(), "/api/emissions/bylocations");
        assert_eq!(
            url.query(),
            Some("location=eastus&time=2024-01-15T12%3A00%3A00Z&toTime=2024-01-15T18%3A00%3A00Z")
        );
    }
}
