//! HTTP client for public-holiday data.
//!
//! Each year is resolved independently:
//! 1. Serve from the per-year cache when possible
//! 2. Query the structured JSON endpoint
//! 3. If that fails or returns nothing, read the iCalendar feed instead
//!
//! A year that yields no data from either source is logged and skipped; the
//! call only fails when no year in the range produced anything.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use super::cache::{CacheStats, CircuitBreaker, YearCache};
use super::error::HolidayError;
use super::ics::parse_ics;
use super::{parse_holiday_date, HolidayCalendar, HolidayProvider};

const DEFAULT_JSON_URL: &str = "https://date.nager.at/api/v3/PublicHolidays/{year}/{country}";

/// Configuration for the holiday client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidayClientConfig {
    /// Structured endpoint; `{year}` and `{country}` are substituted
    pub json_url_template: String,
    /// Plain-text iCalendar fallback, same placeholders
    pub ics_url_template: Option<String>,
    pub country_code: String,
    /// Upper bound for a single upstream request
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub user_agent: String,
}

impl Default for HolidayClientConfig {
    fn default() -> Self {
        Self {
            json_url_template: DEFAULT_JSON_URL.to_string(),
            ics_url_template: None,
            country_code: "KR".to_string(),
            timeout_secs: 5,
            cache_ttl_secs: 24 * 60 * 60,
            user_agent: concat!("session-engine/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HolidayClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    fn render(&self, template: &str, year: i32) -> Result<Url, HolidayError> {
        let rendered = template
            .replace("{year}", &year.to_string())
            .replace("{country}", &self.country_code);
        Ok(Url::parse(&rendered)?)
    }
}

/// Entry shape returned by the structured endpoint.
#[derive(Debug, Deserialize)]
struct JsonHoliday {
    date: String,
    #[serde(rename = "localName", default)]
    local_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Parses a structured holiday payload (an array of `{date, localName, name}`).
pub(crate) fn parse_json_body(body: &str) -> Result<HolidayCalendar, HolidayError> {
    let entries: Vec<JsonHoliday> = serde_json::from_str(body)?;
    let mut calendar = HolidayCalendar::new();

    for entry in entries {
        let Some(date) = parse_holiday_date(&entry.date) else {
            debug!(raw = %entry.date, "Skipping holiday with unparseable date");
            continue;
        };
        let name = entry
            .local_name
            .filter(|n| !n.trim().is_empty())
            .or(entry.name)
            .unwrap_or_else(|| "Holiday".to_string());
        calendar.insert(date, name);
    }

    Ok(calendar)
}

/// Client for fetching public holidays, with caching and a circuit breaker.
pub struct HolidayClient {
    client: Client,
    config: HolidayClientConfig,
    cache: YearCache,
    circuit_breaker: CircuitBreaker,
}

impl HolidayClient {
    pub fn new(config: HolidayClientConfig) -> Result<Self, HolidayError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(|e| HolidayError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        let cache = YearCache::new(Duration::from_secs(config.cache_ttl_secs));

        Ok(Self {
            client,
            config,
            cache,
            circuit_breaker: CircuitBreaker::with_defaults(),
        })
    }

    pub fn config(&self) -> &HolidayClientConfig {
        &self.config
    }

    /// Resolves one year, from cache or upstream.
    pub async fn fetch_year(&self, year: i32) -> Result<HolidayCalendar, HolidayError> {
        if let Some(cached) = self.cache.get(year) {
            debug!(year, "Holiday cache hit");
            return Ok(cached);
        }

        // Serialize fetches of the same year
        let lock = self.cache.year_lock(year);
        let _guard = lock.lock().await;

        if let Some(cached) = self.cache.get(year) {
            debug!(year, "Holiday cache hit (post-lock)");
            return Ok(cached);
        }

        if self.circuit_breaker.is_open() {
            warn!(year, "Circuit breaker is open, skipping holiday upstream");
            return Err(HolidayError::CircuitBreakerOpen);
        }

        let start = Instant::now();
        let result = self.fetch_year_uncached(year).await;

        match &result {
            Ok(calendar) => {
                self.circuit_breaker.record_success();
                self.cache.insert(year, calendar.clone());
                info!(
                    year,
                    holidays = calendar.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Fetched public holidays"
                );
            }
            Err(e) => {
                if e.is_retryable() {
                    self.circuit_breaker.record_failure();
                }
                warn!(
                    year,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Holiday fetch failed for year"
                );
            }
        }

        result
    }

    async fn fetch_year_uncached(&self, year: i32) -> Result<HolidayCalendar, HolidayError> {
        let primary = match self.fetch_json(year).await {
            Ok(calendar) if !calendar.is_empty() => return Ok(calendar),
            Ok(_) => HolidayError::UnexpectedResponse {
                message: format!("structured endpoint returned no holidays for {}", year),
            },
            Err(e) => e,
        };

        let Some(template) = self.config.ics_url_template.as_deref() else {
            return Err(primary);
        };

        warn!(year, error = %primary, "Structured holiday source unavailable, trying calendar feed");

        let calendar = self.fetch_ics(template, year).await?;
        if calendar.is_empty() {
            return Err(HolidayError::UnexpectedResponse {
                message: format!("calendar feed has no holidays for {}", year),
            });
        }

        Ok(calendar)
    }

    async fn fetch_json(&self, year: i32) -> Result<HolidayCalendar, HolidayError> {
        let url = self.config.render(&self.config.json_url_template, year)?;
        let body = self.get_text(url).await?;
        Ok(parse_json_body(&body)?.for_year(year))
    }

    async fn fetch_ics(&self, template: &str, year: i32) -> Result<HolidayCalendar, HolidayError> {
        let url = self.config.render(template, year)?;
        let body = self.get_text(url).await?;
        // Feeds without a {year} placeholder cover several years
        Ok(parse_ics(&body).for_year(year))
    }

    async fn get_text(&self, url: Url) -> Result<String, HolidayError> {
        debug!(url = %url, "Requesting holiday data");
        let start = Instant::now();
        let timeout = self.config.timeout();

        let request = async {
            let response = self.client.get(url.clone()).send().await?;
            if !response.status().is_success() {
                return Err(HolidayError::UnexpectedResponse {
                    message: format!("{} returned status {}", url, response.status()),
                });
            }
            Ok(response.text().await?)
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result.map_err(|e| match e {
                HolidayError::Timeout { .. } => HolidayError::Timeout {
                    elapsed_secs: start.elapsed().as_secs_f64(),
                },
                other => other,
            }),
            Err(_) => Err(HolidayError::Timeout {
                elapsed_secs: start.elapsed().as_secs_f64(),
            }),
        }
    }

    pub fn invalidate_year(&self, year: i32) {
        self.cache.invalidate(year);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[async_trait]
impl HolidayProvider for HolidayClient {
    async fn fetch_holidays(&self, start_year: i32, end_year: i32) -> Result<HolidayCalendar, HolidayError> {
        let (start_year, end_year) = (start_year.min(end_year), start_year.max(end_year));
        // Years outside every requested range would otherwise linger
        self.cache.cleanup_expired();

        let results = join_all((start_year..=end_year).map(|year| async move { (year, self.fetch_year(year).await) })).await;

        let mut calendar = HolidayCalendar::new();
        let mut any_year = false;
        for (year, result) in results {
            match result {
                Ok(year_calendar) => {
                    any_year = true;
                    calendar.merge(&year_calendar);
                }
                Err(e) => {
                    warn!(year, error = %e, "No holiday data for year, continuing without it");
                }
            }
        }

        if !any_year {
            return Err(HolidayError::HolidayFetchFailed { start_year, end_year });
        }

        Ok(calendar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_render_url_template() {
        let config = HolidayClientConfig {
            country_code: "JP".to_string(),
            ..HolidayClientConfig::default()
        };
        let url = config.render(&config.json_url_template, 2026).unwrap();
        assert_eq!(url.as_str(), "https://date.nager.at/api/v3/PublicHolidays/2026/JP");
    }

    #[test]
    fn test_parse_json_body_prefers_local_name() {
        let body = r#"[
            {"date": "2025-10-03", "localName": "개천절", "name": "National Foundation Day"},
            {"date": "2025-10-09", "localName": "", "name": "Hangul Day"},
            {"date": "garbage", "localName": "Nope"}
        ]"#;

        let calendar = parse_json_body(body).unwrap();
        assert_eq!(calendar.len(), 2);
        assert_eq!(
            calendar.name_on(NaiveDate::from_ymd_opt(2025, 10, 3).unwrap()),
            Some("개천절")
        );
        assert_eq!(
            calendar.name_on(NaiveDate::from_ymd_opt(2025, 10, 9).unwrap()),
            Some("Hangul Day")
        );
    }

    #[test]
    fn test_parse_json_body_rejects_non_array() {
        assert!(matches!(
            parse_json_body("{\"status\": 404}"),
            Err(HolidayError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_fails_whole_range() {
        let client = HolidayClient::new(HolidayClientConfig {
            json_url_template: "http://127.0.0.1:9/{year}".to_string(),
            ics_url_template: Some("http://127.0.0.1:9/{year}.ics".to_string()),
            timeout_secs: 1,
            ..HolidayClientConfig::default()
        })
        .unwrap();

        let err = client.fetch_holidays(2025, 2026).await.unwrap_err();
        assert!(matches!(
            err,
            HolidayError::HolidayFetchFailed {
                start_year: 2025,
                end_year: 2026
            }
        ));
        assert!(client.cache_stats().cached_years.is_empty());
    }

    #[tokio::test]
    async fn test_cached_year_skips_network() {
        let client = HolidayClient::new(HolidayClientConfig {
            json_url_template: "http://127.0.0.1:9/{year}".to_string(),
            timeout_secs: 1,
            ..HolidayClientConfig::default()
        })
        .unwrap();

        let mut known = HolidayCalendar::new();
        known.insert(NaiveDate::from_ymd_opt(2025, 12, 25).unwrap(), "Christmas");
        client.cache.insert(2025, known);

        // 2026 fails upstream but 2025 is served from cache
        let calendar = client.fetch_holidays(2025, 2026).await.unwrap();
        assert_eq!(calendar.len(), 1);
    }

    #[tokio::test]
    async fn test_range_fetch_drops_expired_years() {
        let client = HolidayClient::new(HolidayClientConfig {
            json_url_template: "http://127.0.0.1:9/{year}".to_string(),
            timeout_secs: 1,
            ..HolidayClientConfig::default()
        })
        .unwrap();

        let mut known = HolidayCalendar::new();
        known.insert(NaiveDate::from_ymd_opt(2025, 12, 25).unwrap(), "Christmas");
        client.cache.insert(2025, known.clone());
        client.cache.insert_with_ttl(2019, known, std::time::Duration::ZERO);
        assert_eq!(client.cache_stats().total_entries, 2);

        client.fetch_holidays(2025, 2025).await.unwrap();
        let stats = client.cache_stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.cached_years, vec![2025]);
    }
}
