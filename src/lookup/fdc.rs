//! FoodData Central search client.
//! Connection pooling via reqwest, token-bucket rate limiting shared across
//! calls, bounded retries with exponential backoff.
//!
//! Retry policy: up to `max_attempts` tries on 5xx, 429, transport errors
//! and 400s that carry a proxy error page. Any other 4xx fails at once and
//! 404 maps to [`SearchError::NotFound`].

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::rate_limit::TokenBucket;
use super::{CandidateRecord, FoodSearch, NutrientSample, SourceType};
use crate::cancellation::{run_or_cancel, sleep_or_cancel};
use crate::error::SearchError;

pub const DEFAULT_BASE_URL: &str = "https://api.nal.usda.gov/fdc";
/// Published quota of the public API.
pub const DEFAULT_REQUESTS_PER_HOUR: u32 = 1000;
pub const DEFAULT_BURST: u32 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Error bodies are read up to this many bytes.
pub const ERROR_BODY_LIMIT: usize = 4096;

const SEARCH_DATA_TYPES: &str = "Survey (FNDDS),Foundation,Branded";
const SEARCH_PAGE_SIZE: &str = "10";
const USER_AGENT: &str = concat!("nutrimatch/", env!("CARGO_PKG_VERSION"));

/// Markers of an error page produced by a proxy in front of the API rather
/// than by the API itself.
const PROXY_MARKERS: &[&str] = &["proxy", "gateway", "upstream", "temporarily unavailable"];

#[derive(Debug, Clone)]
pub struct FdcConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub requests_per_hour: u32,
    pub burst: u32,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl FdcConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            requests_per_hour: DEFAULT_REQUESTS_PER_HOUR,
            burst: DEFAULT_BURST,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Rate-limited, retrying client for the external food database.
pub struct FoodDataClient {
    http: reqwest::Client,
    config: FdcConfig,
    limiter: TokenBucket,
}

/// Outcome of a single HTTP attempt.
enum Attempt {
    Done(Vec<u8>),
    Retry(SearchError),
    Fatal(SearchError),
}

impl FoodDataClient {
    pub fn new(config: FdcConfig) -> Result<Self, SearchError> {
        if config.max_attempts == 0 {
            return Err(SearchError::Config("max_attempts must be at least 1".into()));
        }
        if config.requests_per_hour == 0 {
            return Err(SearchError::Config("requests_per_hour must be at least 1".into()));
        }
        if config.burst == 0 {
            return Err(SearchError::Config("burst must be at least 1".into()));
        }

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let limiter = TokenBucket::per_hour(config.requests_per_hour, config.burst);
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Free-text search. Zero results is `NotFound`, never an empty success.
    pub async fn search_foods(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        info!(query, "searching foods");
        let url = self.endpoint("/v1/foods/search");
        let params = [
            ("query", query),
            ("api_key", self.config.api_key.as_str()),
            ("dataType", SEARCH_DATA_TYPES),
            ("pageSize", SEARCH_PAGE_SIZE),
        ];

        let body = self
            .get_with_retry(|| self.http.get(&url).query(&params), cancel)
            .await?;
        let response: SearchResponse = serde_json::from_slice(&body)?;

        if response.foods.is_empty() {
            info!(query, "no foods found");
            return Err(SearchError::NotFound);
        }
        info!(query, found = response.foods.len(), "foods found");
        Ok(response.foods.into_iter().map(FdcFood::into_candidate).collect())
    }

    /// Fetch one food by identifier.
    pub async fn get_food(
        &self,
        external_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CandidateRecord, SearchError> {
        debug!(external_id, "fetching food details");
        let url = self.endpoint(&format!("/v1/food/{external_id}"));
        let params = [("api_key", self.config.api_key.as_str())];

        let body = self
            .get_with_retry(|| self.http.get(&url).query(&params), cancel)
            .await?;
        let food: FdcFood = serde_json::from_slice(&body)?;
        Ok(food.into_candidate())
    }

    /// Send with rate limiting and retries, returning the success body.
    async fn get_with_retry<F>(
        &self,
        build: F,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SearchError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt: u32 = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            self.limiter
                .acquire(cancel)
                .await
                .map_err(|_| SearchError::Cancelled)?;

            let outcome = match run_or_cancel(build().send(), cancel).await {
                Err(_) => return Err(SearchError::Cancelled),
                Ok(Ok(resp)) => self.classify(resp, cancel).await?,
                Ok(Err(e)) if e.is_builder() => Attempt::Fatal(e.into()),
                Ok(Err(e)) => Attempt::Retry(e.into()),
            };

            match outcome {
                Attempt::Done(body) => return Ok(body),
                Attempt::Fatal(err) => {
                    debug!(attempt, error = %err, "request failed, not retrying");
                    return Err(err);
                }
                Attempt::Retry(err) if attempt >= self.config.max_attempts => {
                    warn!(attempts = attempt, error = %err, "all attempts failed");
                    return Err(err);
                }
                Attempt::Retry(err) => {
                    let wait = exponential_backoff(self.config.backoff_base, attempt);
                    warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    sleep_or_cancel(wait, cancel)
                        .await
                        .map_err(|_| SearchError::Cancelled)?;
                    attempt += 1;
                }
            }
        }
    }

    async fn classify(
        &self,
        resp: reqwest::Response,
        cancel: &CancellationToken,
    ) -> Result<Attempt, SearchError> {
        let status = resp.status();
        if status.is_success() {
            return match run_or_cancel(resp.bytes(), cancel).await {
                Err(_) => Err(SearchError::Cancelled),
                Ok(Ok(body)) => Ok(Attempt::Done(body.to_vec())),
                Ok(Err(e)) => Ok(Attempt::Retry(e.into())),
            };
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Attempt::Fatal(SearchError::NotFound));
        }

        let body = read_limited_body(resp, ERROR_BODY_LIMIT).await;
        let body = String::from_utf8_lossy(&body).into_owned();
        let retryable = status.is_server_error()
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || (status == reqwest::StatusCode::BAD_REQUEST && is_transient_proxy_error(&body));

        let err = SearchError::Status {
            status: status.as_u16(),
            body,
        };
        Ok(if retryable {
            Attempt::Retry(err)
        } else {
            Attempt::Fatal(err)
        })
    }
}

#[async_trait]
impl FoodSearch for FoodDataClient {
    async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        self.search_foods(query, cancel).await
    }

    async fn food_details(
        &self,
        external_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CandidateRecord, SearchError> {
        self.get_food(external_id, cancel).await
    }
}

/// Delay before retrying after `attempt` (1-based): base, 2x base, 4x base...
pub fn exponential_backoff(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1 << exp)
}

/// A 400 that came from a proxy in front of the API, not from the API.
pub fn is_transient_proxy_error(body: &str) -> bool {
    let lower = body.trim_start().to_ascii_lowercase();
    lower.starts_with("<!doctype html")
        || lower.starts_with("<html")
        || PROXY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Read at most `limit` bytes of the body; read errors end the read early.
async fn read_limited_body(resp: reqwest::Response, limit: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        let room = limit - out.len();
        out.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if out.len() >= limit {
            break;
        }
    }
    out
}

// --- Response types ---

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    foods: Vec<FdcFood>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FdcFood {
    fdc_id: FdcId,
    #[serde(default)]
    description: String,
    #[serde(default)]
    data_type: String,
    #[serde(default)]
    food_nutrients: Vec<FdcNutrient>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FdcId {
    Number(u64),
    Text(String),
}

/// Search results use the flat shape (`nutrientId`, `value`), detail
/// responses the nested one (`nutrient.id`, `amount`).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FdcNutrient {
    nutrient_id: Option<u32>,
    value: Option<f64>,
    nutrient: Option<NestedNutrient>,
    amount: Option<f64>,
}

#[derive(Deserialize)]
struct NestedNutrient {
    id: Option<u32>,
}

impl FdcFood {
    fn into_candidate(self) -> CandidateRecord {
        let external_id = match self.fdc_id {
            FdcId::Number(n) => n.to_string(),
            FdcId::Text(s) => s,
        };
        CandidateRecord {
            external_id,
            description: self.description,
            source_type: SourceType::from_data_type(&self.data_type),
            nutrient_samples: self
                .food_nutrients
                .into_iter()
                .filter_map(FdcNutrient::into_sample)
                .collect(),
        }
    }
}

impl FdcNutrient {
    fn into_sample(self) -> Option<NutrientSample> {
        let nutrient_code = self.nutrient_id.or(self.nutrient.and_then(|n| n.id))?;
        let value = self.value.or(self.amount)?;
        Some(NutrientSample {
            nutrient_code,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let base = DEFAULT_BACKOFF_BASE;
        assert_eq!(exponential_backoff(base, 1), Duration::from_millis(500));
        assert_eq!(exponential_backoff(base, 2), Duration::from_millis(1000));
        assert_eq!(exponential_backoff(base, 3), Duration::from_millis(2000));
    }

    #[test]
    fn proxy_error_detection() {
        assert!(is_transient_proxy_error("<html><body>400 Bad Request</body></html>"));
        assert!(is_transient_proxy_error("  <!DOCTYPE html><title>Error</title>"));
        assert!(is_transient_proxy_error("upstream connect error"));
        assert!(!is_transient_proxy_error(r#"{"error":"invalid query parameter"}"#));
        assert!(!is_transient_proxy_error(""));
    }

    #[test]
    fn parses_search_response() {
        let json = r#"{
            "totalHits": 2,
            "foods": [
                {"fdcId": 171265, "description": "Milk, whole", "dataType": "Survey (FNDDS)",
                 "foodNutrients": [
                    {"nutrientId": 1008, "nutrientName": "Energy", "unitName": "KCAL", "value": 61.0},
                    {"nutrientId": 1003, "value": 3.2},
                    {"nutrientId": 1234}
                 ]},
                {"fdcId": "2000", "description": "GV Whole Milk", "dataType": "Branded"}
            ]
        }"#;
        let resp: SearchResponse = serde_json::from_str(json).unwrap();
        let candidates: Vec<_> = resp.foods.into_iter().map(FdcFood::into_candidate).collect();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].external_id, "171265");
        assert_eq!(candidates[0].source_type, SourceType::Survey);
        assert_eq!(
            candidates[0].nutrient_samples,
            vec![
                NutrientSample { nutrient_code: 1008, value: 61.0 },
                NutrientSample { nutrient_code: 1003, value: 3.2 },
            ]
        );
        assert_eq!(candidates[1].external_id, "2000");
        assert_eq!(candidates[1].source_type, SourceType::Branded);
        assert!(candidates[1].nutrient_samples.is_empty());
    }

    #[test]
    fn parses_nested_detail_nutrients() {
        let json = r#"{"fdcId": 9, "description": "Apple", "dataType": "Foundation",
            "foodNutrients": [{"nutrient": {"id": 1005, "name": "Carbohydrate"}, "amount": 14.0}]}"#;
        let food: FdcFood = serde_json::from_str(json).unwrap();
        let candidate = food.into_candidate();
        assert_eq!(candidate.source_type, SourceType::Foundation);
        assert_eq!(
            candidate.nutrient_samples,
            vec![NutrientSample { nutrient_code: 1005, value: 14.0 }]
        );
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = FdcConfig::new("key");
        config.max_attempts = 0;
        assert!(matches!(FoodDataClient::new(config), Err(SearchError::Config(_))));
    }

    #[test]
    fn zero_rate_or_burst_rejected() {
        let mut config = FdcConfig::new("key");
        config.requests_per_hour = 0;
        assert!(matches!(FoodDataClient::new(config), Err(SearchError::Config(_))));

        let mut config = FdcConfig::new("key");
        config.burst = 0;
        assert!(matches!(FoodDataClient::new(config), Err(SearchError::Config(_))));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = FoodDataClient::new(FdcConfig::new("key").with_base_url("http://x/fdc/")).unwrap();
        assert_eq!(client.endpoint("/v1/foods/search"), "http://x/fdc/v1/foods/search");
    }
}
