//! WeatherAPI.com forecast client.
//!
//! One call per ward per attempt against `forecast.json`, returning current
//! conditions, the daily forecast horizon and active alerts.
//! See: https://www.weatherapi.com/docs/

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer};

use crate::errors::SyncError;
use crate::services::policy::AttemptResult;

/// Longest provider error body kept in a failure reason.
const ERROR_BODY_MAX_CHARS: usize = 200;

/// Source of weather payloads, one request per call.
pub trait WeatherProvider {
    /// Perform a single attempt for the given coordinates. Never retries.
    fn fetch_forecast(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> impl Future<Output = AttemptResult> + Send;
}

/// A decoded forecast response plus the untouched JSON it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherPayload {
    pub forecast: ForecastResponse,
    /// Full raw JSON response (stored in `weather_cache.raw_response`).
    pub raw: serde_json::Value,
}

impl WeatherPayload {
    /// Decode the typed view once; the rest of the pipeline never reads `raw`.
    pub fn from_raw(raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let forecast = ForecastResponse::deserialize(&raw)?;
        Ok(Self { forecast, raw })
    }
}

// --- WeatherAPI.com JSON response types ---
//
// Every field is optional: the set of fields returned varies with the
// subscription tier, and a missing or null field must not fail the whole ward.
// Nested sections go through `null_as_default` so an explicit `null` decodes
// like an absent section.

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current: CurrentConditions,
    #[serde(default, deserialize_with = "null_as_default")]
    pub forecast: ForecastBlock,
    #[serde(default, deserialize_with = "null_as_default")]
    pub alerts: AlertsBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CurrentConditions {
    pub temp_c: Option<f64>,
    pub is_day: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub condition: Condition,
    pub wind_kph: Option<f64>,
    pub precip_mm: Option<f64>,
    pub humidity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub text: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastBlock {
    #[serde(default, deserialize_with = "null_as_default")]
    pub forecastday: Vec<ForecastDay>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastDay {
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub day: DaySummary,
    #[serde(default, deserialize_with = "null_as_default")]
    pub astro: Astro,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DaySummary {
    pub maxtemp_c: Option<f64>,
    pub mintemp_c: Option<f64>,
    pub avgtemp_c: Option<f64>,
    pub maxwind_kph: Option<f64>,
    pub totalprecip_mm: Option<f64>,
    pub avghumidity: Option<f64>,
    pub daily_chance_of_rain: Option<f64>,
    pub daily_chance_of_snow: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub condition: Condition,
    pub uv: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Astro {
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertsBlock {
    #[serde(default, deserialize_with = "null_as_default")]
    pub alert: Vec<ProviderAlert>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderAlert {
    pub headline: Option<String>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub areas: Option<String>,
    pub category: Option<String>,
    pub certainty: Option<String>,
    pub event: Option<String>,
    pub effective: Option<String>,
    pub expires: Option<String>,
    pub desc: Option<String>,
    pub instruction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: Option<i64>,
    message: Option<String>,
}

/// Client for the WeatherAPI.com forecast endpoint.
#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    forecast_days: u8,
}

impl WeatherApiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        forecast_days: u8,
        timeout: Duration,
    ) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::ExternalService(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            forecast_days,
        })
    }
}

impl WeatherProvider for WeatherApiClient {
    /// Fetch the forecast + alerts for one coordinate and classify the result.
    async fn fetch_forecast(&self, latitude: f64, longitude: f64) -> AttemptResult {
        let url = format!("{}/forecast.json", self.base_url);
        let query = format!("{},{}", latitude, longitude);
        let days = self.forecast_days.to_string();

        let response = match self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query.as_str()),
                ("days", days.as_str()),
                ("alerts", "yes"),
                ("aqi", "no"),
            ])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return AttemptResult::NetworkError(describe_transport_error(&e)),
        };

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return AttemptResult::RateLimited { retry_after };
        }

        if status.is_server_error() {
            return AttemptResult::ServerError {
                status: status.as_u16(),
            };
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return AttemptResult::ClientError {
                status: status.as_u16(),
                message: describe_error_body(&body),
            };
        }

        let bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => return AttemptResult::NetworkError(describe_transport_error(&e)),
        };

        let raw: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(v) => v,
            Err(e) => return AttemptResult::Malformed(format!("invalid JSON: {}", e)),
        };

        match WeatherPayload::from_raw(raw) {
            Ok(payload) => AttemptResult::Success(payload),
            Err(e) => AttemptResult::Malformed(format!("unexpected payload shape: {}", e)),
        }
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else {
        err.to_string()
    }
}

/// Render a provider error body as a short reason string.
///
/// WeatherAPI.com answers errors with `{"error": {"code": .., "message": ..}}`;
/// anything else is truncated verbatim.
fn describe_error_body(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        let message = parsed.error.message.unwrap_or_default();
        return match parsed.error.code {
            Some(code) => format!("code {}: {}", code, message),
            None => message,
        };
    }
    body.chars().take(ERROR_BODY_MAX_CHARS).collect()
}
