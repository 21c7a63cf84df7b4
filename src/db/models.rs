use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A ward: the unit of work for one fetch. Read from `weather_cache` once per
/// run and never written back by the ward source.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Ward {
    pub ward_code: String,
    pub latitude: Decimal,
    pub longitude: Decimal,
}

/// One day of the forecast horizon, stored as an element of the
/// `weather_cache.daily_forecast` JSONB array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: Option<NaiveDate>,
    pub maxtemp_c: Option<f64>,
    pub mintemp_c: Option<f64>,
    pub avgtemp_c: Option<f64>,
    pub maxwind_kph: Option<f64>,
    pub totalprecip_mm: Option<f64>,
    pub avghumidity: Option<f64>,
    pub condition_text: Option<String>,
    pub condition_icon: Option<String>,
    pub daily_chance_of_rain: Option<i64>,
    pub daily_chance_of_snow: Option<i64>,
    pub uv: Option<f64>,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
}

/// Lightweight reference to an alert active at fetch time, stored in
/// `weather_cache.alerts_summary`. `id` matches the row in `weather_alerts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub id: Uuid,
    pub event: Option<String>,
    pub severity: Option<String>,
    pub headline: Option<String>,
    pub expires: Option<DateTime<Utc>>,
}

/// Current-state snapshot for a ward. Always written wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub ward_code: String,
    pub latitude: Decimal,
    pub longitude: Decimal,

    // Current conditions
    pub temperature_c: Option<Decimal>,
    pub condition_text: Option<String>,
    pub condition_icon: Option<String>,
    pub wind_kph: Option<Decimal>,
    pub humidity: Option<i32>,
    pub is_day: bool,
    pub precip_mm: Option<Decimal>,

    pub daily_forecast: Vec<DailyForecast>,
    /// Empty when no alert was active; persisted as NULL in that case.
    pub alerts_summary: Vec<AlertSummary>,
    pub raw_response: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

/// One active government-issued alert for one ward.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRow {
    pub id: Uuid,
    pub ward_code: String,
    pub event: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub areas: Option<String>,
    pub category: Option<String>,
    pub certainty: Option<String>,
    pub instruction: Option<String>,
    pub effective: Option<DateTime<Utc>>,
    pub expires: Option<DateTime<Utc>>,
}

/// The complete replacement alert set for one ward.
#[derive(Debug, Clone, PartialEq)]
pub struct WardAlerts {
    pub ward_code: String,
    pub alerts: Vec<AlertRow>,
}
