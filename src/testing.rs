//! Test doubles and fixtures shared by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::models::{AlertRow, CacheRow, Ward, WardAlerts};
use crate::db::store::WeatherStore;
use crate::errors::SyncError;
use crate::helpers::{dec_to_f64, f64_to_decimal_1dp};
use crate::services::fetcher::FetchedWeather;
use crate::services::policy::AttemptResult;
use crate::services::weatherapi::{WeatherPayload, WeatherProvider};

/// Simulated provider latency per call.
const PROVIDER_LATENCY: Duration = Duration::from_millis(25);

pub fn ward(code: &str, latitude: f64, longitude: f64) -> Ward {
    Ward {
        ward_code: code.to_string(),
        latitude: Decimal::from_str(&latitude.to_string()).unwrap(),
        longitude: Decimal::from_str(&longitude.to_string()).unwrap(),
    }
}

/// A WeatherAPI.com-shaped forecast body with three days and the given
/// `(event, headline)` alerts.
pub fn payload_json(temp_c: f64, alerts: &[(&str, &str)]) -> serde_json::Value {
    let days: Vec<serde_json::Value> = ["2026-10-16", "2026-10-17", "2026-10-18"]
        .iter()
        .enumerate()
        .map(|(i, date)| {
            serde_json::json!({
                "date": date,
                "day": {
                    "maxtemp_c": temp_c + 4.0 + i as f64,
                    "mintemp_c": temp_c - 6.0,
                    "avgtemp_c": temp_c,
                    "maxwind_kph": 22.3,
                    "totalprecip_mm": 1.2,
                    "avghumidity": 58,
                    "daily_chance_of_rain": 40,
                    "daily_chance_of_snow": 0,
                    "condition": {
                        "text": "Patchy rain nearby",
                        "icon": "//cdn.weatherapi.com/weather/64x64/day/176.png"
                    },
                    "uv": 7.0
                },
                "astro": { "sunrise": "05:21 AM", "sunset": "06:14 PM" }
            })
        })
        .collect();

    let alerts: Vec<serde_json::Value> = alerts
        .iter()
        .map(|(event, headline)| {
            serde_json::json!({
                "headline": headline,
                "msgtype": "Alert",
                "severity": "Moderate",
                "urgency": "Expected",
                "areas": "Gauteng",
                "category": "Met",
                "certainty": "Likely",
                "event": event,
                "note": "",
                "effective": "2026-10-16T06:00:00+02:00",
                "expires": "2026-10-17T06:00:00+02:00",
                "desc": format!("{} expected", event),
                "instruction": "Stay informed"
            })
        })
        .collect();

    serde_json::json!({
        "location": { "name": "Johannesburg", "country": "South Africa" },
        "current": {
            "temp_c": temp_c,
            "is_day": 1,
            "condition": {
                "text": "Partly cloudy",
                "icon": "//cdn.weatherapi.com/weather/64x64/day/116.png"
            },
            "wind_kph": 14.4,
            "precip_mm": 0.0,
            "humidity": 64
        },
        "forecast": { "forecastday": days },
        "alerts": { "alert": alerts }
    })
}

pub fn payload(temp_c: f64, alerts: &[(&str, &str)]) -> WeatherPayload {
    WeatherPayload::from_raw(payload_json(temp_c, alerts)).unwrap()
}

pub fn fetched(temp_c: f64, alerts: &[(&str, &str)]) -> FetchedWeather {
    FetchedWeather {
        latitude: f64_to_decimal_1dp(-26.2),
        longitude: f64_to_decimal_1dp(28.0),
        fetched_at: "2026-10-16T08:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        payload: payload(temp_c, alerts),
    }
}

/// An alert row as left behind by an earlier run.
pub fn seeded_alert(ward_code: &str, headline: &str) -> AlertRow {
    AlertRow {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}/{}", ward_code, headline).as_bytes()),
        ward_code: ward_code.to_string(),
        event: Some("Seeded".to_string()),
        headline: Some(headline.to_string()),
        description: None,
        severity: None,
        urgency: None,
        areas: None,
        category: None,
        certainty: None,
        instruction: None,
        effective: None,
        expires: None,
    }
}

fn coordinate_key(latitude: f64, longitude: f64) -> String {
    format!("{},{}", latitude, longitude)
}

/// Provider that replays scripted attempt results per coordinate.
///
/// Unscripted (or exhausted) coordinates answer with a default payload.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<AttemptResult>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue attempt results for a ward, after any already queued.
    pub fn script(&self, ward: &Ward, results: Vec<AttemptResult>) {
        let key = coordinate_key(dec_to_f64(ward.latitude), dec_to_f64(ward.longitude));
        self.scripts
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .extend(results);
    }

    pub fn calls_for(&self, ward: &Ward) -> usize {
        let key = coordinate_key(dec_to_f64(ward.latitude), dec_to_f64(ward.longitude));
        self.calls.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl WeatherProvider for ScriptedProvider {
    async fn fetch_forecast(&self, latitude: f64, longitude: f64) -> AttemptResult {
        let key = coordinate_key(latitude, longitude);
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|queue| queue.pop_front());

        tokio::time::sleep(PROVIDER_LATENCY).await;
        next.unwrap_or_else(|| AttemptResult::Success(payload(20.0, &[])))
    }
}

/// In-memory `weather_cache` / `weather_alerts` with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    cache: Mutex<BTreeMap<String, CacheRow>>,
    alerts: Mutex<Vec<AlertRow>>,
    upsert_sizes: Mutex<Vec<usize>>,
    failing_cache_wards: Mutex<HashSet<String>>,
    failing_alert_wards: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any cache chunk containing this ward fails as a whole.
    pub fn fail_cache_writes_for(&self, ward_code: &str) {
        self.failing_cache_wards
            .lock()
            .unwrap()
            .insert(ward_code.to_string());
    }

    /// Any alert chunk containing this ward fails as a whole.
    pub fn fail_alert_writes_for(&self, ward_code: &str) {
        self.failing_alert_wards
            .lock()
            .unwrap()
            .insert(ward_code.to_string());
    }

    pub fn seed_alerts(&self, rows: Vec<AlertRow>) {
        self.alerts.lock().unwrap().extend(rows);
    }

    pub fn cache_row(&self, ward_code: &str) -> Option<CacheRow> {
        self.cache.lock().unwrap().get(ward_code).cloned()
    }

    pub fn cache_row_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn alerts_for(&self, ward_code: &str) -> Vec<AlertRow> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.ward_code == ward_code)
            .cloned()
            .collect()
    }

    /// Row count of every cache upsert call, in call order.
    pub fn cache_upsert_sizes(&self) -> Vec<usize> {
        self.upsert_sizes.lock().unwrap().clone()
    }
}

impl WeatherStore for MemoryStore {
    async fn upsert_cache_rows(&self, rows: &[CacheRow]) -> Result<u64, SyncError> {
        self.upsert_sizes.lock().unwrap().push(rows.len());

        let failing = self.failing_cache_wards.lock().unwrap();
        if rows.iter().any(|r| failing.contains(&r.ward_code)) {
            return Err(SyncError::Internal("injected cache failure".to_string()));
        }
        drop(failing);

        let mut cache = self.cache.lock().unwrap();
        for row in rows {
            cache.insert(row.ward_code.clone(), row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn replace_alerts(&self, sets: &[WardAlerts]) -> Result<u64, SyncError> {
        let failing = self.failing_alert_wards.lock().unwrap();
        if sets.iter().any(|s| failing.contains(&s.ward_code)) {
            return Err(SyncError::Internal("injected alert failure".to_string()));
        }
        drop(failing);

        let scope: HashSet<&str> = sets.iter().map(|s| s.ward_code.as_str()).collect();
        let mut alerts = self.alerts.lock().unwrap();
        alerts.retain(|a| !scope.contains(a.ward_code.as_str()));

        let mut inserted = 0;
        for set in sets {
            alerts.extend(set.alerts.iter().cloned());
            inserted += set.alerts.len() as u64;
        }
        Ok(inserted)
    }
}
