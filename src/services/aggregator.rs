//! Result aggregation.
//!
//! Folds per-ward outcomes, in whatever order workers complete, into the rows
//! to write and the run counters. The aggregator is owned by the coordinator
//! task alone; workers never touch it.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{AlertRow, AlertSummary, CacheRow, DailyForecast, WardAlerts};
use crate::helpers::opt_f64_to_decimal_1dp;
use crate::services::fetcher::{FetchOutcome, FetchStatus, FetchedWeather};
use crate::services::weatherapi::{ForecastDay, ProviderAlert};
use crate::services::writer::WriteReport;

/// Namespace for deterministic alert ids (UUID v5 over ward code + content).
const ALERT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b0e_8d3a_4c57_9e41_a2d7_35b8_c90f);

/// Counters for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_wards: usize,
    pub succeeded: usize,
    /// Subset of `succeeded` that needed more than one attempt.
    pub retried_then_succeeded: usize,
    pub terminally_failed: usize,
    /// Cancelled while waiting to retry; picked up by the next run.
    pub retry_deferred: usize,
    /// Never dispatched because the run was cancelled.
    pub unvisited: usize,
    pub api_calls: u64,
    pub cache_rows_written: u64,
    pub alerts_written: u64,
    pub write_chunks_failed: usize,
    pub batches_run: usize,
    pub cancelled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
    pub wards_per_second: f64,
}

/// Rows produced by successful fetches, keyed by ward code.
///
/// A ward with an entry in `alerts` gets its alert set replaced, possibly
/// with nothing; a ward without one is left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSet {
    pub cache_rows: BTreeMap<String, CacheRow>,
    pub alerts: BTreeMap<String, Vec<AlertRow>>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.cache_rows.is_empty() && self.alerts.is_empty()
    }

    pub fn ward_alerts(&self) -> Vec<WardAlerts> {
        self.alerts
            .iter()
            .map(|(ward_code, alerts)| WardAlerts {
                ward_code: ward_code.clone(),
                alerts: alerts.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct ResultAggregator {
    pending: WriteSet,
    summary: RunSummary,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: FetchOutcome) {
        self.summary.api_calls += u64::from(outcome.attempts_used);

        match outcome.status {
            FetchStatus::Success(fetched) => {
                self.summary.succeeded += 1;
                if outcome.attempts_used > 1 {
                    self.summary.retried_then_succeeded += 1;
                    tracing::debug!(
                        "Ward {}: succeeded after {} attempts",
                        outcome.ward_code,
                        outcome.attempts_used
                    );
                }
                let (row, alerts) = build_rows(&outcome.ward_code, &fetched);
                self.pending.alerts.insert(outcome.ward_code.clone(), alerts);
                self.pending.cache_rows.insert(outcome.ward_code, row);
            }
            FetchStatus::TerminalFailure(_) => {
                self.summary.terminally_failed += 1;
            }
            FetchStatus::RetryableFailure(_) => {
                self.summary.retry_deferred += 1;
            }
        }
    }

    /// Hand over the rows accumulated since the last call.
    pub fn take_write_set(&mut self) -> WriteSet {
        std::mem::take(&mut self.pending)
    }

    pub fn record_writes(&mut self, report: &WriteReport) {
        self.summary.cache_rows_written += report.cache_rows_written;
        self.summary.alerts_written += report.alerts_written;
        self.summary.write_chunks_failed += report.chunks_failed;
    }

    pub fn into_summary(self) -> RunSummary {
        self.summary
    }
}

/// Build the snapshot row and the complete alert set for one successful fetch.
///
/// Every field comes from the new payload; a value the provider omitted is
/// stored as NULL rather than kept from an older row.
pub fn build_rows(ward_code: &str, fetched: &FetchedWeather) -> (CacheRow, Vec<AlertRow>) {
    let forecast = &fetched.payload.forecast;
    let current = &forecast.current;

    let alerts = build_alert_rows(ward_code, &forecast.alerts.alert);
    let alerts_summary = alerts
        .iter()
        .map(|a| AlertSummary {
            id: a.id,
            event: a.event.clone(),
            severity: a.severity.clone(),
            headline: a.headline.clone(),
            expires: a.expires,
        })
        .collect();

    let row = CacheRow {
        ward_code: ward_code.to_string(),
        latitude: fetched.latitude,
        longitude: fetched.longitude,
        temperature_c: opt_f64_to_decimal_1dp(current.temp_c),
        condition_text: current.condition.text.clone(),
        condition_icon: current.condition.icon.clone(),
        wind_kph: opt_f64_to_decimal_1dp(current.wind_kph),
        humidity: current.humidity.map(|h| h.round() as i32),
        is_day: current.is_day == Some(1),
        precip_mm: opt_f64_to_decimal_1dp(current.precip_mm),
        daily_forecast: forecast.forecast.forecastday.iter().map(daily_forecast).collect(),
        alerts_summary,
        raw_response: fetched.payload.raw.clone(),
        fetched_at: fetched.fetched_at,
    };

    (row, alerts)
}

fn daily_forecast(day: &ForecastDay) -> DailyForecast {
    DailyForecast {
        date: day.date,
        maxtemp_c: day.day.maxtemp_c,
        mintemp_c: day.day.mintemp_c,
        avgtemp_c: day.day.avgtemp_c,
        maxwind_kph: day.day.maxwind_kph,
        totalprecip_mm: day.day.totalprecip_mm,
        avghumidity: day.day.avghumidity,
        condition_text: day.day.condition.text.clone(),
        condition_icon: day.day.condition.icon.clone(),
        daily_chance_of_rain: day.day.daily_chance_of_rain.map(|v| v.round() as i64),
        daily_chance_of_snow: day.day.daily_chance_of_snow.map(|v| v.round() as i64),
        uv: day.day.uv,
        sunrise: day.astro.sunrise.clone(),
        sunset: day.astro.sunset.clone(),
    }
}

/// Convert provider alerts into rows, dropping exact duplicates.
///
/// The provider regularly repeats the same alert within one response; the
/// content-derived id collapses those to one row and keeps ids stable across
/// replays of the same payload.
fn build_alert_rows(ward_code: &str, alerts: &[ProviderAlert]) -> Vec<AlertRow> {
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(alerts.len());

    for alert in alerts {
        let id = alert_id(ward_code, alert);
        if !seen.insert(id) {
            continue;
        }
        rows.push(AlertRow {
            id,
            ward_code: ward_code.to_string(),
            event: alert.event.clone(),
            headline: alert.headline.clone(),
            description: alert.desc.clone(),
            severity: alert.severity.clone(),
            urgency: alert.urgency.clone(),
            areas: alert.areas.clone(),
            category: alert.category.clone(),
            certainty: alert.certainty.clone(),
            instruction: alert.instruction.clone(),
            effective: alert.effective.as_deref().and_then(parse_alert_time),
            expires: alert.expires.as_deref().and_then(parse_alert_time),
        });
    }

    rows
}

fn alert_id(ward_code: &str, alert: &ProviderAlert) -> Uuid {
    let fields = [
        Some(ward_code),
        alert.event.as_deref(),
        alert.headline.as_deref(),
        alert.severity.as_deref(),
        alert.urgency.as_deref(),
        alert.areas.as_deref(),
        alert.category.as_deref(),
        alert.certainty.as_deref(),
        alert.effective.as_deref(),
        alert.expires.as_deref(),
        alert.desc.as_deref(),
        alert.instruction.as_deref(),
    ];
    let key = fields
        .iter()
        .map(|f| f.unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\u{1f}");
    Uuid::new_v5(&ALERT_ID_NAMESPACE, key.as_bytes())
}

fn parse_alert_time(s: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(_) => {
            tracing::warn!("Unparseable alert timestamp '{}', storing NULL", s);
            None
        }
    }
}
