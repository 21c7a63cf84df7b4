//! Per-ward fetch worker.
//!
//! Runs one ward's attempt sequence under the retry policy and always
//! returns a `FetchOutcome`; failures are data, never errors or panics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::db::models::Ward;
use crate::helpers::dec_to_f64;
use crate::services::policy::{Decision, RetryPolicy};
use crate::services::weatherapi::{WeatherPayload, WeatherProvider};

/// A successful fetch, with everything needed to build the ward's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedWeather {
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub fetched_at: DateTime<Utc>,
    pub payload: WeatherPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchStatus {
    Success(FetchedWeather),
    /// Still retryable, but the run stopped before the next attempt.
    RetryableFailure(String),
    TerminalFailure(String),
}

/// Result of one ward's fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub ward_code: String,
    pub status: FetchStatus,
    pub attempts_used: u32,
}

fn coordinates_in_range(ward: &Ward) -> bool {
    ward.latitude.abs() <= Decimal::from(90) && ward.longitude.abs() <= Decimal::from(180)
}

/// Fetch one ward, retrying transient failures with backoff.
///
/// Attempts are strictly sequential. Backoff delays never shrink between two
/// attempts of the same ward. If `cancel` fires during a backoff wait the
/// worker gives up with `RetryableFailure`; an in-flight call is never aborted.
pub async fn fetch_ward<P: WeatherProvider>(
    provider: &P,
    policy: &RetryPolicy,
    ward: &Ward,
    cancel: &CancellationToken,
) -> FetchOutcome {
    if !coordinates_in_range(ward) {
        tracing::error!(
            "Ward {}: invalid coordinates ({}, {}), skipping",
            ward.ward_code,
            ward.latitude,
            ward.longitude
        );
        return FetchOutcome {
            ward_code: ward.ward_code.clone(),
            status: FetchStatus::TerminalFailure(format!(
                "invalid coordinates ({}, {})",
                ward.latitude, ward.longitude
            )),
            attempts_used: 0,
        };
    }

    let latitude = dec_to_f64(ward.latitude);
    let longitude = dec_to_f64(ward.longitude);
    let mut attempt = 0;
    let mut last_delay = Duration::ZERO;

    loop {
        attempt += 1;
        let result = provider.fetch_forecast(latitude, longitude).await;

        match policy.decide(attempt, result) {
            Decision::Accept(payload) => {
                return FetchOutcome {
                    ward_code: ward.ward_code.clone(),
                    status: FetchStatus::Success(FetchedWeather {
                        latitude: ward.latitude,
                        longitude: ward.longitude,
                        fetched_at: Utc::now(),
                        payload,
                    }),
                    attempts_used: attempt,
                };
            }
            Decision::Fail(reason) => {
                tracing::error!("Ward {}: giving up: {}", ward.ward_code, reason);
                return FetchOutcome {
                    ward_code: ward.ward_code.clone(),
                    status: FetchStatus::TerminalFailure(reason),
                    attempts_used: attempt,
                };
            }
            Decision::Retry { delay, reason } => {
                let delay = delay.max(last_delay);
                last_delay = delay;
                tracing::warn!(
                    "Ward {}: {} (attempt {}/{}), retrying in {}ms",
                    ward.ward_code,
                    reason,
                    attempt,
                    policy.max_attempts,
                    delay.as_millis()
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(
                            "Ward {}: run cancelled, deferring retry to the next run",
                            ward.ward_code
                        );
                        return FetchOutcome {
                            ward_code: ward.ward_code.clone(),
                            status: FetchStatus::RetryableFailure(reason),
                            attempts_used: attempt,
                        };
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
