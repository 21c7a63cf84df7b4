use std::str::FromStr;
use std::time::Duration;

use crate::errors::SyncError;
use crate::services::policy::DEFAULT_MAX_ATTEMPTS;

const DEFAULT_WEATHER_API_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// Number of wards processed when `TEST_MODE` is on.
pub const TEST_MODE_WARD_LIMIT: usize = 5;

/// Tunables for one sweep. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Wards fetched concurrently per batch.
    pub batch_size: usize,
    /// Pause between two consecutive batches.
    pub inter_batch_delay: Duration,
    /// 0 = unlimited.
    pub max_wards: usize,
    /// Caps the sweep at `TEST_MODE_WARD_LIMIT` wards.
    pub test_mode: bool,
    /// Maximum rows (or wards, for alerts) per write.
    pub write_chunk_size: usize,
    /// Provider calls per ward before giving up.
    pub max_attempts: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            inter_batch_delay: Duration::from_millis(200),
            max_wards: 0,
            test_mode: false,
            write_chunk_size: 500,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl PipelineOptions {
    /// Reject option sets that would make a run meaningless.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.batch_size == 0 {
            return Err(SyncError::Config(
                "BATCH_SIZE must be greater than 0".to_string(),
            ));
        }
        if self.write_chunk_size == 0 {
            return Err(SyncError::Config(
                "WRITE_CHUNK_SIZE must be greater than 0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(SyncError::Config(
                "MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective cap on the number of wards for this run, if any.
    pub fn ward_limit(&self) -> Option<usize> {
        if self.test_mode {
            Some(TEST_MODE_WARD_LIMIT)
        } else if self.max_wards > 0 {
            Some(self.max_wards)
        } else {
            None
        }
    }
}

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub weather_api_key: String,
    pub weather_api_base_url: String,
    /// Forecast horizon requested from the provider (days).
    pub forecast_days: u8,
    pub request_timeout: Duration,
    /// Apply the bundled schema migrations before the run.
    pub run_migrations: bool,
    pub pipeline: PipelineOptions,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| SyncError::Config(format!("{} must be set", key)))
        };

        let defaults = PipelineOptions::default();
        let pipeline = PipelineOptions {
            batch_size: parse_or(&lookup, "BATCH_SIZE", defaults.batch_size)?,
            inter_batch_delay: Duration::from_millis(parse_or(
                &lookup,
                "INTER_BATCH_DELAY_MS",
                defaults.inter_batch_delay.as_millis() as u64,
            )?),
            max_wards: parse_or(&lookup, "MAX_WARDS", defaults.max_wards)?,
            test_mode: parse_or(&lookup, "TEST_MODE", defaults.test_mode)?,
            write_chunk_size: parse_or(&lookup, "WRITE_CHUNK_SIZE", defaults.write_chunk_size)?,
            max_attempts: parse_or(&lookup, "MAX_ATTEMPTS", defaults.max_attempts)?,
        };
        pipeline.validate()?;

        let forecast_days: u8 = parse_or(&lookup, "FORECAST_DAYS", 3)?;
        if !(1..=14).contains(&forecast_days) {
            return Err(SyncError::Config(
                "FORECAST_DAYS must be between 1 and 14".to_string(),
            ));
        }

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            weather_api_key: required("WEATHER_API_KEY")?,
            weather_api_base_url: lookup("WEATHER_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_WEATHER_API_BASE_URL.to_string()),
            forecast_days,
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30)?),
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", false)?,
            pipeline,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, SyncError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| SyncError::Config(format!("{} has an invalid value: {:?}", key, raw))),
        _ => Ok(default),
    }
}
