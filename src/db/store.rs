//! Destination store seam.
//!
//! The reconciling writer only ever talks to a `WeatherStore`. Each call is one
//! chunk and is expected to be atomic on its own; nothing spans chunks.

use std::future::Future;

use sqlx::PgPool;

use super::models::{CacheRow, WardAlerts};
use super::queries;
use crate::errors::SyncError;

pub trait WeatherStore {
    /// Upsert a chunk of snapshot rows keyed by `ward_code`.
    fn upsert_cache_rows(
        &self,
        rows: &[CacheRow],
    ) -> impl Future<Output = Result<u64, SyncError>> + Send;

    /// Replace the alert sets of a chunk of wards. Returns alert rows inserted.
    fn replace_alerts(
        &self,
        sets: &[WardAlerts],
    ) -> impl Future<Output = Result<u64, SyncError>> + Send;
}

/// Postgres-backed store over `weather_cache` / `weather_alerts`.
#[derive(Debug, Clone)]
pub struct PgWeatherStore {
    pool: PgPool,
}

impl PgWeatherStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl WeatherStore for PgWeatherStore {
    async fn upsert_cache_rows(&self, rows: &[CacheRow]) -> Result<u64, SyncError> {
        Ok(queries::upsert_cache_rows(&self.pool, rows).await?)
    }

    async fn replace_alerts(&self, sets: &[WardAlerts]) -> Result<u64, SyncError> {
        Ok(queries::replace_ward_alerts(&self.pool, sets).await?)
    }
}
