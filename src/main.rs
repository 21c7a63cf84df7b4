// Ward Weather Sync v0.1
use std::process::ExitCode;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod errors;
mod helpers;
mod services;
#[cfg(test)]
mod testing;

use config::SyncConfig;
use db::store::PgWeatherStore;
use errors::SyncError;
use services::aggregator::RunSummary;
use services::policy::RetryPolicy;
use services::weatherapi::WeatherApiClient;

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(summary) => {
            services::report::report_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Sync aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ward_weather_sync=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// One invocation: load config and wards, sweep, return the summary.
///
/// Every error returned here happens before the first batch starts.
async fn run() -> Result<RunSummary, SyncError> {
    let config = SyncConfig::from_env()?;
    tracing::info!(
        "Config: batch_size={}, delay={}ms, max_wards={}, test_mode={}, forecast_days={}",
        config.pipeline.batch_size,
        config.pipeline.inter_batch_delay.as_millis(),
        config.pipeline.max_wards,
        config.pipeline.test_mode,
        config.forecast_days
    );

    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await?;

    if config.run_migrations {
        sqlx::migrate!().run(&pool).await?;
        tracing::info!("Database migrations completed");
    }

    let wards = db::queries::get_wards(&pool, config.pipeline.ward_limit())
        .await
        .map_err(|e| SyncError::WardSource(format!("Failed to load wards: {}", e)))?;
    tracing::info!("Loaded {} ward coordinates", wards.len());

    let client = WeatherApiClient::new(
        &config.weather_api_base_url,
        &config.weather_api_key,
        config.forecast_days,
        config.request_timeout,
    )?;
    let store = PgWeatherStore::new(pool);
    let policy = RetryPolicy::new(config.pipeline.max_attempts);

    // Ctrl-C stops scheduling new batches; the current batch drains.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current batch");
            on_signal.cancel();
        }
    });

    services::coordinator::run_sync(
        wards,
        &client,
        &store,
        &config.pipeline,
        &policy,
        &cancel,
    )
    .await
}
