//! Run coordinator.
//!
//! Drives one sweep: scope the ward list, schedule batches, fold outcomes,
//! write each batch's rows once the batch barrier is reached, and produce the
//! run summary.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineOptions;
use crate::db::models::Ward;
use crate::db::store::WeatherStore;
use crate::errors::SyncError;
use crate::services::aggregator::{ResultAggregator, RunSummary};
use crate::services::fetcher::{fetch_ward, FetchOutcome};
use crate::services::policy::RetryPolicy;
use crate::services::scheduler::{BatchScheduler, BatchSink};
use crate::services::weatherapi::WeatherProvider;
use crate::services::writer::ReconcilingWriter;

/// Folds outcomes as they arrive and writes after each batch.
struct PipelineSink<'a, S> {
    aggregator: ResultAggregator,
    writer: ReconcilingWriter<'a, S>,
}

impl<S: WeatherStore> BatchSink for PipelineSink<'_, S> {
    fn record(&mut self, outcome: FetchOutcome) {
        self.aggregator.record(outcome);
    }

    async fn end_batch(&mut self, batch_index: usize) {
        let set = self.aggregator.take_write_set();
        if set.is_empty() {
            tracing::warn!("Batch {}: no successful fetches, nothing to write", batch_index + 1);
            return;
        }

        let report = self.writer.persist(set).await;
        tracing::info!(
            "Batch {}: upserted {} weather rows, {} alerts ({} chunks failed)",
            batch_index + 1,
            report.cache_rows_written,
            report.alerts_written,
            report.chunks_failed
        );
        self.aggregator.record_writes(&report);
    }
}

/// Cut the ward list down to the configured scope.
///
/// `test_mode` wins over `max_wards`. Order is preserved.
pub fn scope_wards(mut wards: Vec<Ward>, options: &PipelineOptions) -> Vec<Ward> {
    if let Some(limit) = options.ward_limit() {
        wards.truncate(limit);
    }
    wards
}

/// Run one full sweep over `wards`.
///
/// Returns an error only for run-level problems detected before the first
/// batch (invalid options, nothing to process). Everything after that is
/// recovered locally and reflected in the returned summary.
pub async fn run_sync<P, S>(
    wards: Vec<Ward>,
    provider: &P,
    store: &S,
    options: &PipelineOptions,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RunSummary, SyncError>
where
    P: WeatherProvider,
    S: WeatherStore,
{
    options.validate()?;
    let scheduler = BatchScheduler::new(options.batch_size, options.inter_batch_delay)?;

    let wards = scope_wards(wards, options);
    if wards.is_empty() {
        return Err(SyncError::WardSource("No wards to process".to_string()));
    }

    if options.test_mode {
        tracing::info!("Test mode: processing only {} wards", wards.len());
    }
    tracing::info!(
        "Processing {} wards in {} batches (batch size {}, delay {}ms)",
        wards.len(),
        scheduler.batch_count(wards.len()),
        options.batch_size,
        options.inter_batch_delay.as_millis()
    );

    let started_at = Utc::now();
    let clock = tokio::time::Instant::now();

    let mut sink = PipelineSink {
        aggregator: ResultAggregator::new(),
        writer: ReconcilingWriter::new(store, options.write_chunk_size),
    };

    let schedule = scheduler
        .run(
            &wards,
            cancel,
            |ward| fetch_ward(provider, policy, ward, cancel),
            &mut sink,
        )
        .await;

    let elapsed = clock.elapsed().as_secs_f64();
    let mut summary = sink.aggregator.into_summary();
    summary.total_wards = wards.len();
    summary.unvisited = wards.len() - schedule.wards_dispatched;
    summary.batches_run = schedule.batches_run;
    summary.cancelled = schedule.cancelled;
    summary.started_at = Some(started_at);
    summary.finished_at = Some(Utc::now());
    summary.elapsed_seconds = (elapsed * 10.0).round() / 10.0;
    summary.wards_per_second = if elapsed > 0.0 {
        ((schedule.wards_dispatched as f64 / elapsed) * 10.0).round() / 10.0
    } else {
        0.0
    };

    Ok(summary)
}
