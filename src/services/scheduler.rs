//! Batch scheduler.
//!
//! Splits the ward list into contiguous batches, fans out one worker per ward
//! inside a batch, and waits for the whole batch (barrier) before pausing and
//! starting the next one. Batches never overlap: the provider's per-period
//! rate ceiling depends on it.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::db::models::Ward;
use crate::errors::SyncError;
use crate::services::fetcher::FetchOutcome;

/// Receives worker outcomes as they complete.
pub trait BatchSink {
    /// Called once per worker, in completion order.
    fn record(&mut self, outcome: FetchOutcome);

    /// Called after every worker of the batch has completed, before the
    /// inter-batch delay.
    fn end_batch(&mut self, batch_index: usize) -> impl Future<Output = ()>;
}

/// What the scheduler got through before returning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleReport {
    pub batches_run: usize,
    pub wards_dispatched: usize,
    /// True when cancellation stopped the sweep before the last batch.
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    inter_batch_delay: Duration,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, inter_batch_delay: Duration) -> Result<Self, SyncError> {
        if batch_size == 0 {
            return Err(SyncError::Config(
                "batch size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            batch_size,
            inter_batch_delay,
        })
    }

    /// Contiguous batches in input order, each at most `batch_size` long.
    pub fn batches<'a>(&self, wards: &'a [Ward]) -> std::slice::Chunks<'a, Ward> {
        wards.chunks(self.batch_size)
    }

    pub fn batch_count(&self, ward_count: usize) -> usize {
        ward_count.div_ceil(self.batch_size)
    }

    /// Run every batch through `worker`, feeding outcomes into `sink`.
    ///
    /// Cancellation is checked before each batch and during the inter-batch
    /// delay; a batch that has started always drains.
    pub async fn run<'w, W, Fut, S>(
        &self,
        wards: &'w [Ward],
        cancel: &CancellationToken,
        worker: W,
        sink: &mut S,
    ) -> ScheduleReport
    where
        W: Fn(&'w Ward) -> Fut,
        Fut: Future<Output = FetchOutcome>,
        S: BatchSink,
    {
        let total_wards = wards.len();
        let total_batches = self.batch_count(total_wards);
        let mut report = ScheduleReport::default();
        let mut offset = 0;

        for (index, batch) in self.batches(wards).enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            tracing::info!(
                "Batch {}/{} ({}-{}/{})",
                index + 1,
                total_batches,
                offset + 1,
                offset + batch.len(),
                total_wards
            );

            let mut in_flight: FuturesUnordered<Fut> = batch.iter().map(&worker).collect();
            while let Some(outcome) = in_flight.next().await {
                sink.record(outcome);
            }

            report.batches_run += 1;
            report.wards_dispatched += batch.len();
            offset += batch.len();

            sink.end_batch(index).await;

            let is_last = index + 1 == total_batches;
            if !is_last && !self.inter_batch_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.inter_batch_delay) => {}
                }
            }
        }

        // A stop during the last batch still cuts its retries short.
        report.cancelled |= cancel.is_cancelled();
        if report.cancelled {
            tracing::warn!(
                "Run cancelled after {}/{} batches ({} wards not visited)",
                report.batches_run,
                total_batches,
                total_wards - report.wards_dispatched
            );
        }

        report
    }
}
