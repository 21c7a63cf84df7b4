//! Run summary reporting.

use crate::services::aggregator::RunSummary;

/// Emit the summary of a finished run: one human-readable line, then the
/// full summary as a single JSON log line for log-based collectors.
pub fn report_summary(summary: &RunSummary) {
    let failures = summary.terminally_failed + summary.write_chunks_failed;
    if failures > 0 || summary.cancelled {
        tracing::warn!(
            "Complete: {}/{} wards updated in {}s ({} failed, {} deferred, {} unvisited, {} write chunks failed)",
            summary.succeeded,
            summary.total_wards,
            summary.elapsed_seconds,
            summary.terminally_failed,
            summary.retry_deferred,
            summary.unvisited,
            summary.write_chunks_failed,
        );
    } else {
        tracing::info!(
            "Complete: {}/{} wards updated in {}s",
            summary.succeeded,
            summary.total_wards,
            summary.elapsed_seconds,
        );
    }

    match serde_json::to_string(summary) {
        Ok(json) => tracing::info!(target: "ward_weather_sync::summary", "{}", json),
        Err(e) => tracing::error!("Failed to serialize run summary: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes_counters() {
        let summary = RunSummary {
            total_wards: 3,
            succeeded: 2,
            terminally_failed: 1,
            api_calls: 4,
            ..RunSummary::default()
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["total_wards"], 3);
        assert_eq!(json["succeeded"], 2);
        assert_eq!(json["terminally_failed"], 1);
        assert_eq!(json["api_calls"], 4);
        assert_eq!(json["cancelled"], false);
        assert!(json["started_at"].is_null());

        // Must not panic without a subscriber installed.
        report_summary(&summary);
    }
}
