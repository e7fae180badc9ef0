//! Optional metrics instrumentation.
//!
//! When the `observe` feature is enabled, the engine emits counters and
//! histograms via the [`metrics`] crate. A downstream application must
//! install a metrics recorder to collect them.
//!
//! Without the feature every function here is a zero-cost no-op.

/// Record a delivered batch (counter + handling latency).
///
/// - `readmodel.batches.delivered_total` – counter with `outcome` label, one of
///   `acked`, `failed` (fatal error), `redelivered` or `exhausted` (last attempt failed)
/// - `readmodel.batches.duration_seconds` – histogram
#[inline]
pub fn record_batch(duration: std::time::Duration, outcome: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("readmodel.batches.delivered_total", "outcome" => outcome).increment(1);
        metrics::histogram!("readmodel.batches.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, outcome);
    }
}

/// Record projected events for a batch.
///
/// - `readmodel.events.projected_total` – counter
/// - `readmodel.events.failed_total` – counter
#[inline]
pub fn record_events(projected: u64, failed: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("readmodel.events.projected_total").increment(projected);
        metrics::counter!("readmodel.events.failed_total").increment(failed);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (projected, failed);
    }
}

/// - `readmodel.batches.redeliveries_total` – counter
#[inline]
pub fn record_redelivery() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("readmodel.batches.redeliveries_total").increment(1);
    }
}

/// Record a stream reaching a terminal status.
///
/// - `readmodel.streams.finished_total` – counter with `status` label
#[inline]
pub fn record_stream_finished(status: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("readmodel.streams.finished_total", "status" => status).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = status;
    }
}

/// Set the number of streams currently running.
///
/// - `readmodel.streams.active` – gauge
#[inline]
pub fn set_active_streams(count: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("readmodel.streams.active").set(count as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}
