//! Data pump: pulls pages from a feed and delivers them in batches.
//!
//! Batches run concurrently up to `max_parallelism`, and at most
//! `buffer_size` events may be pulled without being acknowledged. A batch
//! that is not acknowledged within the ack timeout, or whose handler fails
//! with a recoverable error, is redelivered up to `max_redelivery_count`
//! attempts in total; past that the pump fails.

use async_trait::async_trait;
use chrono::Utc;
use readmodel_core::{
    observe, time_bucket, EngineConfig, Event, EventFeed, FeedError, FeedState, ReadModelError,
    Result, TimeWindow,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::shutdown::ShutdownHandle;

/// Receives delivered batches. Returning `Ok` acknowledges the batch.
#[async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    async fn handle(&self, batch: &[Event]) -> Result<()>;

    /// Called before each pull with the position being requested.
    fn on_position(&self, _state: &FeedState) {}
}

/// Tuning for one pump.
#[derive(Debug, Clone)]
pub struct PumpSettings {
    pub max_parallelism: usize,
    pub batch_size: usize,
    pub buffer_size: usize,
    pub page_size: usize,
    pub max_redelivery_count: u32,
    pub ack_timeout: Duration,
    pub idle_poll_interval: Duration,
}

impl PumpSettings {
    pub fn from_config(config: &EngineConfig, page_size: usize, max_parallelism: usize) -> Self {
        Self {
            max_parallelism: max_parallelism.max(1),
            batch_size: config.batch_size.max(1),
            buffer_size: config.buffer_size.max(config.batch_size).max(1),
            page_size: page_size.max(1),
            max_redelivery_count: config.max_redelivery_count.max(1),
            ack_timeout: config.ack_timeout(),
            idle_poll_interval: config.idle_poll_interval(),
        }
    }
}

/// How a pump finished without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The feed is exhausted up to the window end
    Completed,
    /// Shutdown was requested
    Stopped,
}

pub struct DataPump {
    feed: Box<dyn EventFeed>,
    handler: Arc<dyn BatchHandler>,
    settings: PumpSettings,
    window: TimeWindow,
    shutdown: ShutdownHandle,
}

impl DataPump {
    pub fn new(
        feed: Box<dyn EventFeed>,
        handler: Arc<dyn BatchHandler>,
        settings: PumpSettings,
        window: TimeWindow,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            feed,
            handler,
            settings,
            window,
            shutdown,
        }
    }

    /// Pump until the window is exhausted, shutdown is signalled, or a batch
    /// fails for good. Batches already dispatched always run to completion.
    pub async fn run(self) -> Result<PumpExit> {
        let mut in_flight = JoinSet::new();
        let outcome = self.pull(&mut in_flight).await;

        let mut batch_failure = None;
        while let Some(joined) = in_flight.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                Err(ReadModelError::Unrecoverable(format!("batch task failed: {}", e)))
            });
            if let Err(e) = result {
                batch_failure.get_or_insert(e);
            }
        }

        match (outcome, batch_failure) {
            (Err(e), _) => Err(e),
            (Ok(_), Some(e)) => Err(e),
            (Ok(exit), None) => Ok(exit),
        }
    }

    async fn pull(&self, in_flight: &mut JoinSet<Result<()>>) -> Result<PumpExit> {
        let parallel = Arc::new(Semaphore::new(self.settings.max_parallelism));
        let buffer = Arc::new(Semaphore::new(self.settings.buffer_size));
        let end_bucket = time_bucket(&self.window.end);
        let mut state = FeedState::from_instant(&self.window.start);

        loop {
            // Surface batches that already failed before pulling more
            while let Some(joined) = in_flight.try_join_next() {
                joined.map_err(|e| ReadModelError::Unrecoverable(format!("batch task failed: {}", e)))??;
            }

            if self.shutdown.is_shutdown() {
                return Ok(PumpExit::Stopped);
            }

            self.handler.on_position(&state);

            let page = tokio::select! {
                page = self.feed.fetch(&state, self.settings.page_size) => page?,
                _ = self.shutdown.wait() => return Ok(PumpExit::Stopped),
            };

            let mut reached_end = false;
            let mut resume = state.clone();
            let mut deliver = Vec::with_capacity(page.events.len());
            for event in page.events {
                if event.valid_time > self.window.end {
                    reached_end = true;
                    break;
                }
                // Where to resume when the feed has nothing further yet
                resume = FeedState::after(event.time_bucket.clone(), event.event_id.clone());
                // The start bucket may hold events from before the window opens
                if self.window.contains(&event.valid_time) {
                    deliver.push(event);
                }
            }

            for chunk in deliver.chunks(self.settings.batch_size) {
                let wanted = chunk.len().min(self.settings.buffer_size) as u32;
                // Backpressure: wait for earlier batches to acknowledge
                let buffered = tokio::select! {
                    permit = buffer.clone().acquire_many_owned(wanted) => {
                        permit.map_err(|e| ReadModelError::Unrecoverable(e.to_string()))?
                    }
                    _ = self.shutdown.wait() => return Ok(PumpExit::Stopped),
                };
                let slot = tokio::select! {
                    permit = parallel.clone().acquire_owned() => {
                        permit.map_err(|e| ReadModelError::Unrecoverable(e.to_string()))?
                    }
                    _ = self.shutdown.wait() => return Ok(PumpExit::Stopped),
                };

                let handler = self.handler.clone();
                let batch = chunk.to_vec();
                let settings = self.settings.clone();
                in_flight.spawn(async move {
                    let result = deliver_batch(handler.as_ref(), &batch, &settings).await;
                    drop(slot);
                    drop(buffered);
                    result
                });
            }

            if reached_end {
                return Ok(PumpExit::Completed);
            }

            match page.next {
                Some(next) if next.time_bucket > end_bucket => return Ok(PumpExit::Completed),
                Some(next) => state = next,
                None => {
                    if Utc::now() >= self.window.end {
                        return Ok(PumpExit::Completed);
                    }
                    // Live tail: the window is still open, wait for more events
                    state = resume;
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.idle_poll_interval) => {}
                        _ = self.shutdown.wait() => return Ok(PumpExit::Stopped),
                    }
                }
            }
        }
    }
}

/// Deliver one batch with ack timeout and bounded redelivery.
pub async fn deliver_batch(
    handler: &dyn BatchHandler,
    batch: &[Event],
    settings: &PumpSettings,
) -> Result<()> {
    let attempts = settings.max_redelivery_count;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let started = Instant::now();
        match tokio::time::timeout(settings.ack_timeout, handler.handle(batch)).await {
            Ok(Ok(())) => {
                observe::record_batch(started.elapsed(), "acked");
                return Ok(());
            }
            Ok(Err(e)) if e.is_fatal() => {
                observe::record_batch(started.elapsed(), "failed");
                return Err(e);
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => {
                last_error = FeedError::AckTimeout(settings.ack_timeout.as_millis() as u64).to_string()
            }
        }

        if attempt == attempts {
            observe::record_batch(started.elapsed(), "exhausted");
        } else {
            observe::record_batch(started.elapsed(), "redelivered");
            observe::record_redelivery();
            tracing::warn!(
                attempt,
                max_attempts = attempts,
                events = batch.len(),
                error = %last_error,
                "Redelivering batch"
            );
        }
    }

    Err(FeedError::RedeliveryExhausted {
        attempts,
        last_error,
    }
    .into())
}
