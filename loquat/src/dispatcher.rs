// Dispatcher: polling loop that claims due events and runs their routines

use crate::errors::{RoutineError, StoreError};
use crate::models::{Event, EventStatus};
use crate::registry::TriggerRegistry;
use crate::serializer::{ArgSerializer, JsonSerializer};
use crate::store::EventStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

/// Dispatcher tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// How often to poll for due events (in seconds)
    pub poll_interval_seconds: u64,
    /// Maximum number of events to process per poll cycle
    pub batch_size: i64,
    /// Running events claimed longer ago than this are treated as
    /// crash leftovers and reset to pending
    pub stale_running_seconds: i64,
    /// Delay applied when a routine requests retry without a timestamp
    pub retry_delay_seconds: i64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 10,
            batch_size: 100,
            stale_running_seconds: 600,
            retry_delay_seconds: 3600,
        }
    }
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub due: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
    /// Claims lost to another dispatcher instance. Not an error.
    pub lost_claims: usize,
    /// Claims that failed with a store error; the event stays pending.
    pub claim_errors: usize,
    pub retries_scheduled: usize,
    pub stale_reset: u64,
}

/// What processing one claimed event concluded.
enum EventOutcome {
    Completed,
    Cancelled,
    Failed(String),
    Retry(Option<DateTime<Utc>>),
}

/// Periodically claims due events and drives them to a terminal
/// status. Any number of dispatcher processes may poll the same store;
/// the store's atomic claim keeps them from double-running an event.
pub struct Dispatcher {
    config: DispatcherConfig,
    store: Arc<dyn EventStore>,
    registry: TriggerRegistry,
    serializer: Arc<dyn ArgSerializer>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        store: Arc<dyn EventStore>,
        registry: TriggerRegistry,
        serializer: Arc<dyn ArgSerializer>,
    ) -> Self {
        let (shutdown_tx, _shutdown_rx) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            store,
            registry,
            serializer,
            shutdown_tx,
        }
    }

    pub fn with_default_serializer(
        config: DispatcherConfig,
        store: Arc<dyn EventStore>,
        registry: TriggerRegistry,
    ) -> Self {
        Self::new(config, store, registry, Arc::new(JsonSerializer))
    }

    pub fn shutdown_receiver(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Run the polling loop until `stop` is called. Store errors inside
    /// a cycle are logged and the loop survives to the next tick.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            batch_size = self.config.batch_size,
            "Starting dispatcher"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_seconds));
        let mut shutdown_rx = self.shutdown_receiver();

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self.poll_once().await {
                        Ok(stats) if stats.due > 0 => {
                            info!(
                                due = stats.due,
                                completed = stats.completed,
                                cancelled = stats.cancelled,
                                failed = stats.failed,
                                lost_claims = stats.lost_claims,
                                claim_errors = stats.claim_errors,
                                retries_scheduled = stats.retries_scheduled,
                                "Poll cycle finished"
                            );
                        }
                        Ok(_) => debug!("No events due"),
                        Err(e) => error!(error = %e, "Poll cycle failed; retrying next tick"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping dispatcher");
                    break;
                }
            }
        }

        info!("Dispatcher stopped");
    }

    /// Signal the polling loop to stop after the in-flight cycle.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// One poll cycle: sweep stale running events, fetch the due batch,
    /// then claim and process each event with per-event isolation.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> Result<CycleStats, StoreError> {
        let now = Utc::now();
        let mut stats = CycleStats::default();

        let stale_before = now - ChronoDuration::seconds(self.config.stale_running_seconds);
        stats.stale_reset = self.store.reset_stale_running(stale_before).await?;

        let due = self.store.fetch_due(now, self.config.batch_size).await?;
        stats.due = due.len();

        for event in due {
            match self.store.claim(event.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    // Another dispatcher instance won the race
                    debug!(event_id = %event.id, "Lost claim, skipping");
                    stats.lost_claims += 1;
                    continue;
                }
                Err(e) => {
                    error!(event_id = %event.id, error = %e, "Claim failed, skipping");
                    stats.claim_errors += 1;
                    continue;
                }
            }

            let started = std::time::Instant::now();
            let outcome = self.process_claimed(&event).await;
            let elapsed = started.elapsed();
            if elapsed > Duration::from_secs(self.config.poll_interval_seconds) {
                warn!(
                    event_id = %event.id,
                    trigger = %event.trigger_name,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Routine ran longer than the poll interval"
                );
            }

            self.record_outcome(&event, outcome, &mut stats).await;
        }

        Ok(stats)
    }

    /// Resolve, decode, validity-check, and run one claimed event.
    /// Every failure mode collapses into an outcome; nothing here can
    /// abort the batch.
    async fn process_claimed(&self, event: &Event) -> EventOutcome {
        let Some(registration) = self.registry.get(&event.trigger_name) else {
            warn!(event_id = %event.id, trigger = %event.trigger_name, "No registration for trigger");
            return EventOutcome::Failed(format!(
                "no registration for trigger '{}'",
                event.trigger_name
            ));
        };

        let args = match self.serializer.decode(&event.args) {
            Ok(args) => args,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Argument decode failed");
                return EventOutcome::Failed(e.to_string());
            }
        };

        let routine = match (registration.factory)(args) {
            Ok(routine) => routine,
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Routine construction failed");
                return EventOutcome::Failed(e.to_string());
            }
        };

        match routine.check_validity().await {
            Ok(true) => {}
            Ok(false) => {
                // Expected path, not an error
                debug!(event_id = %event.id, "Validity check negative, cancelling");
                return EventOutcome::Cancelled;
            }
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Validity check failed");
                return EventOutcome::Failed(e.to_string());
            }
        }

        match routine.run().await {
            Ok(()) => EventOutcome::Completed,
            Err(RoutineError::Retry { earliest }) => EventOutcome::Retry(earliest),
            Err(e) => {
                warn!(event_id = %event.id, error = %e, "Routine run failed");
                EventOutcome::Failed(e.to_string())
            }
        }
    }

    /// Persist the terminal status (and the retry event, when asked
    /// for). Store errors here are logged, not propagated: one event's
    /// bookkeeping must not stall the rest of the batch.
    async fn record_outcome(&self, event: &Event, outcome: EventOutcome, stats: &mut CycleStats) {
        let processed_at = Utc::now();
        let (status, error_detail) = match &outcome {
            EventOutcome::Completed => (EventStatus::Completed, None),
            EventOutcome::Cancelled => (EventStatus::Cancelled, None),
            EventOutcome::Failed(detail) => (EventStatus::Failed, Some(detail.clone())),
            EventOutcome::Retry(_) => (
                EventStatus::Failed,
                Some("routine requested retry".to_string()),
            ),
        };

        if let Err(e) = self
            .store
            .mark_terminal(event.id, status, error_detail, processed_at)
            .await
        {
            error!(event_id = %event.id, error = %e, "Failed to record event outcome");
            return;
        }

        match outcome {
            EventOutcome::Completed => stats.completed += 1,
            EventOutcome::Cancelled => stats.cancelled += 1,
            EventOutcome::Failed(_) => stats.failed += 1,
            EventOutcome::Retry(earliest) => {
                stats.failed += 1;
                let at = earliest.unwrap_or_else(|| {
                    processed_at + ChronoDuration::seconds(self.config.retry_delay_seconds)
                });
                let retry = event.retry_at(at);
                match self.store.insert(&retry).await {
                    Ok(()) => {
                        stats.retries_scheduled += 1;
                        info!(
                            event_id = %event.id,
                            retry_id = %retry.id,
                            scheduled_at = %at,
                            "Retry event scheduled"
                        );
                    }
                    Err(e) => {
                        error!(event_id = %event.id, error = %e, "Failed to schedule retry event");
                    }
                }
            }
        }
    }
}
