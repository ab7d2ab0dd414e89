// Event store seam: the single concurrency-control boundary

pub mod memory;
pub mod postgres;

use crate::errors::StoreError;
use crate::models::{Event, EventStatus, TriggerScope};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence operations the engine needs. All coordination between
/// scheduler and dispatcher instances happens through these primitives;
/// the engine holds no other shared mutable state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new pending event.
    async fn insert(&self, event: &Event) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    /// Pending events with `scheduled_at <= now`, earliest-due first,
    /// at most `limit` rows.
    async fn fetch_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Event>, StoreError>;

    /// Atomic conditional transition Pending -> Running, the claim.
    /// Returns whether this caller won; a lost race is not an error.
    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Record a terminal status. Only pending or running events can be
    /// finished; terminal states absorb.
    async fn mark_terminal(
        &self,
        id: Uuid,
        status: EventStatus,
        error_detail: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Whether any pending event exists in scope.
    async fn has_pending(&self, scope: &TriggerScope) -> Result<bool, StoreError>;

    /// Whether any event in scope has completed.
    async fn has_completed(&self, scope: &TriggerScope) -> Result<bool, StoreError>;

    /// All pending events in scope, earliest-due first.
    async fn pending_events(&self, scope: &TriggerScope) -> Result<Vec<Event>, StoreError>;

    /// Cancel every pending event in scope and insert the replacement,
    /// as one atomic unit. Returns the number of cancelled events.
    async fn cancel_pending_and_insert(
        &self,
        scope: &TriggerScope,
        event: &Event,
    ) -> Result<u64, StoreError>;

    /// Crash recovery: running events claimed before `older_than` go
    /// back to pending so another dispatcher can pick them up.
    async fn reset_stale_running(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}
