// In-memory event store, semantically identical to the Postgres store.
// Used for embedded deployments and tests.

use crate::errors::StoreError;
use crate::models::{Event, EventStatus, TriggerScope};
use crate::store::EventStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// `Mutex<HashMap>`-backed store. The mutex stands in for the
/// database's row-level atomicity: claim and cancel-then-insert run
/// under one lock acquisition, so concurrent dispatchers sharing this
/// store observe the same exactly-one-winner semantics.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<HashMap<Uuid, Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored event, unordered. Test helper.
    pub fn all_events(&self) -> Vec<Event> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Event>> {
        // A poisoned lock means a panic while mutating; the map itself
        // is still consistent because every mutation is a single write.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: &Event) -> Result<(), StoreError> {
        let mut events = self.lock();
        if events.contains_key(&event.id) {
            return Err(StoreError::DuplicateKey(event.id.to_string()));
        }
        events.insert(event.id, event.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn fetch_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Event>, StoreError> {
        let events = self.lock();
        let mut due: Vec<Event> = events
            .values()
            .filter(|e| e.status == EventStatus::Pending && e.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|e| e.scheduled_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn claim(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut events = self.lock();
        match events.get_mut(&id) {
            Some(event) if event.status == EventStatus::Pending && event.scheduled_at <= now => {
                event.status = EventStatus::Running;
                event.claimed_at = Some(now);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn mark_terminal(
        &self,
        id: Uuid,
        status: EventStatus,
        error_detail: Option<String>,
        processed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::QueryFailed(format!(
                "'{}' is not a terminal status",
                status
            )));
        }
        let mut events = self.lock();
        match events.get_mut(&id) {
            Some(event) if !event.status.is_terminal() => {
                event.status = status;
                event.error_detail = error_detail;
                event.processed_at = Some(processed_at);
                Ok(())
            }
            Some(_) => Err(StoreError::NotFound(format!(
                "Event {} is already terminal",
                id
            ))),
            None => Err(StoreError::NotFound(format!("Event not found: {}", id))),
        }
    }

    async fn has_pending(&self, scope: &TriggerScope) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .values()
            .any(|e| e.status == EventStatus::Pending && scope.matches(e)))
    }

    async fn has_completed(&self, scope: &TriggerScope) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .values()
            .any(|e| e.status == EventStatus::Completed && scope.matches(e)))
    }

    async fn pending_events(&self, scope: &TriggerScope) -> Result<Vec<Event>, StoreError> {
        let events = self.lock();
        let mut pending: Vec<Event> = events
            .values()
            .filter(|e| e.status == EventStatus::Pending && scope.matches(e))
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.scheduled_at);
        Ok(pending)
    }

    async fn cancel_pending_and_insert(
        &self,
        scope: &TriggerScope,
        event: &Event,
    ) -> Result<u64, StoreError> {
        let mut events = self.lock();
        if events.contains_key(&event.id) {
            return Err(StoreError::DuplicateKey(event.id.to_string()));
        }
        let now = Utc::now();
        let mut cancelled = 0u64;
        for existing in events.values_mut() {
            if existing.status == EventStatus::Pending && scope.matches(existing) {
                existing.status = EventStatus::Cancelled;
                existing.processed_at = Some(now);
                cancelled += 1;
            }
        }
        events.insert(event.id, event.clone());
        Ok(cancelled)
    }

    async fn reset_stale_running(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut events = self.lock();
        let mut reset = 0u64;
        for event in events.values_mut() {
            if event.status == EventStatus::Running
                && event.claimed_at.map(|t| t < older_than).unwrap_or(false)
            {
                event.status = EventStatus::Pending;
                event.claimed_at = None;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
