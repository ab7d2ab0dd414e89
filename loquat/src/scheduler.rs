// Scheduling API: behavior policy applied against the event store

use crate::behavior::{decide, Decision, RejectReason, ScopeFacts};
use crate::errors::ScheduleError;
use crate::models::{Event, TriggerBehavior, TriggerScope};
use crate::registry::TriggerRegistry;
use crate::serializer::{ArgSerializer, JsonSerializer};
use crate::store::EventStore;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of a scheduling call. Rejection is a defined no-op the
/// caller must check, not an error.
#[derive(Debug, Clone)]
pub enum ScheduleOutcome {
    Scheduled(Event),
    Rejected(RejectReason),
}

impl ScheduleOutcome {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, ScheduleOutcome::Scheduled(_))
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            ScheduleOutcome::Scheduled(event) => Some(event),
            ScheduleOutcome::Rejected(_) => None,
        }
    }
}

/// Persists scheduling requests after running them through the
/// trigger's behavior policy. The event is durable before the call
/// returns; nothing is lost if the process dies afterwards.
pub struct Scheduler {
    store: Arc<dyn EventStore>,
    registry: TriggerRegistry,
    serializer: Arc<dyn ArgSerializer>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: TriggerRegistry,
        serializer: Arc<dyn ArgSerializer>,
    ) -> Self {
        Self {
            store,
            registry,
            serializer,
        }
    }

    pub fn with_default_serializer(store: Arc<dyn EventStore>, registry: TriggerRegistry) -> Self {
        Self::new(store, registry, Arc::new(JsonSerializer))
    }

    /// Schedule `trigger_name` to run at-or-after `scheduled_at`.
    #[instrument(skip(self, args))]
    pub async fn schedule(
        &self,
        trigger_name: &str,
        args: &Value,
        scheduled_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        let registration = self
            .registry
            .get(trigger_name)
            .ok_or_else(|| ScheduleError::UnknownTrigger(trigger_name.to_string()))?;

        let encoded = self.serializer.encode(args)?;
        let event = Event::new_pending(
            trigger_name,
            registration.task_group.clone(),
            encoded,
            scheduled_at,
        );

        // LastOnly and RunAndScheduleOnce collide across the whole task
        // group when the registration has one; ScheduleOnce and RunOnce
        // key on the trigger name alone.
        let scope = match registration.behavior {
            TriggerBehavior::LastOnly | TriggerBehavior::RunAndScheduleOnce => event.scope(),
            _ => TriggerScope::Trigger(trigger_name.to_string()),
        };

        let facts = self.gather_facts(registration.behavior, &scope).await?;

        match decide(registration.behavior, facts) {
            Decision::Create => {
                self.store.insert(&event).await?;
                info!(event_id = %event.id, scheduled_at = %event.scheduled_at, "Event scheduled");
                Ok(ScheduleOutcome::Scheduled(event))
            }
            Decision::CancelThenCreate => {
                let cancelled = self.store.cancel_pending_and_insert(&scope, &event).await?;
                info!(
                    event_id = %event.id,
                    cancelled,
                    "Event scheduled, superseding pending events"
                );
                Ok(ScheduleOutcome::Scheduled(event))
            }
            Decision::Reject(reason) => {
                info!(?reason, "Schedule request rejected by behavior policy");
                Ok(ScheduleOutcome::Rejected(reason))
            }
        }
    }

    /// Schedule for immediate pickup on the next poll cycle.
    pub async fn schedule_now(
        &self,
        trigger_name: &str,
        args: &Value,
    ) -> Result<ScheduleOutcome, ScheduleError> {
        self.schedule(trigger_name, args, Utc::now()).await
    }

    /// Fetch only the facts the behavior actually consults.
    async fn gather_facts(
        &self,
        behavior: TriggerBehavior,
        scope: &TriggerScope,
    ) -> Result<ScopeFacts, ScheduleError> {
        let facts = match behavior {
            TriggerBehavior::Always => ScopeFacts::default(),
            TriggerBehavior::RunOnce => ScopeFacts {
                has_completed: self.store.has_completed(scope).await?,
                ..Default::default()
            },
            TriggerBehavior::ScheduleOnce | TriggerBehavior::LastOnly => ScopeFacts {
                has_pending: self.store.has_pending(scope).await?,
                ..Default::default()
            },
            TriggerBehavior::RunAndScheduleOnce => ScopeFacts {
                has_pending: self.store.has_pending(scope).await?,
                has_completed: self.store.has_completed(scope).await?,
            },
        };
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RoutineError;
    use crate::models::EventStatus;
    use crate::registry::{Registration, RegistryBuilder, Routine, RoutineFactory};
    use crate::store::memory::InMemoryEventStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use serde_json::json;

    struct NoopRoutine;

    #[async_trait]
    impl Routine for NoopRoutine {
        async fn run(&self) -> Result<(), RoutineError> {
            Ok(())
        }
    }

    fn noop_factory() -> RoutineFactory {
        Arc::new(|_args| Ok(Box::new(NoopRoutine) as Box<dyn Routine>))
    }

    fn build_scheduler(registry: TriggerRegistry) -> (Scheduler, Arc<InMemoryEventStore>) {
        let store = Arc::new(InMemoryEventStore::new());
        let scheduler =
            Scheduler::with_default_serializer(store.clone() as Arc<dyn EventStore>, registry);
        (scheduler, store)
    }

    fn registry_with(behavior: TriggerBehavior, group: Option<&str>) -> TriggerRegistry {
        let mut registration = Registration::new("trigger", behavior, noop_factory());
        if let Some(group) = group {
            registration = registration.with_task_group(group);
        }
        RegistryBuilder::new()
            .register(registration)
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn test_schedule_persists_before_returning() {
        let (scheduler, store) = build_scheduler(registry_with(TriggerBehavior::Always, None));
        let at = Utc::now() + Duration::days(30);

        let outcome = scheduler
            .schedule("trigger", &json!({"jetski_id": 7}), at)
            .await
            .unwrap();

        let event = outcome.event().expect("scheduled");
        let stored = store.find_by_id(event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Pending);
        assert_eq!(stored.scheduled_at, at);
        assert_eq!(stored.args, "{\"jetski_id\":7}");
    }

    #[tokio::test]
    async fn test_unknown_trigger_is_an_error() {
        let (scheduler, _store) = build_scheduler(registry_with(TriggerBehavior::Always, None));
        let err = scheduler
            .schedule_now("ghost", &json!(null))
            .await
            .unwrap_err();
        assert!(matches!(err, ScheduleError::UnknownTrigger(_)));
    }

    #[tokio::test]
    async fn test_schedule_once_rejects_second_request() {
        let (scheduler, store) = build_scheduler(registry_with(TriggerBehavior::ScheduleOnce, None));

        let first = scheduler.schedule_now("trigger", &json!(1)).await.unwrap();
        assert!(first.is_scheduled());

        let second = scheduler.schedule_now("trigger", &json!(2)).await.unwrap();
        assert!(matches!(
            second,
            ScheduleOutcome::Rejected(RejectReason::AlreadyScheduled)
        ));

        // Exactly one pending event exists
        let scope = TriggerScope::Trigger("trigger".to_string());
        assert_eq!(store.pending_events(&scope).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_rejects_after_completion() {
        let (scheduler, store) = build_scheduler(registry_with(TriggerBehavior::RunOnce, None));

        let first = scheduler.schedule_now("trigger", &json!(1)).await.unwrap();
        let event = first.event().unwrap();
        store
            .mark_terminal(event.id, EventStatus::Completed, None, Utc::now())
            .await
            .unwrap();

        let second = scheduler.schedule_now("trigger", &json!(2)).await.unwrap();
        assert!(matches!(
            second,
            ScheduleOutcome::Rejected(RejectReason::AlreadyRan)
        ));
        assert_eq!(store.all_events().len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_allows_rescheduling_while_only_pending() {
        let (scheduler, _store) = build_scheduler(registry_with(TriggerBehavior::RunOnce, None));
        assert!(scheduler
            .schedule_now("trigger", &json!(1))
            .await
            .unwrap()
            .is_scheduled());
        assert!(scheduler
            .schedule_now("trigger", &json!(2))
            .await
            .unwrap()
            .is_scheduled());
    }

    #[tokio::test]
    async fn test_run_and_schedule_once_blocks_both_ways() {
        let (scheduler, store) =
            build_scheduler(registry_with(TriggerBehavior::RunAndScheduleOnce, None));

        let first = scheduler.schedule_now("trigger", &json!(1)).await.unwrap();
        assert!(first.is_scheduled());

        let while_pending = scheduler.schedule_now("trigger", &json!(2)).await.unwrap();
        assert!(matches!(
            while_pending,
            ScheduleOutcome::Rejected(RejectReason::AlreadyScheduled)
        ));

        store
            .mark_terminal(
                first.event().unwrap().id,
                EventStatus::Completed,
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        let after_run = scheduler.schedule_now("trigger", &json!(3)).await.unwrap();
        assert!(matches!(
            after_run,
            ScheduleOutcome::Rejected(RejectReason::AlreadyRan)
        ));
    }

    #[tokio::test]
    async fn test_run_and_schedule_once_scopes_by_group() {
        let registry = RegistryBuilder::new()
            .register(
                Registration::new("invoice-a", TriggerBehavior::RunAndScheduleOnce, noop_factory())
                    .with_task_group("invoices"),
            )
            .unwrap()
            .register(
                Registration::new("invoice-b", TriggerBehavior::RunAndScheduleOnce, noop_factory())
                    .with_task_group("invoices"),
            )
            .unwrap()
            .build();
        let (scheduler, store) = build_scheduler(registry);

        let first = scheduler.schedule_now("invoice-a", &json!(1)).await.unwrap();
        assert!(first.is_scheduled());

        // A group-mate is blocked while the group has a pending event
        let while_pending = scheduler.schedule_now("invoice-b", &json!(2)).await.unwrap();
        assert!(matches!(
            while_pending,
            ScheduleOutcome::Rejected(RejectReason::AlreadyScheduled)
        ));

        store
            .mark_terminal(
                first.event().unwrap().id,
                EventStatus::Completed,
                None,
                Utc::now(),
            )
            .await
            .unwrap();

        // And once any event in the group has run
        let after_run = scheduler.schedule_now("invoice-b", &json!(3)).await.unwrap();
        assert!(matches!(
            after_run,
            ScheduleOutcome::Rejected(RejectReason::AlreadyRan)
        ));
        assert_eq!(store.all_events().len(), 1);
    }

    #[tokio::test]
    async fn test_last_only_supersedes_pending_in_group() {
        let registry = RegistryBuilder::new()
            .register(
                Registration::new("reminder-a", TriggerBehavior::LastOnly, noop_factory())
                    .with_task_group("reminders"),
            )
            .unwrap()
            .register(
                Registration::new("reminder-b", TriggerBehavior::LastOnly, noop_factory())
                    .with_task_group("reminders"),
            )
            .unwrap()
            .build();
        let (scheduler, store) = build_scheduler(registry);

        let a = scheduler
            .schedule("reminder-a", &json!(1), Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let b = scheduler
            .schedule("reminder-b", &json!(2), Utc::now() + Duration::hours(2))
            .await
            .unwrap();

        let a_stored = store
            .find_by_id(a.event().unwrap().id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a_stored.status, EventStatus::Cancelled);
        assert!(a_stored.processed_at.is_some());

        let scope = TriggerScope::Group("reminders".to_string());
        let pending = store.pending_events(&scope).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.event().unwrap().id);
    }

    #[tokio::test]
    async fn test_last_only_without_group_scopes_by_trigger() {
        let (scheduler, store) = build_scheduler(registry_with(TriggerBehavior::LastOnly, None));

        let first = scheduler.schedule_now("trigger", &json!(1)).await.unwrap();
        let second = scheduler.schedule_now("trigger", &json!(2)).await.unwrap();

        assert_eq!(
            store
                .find_by_id(first.event().unwrap().id)
                .await
                .unwrap()
                .unwrap()
                .status,
            EventStatus::Cancelled
        );
        assert_eq!(
            store
                .find_by_id(second.event().unwrap().id)
                .await
                .unwrap()
                .unwrap()
                .status,
            EventStatus::Pending
        );
    }
}
