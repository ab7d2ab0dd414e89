// Core data model: the persisted Event and the trigger behavior policies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Event
// ============================================================================

/// Event represents one scheduled execution of a routine.
///
/// The record is persisted before the scheduling call returns and is
/// never deleted by the engine; terminal events remain for audit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    /// Name binding this event to a routine registration at dispatch time.
    pub trigger_name: String,
    /// Optional label scoping collision behavior across trigger types.
    pub task_group: Option<String>,
    /// Serializer output; opaque to the store.
    pub args: String,
    /// When the event becomes eligible to run. Immutable after creation.
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Stamped by the claim; cleared when a stale running event is
    /// reset. Drives crash-recovery staleness detection.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Stamped on every terminal transition.
    pub processed_at: Option<DateTime<Utc>>,
    #[sqlx(try_from = "String")]
    pub status: EventStatus,
    pub error_detail: Option<String>,
}

impl Event {
    /// Create a new pending event for a trigger.
    pub fn new_pending(
        trigger_name: impl Into<String>,
        task_group: Option<String>,
        args: String,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_name: trigger_name.into(),
            task_group,
            args,
            scheduled_at,
            created_at: Utc::now(),
            claimed_at: None,
            processed_at: None,
            status: EventStatus::Pending,
            error_detail: None,
        }
    }

    /// A fresh pending copy of this event, rescheduled at `scheduled_at`.
    /// Used when a routine asks to be retried later.
    pub fn retry_at(&self, scheduled_at: DateTime<Utc>) -> Self {
        Self::new_pending(
            self.trigger_name.clone(),
            self.task_group.clone(),
            self.args.clone(),
            scheduled_at,
        )
    }

    /// The scope dedup queries use for this event: task group when
    /// present, trigger name otherwise.
    pub fn scope(&self) -> TriggerScope {
        match &self.task_group {
            Some(group) => TriggerScope::Group(group.clone()),
            None => TriggerScope::Trigger(self.trigger_name.clone()),
        }
    }
}

// ============================================================================
// EventStatus
// ============================================================================

/// Lifecycle state of an Event.
///
/// Pending -> Running via the store's atomic claim; Running ends in
/// Completed or Failed; Pending may end in Cancelled (validity check
/// false, or superseded by a LastOnly schedule). Terminal states absorb.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Completed | EventStatus::Failed | EventStatus::Cancelled
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Pending => write!(f, "pending"),
            EventStatus::Running => write!(f, "running"),
            EventStatus::Completed => write!(f, "completed"),
            EventStatus::Failed => write!(f, "failed"),
            EventStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventStatus::Pending),
            "running" => Ok(EventStatus::Running),
            "completed" => Ok(EventStatus::Completed),
            "failed" => Ok(EventStatus::Failed),
            "cancelled" => Ok(EventStatus::Cancelled),
            _ => Err(format!("Invalid event status: {}", s)),
        }
    }
}

impl TryFrom<String> for EventStatus {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

// ============================================================================
// TriggerBehavior
// ============================================================================

/// Dedup/collision policy applied when scheduling a new event for a
/// trigger (or its task group).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerBehavior {
    /// No dedup; every schedule call creates an event.
    Always,
    /// Reject once any event for the trigger has completed.
    RunOnce,
    /// Reject while a pending event exists for the trigger.
    ScheduleOnce,
    /// Reject if a completed or pending event exists for the trigger.
    RunAndScheduleOnce,
    /// Cancel all pending events in scope, then create the new one,
    /// as a single atomic unit.
    LastOnly,
}

impl fmt::Display for TriggerBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerBehavior::Always => write!(f, "always"),
            TriggerBehavior::RunOnce => write!(f, "run_once"),
            TriggerBehavior::ScheduleOnce => write!(f, "schedule_once"),
            TriggerBehavior::RunAndScheduleOnce => write!(f, "run_and_schedule_once"),
            TriggerBehavior::LastOnly => write!(f, "last_only"),
        }
    }
}

// ============================================================================
// TriggerScope
// ============================================================================

/// Query key for scoped store lookups: a single trigger name, or a task
/// group spanning several trigger types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerScope {
    Trigger(String),
    Group(String),
}

impl TriggerScope {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            TriggerScope::Trigger(name) => event.trigger_name == *name,
            TriggerScope::Group(group) => event.task_group.as_deref() == Some(group.as_str()),
        }
    }
}
