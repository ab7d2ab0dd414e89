// Behavior policy decisions, kept free of I/O

use crate::models::TriggerBehavior;
use serde::{Deserialize, Serialize};

/// Facts the policy needs about existing events in scope, gathered by
/// the scheduler before deciding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeFacts {
    /// A pending event exists for the behavior's scope.
    pub has_pending: bool,
    /// Some event for the behavior's scope has completed.
    pub has_completed: bool,
}

/// Why a schedule request was vetoed. A defined no-op outcome the
/// caller must check, not an error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// RunOnce (or RunAndScheduleOnce): the trigger already ran.
    AlreadyRan,
    /// ScheduleOnce (or RunAndScheduleOnce): an event is already waiting.
    AlreadyScheduled,
}

/// What to do with a new schedule request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Persist the new event.
    Create,
    /// Cancel all pending events in scope and persist the new one, as
    /// one atomic unit.
    CancelThenCreate,
    /// Do not create anything.
    Reject(RejectReason),
}

/// Apply a trigger's behavior to the observed facts.
pub fn decide(behavior: TriggerBehavior, facts: ScopeFacts) -> Decision {
    match behavior {
        TriggerBehavior::Always => Decision::Create,
        TriggerBehavior::RunOnce => {
            if facts.has_completed {
                Decision::Reject(RejectReason::AlreadyRan)
            } else {
                Decision::Create
            }
        }
        TriggerBehavior::ScheduleOnce => {
            if facts.has_pending {
                Decision::Reject(RejectReason::AlreadyScheduled)
            } else {
                Decision::Create
            }
        }
        TriggerBehavior::RunAndScheduleOnce => {
            if facts.has_completed {
                Decision::Reject(RejectReason::AlreadyRan)
            } else if facts.has_pending {
                Decision::Reject(RejectReason::AlreadyScheduled)
            } else {
                Decision::Create
            }
        }
        TriggerBehavior::LastOnly => {
            if facts.has_pending {
                Decision::CancelThenCreate
            } else {
                Decision::Create
            }
        }
    }
}
