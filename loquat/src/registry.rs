// Trigger registry: name -> routine factory + behavior policy

use crate::errors::{RegistryError, RoutineError};
use crate::models::TriggerBehavior;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A unit of deferred application logic.
///
/// Instances are built from the event's decoded arguments by the
/// registration's factory. `check_validity` runs just before `run` and
/// lets the routine confirm its preconditions still hold at dispatch
/// time; returning `false` cancels the event without error.
#[async_trait]
pub trait Routine: Send + Sync {
    async fn check_validity(&self) -> Result<bool, RoutineError> {
        Ok(true)
    }

    async fn run(&self) -> Result<(), RoutineError>;
}

/// Builds a routine instance from decoded arguments.
pub type RoutineFactory =
    Arc<dyn Fn(Value) -> Result<Box<dyn Routine>, RoutineError> + Send + Sync>;

/// One trigger binding: name, factory, behavior, optional task group.
#[derive(Clone)]
pub struct Registration {
    pub trigger_name: String,
    pub behavior: TriggerBehavior,
    pub task_group: Option<String>,
    pub factory: RoutineFactory,
}

impl Registration {
    pub fn new(
        trigger_name: impl Into<String>,
        behavior: TriggerBehavior,
        factory: RoutineFactory,
    ) -> Self {
        Self {
            trigger_name: trigger_name.into(),
            behavior,
            task_group: None,
            factory,
        }
    }

    pub fn with_task_group(mut self, group: impl Into<String>) -> Self {
        self.task_group = Some(group.into());
        self
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("trigger_name", &self.trigger_name)
            .field("behavior", &self.behavior)
            .field("task_group", &self.task_group)
            .finish()
    }
}

/// Collects registrations at startup and freezes them into an
/// immutable `TriggerRegistry` before the dispatcher starts.
#[derive(Default)]
pub struct RegistryBuilder {
    registrations: HashMap<String, Registration>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trigger. Duplicate names are a startup-time error.
    pub fn register(mut self, registration: Registration) -> Result<Self, RegistryError> {
        if registration.trigger_name.is_empty() {
            return Err(RegistryError::MissingTriggerName);
        }
        if self.registrations.contains_key(&registration.trigger_name) {
            return Err(RegistryError::DuplicateTrigger(registration.trigger_name));
        }
        self.registrations
            .insert(registration.trigger_name.clone(), registration);
        Ok(self)
    }

    pub fn build(self) -> TriggerRegistry {
        TriggerRegistry {
            registrations: Arc::new(self.registrations),
        }
    }
}

/// Immutable trigger-name lookup, shared across scheduler and
/// dispatcher by cheap clone.
#[derive(Clone)]
pub struct TriggerRegistry {
    registrations: Arc<HashMap<String, Registration>>,
}

impl TriggerRegistry {
    pub fn get(&self, trigger_name: &str) -> Option<&Registration> {
        self.registrations.get(trigger_name)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl std::fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerRegistry")
            .field("triggers", &self.registrations.len())
            .finish()
    }
}
