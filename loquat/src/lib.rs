// Loquat: durable deferred-event scheduling engine
//
// An Event is persisted before the scheduling call returns, then picked
// up by the polling Dispatcher at-or-after its scheduled timestamp. The
// store's atomic claim is the only concurrency-control primitive.

pub mod behavior;
pub mod config;
pub mod db;
pub mod dispatcher;
pub mod errors;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod serializer;
pub mod store;
pub mod telemetry;

pub use behavior::{decide, Decision, RejectReason};
pub use dispatcher::{CycleStats, Dispatcher, DispatcherConfig};
pub use models::{Event, EventStatus, TriggerBehavior, TriggerScope};
pub use registry::{Registration, RegistryBuilder, Routine, TriggerRegistry};
pub use scheduler::{ScheduleOutcome, Scheduler};
pub use serializer::{ArgSerializer, JsonSerializer};
pub use store::{memory::InMemoryEventStore, postgres::PgEventStore, EventStore};
