// Error taxonomy, one enum per concern

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Event store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => StoreError::DuplicateKey(db_err.message().to_string()),
                        _ => StoreError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    StoreError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Argument serializer errors
#[derive(Error, Debug)]
pub enum SerializerError {
    #[error("Failed to encode arguments: {0}")]
    Encode(String),

    #[error("Failed to decode arguments: {0}")]
    Decode(String),
}

/// Registry construction and lookup errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Duplicate registration for trigger '{0}'")]
    DuplicateTrigger(String),

    #[error("Registration is missing a trigger name")]
    MissingTriggerName,
}

/// Errors surfaced by routine construction, validity checking, and run
#[derive(Error, Debug)]
pub enum RoutineError {
    #[error("Routine failed: {0}")]
    Failed(String),

    #[error("Routine could not be constructed from arguments: {0}")]
    ConstructionFailed(String),

    /// The routine could not complete now and asks to be rescheduled.
    /// With no `earliest`, the dispatcher applies its configured delay.
    #[error("Routine requested retry")]
    Retry { earliest: Option<DateTime<Utc>> },
}

impl RoutineError {
    pub fn failed(detail: impl std::fmt::Display) -> Self {
        RoutineError::Failed(detail.to_string())
    }
}

/// Scheduling-call errors. A behavior-policy rejection is not an error;
/// it is reported as `ScheduleOutcome::Rejected`.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("No registration for trigger '{0}'")]
    UnknownTrigger(String),

    #[error(transparent)]
    Serializer(#[from] SerializerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
