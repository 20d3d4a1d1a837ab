use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::types::SqlType;

/// Error type for procdb operations
#[derive(Debug, Error)]
pub enum ProcDbError {
    #[error("Failed to create database connection: {0}")]
    Connection(#[source] DriverError),

    #[error("Failed to {operation} transaction: {source}")]
    Transaction {
        operation: TransactionOperation,
        #[source]
        source: DriverError,
    },

    #[error("A transaction is already active on this session")]
    TransactionAlreadyActive,

    #[error("Failed to execute stored procedure: {procedure}: {source}")]
    ProcedureExecution {
        procedure: String,
        #[source]
        source: Box<ProcDbError>,
    },

    #[error("Driver error: {0}")]
    Driver(#[source] DriverError),

    #[error("No value reported for output parameter: {0}")]
    OutputParameterMissing(String),

    #[error("Parameter name must not be empty")]
    InvalidParameterName,

    #[error("Value {value} cannot be bound as {declared}")]
    TypeMismatch { value: String, declared: SqlType },

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Session has been closed")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProcDbError {
    pub(crate) fn procedure(procedure: &str, source: ProcDbError) -> Self {
        ProcDbError::ProcedureExecution {
            procedure: procedure.to_string(),
            source: Box::new(source),
        }
    }

    /// Name of the procedure whose execution failed, if this is an execution error.
    pub fn procedure_name(&self) -> Option<&str> {
        match self {
            ProcDbError::ProcedureExecution { procedure, .. } => Some(procedure),
            _ => None,
        }
    }
}

/// Result type alias for procdb operations
pub type Result<T> = std::result::Result<T, ProcDbError>;

/// The transaction-control step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOperation {
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for TransactionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionOperation::Begin => "begin",
            TransactionOperation::Commit => "commit",
            TransactionOperation::Rollback => "rollback",
        })
    }
}

/// Failure reported by a driver implementation.
///
/// Carries a human readable message and, when the driver has one, the
/// underlying library error as its source.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DriverError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a library error, using its display text as the message.
    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a library error under a message of the driver's choosing.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<DriverError> for ProcDbError {
    fn from(err: DriverError) -> Self {
        ProcDbError::Driver(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_procedure_error_names_procedure() {
        let err = ProcDbError::procedure("list_orders", DriverError::new("boom").into());
        assert_eq!(err.procedure_name(), Some("list_orders"));
        assert_eq!(
            err.to_string(),
            "Failed to execute stored procedure: list_orders: Driver error: boom"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_transaction_error_display() {
        let err = ProcDbError::Transaction {
            operation: TransactionOperation::Commit,
            source: DriverError::new("connection reset"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to commit transaction: connection reset"
        );
        assert_eq!(err.procedure_name(), None);
    }

    #[test]
    fn test_driver_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = DriverError::from_source(io);
        assert_eq!(err.message(), "refused");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_driver_error_with_source_prefers_given_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "db error");
        let err = DriverError::with_source("division by zero", io);
        assert_eq!(err.to_string(), "division by zero");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("db error"));
    }
}
