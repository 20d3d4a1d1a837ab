use crate::command::ProcedureCommand;
use crate::error::DriverError;
use crate::types::{SqlValue, TableSet};

/// Opaque token identifying a transaction started by a driver connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionHandle(u64);

impl TransactionHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Trait for database driver implementations.
/// A driver turns a connection string into a connection object; it must not
/// perform I/O until the connection is opened.
pub trait DatabaseDriver: Send + Sync {
    /// Create an unopened connection for the given connection string.
    fn create_connection(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// A single connection owned by a session.
///
/// Drivers are responsible for:
/// - Opening and closing the underlying connection
/// - Starting and ending transactions
/// - Executing procedure commands and reporting output parameter values
pub trait DriverConnection: Send {
    fn is_open(&self) -> bool;

    /// Open the connection. Only called when `is_open` reports false.
    fn open(&mut self) -> Result<(), DriverError>;

    fn begin_transaction(&mut self) -> Result<TransactionHandle, DriverError>;

    fn commit(&mut self, transaction: TransactionHandle) -> Result<(), DriverError>;

    fn rollback(&mut self, transaction: TransactionHandle) -> Result<(), DriverError>;

    /// Drop a transaction handle without committing or rolling back.
    /// Used on teardown; the server discards the work when the connection closes.
    fn release_transaction(&mut self, transaction: TransactionHandle);

    /// Execute the command, returning every result set it produced.
    /// Output parameter values are recorded on `command`.
    fn execute(&mut self, command: &mut ProcedureCommand) -> Result<TableSet, DriverError>;

    /// Execute the command and return the first column of the first row of
    /// the first result set, if any.
    fn execute_scalar(
        &mut self,
        command: &mut ProcedureCommand,
    ) -> Result<Option<SqlValue>, DriverError> {
        let tables = self.execute(command)?;
        Ok(tables.first_value().cloned())
    }

    fn close(&mut self) -> Result<(), DriverError>;
}
