use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::command::{BoundParameter, ProcedureCommand};
use crate::error::DriverError;
use crate::traits::{DatabaseDriver, DriverConnection, TransactionHandle};
use crate::types::{SqlValue, Table, TableSet};

/// A recorded procedure execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub procedure: String,
    pub transaction: Option<TransactionHandle>,
    pub parameters: Vec<BoundParameter>,
}

/// What the in-memory driver returns for one execution.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResponse {
    tables: Vec<Table>,
    outputs: HashMap<String, SqlValue>,
    error: Option<String>,
}

impl InMemoryResponse {
    /// A response with no result sets and no output values.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Default)]
struct Failures {
    open: Option<String>,
    begin: Option<String>,
    commit: Option<String>,
    rollback: Option<String>,
    close: Option<String>,
}

#[derive(Default)]
struct DriverState {
    responses: VecDeque<InMemoryResponse>,
    default_response: InMemoryResponse,
    recorded_calls: Vec<RecordedCall>,
    failures: Failures,
    disconnected: bool,
    next_transaction: u64,
    active_transaction: Option<TransactionHandle>,
    connections_created: usize,
    opens: usize,
    closes: usize,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    releases: usize,
}

/// An in-memory database driver for testing.
///
/// Allows configuring expected responses, injecting failures and verifying
/// executed procedures and connection lifecycle.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use procdb::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
/// use procdb::traits::DatabaseDriver;
/// use procdb::DbSession;
///
/// let driver = Arc::new(
///     InMemoryTestDriver::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .columns(&["id", "name"])
///             .row(&["1", "Alice"])
///             .build(),
///     ),
/// );
/// let mut session =
///     DbSession::with_driver("memory://", Arc::clone(&driver) as Arc<dyn DatabaseDriver>);
/// let table = session.execute_procedure_to_table("list_users", None).unwrap();
/// assert_eq!(table.len(), 1);
/// driver.assert_call_count(1);
/// ```
pub struct InMemoryTestDriver {
    state: Arc<Mutex<DriverState>>,
}

impl InMemoryTestDriver {
    /// Create a new in-memory test driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DriverState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, DriverState> {
        lock(&self.state)
    }

    /// Add a response to be returned by the next execution.
    /// Responses are returned in FIFO order.
    pub fn with_response(self, response: InMemoryResponse) -> Self {
        self.state().responses.push_back(response);
        self
    }

    /// Add multiple responses to be returned by subsequent executions.
    pub fn with_responses(self, responses: impl IntoIterator<Item = InMemoryResponse>) -> Self {
        let mut state = self.state();
        state.responses.extend(responses);
        drop(state);
        self
    }

    /// Set a default response to use when no queued responses remain.
    pub fn with_default_response(self, response: InMemoryResponse) -> Self {
        self.state().default_response = response;
        self
    }

    /// Make the next connection open fail.
    pub fn fail_next_open(&self, message: &str) {
        self.state().failures.open = Some(message.to_string());
    }

    /// Make the next begin fail.
    pub fn fail_next_begin(&self, message: &str) {
        self.state().failures.begin = Some(message.to_string());
    }

    /// Make the next commit fail.
    pub fn fail_next_commit(&self, message: &str) {
        self.state().failures.commit = Some(message.to_string());
    }

    /// Make the next rollback fail.
    pub fn fail_next_rollback(&self, message: &str) {
        self.state().failures.rollback = Some(message.to_string());
    }

    /// Make the next connection close fail.
    pub fn fail_next_close(&self, message: &str) {
        self.state().failures.close = Some(message.to_string());
    }

    /// Simulate the server dropping the connection. Open connections report
    /// closed until they are opened again; any active transaction is lost.
    pub fn disconnect(&self) {
        let mut state = self.state();
        state.disconnected = true;
        state.active_transaction = None;
    }

    /// Get all recorded calls that have been executed.
    pub fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.state().recorded_calls.clone()
    }

    /// Get the last recorded call, if any.
    pub fn last_call(&self) -> Option<RecordedCall> {
        self.state().recorded_calls.last().cloned()
    }

    /// Clear all recorded calls.
    pub fn clear_recorded_calls(&self) {
        self.state().recorded_calls.clear();
    }

    pub fn active_transaction(&self) -> Option<TransactionHandle> {
        self.state().active_transaction
    }

    pub fn connections_created(&self) -> usize {
        self.state().connections_created
    }

    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    pub fn begin_count(&self) -> usize {
        self.state().begins
    }

    pub fn commit_count(&self) -> usize {
        self.state().commits
    }

    pub fn rollback_count(&self) -> usize {
        self.state().rollbacks
    }

    pub fn release_count(&self) -> usize {
        self.state().releases
    }

    /// Assert that the last call matches the expected procedure and parameters.
    pub fn assert_last_call(&self, expected_procedure: &str, expected_params: &[BoundParameter]) {
        let last = self.last_call().expect("No calls were recorded");
        assert_eq!(
            last.procedure, expected_procedure,
            "Procedure mismatch.\nExpected: {}\nActual: {}",
            expected_procedure, last.procedure
        );
        assert_eq!(
            last.parameters, expected_params,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_params, last.parameters
        );
    }

    /// Assert that exactly n calls were executed.
    pub fn assert_call_count(&self, expected: usize) {
        let actual = self.state().recorded_calls.len();
        assert_eq!(
            actual, expected,
            "Call count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }
}

impl Default for InMemoryTestDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseDriver for InMemoryTestDriver {
    fn create_connection(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        if connection_string.trim().is_empty() {
            return Err(DriverError::new("connection string is empty"));
        }
        self.state().connections_created += 1;
        Ok(Box::new(InMemoryConnection {
            state: Arc::clone(&self.state),
            open: false,
        }))
    }
}

struct InMemoryConnection {
    state: Arc<Mutex<DriverState>>,
    open: bool,
}

impl InMemoryConnection {
    fn state(&self) -> MutexGuard<'_, DriverState> {
        lock(&self.state)
    }

    fn require_open(&self) -> Result<(), DriverError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DriverError::new("connection is not open"))
        }
    }
}

impl DriverConnection for InMemoryConnection {
    fn is_open(&self) -> bool {
        self.open && !self.state().disconnected
    }

    fn open(&mut self) -> Result<(), DriverError> {
        let mut state = self.state();
        if let Some(message) = state.failures.open.take() {
            return Err(DriverError::new(message));
        }
        state.opens += 1;
        state.disconnected = false;
        drop(state);
        self.open = true;
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<TransactionHandle, DriverError> {
        self.require_open()?;
        let mut state = self.state();
        if let Some(message) = state.failures.begin.take() {
            return Err(DriverError::new(message));
        }
        if state.active_transaction.is_some() {
            return Err(DriverError::new("a transaction is already in progress"));
        }
        state.next_transaction += 1;
        let handle = TransactionHandle::new(state.next_transaction);
        state.active_transaction = Some(handle);
        state.begins += 1;
        Ok(handle)
    }

    fn commit(&mut self, transaction: TransactionHandle) -> Result<(), DriverError> {
        self.require_open()?;
        let mut state = self.state();
        end_transaction(&mut state, transaction)?;
        if let Some(message) = state.failures.commit.take() {
            return Err(DriverError::new(message));
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(&mut self, transaction: TransactionHandle) -> Result<(), DriverError> {
        self.require_open()?;
        let mut state = self.state();
        end_transaction(&mut state, transaction)?;
        if let Some(message) = state.failures.rollback.take() {
            return Err(DriverError::new(message));
        }
        state.rollbacks += 1;
        Ok(())
    }

    fn release_transaction(&mut self, transaction: TransactionHandle) {
        let mut state = self.state();
        if state.active_transaction == Some(transaction) {
            state.active_transaction = None;
        }
        state.releases += 1;
    }

    fn execute(&mut self, command: &mut ProcedureCommand) -> Result<TableSet, DriverError> {
        self.require_open()?;
        let mut state = self.state();

        if let Some(handle) = command.transaction() {
            if state.active_transaction != Some(handle) {
                return Err(DriverError::new(format!(
                    "transaction {} is not active on this connection",
                    handle.id()
                )));
            }
        }

        // Record the call
        state.recorded_calls.push(RecordedCall {
            procedure: command.procedure().to_string(),
            transaction: command.transaction(),
            parameters: command.parameters().to_vec(),
        });

        // Return next queued response or default
        let response = state
            .responses
            .pop_front()
            .unwrap_or_else(|| state.default_response.clone());
        drop(state);

        if let Some(message) = response.error {
            return Err(DriverError::new(message));
        }

        let reported: Vec<(String, SqlValue)> = command
            .output_parameters()
            .filter_map(|p| {
                response
                    .outputs
                    .get(&p.name)
                    .map(|value| (p.name.clone(), value.clone()))
            })
            .collect();
        for (name, value) in reported {
            command.set_output(name, value);
        }

        Ok(TableSet::new(response.tables))
    }

    fn close(&mut self) -> Result<(), DriverError> {
        let mut state = self.state();
        if let Some(message) = state.failures.close.take() {
            return Err(DriverError::new(message));
        }
        state.closes += 1;
        drop(state);
        self.open = false;
        Ok(())
    }
}

fn lock(state: &Mutex<DriverState>) -> MutexGuard<'_, DriverState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn end_transaction(
    state: &mut DriverState,
    transaction: TransactionHandle,
) -> Result<(), DriverError> {
    if state.active_transaction != Some(transaction) {
        return Err(DriverError::new(format!(
            "transaction {} is not active on this connection",
            transaction.id()
        )));
    }
    state.active_transaction = None;
    Ok(())
}

/// Builder for creating test responses easily.
pub struct InMemoryTestResponseBuilder {
    tables: Vec<Table>,
    current: Option<(Vec<String>, Vec<Vec<SqlValue>>)>,
    outputs: HashMap<String, SqlValue>,
    error: Option<String>,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            current: None,
            outputs: HashMap::new(),
            error: None,
        }
    }

    /// Start a new result set with the given column names.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.finish_table();
        self.current = Some((cols.iter().map(|s| s.to_string()).collect(), Vec::new()));
        self
    }

    /// Add a row of text values to the current result set.
    pub fn row(self, values: &[&str]) -> Self {
        self.values(values.iter().map(|s| SqlValue::from(*s)).collect())
    }

    /// Add a row of typed values to the current result set.
    pub fn values(mut self, values: Vec<SqlValue>) -> Self {
        self.current
            .get_or_insert_with(|| (Vec::new(), Vec::new()))
            .1
            .push(values);
        self
    }

    /// Report a value for an output parameter.
    pub fn output(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.outputs.insert(name.to_string(), value.into());
        self
    }

    /// Fail the execution with the given driver message.
    pub fn error(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }

    fn finish_table(&mut self) {
        if let Some((columns, rows)) = self.current.take() {
            self.tables.push(Table::new(columns, rows));
        }
    }

    /// Build the InMemoryResponse.
    pub fn build(mut self) -> InMemoryResponse {
        self.finish_table();
        InMemoryResponse {
            tables: self.tables,
            outputs: self.outputs,
            error: self.error,
        }
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_splits_tables_on_columns() {
        let response = InMemoryTestResponseBuilder::new()
            .columns(&["id"])
            .row(&["1"])
            .row(&["2"])
            .columns(&["total"])
            .values(vec![SqlValue::Int64(3)])
            .build();

        assert_eq!(response.tables.len(), 2);
        assert_eq!(response.tables[0].len(), 2);
        assert_eq!(response.tables[1].first_value(), Some(&SqlValue::Int64(3)));
    }

    #[test]
    fn test_builder_without_columns_has_no_tables() {
        let response = InMemoryTestResponseBuilder::new().output("x", 1).build();
        assert!(response.tables.is_empty());
        assert_eq!(response.outputs.get("x"), Some(&SqlValue::Int32(1)));
    }

    #[test]
    fn test_execute_requires_open_connection() {
        let driver = InMemoryTestDriver::new();
        let mut conn = driver.create_connection("memory://").unwrap();
        let mut cmd = ProcedureCommand::new("p");
        assert!(conn.execute(&mut cmd).is_err());

        conn.open().unwrap();
        assert!(conn.execute(&mut cmd).is_ok());
        driver.assert_call_count(1);
    }

    #[test]
    fn test_disconnect_closes_connection() {
        let driver = InMemoryTestDriver::new();
        let mut conn = driver.create_connection("memory://").unwrap();
        conn.open().unwrap();
        let tx = conn.begin_transaction().unwrap();

        driver.disconnect();
        assert!(!conn.is_open());
        assert_eq!(driver.active_transaction(), None);

        conn.open().unwrap();
        assert!(conn.commit(tx).is_err());
    }

    #[test]
    fn test_empty_connection_string_rejected() {
        let driver = InMemoryTestDriver::new();
        assert!(driver.create_connection("  ").is_err());
        assert_eq!(driver.connections_created(), 0);
    }
}
