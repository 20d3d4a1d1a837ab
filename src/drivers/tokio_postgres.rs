use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row, Statement};

use crate::command::ProcedureCommand;
use crate::error::{DriverError, ProcDbError};
use crate::traits::{DatabaseDriver, DriverConnection, TransactionHandle};
use crate::types::{SqlType, SqlValue, Table, TableSet};

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Each connection owns a current-thread tokio runtime and blocks on it for
/// every operation. Procedures are invoked with `CALL` using named argument
/// notation; refcursor outputs are fetched as result sets.
///
/// Connections must be used from plain threads. Inside an async runtime
/// every blocking operation fails with a [`DriverError`] instead of running.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPostgresDriver;

impl TokioPostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

impl DatabaseDriver for TokioPostgresDriver {
    fn create_connection(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let config: Config = connection_string.parse().map_err(pg_error)?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(DriverError::from_source)?;

        Ok(Box::new(TokioPostgresConnection {
            config,
            runtime: Some(runtime),
            client: None,
            connection_task: None,
            next_transaction: 0,
            active_transaction: None,
            aborted: false,
        }))
    }
}

struct TokioPostgresConnection {
    config: Config,
    // Only taken in Drop
    runtime: Option<Runtime>,
    client: Option<Client>,
    connection_task: Option<JoinHandle<()>>,
    next_transaction: u64,
    active_transaction: Option<TransactionHandle>,
    /// A statement failed inside the active transaction; the server will
    /// refuse everything until it ends and turns COMMIT into a rollback.
    aborted: bool,
}

impl TokioPostgresConnection {
    fn runtime(&self) -> Result<&Runtime, DriverError> {
        if Handle::try_current().is_ok() {
            return Err(DriverError::new(
                "blocking PostgreSQL calls cannot run inside an async runtime",
            ));
        }
        self.runtime
            .as_ref()
            .ok_or_else(|| DriverError::new("connection runtime has shut down"))
    }

    fn client(&self) -> Result<&Client, DriverError> {
        self.client
            .as_ref()
            .filter(|client| !client.is_closed())
            .ok_or_else(|| DriverError::new("connection is not open"))
    }

    fn batch(&self, sql: &str) -> Result<(), DriverError> {
        let runtime = self.runtime()?;
        let client = self.client()?;
        runtime.block_on(client.batch_execute(sql)).map_err(pg_error)
    }

    fn take_active(&mut self, transaction: TransactionHandle) -> Result<(), DriverError> {
        if self.active_transaction != Some(transaction) {
            return Err(DriverError::new(format!(
                "transaction {} is not active on this connection",
                transaction.id()
            )));
        }
        self.active_transaction = None;
        Ok(())
    }
}

impl DriverConnection for TokioPostgresConnection {
    fn is_open(&self) -> bool {
        self.client().is_ok()
    }

    fn open(&mut self) -> Result<(), DriverError> {
        let runtime = self.runtime()?;
        let (client, connection) = runtime
            .block_on(self.config.connect(NoTls))
            .map_err(pg_error)?;

        // Driven by the runtime whenever a call blocks on it
        let task = runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "PostgreSQL connection error");
            }
        });

        self.client = Some(client);
        self.connection_task = Some(task);
        self.active_transaction = None;
        self.aborted = false;
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<TransactionHandle, DriverError> {
        if self.active_transaction.is_some() {
            return Err(DriverError::new("a transaction is already in progress"));
        }
        self.batch("BEGIN")?;
        self.next_transaction += 1;
        let handle = TransactionHandle::new(self.next_transaction);
        self.active_transaction = Some(handle);
        self.aborted = false;
        Ok(handle)
    }

    fn commit(&mut self, transaction: TransactionHandle) -> Result<(), DriverError> {
        self.take_active(transaction)?;
        if std::mem::take(&mut self.aborted) {
            self.batch("ROLLBACK")?;
            return Err(DriverError::new(
                "transaction was aborted by a failed statement and has been rolled back",
            ));
        }
        self.batch("COMMIT")
    }

    fn rollback(&mut self, transaction: TransactionHandle) -> Result<(), DriverError> {
        self.take_active(transaction)?;
        self.aborted = false;
        self.batch("ROLLBACK")
    }

    fn release_transaction(&mut self, transaction: TransactionHandle) {
        if self.active_transaction == Some(transaction) {
            self.active_transaction = None;
            self.aborted = false;
        }
    }

    fn execute(&mut self, command: &mut ProcedureCommand) -> Result<TableSet, DriverError> {
        if let Some(handle) = command.transaction() {
            if self.active_transaction != Some(handle) {
                return Err(DriverError::new(format!(
                    "transaction {} is not active on this connection",
                    handle.id()
                )));
            }
        }

        let call = build_call(command)?;
        let in_transaction = self.active_transaction.is_some();
        // Cursors only live until the end of the transaction that opened them
        let implicit_transaction = !in_transaction && call.returns_cursors;
        let runtime = self.runtime()?;
        let client = self.client()?;

        tracing::debug!(sql = %call.sql, implicit_transaction, "issuing CALL");
        let outcome = runtime.block_on(async {
            if implicit_transaction {
                client.batch_execute("BEGIN").await.map_err(pg_error)?;
            }
            let outcome = run_call(client, command, &call).await;
            if implicit_transaction {
                match outcome {
                    Ok(_) => client.batch_execute("COMMIT").await.map_err(pg_error)?,
                    Err(_) => {
                        if let Err(e) = client.batch_execute("ROLLBACK").await {
                            tracing::warn!(error = %e, "rollback after failed CALL failed");
                        }
                    }
                }
            }
            outcome
        });

        if outcome.is_err() && in_transaction {
            tracing::debug!("CALL failed inside a transaction; it can only be rolled back");
            self.aborted = true;
        }
        outcome
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.active_transaction = None;
        self.aborted = false;
        self.runtime()?;
        // Dropping the client lets the connection task send Terminate and finish
        drop(self.client.take());
        if let Some(task) = self.connection_task.take() {
            self.runtime()?
                .block_on(task)
                .map_err(DriverError::from_source)?;
        }
        Ok(())
    }
}

impl Drop for TokioPostgresConnection {
    fn drop(&mut self) {
        // Dropping a runtime from async context panics; this does not
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Prefer the server's own message over tokio-postgres' generic "db error".
fn pg_error(error: tokio_postgres::Error) -> DriverError {
    match error.as_db_error().map(|db| db.message().to_string()) {
        Some(message) => DriverError::with_source(message, error),
        None => DriverError::from_source(error),
    }
}

/// A prepared `CALL` with its parameter values.
struct CallStatement {
    sql: String,
    params: Vec<BoxedParam>,
    returns_cursors: bool,
}

fn build_call(command: &ProcedureCommand) -> Result<CallStatement, DriverError> {
    let mut args = Vec::with_capacity(command.parameters().len());
    let mut params: Vec<BoxedParam> = Vec::new();

    for param in command.parameters() {
        let cast = param.sql_type.cast_expr(param.size);
        let placeholder = if param.direction.is_input() {
            params.push(to_sql_param(&param.value, param.sql_type)?);
            match param.sql_type {
                // refcursor has no binary ToSql; send the cursor name as text
                SqlType::RefCursor => format!("${}::text::refcursor", params.len()),
                _ => format!("${}::{}", params.len(), cast),
            }
        } else {
            format!("NULL::{}", cast)
        };
        args.push(format!("{} => {}", quote_ident(&param.name), placeholder));
    }

    Ok(CallStatement {
        sql: format!(
            "CALL {}({})",
            quote_qualified(command.procedure()),
            args.join(", ")
        ),
        params,
        returns_cursors: command
            .output_parameters()
            .any(|p| p.sql_type == SqlType::RefCursor),
    })
}

async fn run_call(
    client: &Client,
    command: &mut ProcedureCommand,
    call: &CallStatement,
) -> Result<TableSet, DriverError> {
    let param_refs: Vec<&(dyn ToSql + Sync)> = call
        .params
        .iter()
        .map(|b| b.as_ref() as &(dyn ToSql + Sync))
        .collect();

    let statement = client
        .prepare(&call.sql)
        .await
        .map_err(pg_error)?;
    let rows = client
        .query(&statement, &param_refs)
        .await
        .map_err(pg_error)?;

    let outputs: Vec<(String, SqlType)> = command
        .output_parameters()
        .map(|p| (p.name.clone(), p.sql_type))
        .collect();

    let mut cursors = Vec::new();
    if let Some(row) = rows.first() {
        for (name, sql_type) in outputs {
            let Some(index) = row.columns().iter().position(|c| c.name() == name) else {
                continue;
            };
            let value = column_value(row, index)?;
            if sql_type == SqlType::RefCursor {
                if let Some(cursor) = value.as_str() {
                    cursors.push(cursor.to_string());
                }
            }
            command.set_output(name, value);
        }
    }

    let mut tables = TableSet::default();
    if cursors.is_empty() {
        if !rows.is_empty() {
            tables.push(rows_to_table(&statement, &rows)?);
        }
    } else {
        for cursor in cursors {
            let fetch = client
                .prepare(&format!("FETCH ALL FROM {}", quote_ident(&cursor)))
                .await
                .map_err(pg_error)?;
            let rows = client
                .query(&fetch, &[])
                .await
                .map_err(pg_error)?;
            tables.push(rows_to_table(&fetch, &rows)?);
        }
    }
    Ok(tables)
}

fn rows_to_table(statement: &Statement, rows: &[Row]) -> Result<Table, DriverError> {
    let columns = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let values = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|i| column_value(row, i))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<Vec<SqlValue>>, DriverError>>()?;
    Ok(Table::new(columns, values))
}

/// Name of an open cursor, as returned in a refcursor column.
struct CursorName(String);

impl<'a> FromSql<'a> for CursorName {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(CursorName(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::REFCURSOR
    }
}

/// Binary wire value of a column with no dedicated mapping.
struct RawValue(Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawValue(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Convert the value at a given index to an SqlValue, NULL-aware.
fn column_value(row: &Row, index: usize) -> Result<SqlValue, DriverError> {
    let ty = row.columns()[index].type_();
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(index).map(SqlValue::from),
        Type::INT2 => row.try_get::<_, Option<i16>>(index).map(SqlValue::from),
        Type::INT4 => row.try_get::<_, Option<i32>>(index).map(SqlValue::from),
        Type::INT8 => row.try_get::<_, Option<i64>>(index).map(SqlValue::from),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(index).map(SqlValue::from),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(index).map(SqlValue::from),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(index).map(SqlValue::from),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(index).map(SqlValue::from)
        }
        Type::REFCURSOR => row
            .try_get::<_, Option<CursorName>>(index)
            .map(|c| SqlValue::from(c.map(|c| c.0))),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(index).map(SqlValue::from),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(index).map(SqlValue::from),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map(SqlValue::from),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)
            .map(SqlValue::from),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(index)
            .map(|u| SqlValue::from(u.map(|u| u.to_string()))),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(index)
            .map(|doc| SqlValue::from(doc.map(|doc| doc.to_string()))),
        _ => row
            .try_get::<_, Option<RawValue>>(index)
            .map(|raw| fallback_value(ty, raw.map(|r| r.0))),
    };
    value.map_err(pg_error)
}

/// Enum labels travel as text; anything else is handed back as raw bytes.
fn fallback_value(ty: &Type, raw: Option<Vec<u8>>) -> SqlValue {
    let Some(bytes) = raw else {
        return SqlValue::Null;
    };
    if matches!(ty.kind(), Kind::Enum(_)) {
        if let Ok(label) = String::from_utf8(bytes.clone()) {
            return SqlValue::Text(label);
        }
    }
    tracing::debug!(column_type = ty.name(), "no mapping for column type; returning bytes");
    SqlValue::Bytes(bytes)
}

/// Convert a value to the Rust type tokio-postgres expects for the declared type.
fn to_sql_param(value: &SqlValue, declared: SqlType) -> Result<BoxedParam, DriverError> {
    if value.is_null() {
        return Ok(typed_null(declared));
    }

    let mismatch = || {
        DriverError::from_source(ProcDbError::TypeMismatch {
            value: format!("{:?}", value),
            declared,
        })
    };

    let param: BoxedParam = match (declared, value) {
        (SqlType::Bool, SqlValue::Bool(b)) => Box::new(*b),
        (SqlType::Int2, v) => {
            let n = v.as_i64().ok_or_else(mismatch)?;
            Box::new(i16::try_from(n).map_err(|_| mismatch())?)
        }
        (SqlType::Int4, v) => {
            let n = v.as_i64().ok_or_else(mismatch)?;
            Box::new(i32::try_from(n).map_err(|_| mismatch())?)
        }
        (SqlType::Int8, v) => Box::new(v.as_i64().ok_or_else(mismatch)?),
        (SqlType::Float4, SqlValue::Float32(f)) => Box::new(*f),
        (SqlType::Float8, SqlValue::Float32(f)) => Box::new(f64::from(*f)),
        (SqlType::Float8, SqlValue::Float64(f)) => Box::new(*f),
        (SqlType::Numeric, SqlValue::Decimal(d)) => Box::new(*d),
        (SqlType::Numeric, v) => Box::new(Decimal::from(v.as_i64().ok_or_else(mismatch)?)),
        (
            SqlType::Text | SqlType::VarChar | SqlType::Char | SqlType::RefCursor,
            SqlValue::Text(s),
        ) => Box::new(s.clone()),
        (SqlType::Bytea, SqlValue::Bytes(b)) => Box::new(b.clone()),
        (SqlType::Date, SqlValue::Date(d)) => Box::new(*d),
        (SqlType::Timestamp, SqlValue::Timestamp(ts)) => Box::new(*ts),
        (SqlType::TimestampTz, SqlValue::TimestampTz(ts)) => Box::new(*ts),
        _ => return Err(mismatch()),
    };
    Ok(param)
}

fn typed_null(declared: SqlType) -> BoxedParam {
    match declared {
        SqlType::Bool => Box::new(None::<bool>),
        SqlType::Int2 => Box::new(None::<i16>),
        SqlType::Int4 => Box::new(None::<i32>),
        SqlType::Int8 => Box::new(None::<i64>),
        SqlType::Float4 => Box::new(None::<f32>),
        SqlType::Float8 => Box::new(None::<f64>),
        SqlType::Numeric => Box::new(None::<Decimal>),
        SqlType::Text | SqlType::VarChar | SqlType::Char | SqlType::RefCursor => {
            Box::new(None::<String>)
        }
        SqlType::Bytea => Box::new(None::<Vec<u8>>),
        SqlType::Date => Box::new(None::<NaiveDate>),
        SqlType::Timestamp => Box::new(None::<NaiveDateTime>),
        SqlType::TimestampTz => Box::new(None::<DateTime<Utc>>),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote each dot-separated part of a possibly schema-qualified name.
fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}
