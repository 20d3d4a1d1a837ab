//! procdb - A session layer for calling stored procedures with typed,
//! directional parameters
//!
//! # Example
//! ```ignore
//! use procdb::{DbSession, ParameterBinding, Parameters, SqlType};
//!
//! // Nothing is opened until the first call
//! let mut session = DbSession::new("postgres://localhost/bank");
//!
//! let mut params = Parameters::new()
//!     .with(ParameterBinding::input("account_id", 42, SqlType::Int4)?)
//!     .with(ParameterBinding::output("status", SqlType::VarChar)?.with_size(16));
//!
//! session.begin_transaction()?;
//! let balance = session.execute_procedure_to_scalar("get_balance", Some(&mut params))?;
//! session.commit_transaction()?;
//!
//! let status = params.value("status");
//! session.close()?;
//! ```

pub mod command;
pub mod config;
pub mod drivers;
pub mod error;
pub mod traits;
pub mod types;

mod session;

// Re-export main types for convenient access
pub use command::{BoundParameter, ProcedureCommand};
pub use config::SessionConfig;
pub use error::{DriverError, ProcDbError, Result, TransactionOperation};
pub use session::DbSession;
pub use traits::{DatabaseDriver, DriverConnection, TransactionHandle};
pub use types::{Direction, ParameterBinding, Parameters, Row, SqlType, SqlValue, Table, TableSet};
