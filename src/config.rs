//! Session configuration.

use std::env;

use crate::error::{ProcDbError, Result};

/// Environment variable checked first by [`SessionConfig::from_env`].
pub const DATABASE_URL_ENV: &str = "PROCDB_DATABASE_URL";

/// Fallback environment variable.
pub const FALLBACK_DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Settings a [`DbSession`](crate::DbSession) is constructed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    connection_string: String,
}

impl SessionConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
        }
    }

    /// Read the connection string from `PROCDB_DATABASE_URL`, then `DATABASE_URL`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        [DATABASE_URL_ENV, FALLBACK_DATABASE_URL_ENV]
            .into_iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
            .map(Self::new)
            .ok_or_else(|| {
                ProcDbError::Config(format!(
                    "neither {} nor {} is set",
                    DATABASE_URL_ENV, FALLBACK_DATABASE_URL_ENV
                ))
            })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}
