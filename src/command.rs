use std::collections::HashMap;

use crate::error::{ProcDbError, Result};
use crate::traits::TransactionHandle;
use crate::types::{Direction, ParameterBinding, SqlType, SqlValue};

/// A parameter as bound onto a command.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub sql_type: SqlType,
    pub value: SqlValue,
    pub direction: Direction,
    pub size: Option<u32>,
}

impl BoundParameter {
    pub fn new(name: impl Into<String>, sql_type: SqlType, value: SqlValue) -> Self {
        Self {
            name: name.into(),
            sql_type,
            value,
            direction: Direction::Input,
            size: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }
}

impl From<&ParameterBinding> for BoundParameter {
    fn from(binding: &ParameterBinding) -> Self {
        Self {
            name: binding.name().to_string(),
            sql_type: binding.declared_type(),
            value: binding.value().clone(),
            direction: binding.direction(),
            size: binding.size(),
        }
    }
}

/// A callable stored-procedure command, scoped to a single execution.
///
/// The session builds it, the driver executes it and records the values of
/// output parameters on it, and the session reads those values back.
#[derive(Debug, Clone)]
pub struct ProcedureCommand {
    procedure: String,
    transaction: Option<TransactionHandle>,
    parameters: Vec<BoundParameter>,
    outputs: HashMap<String, SqlValue>,
}

impl ProcedureCommand {
    pub fn new(procedure: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
            transaction: None,
            parameters: Vec::new(),
            outputs: HashMap::new(),
        }
    }

    pub fn attach_transaction(&mut self, transaction: TransactionHandle) {
        self.transaction = Some(transaction);
    }

    pub fn bind(&mut self, parameter: BoundParameter) {
        self.parameters.push(parameter);
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn transaction(&self) -> Option<TransactionHandle> {
        self.transaction
    }

    pub fn parameters(&self) -> &[BoundParameter] {
        &self.parameters
    }

    /// Output and input-output parameters, in binding order.
    pub fn output_parameters(&self) -> impl Iterator<Item = &BoundParameter> {
        self.parameters.iter().filter(|p| p.direction.is_output())
    }

    /// Record the post-execution value of a parameter. Called by drivers.
    pub fn set_output(&mut self, name: impl Into<String>, value: SqlValue) {
        self.outputs.insert(name.into(), value);
    }

    /// Post-execution value of the named parameter.
    pub fn output_value(&self, name: &str) -> Result<&SqlValue> {
        self.outputs
            .get(name)
            .ok_or_else(|| ProcDbError::OutputParameterMissing(name.to_string()))
    }
}
