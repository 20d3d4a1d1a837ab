use crate::error::{ProcDbError, Result};
use crate::types::{SqlType, SqlValue};

/// Whether a parameter carries data into the call, out of it, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Input,
    Output,
    InputOutput,
}

impl Direction {
    /// True for parameters whose value is read back after execution.
    pub fn is_output(&self) -> bool {
        matches!(self, Direction::Output | Direction::InputOutput)
    }

    /// True for parameters whose value is sent to the server.
    pub fn is_input(&self) -> bool {
        matches!(self, Direction::Input | Direction::InputOutput)
    }
}

/// One argument of a stored-procedure call.
///
/// The value of an output or input-output binding is overwritten by the
/// session after the call with the value the database returned.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    name: String,
    value: SqlValue,
    declared_type: SqlType,
    direction: Direction,
    size: Option<u32>,
}

impl ParameterBinding {
    /// Create an input binding. Fails if `name` is empty.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<SqlValue>,
        declared_type: SqlType,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ProcDbError::InvalidParameterName);
        }
        Ok(Self {
            name,
            value: value.into(),
            declared_type,
            direction: Direction::Input,
            size: None,
        })
    }

    pub fn input(
        name: impl Into<String>,
        value: impl Into<SqlValue>,
        declared_type: SqlType,
    ) -> Result<Self> {
        Self::new(name, value, declared_type)
    }

    /// Output-only binding; starts out NULL.
    pub fn output(name: impl Into<String>, declared_type: SqlType) -> Result<Self> {
        Ok(Self::new(name, SqlValue::Null, declared_type)?.with_direction(Direction::Output))
    }

    pub fn input_output(
        name: impl Into<String>,
        value: impl Into<SqlValue>,
        declared_type: SqlType,
    ) -> Result<Self> {
        Ok(Self::new(name, value, declared_type)?.with_direction(Direction::InputOutput))
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    pub fn declared_type(&self) -> SqlType {
        self.declared_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn size(&self) -> Option<u32> {
        self.size
    }

    pub(crate) fn set_value(&mut self, value: SqlValue) {
        self.value = value;
    }
}

/// The parameter mapping for a single call.
///
/// Names are unique; iteration follows insertion order so binding is
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    bindings: Vec<ParameterBinding>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Parameters::insert`].
    pub fn with(mut self, binding: ParameterBinding) -> Self {
        self.insert(binding);
        self
    }

    /// Add a binding. A binding with the same name is replaced in place and returned.
    pub fn insert(&mut self, binding: ParameterBinding) -> Option<ParameterBinding> {
        match self.bindings.iter_mut().find(|b| b.name == binding.name) {
            Some(existing) => Some(std::mem::replace(existing, binding)),
            None => {
                self.bindings.push(binding);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// Current value of the named binding.
    pub fn value(&self, name: &str) -> Option<&SqlValue> {
        self.get(name).map(ParameterBinding::value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterBinding> {
        self.bindings.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ParameterBinding> {
        self.bindings.iter_mut()
    }

    /// Name and value of every output and input-output binding.
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.bindings
            .iter()
            .filter(|b| b.direction.is_output())
            .map(|b| (b.name.as_str(), &b.value))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl FromIterator<ParameterBinding> for Parameters {
    fn from_iter<I: IntoIterator<Item = ParameterBinding>>(iter: I) -> Self {
        let mut params = Parameters::new();
        for binding in iter {
            params.insert(binding);
        }
        params
    }
}
