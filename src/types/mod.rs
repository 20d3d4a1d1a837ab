mod parameter;
mod sql_type;
mod sql_value;
mod table;

pub use parameter::{Direction, ParameterBinding, Parameters};
pub use sql_type::SqlType;
pub use sql_value::SqlValue;
pub use table::{Row, Table, TableSet};
