use std::fmt;

/// Declared database type of a procedure parameter.
///
/// Drivers use the tag to size and interpret the bound value. Names follow
/// PostgreSQL's type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    VarChar,
    Char,
    Date,
    Timestamp,
    TimestampTz,
    Bytea,
    RefCursor,
}

impl SqlType {
    pub fn name(&self) -> &'static str {
        match self {
            SqlType::Bool => "bool",
            SqlType::Int2 => "int2",
            SqlType::Int4 => "int4",
            SqlType::Int8 => "int8",
            SqlType::Float4 => "float4",
            SqlType::Float8 => "float8",
            SqlType::Numeric => "numeric",
            SqlType::Text => "text",
            SqlType::VarChar => "varchar",
            SqlType::Char => "bpchar",
            SqlType::Date => "date",
            SqlType::Timestamp => "timestamp",
            SqlType::TimestampTz => "timestamptz",
            SqlType::Bytea => "bytea",
            SqlType::RefCursor => "refcursor",
        }
    }

    /// Type expression used in casts, including the size when it applies.
    pub fn cast_expr(&self, size: Option<u32>) -> String {
        match (self, size) {
            (SqlType::VarChar, Some(n)) => format!("varchar({})", n),
            (SqlType::Char, Some(n)) => format!("char({})", n),
            _ => self.name().to_string(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
