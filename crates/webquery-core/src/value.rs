use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

///
/// Value
///
/// A literal after coercion against a property's declared type. Values
/// are only ever bound positionally into a compiled fragment; they are
/// never interpolated into fragment text.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Decimal(f64),
    Bool(bool),
    Text(String),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    /// Canonical variant name of a declared enum type.
    Enum(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) | Self::Enum(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Uuid(v) => write!(f, "{v}"),
        }
    }
}
