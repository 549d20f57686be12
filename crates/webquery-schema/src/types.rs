use serde::{Deserialize, Serialize};
use std::fmt;

///
/// DeclaredType
///
/// The declared type of a queryable property. This is deliberately
/// smaller than any storage-side type system: it exists only to drive
/// literal coercion, operator validity, and orderability.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredType {
    Int,
    Decimal,
    Bool,
    Text,
    DateTime,
    Uuid,
    Enum { variants: Vec<String> },
}

impl DeclaredType {
    /// Whether values of this type admit `<` / `>` / range comparisons.
    #[must_use]
    pub const fn is_orderable(&self) -> bool {
        match self {
            Self::Int | Self::Decimal | Self::Text | Self::DateTime => true,
            Self::Bool | Self::Uuid | Self::Enum { .. } => false,
        }
    }

    /// Whether `LIKE`-family operators (contains / starts-with) apply.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text)
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Int => "int",
            Self::Decimal => "decimal",
            Self::Bool => "bool",
            Self::Text => "text",
            Self::DateTime => "datetime",
            Self::Uuid => "uuid",
            Self::Enum { .. } => "enum",
        };
        write!(f, "{label}")
    }
}
