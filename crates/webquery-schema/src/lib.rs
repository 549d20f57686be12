//! Schema registry for the WebQuery engine: an explicit, build-time
//! description of queryable entities (properties, relations, search-field
//! aliases, and subclass discriminators).
//!
//! The registry is plain data. It is constructed once at startup — from
//! code, or deserialized from a fixture — validated structurally, and
//! thereafter shared read-only across every compilation. The engine never
//! inspects runtime type metadata; everything it may reference has to be
//! declared here.

pub mod descriptor;
pub mod registry;
pub mod types;

mod validate;

pub use descriptor::{EntityDescriptor, PropertyDescriptor, RelationDescriptor};
pub use registry::{SchemaRegistry, SchemaRegistryBuilder, SharedRegistry};
pub use types::DeclaredType;
pub use validate::{SchemaError, SchemaViolation};

/// Maximum length for entity and property identifiers.
pub const MAX_IDENT_LEN: usize = 64;
