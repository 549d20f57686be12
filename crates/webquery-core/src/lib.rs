//! WebQuery engine: compiles a REST-facing dynamic filter language into
//! parameterized query fragments against an explicit entity schema.
//!
//! Two input surfaces feed one pipeline:
//!
//! - the textual grammar (`id=1 and (name=foo or title=dr) order by id`),
//!   handled by [`lex`] and [`parse`];
//! - the HTTP parameter convention (`_f_eq_`, `_null`, `_f_range_`),
//!   handled by [`params`] via the restriction table in [`functions`].
//!
//! Both produce a [`ast::ParsedQuery`], which [`compile`] resolves
//! against a [`webquery_schema::SchemaRegistry`] and lowers into a
//! [`result::ResultConstraint`]: a backend-agnostic fragment with
//! positionally bound values, ordering, and pagination. Execution is the
//! caller's concern, behind [`result::ConstrainedQueryExecutor`].
//!
//! The engine is purely functional per request: no I/O, no shared
//! mutable state. A registry snapshot may be shared by reference across
//! any number of concurrent compilations.

pub mod ast;
pub mod coerce;
pub mod compile;
pub mod functions;
pub mod lex;
pub mod params;
pub mod parse;
pub mod resolve;
pub mod result;
pub mod value;

mod error;


pub use error::QueryError;

pub mod prelude {
    pub use crate::{
        ast::{Comparison, CompareOp, ConstraintNode, Direction, ParsedQuery, PropertyPath},
        compile::QueryCompiler,
        error::QueryError,
        result::{ConstrainedQueryExecutor, ResultConstraint},
        value::Value,
    };
    pub use webquery_schema::{
        DeclaredType, EntityDescriptor, PropertyDescriptor, RelationDescriptor, SchemaRegistry,
    };
}
