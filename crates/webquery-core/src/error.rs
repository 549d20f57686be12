use crate::{
    coerce::CoerceError, compile::CompileError, functions::DispatchError, lex::LexError,
    parse::ParseError, resolve::ResolveError,
};
use thiserror::Error as ThisError;

///
/// QueryError
///
/// Aggregate error surfaced at the crate boundary. Every variant is a
/// client-input failure scoped to one compilation: nothing is retried,
/// nothing partially compiles, and there is no process-level failure
/// mode in this engine.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum QueryError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Coerce(#[from] CoerceError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}
