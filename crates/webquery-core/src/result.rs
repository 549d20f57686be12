use crate::{ast::Direction, compile::fragment::CompiledFragment};

///
/// Result constraint boundary
///
/// [`ResultConstraint`] is the sole object crossing from this engine to
/// the persistence collaborator: a compiled fragment with positionally
/// bound parameters, the compiled ordering, pagination, and the
/// subclass filter. It is constructed per request, immutable, and
/// carries no connection or transaction state.
///

/// Limit applied when the caller does not supply one.
pub const DEFAULT_LIMIT: u32 = 200;

///
/// OrderClause
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderClause {
    /// Resolved column expression, e.g. `r0.name` or `j0.id`.
    pub column: String,
    pub direction: Direction,
}

///
/// ResultConstraint
///

#[derive(Clone, Debug, PartialEq)]
pub struct ResultConstraint {
    pub fragment: CompiledFragment,
    pub order: Vec<OrderClause>,
    pub offset: u32,
    pub limit: u32,
    pub subclass: Option<String>,
}

///
/// ResultPage
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResultPage<R> {
    pub rows: Vec<R>,
    /// Total matching row count, when the executor computed one.
    pub total: Option<u64>,
}

///
/// ConstrainedQueryExecutor
///
/// The injected "execute constrained query" capability. Implementations
/// live in the persistence layer and must bind `fragment.params`
/// positionally — never by splicing values into query text.
///

pub trait ConstrainedQueryExecutor {
    type Row;
    type Error;

    fn execute(
        &self,
        constraint: &ResultConstraint,
    ) -> Result<ResultPage<Self::Row>, Self::Error>;

    fn count(&self, constraint: &ResultConstraint) -> Result<u64, Self::Error>;
}
