pub mod fragment;

use crate::{
    ast::{CompareOp, Comparison, ConstraintNode, Group, GroupOp, ParsedQuery, PropertyPath},
    coerce,
    error::QueryError,
    resolve::{JoinStep, PathResolver, PropertyKind, PropertyRef},
    result::{DEFAULT_LIMIT, OrderClause, ResultConstraint},
    value::Value,
};
use chrono::{DateTime, Utc};
use fragment::{CompiledFragment, FragmentNode, JoinClause};
use thiserror::Error as ThisError;
use webquery_schema::SchemaRegistry;

///
/// Fragment compiler
///
/// Depth-first walk of a [`ParsedQuery`]: paths resolve against the
/// schema registry, literals coerce against declared types (with one
/// evaluation instant per compilation, so `now` means execution time),
/// and each comparison lowers to a [`FragmentNode`]. Traversed
/// relations lazily create LEFT OUTER JOINs with deterministic aliases,
/// deduplicated per distinct join path.
///
/// The compiler itself is stateless across calls; all bookkeeping lives
/// in a per-compilation context.
///

/// Alias of the root entity in emitted fragments.
pub const ROOT_ALIAS: &str = "r0";

///
/// CompileError
///
/// Operator/type mismatches caught while lowering. Like every other
/// error in this crate these are client-input failures: compilation
/// either succeeds completely or rejects the query.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum CompileError {
    #[error("property '{property}' ({declared}) does not support ordering comparisons")]
    NotOrderable { property: String, declared: String },

    #[error("property '{property}' ({declared}) does not support text matching")]
    NotText { property: String, declared: String },

    #[error("range on '{property}' needs at least one bound")]
    EmptyRange { property: String },

    #[error("comparison on '{property}' is missing its operand")]
    MissingOperand { property: String },

    #[error("'{text}' is not a property path: {reason}")]
    BadRefPath { text: String, reason: String },
}

///
/// QueryCompiler
///

pub struct QueryCompiler<'a> {
    resolver: PathResolver<'a>,
}

/// Per-compilation join ledger. Join identity is the full step chain,
/// explicit aliases included, so `owner[a].x` and `owner[b].x` produce
/// two joins while repeated traversal of one path reuses the first.
#[derive(Default)]
struct Joins {
    records: Vec<JoinRecord>,
}

struct JoinRecord {
    key: Vec<JoinStep>,
    clause: JoinClause,
}

impl Joins {
    fn alias_for(&mut self, steps: &[JoinStep]) -> String {
        let mut parent = ROOT_ALIAS.to_string();

        for depth in 1..=steps.len() {
            let key = &steps[..depth];

            if let Some(record) = self.records.iter().find(|r| r.key == key) {
                parent = record.clause.alias.clone();
                continue;
            }

            let alias = format!("j{}", self.records.len());
            let clause = JoinClause {
                path: format!("{parent}.{}", steps[depth - 1].relation),
                alias: alias.clone(),
            };
            self.records.push(JoinRecord {
                key: key.to_vec(),
                clause,
            });
            parent = alias;
        }

        parent
    }

    fn column_for(&mut self, property: &PropertyRef) -> String {
        let alias = self.alias_for(&property.joins);

        match property.kind {
            PropertyKind::CollectionSize => format!("SIZE({alias}.{})", property.name),
            _ => format!("{alias}.{}", property.name),
        }
    }

    fn into_clauses(self) -> Vec<JoinClause> {
        self.records.into_iter().map(|r| r.clause).collect()
    }
}

impl<'a> QueryCompiler<'a> {
    pub fn new(registry: &'a SchemaRegistry, root: &str) -> Result<Self, QueryError> {
        let resolver = PathResolver::new(registry, root)?;

        Ok(Self { resolver })
    }

    /// Compile against the current instant.
    pub fn compile(&self, query: &ParsedQuery) -> Result<ResultConstraint, QueryError> {
        self.compile_at(query, Utc::now())
    }

    /// Compile with an explicit evaluation instant for relative dates.
    pub fn compile_at(
        &self,
        query: &ParsedQuery,
        at: DateTime<Utc>,
    ) -> Result<ResultConstraint, QueryError> {
        let mut joins = Joins::default();
        let mut nodes = Vec::new();

        // Subclass restriction first, mirroring its whole-query scope.
        if let Some(subclass) = &query.subclass {
            let entities = self.resolver.resolve_subclass(subclass)?;
            nodes.push(FragmentNode::TypeIn {
                alias: ROOT_ALIAS.to_string(),
                values: entities.into_iter().map(Value::Text).collect(),
            });
        }

        for node in &query.constraints {
            nodes.push(self.compile_node(node, &mut joins, at)?);
        }

        let mut order = Vec::with_capacity(query.order.len());
        for spec in &query.order {
            let property = self.resolver.resolve(&spec.path)?;
            order.push(OrderClause {
                column: joins.column_for(&property),
                direction: spec.direction,
            });
        }

        let (predicate, params) = fragment::emit(&nodes);
        let fragment = CompiledFragment {
            joins: joins.into_clauses(),
            predicate,
            params,
        };

        tracing::debug!(
            predicate = %fragment.predicate,
            params = fragment.params.len(),
            joins = fragment.joins.len(),
            "compiled webquery"
        );

        Ok(ResultConstraint {
            fragment,
            order,
            offset: query.offset.unwrap_or(0),
            limit: query.limit.unwrap_or(DEFAULT_LIMIT),
            subclass: query.subclass.clone(),
        })
    }

    fn compile_node(
        &self,
        node: &ConstraintNode,
        joins: &mut Joins,
        at: DateTime<Utc>,
    ) -> Result<FragmentNode, QueryError> {
        match node {
            ConstraintNode::Comparison(cmp) => self.compile_comparison(cmp, joins, at),
            ConstraintNode::Group(group) => self.compile_group(group, joins, at),
        }
    }

    fn compile_group(
        &self,
        group: &Group,
        joins: &mut Joins,
        at: DateTime<Utc>,
    ) -> Result<FragmentNode, QueryError> {
        let mut children = Vec::with_capacity(group.children.len());
        for child in &group.children {
            children.push(self.compile_node(child, joins, at)?);
        }

        Ok(match group.op {
            GroupOp::And => FragmentNode::All(children),
            GroupOp::Or => FragmentNode::Any(children),
            GroupOp::Not => {
                let inner = if children.len() == 1 {
                    children.remove(0)
                } else {
                    FragmentNode::Any(children)
                };
                FragmentNode::Not(Box::new(inner))
            }
        })
    }

    fn compile_comparison(
        &self,
        cmp: &Comparison,
        joins: &mut Joins,
        at: DateTime<Utc>,
    ) -> Result<FragmentNode, QueryError> {
        let property = self.resolver.resolve(&cmp.path)?;
        let column = joins.column_for(&property);

        match cmp.op {
            CompareOp::IsNull | CompareOp::NotNull => Ok(FragmentNode::Null {
                column,
                negated: cmp.op == CompareOp::NotNull,
            }),

            CompareOp::Eq | CompareOp::Neq => {
                let values = self.coerce_all(cmp, &property, at)?;
                let negated = cmp.op == CompareOp::Neq;

                if values.len() == 1 {
                    let value = values.into_iter().next().expect("one value");
                    let op = if negated { "!=" } else { "=" };
                    Ok(FragmentNode::Compare { column, op, value })
                } else {
                    Ok(FragmentNode::In {
                        column,
                        values,
                        negated,
                    })
                }
            }

            CompareOp::In | CompareOp::NotIn => {
                let values = self.coerce_all(cmp, &property, at)?;
                Ok(FragmentNode::In {
                    column,
                    values,
                    negated: cmp.op == CompareOp::NotIn,
                })
            }

            CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
                require_orderable(&property)?;
                let value = self.coerce_first(cmp, &property, at)?;
                Ok(FragmentNode::Compare {
                    column,
                    op: ordering_op(cmp.op),
                    value,
                })
            }

            CompareOp::Range => self.compile_range(cmp, &property, column, at),

            CompareOp::Contains
            | CompareOp::NotContains
            | CompareOp::StartsWith
            | CompareOp::NotStartsWith => {
                require_text(&property)?;
                let operand = cmp
                    .values
                    .first()
                    .ok_or_else(|| missing_operand(&property))?;

                let escaped = escape_like(&operand.text);
                let pattern = match cmp.op {
                    CompareOp::Contains | CompareOp::NotContains => format!("%{escaped}%"),
                    _ => format!("{escaped}%"),
                };

                Ok(FragmentNode::Like {
                    column,
                    pattern: Value::Text(pattern),
                    negated: matches!(
                        cmp.op,
                        CompareOp::NotContains | CompareOp::NotStartsWith
                    ),
                })
            }

            CompareOp::EqRef
            | CompareOp::NeqRef
            | CompareOp::GtRef
            | CompareOp::GeRef
            | CompareOp::LtRef
            | CompareOp::LeRef => {
                let operand = cmp
                    .values
                    .first()
                    .ok_or_else(|| missing_operand(&property))?;

                let other_path =
                    PropertyPath::parse(&operand.text).map_err(|reason| CompileError::BadRefPath {
                        text: operand.text.clone(),
                        reason,
                    })?;
                let other = self.resolver.resolve(&other_path)?;
                let right = joins.column_for(&other);

                Ok(FragmentNode::CompareRef {
                    left: column,
                    op: ref_op(cmp.op),
                    right,
                })
            }
        }
    }

    /// Ranges compile per present bound: two-sided to BETWEEN, one-sided
    /// to a single `>=`/`<=`. Collection-size ranges keep identical
    /// per-bound semantics but compare the SIZE expression pairwise.
    fn compile_range(
        &self,
        cmp: &Comparison,
        property: &PropertyRef,
        column: String,
        at: DateTime<Utc>,
    ) -> Result<FragmentNode, QueryError> {
        require_orderable(property)?;

        let (lo, hi) = match cmp.values.as_slice() {
            [lo, hi] => (lo, hi),
            _ => return Err(missing_operand(property).into()),
        };

        if lo.is_empty() && hi.is_empty() {
            return Err(CompileError::EmptyRange {
                property: property.name.clone(),
            }
            .into());
        }

        let coerce_bound = |bound: &crate::ast::Literal| {
            coerce::coerce(&bound.text, &property.declared, at).map_err(QueryError::from)
        };

        if lo.is_empty() {
            return Ok(FragmentNode::Compare {
                column,
                op: "<=",
                value: coerce_bound(hi)?,
            });
        }
        if hi.is_empty() {
            return Ok(FragmentNode::Compare {
                column,
                op: ">=",
                value: coerce_bound(lo)?,
            });
        }

        let lo = coerce_bound(lo)?;
        let hi = coerce_bound(hi)?;

        if property.kind == PropertyKind::CollectionSize {
            return Ok(FragmentNode::All(vec![
                FragmentNode::Compare {
                    column: column.clone(),
                    op: ">=",
                    value: lo,
                },
                FragmentNode::Compare {
                    column,
                    op: "<=",
                    value: hi,
                },
            ]));
        }

        Ok(FragmentNode::Between { column, lo, hi })
    }

    fn coerce_all(
        &self,
        cmp: &Comparison,
        property: &PropertyRef,
        at: DateTime<Utc>,
    ) -> Result<Vec<Value>, QueryError> {
        if cmp.values.is_empty() {
            return Err(missing_operand(property).into());
        }

        cmp.values
            .iter()
            .map(|literal| {
                coerce::coerce(&literal.text, &property.declared, at).map_err(QueryError::from)
            })
            .collect()
    }

    fn coerce_first(
        &self,
        cmp: &Comparison,
        property: &PropertyRef,
        at: DateTime<Utc>,
    ) -> Result<Value, QueryError> {
        let literal = cmp
            .values
            .first()
            .ok_or_else(|| missing_operand(property))?;

        coerce::coerce(&literal.text, &property.declared, at).map_err(QueryError::from)
    }
}

const fn ordering_op(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Gt => ">",
        CompareOp::Ge => ">=",
        CompareOp::Lt => "<",
        _ => "<=",
    }
}

const fn ref_op(op: CompareOp) -> &'static str {
    match op {
        CompareOp::EqRef => "=",
        CompareOp::NeqRef => "!=",
        CompareOp::GtRef => ">",
        CompareOp::GeRef => ">=",
        CompareOp::LtRef => "<",
        _ => "<=",
    }
}

fn require_orderable(property: &PropertyRef) -> Result<(), CompileError> {
    if property.declared.is_orderable() {
        Ok(())
    } else {
        Err(CompileError::NotOrderable {
            property: property.name.clone(),
            declared: property.declared.to_string(),
        })
    }
}

fn require_text(property: &PropertyRef) -> Result<(), CompileError> {
    if property.declared.is_text() {
        Ok(())
    } else {
        Err(CompileError::NotText {
            property: property.name.clone(),
            declared: property.declared.to_string(),
        })
    }
}

fn missing_operand(property: &PropertyRef) -> CompileError {
    CompileError::MissingOperand {
        property: property.name.clone(),
    }
}

/// Escape LIKE metacharacters so caller text cannot widen a
/// contains/starts-with match.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
