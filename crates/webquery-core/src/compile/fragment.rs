use crate::value::Value;
use std::fmt::Write;

///
/// Fragment AST
///
/// The compiled form of one constraint: a tree of typed nodes carrying
/// column expressions and *values*, never interpolated text. A
/// backend-specific emitter serializes the tree; the default emitter
/// below produces an HQL-flavoured string with positional `?`
/// placeholders, binding values in exactly the order placeholders are
/// written.
///

#[derive(Clone, Debug, PartialEq)]
pub enum FragmentNode {
    /// `column OP ?`
    Compare {
        column: String,
        op: &'static str,
        value: Value,
    },

    /// `left OP right` — both sides are resolved columns; no binding.
    CompareRef {
        left: String,
        op: &'static str,
        right: String,
    },

    /// `column BETWEEN ? AND ?`
    Between {
        column: String,
        lo: Value,
        hi: Value,
    },

    /// `column [NOT] IN (?, ...)`
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },

    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },

    /// `column [NOT] LIKE ?` — the pattern is prebuilt (and escaped) by
    /// the compiler.
    Like {
        column: String,
        pattern: Value,
        negated: bool,
    },

    /// `TYPE(alias) = ?` / `TYPE(alias) IN (?, ...)` — discriminator
    /// restriction to concrete subtypes.
    TypeIn { alias: String, values: Vec<Value> },

    All(Vec<FragmentNode>),
    Any(Vec<FragmentNode>),
    Not(Box<FragmentNode>),
}

///
/// JoinClause
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JoinClause {
    /// Source path of the join, e.g. `r0.owner`.
    pub path: String,
    /// Generated alias, e.g. `j0`.
    pub alias: String,
}

impl JoinClause {
    /// Default rendering of the join for the executing backend.
    #[must_use]
    pub fn render(&self) -> String {
        format!("LEFT OUTER JOIN {} {}", self.path, self.alias)
    }
}

///
/// CompiledFragment
///
/// Invariant: the number of `?` placeholders in `predicate` equals
/// `params.len()`, and parameter order matches placeholder order.
///

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledFragment {
    pub joins: Vec<JoinClause>,
    /// Predicate text with positional placeholders; empty matches all.
    pub predicate: String,
    pub params: Vec<Value>,
}

/// Serialize fragment nodes, joining the top level with AND.
pub(crate) fn emit(nodes: &[FragmentNode]) -> (String, Vec<Value>) {
    let mut emitter = Emitter::default();

    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            emitter.text.push_str(" AND ");
        }
        emitter.emit(node);
    }

    (emitter.text, emitter.params)
}

#[derive(Default)]
struct Emitter {
    text: String,
    params: Vec<Value>,
}

impl Emitter {
    fn bind(&mut self, value: &Value) {
        self.params.push(value.clone());
        self.text.push('?');
    }

    fn emit(&mut self, node: &FragmentNode) {
        match node {
            FragmentNode::Compare { column, op, value } => {
                let _ = write!(self.text, "{column} {op} ");
                self.bind(value);
            }
            FragmentNode::CompareRef { left, op, right } => {
                let _ = write!(self.text, "{left} {op} {right}");
            }
            FragmentNode::Between { column, lo, hi } => {
                let _ = write!(self.text, "{column} BETWEEN ");
                self.bind(lo);
                self.text.push_str(" AND ");
                self.bind(hi);
            }
            FragmentNode::In {
                column,
                values,
                negated,
            } => {
                let keyword = if *negated { "NOT IN" } else { "IN" };
                let _ = write!(self.text, "{column} {keyword} (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.text.push_str(", ");
                    }
                    self.bind(value);
                }
                self.text.push(')');
            }
            FragmentNode::Null { column, negated } => {
                let keyword = if *negated { "IS NOT NULL" } else { "IS NULL" };
                let _ = write!(self.text, "{column} {keyword}");
            }
            FragmentNode::Like {
                column,
                pattern,
                negated,
            } => {
                let keyword = if *negated { "NOT LIKE" } else { "LIKE" };
                let _ = write!(self.text, "{column} {keyword} ");
                self.bind(pattern);
            }
            FragmentNode::TypeIn { alias, values } => {
                if let [value] = values.as_slice() {
                    let _ = write!(self.text, "TYPE({alias}) = ");
                    self.bind(value);
                } else {
                    let _ = write!(self.text, "TYPE({alias}) IN (");
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            self.text.push_str(", ");
                        }
                        self.bind(value);
                    }
                    self.text.push(')');
                }
            }
            FragmentNode::All(children) => self.emit_group(children, " AND "),
            FragmentNode::Any(children) => self.emit_group(children, " OR "),
            FragmentNode::Not(inner) => {
                // Multi-child groups parenthesize themselves.
                if matches!(
                    inner.as_ref(),
                    FragmentNode::All(c) | FragmentNode::Any(c) if c.len() > 1
                ) {
                    self.text.push_str("NOT ");
                    self.emit(inner);
                } else {
                    self.text.push_str("NOT (");
                    self.emit(inner);
                    self.text.push(')');
                }
            }
        }
    }

    fn emit_group(&mut self, children: &[FragmentNode], joiner: &str) {
        if let [single] = children {
            self.emit(single);
            return;
        }

        self.text.push('(');
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                self.text.push_str(joiner);
            }
            self.emit(child);
        }
        self.text.push(')');
    }
}
