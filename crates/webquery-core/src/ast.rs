use std::fmt;

///
/// Constraint AST
///
/// Pure, schema-agnostic representation of a parsed query: a tree of
/// comparisons and boolean groups, an ordering list, and an optional
/// subclass filter. Nothing here touches the schema registry — paths
/// stay unresolved and literals stay raw strings until compilation, so
/// `now`-relative values are only evaluated at execution time.
///

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Neq,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Range,
    IsNull,
    NotNull,
    EqRef,
    NeqRef,
    GtRef,
    GeRef,
    LtRef,
    LeRef,
}

impl CompareOp {
    /// Canonical uppercase rendering used by the round-trip form.
    #[must_use]
    pub const fn render(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Contains => "~=",
            Self::NotContains => "NOT CONTAINS",
            Self::StartsWith => "STARTS",
            Self::NotStartsWith => "NOT STARTS",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Range => "BETWEEN",
            Self::IsNull => "IS NULL",
            Self::NotNull => "IS NOT NULL",
            Self::EqRef => "EQREF",
            Self::NeqRef => "NEQREF",
            Self::GtRef => "GTREF",
            Self::GeRef => "GEREF",
            Self::LtRef => "LTREF",
            Self::LeRef => "LEREF",
        }
    }

    /// The inverse operator, where one exists. Ranges and ordering
    /// property-reference comparisons have no single-operator inverse and
    /// are negated structurally instead.
    #[must_use]
    pub const fn invert(self) -> Option<Self> {
        match self {
            Self::Eq => Some(Self::Neq),
            Self::Neq => Some(Self::Eq),
            Self::Contains => Some(Self::NotContains),
            Self::NotContains => Some(Self::Contains),
            Self::StartsWith => Some(Self::NotStartsWith),
            Self::NotStartsWith => Some(Self::StartsWith),
            Self::Gt => Some(Self::Le),
            Self::Le => Some(Self::Gt),
            Self::Ge => Some(Self::Lt),
            Self::Lt => Some(Self::Ge),
            Self::In => Some(Self::NotIn),
            Self::NotIn => Some(Self::In),
            Self::IsNull => Some(Self::NotNull),
            Self::NotNull => Some(Self::IsNull),
            Self::EqRef => Some(Self::NeqRef),
            Self::NeqRef => Some(Self::EqRef),
            Self::Range
            | Self::GtRef
            | Self::GeRef
            | Self::LtRef
            | Self::LeRef => None,
        }
    }

    /// Whether the right-hand side names another property rather than a
    /// literal value.
    #[must_use]
    pub const fn is_property_ref(self) -> bool {
        matches!(
            self,
            Self::EqRef | Self::NeqRef | Self::GtRef | Self::GeRef | Self::LtRef | Self::LeRef
        )
    }

    /// Number of literal operands the operator takes: 0 for the null
    /// tests, 2 for ranges, otherwise 1 (IN takes 1-or-more).
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::IsNull | Self::NotNull => 0,
            Self::Range => 2,
            _ => 1,
        }
    }
}

///
/// Literal
///
/// A raw operand as written by the caller. The quoting flag is kept so
/// canonical rendering can reproduce the caller's form and so coercion
/// can distinguish the quoted-text case where it matters.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Literal {
    pub text: String,
    pub quoted: bool,
}

impl Literal {
    #[must_use]
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    #[must_use]
    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }

    /// An empty literal marks the open side of a one-sided range.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.quoted && self.text.is_empty()
    }

    fn needs_quotes(&self) -> bool {
        self.quoted
            || self.text.is_empty()
            || self
                .text
                .chars()
                .any(|c| !(c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '-' | '+')))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.needs_quotes() {
            write!(f, "\"{}\"", self.text.replace('\\', "\\\\").replace('"', "\\\""))
        } else {
            write!(f, "{}", self.text)
        }
    }
}

///
/// PathSegment
///

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PathSegment {
    pub name: String,
    /// Explicit join alias (`owner[o]`) for disambiguating repeated
    /// joins to the same related entity.
    pub alias: Option<String>,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}[{alias}]", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

///
/// PropertyPath
///

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PropertyPath {
    pub segments: Vec<PathSegment>,
}

impl PropertyPath {
    /// Parse a dotted path with optional `[alias]` suffixes.
    pub fn parse(text: &str) -> Result<Self, String> {
        if text.is_empty() {
            return Err("empty property path".to_string());
        }

        let mut segments = Vec::new();
        for part in text.split('.') {
            segments.push(Self::parse_segment(part)?);
        }

        Ok(Self { segments })
    }

    fn parse_segment(part: &str) -> Result<PathSegment, String> {
        let (name, alias) = match part.find('[') {
            Some(open) => {
                let Some(rest) = part[open + 1..].strip_suffix(']') else {
                    return Err(format!("malformed path segment '{part}'"));
                };
                if rest.is_empty() {
                    return Err(format!("empty join alias in '{part}'"));
                }
                (&part[..open], rest)
            }
            None => (part, ""),
        };

        if name.is_empty() {
            return Err(format!("empty path segment in '{part}'"));
        }

        Ok(PathSegment {
            name: name.to_string(),
            alias: (!alias.is_empty()).then(|| alias.to_string()),
        })
    }

    #[must_use]
    pub fn last(&self) -> &PathSegment {
        // parse() guarantees at least one segment
        self.segments.last().expect("non-empty path")
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, ".")?;
            }
            first = false;
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

///
/// Comparison
///
/// A single field constraint. `values` holds the literal operands:
/// empty for the null tests, exactly two for ranges (an empty literal
/// marks an open side), one or more for IN, one otherwise.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comparison {
    pub path: PropertyPath,
    pub op: CompareOp,
    pub values: Vec<Literal>,
}

impl Comparison {
    #[must_use]
    pub fn new(path: PropertyPath, op: CompareOp, values: Vec<Literal>) -> Self {
        Self { path, op, values }
    }

    fn render(&self, out: &mut String) {
        use fmt::Write;

        match self.op {
            CompareOp::IsNull | CompareOp::NotNull => {
                let _ = write!(out, "{} {}", self.path, self.op.render());
            }
            CompareOp::In | CompareOp::NotIn => {
                self.render_list(out, self.op.render());
            }
            // Multi-valued equality is an implicit IN.
            CompareOp::Eq if self.values.len() > 1 => {
                self.render_list(out, CompareOp::In.render());
            }
            CompareOp::Range => {
                let lo = &self.values[0];
                let hi = &self.values[1];
                if lo.is_empty() {
                    let _ = write!(out, "{} {} {hi}", self.path, CompareOp::Le.render());
                } else if hi.is_empty() {
                    let _ = write!(out, "{} {} {lo}", self.path, CompareOp::Ge.render());
                } else {
                    let _ = write!(out, "{} BETWEEN {lo} AND {hi}", self.path);
                }
            }
            CompareOp::EqRef
            | CompareOp::NeqRef
            | CompareOp::GtRef
            | CompareOp::GeRef
            | CompareOp::LtRef
            | CompareOp::LeRef => {
                let _ = write!(
                    out,
                    "{} {} {}",
                    self.path,
                    self.op.render(),
                    self.values[0].text
                );
            }
            _ => {
                let _ = write!(out, "{} {} {}", self.path, self.op.render(), self.values[0]);
            }
        }
    }

    fn render_list(&self, out: &mut String, op: &str) {
        use fmt::Write;

        let _ = write!(out, "{} {op}(", self.path);
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{value}");
        }
        out.push(')');
    }
}

///
/// GroupOp
///
/// `Not` is the natively negated group: it renders as
/// `NOT(child OR child ...)` and exists because the compiled target can
/// express NOT over a disjunction but not over a conjunction.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GroupOp {
    And,
    Or,
    Not,
}

///
/// Group
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Group {
    pub op: GroupOp,
    pub children: Vec<ConstraintNode>,
}

impl Group {
    #[must_use]
    pub fn new(op: GroupOp, children: Vec<ConstraintNode>) -> Self {
        Self { op, children }
    }

    fn render(&self, out: &mut String) {
        match self.op {
            GroupOp::Not => {
                out.push_str("NOT(");
                for (i, child) in self.children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" OR ");
                    }
                    child.render(out);
                }
                out.push(')');
            }
            GroupOp::And | GroupOp::Or => {
                if self.children.len() == 1 {
                    self.children[0].render(out);
                    return;
                }

                let joiner = if self.op == GroupOp::And {
                    " AND "
                } else {
                    " OR "
                };

                out.push('(');
                for (i, child) in self.children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(joiner);
                    }
                    child.render(out);
                }
                out.push(')');
            }
        }
    }
}

///
/// ConstraintNode
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConstraintNode {
    Comparison(Comparison),
    Group(Group),
}

impl ConstraintNode {
    pub(crate) fn render(&self, out: &mut String) {
        match self {
            Self::Comparison(cmp) => cmp.render(out),
            Self::Group(group) => group.render(out),
        }
    }

    /// Logical negation under the rendering discipline: comparisons
    /// invert their operator where an inverse exists; everything else is
    /// wrapped in a native NOT group as a single (parenthesized) child.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Comparison(mut cmp) => match cmp.op.invert() {
                Some(inverse) => {
                    cmp.op = inverse;
                    Self::Comparison(cmp)
                }
                None => Self::Group(Group::new(GroupOp::Not, vec![Self::Comparison(cmp)])),
            },
            group @ Self::Group(_) => Self::Group(Group::new(GroupOp::Not, vec![group])),
        }
    }
}

impl From<Comparison> for ConstraintNode {
    fn from(cmp: Comparison) -> Self {
        Self::Comparison(cmp)
    }
}

impl From<Group> for ConstraintNode {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

///
/// Direction
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

///
/// OrderSpec
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderSpec {
    pub path: PropertyPath,
    pub direction: Direction,
}

///
/// ParsedQuery
///
/// The complete parse result: an implicitly-ANDed list of top-level
/// constraints, the ordering list (caller order, never deduplicated),
/// the optional subclass filter, and pagination overrides.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedQuery {
    pub constraints: Vec<ConstraintNode>,
    pub order: Vec<OrderSpec>,
    pub subclass: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ParsedQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty() && self.order.is_empty() && self.subclass.is_none()
    }

    /// Canonical round-trip rendering: top-level clauses joined by
    /// `AND` on its own line, groups parenthesized inline, operators
    /// uppercase, an `ORDER BY` tail.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        for (i, node) in self.constraints.iter().enumerate() {
            if i > 0 {
                out.push_str("\nAND ");
            }
            node.render(&mut out);
        }

        if let Some(subclass) = &self.subclass {
            if !out.is_empty() {
                out.push_str("\nAND ");
            }
            out.push_str("subclass(");
            out.push_str(subclass);
            out.push(')');
        }

        if !self.order.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("ORDER BY ");
            for (i, spec) in self.order.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(&spec.path.to_string());
                if spec.direction == Direction::Desc {
                    out.push_str(" DESC");
                }
            }
        }

        out
    }
}

///
/// ConstraintContainer
///
/// Fluent construction shared by [`ParsedQuery`] and group builders, for
/// assembling queries programmatically instead of parsing text.
///

pub trait ConstraintContainer: Sized {
    fn add(self, node: ConstraintNode) -> Self;

    fn comparison(self, path: &str, op: CompareOp, values: Vec<Literal>) -> Self {
        let path = PropertyPath::parse(path).expect("valid property path");
        self.add(Comparison::new(path, op, values).into())
    }

    fn eq(self, path: &str, value: &str) -> Self {
        self.comparison(path, CompareOp::Eq, vec![Literal::bare(value)])
    }

    fn neq(self, path: &str, value: &str) -> Self {
        self.comparison(path, CompareOp::Neq, vec![Literal::bare(value)])
    }

    fn gt(self, path: &str, value: &str) -> Self {
        self.comparison(path, CompareOp::Gt, vec![Literal::bare(value)])
    }

    fn ge(self, path: &str, value: &str) -> Self {
        self.comparison(path, CompareOp::Ge, vec![Literal::bare(value)])
    }

    fn lt(self, path: &str, value: &str) -> Self {
        self.comparison(path, CompareOp::Lt, vec![Literal::bare(value)])
    }

    fn le(self, path: &str, value: &str) -> Self {
        self.comparison(path, CompareOp::Le, vec![Literal::bare(value)])
    }

    fn contains(self, path: &str, value: &str) -> Self {
        self.comparison(path, CompareOp::Contains, vec![Literal::bare(value)])
    }

    fn starts_with(self, path: &str, value: &str) -> Self {
        self.comparison(path, CompareOp::StartsWith, vec![Literal::bare(value)])
    }

    fn is_null(self, path: &str) -> Self {
        self.comparison(path, CompareOp::IsNull, Vec::new())
    }

    fn is_not_null(self, path: &str) -> Self {
        self.comparison(path, CompareOp::NotNull, Vec::new())
    }

    fn in_list<I, S>(self, path: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Literal::bare).collect();
        self.comparison(path, CompareOp::In, values)
    }

    /// Inclusive range; pass `""` for an open side.
    fn range(self, path: &str, lo: &str, hi: &str) -> Self {
        self.comparison(
            path,
            CompareOp::Range,
            vec![Literal::bare(lo), Literal::bare(hi)],
        )
    }

    fn eq_ref(self, path: &str, other: &str) -> Self {
        self.comparison(path, CompareOp::EqRef, vec![Literal::bare(other)])
    }

    fn and(self, build: impl FnOnce(GroupBuilder) -> GroupBuilder) -> Self {
        self.group(GroupOp::And, build)
    }

    fn or(self, build: impl FnOnce(GroupBuilder) -> GroupBuilder) -> Self {
        self.group(GroupOp::Or, build)
    }

    fn group(self, op: GroupOp, build: impl FnOnce(GroupBuilder) -> GroupBuilder) -> Self {
        let builder = build(GroupBuilder::new(op));
        self.add(builder.into_node())
    }
}

///
/// GroupBuilder
///

#[derive(Debug)]
pub struct GroupBuilder {
    group: Group,
}

impl GroupBuilder {
    #[must_use]
    pub fn new(op: GroupOp) -> Self {
        Self {
            group: Group::new(op, Vec::new()),
        }
    }

    fn into_node(self) -> ConstraintNode {
        ConstraintNode::Group(self.group)
    }
}

impl ConstraintContainer for GroupBuilder {
    fn add(mut self, node: ConstraintNode) -> Self {
        self.group.children.push(node);
        self
    }
}

impl ConstraintContainer for ParsedQuery {
    fn add(mut self, node: ConstraintNode) -> Self {
        self.constraints.push(node);
        self
    }
}
