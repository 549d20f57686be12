use crate::{
    ast::{
        CompareOp, Comparison, ConstraintNode, Direction, Group, GroupOp, Literal, OrderSpec,
        ParsedQuery, PropertyPath,
    },
    error::QueryError,
    lex::{self, Token, TokenKind},
};
use thiserror::Error as ThisError;

///
/// Recursive-descent parser for the textual query grammar.
///
/// Parsing is schema-free: property paths stay unresolved and literals
/// stay raw. The NOT-over-AND De Morgan rewrite happens here, exactly
/// once, so the AST a caller inspects is already in its canonical
/// rendering form (the compiled target cannot express NOT over a
/// conjunction).
///

///
/// ParseError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("parse error at position {position}: expected {expected}, found {found}")]
pub struct ParseError {
    pub position: usize,
    pub expected: String,
    pub found: String,
}

/// Parse a complete textual query into a [`ParsedQuery`].
pub fn parse(input: &str) -> Result<ParsedQuery, QueryError> {
    let tokens = lex::tokenize(input)?;
    let query = Parser::new(tokens).parse_query()?;

    Ok(query)
}

/// One syntactic term: either a constraint node or the `subclass(...)`
/// filter, which is only legal as a top-level AND clause.
enum Term {
    Node(ConstraintNode),
    Subclass(String),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        let end = tokens
            .last()
            .map_or(0, |t| t.position + t.kind.display().len());

        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    fn parse_query(mut self) -> Result<ParsedQuery, ParseError> {
        let mut query = ParsedQuery::new();

        if !self.at_order_by() {
            self.parse_top_expr(&mut query)?;
        }

        if self.at_order_by() {
            self.pos += 2;
            self.parse_order_list(&mut query)?;
        }

        match self.peek() {
            None => Ok(query),
            Some(_) => Err(self.error("end of input")),
        }
    }

    // ---- expression grammar -------------------------------------------------

    /// Top level: an OR of AND-chains, with `subclass(...)` terms and the
    /// implicit top-level AND list flattened into the query.
    fn parse_top_expr(&mut self, query: &mut ParsedQuery) -> Result<(), ParseError> {
        let mut branches: Vec<ConstraintNode> = Vec::new();

        loop {
            let nodes = self.parse_and_chain(Some(&mut *query))?;

            match nodes.len() {
                0 => {
                    // Legal only when the whole branch was subclass() or
                    // the query is empty; an OR with nothing to join is not.
                    if !branches.is_empty() || self.peek_keyword("or") {
                        return Err(self.error("constraint"));
                    }
                }
                1 => branches.extend(nodes),
                _ => {
                    if self.peek_keyword("or") {
                        branches.push(Group::new(GroupOp::And, nodes).into());
                    } else if branches.is_empty() {
                        // Plain AND chain: flatten into the top-level list.
                        query.constraints.extend(nodes);
                        return Ok(());
                    } else {
                        branches.push(Group::new(GroupOp::And, nodes).into());
                    }
                }
            }

            if self.peek_keyword("or") {
                self.pos += 1;
            } else {
                break;
            }
        }

        match branches.len() {
            0 => {}
            1 => query.constraints.extend(branches),
            _ => query
                .constraints
                .push(Group::new(GroupOp::Or, branches).into()),
        }

        Ok(())
    }

    /// Nested boolean expression (inside parentheses).
    fn parse_bool_expr(&mut self) -> Result<ConstraintNode, ParseError> {
        let mut branches = Vec::new();

        loop {
            let nodes = self.parse_and_chain(None)?;
            match nodes.len() {
                0 => return Err(self.error("constraint")),
                1 => branches.extend(nodes),
                _ => branches.push(Group::new(GroupOp::And, nodes).into()),
            }

            if self.peek_keyword("or") {
                self.pos += 1;
            } else {
                break;
            }
        }

        Ok(if branches.len() == 1 {
            branches.remove(0)
        } else {
            Group::new(GroupOp::Or, branches).into()
        })
    }

    /// A chain of terms joined by AND. When `top` is provided this is a
    /// top-level chain and `subclass(...)` terms are accepted.
    fn parse_and_chain(
        &mut self,
        mut top: Option<&mut ParsedQuery>,
    ) -> Result<Vec<ConstraintNode>, ParseError> {
        let mut nodes = Vec::new();

        loop {
            if self.at_end_of_expr(top.is_some()) {
                break;
            }

            match self.parse_term()? {
                Term::Node(node) => nodes.push(node),
                Term::Subclass(value) => match top.as_deref_mut() {
                    Some(query) => merge_subclass(query, &value),
                    None => {
                        return Err(ParseError {
                            position: self
                                .tokens
                                .get(self.pos.saturating_sub(1))
                                .map_or(self.end, |t| t.position),
                            expected: "constraint (subclass() is only legal at top level)"
                                .to_string(),
                            found: "subclass filter".to_string(),
                        });
                    }
                },
            }

            if self.peek_keyword("and") {
                self.pos += 1;
            } else {
                break;
            }
        }

        Ok(nodes)
    }

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        if self.peek_keyword("not") && self.peek_kind_at(1) == Some(&TokenKind::LParen) {
            self.pos += 2;
            let node = self.parse_negated_group()?;
            self.expect_rparen()?;
            return Ok(Term::Node(node));
        }

        if self.peek_keyword("subclass") && self.peek_kind_at(1) == Some(&TokenKind::LParen) {
            self.pos += 2;
            let value = self.parse_subclass_values()?;
            return Ok(Term::Subclass(value));
        }

        if matches!(self.peek_kind(), Some(TokenKind::LParen)) {
            self.pos += 1;
            let node = self.parse_bool_expr()?;
            self.expect_rparen()?;
            return Ok(Term::Node(node));
        }

        self.parse_comparison().map(Term::Node)
    }

    /// `NOT( ... )` with the De Morgan discipline:
    ///
    /// - a syntactic AND chain distributes: children are individually
    ///   negated and joined with OR;
    /// - a syntactic OR chain becomes a native NOT group over its
    ///   branches;
    /// - a single nested group (including an already-rewritten inner
    ///   NOT) is wrapped as one child, which keeps double negation
    ///   structurally intact.
    fn parse_negated_group(&mut self) -> Result<ConstraintNode, ParseError> {
        let mut branches: Vec<Vec<ConstraintNode>> = Vec::new();

        loop {
            let nodes = self.parse_and_chain(None)?;
            if nodes.is_empty() {
                return Err(self.error("constraint"));
            }
            branches.push(nodes);

            if self.peek_keyword("or") {
                self.pos += 1;
            } else {
                break;
            }
        }

        if branches.len() > 1 {
            // NOT(a OR b ...): natively representable.
            let children = branches
                .into_iter()
                .map(|nodes| {
                    if nodes.len() == 1 {
                        nodes.into_iter().next().expect("single node")
                    } else {
                        Group::new(GroupOp::And, nodes).into()
                    }
                })
                .collect();

            return Ok(Group::new(GroupOp::Not, children).into());
        }

        let mut nodes = branches.into_iter().next().expect("single branch");

        if nodes.len() > 1 {
            // NOT(a AND b ...): rewrite to (NOT a) OR (NOT b) ...
            let negated = nodes.into_iter().map(ConstraintNode::negate).collect();
            return Ok(Group::new(GroupOp::Or, negated).into());
        }

        Ok(nodes.remove(0).negate())
    }

    fn parse_subclass_values(&mut self) -> Result<String, ParseError> {
        let mut values = vec![self.expect_word("subclass name")?];

        while matches!(self.peek_kind(), Some(TokenKind::Comma)) {
            self.pos += 1;
            values.push(self.expect_word("subclass name")?);
        }
        self.expect_rparen()?;

        Ok(values.join(","))
    }

    // ---- comparisons --------------------------------------------------------

    fn parse_comparison(&mut self) -> Result<ConstraintNode, ParseError> {
        let path_pos = self.peek().map_or(self.end, |t| t.position);
        let path_text = self.expect_word("property path")?;
        let path = PropertyPath::parse(&path_text).map_err(|reason| ParseError {
            position: path_pos,
            expected: "property path".to_string(),
            found: reason,
        })?;

        let Some(token) = self.advance() else {
            return Err(self.error("operator"));
        };

        match &token.kind {
            TokenKind::Operator(sym) => {
                let op = match sym.as_str() {
                    "=" => CompareOp::Eq,
                    "!=" => CompareOp::Neq,
                    "~=" => CompareOp::Contains,
                    ">" => CompareOp::Gt,
                    ">=" => CompareOp::Ge,
                    "<" => CompareOp::Lt,
                    "<=" | "=<" => CompareOp::Le,
                    _ => return Err(self.error_at_prev("operator")),
                };
                self.finish_valued_comparison(path, op)
            }
            TokenKind::Word(word) => match word.to_ascii_lowercase().as_str() {
                "eq" => self.finish_valued_comparison(path, CompareOp::Eq),
                "ne" | "neq" => self.finish_valued_comparison(path, CompareOp::Neq),
                "gt" => self.finish_valued_comparison(path, CompareOp::Gt),
                "ge" => self.finish_valued_comparison(path, CompareOp::Ge),
                "lt" => self.finish_valued_comparison(path, CompareOp::Lt),
                "le" => self.finish_valued_comparison(path, CompareOp::Le),
                "contains" => self.finish_valued_comparison(path, CompareOp::Contains),
                "starts" => self.finish_valued_comparison(path, CompareOp::StartsWith),
                "eqref" => self.finish_ref_comparison(path, CompareOp::EqRef),
                "neqref" => self.finish_ref_comparison(path, CompareOp::NeqRef),
                "gtref" => self.finish_ref_comparison(path, CompareOp::GtRef),
                "geref" => self.finish_ref_comparison(path, CompareOp::GeRef),
                "ltref" => self.finish_ref_comparison(path, CompareOp::LtRef),
                "leref" => self.finish_ref_comparison(path, CompareOp::LeRef),
                "is" => self.finish_null_test(path),
                "between" => self.finish_range(path),
                "in" => self.finish_in(path, CompareOp::In),
                "not" => {
                    let follow = self.expect_word("IN or STARTS")?;
                    match follow.to_ascii_lowercase().as_str() {
                        "in" => self.finish_in(path, CompareOp::NotIn),
                        "starts" => {
                            self.finish_valued_comparison(path, CompareOp::NotStartsWith)
                        }
                        _ => Err(self.error_at_prev("IN or STARTS")),
                    }
                }
                _ => Err(self.error_at_prev("operator")),
            },
            _ => Err(self.error_at_prev("operator")),
        }
    }

    /// `path OP literal [, literal]*` — trailing comma-separated values
    /// are the implicit-IN form and only meaningful for (in)equality.
    fn finish_valued_comparison(
        &mut self,
        path: PropertyPath,
        op: CompareOp,
    ) -> Result<ConstraintNode, ParseError> {
        let mut values = vec![self.expect_literal()?];

        while matches!(self.peek_kind(), Some(TokenKind::Comma)) {
            self.pos += 1;
            values.push(self.expect_literal()?);
        }

        if values.len() > 1 && !matches!(op, CompareOp::Eq | CompareOp::Neq) {
            return Err(self.error_at_prev("single value for this operator"));
        }

        let op = match (op, values.len()) {
            (CompareOp::Eq, n) if n > 1 => CompareOp::In,
            (CompareOp::Neq, n) if n > 1 => CompareOp::NotIn,
            (op, _) => op,
        };

        Ok(Comparison::new(path, op, values).into())
    }

    fn finish_ref_comparison(
        &mut self,
        path: PropertyPath,
        op: CompareOp,
    ) -> Result<ConstraintNode, ParseError> {
        let other = self.expect_word("property path")?;

        Ok(Comparison::new(path, op, vec![Literal::bare(other)]).into())
    }

    fn finish_null_test(&mut self, path: PropertyPath) -> Result<ConstraintNode, ParseError> {
        let negated = if self.peek_keyword("not") {
            self.pos += 1;
            true
        } else {
            false
        };
        self.expect_keyword("null")?;

        let op = if negated {
            CompareOp::NotNull
        } else {
            CompareOp::IsNull
        };

        Ok(Comparison::new(path, op, Vec::new()).into())
    }

    fn finish_range(&mut self, path: PropertyPath) -> Result<ConstraintNode, ParseError> {
        let lo = self.expect_literal()?;
        self.expect_keyword("and")?;
        let hi = self.expect_literal()?;

        Ok(Comparison::new(path, CompareOp::Range, vec![lo, hi]).into())
    }

    fn finish_in(
        &mut self,
        path: PropertyPath,
        op: CompareOp,
    ) -> Result<ConstraintNode, ParseError> {
        self.expect_lparen()?;

        if matches!(self.peek_kind(), Some(TokenKind::RParen)) {
            return Err(self.error("non-empty IN list"));
        }

        let mut values = vec![self.expect_literal()?];
        while matches!(self.peek_kind(), Some(TokenKind::Comma)) {
            self.pos += 1;
            values.push(self.expect_literal()?);
        }
        self.expect_rparen()?;

        Ok(Comparison::new(path, op, values).into())
    }

    // ---- order by -----------------------------------------------------------

    fn parse_order_list(&mut self, query: &mut ParsedQuery) -> Result<(), ParseError> {
        loop {
            let path_pos = self.peek().map_or(self.end, |t| t.position);
            let path_text = self.expect_word("property path")?;
            let path = PropertyPath::parse(&path_text).map_err(|reason| ParseError {
                position: path_pos,
                expected: "property path".to_string(),
                found: reason,
            })?;

            let direction = match self.peek_word().map(str::to_ascii_lowercase).as_deref() {
                Some("asc") => {
                    self.pos += 1;
                    Direction::Asc
                }
                Some("desc") => {
                    self.pos += 1;
                    Direction::Desc
                }
                _ => Direction::Asc,
            };

            query.order.push(OrderSpec { path, direction });

            if matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                self.pos += 1;
            } else {
                return Ok(());
            }
        }
    }

    // ---- token helpers ------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn peek_word(&self) -> Option<&str> {
        match self.peek_kind() {
            Some(TokenKind::Word(word)) => Some(word),
            _ => None,
        }
    }

    fn peek_word_at(&self, offset: usize) -> Option<&str> {
        match self.peek_kind_at(offset) {
            Some(TokenKind::Word(word)) => Some(word),
            _ => None,
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek_word()
            .is_some_and(|word| word.eq_ignore_ascii_case(keyword))
    }

    fn at_order_by(&self) -> bool {
        self.peek_keyword("order")
            && self
                .peek_word_at(1)
                .is_some_and(|word| word.eq_ignore_ascii_case("by"))
    }

    fn at_end_of_expr(&self, top: bool) -> bool {
        match self.peek_kind() {
            None | Some(TokenKind::RParen) => true,
            _ => top && self.at_order_by(),
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_word(&mut self, expected: &str) -> Result<String, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Word(word)) => {
                let word = word.clone();
                self.pos += 1;
                Ok(word)
            }
            _ => Err(self.error(expected)),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(keyword))
        }
    }

    fn expect_literal(&mut self) -> Result<Literal, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Word(text)) => {
                let literal = Literal::bare(text.clone());
                self.pos += 1;
                Ok(literal)
            }
            Some(TokenKind::Quoted(text)) => {
                let literal = Literal::quoted(text.clone());
                self.pos += 1;
                Ok(literal)
            }
            _ => Err(self.error("literal")),
        }
    }

    fn expect_lparen(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LParen) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error("(")),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), ParseError> {
        match self.peek_kind() {
            Some(TokenKind::RParen) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error(")")),
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        let (position, found) = match self.peek() {
            Some(token) => (token.position, token.kind.display()),
            None => (self.end, "end of input".to_string()),
        };

        ParseError {
            position,
            expected: expected.to_string(),
            found,
        }
    }

    /// Error pointing at the token just consumed.
    fn error_at_prev(&self, expected: &str) -> ParseError {
        let (position, found) = match self.tokens.get(self.pos.saturating_sub(1)) {
            Some(token) => (token.position, token.kind.display()),
            None => (self.end, "end of input".to_string()),
        };

        ParseError {
            position,
            expected: expected.to_string(),
            found,
        }
    }
}

fn merge_subclass(query: &mut ParsedQuery, value: &str) {
    match &mut query.subclass {
        Some(existing) => {
            existing.push(',');
            existing.push_str(value);
        }
        None => query.subclass = Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(input: &str) -> String {
        parse(input).unwrap().render()
    }

    #[test]
    fn single_comparison_round_trips() {
        assert_eq!(render("id=1"), "id = 1");
        assert_eq!(render("id = 1"), "id = 1");
        assert_eq!(render("ID EQ 1"), "ID = 1");
    }

    #[test]
    fn empty_query_renders_empty() {
        assert_eq!(render(""), "");
        assert!(parse("").unwrap().is_empty());
    }

    #[test]
    fn order_by_alone_is_legal() {
        assert_eq!(render("ORDER BY id"), "ORDER BY id");
        assert_eq!(render("order by id, name desc"), "ORDER BY id, name DESC");
    }

    #[test]
    fn comments_are_transparent() {
        let expected = render("id=1");
        assert_eq!(render("/* c */ id=1"), expected);
        assert_eq!(render("id=1 --c"), expected);
        assert_eq!(render("id=1 // c\n"), expected);
        assert_eq!(render("id= -- comment\n1"), expected);
    }

    #[test]
    fn in_list_renders_canonically() {
        assert_eq!(render("id in (1,2,3)"), "id IN(1, 2, 3)");
        assert_eq!(render("id not in (1, 2)"), "id NOT IN(1, 2)");
    }

    #[test]
    fn implicit_in_from_comma_separated_values() {
        assert_eq!(render("id=1,2,3"), "id IN(1, 2, 3)");
    }

    #[test]
    fn between_renders_canonically() {
        assert_eq!(render("speed between 1 and 30"), "speed BETWEEN 1 AND 30");
    }

    #[test]
    fn null_tests() {
        assert_eq!(render("name is null"), "name IS NULL");
        assert_eq!(render("name is not null"), "name IS NOT NULL");
    }

    #[test]
    fn precedence_or_over_and() {
        assert_eq!(
            render("a=1 and b=2 or c=3"),
            "((a = 1 AND b = 2) OR c = 3)"
        );
    }

    #[test]
    fn top_level_and_chain_is_flattened() {
        assert_eq!(
            render("id < 100 and id > 200 and (id=1 or id=2 or (id=3 and id=4))"),
            "id < 100\nAND id > 200\nAND (id = 1 OR id = 2 OR (id = 3 AND id = 4))"
        );
    }

    #[test]
    fn demorgan_rewrites_not_over_and() {
        assert_eq!(
            render("NOT(id=1 AND name=alice)"),
            "(id != 1 OR name != alice)"
        );
    }

    #[test]
    fn double_negation_is_preserved_structurally() {
        assert_eq!(
            render("NOT(NOT(id=1 AND name=alice))"),
            "NOT((id != 1 OR name != alice))"
        );
    }

    #[test]
    fn not_over_or_stays_native() {
        assert_eq!(render("NOT(id=1 OR id=2)"), "NOT(id = 1 OR id = 2)");
    }

    #[test]
    fn not_over_single_comparison_inverts() {
        assert_eq!(render("NOT(id=1)"), "id != 1");
        assert_eq!(render("NOT(id > 5)"), "id <= 5");
    }

    #[test]
    fn not_over_range_wraps_natively() {
        assert_eq!(
            render("NOT(id between 1 and 2)"),
            "NOT(id BETWEEN 1 AND 2)"
        );
    }

    #[test]
    fn demorgan_distribution_negates_nested_groups_structurally() {
        assert_eq!(
            render("NOT(a=1 AND (b=2 OR c=3))"),
            "(a != 1 OR NOT((b = 2 OR c = 3)))"
        );
    }

    #[test]
    fn subclass_is_captured() {
        let query = parse("id=1 and subclass(typeA)").unwrap();
        assert_eq!(query.subclass.as_deref(), Some("typeA"));
        assert_eq!(query.render(), "id = 1\nAND subclass(typeA)");
    }

    #[test]
    fn subclass_accepts_multiple_values() {
        let query = parse("subclass(a, b)").unwrap();
        assert_eq!(query.subclass.as_deref(), Some("a,b"));
    }

    #[test]
    fn subclass_inside_group_is_rejected() {
        assert!(parse("(subclass(a))").is_err());
        assert!(parse("NOT(subclass(a))").is_err());
    }

    #[test]
    fn ref_operators_take_paths() {
        assert_eq!(render("id eqref parent.id"), "id EQREF parent.id");
    }

    #[test]
    fn quoted_literals_survive() {
        assert_eq!(render("name = 'foo bar'"), "name = \"foo bar\"");
    }

    #[test]
    fn starts_forms() {
        assert_eq!(render("name starts fo"), "name STARTS fo");
        assert_eq!(render("name not starts fo"), "name NOT STARTS fo");
        assert_eq!(render("name ~= oo"), "name ~= oo");
    }

    #[test]
    fn errors_carry_position_expected_and_found() {
        let QueryError::Parse(err) = parse("id ==== 1").unwrap_err() else {
            panic!("expected parse error");
        };
        assert_eq!(err.position, 3);
        assert_eq!(err.found, "====");

        let QueryError::Parse(err) = parse("id =").unwrap_err() else {
            panic!("expected parse error");
        };
        assert_eq!(err.expected, "literal");
        assert_eq!(err.found, "end of input");
    }

    #[test]
    fn empty_in_list_is_rejected() {
        assert!(parse("id in ()").is_err());
    }

    #[test]
    fn mismatched_parens_are_rejected() {
        assert!(parse("(id=1").is_err());
        assert!(parse("id=1)").is_err());
    }

    #[test]
    fn lone_boolean_keyword_is_rejected() {
        assert!(parse("and").is_err());
        assert!(parse("id=1 or").is_err());
    }
}
