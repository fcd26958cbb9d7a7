//! Access-shape parser for SELECT query patterns.
//!
//! This is not a SQL grammar. It walks the token stream and keeps only what
//! decides a wide-column table layout: the tables and their aliases, equality
//! join conditions, key-bearing WHERE predicates, ORDER BY, LIMIT/OFFSET
//! presence and the projection. Everything else is skipped.

use super::lexer::{Lexer, Token};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryParseError {
    #[error("empty query")]
    Empty,
    #[error("not a SELECT statement")]
    NotSelect,
    #[error("missing FROM clause")]
    MissingFrom,
    #[error("expected {expected}, found {found:?}")]
    Expected {
        expected: &'static str,
        found: Token,
    },
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("unknown table alias '{0}'")]
    UnknownAlias(String),
    #[error("column '{0}' cannot be resolved to exactly one table")]
    UnresolvedColumn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    Inner,
    /// The joined row may be absent.
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub table: String,
    /// Alias as written, or the table name when none was given.
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: TableRef,
    pub conditions: Vec<(ColumnRef, ColumnRef)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*` (None) or `alias.*`
    Wildcard(Option<String>),
    Column(ColumnRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub column: ColumnRef,
    pub order: SortOrder,
}

/// Access shape of one query, before binding to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    pub projection: Vec<Projection>,
    /// `col = value` and `col IN (...)` predicates, in WHERE order.
    pub equalities: Vec<ColumnRef>,
    /// `<`, `>`, `<=`, `>=` and BETWEEN predicates, in WHERE order.
    pub ranges: Vec<ColumnRef>,
    /// `a.x = b.y` predicates written in WHERE instead of ON.
    pub join_filters: Vec<(ColumnRef, ColumnRef)>,
    pub order_by: Vec<OrderItem>,
    pub has_limit: bool,
    pub has_offset: bool,
}

/// Parse one query line into its access shape.
pub fn parse_query(input: &str) -> Result<ParsedQuery, QueryParseError> {
    let tokens = Lexer::new(input).tokenize();
    Parser::new(tokens).parse()
}

/// What a single WHERE term turned out to be.
enum Term {
    Equality(ColumnRef),
    Range(ColumnRef),
    JoinFilter(ColumnRef, ColumnRef),
    Other,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_clause_end(&self) -> bool {
        matches!(
            self.current(),
            Token::Where
                | Token::Order
                | Token::Group
                | Token::Having
                | Token::Limit
                | Token::Offset
                | Token::Semicolon
                | Token::Eof
        )
    }

    fn at_join(&self) -> bool {
        matches!(
            self.current(),
            Token::Join | Token::Inner | Token::Left | Token::Right | Token::Full | Token::Cross
        )
    }

    fn parse(&mut self) -> Result<ParsedQuery, QueryParseError> {
        while self.eat(&Token::Semicolon) {}
        match self.current() {
            Token::Eof => return Err(QueryParseError::Empty),
            Token::Select => self.advance(),
            _ => return Err(QueryParseError::NotSelect),
        }
        self.eat(&Token::Distinct);

        let projection = self.parse_projection();

        if !self.eat(&Token::From) {
            return Err(QueryParseError::MissingFrom);
        }
        let from = self.parse_table_ref()?;

        let mut joins = Vec::new();
        loop {
            if self.eat(&Token::Comma) {
                // Implicit join; its conditions live in WHERE.
                joins.push(JoinClause {
                    kind: JoinKind::Inner,
                    table: self.parse_table_ref()?,
                    conditions: Vec::new(),
                });
            } else if self.at_join() {
                joins.push(self.parse_join()?);
            } else {
                break;
            }
        }

        let mut query = ParsedQuery {
            from,
            joins,
            projection,
            equalities: Vec::new(),
            ranges: Vec::new(),
            join_filters: Vec::new(),
            order_by: Vec::new(),
            has_limit: false,
            has_offset: false,
        };

        while !matches!(self.current(), Token::Eof | Token::Semicolon) {
            match self.current() {
                Token::Where => {
                    self.advance();
                    self.parse_where(&mut query);
                }
                Token::Group | Token::Having => {
                    self.advance();
                    self.skip_until_clause();
                }
                Token::Order => {
                    self.advance();
                    if !self.eat(&Token::By) {
                        return Err(QueryParseError::Expected {
                            expected: "BY",
                            found: self.current().clone(),
                        });
                    }
                    query.order_by = self.parse_order_by();
                }
                Token::Limit => {
                    self.advance();
                    query.has_limit = true;
                    self.skip_value();
                    // MySQL `LIMIT offset, count`
                    if self.eat(&Token::Comma) {
                        query.has_offset = true;
                        self.skip_value();
                    }
                }
                Token::Offset => {
                    self.advance();
                    query.has_offset = true;
                    self.skip_value();
                }
                _ => self.advance(),
            }
        }

        Ok(query)
    }

    fn parse_projection(&mut self) -> Vec<Projection> {
        let mut items = Vec::new();

        while !matches!(self.current(), Token::From | Token::Eof | Token::Semicolon) {
            match (self.current().clone(), self.peek_at(1).clone(), self.peek_at(2).clone()) {
                (Token::Star, _, _) => {
                    self.advance();
                    items.push(Projection::Wildcard(None));
                }
                (Token::Ident(q), Token::Dot, Token::Star) => {
                    self.pos += 3;
                    items.push(Projection::Wildcard(Some(q)));
                }
                (Token::Ident(q), Token::Dot, Token::Ident(c)) => {
                    self.pos += 3;
                    items.push(Projection::Column(ColumnRef {
                        qualifier: Some(q),
                        column: c,
                    }));
                }
                (Token::Ident(_), Token::LParen, _) => {
                    // Function call or aggregate: no stored column to carry.
                    self.advance();
                    self.skip_parenthesized();
                }
                (Token::Ident(c), _, _) => {
                    self.advance();
                    items.push(Projection::Column(ColumnRef {
                        qualifier: None,
                        column: c,
                    }));
                }
                (Token::LParen, _, _) => self.skip_parenthesized(),
                _ => self.advance(),
            }

            // Output alias (`AS name` or bare name) up to the next item.
            while !matches!(
                self.current(),
                Token::Comma | Token::From | Token::Eof | Token::Semicolon
            ) {
                if self.current() == &Token::LParen {
                    self.skip_parenthesized();
                } else {
                    self.advance();
                }
            }
            self.eat(&Token::Comma);
        }

        items
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, QueryParseError> {
        let mut table = match self.current() {
            Token::Ident(name) => name.clone(),
            found => {
                return Err(QueryParseError::Expected {
                    expected: "table name",
                    found: found.clone(),
                });
            }
        };
        self.advance();

        // schema.table: keep the table part
        if self.current() == &Token::Dot {
            self.advance();
            if let Token::Ident(name) = self.current() {
                table = name.clone();
                self.advance();
            }
        }

        self.eat(&Token::As);
        let alias = match self.current() {
            Token::Ident(alias) => {
                let alias = alias.clone();
                self.advance();
                alias
            }
            _ => table.clone(),
        };

        Ok(TableRef { table, alias })
    }

    fn parse_join(&mut self) -> Result<JoinClause, QueryParseError> {
        let mut kind = JoinKind::Inner;
        loop {
            match self.current() {
                Token::Left | Token::Right | Token::Full => {
                    kind = JoinKind::Left;
                    self.advance();
                }
                Token::Inner | Token::Outer | Token::Cross => self.advance(),
                Token::Join => {
                    self.advance();
                    break;
                }
                found => {
                    return Err(QueryParseError::Expected {
                        expected: "JOIN",
                        found: found.clone(),
                    });
                }
            }
        }

        let table = self.parse_table_ref()?;
        let mut conditions = Vec::new();

        if self.eat(&Token::On) {
            while !self.at_clause_end() && !self.at_join() && self.current() != &Token::Comma {
                if let Some(lhs) = self.parse_column_ref() {
                    if self.eat(&Token::Eq) {
                        if let Some(rhs) = self.parse_column_ref() {
                            conditions.push((lhs, rhs));
                            continue;
                        }
                    }
                }
                // Anything that is not `col = col` is a row filter, not a join edge.
                if self.current() == &Token::LParen {
                    self.skip_parenthesized();
                } else {
                    self.advance();
                }
            }
        }

        Ok(JoinClause {
            kind,
            table,
            conditions,
        })
    }

    fn parse_column_ref(&mut self) -> Option<ColumnRef> {
        let first = match self.current() {
            Token::Ident(name) => name.clone(),
            _ => return None,
        };
        // A function call is not a column reference.
        if self.peek_at(1) == &Token::LParen {
            return None;
        }
        self.advance();

        if self.current() == &Token::Dot {
            if let Token::Ident(column) = self.peek_at(1).clone() {
                self.pos += 2;
                return Some(ColumnRef {
                    qualifier: Some(first),
                    column,
                });
            }
        }

        Some(ColumnRef {
            qualifier: None,
            column: first,
        })
    }

    fn parse_where(&mut self, query: &mut ParsedQuery) {
        // Terms joined by OR cannot seed a key, so each term remembers
        // whether it touches an OR on either side.
        let mut terms: Vec<(Term, bool)> = Vec::new();
        let mut previous_or = false;

        loop {
            let term = self.parse_term();
            terms.push((term, previous_or));

            match self.current() {
                Token::And => {
                    self.advance();
                    previous_or = false;
                }
                Token::Or => {
                    self.advance();
                    if let Some(last) = terms.last_mut() {
                        last.1 = true;
                    }
                    previous_or = true;
                }
                _ => break,
            }
        }

        for (term, or_adjacent) in terms {
            if or_adjacent {
                continue;
            }
            match term {
                Term::Equality(col) => query.equalities.push(col),
                Term::Range(col) => query.ranges.push(col),
                Term::JoinFilter(lhs, rhs) => query.join_filters.push((lhs, rhs)),
                Term::Other => {}
            }
        }
    }

    fn parse_term(&mut self) -> Term {
        let term = self.parse_term_inner();
        // Resynchronise on the next connective or clause.
        while !self.at_clause_end() && !matches!(self.current(), Token::And | Token::Or) {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else if self.current() == &Token::RParen {
                break;
            } else {
                self.advance();
            }
        }
        term
    }

    fn parse_term_inner(&mut self) -> Term {
        match self.current() {
            Token::LParen => {
                self.skip_parenthesized();
                return Term::Other;
            }
            Token::Not => {
                self.advance();
                self.parse_term_inner();
                return Term::Other;
            }
            Token::Param | Token::Num(_) | Token::Str(_) => {
                // `? = col`
                self.advance();
                if self.eat(&Token::Eq) {
                    if let Some(col) = self.parse_column_ref() {
                        return Term::Equality(col);
                    }
                }
                return Term::Other;
            }
            _ => {}
        }

        let Some(col) = self.parse_column_ref() else {
            return Term::Other;
        };

        match self.current().clone() {
            Token::Eq => {
                self.advance();
                let column_rhs = match self.current() {
                    Token::Ident(word) => !is_literal_word(word) && self.peek_at(1) != &Token::LParen,
                    _ => false,
                };
                if column_rhs {
                    if let Some(rhs) = self.parse_column_ref() {
                        return Term::JoinFilter(col, rhs);
                    }
                }
                self.skip_value();
                Term::Equality(col)
            }
            Token::In => {
                self.advance();
                self.skip_parenthesized();
                Term::Equality(col)
            }
            Token::Cmp(op) => {
                self.advance();
                self.skip_value();
                match op.as_str() {
                    "<" | ">" | "<=" | ">=" => Term::Range(col),
                    _ => Term::Other,
                }
            }
            Token::Between => {
                self.advance();
                self.skip_value();
                self.eat(&Token::And);
                self.skip_value();
                Term::Range(col)
            }
            _ => Term::Other,
        }
    }

    fn parse_order_by(&mut self) -> Vec<OrderItem> {
        let mut items = Vec::new();

        while !self.at_clause_end() {
            match self.parse_column_ref() {
                Some(column) => {
                    let order = if self.eat(&Token::Desc) {
                        SortOrder::Desc
                    } else {
                        self.eat(&Token::Asc);
                        SortOrder::Asc
                    };
                    items.push(OrderItem { column, order });
                }
                None => {
                    // Expression ordering has no clustering equivalent.
                    if self.current() == &Token::LParen {
                        self.skip_parenthesized();
                    } else {
                        self.advance();
                    }
                }
            }
            while !self.at_clause_end() && self.current() != &Token::Comma {
                self.advance();
            }
            self.eat(&Token::Comma);
        }

        items
    }

    fn skip_value(&mut self) {
        match self.current() {
            Token::LParen => self.skip_parenthesized(),
            Token::Ident(_) => {
                self.advance();
                if self.current() == &Token::Dot {
                    self.advance();
                    self.advance();
                } else if self.current() == &Token::LParen {
                    self.skip_parenthesized();
                }
            }
            Token::Param | Token::Num(_) | Token::Str(_) | Token::Null => self.advance(),
            _ => {}
        }
    }

    fn skip_parenthesized(&mut self) {
        if self.current() != &Token::LParen {
            self.advance();
            return;
        }
        self.advance();
        let mut depth = 1;
        while depth > 0 {
            match self.current() {
                Token::LParen => {
                    depth += 1;
                    self.advance();
                }
                Token::RParen => {
                    depth -= 1;
                    self.advance();
                }
                Token::Eof => break,
                _ => self.advance(),
            }
        }
    }

    fn skip_until_clause(&mut self) {
        while !self.at_clause_end() {
            if self.current() == &Token::LParen {
                self.skip_parenthesized();
            } else {
                self.advance();
            }
        }
    }
}

/// Bare words that are values, not column references.
fn is_literal_word(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "true" | "false" | "current_date" | "current_timestamp" | "current_time"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(qualifier: &str, column: &str) -> ColumnRef {
        ColumnRef {
            qualifier: Some(qualifier.to_string()),
            column: column.to_string(),
        }
    }

    #[test]
    fn test_point_lookup_with_join() {
        let q = parse_query(
            "SELECT u.*, a.* FROM users u JOIN user_addresses a ON u.user_id=a.user_id WHERE u.user_id=?",
        )
        .unwrap();

        assert_eq!(q.from.table, "users");
        assert_eq!(q.from.alias, "u");
        assert_eq!(q.joins.len(), 1);
        assert_eq!(q.joins[0].kind, JoinKind::Inner);
        assert_eq!(q.joins[0].conditions, vec![(col("u", "user_id"), col("a", "user_id"))]);
        assert_eq!(q.equalities, vec![col("u", "user_id")]);
        assert_eq!(
            q.projection,
            vec![
                Projection::Wildcard(Some("u".to_string())),
                Projection::Wildcard(Some("a".to_string()))
            ]
        );
        assert!(!q.has_limit);
    }

    #[test]
    fn test_pagination_shape() {
        let q = parse_query(
            "SELECT p.* FROM products p JOIN product_categories pc ON p.product_id=pc.product_id \
             WHERE pc.category_id=? ORDER BY p.created_at DESC LIMIT ? OFFSET ?",
        )
        .unwrap();

        assert_eq!(q.equalities, vec![col("pc", "category_id")]);
        assert_eq!(q.order_by.len(), 1);
        assert_eq!(q.order_by[0].column, col("p", "created_at"));
        assert_eq!(q.order_by[0].order, SortOrder::Desc);
        assert!(q.has_limit);
        assert!(q.has_offset);
    }

    #[test]
    fn test_left_join_and_is_null() {
        let q = parse_query(
            "SELECT c1.*, c2.* FROM categories c1 LEFT JOIN categories c2 \
             ON c1.category_id=c2.parent_category_id WHERE c1.parent_category_id IS NULL",
        )
        .unwrap();

        assert_eq!(q.joins[0].kind, JoinKind::Left);
        assert_eq!(q.joins[0].table.alias, "c2");
        assert!(q.equalities.is_empty());
    }

    #[test]
    fn test_or_terms_are_not_key_bearing() {
        let q = parse_query(
            "SELECT * FROM orders WHERE customer_id = ? AND (status = 'a' OR status = 'b') AND region = ? OR vip = true",
        )
        .unwrap();

        let cols: Vec<&str> = q.equalities.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(cols, vec!["customer_id"]);
        assert_eq!(q.projection, vec![Projection::Wildcard(None)]);
    }

    #[test]
    fn test_in_between_and_ranges() {
        let q = parse_query(
            "SELECT o.id FROM orders o WHERE o.user_id IN (?, ?) AND o.created_at BETWEEN ? AND ? AND o.total >= 10",
        )
        .unwrap();

        assert_eq!(q.equalities, vec![col("o", "user_id")]);
        assert_eq!(q.ranges, vec![col("o", "created_at"), col("o", "total")]);
    }

    #[test]
    fn test_implicit_join_in_where() {
        let q = parse_query("SELECT * FROM users u, orders o WHERE u.id = o.user_id AND u.id = $1")
            .unwrap();

        assert_eq!(q.joins.len(), 1);
        assert!(q.joins[0].conditions.is_empty());
        assert_eq!(q.join_filters, vec![(col("u", "id"), col("o", "user_id"))]);
        assert_eq!(q.equalities, vec![col("u", "id")]);
    }

    #[test]
    fn test_boolean_literal_is_a_value() {
        let q = parse_query("SELECT * FROM users WHERE active = TRUE AND org_id = ?").unwrap();
        let cols: Vec<&str> = q.equalities.iter().map(|c| c.column.as_str()).collect();
        assert_eq!(cols, vec!["active", "org_id"]);
        assert!(q.join_filters.is_empty());
    }

    #[test]
    fn test_mysql_limit_offset() {
        let q = parse_query("SELECT * FROM t WHERE k = 1 LIMIT 20, 10").unwrap();
        assert!(q.has_limit);
        assert!(q.has_offset);
    }

    #[test]
    fn test_projection_skips_functions_and_aliases() {
        let q = parse_query("SELECT COUNT(*) AS n, u.name AS display, email FROM users u").unwrap();
        assert_eq!(
            q.projection,
            vec![
                Projection::Column(col("u", "name")),
                Projection::Column(ColumnRef {
                    qualifier: None,
                    column: "email".to_string()
                }),
            ]
        );
    }

    #[test]
    fn test_malformed_queries() {
        assert_eq!(parse_query("   "), Err(QueryParseError::Empty));
        assert_eq!(parse_query("UPDATE t SET a = 1"), Err(QueryParseError::NotSelect));
        assert_eq!(parse_query("SELECT 1"), Err(QueryParseError::MissingFrom));
        assert!(matches!(
            parse_query("SELECT * FROM"),
            Err(QueryParseError::Expected { .. })
        ));
    }
}
