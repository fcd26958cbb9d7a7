//! Query patterns bound to the relational schema.
//!
//! Binding resolves aliases and bare column names, picks the driving table,
//! orients every join condition away from it and derives the cardinality of
//! each hop from foreign-key direction.

use crate::schema::{RelationalSchema, Table};
use crate::sql::{ColumnRef, JoinKind, ParsedQuery, Projection, QueryParseError, SortOrder, parse_query};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundTable {
    pub alias: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundColumn {
    pub alias: String,
    pub table: String,
    pub column: String,
}

impl BoundColumn {
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.alias, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

/// One join hop, oriented from the side closer to the driving table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinEdge {
    pub from: BoundColumn,
    pub to: BoundColumn,
    pub kind: JoinKind,
    pub cardinality: Cardinality,
    /// Both ends are the same table and a foreign key links them.
    pub self_reference: bool,
}

impl JoinEdge {
    pub fn describe(&self) -> String {
        format!("{} = {}", self.from.qualified(), self.to.qualified())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderColumn {
    pub column: BoundColumn,
    pub order: SortOrder,
}

/// Columns requested for one alias; `None` means the alias was projected with a wildcard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasProjection {
    pub alias: String,
    pub columns: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPattern {
    pub index: usize,
    pub text: String,
    pub driving: BoundTable,
    /// Every alias in FROM/JOIN order.
    pub tables: Vec<BoundTable>,
    /// Join hops rooted at the driving table, parents before children.
    pub joins: Vec<JoinEdge>,
    /// Equality predicates in WHERE order.
    pub filters: Vec<BoundColumn>,
    pub ranges: Vec<BoundColumn>,
    pub order_by: Vec<OrderColumn>,
    pub has_limit: bool,
    pub has_offset: bool,
    pub projection: Vec<AliasProjection>,
    /// Join conditions that never connect to the driving table.
    pub detached: Vec<String>,
}

impl QueryPattern {
    /// Equality filters on the driving table, in WHERE order.
    pub fn driving_filters(&self) -> impl Iterator<Item = &BoundColumn> {
        self.filters
            .iter()
            .filter(|c| c.alias.eq_ignore_ascii_case(&self.driving.alias))
    }

    /// Equality filters on joined aliases, in WHERE order.
    pub fn joined_filters(&self) -> impl Iterator<Item = &BoundColumn> {
        self.filters
            .iter()
            .filter(|c| !c.alias.eq_ignore_ascii_case(&self.driving.alias))
    }

    /// Projected columns of `alias`, resolved against its table.
    pub fn projected<'t>(&self, alias: &str, table: &'t Table) -> Vec<&'t crate::schema::Column> {
        let Some(projection) = self
            .projection
            .iter()
            .find(|p| p.alias.eq_ignore_ascii_case(alias))
        else {
            return Vec::new();
        };
        match &projection.columns {
            None => table.columns.iter().collect(),
            Some(names) => names.iter().filter_map(|n| table.column(n)).collect(),
        }
    }
}

/// Result of reading one line of the query corpus.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(QueryPattern),
    Skipped {
        index: usize,
        text: String,
        reason: QueryParseError,
    },
}

/// Query lines of a corpus with their corpus index. Blank lines and lines
/// starting with `#` or `--` are not queries.
pub fn split_corpus(corpus: &str) -> Vec<(usize, String)> {
    corpus
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("--"))
        .enumerate()
        .map(|(index, line)| (index, line.to_string()))
        .collect()
}

/// Parse and bind every query of the corpus, in corpus order.
pub fn parse_corpus(corpus: &str, schema: &RelationalSchema) -> Vec<ParseOutcome> {
    split_corpus(corpus)
        .into_iter()
        .map(|(index, text)| parse_pattern(index, &text, schema))
        .collect()
}

pub fn parse_pattern(index: usize, text: &str, schema: &RelationalSchema) -> ParseOutcome {
    let bound = parse_query(text).and_then(|parsed| bind(index, text, &parsed, schema));
    match bound {
        Ok(pattern) => {
            log::debug!(
                "Q{}: driving table {} ({} joins)",
                index,
                pattern.driving.table,
                pattern.joins.len()
            );
            ParseOutcome::Parsed(pattern)
        }
        Err(reason) => {
            log::warn!("Q{}: skipped, {}", index, reason);
            ParseOutcome::Skipped {
                index,
                text: text.to_string(),
                reason,
            }
        }
    }
}

struct Binder<'s> {
    schema: &'s RelationalSchema,
    tables: Vec<BoundTable>,
}

impl<'s> Binder<'s> {
    fn table_of(&self, alias: &str) -> Option<&'s Table> {
        self.tables
            .iter()
            .find(|t| t.alias.eq_ignore_ascii_case(alias))
            .and_then(|t| self.schema.table(&t.table))
    }

    fn alias_for(&self, qualifier: &str) -> Result<&BoundTable, QueryParseError> {
        if let Some(t) = self
            .tables
            .iter()
            .find(|t| t.alias.eq_ignore_ascii_case(qualifier))
        {
            return Ok(t);
        }
        // `users.id` written against an aliased table
        let mut by_table = self
            .tables
            .iter()
            .filter(|t| t.table.eq_ignore_ascii_case(qualifier));
        match (by_table.next(), by_table.next()) {
            (Some(t), None) => Ok(t),
            _ => Err(QueryParseError::UnknownAlias(qualifier.to_string())),
        }
    }

    fn resolve(&self, col: &ColumnRef) -> Result<BoundColumn, QueryParseError> {
        let unresolved = || QueryParseError::UnresolvedColumn(col.column.clone());

        let bound = match &col.qualifier {
            Some(q) => self.alias_for(q)?,
            // Ambiguous bare names go to the earliest alias that owns the column.
            None => self
                .tables
                .iter()
                .find(|t| {
                    self.schema
                        .table(&t.table)
                        .is_some_and(|table| table.has_column(&col.column))
                })
                .ok_or_else(unresolved)?,
        };

        let column = self
            .schema
            .table(&bound.table)
            .and_then(|table| table.column(&col.column))
            .ok_or_else(unresolved)?;

        Ok(BoundColumn {
            alias: bound.alias.clone(),
            table: bound.table.clone(),
            column: column.name.clone(),
        })
    }
}

fn bind(
    index: usize,
    text: &str,
    parsed: &ParsedQuery,
    schema: &RelationalSchema,
) -> Result<QueryPattern, QueryParseError> {
    let mut tables = Vec::with_capacity(parsed.joins.len() + 1);
    for table_ref in std::iter::once(&parsed.from).chain(parsed.joins.iter().map(|j| &j.table)) {
        let table = schema
            .table(&table_ref.table)
            .ok_or_else(|| QueryParseError::UnknownTable(table_ref.table.clone()))?;
        tables.push(BoundTable {
            alias: table_ref.alias.clone(),
            table: table.name.clone(),
        });
    }
    let binder = Binder { schema, tables };

    let filters = parsed
        .equalities
        .iter()
        .map(|c| binder.resolve(c))
        .collect::<Result<Vec<_>, _>>()?;
    let ranges = parsed
        .ranges
        .iter()
        .map(|c| binder.resolve(c))
        .collect::<Result<Vec<_>, _>>()?;
    let order_by = parsed
        .order_by
        .iter()
        .map(|item| {
            Ok(OrderColumn {
                column: binder.resolve(&item.column)?,
                order: item.order,
            })
        })
        .collect::<Result<Vec<_>, QueryParseError>>()?;

    let driving = match filters.first() {
        Some(first) => BoundTable {
            alias: first.alias.clone(),
            table: first.table.clone(),
        },
        None => binder.tables[0].clone(),
    };

    let mut conditions = Vec::new();
    for join in &parsed.joins {
        for (lhs, rhs) in &join.conditions {
            conditions.push((binder.resolve(lhs)?, binder.resolve(rhs)?, join.kind));
        }
    }
    for (lhs, rhs) in &parsed.join_filters {
        conditions.push((binder.resolve(lhs)?, binder.resolve(rhs)?, JoinKind::Inner));
    }
    let (joins, detached) = root_joins(&binder, &driving, conditions);

    let projection = bind_projection(&binder, &parsed.projection)?;

    Ok(QueryPattern {
        index,
        text: text.to_string(),
        driving,
        tables: binder.tables,
        joins,
        filters,
        ranges,
        order_by,
        has_limit: parsed.has_limit,
        has_offset: parsed.has_offset,
        projection,
        detached,
    })
}

/// Orient join conditions away from the driving alias, breadth first in
/// declaration order. Conditions between two already reached aliases add
/// nothing to the shape; conditions never reached are returned as detached.
fn root_joins(
    binder: &Binder<'_>,
    driving: &BoundTable,
    mut pending: Vec<(BoundColumn, BoundColumn, JoinKind)>,
) -> (Vec<JoinEdge>, Vec<String>) {
    let mut reached = vec![driving.alias.to_ascii_lowercase()];
    let mut edges = Vec::new();

    loop {
        let next = pending.iter().position(|(lhs, rhs, _)| {
            reached.contains(&lhs.alias.to_ascii_lowercase())
                || reached.contains(&rhs.alias.to_ascii_lowercase())
        });
        let Some(pos) = next else { break };
        let (lhs, rhs, kind) = pending.remove(pos);

        let lhs_reached = reached.contains(&lhs.alias.to_ascii_lowercase());
        let rhs_reached = reached.contains(&rhs.alias.to_ascii_lowercase());
        if lhs_reached && rhs_reached {
            continue;
        }

        let (from, to) = if lhs_reached { (lhs, rhs) } else { (rhs, lhs) };
        reached.push(to.alias.to_ascii_lowercase());

        let cardinality = cardinality(binder, &from, &to);
        let self_reference = from.table.eq_ignore_ascii_case(&to.table)
            && binder.table_of(&to.alias).is_some_and(|t| {
                t.foreign_key_to(&to.column, &from.table, &from.column).is_some()
                    || t.foreign_key_to(&from.column, &to.table, &to.column).is_some()
            });

        edges.push(JoinEdge {
            from,
            to,
            kind,
            cardinality,
            self_reference,
        });
    }

    let mut detached: Vec<String> = pending
        .iter()
        .map(|(lhs, rhs, _)| format!("{} = {}", lhs.qualified(), rhs.qualified()))
        .collect();
    for table in &binder.tables {
        let alias = table.alias.to_ascii_lowercase();
        let mentioned = pending
            .iter()
            .any(|(l, r, _)| l.alias.eq_ignore_ascii_case(&alias) || r.alias.eq_ignore_ascii_case(&alias));
        if !reached.contains(&alias) && !mentioned {
            detached.push(format!("{} (no join condition)", table.alias));
        }
    }

    (edges, detached)
}

/// A foreign key on the joined side pointing back at the reached side makes
/// the hop one-to-many, unless the key column alone identifies the joined row.
fn cardinality(binder: &Binder<'_>, from: &BoundColumn, to: &BoundColumn) -> Cardinality {
    let (Some(from_table), Some(to_table)) = (binder.table_of(&from.alias), binder.table_of(&to.alias))
    else {
        return Cardinality::OneToMany;
    };

    if to_table
        .foreign_key_to(&to.column, &from.table, &from.column)
        .is_some()
    {
        return if to_table.is_sole_key(&to.column) {
            Cardinality::OneToOne
        } else {
            Cardinality::OneToMany
        };
    }
    if from_table
        .foreign_key_to(&from.column, &to.table, &to.column)
        .is_some()
    {
        return Cardinality::OneToOne;
    }
    if to_table.is_sole_key(&to.column) {
        Cardinality::OneToOne
    } else {
        Cardinality::OneToMany
    }
}

fn bind_projection(
    binder: &Binder<'_>,
    items: &[Projection],
) -> Result<Vec<AliasProjection>, QueryParseError> {
    let mut projection: Vec<AliasProjection> = Vec::new();

    fn entry<'p>(projection: &'p mut Vec<AliasProjection>, alias: &str) -> &'p mut AliasProjection {
        let pos = match projection
            .iter()
            .position(|p| p.alias.eq_ignore_ascii_case(alias))
        {
            Some(pos) => pos,
            None => {
                projection.push(AliasProjection {
                    alias: alias.to_string(),
                    columns: Some(Vec::new()),
                });
                projection.len() - 1
            }
        };
        &mut projection[pos]
    }

    for item in items {
        match item {
            Projection::Wildcard(None) => {
                for table in &binder.tables {
                    entry(&mut projection, &table.alias).columns = None;
                }
            }
            Projection::Wildcard(Some(q)) => {
                let alias = binder.alias_for(q)?.alias.clone();
                entry(&mut projection, &alias).columns = None;
            }
            Projection::Column(col) => match binder.resolve(col) {
                Ok(bound) => {
                    if let Some(columns) = &mut entry(&mut projection, &bound.alias).columns {
                        if !columns.contains(&bound.column) {
                            columns.push(bound.column);
                        }
                    }
                }
                Err(err) => {
                    // Output expressions without a stored column are not part of the shape.
                    log::debug!("projection item ignored: {}", err);
                }
            },
        }
    }

    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::schema_from_json;

    pub(crate) const STORE: &str = r#"{"tables": [
        {"name": "users", "columns": [
            {"name": "user_id", "type": "uuid", "primary_key": true},
            {"name": "username", "type": "varchar(50)"},
            {"name": "email", "type": "varchar(255)"}
        ]},
        {"name": "user_addresses", "columns": [
            {"name": "address_id", "type": "uuid", "primary_key": true},
            {"name": "user_id", "type": "uuid"},
            {"name": "street_address", "type": "text"},
            {"name": "city", "type": "text"}
        ], "foreign_keys": [
            {"column": "user_id", "references": {"table": "users", "column": "user_id"}}
        ]},
        {"name": "products", "columns": [
            {"name": "product_id", "type": "uuid", "primary_key": true},
            {"name": "name", "type": "text"},
            {"name": "created_at", "type": "timestamp"}
        ]},
        {"name": "product_categories", "columns": [
            {"name": "product_id", "type": "uuid", "primary_key": true},
            {"name": "category_id", "type": "uuid", "primary_key": true}
        ], "foreign_keys": [
            {"column": "product_id", "references": {"table": "products", "column": "product_id"}}
        ]}
    ]}"#;

    fn parsed(text: &str) -> QueryPattern {
        let schema = schema_from_json(STORE);
        match parse_pattern(0, text, &schema) {
            ParseOutcome::Parsed(p) => p,
            ParseOutcome::Skipped { reason, .. } => panic!("skipped: {reason}"),
        }
    }

    #[test]
    fn test_split_corpus_skips_comments_and_blanks() {
        let lines = split_corpus("# header\n\nSELECT 1\n  -- note\n SELECT 2 \n");
        assert_eq!(lines, vec![(0, "SELECT 1".to_string()), (1, "SELECT 2".to_string())]);
    }

    #[test]
    fn test_parse_corpus_keeps_skipped_positions() {
        let schema = schema_from_json(STORE);
        let outcomes = parse_corpus(
            "-- lookups\nSELECT * FROM users WHERE user_id = ?\nDELETE FROM users\nSELECT * FROM products",
            &schema,
        );

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(&outcomes[0], ParseOutcome::Parsed(p) if p.index == 0));
        assert!(matches!(&outcomes[1], ParseOutcome::Skipped { index: 1, .. }));
        assert!(matches!(&outcomes[2], ParseOutcome::Parsed(p) if p.driving.table == "products"));
    }

    #[test]
    fn test_join_to_child_is_one_to_many() {
        let p = parsed(
            "SELECT u.*, a.* FROM users u JOIN user_addresses a ON u.user_id=a.user_id WHERE u.user_id=?",
        );

        assert_eq!(p.driving.table, "users");
        assert_eq!(p.joins.len(), 1);
        assert_eq!(p.joins[0].to.alias, "a");
        assert_eq!(p.joins[0].cardinality, Cardinality::OneToMany);
        assert!(!p.joins[0].self_reference);
        assert_eq!(p.driving_filters().count(), 1);
    }

    #[test]
    fn test_driving_table_follows_first_equality() {
        let p = parsed(
            "SELECT p.* FROM products p JOIN product_categories pc ON p.product_id=pc.product_id \
             WHERE pc.category_id=? ORDER BY p.created_at DESC LIMIT ? OFFSET ?",
        );

        assert_eq!(p.driving.alias, "pc");
        // Rooted at pc: the hop to products follows pc's own foreign key.
        assert_eq!(p.joins[0].from.alias, "pc");
        assert_eq!(p.joins[0].to.table, "products");
        assert_eq!(p.joins[0].cardinality, Cardinality::OneToOne);
        assert_eq!(p.order_by[0].column.table, "products");
        assert!(p.has_offset);
    }

    #[test]
    fn test_bare_columns_resolve_to_owning_alias() {
        let p = parsed("SELECT username, city FROM users u JOIN user_addresses a ON u.user_id = a.user_id WHERE city = ?");

        assert_eq!(p.driving.alias, "a");
        assert_eq!(p.filters[0].qualified(), "a.city");
        let users = schema_from_json(STORE);
        let cols = p.projected("u", users.table("users").unwrap());
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].name, "username");
    }

    #[test]
    fn test_unknown_table_is_skipped() {
        let schema = schema_from_json(STORE);
        let outcome = parse_pattern(3, "SELECT * FROM invoices WHERE id = ?", &schema);
        assert_eq!(
            outcome,
            ParseOutcome::Skipped {
                index: 3,
                text: "SELECT * FROM invoices WHERE id = ?".to_string(),
                reason: QueryParseError::UnknownTable("invoices".to_string()),
            }
        );
    }

    #[test]
    fn test_detached_alias_is_reported() {
        let p = parsed("SELECT * FROM users u, products p WHERE u.user_id = ?");
        assert!(p.joins.is_empty());
        assert_eq!(p.detached, vec!["p (no join condition)".to_string()]);
    }
}
