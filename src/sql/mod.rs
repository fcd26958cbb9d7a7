//! Query text and relational type handling.

mod lexer;
mod parser;
mod types;

pub use lexer::Token;
pub use parser::{
    parse_query, ColumnRef, JoinClause, JoinKind, OrderItem, ParsedQuery, Projection,
    QueryParseError, SortOrder, TableRef,
};
pub use types::{map_type, CqlType, TypeTable};
