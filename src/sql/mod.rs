//! SQL front end
//!
//! Tokenizer, AST and recursive-descent parser for the statements TableDB
//! understands: CREATE TABLE, DROP TABLE, SELECT, INSERT, UPDATE and DELETE.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{
    Aggregate, AggregateFunction, CreateTableStatement, DeleteStatement, DropTableStatement,
    InsertStatement, Literal, OrderBy, Predicate, Projection, SelectItem, SelectStatement,
    Statement, UpdateStatement,
};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Located, Token};

use crate::error::Result;

/// Parse a single statement
pub fn parse(sql: &str) -> Result<Statement> {
    Parser::new(sql)?.parse()
}

/// Parse a `;`-separated batch of statements
pub fn parse_all(sql: &str) -> Result<Vec<Statement>> {
    Parser::new(sql)?.parse_all()
}
