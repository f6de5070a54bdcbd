//! SQL Abstract Syntax Tree (AST)
//!
//! This module defines the AST nodes for TableDB statements.

use crate::catalog::Column;
pub use crate::catalog::Literal;
use std::fmt;

/// A SQL statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// CREATE TABLE statement
    CreateTable(CreateTableStatement),
    /// DROP TABLE statement
    DropTable(DropTableStatement),
    /// SELECT statement
    Select(SelectStatement),
    /// INSERT statement
    Insert(InsertStatement),
    /// UPDATE statement
    Update(UpdateStatement),
    /// DELETE statement
    Delete(DeleteStatement),
}

impl Statement {
    /// Name of the table the statement targets
    pub fn table(&self) -> &str {
        match self {
            Statement::CreateTable(s) => &s.table,
            Statement::DropTable(s) => &s.table,
            Statement::Select(s) => &s.table,
            Statement::Insert(s) => &s.table,
            Statement::Update(s) => &s.table,
            Statement::Delete(s) => &s.table,
        }
    }

    /// Leading keyword(s), used in logs and result messages
    pub fn verb(&self) -> &'static str {
        match self {
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DropTable(_) => "DROP TABLE",
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
        }
    }
}

/// `column = literal`, the only predicate form supported in WHERE
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub value: Literal,
}

/// Aggregate functions available in a SELECT list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
}

impl AggregateFunction {
    /// Look up a function by name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "COUNT" => Some(AggregateFunction::Count),
            "SUM" => Some(AggregateFunction::Sum),
            "AVG" => Some(AggregateFunction::Avg),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
        }
    }
}

/// `COUNT(*)`, `COUNT(col)`, `SUM(col)` or `AVG(col)`
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    /// None for `COUNT(*)`
    pub column: Option<String>,
}

impl Aggregate {
    /// Name of the result column: `count`, `count_<col>`, `sum_<col>` or
    /// `avg_<col>`
    pub fn output_name(&self) -> String {
        let function = self.function.to_string().to_lowercase();
        match &self.column {
            Some(column) => format!("{}_{}", function, column),
            None => function,
        }
    }
}

/// One entry of a SELECT list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Column(String),
    Aggregate(Aggregate),
}

impl SelectItem {
    pub fn output_name(&self) -> String {
        match self {
            SelectItem::Column(name) => name.clone(),
            SelectItem::Aggregate(aggregate) => aggregate.output_name(),
        }
    }
}

impl From<&str> for SelectItem {
    fn from(name: &str) -> Self {
        SelectItem::Column(name.to_string())
    }
}

/// SELECT list
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// All columns (*)
    Wildcard,
    /// Columns and aggregates, in the order written
    Columns(Vec<SelectItem>),
}

impl Projection {
    pub fn has_aggregates(&self) -> bool {
        match self {
            Projection::Wildcard => false,
            Projection::Columns(items) => items
                .iter()
                .any(|item| matches!(item, SelectItem::Aggregate(_))),
        }
    }
}

/// ORDER BY clause
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub projection: Projection,
    pub table: String,
    pub where_clause: Option<Predicate>,
    pub group_by: Option<String>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    /// Whether rows are folded into groups before ORDER BY and LIMIT
    pub fn is_grouped(&self) -> bool {
        self.group_by.is_some() || self.projection.has_aggregates()
    }

    /// Check the SELECT list of a grouped query: no `*`, and every plain
    /// column must be the GROUP BY column.
    pub fn check_grouping(&self) -> std::result::Result<(), String> {
        if !self.is_grouped() {
            return Ok(());
        }
        let items = match &self.projection {
            Projection::Wildcard => {
                return Err("SELECT * cannot be combined with GROUP BY or aggregates".to_string())
            }
            Projection::Columns(items) => items,
        };

        for item in items {
            if let SelectItem::Column(name) = item {
                if self.group_by.as_deref() != Some(name.as_str()) {
                    return Err(format!(
                        "column '{}' must appear in GROUP BY or inside an aggregate",
                        name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    /// Positional values, one per column
    pub values: Vec<Literal>,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    /// SET assignments (column, value), no column repeated
    pub assignments: Vec<(String, Literal)>,
    pub where_clause: Predicate,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub where_clause: Predicate,
}

/// CREATE TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub table: String,
    pub columns: Vec<Column>,
}

/// DROP TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStatement {
    pub table: String,
}
