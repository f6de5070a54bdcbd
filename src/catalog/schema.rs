//! Schema definitions for TableDB
//!
//! This module defines table schemas, column metadata and column constraints.

use super::types::DataType;
use super::value::{coerce, Literal, Value};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Column constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Constraint {
    PrimaryKey,
    Unique,
    NotNull,
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::PrimaryKey => write!(f, "PRIMARY KEY"),
            Constraint::Unique => write!(f, "UNIQUE"),
            Constraint::NotNull => write!(f, "NOT NULL"),
        }
    }
}

/// Column definition in a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Data type
    pub data_type: DataType,
    /// Declared constraints
    pub constraints: BTreeSet<Constraint>,
}

impl Column {
    /// Create a new unconstrained column
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            constraints: BTreeSet::new(),
        }
    }

    /// Add a constraint. Adding one twice has no further effect.
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.insert(constraint);
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.constraints.contains(&Constraint::PrimaryKey)
    }

    /// UNIQUE, either declared or implied by PRIMARY KEY
    pub fn is_unique(&self) -> bool {
        self.is_primary_key() || self.constraints.contains(&Constraint::Unique)
    }

    /// NOT NULL, either declared or implied by PRIMARY KEY
    pub fn is_not_null(&self) -> bool {
        self.is_primary_key() || self.constraints.contains(&Constraint::NotNull)
    }

    /// Coerce a literal into a value for this column
    pub fn coerce(&self, literal: &Literal) -> Result<Value> {
        coerce(literal, &self.data_type)
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        for constraint in &self.constraints {
            write!(f, " {}", constraint)?;
        }
        Ok(())
    }
}

/// Table schema - the ordered column list of a table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema from a list of columns
    pub fn from_columns(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Add a column to the schema
    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Check the table-level invariants: at least one column, unique column
    /// names and at most one primary key.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::InvalidSchema(
                "a table needs at least one column".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        let primary_keys = self.primary_key_columns();
        if primary_keys.len() > 1 {
            let names: Vec<&str> = primary_keys.iter().map(|c| c.name.as_str()).collect();
            return Err(Error::InvalidSchema(format!(
                "multiple primary keys ({})",
                names.join(", ")
            )));
        }

        Ok(())
    }

    /// Get column by name
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get column index by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Get all columns
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get primary key columns
    pub fn primary_key_columns(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.is_primary_key()).collect()
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
