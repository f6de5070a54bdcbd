//! Row type for TableDB
//!
//! A row holds one value per schema column, in schema order.

use crate::catalog::{Schema, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A row in a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a new row from values
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get a value by index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Set a value by index
    pub fn set(&mut self, index: usize, value: Value) {
        if index < self.values.len() {
            self.values[index] = value;
        }
    }

    /// Get all values
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if row is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Project specific columns
    pub fn project(&self, indices: &[usize]) -> Row {
        let values = indices
            .iter()
            .filter_map(|&i| self.values.get(i).cloned())
            .collect();
        Row::new(values)
    }

    /// Pair each value with its column name, in column order
    pub fn to_record(&self, columns: &[String]) -> IndexMap<String, Value> {
        columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// Check that the row has one value of the right type per column
    pub fn matches_schema(&self, schema: &Schema) -> bool {
        self.values.len() == schema.column_count()
            && self
                .values
                .iter()
                .zip(schema.columns())
                .all(|(value, column)| value.fits(&column.data_type))
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}
