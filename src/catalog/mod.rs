//! Catalog module
//!
//! This module contains the value and schema model: data types, typed values,
//! literal coercion, columns and table schemas.

pub mod schema;
pub mod types;
pub mod value;

pub use schema::{Column, Constraint, Schema};
pub use types::{parse_column_type, DataType};
pub use value::{coerce, Date, Literal, Value};
