//! Data types for TableDB
//!
//! This module defines the column types supported by the engine and how their
//! textual form is recognized.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 64-bit signed integer
    Int,
    /// Variable-length character string with max length (in characters)
    Varchar(usize),
    /// Unlimited text
    Text,
    /// Boolean type
    Boolean,
    /// Decimal number
    Decimal,
    /// Calendar date (YYYY-MM-DD)
    Date,
}

/// Parse a column type such as `INT`, `varchar(100)` or `DATE`.
///
/// Keywords are matched case-insensitively. `VARCHAR` requires a positive
/// integer length in parentheses; no other type takes parameters.
pub fn parse_column_type(text: &str) -> Result<DataType> {
    let text = text.trim();
    let invalid = || Error::InvalidType(text.to_string());

    let (keyword, params) = match text.find('(') {
        Some(open) => {
            let close = text.rfind(')').ok_or_else(invalid)?;
            if close != text.len() - 1 || close < open {
                return Err(invalid());
            }
            (text[..open].trim(), Some(text[open + 1..close].trim()))
        }
        None => (text, None),
    };

    match (keyword.to_uppercase().as_str(), params) {
        ("INT" | "INTEGER", None) => Ok(DataType::Int),
        ("TEXT", None) => Ok(DataType::Text),
        ("BOOLEAN", None) => Ok(DataType::Boolean),
        ("DECIMAL", None) => Ok(DataType::Decimal),
        ("DATE", None) => Ok(DataType::Date),
        ("VARCHAR", Some(len)) => {
            if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            match len.parse::<usize>() {
                Ok(n) if n > 0 => Ok(DataType::Varchar(n)),
                _ => Err(invalid()),
            }
        }
        _ => Err(invalid()),
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_column_type(s)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Text => write!(f, "TEXT"),
            DataType::Boolean => write!(f, "BOOLEAN"),
            DataType::Decimal => write!(f, "DECIMAL"),
            DataType::Date => write!(f, "DATE"),
        }
    }
}
