//! Error types for TableDB
//!
//! This module defines all error types used throughout the engine, and the
//! coarse classification reported back across the executor boundary.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The main error type for TableDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Lexer Errors ==========
    #[error("Syntax error: unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),

    #[error("Syntax error: unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("Syntax error: invalid number format at position {0}")]
    InvalidNumber(usize),

    // ========== Parser Errors ==========
    #[error("Syntax error at position {position}: unexpected token '{found}', expected {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("Syntax error at position {position}: unknown statement '{found}', expected CREATE, DROP, SELECT, INSERT, UPDATE or DELETE")]
    UnknownStatement { found: String, position: usize },

    #[error("Syntax error: {0} requires a WHERE clause")]
    MissingWhere(&'static str),

    #[error("Syntax error at position {position}: {message}")]
    ParseError { message: String, position: usize },

    #[error("Syntax error: {0}")]
    InvalidGrouping(String),

    // ========== Schema Errors ==========
    #[error("Schema error: unknown column type '{0}'")]
    InvalidType(String),

    #[error("Schema error: {0}")]
    InvalidSchema(String),

    #[error("Schema error: invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },

    // ========== Type Errors ==========
    #[error("Type error: cannot convert {found} to {expected}")]
    TypeMismatch { expected: String, found: String },

    #[error("Type error: value of length {length} exceeds {data_type}")]
    ValueTooLong { data_type: String, length: usize },

    #[error("Type error: {function} requires a numeric column, '{column}' is {data_type}")]
    InvalidAggregate {
        function: String,
        column: String,
        data_type: String,
    },

    #[error("Type error: {0} is out of range for INT")]
    NumericOverflow(String),

    #[error("Type error: row {row} does not match the schema of table '{table}'")]
    RowMismatch { table: String, row: usize },

    #[error("Arity error: table '{table}' has {expected} column(s) but {found} value(s) were supplied")]
    ArityMismatch {
        table: String,
        expected: usize,
        found: usize,
    },

    // ========== Constraint Errors ==========
    #[error("Constraint violation: null value not allowed for column '{0}'")]
    NullNotAllowed(String),

    #[error("Constraint violation: duplicate primary key value {value} for column '{column}' in table '{table}'")]
    PrimaryKeyViolation {
        table: String,
        column: String,
        value: String,
    },

    #[error("Constraint violation: duplicate value {value} for unique column '{column}' in table '{table}'")]
    UniqueViolation {
        table: String,
        column: String,
        value: String,
    },

    // ========== Catalog Errors ==========
    #[error("Catalog error: database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Catalog error: database '{0}' already exists")]
    DatabaseAlreadyExists(String),

    #[error("Catalog error: table '{0}' not found")]
    TableNotFound(String),

    #[error("Catalog error: table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Catalog error: column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    // ========== Storage Errors ==========
    #[error("Storage error: corrupted table file '{path}': {reason}")]
    Corrupted { path: String, reason: String },

    #[error("Storage error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Error classes reported to callers of the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Statement text could not be parsed
    Syntax,
    /// CREATE TABLE definition or object name invalid
    Schema,
    /// Literal incompatible with the declared column type
    TypeMismatch,
    /// Wrong value count on INSERT
    Arity,
    /// NOT NULL / UNIQUE / PRIMARY KEY violation
    Constraint,
    /// Unknown database, table or column
    NotFound,
    /// Duplicate database or table name
    AlreadyExists,
    /// Durable storage read/write failure
    Io,
}

impl ErrorKind {
    /// Only storage failures are fatal for the request that hit them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::TypeMismatch => "TypeMismatchError",
            ErrorKind::Arity => "ArityError",
            ErrorKind::Constraint => "ConstraintError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::AlreadyExists => "AlreadyExistsError",
            ErrorKind::Io => "IOError",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnexpectedCharacter(..)
            | Error::UnterminatedString(_)
            | Error::InvalidNumber(_)
            | Error::UnexpectedToken { .. }
            | Error::UnknownStatement { .. }
            | Error::MissingWhere(_)
            | Error::ParseError { .. }
            | Error::InvalidGrouping(_) => ErrorKind::Syntax,

            Error::InvalidType(_) | Error::InvalidSchema(_) | Error::InvalidName { .. } => {
                ErrorKind::Schema
            }

            Error::TypeMismatch { .. }
            | Error::ValueTooLong { .. }
            | Error::InvalidAggregate { .. }
            | Error::NumericOverflow(_)
            | Error::RowMismatch { .. } => ErrorKind::TypeMismatch,

            Error::ArityMismatch { .. } => ErrorKind::Arity,

            Error::NullNotAllowed(_)
            | Error::PrimaryKeyViolation { .. }
            | Error::UniqueViolation { .. } => ErrorKind::Constraint,

            Error::DatabaseNotFound(_) | Error::TableNotFound(_) | Error::ColumnNotFound(..) => {
                ErrorKind::NotFound
            }

            Error::DatabaseAlreadyExists(_) | Error::TableAlreadyExists(_) => {
                ErrorKind::AlreadyExists
            }

            Error::Corrupted { .. } | Error::Serialization(_) | Error::IoError(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias for TableDB operations
pub type Result<T> = std::result::Result<T, Error>;
