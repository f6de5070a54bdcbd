//! TableDB - A small single-node relational data engine written in Rust
//!
//! This library provides the core components of the engine:
//! - Value and schema model (types, literals, coercion, constraints)
//! - Record store (one atomically replaced file per table)
//! - SQL parsing (lexer, parser, AST)
//! - Statement execution with constraint enforcement
//!
//! ```no_run
//! use tabledb::executor::ExecutionEngine;
//! use tabledb::storage::RecordStore;
//!
//! let store = RecordStore::open("data").unwrap();
//! store.create_database("shop").unwrap();
//!
//! let engine = ExecutionEngine::new(store);
//! let result = engine.execute("shop", "CREATE TABLE items (id INT PRIMARY KEY)");
//! assert!(result.is_success());
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod sql;
pub mod storage;

pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result};
pub use executor::{ExecutionEngine, ExecutionResult, ResultKind};
