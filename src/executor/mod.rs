//! Statement execution module
//!
//! This module contains the execution engine and its result type.

pub mod executor;

pub use executor::{ExecutionEngine, ExecutionResult, ResultKind};
