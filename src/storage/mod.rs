//! Storage engine module
//!
//! This module contains the record store components:
//! - Disk layout and atomic file replacement
//! - Row representation
//! - The record store API used by the executor and the outer API layer

pub mod disk;
pub mod row;
pub mod store;

pub use disk::DiskManager;
pub use row::Row;
pub use store::{DatabaseStats, RecordStore, TableStats};
