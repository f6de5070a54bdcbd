//! Record store for TableDB
//!
//! Durable, synchronous access to tables addressed by (database, table). Each
//! table is one self-contained JSON file holding its schema and all of its
//! rows; every mutation rewrites that one file atomically.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error, info};

use super::disk::DiskManager;
use super::row::Row;
use crate::catalog::Schema;
use crate::error::{Error, Result};

/// Version of the table file layout
pub const FORMAT_VERSION: u32 = 1;

/// Serializable form of a table file
#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    format: u32,
    name: String,
    schema: Schema,
    rows: Vec<Row>,
}

/// Table statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub name: String,
    pub column_count: usize,
    pub row_count: usize,
}

/// Per-table statistics of one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub name: String,
    pub tables: Vec<TableStats>,
    pub total_rows: usize,
}

/// File-backed record store
#[derive(Debug, Clone)]
pub struct RecordStore {
    disk: DiskManager,
}

impl RecordStore {
    /// Open (or initialize) a store rooted at `data_dir`
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let disk = DiskManager::new(data_dir)?;
        debug!(data_dir = %disk.data_dir().display(), "record store opened");
        Ok(Self { disk })
    }

    // ========== Databases ==========

    /// Create a new, empty database
    pub fn create_database(&self, name: &str) -> Result<()> {
        validate_name("database", name)?;
        if !self.disk.create_database_dir(name)? {
            return Err(Error::DatabaseAlreadyExists(name.to_string()));
        }
        info!(database = %name, "database created");
        Ok(())
    }

    /// Drop a database together with all of its tables
    pub fn drop_database(&self, name: &str) -> Result<()> {
        self.require_database(name)?;
        self.disk.remove_database_dir(name).map_err(log_io)?;
        info!(database = %name, "database dropped");
        Ok(())
    }

    pub fn database_exists(&self, name: &str) -> bool {
        validate_name("database", name).is_ok() && self.disk.database_exists(name)
    }

    /// List database names in lexicographic order
    pub fn list_databases(&self) -> Result<Vec<String>> {
        self.disk.list_databases()
    }

    // ========== Tables ==========

    /// List table names of a database in lexicographic order
    pub fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        self.require_database(database)?;
        self.disk.list_tables(database)
    }

    pub fn table_exists(&self, database: &str, name: &str) -> bool {
        self.database_exists(database)
            && validate_name("table", name).is_ok()
            && self.disk.table_exists(database, name)
    }

    /// Create a table with the given schema and no rows
    pub fn create_table(&self, database: &str, name: &str, schema: Schema) -> Result<()> {
        self.require_database(database)?;
        validate_name("table", name)?;
        if self.disk.table_exists(database, name) {
            return Err(Error::TableAlreadyExists(name.to_string()));
        }
        schema.validate()?;

        self.write(database, name, &schema, &[])?;
        info!(
            database = %database,
            table = %name,
            columns = schema.column_count(),
            "table created"
        );
        Ok(())
    }

    /// Drop a table and its rows
    pub fn drop_table(&self, database: &str, name: &str) -> Result<()> {
        self.require_table(database, name)?;
        self.disk.remove_table(database, name).map_err(log_io)?;
        info!(database = %database, table = %name, "table dropped");
        Ok(())
    }

    /// Load a table's schema and all of its rows, in storage order
    pub fn load_table(&self, database: &str, name: &str) -> Result<(Schema, Vec<Row>)> {
        self.require_table(database, name)?;
        let bytes = self.disk.read_table(database, name).map_err(log_io)?;
        let path = self.disk.table_path(database, name).display().to_string();

        let file: TableFile = serde_json::from_slice(&bytes).map_err(|e| {
            log_io(Error::Corrupted {
                path: path.clone(),
                reason: e.to_string(),
            })
        })?;

        if file.format != FORMAT_VERSION {
            return Err(log_io(Error::Corrupted {
                path,
                reason: format!("unsupported format version {}", file.format),
            }));
        }
        if let Err(e) = file.schema.validate() {
            return Err(log_io(Error::Corrupted {
                path,
                reason: e.to_string(),
            }));
        }
        if let Some(pos) = file.rows.iter().position(|r| !r.matches_schema(&file.schema)) {
            return Err(log_io(Error::Corrupted {
                path,
                reason: format!("row {} does not match the table schema", pos),
            }));
        }

        debug!(database = %database, table = %name, rows = file.rows.len(), "table loaded");
        Ok((file.schema, file.rows))
    }

    /// Load only the schema of a table
    pub fn load_schema(&self, database: &str, name: &str) -> Result<Schema> {
        self.load_table(database, name).map(|(schema, _)| schema)
    }

    /// Row and column counts of a table
    pub fn table_stats(&self, database: &str, name: &str) -> Result<TableStats> {
        let (schema, rows) = self.load_table(database, name)?;
        Ok(TableStats {
            name: name.to_string(),
            column_count: schema.column_count(),
            row_count: rows.len(),
        })
    }

    /// Statistics for every table of a database, in table-name order
    pub fn database_stats(&self, database: &str) -> Result<DatabaseStats> {
        let tables = self
            .list_tables(database)?
            .iter()
            .map(|table| self.table_stats(database, table))
            .collect::<Result<Vec<_>>>()?;
        let total_rows = tables.iter().map(|t| t.row_count).sum();

        Ok(DatabaseStats {
            name: database.to_string(),
            tables,
            total_rows,
        })
    }

    /// Replace the durable representation of an existing table. Nothing is
    /// written unless the schema is valid and every row matches it.
    pub fn persist_table(
        &self,
        database: &str,
        name: &str,
        schema: &Schema,
        rows: &[Row],
    ) -> Result<()> {
        self.require_table(database, name)?;
        schema.validate()?;
        if let Some(row) = rows.iter().position(|r| !r.matches_schema(schema)) {
            return Err(Error::RowMismatch {
                table: name.to_string(),
                row,
            });
        }
        self.write(database, name, schema, rows)?;
        debug!(database = %database, table = %name, rows = rows.len(), "table persisted");
        Ok(())
    }

    fn write(&self, database: &str, name: &str, schema: &Schema, rows: &[Row]) -> Result<()> {
        #[derive(Serialize)]
        struct TableFileRef<'a> {
            format: u32,
            name: &'a str,
            schema: &'a Schema,
            rows: &'a [Row],
        }

        let bytes = serde_json::to_vec_pretty(&TableFileRef {
            format: FORMAT_VERSION,
            name,
            schema,
            rows,
        })?;
        self.disk
            .write_table_atomic(database, name, &bytes)
            .map_err(log_io)
    }

    fn require_database(&self, database: &str) -> Result<()> {
        validate_name("database", database)?;
        if !self.disk.database_exists(database) {
            return Err(Error::DatabaseNotFound(database.to_string()));
        }
        Ok(())
    }

    fn require_table(&self, database: &str, name: &str) -> Result<()> {
        self.require_database(database)?;
        validate_name("table", name)?;
        if !self.disk.table_exists(database, name) {
            return Err(Error::TableNotFound(name.to_string()));
        }
        Ok(())
    }
}

/// Database and table names map directly to paths, so they must be a single
/// plain path component. Table names may not contain dots either.
fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\\')
        || (kind == "table" && name.contains('.'));

    if invalid {
        return Err(Error::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn log_io(err: Error) -> Error {
    if err.kind().is_fatal() {
        error!(error = %err, "storage failure");
    }
    err
}
