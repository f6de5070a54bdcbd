//! Disk manager for TableDB
//!
//! This module handles the on-disk layout (one directory per database, one
//! file per table) and the atomic replacement of table files.

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of committed table files
pub const TABLE_EXTENSION: &str = "json";

/// Extension of in-flight table files
pub const TEMP_EXTENSION: &str = "json.tmp";

/// Disk manager
#[derive(Debug, Clone)]
pub struct DiskManager {
    /// Directory where databases are stored
    data_dir: PathBuf,
}

impl DiskManager {
    /// Create a disk manager rooted at `data_dir`, creating it if needed
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn database_path(&self, database: &str) -> PathBuf {
        self.data_dir.join(database)
    }

    pub fn table_path(&self, database: &str, table: &str) -> PathBuf {
        self.database_path(database)
            .join(format!("{}.{}", table, TABLE_EXTENSION))
    }

    fn temp_path(&self, database: &str, table: &str) -> PathBuf {
        self.database_path(database)
            .join(format!("{}.{}", table, TEMP_EXTENSION))
    }

    /// Create a database directory. Returns false if it already existed.
    pub fn create_database_dir(&self, database: &str) -> Result<bool> {
        match fs::create_dir(self.database_path(database)) {
            Ok(()) => {
                sync_dir(&self.data_dir);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn remove_database_dir(&self, database: &str) -> Result<()> {
        fs::remove_dir_all(self.database_path(database))?;
        sync_dir(&self.data_dir);
        Ok(())
    }

    pub fn database_exists(&self, database: &str) -> bool {
        self.database_path(database).is_dir()
    }

    pub fn table_exists(&self, database: &str, table: &str) -> bool {
        self.table_path(database, table).is_file()
    }

    /// List database directory names, sorted
    pub fn list_databases(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// List committed table names of a database, sorted. In-flight temporary
    /// files are skipped.
    pub fn list_tables(&self, database: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.database_path(database))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a committed table file
    pub fn read_table(&self, database: &str, table: &str) -> Result<Vec<u8>> {
        let path = self.table_path(database, table);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::TableNotFound(table.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a table file atomically.
    ///
    /// The new contents are written and synced to a temporary file in the same
    /// directory, which is then renamed over the committed file. Readers see
    /// either the old file or the new one, never a partial write.
    pub fn write_table_atomic(&self, database: &str, table: &str, bytes: &[u8]) -> Result<()> {
        let tmp_path = self.temp_path(database, table);
        let path = self.table_path(database, table);

        let result = (|| -> Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            drop(file);
            fs::rename(&tmp_path, &path)?;
            Ok(())
        })();

        if let Err(e) = result {
            // Best effort; a leftover temp file is ignored by readers anyway
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        sync_dir(&self.database_path(database));
        debug!(path = %path.display(), bytes = bytes.len(), "table file replaced");
        Ok(())
    }

    pub fn remove_table(&self, database: &str, table: &str) -> Result<()> {
        let path = self.table_path(database, table);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::TableNotFound(table.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        let _ = fs::remove_file(self.temp_path(database, table));
        sync_dir(&self.database_path(database));
        Ok(())
    }
}

/// Flush directory metadata so a rename survives a crash. Not every platform
/// allows opening a directory, so failures are only logged.
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        warn!(dir = %dir.display(), error = %e, "could not sync directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DiskManager) {
        let dir = tempfile::Builder::new().prefix("tabledb").tempdir().unwrap();
        let disk = DiskManager::new(dir.path()).unwrap();
        (dir, disk)
    }

    #[test]
    fn test_database_dirs() {
        let (_dir, disk) = setup();
        assert!(disk.create_database_dir("shop").unwrap());
        assert!(!disk.create_database_dir("shop").unwrap());
        assert!(disk.create_database_dir("analytics").unwrap());

        assert_eq!(disk.list_databases().unwrap(), vec!["analytics", "shop"]);

        disk.remove_database_dir("shop").unwrap();
        assert!(!disk.database_exists("shop"));
    }

    #[test]
    fn test_atomic_write_and_read() {
        let (_dir, disk) = setup();
        disk.create_database_dir("shop").unwrap();

        disk.write_table_atomic("shop", "orders", b"first").unwrap();
        disk.write_table_atomic("shop", "orders", b"second").unwrap();

        assert_eq!(disk.read_table("shop", "orders").unwrap(), b"second");
        assert!(!disk.temp_path("shop", "orders").exists());
    }

    #[test]
    fn test_list_tables_skips_temp_files() {
        let (_dir, disk) = setup();
        disk.create_database_dir("shop").unwrap();
        disk.write_table_atomic("shop", "orders", b"{}").unwrap();
        disk.write_table_atomic("shop", "customers", b"{}").unwrap();

        // Simulate a crash between writing the temp file and the rename
        fs::write(disk.temp_path("shop", "invoices"), b"{\"partial").unwrap();

        assert_eq!(disk.list_tables("shop").unwrap(), vec!["customers", "orders"]);
        assert!(matches!(
            disk.read_table("shop", "invoices"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_remove_missing_table() {
        let (_dir, disk) = setup();
        disk.create_database_dir("shop").unwrap();
        assert!(matches!(
            disk.remove_table("shop", "nope"),
            Err(Error::TableNotFound(_))
        ));
    }
}
