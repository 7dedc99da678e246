//! # Tabular row storage
//!
//! Recordings are persisted as plain rows of string fields. The `RowStore`
//! trait is all the rest of the software needs from storage, `CsvFile` is the
//! implementation backed by a headerless CSV file.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use csv::{ReaderBuilder, WriterBuilder};
use log::debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Field separator used in row files
pub const SEPARATOR: u8 = b',';

/// Quote character used in row files
pub const QUOTE_CHAR: u8 = b'"';

/// Escape character used in row files
pub const ESCAPE_CHAR: u8 = b'\\';

/// Extension given to row files
pub const EXTENSION: &str = "csv";

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Something rows can be read from and written to.
pub trait RowStore {
    /// Read every row from the store.
    fn read(&self) -> Result<Vec<Vec<String>>, RowStoreError>;

    /// Write the rows into the store, replacing any previous content.
    fn write(&self, rows: &[Vec<String>]) -> Result<(), RowStoreError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A headerless CSV file.
#[derive(Debug, Clone)]
pub struct CsvFile {
    path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RowStoreError {
    #[error("Row file {0:?} does not exist")]
    NotFound(PathBuf),

    #[error("Could not create the directory for {0:?}: {1}")]
    CannotCreateDir(PathBuf, std::io::Error),

    #[error("CSV error on {0:?}: {1}")]
    CsvError(PathBuf, csv::Error),

    #[error("Could not flush {0:?}: {1}")]
    FlushError(PathBuf, std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CsvFile {
    /// Create a new CSV store at the given path, adding the `.csv` extension
    /// if the path has none.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            path.set_extension(EXTENSION);
        }

        Self { path }
    }

    /// Create a new CSV store for `file_name` inside `dir`.
    pub fn in_dir<D: AsRef<Path>>(dir: D, file_name: &str) -> Self {
        Self::new(dir.as_ref().join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowStore for CsvFile {
    fn read(&self) -> Result<Vec<Vec<String>>, RowStoreError> {
        if !self.path.exists() {
            return Err(RowStoreError::NotFound(self.path.clone()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(SEPARATOR)
            .quote(QUOTE_CHAR)
            .escape(Some(ESCAPE_CHAR))
            .from_path(&self.path)
            .map_err(|e| RowStoreError::CsvError(self.path.clone(), e))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| RowStoreError::CsvError(self.path.clone(), e))?;
            rows.push(record.iter().map(String::from).collect());
        }

        debug!("Read {} rows from {:?}", rows.len(), self.path);

        Ok(rows)
    }

    fn write(&self, rows: &[Vec<String>]) -> Result<(), RowStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RowStoreError::CannotCreateDir(self.path.clone(), e))?;
        }

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(SEPARATOR)
            .quote(QUOTE_CHAR)
            .escape(ESCAPE_CHAR)
            .double_quote(false)
            .from_path(&self.path)
            .map_err(|e| RowStoreError::CsvError(self.path.clone(), e))?;

        for row in rows {
            writer
                .write_record(row)
                .map_err(|e| RowStoreError::CsvError(self.path.clone(), e))?;
        }

        writer
            .flush()
            .map_err(|e| RowStoreError::FlushError(self.path.clone(), e))?;

        debug!("Wrote {} rows to {:?}", rows.len(), self.path);

        Ok(())
    }
}
