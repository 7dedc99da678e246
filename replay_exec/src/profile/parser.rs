//! # Profile persistence
//!
//! Profiles are stored as one row per point, `[pos_0, ff_0, ..., dt]`, in any
//! `RowStore`. Every read goes back to the store, nothing is cached.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, error, warn};

use util::rows::{RowStore, RowStoreError};

use super::{Profile, ProfileError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Reads and writes profiles from a row store.
pub struct ProfileParser<S: RowStore> {
    store: S,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProfileParserError {
    #[error("Refusing to write an empty profile")]
    EmptyProfile,

    #[error("Row store error: {0}")]
    StoreError(#[from] RowStoreError),

    #[error("Cannot parse field {1} of row {0} ({2:?}) as a number")]
    InvalidField(usize, usize, String),

    #[error("Stored rows do not form a valid profile: {0}")]
    InvalidProfile(#[from] ProfileError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<S: RowStore> ProfileParser<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write the profile into the store, replacing its content.
    pub fn write(&self, profile: &Profile) -> Result<(), ProfileParserError> {
        if profile.is_empty() {
            warn!("Not writing an empty profile");
            return Err(ProfileParserError::EmptyProfile);
        }

        let rows: Vec<Vec<String>> = profile
            .to_rows()
            .iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect();

        self.store.write(&rows)?;

        debug!(
            "Wrote profile of {} points on {} channels",
            profile.length(),
            profile.num_channels()
        );

        Ok(())
    }

    /// Read a profile from the store.
    pub fn read(&self) -> Result<Profile, ProfileParserError> {
        let rows = self.store.read()?;

        let mut values = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let mut parsed = Vec::with_capacity(row.len());
            for (j, field) in row.iter().enumerate() {
                let v = field
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ProfileParserError::InvalidField(i, j, field.clone()))?;
                parsed.push(v);
            }
            values.push(parsed);
        }

        Ok(Profile::from_rows(&values)?)
    }

    /// Read a profile from the store, or an empty profile if it can't be
    /// read.
    pub fn load_or_empty(&self, default_dt_ms: u32) -> Profile {
        match self.read() {
            Ok(p) => p,
            Err(e) => {
                error!("Could not load profile, using an empty one: {}", e);
                Profile::empty(default_dt_ms)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::profile::test::ramp_profile;
    use std::cell::RefCell;
    use util::rows::CsvFile;

    /// In-memory store
    #[derive(Default)]
    struct MemStore {
        rows: RefCell<Option<Vec<Vec<String>>>>,
    }

    impl RowStore for MemStore {
        fn read(&self) -> Result<Vec<Vec<String>>, RowStoreError> {
            match *self.rows.borrow() {
                Some(ref r) => Ok(r.clone()),
                None => Err(RowStoreError::NotFound("mem".into())),
            }
        }

        fn write(&self, rows: &[Vec<String>]) -> Result<(), RowStoreError> {
            *self.rows.borrow_mut() = Some(rows.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_write_read_mem() {
        let parser = ProfileParser::new(MemStore::default());
        let profile = ramp_profile(2, 20, 10);

        parser.write(&profile).unwrap();
        assert_eq!(parser.store().rows.borrow().as_ref().unwrap().len(), 20);
        assert_eq!(parser.read().unwrap(), profile);
    }

    #[test]
    fn test_write_read_csv() {
        let path = std::env::temp_dir()
            .join(format!("replay_profile_{}", std::process::id()))
            .join("profile_rw");
        let parser = ProfileParser::new(CsvFile::new(path));

        let profile = ramp_profile(3, 7, 20);
        parser.write(&profile).unwrap();

        let read = parser.read().unwrap();
        assert_eq!(read, profile);
        assert_eq!(read.dt_ms(), 20);
    }

    #[test]
    fn test_empty_not_written() {
        let parser = ProfileParser::new(MemStore::default());

        match parser.write(&Profile::empty(10)) {
            Err(ProfileParserError::EmptyProfile) => (),
            r => panic!("Expected EmptyProfile, got {:?}", r),
        }
        assert!(parser.store().rows.borrow().is_none());
    }

    #[test]
    fn test_load_or_empty() {
        let parser = ProfileParser::new(MemStore::default());
        let p = parser.load_or_empty(10);
        assert!(p.is_empty());
        assert_eq!(p.dt_ms(), 10);

        parser
            .store()
            .write(&[vec!["1.0".into(), "abc".into(), "10".into()]])
            .unwrap();
        match parser.read() {
            Err(ProfileParserError::InvalidField(0, 1, _)) => (),
            r => panic!("Expected InvalidField, got {:?}", r),
        }
        assert!(parser.load_or_empty(10).is_empty());
    }
}
