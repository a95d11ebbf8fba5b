//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services.
//! Nothing in this crate reads process-wide environment variables during request handling;
//! the binaries read the environment and hand the raw values to the helpers below.

use crate::constants::MAX_QUERY_ROWS;
use crate::store::{DirectoryStore, MemoryStore, RecordStore};
use crate::{RecordError, RecordResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: Option<PathBuf>,
    max_query_rows: usize,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// `data_dir` of `None` selects the in-memory store. `max_query_rows` must lie in
    /// `1..=MAX_QUERY_ROWS`.
    pub fn new(data_dir: Option<PathBuf>, max_query_rows: usize) -> RecordResult<Self> {
        if max_query_rows == 0 || max_query_rows > MAX_QUERY_ROWS {
            return Err(RecordError::InvalidInput(format!(
                "max_query_rows must be between 1 and {MAX_QUERY_ROWS}"
            )));
        }

        Ok(Self {
            data_dir,
            max_query_rows,
        })
    }

    /// Configuration backed by the in-memory store with default limits.
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            max_query_rows: MAX_QUERY_ROWS,
        }
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn max_query_rows(&self) -> usize {
        self.max_query_rows
    }

    /// Open the record store this configuration describes.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created or its files cannot be read.
    pub fn open_store(&self) -> RecordResult<Arc<dyn RecordStore>> {
        match &self.data_dir {
            Some(dir) => Ok(Arc::new(DirectoryStore::open(dir)?)),
            None => Ok(Arc::new(MemoryStore::new())),
        }
    }
}

/// Parse the data directory from an optional raw value.
///
/// `None` or a blank value selects the in-memory store.
pub fn data_dir_from_env_value(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Parse the query row cap from an optional raw value.
///
/// If `value` is `None` or empty/whitespace, returns [`MAX_QUERY_ROWS`].
pub fn max_query_rows_from_env_value(value: Option<String>) -> RecordResult<usize> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(raw) = value else {
        return Ok(MAX_QUERY_ROWS);
    };

    let parsed = raw.parse::<usize>().map_err(|_| {
        RecordError::InvalidInput(format!("max query rows is not a positive integer: {raw}"))
    })?;
    if parsed == 0 || parsed > MAX_QUERY_ROWS {
        return Err(RecordError::InvalidInput(format!(
            "max query rows must be between 1 and {MAX_QUERY_ROWS}, got {parsed}"
        )));
    }
    Ok(parsed)
}
