//! Record and import-run persistence.
//!
//! The engines only see the [`RecordStore`] trait. The store, not the import pipeline, is the
//! authority on `(resource_id, resource_type)` uniqueness: `insert_record` must fail with
//! [`RecordError::DuplicateRecord`](crate::RecordError::DuplicateRecord) atomically when the
//! key already exists.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`] keeps everything behind a `RwLock` for the lifetime of the process.
//! - [`DirectoryStore`] mirrors a `MemoryStore` into JSON files under a data directory.

mod directory;
mod memory;

pub use directory::DirectoryStore;
pub use memory::MemoryStore;

use crate::model::{ImportRun, NewRecord, Record};
use crate::RecordResult;
use uuid::Uuid;

/// Filter for record lookups. Empty `resource_types` matches every type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub resource_types: Vec<String>,
    pub subject: Option<String>,
    pub import_run_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn import_run(mut self, import_run_id: Uuid) -> Self {
        self.import_run_id = Some(import_run_id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` passes every filter (the limit is applied by the store).
    pub fn matches(&self, record: &Record) -> bool {
        if !self.resource_types.is_empty()
            && !self.resource_types.iter().any(|t| *t == record.resource_type)
        {
            return false;
        }
        if let Some(subject) = &self.subject {
            if record.subject_reference.as_deref() != Some(subject.as_str()) {
                return false;
            }
        }
        if let Some(run_id) = self.import_run_id {
            if record.import_run_id != run_id {
                return false;
            }
        }
        true
    }
}

/// Persistence seam used by the import pipeline and every read-side service.
pub trait RecordStore: Send + Sync {
    /// Records matching `query`, newest first, truncated to `query.limit` if set.
    fn find_records(&self, query: &RecordQuery) -> RecordResult<Vec<Record>>;

    /// The record stored under `(resource_id, resource_type)`, if any.
    fn find_by_key(&self, resource_id: &str, resource_type: &str)
        -> RecordResult<Option<Record>>;

    /// The newest record with the given resource id, whatever its type.
    fn find_by_resource_id(&self, resource_id: &str) -> RecordResult<Option<Record>>;

    /// Insert a new record, failing with `DuplicateRecord` if the key is taken.
    fn insert_record(&self, record: NewRecord) -> RecordResult<Record>;

    fn create_run(&self, run: &ImportRun) -> RecordResult<()>;

    /// Replace the stored run with the same id.
    fn update_run(&self, run: &ImportRun) -> RecordResult<()>;

    /// Every run, oldest first.
    fn list_runs(&self) -> RecordResult<Vec<ImportRun>>;
}
