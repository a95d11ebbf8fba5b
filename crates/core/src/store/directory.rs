use super::memory::{MemoryStore, StoreState};
use super::{RecordQuery, RecordStore};
use crate::constants::{IMPORT_RUNS_FILENAME, RECORDS_FILENAME};
use crate::model::{ImportRun, NewRecord, Record};
use crate::{RecordError, RecordResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Record store persisted as JSON files under a data directory.
///
/// ```text
/// <data_dir>/
/// ├── records.json
/// └── import_runs.json
/// ```
///
/// Reads are served from memory. Inserted records are written together with the next run
/// change, so an import rewrites `records.json` when its run is created and finalised rather
/// than once per line. Run changes are written to disk before they are applied in memory;
/// a failed write leaves the in-memory tables as they were. Files are replaced through a
/// temporary file and a rename, so a crash leaves either the old or the new table.
#[derive(Debug)]
pub struct DirectoryStore {
    dir: PathBuf,
    inner: MemoryStore,
    // Guards the "records not yet on disk" flag and serialises writes.
    pending_records: Mutex<bool>,
}

impl DirectoryStore {
    /// Open (creating if needed) the store rooted at `dir`.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or an existing table cannot be
    /// read or parsed.
    pub fn open(dir: &Path) -> RecordResult<Self> {
        fs::create_dir_all(dir).map_err(RecordError::StorageDirCreation)?;

        let records: Vec<Record> = read_table(&dir.join(RECORDS_FILENAME))?;
        let runs: Vec<ImportRun> = read_table(&dir.join(IMPORT_RUNS_FILENAME))?;
        tracing::info!(
            "opened record store at {} ({} records, {} runs)",
            dir.display(),
            records.len(),
            runs.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            inner: MemoryStore::from_state(StoreState { records, runs }),
            pending_records: Mutex::new(false),
        })
    }

    fn lock(&self) -> RecordResult<MutexGuard<'_, bool>> {
        self.pending_records
            .lock()
            .map_err(|_| RecordError::StoreUnavailable("record store lock poisoned".into()))
    }

    /// Apply `change` to a copy of the runs table, persist pending records and the new
    /// runs table, then commit the runs in memory.
    fn change_runs<F>(&self, change: F) -> RecordResult<()>
    where
        F: FnOnce(&MemoryStore) -> RecordResult<()>,
    {
        let mut pending = self.lock()?;

        let scratch = MemoryStore::from_state(StoreState {
            records: Vec::new(),
            runs: self.inner.list_runs()?,
        });
        change(&scratch)?;
        let runs = scratch.list_runs()?;

        if *pending {
            let state = self.inner.snapshot()?;
            write_table(&self.dir.join(RECORDS_FILENAME), &state.records)?;
            *pending = false;
        }
        write_table(&self.dir.join(IMPORT_RUNS_FILENAME), &runs)?;

        self.inner.replace_runs(runs)
    }
}

impl RecordStore for DirectoryStore {
    fn find_records(&self, query: &RecordQuery) -> RecordResult<Vec<Record>> {
        self.inner.find_records(query)
    }

    fn find_by_key(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> RecordResult<Option<Record>> {
        self.inner.find_by_key(resource_id, resource_type)
    }

    fn find_by_resource_id(&self, resource_id: &str) -> RecordResult<Option<Record>> {
        self.inner.find_by_resource_id(resource_id)
    }

    fn insert_record(&self, record: NewRecord) -> RecordResult<Record> {
        let mut pending = self.lock()?;
        let stored = self.inner.insert_record(record)?;
        *pending = true;
        Ok(stored)
    }

    fn create_run(&self, run: &ImportRun) -> RecordResult<()> {
        self.change_runs(|runs| runs.create_run(run))
    }

    fn update_run(&self, run: &ImportRun) -> RecordResult<()> {
        self.change_runs(|runs| runs.update_run(run))
    }

    fn list_runs(&self) -> RecordResult<Vec<ImportRun>> {
        self.inner.list_runs()
    }
}

fn read_table<T: DeserializeOwned>(path: &Path) -> RecordResult<Vec<T>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).map_err(RecordError::Deserialization),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(RecordError::FileRead(e)),
    }
}

fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> RecordResult<()> {
    let contents = serde_json::to_vec_pretty(rows).map_err(RecordError::Serialization)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents).map_err(RecordError::FileWrite)?;
    fs::rename(&tmp, path).map_err(RecordError::FileWrite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImportStatus;
    use chrono::Utc;
    use serde_json::{json, Map};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn new_record(id: &str) -> NewRecord {
        NewRecord {
            resource_id: id.into(),
            resource_type: "Patient".into(),
            subject_reference: None,
            extracted_data: Map::new(),
            raw_data: json!({"id": id, "resourceType": "Patient"}),
            import_run_id: Uuid::nil(),
        }
    }

    #[test]
    fn open_creates_directory_and_starts_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = temp_dir.path().join("store");

        let store = DirectoryStore::open(&data_dir).expect("open store");
        assert!(data_dir.is_dir());
        assert!(store.find_records(&RecordQuery::new()).unwrap().is_empty());
        assert!(store.list_runs().unwrap().is_empty());
    }

    #[test]
    fn contents_survive_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut run = ImportRun::new(Utc::now());
        {
            let store = DirectoryStore::open(temp_dir.path()).expect("open store");
            store.create_run(&run).unwrap();
            store.insert_record(new_record("p1")).unwrap();
            run.status = ImportStatus::Completed;
            store.update_run(&run).unwrap();
        }

        assert!(temp_dir.path().join(RECORDS_FILENAME).is_file());
        assert!(temp_dir.path().join(IMPORT_RUNS_FILENAME).is_file());

        let reopened = DirectoryStore::open(temp_dir.path()).expect("reopen store");
        assert!(reopened.find_by_key("p1", "Patient").unwrap().is_some());
        let runs = reopened.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ImportStatus::Completed);

        let err = reopened
            .insert_record(new_record("p1"))
            .expect_err("key persisted across reopen");
        assert!(matches!(err, RecordError::DuplicateRecord { .. }));
    }

    #[test]
    fn records_are_written_with_the_next_run_change() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let records_path = temp_dir.path().join(RECORDS_FILENAME);
        let store = DirectoryStore::open(temp_dir.path()).expect("open store");

        let mut run = ImportRun::new(Utc::now());
        store.create_run(&run).expect("create run");
        store.insert_record(new_record("p1")).expect("insert p1");
        store.insert_record(new_record("p2")).expect("insert p2");
        assert!(!records_path.exists());

        run.status = ImportStatus::Completed;
        store.update_run(&run).expect("update run");

        let reopened = DirectoryStore::open(temp_dir.path()).expect("reopen store");
        assert_eq!(reopened.find_records(&RecordQuery::new()).unwrap().len(), 2);
    }

    #[test]
    fn failed_write_leaves_memory_unchanged_and_is_retried() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let records_path = temp_dir.path().join(RECORDS_FILENAME);
        let store = DirectoryStore::open(temp_dir.path()).expect("open store");

        let mut run = ImportRun::new(Utc::now());
        store.create_run(&run).expect("create run");
        store.insert_record(new_record("p1")).expect("insert p1");

        // A directory in place of the table makes the rename fail.
        fs::create_dir(&records_path).expect("block records table");
        run.status = ImportStatus::Completed;
        let err = store.update_run(&run).expect_err("write must fail");
        assert!(matches!(err, RecordError::FileWrite(_)));
        assert_eq!(store.list_runs().unwrap()[0].status, ImportStatus::Pending);

        fs::remove_dir(&records_path).expect("unblock records table");
        store.update_run(&run).expect("retry update");

        let reopened = DirectoryStore::open(temp_dir.path()).expect("reopen store");
        assert!(reopened.find_by_key("p1", "Patient").unwrap().is_some());
        assert_eq!(reopened.list_runs().unwrap()[0].status, ImportStatus::Completed);
    }

    #[test]
    fn corrupt_table_is_reported() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join(RECORDS_FILENAME), "not json").unwrap();

        let err = DirectoryStore::open(temp_dir.path()).expect_err("corrupt file");
        assert!(matches!(err, RecordError::Deserialization(_)));
    }
}
