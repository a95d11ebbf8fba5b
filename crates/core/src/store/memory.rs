use super::{RecordQuery, RecordStore};
use crate::model::{ImportRun, NewRecord, Record};
use crate::{RecordError, RecordResult};
use chrono::Utc;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Tables held by a [`MemoryStore`], in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub(crate) records: Vec<Record>,
    pub(crate) runs: Vec<ImportRun>,
}

/// Process-local record store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub(crate) fn snapshot(&self) -> RecordResult<StoreState> {
        Ok(self.read()?.clone())
    }

    /// Swap in a runs table that has already been persisted.
    pub(crate) fn replace_runs(&self, runs: Vec<ImportRun>) -> RecordResult<()> {
        self.write()?.runs = runs;
        Ok(())
    }

    fn read(&self) -> RecordResult<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| RecordError::StoreUnavailable("record store lock poisoned".into()))
    }

    fn write(&self) -> RecordResult<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| RecordError::StoreUnavailable("record store lock poisoned".into()))
    }
}

impl RecordStore for MemoryStore {
    fn find_records(&self, query: &RecordQuery) -> RecordResult<Vec<Record>> {
        let state = self.read()?;

        // Insertion order is creation order, so walking backwards yields newest first.
        let matching = state.records.iter().rev().filter(|r| query.matches(r));
        let records = match query.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        };
        Ok(records)
    }

    fn find_by_key(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> RecordResult<Option<Record>> {
        let state = self.read()?;
        Ok(state
            .records
            .iter()
            .find(|r| r.resource_id == resource_id && r.resource_type == resource_type)
            .cloned())
    }

    fn find_by_resource_id(&self, resource_id: &str) -> RecordResult<Option<Record>> {
        let state = self.read()?;
        Ok(state
            .records
            .iter()
            .rev()
            .find(|r| r.resource_id == resource_id)
            .cloned())
    }

    fn insert_record(&self, record: NewRecord) -> RecordResult<Record> {
        let mut state = self.write()?;

        let taken = state.records.iter().any(|r| {
            r.resource_id == record.resource_id && r.resource_type == record.resource_type
        });
        if taken {
            return Err(RecordError::DuplicateRecord {
                resource_type: record.resource_type,
                resource_id: record.resource_id,
            });
        }

        let stored = record.into_record(Utc::now());
        state.records.push(stored.clone());
        Ok(stored)
    }

    fn create_run(&self, run: &ImportRun) -> RecordResult<()> {
        let mut state = self.write()?;
        if state.runs.iter().any(|r| r.id == run.id) {
            return Err(RecordError::InvalidInput(format!(
                "import run {} already exists",
                run.id
            )));
        }
        state.runs.push(run.clone());
        Ok(())
    }

    fn update_run(&self, run: &ImportRun) -> RecordResult<()> {
        let mut state = self.write()?;
        match state.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(RecordError::NotFound(format!("import run {}", run.id))),
        }
    }

    fn list_runs(&self) -> RecordResult<Vec<ImportRun>> {
        Ok(self.read()?.runs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImportStatus;
    use serde_json::{json, Map};
    use uuid::Uuid;

    fn new_record(id: &str, resource_type: &str, subject: Option<&str>) -> NewRecord {
        NewRecord {
            resource_id: id.into(),
            resource_type: resource_type.into(),
            subject_reference: subject.map(String::from),
            extracted_data: Map::new(),
            raw_data: json!({"id": id, "resourceType": resource_type}),
            import_run_id: Uuid::nil(),
        }
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let store = MemoryStore::new();
        store
            .insert_record(new_record("o1", "Observation", None))
            .expect("first insert");

        let err = store
            .insert_record(new_record("o1", "Observation", None))
            .expect_err("second insert must conflict");
        assert!(matches!(err, RecordError::DuplicateRecord { .. }));

        // Same id under another type is a different key.
        store
            .insert_record(new_record("o1", "Condition", None))
            .expect("different type");
        assert_eq!(store.find_records(&RecordQuery::new()).unwrap().len(), 2);
    }

    #[test]
    fn find_records_is_newest_first_and_limited() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store
                .insert_record(new_record(id, "Observation", Some("Patient/p1")))
                .unwrap();
        }

        let found = store.find_records(&RecordQuery::new().limit(2)).unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn find_by_key_and_resource_id() {
        let store = MemoryStore::new();
        store
            .insert_record(new_record("p1", "Patient", None))
            .unwrap();

        assert!(store.find_by_key("p1", "Patient").unwrap().is_some());
        assert!(store.find_by_key("p1", "Observation").unwrap().is_none());
        assert_eq!(
            store
                .find_by_resource_id("p1")
                .unwrap()
                .map(|r| r.resource_type),
            Some("Patient".to_string())
        );
    }

    #[test]
    fn runs_are_created_and_updated() {
        let store = MemoryStore::new();
        let mut run = ImportRun::new(Utc::now());
        store.create_run(&run).unwrap();
        assert!(store.create_run(&run).is_err());

        run.status = ImportStatus::Completed;
        store.update_run(&run).unwrap();
        assert_eq!(store.list_runs().unwrap()[0].status, ImportStatus::Completed);

        let unknown = ImportRun::new(Utc::now());
        assert!(matches!(
            store.update_run(&unknown),
            Err(RecordError::NotFound(_))
        ));
    }
}
