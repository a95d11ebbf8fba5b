//! Record listing and lookup with field projection.

use crate::constants::RESOURCE_TYPE_FIELD;
use crate::model::Record;
use crate::store::{RecordQuery, RecordStore};
use crate::{RecordError, RecordResult};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Split a comma-separated field list, dropping blank tokens.
pub fn parse_fields(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}

/// Project a record's extracted data onto `fields`.
///
/// An empty field list returns every extracted field. Otherwise the output holds the
/// requested keys that exist, and `resourceType` is always present.
pub fn project(record: &Record, fields: &[String]) -> Map<String, Value> {
    if fields.is_empty() {
        return record.extracted_data.clone();
    }

    let mut out = Map::new();
    for field in fields {
        if let Some(value) = record.extracted_data.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    if !out.contains_key(RESOURCE_TYPE_FIELD) {
        let resource_type = record
            .extracted_data
            .get(RESOURCE_TYPE_FIELD)
            .cloned()
            .unwrap_or_else(|| Value::String(record.resource_type.clone()));
        out.insert(RESOURCE_TYPE_FIELD.to_string(), resource_type);
    }
    out
}

#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn RecordStore>,
    max_rows: usize,
}

impl RecordService {
    pub fn new(store: Arc<dyn RecordStore>, max_rows: usize) -> Self {
        Self { store, max_rows }
    }

    /// List projected records, newest first, capped at the configured row limit.
    pub fn list(
        &self,
        resource_type: Option<&str>,
        subject: Option<&str>,
        fields: &[String],
    ) -> RecordResult<Vec<Map<String, Value>>> {
        let query = RecordQuery::new()
            .resource_types(resource_type)
            .subject(subject.map(String::from))
            .limit(self.max_rows);

        Ok(self
            .store
            .find_records(&query)?
            .iter()
            .map(|record| project(record, fields))
            .collect())
    }

    /// Look up one record by resource id.
    ///
    /// # Errors
    /// Returns `RecordError::NotFound` when no record carries `resource_id`.
    pub fn get(&self, resource_id: &str, fields: &[String]) -> RecordResult<Map<String, Value>> {
        let record = self
            .store
            .find_by_resource_id(resource_id)?
            .ok_or_else(|| RecordError::NotFound(format!("record {resource_id}")))?;
        Ok(project(&record, fields))
    }
}
