//! Domain model shared by the engines, the record store and the API layers.
//!
//! Everything here serialises with camelCase keys, which is the wire shape of the REST API
//! and of the directory store's JSON files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A persisted clinical resource.
///
/// Unique on `(resource_id, resource_type)`. `extracted_data` and `raw_data` are never null;
/// they default to an empty map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub resource_id: String,
    pub resource_type: String,
    pub subject_reference: Option<String>,
    #[serde(default)]
    pub extracted_data: Map<String, Value>,
    #[serde(default = "empty_object")]
    pub raw_data: Value,
    pub import_run_id: Uuid,
    pub created_at: DateTime<Utc>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Insert payload for the record store; the store stamps `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub resource_id: String,
    pub resource_type: String,
    pub subject_reference: Option<String>,
    pub extracted_data: Map<String, Value>,
    pub raw_data: Value,
    pub import_run_id: Uuid,
}

impl NewRecord {
    pub fn into_record(self, created_at: DateTime<Utc>) -> Record {
        Record {
            resource_id: self.resource_id,
            resource_type: self.resource_type,
            subject_reference: self.subject_reference,
            extracted_data: self.extracted_data,
            raw_data: self.raw_data,
            import_run_id: self.import_run_id,
            created_at,
        }
    }
}

/// Lifecycle of an import run: `Pending -> Processing -> {Completed | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A rule violation or parse failure recorded against one input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub line: usize,
    pub path: String,
    pub message: String,
    pub resource_type: Option<String>,
}

/// A non-fatal extraction finding recorded against one input line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub line: usize,
    pub field: String,
    pub message: String,
    pub resource_type: Option<String>,
}

/// Per-resource-type counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStatistics {
    pub seen: u64,
    pub imported: u64,
    pub errors: u64,
    pub missing_fields: BTreeMap<String, u64>,
}

/// Final statistics attached to a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatistics {
    pub by_resource_type: BTreeMap<String, TypeStatistics>,
    pub unique_subjects: usize,
}

/// One invocation of the bulk ingest pipeline and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRun {
    pub id: Uuid,
    pub status: ImportStatus,
    pub total_lines: usize,
    pub successful_records: usize,
    pub validation_errors: Vec<ValidationError>,
    pub warnings: Vec<Warning>,
    pub statistics: ImportStatistics,
    pub created_at: DateTime<Utc>,
}

impl ImportRun {
    /// A fresh run in `Pending` state.
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: ImportStatus::Pending,
            total_lines: 0,
            successful_records: 0,
            validation_errors: Vec::new(),
            warnings: Vec::new(),
            statistics: ImportStatistics::default(),
            created_at,
        }
    }

    /// The run without timestamps, as returned to import callers.
    pub fn summary(&self) -> ImportRunSummary {
        ImportRunSummary {
            id: self.id,
            status: self.status,
            total_lines: self.total_lines,
            successful_records: self.successful_records,
            validation_errors: self.validation_errors.clone(),
            warnings: self.warnings.clone(),
            statistics: self.statistics.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRunSummary {
    pub id: Uuid,
    pub status: ImportStatus,
    pub total_lines: usize,
    pub successful_records: usize,
    pub validation_errors: Vec<ValidationError>,
    pub warnings: Vec<Warning>,
    pub statistics: ImportStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn import_run_serialises_camel_case_with_lowercase_status() {
        let run = ImportRun::new(Utc::now());
        let value = serde_json::to_value(run.summary()).expect("serialise summary");
        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["totalLines"], json!(0));
        assert_eq!(value["validationErrors"], json!([]));
        assert!(value.get("createdAt").is_none());
    }

    #[test]
    fn record_defaults_missing_maps_to_empty() {
        let value = json!({
            "resourceId": "o1",
            "resourceType": "Observation",
            "subjectReference": null,
            "importRunId": Uuid::nil(),
            "createdAt": "2025-01-10T00:00:00Z"
        });
        let record: Record = serde_json::from_value(value).expect("deserialise record");
        assert!(record.extracted_data.is_empty());
        assert_eq!(record.raw_data, json!({}));
    }
}
