//! Ad-hoc transformation of stored documents.
//!
//! A request selects records by resource type and subject, then applies a list of
//! operations to each record's raw document. Results are returned, never persisted.

use crate::constants::{MAX_QUERY_ROWS, RESOURCE_ID_FIELD, RESOURCE_TYPE_FIELD};
use crate::path;
use crate::store::{RecordQuery, RecordStore};
use crate::RecordResult;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Key under which unknown actions are reported on each row.
pub const WARNING_KEY: &str = "_warning";

/// One transformation as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transformation {
    pub action: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default, rename = "as")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransformFilters {
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    #[serde(default)]
    pub resource_types: Vec<String>,
    #[serde(default)]
    pub filters: TransformFilters,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
}

/// A validated transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Extract { field: String, alias: String },
    Flatten { field: String },
    Unknown(String),
}

impl From<&Transformation> for Operation {
    /// A missing `field` becomes an empty path, which resolves to nothing: `extract` stores
    /// `null` and `flatten` adds no keys.
    fn from(t: &Transformation) -> Self {
        let field = t.field.clone().unwrap_or_default();
        match t.action.as_str() {
            "extract" => {
                let alias = t.alias.clone().unwrap_or_else(|| field.clone());
                Operation::Extract { field, alias }
            }
            "flatten" => Operation::Flatten { field },
            other => Operation::Unknown(other.to_string()),
        }
    }
}

/// Apply `operations` in order to `document`.
pub fn apply_operations(document: &Value, operations: &[Operation]) -> Map<String, Value> {
    let mut row = Map::new();

    for operation in operations {
        match operation {
            Operation::Extract { field, alias } => {
                let value = path::resolve(document, field)
                    .cloned()
                    .unwrap_or(Value::Null);
                row.insert(alias.clone(), value);
            }
            Operation::Flatten { field } => {
                if let Some(Value::Object(map)) = path::resolve(document, field) {
                    let prefix = path::first_segment(field);
                    for (key, value) in map {
                        row.insert(format!("{prefix}_{key}"), value.clone());
                    }
                }
            }
            Operation::Unknown(action) => {
                let note = Value::String(format!("unknown action {action}"));
                match row.get_mut(WARNING_KEY) {
                    Some(Value::Array(notes)) => notes.push(note),
                    _ => {
                        row.insert(WARNING_KEY.to_string(), Value::Array(vec![note]));
                    }
                }
            }
        }
    }

    row
}

/// Runs transform requests against the record store.
#[derive(Clone)]
pub struct TransformEngine {
    store: Arc<dyn RecordStore>,
    max_rows: usize,
}

impl TransformEngine {
    pub fn new(store: Arc<dyn RecordStore>, max_rows: usize) -> Self {
        Self {
            store,
            max_rows: max_rows.min(MAX_QUERY_ROWS),
        }
    }

    /// Transform up to `max_rows` matching records, newest first.
    ///
    /// `id` and `resourceType` are written last on every row and override any operation
    /// output with the same key.
    ///
    /// # Errors
    /// Returns a store error if the record lookup fails. Operations themselves never fail.
    pub fn transform(&self, request: &TransformRequest) -> RecordResult<Vec<Map<String, Value>>> {
        let operations: Vec<Operation> = request
            .transformations
            .iter()
            .map(Operation::from)
            .collect();

        let query = RecordQuery::new()
            .resource_types(request.resource_types.iter().cloned())
            .subject(request.filters.subject.clone())
            .limit(self.max_rows);
        let records = self.store.find_records(&query)?;

        Ok(records
            .iter()
            .map(|record| {
                let mut row = apply_operations(&record.raw_data, &operations);
                row.insert(
                    RESOURCE_ID_FIELD.to_string(),
                    Value::String(record.resource_id.clone()),
                );
                row.insert(
                    RESOURCE_TYPE_FIELD.to_string(),
                    Value::String(record.resource_type.clone()),
                );
                row
            })
            .collect())
    }
}
