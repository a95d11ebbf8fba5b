//! Read-side statistics over the whole record store.

use crate::constants::{SELF_SUBJECT_TYPE, UNKNOWN_RESOURCE_TYPE};
use crate::model::{ImportRun, ImportStatus, Record};
use crate::store::{RecordQuery, RecordStore};
use crate::RecordResult;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub total_records: usize,
    pub records_by_type: BTreeMap<String, usize>,
    pub unique_subjects: usize,
    /// Record counts per subject, excluding the self-subject type.
    pub records_by_subject: BTreeMap<String, usize>,
    pub imports: ImportsSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportsSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub with_errors: usize,
    pub runs_with_errors: Vec<RunErrorSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunErrorSummary {
    pub import_id: Uuid,
    pub error_count: usize,
    /// Error groups per resource type, most frequent first.
    pub errors_by_type: BTreeMap<String, Vec<ErrorGroup>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorGroup {
    pub path: String,
    pub message: String,
    pub count: usize,
}

#[derive(Clone)]
pub struct AnalyticsAggregator {
    store: Arc<dyn RecordStore>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> RecordResult<AnalyticsSnapshot> {
        let records = self.store.find_records(&RecordQuery::new())?;
        let runs = self.store.list_runs()?;
        Ok(aggregate(&records, &runs))
    }
}

fn aggregate(records: &[Record], runs: &[ImportRun]) -> AnalyticsSnapshot {
    let mut records_by_type = BTreeMap::new();
    let mut records_by_subject = BTreeMap::new();
    let mut subjects = BTreeSet::new();

    for record in records {
        *records_by_type
            .entry(record.resource_type.clone())
            .or_insert(0) += 1;

        if let Some(subject) = &record.subject_reference {
            subjects.insert(subject.as_str());
            if record.resource_type != SELF_SUBJECT_TYPE {
                *records_by_subject.entry(subject.clone()).or_insert(0) += 1;
            }
        }
    }

    AnalyticsSnapshot {
        total_records: records.len(),
        records_by_type,
        unique_subjects: subjects.len(),
        records_by_subject,
        imports: summarize_imports(runs),
    }
}

fn summarize_imports(runs: &[ImportRun]) -> ImportsSummary {
    let count_status = |status: ImportStatus| runs.iter().filter(|r| r.status == status).count();

    let runs_with_errors: Vec<RunErrorSummary> = runs
        .iter()
        .filter(|run| !run.validation_errors.is_empty())
        .map(|run| {
            let mut grouped: BTreeMap<String, BTreeMap<(&str, &str), usize>> = BTreeMap::new();
            for error in &run.validation_errors {
                let resource_type = error
                    .resource_type
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_RESOURCE_TYPE.to_string());
                *grouped
                    .entry(resource_type)
                    .or_default()
                    .entry((error.path.as_str(), error.message.as_str()))
                    .or_insert(0) += 1;
            }

            let errors_by_type = grouped
                .into_iter()
                .map(|(resource_type, groups)| {
                    let mut groups: Vec<ErrorGroup> = groups
                        .into_iter()
                        .map(|((path, message), count)| ErrorGroup {
                            path: path.to_string(),
                            message: message.to_string(),
                            count,
                        })
                        .collect();
                    // Stable: equal counts keep (path, message) order.
                    groups.sort_by(|a, b| b.count.cmp(&a.count));
                    (resource_type, groups)
                })
                .collect();

            RunErrorSummary {
                import_id: run.id,
                error_count: run.validation_errors.len(),
                errors_by_type,
            }
        })
        .collect();

    ImportsSummary {
        total: runs.len(),
        succeeded: count_status(ImportStatus::Completed),
        failed: count_status(ImportStatus::Failed),
        with_errors: runs_with_errors.len(),
        runs_with_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportPipeline;
    use crate::model::ValidationError;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn error(path: &str, message: &str, resource_type: Option<&str>) -> ValidationError {
        ValidationError {
            line: 1,
            path: path.into(),
            message: message.into(),
            resource_type: resource_type.map(String::from),
        }
    }

    #[test]
    fn empty_store_yields_zeroes() {
        let snapshot = AnalyticsAggregator::new(Arc::new(MemoryStore::new()))
            .snapshot()
            .unwrap();
        assert_eq!(snapshot.total_records, 0);
        assert_eq!(snapshot.unique_subjects, 0);
        assert_eq!(snapshot.imports, ImportsSummary::default());
    }

    #[test]
    fn counts_records_subjects_and_runs() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = ImportPipeline::with_default_rules(store.clone());
        let text = [
            r#"{"resourceType":"Patient","id":"p1"}"#,
            r#"{"resourceType":"Observation","id":"o1","status":"final","code":{"text":"x"},"subject":{"reference":"Patient/p1"}}"#,
            r#"{"resourceType":"Observation","id":"o2","status":"final","code":{"text":"y"},"subject":{"reference":"Patient/p2"}}"#,
            r#"{"resourceType":"Procedure","id":"pr1","status":"completed","code":{"text":"z"},"subject":{"reference":"Patient/p1"}}"#,
            r#"{"resourceType":"Observation","id":"o3"}"#,
            "not json",
        ]
        .join("\n");
        pipeline.import(&text).unwrap();
        pipeline.import(r#"{"resourceType":"Patient","id":"p9"}"#).unwrap();

        let snapshot = AnalyticsAggregator::new(store).snapshot().unwrap();
        assert_eq!(snapshot.total_records, 5);
        assert_eq!(snapshot.records_by_type["Observation"], 2);
        assert_eq!(snapshot.records_by_type["Patient"], 2);
        assert_eq!(snapshot.unique_subjects, 2);
        assert_eq!(snapshot.records_by_subject["Patient/p1"], 2);
        assert_eq!(snapshot.records_by_subject["Patient/p2"], 1);

        let imports = &snapshot.imports;
        assert_eq!((imports.total, imports.succeeded, imports.failed), (2, 2, 0));
        assert_eq!(imports.with_errors, 1);
        let run = &imports.runs_with_errors[0];
        assert!(run.errors_by_type.contains_key("Observation"));
        assert_eq!(run.errors_by_type[UNKNOWN_RESOURCE_TYPE].len(), 1);
        assert_eq!(run.error_count, 4);
    }

    #[test]
    fn error_groups_are_sorted_by_count() {
        let mut run = ImportRun::new(Utc::now());
        run.status = ImportStatus::Failed;
        run.validation_errors = vec![
            error("code", "code is required", Some("Observation")),
            error("status", "status is required", Some("Observation")),
            error("status", "status is required", Some("Observation")),
            error("$", "Invalid JSON: eof", None),
        ];

        let summary = summarize_imports(&[run.clone()]);
        assert_eq!(summary.failed, 1);
        let groups = &summary.runs_with_errors[0].errors_by_type["Observation"];
        assert_eq!(
            groups,
            &vec![
                ErrorGroup {
                    path: "status".into(),
                    message: "status is required".into(),
                    count: 2
                },
                ErrorGroup {
                    path: "code".into(),
                    message: "code is required".into(),
                    count: 1
                },
            ]
        );
        assert_eq!(summary.runs_with_errors[0].import_id, run.id);
    }

    #[test]
    fn self_subject_records_count_as_subjects_only() {
        let record = |id: &str, resource_type: &str, subject: &str| Record {
            resource_id: id.into(),
            resource_type: resource_type.into(),
            subject_reference: Some(subject.into()),
            extracted_data: serde_json::Map::new(),
            raw_data: serde_json::json!({}),
            import_run_id: Uuid::nil(),
            created_at: Utc::now(),
        };
        let records = vec![
            record("p1", SELF_SUBJECT_TYPE, "Patient/p1"),
            record("p2", SELF_SUBJECT_TYPE, "Patient/p2"),
            record("o1", "Observation", "Patient/p1"),
        ];

        let snapshot = aggregate(&records, &[]);
        assert_eq!(snapshot.unique_subjects, 2);
        assert_eq!(snapshot.records_by_subject.len(), 1);
        assert_eq!(snapshot.records_by_subject["Patient/p1"], 1);
        assert!(!snapshot.records_by_subject.contains_key("Patient/p2"));
    }
}
