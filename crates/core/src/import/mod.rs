//! Bulk ingest of line-delimited JSON documents.
//!
//! ## Run lifecycle
//!
//! `Pending -> Processing -> {Completed | Failed}`. A run is stored as `Processing` before
//! the first line is read and updated exactly once at the end: to `Completed` with its final
//! statistics, or to `Failed` with a synthetic error if orchestration itself broke (for
//! example the store became unavailable). The failure is then returned to the caller.
//!
//! ## Per-line handling
//!
//! Each non-blank line is parsed, validated, extracted and persisted in that order. A bad
//! line never aborts the run:
//! - malformed JSON is recorded at path `$` and skipped,
//! - rule violations are recorded and the document is not persisted,
//! - missing extraction fields become warnings,
//! - a key conflict reported by the store is recorded at path `$` and not counted.
//!
//! Persistence is find-or-create on `(resource_id, resource_type)`. The lookup and the
//! insert are separate store calls, so two concurrent imports of one key can both miss the
//! lookup; the store's uniqueness check on insert is what keeps the key unique, and the
//! losing insert surfaces as a recorded conflict.

mod context;

pub use context::ImportContext;

use crate::constants::{RESOURCE_ID_FIELD, RESOURCE_TYPE_FIELD, SUBJECT_REFERENCE_PATH};
use crate::extraction::ExtractionEngine;
use crate::model::{ImportRun, ImportStatistics, ImportStatus, NewRecord, ValidationError, Warning};
use crate::path;
use crate::store::{RecordQuery, RecordStore};
use crate::validation::{resource_type_of, ValidationEngine};
use crate::{RecordError, RecordResult};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates parse, validate, extract and persist for one submitted text.
#[derive(Clone)]
pub struct ImportPipeline {
    store: Arc<dyn RecordStore>,
    validation: ValidationEngine,
    extraction: ExtractionEngine,
}

impl ImportPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        validation: ValidationEngine,
        extraction: ExtractionEngine,
    ) -> Self {
        Self {
            store,
            validation,
            extraction,
        }
    }

    /// Pipeline with the default validation and extraction rules.
    pub fn with_default_rules(store: Arc<dyn RecordStore>) -> Self {
        Self::new(store, ValidationEngine::default(), ExtractionEngine::default())
    }

    /// Import line-delimited JSON `text` and return the finalised run.
    ///
    /// # Errors
    /// - `RecordError::InvalidInput` if `text` is empty; no run is created.
    /// - Any store error raised while orchestrating the run. The run is marked `Failed`
    ///   on a best-effort basis before the error is returned.
    pub fn import(&self, text: &str) -> RecordResult<ImportRun> {
        if text.is_empty() {
            return Err(RecordError::InvalidInput("import payload is empty".into()));
        }

        let mut run = ImportRun::new(Utc::now());
        run.status = ImportStatus::Processing;
        self.store.create_run(&run)?;
        tracing::info!("import run {} started", run.id);

        let mut ctx = ImportContext::new();
        match self.process(&mut run, &mut ctx, text) {
            Ok(()) => {
                tracing::info!(
                    "import run {} completed: {} lines, {} imported, {} errors, {} warnings",
                    run.id,
                    run.total_lines,
                    run.successful_records,
                    run.validation_errors.len(),
                    run.warnings.len()
                );
                Ok(run)
            }
            Err(e) => {
                self.mark_failed(&mut run, ctx, &e);
                Err(e)
            }
        }
    }

    fn process(
        &self,
        run: &mut ImportRun,
        ctx: &mut ImportContext,
        text: &str,
    ) -> RecordResult<()> {
        let lines: Vec<&str> = text.lines().collect();
        ctx.set_total_lines(lines.len());

        for (index, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            self.process_line(run.id, ctx, index + 1, line)?;
        }

        let statistics = ImportStatistics {
            by_resource_type: ctx.snapshot(),
            unique_subjects: self.unique_subjects(run.id)?,
        };

        // The context stays intact so a failed final update can still report its findings.
        run.status = ImportStatus::Completed;
        run.total_lines = lines.len();
        run.successful_records = ctx.total_imported() as usize;
        run.validation_errors = ctx.errors().to_vec();
        run.warnings = ctx.warnings().to_vec();
        run.statistics = statistics;

        self.store.update_run(run)
    }

    fn process_line(
        &self,
        run_id: Uuid,
        ctx: &mut ImportContext,
        line: usize,
        raw: &str,
    ) -> RecordResult<()> {
        let document: Value = match serde_json::from_str(raw) {
            Ok(document) => document,
            Err(e) => {
                tracing::debug!("line {line}: invalid JSON: {e}");
                ctx.push_error(ValidationError {
                    line,
                    path: "$".into(),
                    message: format!("Invalid JSON: {e}"),
                    resource_type: None,
                });
                return Ok(());
            }
        };

        let resource_type = resource_type_of(&document).map(String::from);
        let type_ref = resource_type.as_deref();
        ctx.record_seen(type_ref);

        let violations = self.validation.validate(&document);
        if !violations.is_empty() {
            tracing::debug!("line {line}: {} validation errors", violations.len());
            ctx.record_errored(type_ref);
            for violation in violations {
                ctx.push_error(ValidationError {
                    line,
                    path: violation.path,
                    message: violation.message,
                    resource_type: resource_type.clone(),
                });
            }
            return Ok(());
        }

        let (extracted, warnings) = self.extraction.extract(&document);
        for warning in warnings {
            ctx.record_missing_field(type_ref, &warning.field);
            ctx.push_warning(Warning {
                line,
                field: warning.field,
                message: warning.message,
                resource_type: resource_type.clone(),
            });
        }

        let key = match record_key(&document) {
            Ok(key) => key,
            Err(violation) => {
                ctx.record_errored(type_ref);
                ctx.push_error(ValidationError {
                    line,
                    resource_type: resource_type.clone(),
                    ..violation
                });
                return Ok(());
            }
        };

        let (resource_id, resource_type) = key;
        if self
            .store
            .find_by_key(&resource_id, &resource_type)?
            .is_some()
        {
            // First write wins; re-asserting an existing key counts as imported.
            ctx.record_imported(Some(&resource_type));
            return Ok(());
        }

        let record = NewRecord {
            subject_reference: path::resolve_str(&document, SUBJECT_REFERENCE_PATH)
                .map(String::from),
            resource_id,
            resource_type: resource_type.clone(),
            extracted_data: extracted,
            raw_data: document,
            import_run_id: run_id,
        };

        match self.store.insert_record(record) {
            Ok(_) => ctx.record_imported(Some(&resource_type)),
            Err(e @ RecordError::DuplicateRecord { .. }) => {
                tracing::warn!("line {line}: persistence conflict: {e}");
                ctx.record_errored(Some(&resource_type));
                ctx.push_error(ValidationError {
                    line,
                    path: "$".into(),
                    message: e.to_string(),
                    resource_type: Some(resource_type),
                });
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn unique_subjects(&self, run_id: Uuid) -> RecordResult<usize> {
        let records = self
            .store
            .find_records(&RecordQuery::new().import_run(run_id))?;
        let subjects: BTreeSet<String> = records
            .into_iter()
            .filter_map(|r| r.subject_reference)
            .collect();
        Ok(subjects.len())
    }

    fn mark_failed(&self, run: &mut ImportRun, ctx: ImportContext, error: &RecordError) {
        tracing::error!("import run {} failed: {error}", run.id);

        run.total_lines = ctx.total_lines();
        run.statistics.by_resource_type = ctx.snapshot();
        let (mut errors, warnings) = ctx.into_findings();
        errors.push(ValidationError {
            line: 0,
            path: "$".into(),
            message: format!("Import failed: {error}"),
            resource_type: None,
        });
        run.status = ImportStatus::Failed;
        run.validation_errors = errors;
        run.warnings = warnings;

        if let Err(e) = self.store.update_run(run) {
            tracing::warn!("could not mark import run {} as failed: {e}", run.id);
        }
    }
}

/// The `(resource_id, resource_type)` key of a validated document.
///
/// Ids may be strings or numbers; anything else cannot key a record.
fn record_key(document: &Value) -> Result<(String, String), ValidationError> {
    let invalid = |field: &str| ValidationError {
        line: 0,
        path: field.to_string(),
        message: format!("{field} must be a string"),
        resource_type: None,
    };

    let resource_id = match path::resolve(document, RESOURCE_ID_FIELD) {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(invalid(RESOURCE_ID_FIELD)),
    };
    let resource_type = resource_type_of(document)
        .map(String::from)
        .ok_or_else(|| invalid(RESOURCE_TYPE_FIELD))?;

    Ok((resource_id, resource_type))
}
