//! In-memory accumulator for one import run.

use crate::constants::UNKNOWN_RESOURCE_TYPE;
use crate::model::{TypeStatistics, ValidationError, Warning};
use std::collections::{BTreeMap, BTreeSet};

/// Counters, errors and warnings gathered while an import run processes its lines.
///
/// Counter maps start empty; a key comes into existence at its first increment and reads of
/// absent keys yield zero.
#[derive(Debug, Clone, Default)]
pub struct ImportContext {
    total_lines: usize,
    seen: BTreeMap<String, u64>,
    imported: BTreeMap<String, u64>,
    errored: BTreeMap<String, u64>,
    missing_fields: BTreeMap<String, BTreeMap<String, u64>>,
    errors: Vec<ValidationError>,
    warnings: Vec<Warning>,
}

fn type_key(resource_type: Option<&str>) -> String {
    resource_type.unwrap_or(UNKNOWN_RESOURCE_TYPE).to_string()
}

fn increment(counters: &mut BTreeMap<String, u64>, key: String) {
    *counters.entry(key).or_insert(0) += 1;
}

fn count(counters: &BTreeMap<String, u64>, key: &str) -> u64 {
    counters.get(key).copied().unwrap_or(0)
}

impl ImportContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total_lines(&mut self, total_lines: usize) {
        self.total_lines = total_lines;
    }

    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    pub fn record_seen(&mut self, resource_type: Option<&str>) {
        increment(&mut self.seen, type_key(resource_type));
    }

    pub fn record_imported(&mut self, resource_type: Option<&str>) {
        increment(&mut self.imported, type_key(resource_type));
    }

    pub fn record_errored(&mut self, resource_type: Option<&str>) {
        increment(&mut self.errored, type_key(resource_type));
    }

    pub fn record_missing_field(&mut self, resource_type: Option<&str>, field: &str) {
        let fields = self
            .missing_fields
            .entry(type_key(resource_type))
            .or_default();
        increment(fields, field.to_string());
    }

    pub fn push_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn push_warning(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Imported records across every type.
    pub fn total_imported(&self) -> u64 {
        self.imported.values().sum()
    }

    /// Per-type breakdown covering every type that appears in any counter.
    pub fn snapshot(&self) -> BTreeMap<String, TypeStatistics> {
        let types: BTreeSet<&String> = self
            .seen
            .keys()
            .chain(self.imported.keys())
            .chain(self.errored.keys())
            .chain(self.missing_fields.keys())
            .collect();

        types
            .into_iter()
            .map(|t| {
                let stats = TypeStatistics {
                    seen: count(&self.seen, t),
                    imported: count(&self.imported, t),
                    errors: count(&self.errored, t),
                    missing_fields: self.missing_fields.get(t).cloned().unwrap_or_default(),
                };
                (t.clone(), stats)
            })
            .collect()
    }

    /// Hand over the accumulated errors and warnings.
    pub fn into_findings(self) -> (Vec<ValidationError>, Vec<Warning>) {
        (self.errors, self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_counters_read_as_zero() {
        let ctx = ImportContext::new();
        assert_eq!(ctx.total_imported(), 0);
        assert!(ctx.snapshot().is_empty());
        assert!(ctx.errors().is_empty() && ctx.warnings().is_empty());
    }

    #[test]
    fn snapshot_covers_every_counted_type() {
        let mut ctx = ImportContext::new();
        ctx.record_seen(Some("Observation"));
        ctx.record_seen(Some("Observation"));
        ctx.record_imported(Some("Observation"));
        ctx.record_errored(Some("Observation"));
        ctx.record_missing_field(Some("Observation"), "valueQuantity");
        ctx.record_missing_field(Some("Observation"), "valueQuantity");
        ctx.record_seen(None);
        ctx.record_errored(None);

        let snapshot = ctx.snapshot();
        let obs = &snapshot["Observation"];
        assert_eq!((obs.seen, obs.imported, obs.errors), (2, 1, 1));
        assert_eq!(obs.missing_fields["valueQuantity"], 2);

        let unknown = &snapshot[UNKNOWN_RESOURCE_TYPE];
        assert_eq!((unknown.seen, unknown.imported, unknown.errors), (1, 0, 1));
        assert!(unknown.missing_fields.is_empty());
    }

    #[test]
    fn missing_field_alone_introduces_type() {
        let mut ctx = ImportContext::new();
        ctx.record_missing_field(Some("Condition"), "onsetDateTime");
        let snapshot = ctx.snapshot();
        assert_eq!(snapshot["Condition"].seen, 0);
        assert_eq!(snapshot["Condition"].missing_fields["onsetDateTime"], 1);
    }
}
