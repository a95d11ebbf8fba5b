//! Rule-driven document validation.
//!
//! Rules are keyed by the document's `resourceType`. Every type gets the universal required
//! fields (`id`, `resourceType`, `subject.reference`) except the self-subject type, which is
//! exempt from the subject requirement. Types with a status table additionally have their
//! status code checked against the allowed set.
//!
//! Validation never stops at the first failure; every applicable check runs and all
//! violations are returned.

use crate::constants::{
    RESOURCE_ID_FIELD, RESOURCE_TYPE_FIELD, SELF_SUBJECT_TYPE, SUBJECT_REFERENCE_PATH,
    UNKNOWN_RESOURCE_TYPE,
};
use crate::path;
use serde_json::Value;
use std::collections::BTreeMap;

/// Path used by status tables that read a nested clinical status code.
pub const CLINICAL_STATUS_CODE_PATH: &str = "clinicalStatus.coding[0].code";

/// One failed validation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    pub path: String,
    pub message: String,
}

/// Where a type's status lives and which codes are allowed there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRule {
    pub path: String,
    pub allowed: Vec<String>,
}

impl StatusRule {
    pub fn new(path: &str, allowed: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Validation rule tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRules {
    pub universal_required: Vec<String>,
    pub self_subject_type: String,
    pub subject_path: String,
    pub required_by_type: BTreeMap<String, Vec<String>>,
    pub status_by_type: BTreeMap<String, StatusRule>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        let required = |fields: &[&str]| fields.iter().map(|f| f.to_string()).collect();

        let required_by_type = BTreeMap::from([
            ("Patient".to_string(), Vec::new()),
            ("Observation".to_string(), required(&["status", "code"])),
            ("Condition".to_string(), required(&["code", "clinicalStatus"])),
            (
                "MedicationRequest".to_string(),
                required(&["status", "intent", "medicationCodeableConcept"]),
            ),
            ("Encounter".to_string(), required(&["status", "class"])),
            ("Procedure".to_string(), required(&["status", "code"])),
        ]);

        let status_by_type = BTreeMap::from([
            (
                "Observation".to_string(),
                StatusRule::new(
                    "status",
                    &[
                        "registered",
                        "preliminary",
                        "final",
                        "amended",
                        "corrected",
                        "cancelled",
                        "entered-in-error",
                        "unknown",
                    ],
                ),
            ),
            (
                "MedicationRequest".to_string(),
                StatusRule::new(
                    "status",
                    &[
                        "active",
                        "on-hold",
                        "cancelled",
                        "completed",
                        "entered-in-error",
                        "stopped",
                        "draft",
                        "unknown",
                    ],
                ),
            ),
            (
                "Encounter".to_string(),
                StatusRule::new(
                    "status",
                    &[
                        "planned",
                        "arrived",
                        "triaged",
                        "in-progress",
                        "onleave",
                        "finished",
                        "cancelled",
                        "entered-in-error",
                        "unknown",
                    ],
                ),
            ),
            (
                "Procedure".to_string(),
                StatusRule::new(
                    "status",
                    &[
                        "preparation",
                        "in-progress",
                        "not-done",
                        "on-hold",
                        "stopped",
                        "completed",
                        "entered-in-error",
                        "unknown",
                    ],
                ),
            ),
            (
                "Condition".to_string(),
                StatusRule::new(
                    CLINICAL_STATUS_CODE_PATH,
                    &[
                        "active",
                        "recurrence",
                        "relapse",
                        "inactive",
                        "remission",
                        "resolved",
                    ],
                ),
            ),
            (
                "AllergyIntolerance".to_string(),
                StatusRule::new(
                    CLINICAL_STATUS_CODE_PATH,
                    &["active", "inactive", "resolved"],
                ),
            ),
        ]);

        Self {
            universal_required: vec![
                RESOURCE_ID_FIELD.to_string(),
                RESOURCE_TYPE_FIELD.to_string(),
                SUBJECT_REFERENCE_PATH.to_string(),
            ],
            self_subject_type: SELF_SUBJECT_TYPE.to_string(),
            subject_path: SUBJECT_REFERENCE_PATH.to_string(),
            required_by_type,
            status_by_type,
        }
    }
}

impl ValidationRules {
    /// Required field paths for `resource_type`, universal fields first.
    pub fn required_fields(&self, resource_type: Option<&str>) -> Vec<&str> {
        let exempt = resource_type == Some(self.self_subject_type.as_str());

        let mut fields: Vec<&str> = self
            .universal_required
            .iter()
            .map(String::as_str)
            .filter(|f| !(exempt && *f == self.subject_path))
            .collect();

        if let Some(specific) = resource_type.and_then(|t| self.required_by_type.get(t)) {
            fields.extend(specific.iter().map(String::as_str));
        }
        fields
    }
}

/// Checks documents against [`ValidationRules`].
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    rules: ValidationRules,
}

impl ValidationEngine {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Validate one document and return every violation found.
    pub fn validate(&self, document: &Value) -> Vec<RuleViolation> {
        if !document.is_object() {
            return vec![RuleViolation {
                path: "resource".into(),
                message: "resource must be a JSON object".into(),
            }];
        }

        let resource_type = resource_type_of(document);
        let type_label = resource_type.unwrap_or(UNKNOWN_RESOURCE_TYPE);

        let mut violations: Vec<RuleViolation> = self
            .rules
            .required_fields(resource_type)
            .into_iter()
            .filter(|field| present(document, field).is_none())
            .map(|field| RuleViolation {
                path: field.to_string(),
                message: format!("{field} is required for {type_label} resource"),
            })
            .collect();

        if let Some(rule) = resource_type.and_then(|t| self.rules.status_by_type.get(t)) {
            // Absent status is already covered by the required-field check.
            if let Some(status) = present(document, &rule.path) {
                let code = status_code_text(status);
                if !rule.allowed.iter().any(|allowed| *allowed == code) {
                    violations.push(RuleViolation {
                        path: "status".into(),
                        message: format!("invalid status '{code}' for {type_label}"),
                    });
                }
            }
        }

        violations
    }
}

/// The document's discriminator, if it is a string.
pub fn resource_type_of(document: &Value) -> Option<&str> {
    path::resolve_str(document, RESOURCE_TYPE_FIELD)
}

/// A resolved value that is not `null`; an explicit `null` counts as absent.
fn present<'v>(document: &'v Value, field: &str) -> Option<&'v Value> {
    path::resolve(document, field).filter(|v| !v.is_null())
}

fn status_code_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> ValidationEngine {
        ValidationEngine::default()
    }

    fn paths(violations: &[RuleViolation]) -> Vec<&str> {
        violations.iter().map(|v| v.path.as_str()).collect()
    }

    #[test]
    fn non_object_document_yields_single_resource_error() {
        let violations = engine().validate(&json!([1, 2, 3]));
        assert_eq!(paths(&violations), vec!["resource"]);
    }

    #[test]
    fn patient_without_subject_is_valid() {
        let violations = engine().validate(&json!({"resourceType": "Patient", "id": "p1"}));
        assert!(violations.is_empty(), "unexpected: {violations:?}");
    }

    #[test]
    fn observation_missing_status_skips_enum_check() {
        let doc = json!({
            "resourceType": "Observation",
            "id": "o1",
            "subject": {"reference": "Patient/p1"},
            "code": {"text": "Heart rate"}
        });
        let violations = engine().validate(&doc);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].path, "status");
        assert_eq!(
            violations[0].message,
            "status is required for Observation resource"
        );
    }

    #[test]
    fn condition_with_unknown_clinical_status_code() {
        let doc = json!({
            "resourceType": "Condition",
            "id": "c1",
            "subject": {"reference": "Patient/p1"},
            "code": {"text": "Asthma"},
            "clinicalStatus": {"coding": [{"code": "NOT_A_VALID_CODE"}]}
        });
        let violations = engine().validate(&doc);
        assert_eq!(
            violations,
            vec![RuleViolation {
                path: "status".into(),
                message: "invalid status 'NOT_A_VALID_CODE' for Condition".into(),
            }]
        );
    }

    #[test]
    fn null_status_is_missing_not_invalid() {
        let doc = json!({
            "resourceType": "Observation",
            "id": "o1",
            "status": null,
            "subject": {"reference": "Patient/p1"},
            "code": {"text": "Heart rate"}
        });
        assert_eq!(
            engine().validate(&doc),
            vec![RuleViolation {
                path: "status".into(),
                message: "status is required for Observation resource".into(),
            }]
        );
    }

    #[test]
    fn null_subject_reference_and_id_are_missing() {
        let doc = json!({
            "resourceType": "Procedure",
            "id": null,
            "status": "completed",
            "code": {"text": "Appendectomy"},
            "subject": {"reference": null}
        });
        assert_eq!(
            paths(&engine().validate(&doc)),
            vec!["id", "subject.reference"]
        );
    }

    #[test]
    fn all_failures_are_reported() {
        let doc = json!({"resourceType": "Observation", "status": "bogus"});
        let violations = engine().validate(&doc);
        assert_eq!(
            paths(&violations),
            vec!["id", "subject.reference", "code", "status"]
        );
        assert_eq!(
            violations[3].message,
            "invalid status 'bogus' for Observation"
        );
    }

    #[test]
    fn missing_resource_type_uses_universal_rules() {
        let violations = engine().validate(&json!({"id": "x"}));
        assert_eq!(paths(&violations), vec!["resourceType", "subject.reference"]);
        assert_eq!(
            violations[0].message,
            "resourceType is required for unknown resource"
        );
    }

    #[test]
    fn custom_rules_are_honoured() {
        let mut rules = ValidationRules::default();
        rules
            .required_by_type
            .insert("Device".into(), vec!["udiCarrier".into()]);
        let engine = ValidationEngine::new(rules);

        let doc = json!({"resourceType": "Device", "id": "d1", "subject": {"reference": "Patient/p1"}});
        assert_eq!(paths(&engine.validate(&doc)), vec!["udiCarrier"]);
    }
}
