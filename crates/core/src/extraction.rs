//! Rule-driven field extraction.
//!
//! Each configured field path applies either to every resource type or to an explicit list
//! of types. Extraction projects the applicable paths out of a document into a flat map
//! keyed by the path string, in configuration order.
//!
//! A field that resolves to nothing, or to JSON `null`, is stored as `null` and reported as
//! a warning. Present values are never warned about, however empty or falsy (`""`, `0`,
//! `false`).

use crate::path;
use crate::validation::resource_type_of;
use serde_json::{Map, Value};

pub const MISSING_FIELD_MESSAGE: &str = "missing expected field";

/// Which resource types a field rule applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applicability {
    AllTypes,
    Types(Vec<String>),
}

impl Applicability {
    fn types(types: &[&str]) -> Self {
        Applicability::Types(types.iter().map(|t| t.to_string()).collect())
    }

    pub fn applies_to(&self, resource_type: Option<&str>) -> bool {
        match self {
            Applicability::AllTypes => true,
            Applicability::Types(types) => {
                resource_type.is_some_and(|rt| types.iter().any(|t| t == rt))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub path: String,
    pub applies_to: Applicability,
}

impl FieldRule {
    pub fn new(path: &str, applies_to: Applicability) -> Self {
        Self {
            path: path.to_string(),
            applies_to,
        }
    }
}

/// An applicable field that had no value in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRules {
    pub fields: Vec<FieldRule>,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        use Applicability::AllTypes;
        let only = Applicability::types;

        Self {
            fields: vec![
                FieldRule::new("id", AllTypes),
                FieldRule::new("resourceType", AllTypes),
                FieldRule::new(
                    "subject.reference",
                    only(&[
                        "Observation",
                        "Condition",
                        "MedicationRequest",
                        "Encounter",
                        "Procedure",
                    ]),
                ),
                FieldRule::new("gender", only(&["Patient"])),
                FieldRule::new("birthDate", only(&["Patient"])),
                FieldRule::new("name[0].family", only(&["Patient"])),
                FieldRule::new(
                    "status",
                    only(&["Observation", "MedicationRequest", "Encounter", "Procedure"]),
                ),
                FieldRule::new(
                    "code.coding[0].code",
                    only(&["Observation", "Condition", "Procedure"]),
                ),
                FieldRule::new("valueQuantity", only(&["Observation"])),
                FieldRule::new("effectiveDateTime", only(&["Observation"])),
                FieldRule::new("clinicalStatus.coding[0].code", only(&["Condition"])),
                FieldRule::new("onsetDateTime", only(&["Condition"])),
                FieldRule::new(
                    "medicationCodeableConcept.coding[0].code",
                    only(&["MedicationRequest"]),
                ),
                FieldRule::new("authoredOn", only(&["MedicationRequest"])),
                FieldRule::new("dosageInstruction[0].text", only(&["MedicationRequest"])),
                FieldRule::new("class.code", only(&["Encounter"])),
                FieldRule::new("period.start", only(&["Encounter"])),
                FieldRule::new("performedDateTime", only(&["Procedure"])),
            ],
        }
    }
}

impl ExtractionRules {
    /// Every configured path applicable to `resource_type`, in configuration order.
    pub fn fields_for(&self, resource_type: Option<&str>) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|rule| rule.applies_to.applies_to(resource_type))
            .map(|rule| rule.path.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionEngine {
    rules: ExtractionRules,
}

impl ExtractionEngine {
    pub fn new(rules: ExtractionRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ExtractionRules {
        &self.rules
    }

    /// Project the applicable fields of `document` into a flat map.
    pub fn extract(&self, document: &Value) -> (Map<String, Value>, Vec<ExtractionWarning>) {
        let mut extracted = Map::new();
        let mut warnings = Vec::new();

        for field in self.rules.fields_for(resource_type_of(document)) {
            let value = path::resolve(document, field)
                .cloned()
                .unwrap_or(Value::Null);
            if value.is_null() {
                warnings.push(ExtractionWarning {
                    field: field.to_string(),
                    message: MISSING_FIELD_MESSAGE.to_string(),
                });
            }
            extracted.insert(field.to_string(), value);
        }

        (extracted, warnings)
    }
}
