//! Chronological timelines for one subject.
//!
//! Each timeline-capable resource type has a single date-bearing field. Records of other
//! types, records without that field, and records whose date cannot be parsed are dropped
//! silently; only a missing subject or an unreadable `from`/`to` bound fails the request.
//!
//! Dates come in two shapes: a bare calendar date (`YYYY-MM-DD`) or a full RFC 3339
//! timestamp. A bare date has no instant of its own, so it is pinned inside the day
//! according to its role: the start of the day for event instants and `from` bounds, the
//! last second of the day for `to` bounds. Bare dates are read in a caller-supplied zone;
//! the builder always passes UTC.

use crate::constants::{DEFAULT_TIMELINE_LIMIT, MAX_TIMELINE_LIMIT};
use crate::model::Record;
use crate::path;
use crate::store::{RecordQuery, RecordStore};
use crate::{RecordError, RecordResult};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Summary lookup order; the first path with a value wins.
const SUMMARY_PATHS: &[&str] = &[
    "code.text",
    "code.coding[0].display",
    "code.coding[0].code",
    "medicationCodeableConcept.text",
    "medicationCodeableConcept.coding[0].display",
    "medicationCodeableConcept.coding[0].code",
];

/// Labels tried for each observation component.
const COMPONENT_LABEL_PATHS: &[&str] = &[
    "code.coding[0].display",
    "code.coding[0].code",
    "code.text",
];

/// Which end of a bare calendar date an instant stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

impl Boundary {
    fn time(self) -> Option<NaiveTime> {
        match self {
            Boundary::Start => NaiveTime::from_hms_opt(0, 0, 0),
            Boundary::End => NaiveTime::from_hms_opt(23, 59, 59),
        }
    }
}

/// Parse a date or timestamp into a UTC instant.
///
/// Bare dates (`YYYY-MM-DD`) are pinned to `boundary` within the day in `zone`. Anything
/// else must be an RFC 3339 timestamp with an offset. Returns `None` if neither applies.
pub fn parse_instant<Tz: TimeZone>(
    raw: &str,
    boundary: Boundary,
    zone: &Tz,
) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let local = date.and_time(boundary.time()?);
        return zone
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc));
    }

    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Clamp a caller-supplied limit: non-positive or absent means the default.
pub fn normalize_limit(limit: Option<i64>) -> usize {
    match limit {
        Some(n) if n > 0 => usize::try_from(n)
            .unwrap_or(MAX_TIMELINE_LIMIT)
            .min(MAX_TIMELINE_LIMIT),
        _ => DEFAULT_TIMELINE_LIMIT,
    }
}

/// One dated event on a subject's timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    #[serde(skip)]
    pub occurred_at: DateTime<Utc>,
    pub date: String,
    pub resource_type: String,
    pub id: String,
    pub summary: Option<String>,
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineRules {
    /// Date field per timeline-capable resource type.
    pub date_fields: BTreeMap<String, String>,
}

impl Default for TimelineRules {
    fn default() -> Self {
        let date_fields = [
            ("Observation", "effectiveDateTime"),
            ("Condition", "onsetDateTime"),
            ("MedicationRequest", "authoredOn"),
            ("Encounter", "period.start"),
            ("Procedure", "performedDateTime"),
            ("Immunization", "occurrenceDateTime"),
        ]
        .into_iter()
        .map(|(t, f)| (t.to_string(), f.to_string()))
        .collect();

        Self { date_fields }
    }
}

/// Timeline request parameters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineQuery {
    pub subject: Option<String>,
    pub resource_types: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Clone)]
pub struct TimelineBuilder {
    store: Arc<dyn RecordStore>,
    rules: TimelineRules,
}

impl TimelineBuilder {
    pub fn new(store: Arc<dyn RecordStore>, rules: TimelineRules) -> Self {
        Self { store, rules }
    }

    pub fn with_default_rules(store: Arc<dyn RecordStore>) -> Self {
        Self::new(store, TimelineRules::default())
    }

    /// Build the timeline described by `query`, earliest event first.
    ///
    /// # Errors
    /// - `RecordError::InvalidInput` if the subject is missing or a bound is unreadable.
    /// - Any store error from the record lookup.
    pub fn build(&self, query: &TimelineQuery) -> RecordResult<Vec<TimelineEvent>> {
        let subject = query
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RecordError::InvalidInput("subject is required".into()))?;

        let from = parse_bound(query.from.as_deref(), Boundary::Start, "from")?;
        let to = parse_bound(query.to.as_deref(), Boundary::End, "to")?;

        let records = self.store.find_records(
            &RecordQuery::new()
                .resource_types(query.resource_types.iter().cloned())
                .subject(Some(subject.to_string())),
        )?;

        let mut events: Vec<(DateTime<Utc>, &Record, &str)> = records
            .iter()
            .filter_map(|record| {
                let field = self.rules.date_fields.get(&record.resource_type)?;
                let raw = path::resolve_str(&record.raw_data, field)?;
                let occurred_at = parse_instant(raw, Boundary::Start, &Utc)?;
                Some((occurred_at, record, raw))
            })
            .filter(|(at, _, _)| from.map_or(true, |from| *at >= from))
            .filter(|(at, _, _)| to.map_or(true, |to| *at <= to))
            .collect();

        // Stable sort keeps store order among equal instants.
        events.sort_by_key(|(at, _, _)| *at);
        events.truncate(normalize_limit(query.limit));

        Ok(events
            .into_iter()
            .map(|(occurred_at, record, raw)| TimelineEvent {
                occurred_at,
                date: raw.to_string(),
                resource_type: record.resource_type.clone(),
                id: record.resource_id.clone(),
                summary: summarize(&record.raw_data),
                details: details(&record.resource_type, &record.raw_data),
            })
            .collect())
    }
}

fn parse_bound(
    raw: Option<&str>,
    boundary: Boundary,
    name: &str,
) -> RecordResult<Option<DateTime<Utc>>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_instant(raw, boundary, &Utc)
            .map(Some)
            .ok_or_else(|| RecordError::InvalidInput(format!("invalid {name} date: {raw}"))),
    }
}

fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn first_text(document: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|p| path::resolve(document, p).and_then(display_text))
}

fn summarize(document: &Value) -> Option<String> {
    first_text(document, SUMMARY_PATHS)
}

/// `"<value> <unit>"` for a quantity; the unit falls back to its code.
fn format_quantity(quantity: &Value) -> Option<String> {
    let value = path::resolve(quantity, "value").and_then(display_text)?;
    let unit = first_text(quantity, &["unit", "code"]);
    Some(match unit {
        Some(unit) => format!("{value} {unit}"),
        None => value,
    })
}

fn details(resource_type: &str, document: &Value) -> Map<String, Value> {
    let mut details = Map::new();

    match resource_type {
        "Observation" => {
            if let Some(Value::Array(components)) = path::resolve(document, "component") {
                for component in components {
                    let label = first_text(component, COMPONENT_LABEL_PATHS);
                    let value = path::resolve(component, "valueQuantity").and_then(format_quantity);
                    if let (Some(label), Some(value)) = (label, value) {
                        details.insert(label, Value::String(value));
                    }
                }
            } else if let Some(value) =
                path::resolve(document, "valueQuantity").and_then(format_quantity)
            {
                details.insert("value".into(), Value::String(value));
            }
        }
        "MedicationRequest" => {
            if let Some(text) = path::resolve_str(document, "dosageInstruction[0].text") {
                details.insert("dosage".into(), Value::String(text.to_string()));
            }
        }
        _ => {}
    }

    details
}
