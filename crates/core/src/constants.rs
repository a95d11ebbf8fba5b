//! Constants used throughout the clinrec core crate.
//!
//! Field names, query limits and store filenames live here so the engines, the REST layer
//! and the CLI agree on them.

/// Discriminator field selecting which rules apply to a document.
pub const RESOURCE_TYPE_FIELD: &str = "resourceType";

/// Field carrying the resource identifier.
pub const RESOURCE_ID_FIELD: &str = "id";

/// Path to the subject reference of a document.
pub const SUBJECT_REFERENCE_PATH: &str = "subject.reference";

/// Resource type exempt from the subject requirement because it is the subject.
pub const SELF_SUBJECT_TYPE: &str = "Patient";

/// Resource type key used when a document carries no discriminator.
pub const UNKNOWN_RESOURCE_TYPE: &str = "unknown";

/// Upper bound on rows returned by record listing and transform queries.
pub const MAX_QUERY_ROWS: usize = 500;

/// Timeline limit applied when the caller supplies a non-positive value.
pub const DEFAULT_TIMELINE_LIMIT: usize = 100;

/// Largest timeline limit a caller may request.
pub const MAX_TIMELINE_LIMIT: usize = 500;

/// Filename of the persisted record table in a directory store.
pub const RECORDS_FILENAME: &str = "records.json";

/// Filename of the persisted import run table in a directory store.
pub const IMPORT_RUNS_FILENAME: &str = "import_runs.json";
