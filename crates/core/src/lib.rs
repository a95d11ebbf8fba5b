//! # Clinrec Core
//!
//! Core record-processing logic for the clinical record service.
//!
//! This crate contains the ingest pipeline and every read-side view over stored records:
//! - Path navigation over semi-structured JSON documents
//! - Rule-driven validation and field extraction
//! - Bulk import runs with per-line error capture and run statistics
//! - Ad-hoc transformation, patient timelines and store-wide analytics
//! - The [`store::RecordStore`] seam with in-memory and directory-backed implementations
//!
//! **No API concerns**: HTTP servers and command-line parsing belong in `api-rest` and
//! `clinrec-cli`. Everything here is synchronous.

pub mod analytics;
pub mod config;
pub mod constants;
pub mod error;
pub mod extraction;
pub mod import;
pub mod model;
pub mod path;
pub mod records;
pub mod store;
pub mod timeline;
pub mod transform;
pub mod validation;

pub use analytics::{AnalyticsAggregator, AnalyticsSnapshot};
pub use config::CoreConfig;
pub use error::{RecordError, RecordResult};
pub use extraction::{ExtractionEngine, ExtractionRules};
pub use import::ImportPipeline;
pub use model::{ImportRun, ImportRunSummary, ImportStatus, Record};
pub use records::RecordService;
pub use store::{DirectoryStore, MemoryStore, RecordQuery, RecordStore};
pub use timeline::{TimelineBuilder, TimelineEvent, TimelineQuery, TimelineRules};
pub use transform::{TransformEngine, TransformRequest};
pub use validation::{ValidationEngine, ValidationRules};
