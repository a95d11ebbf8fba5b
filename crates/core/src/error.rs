//! Error type shared by every core service.
//!
//! Per-line import problems are not errors: they are recorded on the import run as
//! [`ValidationError`](crate::model::ValidationError) and
//! [`Warning`](crate::model::Warning) values. `RecordError` covers caller mistakes, missing
//! records, key conflicts and store failures.

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate record for key ({resource_type}, {resource_id})")]
    DuplicateRecord {
        resource_type: String,
        resource_id: String,
    },
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to read store file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write store file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize store contents: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize store contents: {0}")]
    Deserialization(serde_json::Error),
}

impl RecordError {
    /// True for errors caused by the caller's input rather than by the system.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, RecordError::InvalidInput(_))
    }
}

pub type RecordResult<T> = std::result::Result<T, RecordError>;
