// models/src/errors.rs

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    StorageError(String), // General storage operation error
    #[error("Serialization error: {0}")]
    SerializationError(String), // Error while encoding a record
    #[error("Deserialization error: {0}")]
    DeserializationError(String), // Error while decoding a stored record
}

// Implement From for serde_json::Error to convert into StoreError variants.
impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(format!("JSON processing error: {}", err))
    }
}

#[cfg(feature = "sled-errors")]
impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::StorageError(format!("Sled error: {}", err))
    }
}

/// A validation error raised while checking a request payload.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A required field was absent from a creation payload.
    #[error("Missing field: {0}")]
    MissingField(&'static str),
    /// An age value could not be read as an integer.
    #[error("Invalid age: {0}")]
    InvalidAge(String),
    /// A search pattern did not compile as a regular expression.
    #[error("Invalid search pattern: {0}")]
    InvalidSearch(String),
    /// A CSV row could not be converted into a record.
    #[error("Invalid CSV row {0}: {1}")]
    CsvRow(usize, String),
}

/// A type alias for a `Result` that returns a `StoreError` on failure.
pub type StoreResult<T> = Result<T, StoreError>;

/// A type alias for a `Result` that returns a `ValidationError` on failure.
pub type ValidationResult<T> = Result<T, ValidationError>;
