//! Error types for cratedig operations

use thiserror::Error;

use crate::ids::ReleaseId;

/// Persistent store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open store environment: {reason}")]
    EnvOpen { reason: String },

    #[error("Failed to open database {name}: {reason}")]
    DbOpen { name: String, reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Serialization failed for {what}: {reason}")]
    Serialization { what: String, reason: String },

    #[error("Deserialization failed for {what}: {reason}")]
    Deserialization { what: String, reason: String },

    #[error("Store schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },
}

/// Remote catalog transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {target} failed: {reason}")]
    Network { target: String, reason: String },

    #[error("Rate limited by remote catalog, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Not found: {target}")]
    NotFound { target: String },

    #[error("Request to {target} failed with status {status}: {message}")]
    Status {
        target: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {target}: {reason}")]
    InvalidResponse { target: String, reason: String },
}

/// Entity store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Release {id} has no master release")]
    NoMaster { id: ReleaseId },

    #[error("Unexpected payload shape for {target}: {reason}")]
    PayloadShape { target: String, reason: String },
}

/// Master error type for all cratedig errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CratedigError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Result type alias for cratedig operations.
pub type CratedigResult<T> = Result<T, CratedigError>;

// =============================================================================
// TESTS
// =============================================================================
