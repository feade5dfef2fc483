//! Error types for unitstore
//!
//! Provides a unified error type for all operations.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::types::DataType;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for unitstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Timed out: {0}")]
    Timeout(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Schema Errors
    // -------------------------------------------------------------------------
    #[error("Schema conflict on field {field}: declared {existing}, got {requested}")]
    SchemaConflict {
        field: String,
        existing: DataType,
        requested: DataType,
    },

    // -------------------------------------------------------------------------
    // Query Errors
    // -------------------------------------------------------------------------
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Flush of table {table} failed: {reason}")]
    FlushFailed { table: String, reason: String },

    #[error("Storage is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether the caller may retry the failed operation as-is.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Timeout(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors shared between callers of one cache load
impl From<Arc<StoreError>> for StoreError {
    fn from(err: Arc<StoreError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(|shared| match &*shared {
            StoreError::Io(e) => StoreError::Io(io::Error::new(e.kind(), e.to_string())),
            StoreError::Timeout(msg) => StoreError::Timeout(msg.clone()),
            StoreError::Serialization(msg) => StoreError::Serialization(msg.clone()),
            StoreError::SchemaConflict {
                field,
                existing,
                requested,
            } => StoreError::SchemaConflict {
                field: field.clone(),
                existing: *existing,
                requested: *requested,
            },
            StoreError::InvalidFilter(msg) => StoreError::InvalidFilter(msg.clone()),
            StoreError::InvalidArgument(msg) => StoreError::InvalidArgument(msg.clone()),
            StoreError::Integrity(msg) => StoreError::Integrity(msg.clone()),
            StoreError::FlushFailed { table, reason } => StoreError::FlushFailed {
                table: table.clone(),
                reason: reason.clone(),
            },
            StoreError::Closed => StoreError::Closed,
            StoreError::Config(msg) => StoreError::Config(msg.clone()),
        })
    }
}
