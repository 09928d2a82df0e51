//! Error types for mvcckv
//!
//! Provides a unified error type for all operations, plus the narrower
//! error types produced by the key codec and the merge operator.

use thiserror::Error;

/// Result type alias using MvccError
pub type Result<T> = std::result::Result<T, MvccError>;

/// Failure to decode an encoded MVCC key or timestamp.
///
/// Always a logic or data-corruption bug; never recovered internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed mvcc key: {0}")]
    Malformed(String),
}

/// Failure to combine two metadata records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// One of the inputs could not be parsed
    #[error("corrupted merge value: {0}")]
    Corrupt(String),

    /// The inputs carry semantics that cannot be reconciled
    #[error("incompatible merge values: {0}")]
    Incompatible(String),

    /// The updates cannot be combined without the base value
    #[error("merge operands cannot be combined without a base value")]
    NeedsBase,
}

/// Unified error type for mvcckv operations
#[derive(Debug, Error)]
pub enum MvccError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Encoding Errors
    // -------------------------------------------------------------------------
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock error: {0}")]
    LockPoisoned(String),
}

impl MvccError {
    /// Whether this error reports damaged data rather than a bad request.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            MvccError::Corruption(_)
                | MvccError::WalCorruption(_)
                | MvccError::Decode(_)
                | MvccError::Merge(MergeError::Corrupt(_))
        )
    }

    /// Whether this error is a merge whose operands cannot be reconciled.
    /// A request-level failure: the stored data is intact.
    pub fn is_merge_conflict(&self) -> bool {
        matches!(self, MvccError::Merge(MergeError::Incompatible(_)))
    }
}

// Iterators keep the error that stopped them and report it on every
// `status()` call; `io::Error` has no `Clone`, so it is rebuilt from its
// kind and message.
impl Clone for MvccError {
    fn clone(&self) -> Self {
        match self {
            MvccError::Io(e) => MvccError::Io(std::io::Error::new(e.kind(), e.to_string())),
            MvccError::Decode(e) => MvccError::Decode(e.clone()),
            MvccError::Merge(e) => MvccError::Merge(e.clone()),
            MvccError::Serialization(msg) => MvccError::Serialization(msg.clone()),
            MvccError::WalCorruption(msg) => MvccError::WalCorruption(msg.clone()),
            MvccError::Storage(msg) => MvccError::Storage(msg.clone()),
            MvccError::Corruption(msg) => MvccError::Corruption(msg.clone()),
            MvccError::InvalidArgument(msg) => MvccError::InvalidArgument(msg.clone()),
            MvccError::NotSupported(msg) => MvccError::NotSupported(msg.clone()),
            MvccError::Config(msg) => MvccError::Config(msg.clone()),
            MvccError::LockPoisoned(msg) => MvccError::LockPoisoned(msg.clone()),
        }
    }
}

impl From<bincode::Error> for MvccError {
    fn from(e: bincode::Error) -> Self {
        MvccError::Serialization(e.to_string())
    }
}
