// ===================================================================================================
// Error Handling System - Error Types for the Storage Core
// ===================================================================================================
//
// Structured error types mapping directly onto the error kinds enumerated for
// this system: invalid input, missing peers, insufficient shards, hash
// mismatches, single-flight duplicates, transient backend failures, and
// index-store failures. Handlers convert these into the `{code, msg}` HTTP
// envelope; background workers (fan-out, sweep, heartbeat) log them and
// continue.
// ===================================================================================================

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub enum ObjError {
    /// Bad hash length, missing form field, or other malformed request.
    InvalidInput(String),

    /// No storage node is currently live in the membership table.
    NoLivePeer,

    /// Fewer than `D` shards could be retrieved after retries.
    InsufficientShards,

    /// Uploaded bytes hash to something other than the declared digest.
    HashMismatch,

    /// Single-flight admission gate rejected a second concurrent operation.
    DuplicateInFlight(String),

    /// Transient remote error from a storage node or network error.
    StorageBackend(String),

    /// The document index is unreachable or returned an error.
    Index(String),

    /// File system I/O failure.
    Io(String),

    /// JSON (de)serialization failure.
    Serialization(String),

    /// Resource not found (manifest, shard, token).
    NotFound(String),

    /// Catch-all for conditions that don't fit another category.
    Generic(String),
}

impl fmt::Display for ObjError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjError::InvalidInput(e) => write!(f, "invalid input: {}", e),
            ObjError::NoLivePeer => write!(f, "no live storage node"),
            ObjError::InsufficientShards => write!(f, "insufficient shards to reconstruct"),
            ObjError::HashMismatch => write!(f, "uploaded content does not match declared hash"),
            ObjError::DuplicateInFlight(e) => write!(f, "operation already in flight: {}", e),
            ObjError::StorageBackend(e) => write!(f, "storage backend error: {}", e),
            ObjError::Index(e) => write!(f, "index error: {}", e),
            ObjError::Io(e) => write!(f, "io error: {}", e),
            ObjError::Serialization(e) => write!(f, "serialization error: {}", e),
            ObjError::NotFound(e) => write!(f, "not found: {}", e),
            ObjError::Generic(e) => write!(f, "error: {}", e),
        }
    }
}

impl StdError for ObjError {}

impl From<std::io::Error> for ObjError {
    fn from(error: std::io::Error) -> Self {
        ObjError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for ObjError {
    fn from(error: serde_json::Error) -> Self {
        ObjError::Serialization(error.to_string())
    }
}

impl From<reed_solomon_erasure::Error> for ObjError {
    fn from(error: reed_solomon_erasure::Error) -> Self {
        ObjError::Generic(format!("reed-solomon error: {:?}", error))
    }
}

impl From<sled::Error> for ObjError {
    fn from(error: sled::Error) -> Self {
        ObjError::Index(error.to_string())
    }
}

impl From<anyhow::Error> for ObjError {
    fn from(error: anyhow::Error) -> Self {
        ObjError::Generic(error.to_string())
    }
}

/// Maps an error onto the wire envelope's `code` field (spec.md §6).
impl ObjError {
    pub fn code(&self) -> u16 {
        match self {
            ObjError::InvalidInput(_) => 403,
            ObjError::HashMismatch => 400,
            ObjError::NoLivePeer => 500,
            ObjError::InsufficientShards => 500,
            ObjError::DuplicateInFlight(_) => 500,
            ObjError::StorageBackend(_) => 500,
            ObjError::Index(_) => 500,
            ObjError::Io(_) => 500,
            ObjError::Serialization(_) => 500,
            ObjError::NotFound(_) => 404,
            ObjError::Generic(_) => 500,
        }
    }
}

pub type ObjResult<T> = Result<T, ObjError>;
