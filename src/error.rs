//! # Error Types Module
//!
//! Centralized error handling for the motion logger.
//! One error type per concern, each with a readable message and error chaining.
//!
//! ## Error Types
//! - `ConfigError`: Configuration file I/O, parsing and validation errors
//! - `StorageError`: Database open/schema/insert/query failures
//! - `SessionError`: Recorder lifecycle failures
//! - `SensorError`: Sensor subscription failures
//! - `CodecError`: Tabular/CSV decoding failures
//!
//! ## What Is Not An Error
//! Bad GPS coordinates and out-of-range fix intervals are normal sensor noise.
//! They are absorbed inside the speed estimator and never surface here.

use std::fmt;

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// Config parsed but holds values the pipeline cannot run with
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Errors raised by the storage collaborator
#[derive(Debug)]
pub enum StorageError {
    /// Database file could not be opened or created
    Open(rusqlite::Error),
    /// Schema creation failed
    Schema(rusqlite::Error),
    /// A row of the batch failed; the whole batch was rolled back
    Insert(rusqlite::Error),
    /// Select or delete failed
    Query(rusqlite::Error),
    /// A stored row could not be turned back into a reading
    Decode(CodecError),
    /// Another thread panicked while holding the connection
    LockPoisoned,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Open(e) => write!(f, "Failed to open database: {}", e),
            StorageError::Schema(e) => write!(f, "Failed to create schema: {}", e),
            StorageError::Insert(e) => {
                write!(f, "Batch insert failed and was rolled back: {}", e)
            }
            StorageError::Query(e) => write!(f, "Query failed: {}", e),
            StorageError::Decode(e) => write!(f, "Stored row is unreadable: {}", e),
            StorageError::LockPoisoned => write!(f, "Database connection lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Open(e)
            | StorageError::Schema(e)
            | StorageError::Insert(e)
            | StorageError::Query(e) => Some(e),
            StorageError::Decode(e) => Some(e),
            StorageError::LockPoisoned => None,
        }
    }
}

impl From<CodecError> for StorageError {
    fn from(e: CodecError) -> Self {
        StorageError::Decode(e)
    }
}

/// Errors that can occur while driving a recording session
#[derive(Debug)]
pub enum SessionError {
    /// Pipeline or writer thread could not be spawned
    WorkerSpawn(std::io::Error),
    /// Storage call made on behalf of the session failed
    Storage(StorageError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::WorkerSpawn(e) => write!(f, "Failed to spawn worker thread: {}", e),
            SessionError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::WorkerSpawn(e) => Some(e),
            SessionError::Storage(e) => Some(e),
        }
    }
}

impl From<StorageError> for SessionError {
    fn from(e: StorageError) -> Self {
        SessionError::Storage(e)
    }
}

/// Errors that can occur while subscribing to a sensor
#[derive(Debug, Clone)]
pub enum SensorError {
    /// The device has no such sensor
    Unavailable(String),
    /// The sensor exists but the subscription was refused
    SubscribeFailed { sensor: String, reason: String },
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Unavailable(name) => write!(f, "Sensor not available: {}", name),
            SensorError::SubscribeFailed { sensor, reason } => {
                write!(f, "Failed to subscribe to {}: {}", sensor, reason)
            }
        }
    }
}

impl std::error::Error for SensorError {}

/// Errors that can occur while decoding tabular or CSV rows
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// A required column is absent from the row
    MissingColumn(String),
    /// A column holds a value of the wrong shape
    InvalidValue { column: String, value: String },
    /// The transport_mode column names no known mode
    UnknownTransportMode(String),
    /// CSV text could not be read or written
    Malformed(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::MissingColumn(col) => write!(f, "Missing column: {}", col),
            CodecError::InvalidValue { column, value } => {
                write!(f, "Invalid value for {}: {:?}", column, value)
            }
            CodecError::UnknownTransportMode(mode) => {
                write!(f, "Unknown transport mode: {}", mode)
            }
            CodecError::Malformed(msg) => write!(f, "Malformed CSV: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// Errors that can occur while exporting the dataset
#[derive(Debug)]
pub enum ExportError {
    /// Rows could not be read or rendered
    Storage(StorageError),
    /// The sink refused the text
    Sink(std::io::Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Storage(e) => write!(f, "Export failed: {}", e),
            ExportError::Sink(e) => write!(f, "Could not deliver export: {}", e),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Storage(e) => Some(e),
            ExportError::Sink(e) => Some(e),
        }
    }
}

impl From<StorageError> for ExportError {
    fn from(e: StorageError) -> Self {
        ExportError::Storage(e)
    }
}
