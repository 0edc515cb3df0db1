//! Motion sensor feature logger.
//!
//! Ingests accelerometer, gyroscope and GPS streams, derives speed, filters
//! fixed-rate batches and persists one representative feature row per save
//! interval to SQLite, with CSV export of the collected dataset.

pub mod aggregator;
pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod filters;
pub mod reading;
pub mod ring_buffer;
pub mod sensor;
pub mod session;
pub mod speed;
pub mod stats;
pub mod storage;

pub use aggregator::Aggregator;
pub use config::Config;
pub use error::{CodecError, ConfigError, ExportError, SensorError, SessionError, StorageError};
pub use reading::{Reading, TransportMode};
pub use session::{Recorder, SessionState};
pub use storage::{FeatureStore, SqliteStore};
