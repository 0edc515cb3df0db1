//! # Feature Storage Module
//!
//! Append-only SQLite table holding one aggregated feature row per flush.
//!
//! ## Schema
//! ```text
//! sensor_data
//! ├── id              INTEGER PRIMARY KEY AUTOINCREMENT
//! ├── timestamp       INTEGER (epoch ms)
//! ├── ax, ay, az      REAL
//! ├── gx, gy, gz      REAL
//! ├── latitude        REAL (nullable)
//! ├── longitude       REAL (nullable)
//! ├── speed_mps       REAL
//! ├── speed_kmph      REAL
//! ├── magnitude       REAL
//! ├── gyro_magnitude  REAL (added by migration on older databases)
//! └── transport_mode  TEXT
//! ```
//!
//! ## Migration
//! Databases created before `gyro_magnitude` existed get the column added in
//! place. If that fails the store keeps working without the column.

use crate::codec::{self, Field, Row, COLUMNS};
use crate::error::StorageError;
use crate::reading::Reading;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

const TABLE: &str = "sensor_data";
const GYRO_MAGNITUDE: &str = "gyro_magnitude";

/// Operations the pipeline needs from persistent storage
pub trait FeatureStore: Send + Sync {
    /// Create or upgrade the schema; safe to call repeatedly
    fn init(&self) -> Result<(), StorageError>;

    /// Delete every row
    fn clear(&self) -> Result<(), StorageError>;

    /// Insert all readings in one transaction, or none of them
    fn insert_batch(&self, readings: &[Reading]) -> Result<(), StorageError>;

    /// Newest rows first
    fn select_recent(&self, limit: usize) -> Result<Vec<Reading>, StorageError>;

    /// Every row oldest first, as tabular rows with the full column set
    fn select_all_for_export(&self) -> Result<Vec<Row>, StorageError>;
}

/// SQLite-backed feature store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// Cleared when the gyro_magnitude migration could not be applied
    has_gyro_magnitude: AtomicBool,
}

impl SqliteStore {
    /// Open or create the database file and initialise the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // Connection::open reports the real error if this fails
                let _ = std::fs::create_dir_all(parent);
            }
        }

        let conn = Connection::open(path).map_err(StorageError::Open)?;
        log::info!("Opened feature database: {}", path.display());
        Self::with_connection(conn)
    }

    /// Create an in-memory store
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(StorageError::Open)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        Self::with_migration(conn, Self::migrate)
    }

    fn with_migration<F>(conn: Connection, migrate: F) -> Result<Self, StorageError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<()>,
    {
        let store = Self {
            conn: Mutex::new(conn),
            has_gyro_magnitude: AtomicBool::new(true),
        };
        store.init_schema(migrate)?;
        Ok(store)
    }

    /// Create the table if needed, then run `migrate`. A failed migration
    /// only disables the gyro_magnitude column.
    fn init_schema<F>(&self, migrate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<()>,
    {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER,
                ax REAL, ay REAL, az REAL,
                gx REAL, gy REAL, gz REAL,
                latitude REAL,
                longitude REAL,
                speed_mps REAL,
                speed_kmph REAL,
                magnitude REAL,
                gyro_magnitude REAL,
                transport_mode TEXT
            );",
            TABLE
        ))
        .map_err(StorageError::Schema)?;

        match migrate(&conn) {
            Ok(()) => self.has_gyro_magnitude.store(true, Ordering::Relaxed),
            Err(e) => {
                log::warn!("Schema migration failed, storing without {}: {}", GYRO_MAGNITUDE, e);
                self.has_gyro_magnitude.store(false, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Whether rows carry the gyro_magnitude column
    pub fn has_gyro_magnitude(&self) -> bool {
        self.has_gyro_magnitude.load(Ordering::Relaxed)
    }

    fn active_columns(&self) -> Vec<&'static str> {
        let with_gyro = self.has_gyro_magnitude();
        COLUMNS
            .iter()
            .copied()
            .filter(|c| with_gyro || *c != GYRO_MAGNITUDE)
            .collect()
    }

    fn migrate(conn: &Connection) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", TABLE))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        let mut has_column = false;
        for name in names {
            if name? == GYRO_MAGNITUDE {
                has_column = true;
            }
        }

        if !has_column {
            log::info!("Adding {} column to {}", GYRO_MAGNITUDE, TABLE);
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} REAL;",
                TABLE, GYRO_MAGNITUDE
            ))?;
        }
        Ok(())
    }

    fn select_rows(&self, sql_tail: &str, limit: Option<usize>) -> Result<Vec<Row>, StorageError> {
        let columns = self.active_columns();
        let sql = format!("SELECT {} FROM {} {}", columns.join(", "), TABLE, sql_tail);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(StorageError::Query)?;
        let to_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<Row> {
            let mut row = Row::new();
            for (i, column) in columns.iter().enumerate() {
                let field = match r.get_ref(i)? {
                    ValueRef::Null => Field::Null,
                    ValueRef::Integer(v) => Field::Integer(v),
                    ValueRef::Real(v) => Field::Real(v),
                    ValueRef::Text(t) => Field::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => Field::Null,
                };
                row.set(*column, field);
            }
            Ok(row)
        };

        let rows = match limit {
            Some(limit) => stmt.query_map([limit as i64], to_row),
            None => stmt.query_map([], to_row),
        }
        .map_err(StorageError::Query)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StorageError::Query)
    }
}

impl FeatureStore for SqliteStore {
    fn init(&self) -> Result<(), StorageError> {
        self.init_schema(Self::migrate)
    }

    fn clear(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;
        conn.execute(&format!("DELETE FROM {}", TABLE), [])
            .map_err(StorageError::Query)?;
        Ok(())
    }

    fn insert_batch(&self, readings: &[Reading]) -> Result<(), StorageError> {
        if readings.is_empty() {
            return Ok(());
        }

        let columns = self.active_columns();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            TABLE,
            columns.join(", "),
            placeholders
        );

        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls it back
        let tx = conn.transaction().map_err(StorageError::Insert)?;
        {
            let mut stmt = tx.prepare(&sql).map_err(StorageError::Insert)?;
            for reading in readings {
                let row = codec::to_row(reading);
                let values = columns.iter().map(|column| match row.get(column) {
                    Some(Field::Integer(v)) => rusqlite::types::Value::Integer(*v),
                    Some(Field::Real(v)) => rusqlite::types::Value::Real(*v),
                    Some(Field::Text(s)) => rusqlite::types::Value::Text(s.clone()),
                    Some(Field::Null) | None => rusqlite::types::Value::Null,
                });
                stmt.execute(params_from_iter(values))
                    .map_err(StorageError::Insert)?;
            }
        }
        tx.commit().map_err(StorageError::Insert)?;

        log::debug!("Inserted {} feature row(s)", readings.len());
        Ok(())
    }

    fn select_recent(&self, limit: usize) -> Result<Vec<Reading>, StorageError> {
        self.select_rows("ORDER BY timestamp DESC, id DESC LIMIT ?1", Some(limit))?
            .iter()
            .map(|row| codec::from_row(row).map_err(StorageError::from))
            .collect()
    }

    fn select_all_for_export(&self) -> Result<Vec<Row>, StorageError> {
        self.select_rows("ORDER BY timestamp ASC, id ASC", None)
    }
}
