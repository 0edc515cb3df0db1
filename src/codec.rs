//! # Record Codec Module
//!
//! Maps readings to the persisted tabular form and renders tabular rows as CSV.
//!
//! ## Formats
//! - `Row`: ordered `(column, Field)` pairs, column names as in the schema
//! - CSV: header taken from the first row's columns in encounter order,
//!   `\n` line separator, speed columns with exactly four decimals,
//!   nulls as empty fields, text quoted only when it needs to be
//!
//! Decoding a row reproduces every stored value of the reading. Speed in km/h
//! is derived on the reading side, so only `speed_mps` is read back.

use crate::error::CodecError;
use crate::reading::{Coordinate, Reading, TransportMode, Vector3};

pub const DELIMITER: char = ',';

/// Persisted column names in schema order
pub const COLUMNS: [&str; 14] = [
    "timestamp",
    "ax",
    "ay",
    "az",
    "gx",
    "gy",
    "gz",
    "latitude",
    "longitude",
    "speed_mps",
    "speed_kmph",
    "magnitude",
    "gyro_magnitude",
    "transport_mode",
];

const SPEED_COLUMNS: [&str; 2] = ["speed_mps", "speed_kmph"];

/// A single tabular cell
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Field {
    /// Numeric view, parsing text when needed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Field::Null => None,
            Field::Integer(i) => Some(*i as f64),
            Field::Real(r) => Some(*r),
            Field::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Infer the cell type of one CSV field
    fn from_csv(raw: &str) -> Field {
        if raw.is_empty() {
            return Field::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Field::Integer(i);
        }
        if let Ok(r) = raw.parse::<f64>() {
            return Field::Real(r);
        }
        Field::Text(raw.to_string())
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Real(v)
    }
}

impl From<Option<f64>> for Field {
    fn from(v: Option<f64>) -> Self {
        v.map(Field::Real).unwrap_or(Field::Null)
    }
}

/// One record in tabular form, columns kept in insertion order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    fields: Vec<(String, Field)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing an existing value in place
    pub fn set(&mut self, column: impl Into<String>, field: impl Into<Field>) {
        let column = column.into();
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((column, field)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, field)| field)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reading to schema row; only the location may be null
pub fn to_row(reading: &Reading) -> Row {
    let mut row = Row::new();
    row.set("timestamp", Field::Integer(reading.timestamp));
    row.set("ax", reading.accel.x);
    row.set("ay", reading.accel.y);
    row.set("az", reading.accel.z);
    row.set("gx", reading.gyro.x);
    row.set("gy", reading.gyro.y);
    row.set("gz", reading.gyro.z);
    row.set("latitude", reading.latitude());
    row.set("longitude", reading.longitude());
    row.set("speed_mps", reading.speed_mps());
    row.set("speed_kmph", reading.speed_kmph());
    row.set("magnitude", reading.magnitude);
    row.set("gyro_magnitude", reading.gyro_magnitude);
    row.set("transport_mode", Field::Text(reading.transport_mode.to_string()));
    row
}

fn required<'a>(row: &'a Row, column: &str) -> Result<&'a Field, CodecError> {
    row.get(column)
        .ok_or_else(|| CodecError::MissingColumn(column.to_string()))
}

fn real(row: &Row, column: &str) -> Result<f64, CodecError> {
    let field = required(row, column)?;
    field.as_f64().ok_or_else(|| CodecError::InvalidValue {
        column: column.to_string(),
        value: format!("{:?}", field),
    })
}

/// Missing or null columns read as 0
fn real_or_zero(row: &Row, column: &str) -> Result<f64, CodecError> {
    match row.get(column) {
        None | Some(Field::Null) => Ok(0.0),
        Some(_) => real(row, column),
    }
}

fn optional_real(row: &Row, column: &str) -> Result<Option<f64>, CodecError> {
    match row.get(column) {
        None | Some(Field::Null) => Ok(None),
        Some(_) => real(row, column).map(Some),
    }
}

/// Schema row back to a reading
pub fn from_row(row: &Row) -> Result<Reading, CodecError> {
    let timestamp = match required(row, "timestamp")? {
        Field::Integer(i) => *i,
        other => other
            .as_f64()
            .filter(|t| t.fract() == 0.0)
            .map(|t| t as i64)
            .ok_or_else(|| CodecError::InvalidValue {
                column: "timestamp".to_string(),
                value: format!("{:?}", other),
            })?,
    };

    let transport_mode: TransportMode = match required(row, "transport_mode")? {
        Field::Text(s) => s.parse()?,
        other => return Err(CodecError::UnknownTransportMode(format!("{:?}", other))),
    };

    let location = match (optional_real(row, "latitude")?, optional_real(row, "longitude")?) {
        (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon).ok_or_else(|| {
            CodecError::InvalidValue {
                column: "latitude".to_string(),
                value: format!("{}, {}", lat, lon),
            }
        })?),
        (None, None) => None,
        (Some(_), None) => {
            return Err(CodecError::InvalidValue {
                column: "longitude".to_string(),
                value: "null".to_string(),
            })
        }
        (None, Some(_)) => {
            return Err(CodecError::InvalidValue {
                column: "latitude".to_string(),
                value: "null".to_string(),
            })
        }
    };

    let mut reading = Reading::new(timestamp, transport_mode)
        .with_accel(Vector3::new(real(row, "ax")?, real(row, "ay")?, real(row, "az")?))
        .with_gyro(Vector3::new(real(row, "gx")?, real(row, "gy")?, real(row, "gz")?))
        .with_location(location)
        .with_speed(real_or_zero(row, "speed_mps")?);
    reading.magnitude = real_or_zero(row, "magnitude")?;
    reading.gyro_magnitude = real_or_zero(row, "gyro_magnitude")?;

    Ok(reading)
}

/// Cell text before CSV quoting is applied
fn render_field(column: &str, field: &Field) -> String {
    if field.is_null() {
        return String::new();
    }
    if SPEED_COLUMNS.contains(&column) {
        return match field.as_f64().filter(|v| v.is_finite()) {
            Some(v) => format!("{:.4}", v),
            None => "0.0000".to_string(),
        };
    }
    match field {
        Field::Null => String::new(),
        Field::Integer(i) => i.to_string(),
        Field::Real(r) => r.to_string(),
        Field::Text(s) => s.clone(),
    }
}

fn record(row: &Row, header: &[&str]) -> Vec<String> {
    header
        .iter()
        .map(|column| match row.get(column) {
            Some(field) => render_field(column, field),
            None => String::new(),
        })
        .collect()
}

fn writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .delimiter(DELIMITER as u8)
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new())
}

fn csv_failure(e: impl std::fmt::Display) -> CodecError {
    CodecError::Malformed(e.to_string())
}

/// Drain the writer, dropping the final record terminator
fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, CodecError> {
    let bytes = wtr.into_inner().map_err(csv_failure)?;
    let mut text = String::from_utf8(bytes).map_err(csv_failure)?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

/// Render one row following the given header; absent columns become empty fields
pub fn csv_row(row: &Row, header: &[&str]) -> Result<String, CodecError> {
    let mut wtr = writer();
    wtr.write_record(record(row, header)).map_err(csv_failure)?;
    finish(wtr)
}

/// Render rows as CSV text; empty input gives an empty string
pub fn to_csv(rows: &[Row]) -> Result<String, CodecError> {
    let Some(first) = rows.first() else {
        return Ok(String::new());
    };

    let header: Vec<&str> = first.columns().collect();
    let mut wtr = writer();
    wtr.write_record(&header).map_err(csv_failure)?;
    for row in rows {
        wtr.write_record(record(row, &header)).map_err(csv_failure)?;
    }
    finish(wtr)
}

/// Parse CSV text produced by `to_csv` back into rows
pub fn parse_csv(text: &str) -> Result<Vec<Row>, CodecError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(DELIMITER as u8)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let header: Vec<String> = rdr
        .headers()
        .map_err(csv_failure)?
        .iter()
        .map(str::to_string)
        .collect();

    rdr.records()
        .map(|result| {
            let record = result.map_err(csv_failure)?;
            let mut row = Row::new();
            for (column, raw) in header.iter().zip(record.iter()) {
                row.set(column.clone(), Field::from_csv(raw));
            }
            Ok(row)
        })
        .collect()
}
