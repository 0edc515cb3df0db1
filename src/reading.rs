//! # Reading Module
//!
//! One assembled sample of every sensor channel plus the derived features
//! and the transport mode the user had selected when it was taken.
//!
//! ## Invariants Held By Construction
//! - Speed is never missing: `speed_mps` defaults to 0 and `speed_kmph` is
//!   always `speed_mps * 3.6`. Both only change through `set_speed`.
//! - Latitude and longitude travel together as one `Coordinate`.
//! - Magnitudes start at 0 and are overwritten by the filter chain.

use crate::error::CodecError;
use std::fmt;
use std::str::FromStr;

pub const MPS_TO_KMPH: f64 = 3.6;

/// User-supplied label for the current way of travelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportMode {
    Train,
    Car,
    Bus,
    Bike,
    Walking,
    #[default]
    Standing,
    Auto,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Train => "train",
            TransportMode::Car => "car",
            TransportMode::Bus => "bus",
            TransportMode::Bike => "bike",
            TransportMode::Walking => "walking",
            TransportMode::Standing => "standing",
            TransportMode::Auto => "auto",
        }
    }

    /// Get all modes in selection order
    pub fn all() -> [TransportMode; 7] {
        [
            TransportMode::Train,
            TransportMode::Car,
            TransportMode::Bus,
            TransportMode::Bike,
            TransportMode::Walking,
            TransportMode::Standing,
            TransportMode::Auto,
        ]
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransportMode::all()
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CodecError::UnknownTransportMode(s.to_string()))
    }
}

/// WGS84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Returns `None` unless both components are finite numbers
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if latitude.is_finite() && longitude.is_finite() {
            Some(Self { latitude, longitude })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// One sample of all channels
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Linear acceleration in m/s², body frame
    pub accel: Vector3,
    /// Angular rate in device units
    pub gyro: Vector3,
    pub location: Option<Coordinate>,
    speed_mps: f64,
    pub magnitude: f64,
    pub gyro_magnitude: f64,
    pub transport_mode: TransportMode,
}

impl Reading {
    pub fn new(timestamp: i64, transport_mode: TransportMode) -> Self {
        Self {
            timestamp,
            accel: Vector3::default(),
            gyro: Vector3::default(),
            location: None,
            speed_mps: 0.0,
            magnitude: 0.0,
            gyro_magnitude: 0.0,
            transport_mode,
        }
    }

    pub fn with_accel(mut self, accel: Vector3) -> Self {
        self.accel = accel;
        self
    }

    pub fn with_gyro(mut self, gyro: Vector3) -> Self {
        self.gyro = gyro;
        self
    }

    pub fn with_location(mut self, location: Option<Coordinate>) -> Self {
        self.location = location;
        self
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.set_speed(speed_mps);
        self
    }

    /// Negative, NaN and infinite speeds are stored as 0
    pub fn set_speed(&mut self, speed_mps: f64) {
        self.speed_mps = if speed_mps.is_finite() && speed_mps > 0.0 {
            speed_mps
        } else {
            0.0
        };
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    pub fn speed_kmph(&self) -> f64 {
        self.speed_mps * MPS_TO_KMPH
    }

    pub fn latitude(&self) -> Option<f64> {
        self.location.map(|c| c.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.location.map(|c| c.longitude)
    }

    /// Recompute both magnitudes from the current axis values
    pub fn refresh_magnitudes(&mut self) {
        self.magnitude = self.accel.norm();
        self.gyro_magnitude = self.gyro.norm();
    }
}
