//! # Filter Chain Module
//!
//! Batch filters applied to a flushed buffer of readings, in this order:
//!
//! 1. **Low-pass** (accelerometer): `y[n] = α·x[n] + (1−α)·y[n−1]`, `y[0] = x[0]`
//! 2. **High-pass** (gyroscope): `y[n] = α·(y[n−1] + x[n] − x[n−1])`, `y[0] = x[0]`
//! 3. **Threshold** (accelerometer): zero any axis with `|v| < t`
//! 4. **Magnitudes**: Euclidean norms of the filtered vectors
//!
//! Each IIR stage is seeded from the first reading of the batch and carries
//! no state between calls. Output length always equals input length.

use crate::config::Config;
use crate::reading::{Reading, Vector3};

pub const DEFAULT_LOWPASS_ALPHA: f64 = 0.45;
pub const DEFAULT_HIGHPASS_ALPHA: f64 = 0.9;
pub const DEFAULT_THRESHOLD: f64 = 0.03;

/// Exponential moving average over the accelerometer axes
pub fn lowpass(data: &[Reading], alpha: f64) -> Vec<Reading> {
    let Some(first) = data.first() else {
        return Vec::new();
    };

    let mut prev = first.accel;
    data.iter()
        .map(|reading| {
            let x = reading.accel;
            let y = Vector3::new(
                alpha * x.x + (1.0 - alpha) * prev.x,
                alpha * x.y + (1.0 - alpha) * prev.y,
                alpha * x.z + (1.0 - alpha) * prev.z,
            );
            prev = y;
            let mut out = reading.clone();
            out.accel = y;
            out
        })
        .collect()
}

/// First-order IIR high-pass over the gyroscope axes
pub fn highpass(data: &[Reading], alpha: f64) -> Vec<Reading> {
    let Some(first) = data.first() else {
        return Vec::new();
    };

    // The first sample is emitted as-is; the recurrence itself starts from rest
    // so a constant input settles to exactly zero on the second sample.
    let mut prev_in = first.gyro;
    let mut prev_out = Vector3::default();
    data.iter()
        .enumerate()
        .map(|(i, reading)| {
            let x = reading.gyro;
            if i == 0 {
                return reading.clone();
            }
            let y = Vector3::new(
                alpha * (prev_out.x + x.x - prev_in.x),
                alpha * (prev_out.y + x.y - prev_in.y),
                alpha * (prev_out.z + x.z - prev_in.z),
            );
            prev_in = x;
            prev_out = y;
            let mut out = reading.clone();
            out.gyro = y;
            out
        })
        .collect()
}

fn gate(value: f64, t: f64) -> f64 {
    if value.abs() < t {
        0.0
    } else {
        value
    }
}

/// Zero accelerometer axes whose absolute value is below `t`
pub fn threshold(data: &[Reading], t: f64) -> Vec<Reading> {
    data.iter()
        .map(|reading| {
            let a = reading.accel;
            let mut out = reading.clone();
            out.accel = Vector3::new(gate(a.x, t), gate(a.y, t), gate(a.z, t));
            out
        })
        .collect()
}

/// Overwrite both magnitudes from the current axis values
pub fn compute_magnitudes(data: &mut [Reading]) {
    for reading in data.iter_mut() {
        reading.refresh_magnitudes();
    }
}

/// The full four-stage pipeline with its parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterChain {
    pub lowpass_alpha: f64,
    pub highpass_alpha: f64,
    pub threshold: f64,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self {
            lowpass_alpha: DEFAULT_LOWPASS_ALPHA,
            highpass_alpha: DEFAULT_HIGHPASS_ALPHA,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl FilterChain {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lowpass_alpha: config.lowpass_alpha,
            highpass_alpha: config.highpass_alpha,
            threshold: config.accel_threshold,
        }
    }

    pub fn apply(&self, batch: &[Reading]) -> Vec<Reading> {
        let out = lowpass(batch, self.lowpass_alpha);
        let out = highpass(&out, self.highpass_alpha);
        let mut out = threshold(&out, self.threshold);
        compute_magnitudes(&mut out);
        out
    }
}
