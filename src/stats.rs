//! Descriptive statistics over persisted feature rows.

use crate::reading::{Reading, TransportMode};
use std::collections::BTreeMap;
use std::fmt;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub rms: f64,
}

impl SeriesStats {
    pub fn of(values: &[f64]) -> Self {
        Self {
            mean: mean(values),
            std_dev: std_dev(values),
            rms: rms(values),
        }
    }
}

/// Summary of a whole recording
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureSummary {
    pub rows: usize,
    pub magnitude: SeriesStats,
    pub gyro_magnitude: SeriesStats,
    pub mean_speed_kmph: f64,
    pub max_speed_kmph: f64,
    pub rows_per_mode: BTreeMap<String, usize>,
}

impl FeatureSummary {
    pub fn from_readings(readings: &[Reading]) -> Self {
        let magnitudes: Vec<f64> = readings.iter().map(|r| r.magnitude).collect();
        let gyro_magnitudes: Vec<f64> = readings.iter().map(|r| r.gyro_magnitude).collect();
        let speeds: Vec<f64> = readings.iter().map(|r| r.speed_kmph()).collect();

        let mut rows_per_mode = BTreeMap::new();
        for reading in readings {
            *rows_per_mode
                .entry(reading.transport_mode.to_string())
                .or_insert(0) += 1;
        }

        Self {
            rows: readings.len(),
            magnitude: SeriesStats::of(&magnitudes),
            gyro_magnitude: SeriesStats::of(&gyro_magnitudes),
            mean_speed_kmph: mean(&speeds),
            max_speed_kmph: speeds.iter().copied().fold(0.0, f64::max),
            rows_per_mode,
        }
    }

    pub fn count_for(&self, mode: TransportMode) -> usize {
        self.rows_per_mode.get(mode.as_str()).copied().unwrap_or(0)
    }
}

impl fmt::Display for FeatureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "rows: {}", self.rows)?;
        writeln!(
            f,
            "magnitude: mean={:.4} std={:.4} rms={:.4}",
            self.magnitude.mean, self.magnitude.std_dev, self.magnitude.rms
        )?;
        writeln!(
            f,
            "gyro_magnitude: mean={:.4} std={:.4} rms={:.4}",
            self.gyro_magnitude.mean, self.gyro_magnitude.std_dev, self.gyro_magnitude.rms
        )?;
        writeln!(
            f,
            "speed_kmph: mean={:.4} max={:.4}",
            self.mean_speed_kmph, self.max_speed_kmph
        )?;
        for (mode, count) in &self.rows_per_mode {
            writeln!(f, "  {}: {}", mode, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(rms(&[]), 0.0);
        assert_eq!(FeatureSummary::from_readings(&[]).rows, 0);
    }

    #[test]
    fn test_basic_statistics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values), 5.0);
        assert_relative_eq!(std_dev(&values), 2.0);
        assert_relative_eq!(rms(&[3.0, 4.0]), (12.5f64).sqrt());
    }

    #[test]
    fn test_summary_counts_modes() {
        let mut a = Reading::new(0, TransportMode::Bus).with_speed(10.0);
        a.magnitude = 1.0;
        let mut b = Reading::new(1, TransportMode::Bus).with_speed(20.0);
        b.magnitude = 3.0;
        let c = Reading::new(2, TransportMode::Walking);

        let summary = FeatureSummary::from_readings(&[a, b, c]);
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.count_for(TransportMode::Bus), 2);
        assert_eq!(summary.count_for(TransportMode::Walking), 1);
        assert_eq!(summary.count_for(TransportMode::Train), 0);
        assert_relative_eq!(summary.magnitude.mean, 4.0 / 3.0);
        assert_relative_eq!(summary.max_speed_kmph, 72.0, epsilon = 1e-9);
        assert!(summary.to_string().contains("bus: 2"));
    }
}
