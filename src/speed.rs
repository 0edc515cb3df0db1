//! # GPS Speed Estimation Module
//!
//! Derives ground speed from consecutive location fixes using the
//! great-circle distance between them.
//!
//! ## Gating
//! 1. Fixes with non-finite coordinates are dropped without touching state
//! 2. Fewer than two fixes in the window gives speed 0
//! 3. A fix interval outside (min_dt, max_dt) keeps the previous speed
//! 4. Speeds above the cap are clamped to the cap, not discarded

use crate::config::Config;
use std::collections::VecDeque;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two WGS84 points (degrees)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

pub struct SpeedEstimator {
    history: VecDeque<GpsFix>,
    window_size: usize,
    min_dt_secs: f64,
    max_dt_secs: f64,
    max_speed_mps: f64,
    speed_mps: f64,
}

impl SpeedEstimator {
    pub fn new(window_size: usize, min_dt_secs: f64, max_dt_secs: f64, max_speed_mps: f64) -> Self {
        let window_size = window_size.max(2);
        Self {
            history: VecDeque::with_capacity(window_size),
            window_size,
            min_dt_secs,
            max_dt_secs,
            max_speed_mps,
            speed_mps: 0.0,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.gps_window_size,
            config.gps_min_dt_secs,
            config.gps_max_dt_secs,
            config.max_speed_mps,
        )
    }

    /// Feed one fix and return the current speed in m/s
    pub fn update(&mut self, latitude: f64, longitude: f64, timestamp: i64) -> f64 {
        if !latitude.is_finite() || !longitude.is_finite() {
            log::trace!("Ignoring GPS fix with invalid coordinates");
            return self.speed_mps;
        }

        if self.history.len() >= self.window_size {
            self.history.pop_front();
        }
        self.history.push_back(GpsFix { latitude, longitude, timestamp });

        let len = self.history.len();
        if len < 2 {
            self.speed_mps = 0.0;
            return self.speed_mps;
        }

        let last = self.history[len - 1];
        let prev = self.history[len - 2];
        let dt_secs = last.timestamp.saturating_sub(prev.timestamp) as f64 / 1000.0;

        if !(dt_secs > self.min_dt_secs && dt_secs < self.max_dt_secs) {
            log::trace!("GPS fix interval {:.3}s out of range, keeping speed", dt_secs);
            return self.speed_mps;
        }

        let distance = haversine_distance(prev.latitude, prev.longitude, last.latitude, last.longitude);
        self.speed_mps = (distance / dt_secs).min(self.max_speed_mps);

        log::debug!(
            "GPS: lat={:.6}, lon={:.6}, speed={:.2} m/s ({:.2} km/h)",
            latitude,
            longitude,
            self.speed_mps,
            self.speed_mps * crate::reading::MPS_TO_KMPH
        );

        self.speed_mps
    }

    /// Most recently computed speed in m/s
    pub fn speed_mps(&self) -> f64 {
        self.speed_mps
    }

    pub fn history(&self) -> impl Iterator<Item = &GpsFix> {
        self.history.iter()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.speed_mps = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn estimator() -> SpeedEstimator {
        SpeedEstimator::from_config(&Config::default())
    }

    #[test]
    fn test_haversine_one_millidegree_at_equator() {
        let d = haversine_distance(0.0, 0.0, 0.0, 0.001);
        assert_relative_eq!(d, 111.195, epsilon = 0.01);
    }

    #[test]
    fn test_single_fix_gives_zero() {
        let mut est = estimator();
        assert_eq!(est.update(52.0, 13.0, 1_000), 0.0);
    }

    #[test]
    fn test_fast_movement_is_capped() {
        let mut est = estimator();
        est.update(0.0, 0.0, 0);
        let speed = est.update(0.0, 0.001, 1_000);
        assert_eq!(speed, 55.5);
    }

    #[test]
    fn test_normal_speed() {
        let mut est = estimator();
        est.update(0.0, 0.0, 0);
        let speed = est.update(0.0, 0.0001, 1_000);
        assert_relative_eq!(speed, 11.1195, epsilon = 0.001);
    }

    #[test]
    fn test_short_interval_keeps_previous_speed() {
        let mut est = estimator();
        est.update(0.0, 0.0, 0);
        let before = est.update(0.0, 0.0001, 1_000);
        let after = est.update(0.0, 0.0005, 1_050);
        assert_eq!(after, before);
        assert_eq!(est.history().count(), 3);
    }

    #[test]
    fn test_long_interval_keeps_previous_speed() {
        let mut est = estimator();
        est.update(0.0, 0.0, 0);
        let before = est.update(0.0, 0.0001, 1_000);
        assert_eq!(est.update(0.0, 0.0002, 11_000), before);
        // exactly on the bound is outside the open interval
        assert_eq!(est.update(0.0, 0.0003, 21_000), before);
    }

    #[test]
    fn test_extreme_timestamps_keep_previous_speed() {
        let mut est = estimator();
        est.update(0.0, 0.0, 0);
        let before = est.update(0.0, 0.0001, 1_000);

        assert_eq!(est.update(0.0, 0.0002, i64::MIN), before);
        assert_eq!(est.update(0.0, 0.0003, i64::MAX), before);
        assert_eq!(est.update(0.0, 0.0004, i64::MIN), before);
    }

    #[test]
    fn test_invalid_coordinates_ignored() {
        let mut est = estimator();
        est.update(0.0, 0.0, 0);
        let before = est.update(0.0, 0.0001, 1_000);
        assert_eq!(est.update(f64::NAN, 0.0, 2_000), before);
        assert_eq!(est.update(0.0, f64::INFINITY, 2_000), before);
        assert_eq!(est.history().count(), 2);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut est = estimator();
        for i in 0..8 {
            est.update(0.0, i as f64 * 0.00001, i * 1_000);
        }
        let fixes: Vec<_> = est.history().collect();
        assert_eq!(fixes.len(), 5);
        assert_eq!(fixes[0].timestamp, 3_000);
        assert_eq!(fixes[4].timestamp, 7_000);
    }

    #[test]
    fn test_stationary_gives_zero() {
        let mut est = estimator();
        est.update(48.0, 11.0, 0);
        est.update(48.0, 11.0001, 1_000);
        assert_eq!(est.update(48.0, 11.0001, 2_000), 0.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut est = estimator();
        est.update(0.0, 0.0, 0);
        est.update(0.0, 0.0001, 1_000);
        est.reset();
        assert_eq!(est.speed_mps(), 0.0);
        assert_eq!(est.history().count(), 0);
        assert_eq!(est.update(0.0, 0.0002, 2_000), 0.0);
    }
}
