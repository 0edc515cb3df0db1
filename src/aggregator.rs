//! # Aggregation Module
//!
//! Bridges high-rate sensor callbacks and the low-rate persisted rows.
//!
//! ## Flow Per Tick
//! 1. Assemble one `Reading` from the latest-values cache, the current speed
//!    and the selected transport mode, and push it into the ring buffer
//! 2. If the save interval has elapsed since the last flush, drain the buffer,
//!    run the batch through the filter chain and return only its last record
//!
//! The aggregator is plain single-owner state. The recorder keeps it on one
//! thread, so no field needs its own lock.

use crate::config::Config;
use crate::filters::FilterChain;
use crate::reading::{Coordinate, Reading, TransportMode, Vector3};
use crate::ring_buffer::RingBuffer;
use crate::sensor::SensorEvent;
use crate::speed::SpeedEstimator;

/// Last-write-wins cache of every channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestValues {
    pub accel: Vector3,
    pub gyro: Vector3,
    pub location: Option<Coordinate>,
    pub speed_mps: f64,
}

pub struct Aggregator {
    latest: LatestValues,
    speed: SpeedEstimator,
    buffer: RingBuffer<Reading>,
    chain: FilterChain,
    save_interval_ms: i64,
    last_flush_ms: i64,
    transport_mode: TransportMode,
}

impl Aggregator {
    pub fn new(config: &Config, transport_mode: TransportMode) -> Self {
        Self {
            latest: LatestValues::default(),
            speed: SpeedEstimator::from_config(config),
            buffer: RingBuffer::new(config.ring_buffer_capacity),
            chain: FilterChain::from_config(config),
            save_interval_ms: config.save_interval_ms as i64,
            last_flush_ms: 0,
            transport_mode,
        }
    }

    /// Forget everything collected so far, as at the start of a session
    pub fn reset(&mut self) {
        self.latest = LatestValues::default();
        self.speed.reset();
        self.buffer.clear();
        self.last_flush_ms = 0;
    }

    /// Update the cache from one sensor callback received at `now_ms`
    pub fn handle_event(&mut self, event: &SensorEvent, now_ms: i64) {
        match event {
            SensorEvent::Accelerometer(a) => {
                self.latest.accel = Vector3::new(a.x, a.y, a.z);
            }
            SensorEvent::Gyroscope(g) => {
                self.latest.gyro = Vector3::new(g.x, g.y, g.z);
            }
            SensorEvent::Location(fix) => {
                let Some(location) = Coordinate::new(fix.latitude, fix.longitude) else {
                    log::trace!("Ignoring location without finite coordinates");
                    return;
                };
                let timestamp = fix.timestamp.unwrap_or(now_ms);
                self.latest.location = Some(location);
                self.latest.speed_mps =
                    self.speed.update(location.latitude, location.longitude, timestamp);
            }
        }
    }

    pub fn set_transport_mode(&mut self, mode: TransportMode) {
        self.transport_mode = mode;
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.transport_mode
    }

    pub fn latest(&self) -> &LatestValues {
        &self.latest
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Snapshot of the cache as an unfiltered reading
    pub fn assemble(&self, now_ms: i64) -> Reading {
        Reading::new(now_ms, self.transport_mode)
            .with_accel(self.latest.accel)
            .with_gyro(self.latest.gyro)
            .with_location(self.latest.location)
            .with_speed(self.latest.speed_mps)
    }

    /// Run one sampling tick. Returns the representative record when this
    /// tick also flushed the buffer.
    pub fn tick(&mut self, now_ms: i64) -> Option<Reading> {
        let reading = self.assemble(now_ms);
        self.buffer.add(reading);

        if now_ms - self.last_flush_ms < self.save_interval_ms {
            return None;
        }
        self.last_flush_ms = now_ms;

        let batch = self.buffer.flush();
        let mut processed = self.chain.apply(&batch);
        log::debug!("Flushed {} reading(s), keeping the most recent", processed.len());
        processed.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::{AccelEvent, GyroEvent, LocationEvent};
    use crate::storage::{FeatureStore, SqliteStore};
    use approx::assert_relative_eq;

    const T0: i64 = 1_700_000_000_000;

    fn accel(x: f64, y: f64, z: f64) -> SensorEvent {
        SensorEvent::Accelerometer(AccelEvent { x, y, z })
    }

    fn gyro(x: f64, y: f64, z: f64) -> SensorEvent {
        SensorEvent::Gyroscope(GyroEvent { x, y, z })
    }

    fn fix(latitude: f64, longitude: f64, timestamp: i64) -> SensorEvent {
        SensorEvent::Location(LocationEvent {
            latitude,
            longitude,
            timestamp: Some(timestamp),
        })
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(&Config::default(), TransportMode::Standing)
    }

    #[test]
    fn test_latest_values_last_write_wins() {
        let mut agg = aggregator();
        agg.handle_event(&accel(1.0, 2.0, 3.0), T0);
        agg.handle_event(&accel(4.0, 5.0, 6.0), T0 + 100);
        agg.handle_event(&gyro(0.1, 0.2, 0.3), T0 + 100);

        let reading = agg.assemble(T0 + 200);
        assert_eq!(reading.accel, Vector3::new(4.0, 5.0, 6.0));
        assert_eq!(reading.gyro, Vector3::new(0.1, 0.2, 0.3));
        assert_eq!(reading.timestamp, T0 + 200);
        assert!(reading.location.is_none());
        assert_eq!(reading.speed_mps(), 0.0);
    }

    #[test]
    fn test_location_drives_speed() {
        let mut agg = aggregator();
        agg.handle_event(&fix(0.0, 0.0, T0), T0);
        agg.handle_event(&fix(0.0, 0.0001, T0 + 1_000), T0 + 1_000);

        let reading = agg.assemble(T0 + 1_500);
        assert_eq!(reading.location, Coordinate::new(0.0, 0.0001));
        assert_relative_eq!(reading.speed_mps(), 11.1195, epsilon = 0.001);
        assert_relative_eq!(reading.speed_kmph(), reading.speed_mps() * 3.6);
    }

    #[test]
    fn test_invalid_location_keeps_state() {
        let mut agg = aggregator();
        agg.handle_event(&fix(10.0, 20.0, T0), T0);
        let before = agg.latest().clone();
        agg.handle_event(&fix(f64::NAN, 20.0, T0 + 1_000), T0 + 1_000);
        assert_eq!(agg.latest(), &before);
    }

    #[test]
    fn test_location_without_timestamp_uses_arrival_time() {
        let mut agg = aggregator();
        let untimed = |lat, lon| {
            SensorEvent::Location(LocationEvent { latitude: lat, longitude: lon, timestamp: None })
        };
        agg.handle_event(&untimed(0.0, 0.0), T0);
        agg.handle_event(&untimed(0.0, 0.0001), T0 + 2_000);
        assert_relative_eq!(agg.latest().speed_mps, 11.1195 / 2.0, epsilon = 0.001);
    }

    #[test]
    fn test_mode_captured_at_assembly() {
        let mut agg = aggregator();
        assert_eq!(agg.tick(T0).unwrap().transport_mode, TransportMode::Standing);
        agg.set_transport_mode(TransportMode::Bus);
        assert_eq!(agg.tick(T0 + 5_000).unwrap().transport_mode, TransportMode::Bus);
    }

    #[test]
    fn test_tick_waits_for_save_interval() {
        let config = Config {
            sampling_tick_ms: 1_000,
            save_interval_ms: 5_000,
            ..Config::default()
        };
        let mut agg = Aggregator::new(&config, TransportMode::Walking);

        assert!(agg.tick(T0).is_some());
        for i in 1..5 {
            agg.handle_event(&accel(i as f64, 0.0, 0.0), T0 + i * 1_000);
            assert!(agg.tick(T0 + i * 1_000).is_none());
        }
        assert_eq!(agg.buffered(), 4);

        let representative = agg.tick(T0 + 5_000).unwrap();
        assert_eq!(representative.timestamp, T0 + 5_000);
        assert_eq!(agg.buffered(), 0);
        // low-pass smoothed over the batch 1,2,3,4,4 -> lags behind 4
        assert!(representative.accel.x > 1.0 && representative.accel.x < 4.0);
    }

    #[test]
    fn test_buffer_capacity_bounds_unflushed_ticks() {
        let config = Config {
            sampling_tick_ms: 10,
            save_interval_ms: 1_000_000,
            ..Config::default()
        };
        let mut agg = Aggregator::new(&config, TransportMode::Car);
        agg.tick(T0);
        for i in 1..=40 {
            agg.tick(T0 + i * 10);
        }
        assert_eq!(agg.buffered(), 30);
    }

    #[test]
    fn test_reset_clears_session_state() {
        let mut agg = aggregator();
        agg.handle_event(&accel(1.0, 1.0, 1.0), T0);
        agg.handle_event(&fix(1.0, 1.0, T0), T0);
        agg.tick(T0);
        agg.tick(T0 + 1);
        agg.reset();

        assert_eq!(agg.latest(), &LatestValues::default());
        assert_eq!(agg.buffered(), 0);
        assert!(agg.tick(T0 + 2).is_some());
    }

    #[test]
    fn test_constant_stream_end_to_end() {
        let store = SqliteStore::in_memory().unwrap();
        let mut agg = aggregator();

        // five deliveries of each stream inside one sampling period
        for i in 0..5 {
            let t = T0 + i * 100;
            agg.handle_event(&accel(1.0, 0.0, 0.0), t);
            agg.handle_event(&gyro(0.0, 0.0, 0.0), t);
        }
        if let Some(row) = agg.tick(T0 + 5_000) {
            store.insert_batch(&[row]).unwrap();
        }

        let rows = store.select_recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.speed_mps(), 0.0);
        assert_relative_eq!(row.magnitude, 1.0, epsilon = 1e-9);
        assert_eq!(row.gyro_magnitude, 0.0);
        assert!(row.latitude().is_none());
        assert!(row.longitude().is_none());
    }

    #[test]
    fn test_default_periods_persist_one_row_per_tick() {
        let store = SqliteStore::in_memory().unwrap();
        let mut agg = aggregator();
        agg.handle_event(&accel(1.0, 0.0, 0.0), T0);

        for i in 1..=5 {
            if let Some(row) = agg.tick(T0 + i * 5_000) {
                store.insert_batch(&[row]).unwrap();
            }
        }

        let rows = store.select_all_for_export().unwrap();
        assert_eq!(rows.len(), 5);
    }
}
