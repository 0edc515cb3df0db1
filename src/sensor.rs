//! # Sensor Ingestion Module
//!
//! Strongly-typed sensor events and the handles producers use to deliver them
//! to the pipeline thread.
//!
//! ## Key Types
//! - `SensorEvent`: one accelerometer, gyroscope or location callback
//! - `SensorSink`: cloneable producer handle; validates before sending
//! - `SensorSource`: a subscription that can be started and stopped
//! - `SimulatedSource`: synthetic stream used when no device bindings exist
//!
//! Device driver bindings live outside this crate; they implement
//! `SensorSource` and push into the sink they are given.

use crate::error::SensorError;
use crossbeam_channel::{Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
    Location,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Location => "location",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelEvent {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GyroEvent {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationEvent {
    pub latitude: f64,
    pub longitude: f64,
    /// Fix time in epoch milliseconds; arrival time is used when absent
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    Accelerometer(AccelEvent),
    Gyroscope(GyroEvent),
    Location(LocationEvent),
}

impl SensorEvent {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorEvent::Accelerometer(_) => SensorKind::Accelerometer,
            SensorEvent::Gyroscope(_) => SensorKind::Gyroscope,
            SensorEvent::Location(_) => SensorKind::Location,
        }
    }

    /// Motion axes must be finite. Locations are passed through so the speed
    /// estimator can apply its own rejection rule.
    pub fn is_valid(&self) -> bool {
        match self {
            SensorEvent::Accelerometer(a) => a.x.is_finite() && a.y.is_finite() && a.z.is_finite(),
            SensorEvent::Gyroscope(g) => g.x.is_finite() && g.y.is_finite() && g.z.is_finite(),
            SensorEvent::Location(_) => true,
        }
    }
}

/// Producer-side handle onto the pipeline's event queue
#[derive(Debug, Clone)]
pub struct SensorSink {
    sender: Sender<SensorEvent>,
}

impl SensorSink {
    pub fn new(sender: Sender<SensorEvent>) -> Self {
        Self { sender }
    }

    /// Deliver an event. Returns `false` once the pipeline has gone away.
    pub fn send(&self, event: SensorEvent) -> bool {
        if !event.is_valid() {
            log::trace!("Dropping invalid {} event", event.kind());
            return true;
        }

        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Only the latest value matters, losing one sample is harmless
                log::trace!("Event queue full, dropping {} event", event.kind());
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn accelerometer(&self, x: f64, y: f64, z: f64) -> bool {
        self.send(SensorEvent::Accelerometer(AccelEvent { x, y, z }))
    }

    pub fn gyroscope(&self, x: f64, y: f64, z: f64) -> bool {
        self.send(SensorEvent::Gyroscope(GyroEvent { x, y, z }))
    }

    pub fn location(&self, latitude: f64, longitude: f64, timestamp: Option<i64>) -> bool {
        self.send(SensorEvent::Location(LocationEvent {
            latitude,
            longitude,
            timestamp,
        }))
    }
}

/// A sensor subscription the recorder starts and stops with the session
pub trait SensorSource: Send {
    fn kind(&self) -> SensorKind;

    /// Begin delivering events into `sink`
    fn start(&mut self, sink: SensorSink) -> Result<(), SensorError>;

    /// Stop delivering events. Must be safe to call when never started.
    fn stop(&mut self);
}

/// Synthetic sensor stream on a background thread
pub struct SimulatedSource {
    kind: SensorKind,
    interval: Duration,
    should_stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SimulatedSource {
    pub fn new(kind: SensorKind, interval: Duration) -> Self {
        Self {
            kind,
            interval,
            should_stop: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Accelerometer, gyroscope and location at typical phone update rates
    pub fn phone() -> Vec<Box<dyn SensorSource>> {
        vec![
            Box::new(Self::new(SensorKind::Accelerometer, Duration::from_millis(100))),
            Box::new(Self::new(SensorKind::Gyroscope, Duration::from_millis(100))),
            Box::new(Self::new(SensorKind::Location, Duration::from_millis(1000))),
        ]
    }

    fn sample(kind: SensorKind, step: u64) -> SensorEvent {
        use std::f64::consts::PI;
        let t = step as f64 * 0.1;

        match kind {
            SensorKind::Accelerometer => SensorEvent::Accelerometer(AccelEvent {
                x: (t * 2.0 * PI).sin() * 0.5,
                y: (t * 2.0 * PI).cos() * 0.3,
                z: (t * PI).sin() * 0.1,
            }),
            SensorKind::Gyroscope => SensorEvent::Gyroscope(GyroEvent {
                x: (t * 0.5).sin() * 0.05,
                y: (t * 0.3).cos() * 0.03,
                z: t.sin() * 0.1,
            }),
            // Roughly 10 m/s heading north-east
            SensorKind::Location => SensorEvent::Location(LocationEvent {
                latitude: 37.7749 + step as f64 * 0.00006,
                longitude: -122.4194 + step as f64 * 0.00006,
                timestamp: None,
            }),
        }
    }
}

impl SensorSource for SimulatedSource {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn start(&mut self, sink: SensorSink) -> Result<(), SensorError> {
        if self.handle.is_some() {
            return Ok(());
        }

        // Each subscription gets its own stop flag
        let should_stop = Arc::new(AtomicBool::new(false));
        self.should_stop = should_stop.clone();

        let kind = self.kind;
        let interval = self.interval;
        let handle = thread::Builder::new()
            .name(format!("sim-{}", kind))
            .spawn(move || {
                let mut step = 0u64;
                while !should_stop.load(Ordering::Relaxed) {
                    if !sink.send(Self::sample(kind, step)) {
                        log::debug!("Pipeline closed, stopping simulated {}", kind);
                        break;
                    }
                    step += 1;
                    thread::sleep(interval);
                }
            })
            .map_err(|e| SensorError::SubscribeFailed {
                sensor: kind.to_string(),
                reason: e.to_string(),
            })?;

        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.should_stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};

    #[test]
    fn test_sink_drops_non_finite_motion() {
        let (tx, rx) = unbounded();
        let sink = SensorSink::new(tx);

        assert!(sink.accelerometer(f64::NAN, 0.0, 0.0));
        assert!(sink.gyroscope(0.0, f64::INFINITY, 0.0));
        assert!(rx.try_recv().is_err());

        assert!(sink.accelerometer(1.0, 0.0, 0.0));
        assert_eq!(
            rx.try_recv().unwrap(),
            SensorEvent::Accelerometer(AccelEvent { x: 1.0, y: 0.0, z: 0.0 })
        );
    }

    #[test]
    fn test_sink_passes_bad_locations_through() {
        let (tx, rx) = unbounded();
        let sink = SensorSink::new(tx);
        assert!(sink.location(f64::NAN, 1.0, Some(5)));
        assert_eq!(rx.try_recv().unwrap().kind(), SensorKind::Location);
    }

    #[test]
    fn test_sink_reports_disconnect() {
        let (tx, rx) = bounded(1);
        let sink = SensorSink::new(tx);
        assert!(sink.gyroscope(0.0, 0.0, 0.0));
        // full queue drops silently
        assert!(sink.gyroscope(0.0, 0.0, 1.0));
        drop(rx);
        assert!(!sink.gyroscope(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_simulated_source_start_stop() {
        let (tx, rx) = unbounded();
        let mut source = SimulatedSource::new(SensorKind::Accelerometer, Duration::from_millis(1));
        source.stop(); // safe before start
        source.start(SensorSink::new(tx)).unwrap();
        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.kind(), SensorKind::Accelerometer);
        source.stop();

        while rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(10));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_phone_sources_cover_all_kinds() {
        let kinds: Vec<_> = SimulatedSource::phone().iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![SensorKind::Accelerometer, SensorKind::Gyroscope, SensorKind::Location]
        );
    }
}
