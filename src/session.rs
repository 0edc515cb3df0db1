//! # Recording Session Module
//!
//! Owns the lifecycle of one recording: sensor subscriptions, the sampling
//! timer and the hand-off of representative rows to storage.
//!
//! ## Architecture
//! - **Recorder**: Idle → Recording → Idle state machine, owned by the caller
//! - **Pipeline thread**: sole owner of the `Aggregator`; receives sensor
//!   events and commands, runs the sampling tick
//! - **Writer thread**: persists representative rows so a slow or failing
//!   insert never delays the next tick
//!
//! ```text
//! SensorSource ──events──▶ pipeline thread ──rows──▶ writer thread ──▶ FeatureStore
//!                               ▲  tick
//!                               └── crossbeam ticker
//! ```
//!
//! ## Stop Guarantees
//! `stop()` unsubscribes every source, then joins the pipeline thread, then
//! lets the writer drain and joins it. Nothing touches session state after
//! `stop()` returns.

use crate::aggregator::Aggregator;
use crate::config::Config;
use crate::error::SessionError;
use crate::reading::{Reading, TransportMode};
use crate::sensor::{SensorEvent, SensorSink, SensorSource};
use crate::storage::FeatureStore;
use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Capacity of the sensor event queue
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Rows read back and logged after a session stops
const REVIEW_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
}

/// Counters shared with the worker threads
#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    rows_persisted: AtomicU64,
    persist_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub ticks: u64,
    pub rows_persisted: u64,
    pub persist_failures: u64,
}

/// Command sent from the recorder to the pipeline thread
#[derive(Debug)]
enum PipelineCommand {
    SetTransportMode(TransportMode),
    Stop,
}

/// Command sent from the pipeline thread to the writer thread
#[derive(Debug)]
enum WriterCommand {
    Persist(Reading),
    Stop,
}

struct Workers {
    // Held for the session so the event channel stays connected even
    // when no source is running
    _sink: SensorSink,
    command_tx: Sender<PipelineCommand>,
    writer_tx: Sender<WriterCommand>,
    pipeline: thread::JoinHandle<()>,
    writer: thread::JoinHandle<()>,
}

pub struct Recorder {
    config: Config,
    store: Arc<dyn FeatureStore>,
    sources: Vec<Box<dyn SensorSource>>,
    transport_mode: TransportMode,
    counters: Arc<Counters>,
    workers: Option<Workers>,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Recorder {
    pub fn new(
        config: Config,
        store: Arc<dyn FeatureStore>,
        sources: Vec<Box<dyn SensorSource>>,
    ) -> Self {
        Self {
            config,
            store,
            sources,
            transport_mode: TransportMode::default(),
            counters: Arc::new(Counters::default()),
            workers: None,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.workers.is_some() {
            SessionState::Recording
        } else {
            SessionState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Recording
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.transport_mode
    }

    /// Select the label for readings assembled from the next tick on
    pub fn set_transport_mode(&mut self, mode: TransportMode) {
        self.transport_mode = mode;
        if let Some(workers) = &self.workers {
            if workers
                .command_tx
                .send(PipelineCommand::SetTransportMode(mode))
                .is_err()
            {
                log::error!("Pipeline thread gone, transport mode {} not applied", mode);
            }
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            ticks: self.counters.ticks.load(Ordering::Relaxed),
            rows_persisted: self.counters.rows_persisted.load(Ordering::Relaxed),
            persist_failures: self.counters.persist_failures.load(Ordering::Relaxed),
        }
    }

    /// Start a session. Does nothing if one is already running.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.is_recording() {
            log::debug!("Start requested while recording, ignoring");
            return Ok(());
        }

        if self.config.clear_on_start {
            match self.store.clear() {
                Ok(()) => log::info!("Old dataset cleared"),
                Err(e) => log::warn!("Failed to clear old dataset: {}", e),
            }
        }

        self.counters = Arc::new(Counters::default());

        let (event_tx, event_rx) = bounded(EVENT_QUEUE_CAPACITY);
        let (command_tx, command_rx) = unbounded();
        let (writer_tx, writer_rx) = unbounded();

        let store = self.store.clone();
        let counters = self.counters.clone();
        let writer = thread::Builder::new()
            .name("feature-writer".to_string())
            .spawn(move || writer_loop(writer_rx, store, counters))
            .map_err(SessionError::WorkerSpawn)?;

        // Fresh aggregator: empty cache, GPS window, buffer and flush time
        let aggregator = Aggregator::new(&self.config, self.transport_mode);
        let tick_period = Duration::from_millis(self.config.sampling_tick_ms);
        let pipeline_writer_tx = writer_tx.clone();
        let counters = self.counters.clone();
        let pipeline = match thread::Builder::new()
            .name("sensor-pipeline".to_string())
            .spawn(move || {
                pipeline_loop(aggregator, tick_period, event_rx, command_rx, pipeline_writer_tx, counters)
            }) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = writer_tx.send(WriterCommand::Stop);
                let _ = writer.join();
                return Err(SessionError::WorkerSpawn(e));
            }
        };

        let sink = SensorSink::new(event_tx);
        for source in self.sources.iter_mut() {
            if let Err(e) = source.start(sink.clone()) {
                log::warn!("Recording without {}: {}", source.kind(), e);
            }
        }

        self.workers = Some(Workers {
            _sink: sink,
            command_tx,
            writer_tx,
            pipeline,
            writer,
        });

        log::info!(
            "Recording started (tick {} ms, save interval {} ms, mode {})",
            self.config.sampling_tick_ms,
            self.config.save_interval_ms,
            self.transport_mode
        );
        Ok(())
    }

    /// Stop the session. Safe to call when idle.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        let Some(workers) = self.workers.take() else {
            return Ok(());
        };

        log::info!("Stopping recording");

        for source in self.sources.iter_mut() {
            source.stop();
        }

        let _ = workers.command_tx.send(PipelineCommand::Stop);
        if workers.pipeline.join().is_err() {
            log::error!("Pipeline thread panicked");
        }

        let _ = workers.writer_tx.send(WriterCommand::Stop);
        if workers.writer.join().is_err() {
            log::error!("Writer thread panicked");
        }

        let stats = self.stats();
        log::info!(
            "Recording stopped: {} tick(s), {} row(s) persisted, {} failure(s)",
            stats.ticks,
            stats.rows_persisted,
            stats.persist_failures
        );

        match self.store.select_recent(REVIEW_LIMIT) {
            Ok(rows) => {
                for row in rows {
                    log::debug!("Stored row: {:?}", row);
                }
            }
            Err(e) => log::warn!("Could not read back recent rows: {}", e),
        }

        Ok(())
    }

    /// Newest persisted rows
    pub fn recent(&self, limit: usize) -> Result<Vec<Reading>, SessionError> {
        Ok(self.store.select_recent(limit)?)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn pipeline_loop(
    mut aggregator: Aggregator,
    tick_period: Duration,
    event_rx: Receiver<SensorEvent>,
    command_rx: Receiver<PipelineCommand>,
    writer_tx: Sender<WriterCommand>,
    counters: Arc<Counters>,
) {
    let ticker = tick(tick_period);

    loop {
        select! {
            recv(event_rx) -> msg => match msg {
                Ok(event) => aggregator.handle_event(&event, now_ms()),
                Err(_) => {
                    log::error!("Sensor event channel closed");
                    break;
                }
            },
            recv(ticker) -> _ => {
                if !run_tick(&mut aggregator, &command_rx, &writer_tx, &counters, now_ms()) {
                    break;
                }
            },
            recv(command_rx) -> msg => match msg {
                Ok(command) => {
                    if !apply_command(&mut aggregator, command) {
                        break;
                    }
                }
                Err(_) => break,
            },
        }
    }

    log::debug!("Pipeline thread stopped");
}

/// Returns `false` when the pipeline should stop
fn apply_command(aggregator: &mut Aggregator, command: PipelineCommand) -> bool {
    match command {
        PipelineCommand::SetTransportMode(mode) => {
            log::info!("Transport mode set to {}", mode);
            aggregator.set_transport_mode(mode);
            true
        }
        PipelineCommand::Stop => false,
    }
}

/// One sampling tick. Commands already queued are applied first so a mode
/// selected before the tick labels its reading. Returns `false` on stop.
fn run_tick(
    aggregator: &mut Aggregator,
    command_rx: &Receiver<PipelineCommand>,
    writer_tx: &Sender<WriterCommand>,
    counters: &Counters,
    now_ms: i64,
) -> bool {
    while let Ok(command) = command_rx.try_recv() {
        if !apply_command(aggregator, command) {
            return false;
        }
    }

    counters.ticks.fetch_add(1, Ordering::Relaxed);
    if let Some(row) = aggregator.tick(now_ms) {
        if writer_tx.send(WriterCommand::Persist(row)).is_err() {
            log::error!("Writer thread gone, dropping feature row");
        }
    }
    true
}

fn writer_loop(
    writer_rx: Receiver<WriterCommand>,
    store: Arc<dyn FeatureStore>,
    counters: Arc<Counters>,
) {
    loop {
        match writer_rx.recv() {
            Ok(WriterCommand::Persist(row)) => match store.insert_batch(std::slice::from_ref(&row)) {
                Ok(()) => {
                    counters.rows_persisted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.persist_failures.fetch_add(1, Ordering::Relaxed);
                    log::error!("Failed to persist feature row: {}", e);
                }
            },
            Ok(WriterCommand::Stop) => {
                log::debug!("Writer thread stopped");
                break;
            }
            Err(_) => {
                log::debug!("Writer thread: command channel closed");
                break;
            }
        }
    }
}
