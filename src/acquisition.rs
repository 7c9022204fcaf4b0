//! Acquisition of IMU samples, live or replayed.
//!
//! The live path runs one producer thread that owns the serial device and the
//! frame decoder; the control loop owns everything else. The only structure
//! shared between the two is a bounded channel, so memory stays bounded
//! regardless of any producer/consumer speed mismatch.
//!
//! Overflow policy is drop-oldest: when the channel is full, the stalest
//! buffered sample is evicted to admit the newest. The consumer cares most
//! about the freshest data for phase detection; drops are counted and logged.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use serialport::SerialPort;

use crate::config::PipelineConfig;
use crate::decoder::{default_frame_check, BinaryFrameDecoder, Decoded};
use crate::error::AcquisitionError;
use crate::replay::{Fetch, ReplaySource};
use crate::types::ImuSample;

// ─── Bounded channel ─────────────────────────────────────────────────────────

/// Bounded FIFO hand-off between the producer and the control loop.
pub struct AcquisitionChannel {
    tx: Sender<ImuSample>,
    rx: Receiver<ImuSample>,
    dropped: Arc<AtomicU64>,
}

impl AcquisitionChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Handle for the producer side. The producer keeps a receiver clone so
    /// it can evict the oldest sample when the channel is full.
    pub fn producer(&self) -> Producer {
        Producer {
            tx: self.tx.clone(),
            overflow_rx: self.rx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Drain up to `max_items` buffered samples in FIFO order. Never blocks;
    /// an empty channel yields an empty batch.
    pub fn drain_batch(&self, max_items: usize) -> Vec<ImuSample> {
        let mut batch = Vec::new();
        while batch.len() < max_items {
            match self.rx.try_recv() {
                Ok(sample) => batch.push(sample),
                Err(_) => break,
            }
        }
        batch
    }

    /// Discard everything still buffered, returning how many were thrown
    /// away. Used during shutdown.
    pub fn discard_remaining(&self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    /// Samples evicted by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Producer-side handle: push with drop-oldest overflow.
pub struct Producer {
    tx: Sender<ImuSample>,
    overflow_rx: Receiver<ImuSample>,
    dropped: Arc<AtomicU64>,
}

impl Producer {
    pub fn push(&self, sample: ImuSample) {
        let mut pending = sample;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.overflow_rx.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    pending = rejected;
                }
                // Consumer is gone; nothing left to deliver to.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

// ─── Live acquisition ────────────────────────────────────────────────────────

/// Continuous acquisition from the serial sensor module.
pub struct LiveAcquisition {
    channel: AcquisitionChannel,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    /// Held between open() and start().
    port: Option<Box<dyn SerialPort>>,
    stop_timeout: Duration,
}

impl LiveAcquisition {
    /// Open the configured serial device. Failure here is fatal to startup:
    /// a flight computer that cannot reach its sensor must not launch.
    pub fn open(config: &PipelineConfig) -> Result<Self, AcquisitionError> {
        let port = serialport::new(config.serial_port.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|source| AcquisitionError::DeviceOpen {
                port: config.serial_port.clone(),
                source,
            })?;
        log::info!(
            "[imu] opened {} at {} baud",
            config.serial_port,
            config.baud_rate
        );
        Ok(Self {
            channel: AcquisitionChannel::new(config.channel_capacity),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            port: Some(port),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        })
    }

    /// Spawn the producer thread. Calling start twice is a no-op.
    pub fn start(&mut self) {
        let port = match self.port.take() {
            Some(port) => port,
            None => return,
        };
        self.running.store(true, Ordering::Relaxed);
        let producer = self.channel.producer();
        let running = Arc::clone(&self.running);
        let stop = Arc::clone(&self.stop);
        self.handle = Some(thread::spawn(move || {
            producer_loop(port, producer, running, stop);
        }));
    }

    /// True while the producer thread is alive. Flips false on device
    /// failure or after stop(); the consumer polls this to decide when the
    /// flight loop ends.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn drain_batch(&self, max_items: usize) -> Vec<ImuSample> {
        self.channel.drain_batch(max_items)
    }

    /// Signal the producer to terminate, wait a bounded time for it to exit,
    /// then discard whatever is still buffered. Samples are never delivered
    /// after stop, and never delivered twice.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let deadline = Instant::now() + self.stop_timeout;
        while self.running.load(Ordering::Relaxed) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if let Some(handle) = self.handle.take() {
            if self.running.load(Ordering::Relaxed) {
                log::warn!(
                    "[imu] producer did not stop within {:?}; detaching",
                    self.stop_timeout
                );
            } else {
                let _ = handle.join();
            }
        }
        let discarded = self.channel.discard_remaining();
        if discarded > 0 {
            log::debug!("[imu] discarded {discarded} undelivered samples at shutdown");
        }
    }

    pub fn dropped(&self) -> u64 {
        self.channel.dropped()
    }
}

/// Producer thread body: blocking reads with a short timeout so the stop
/// flag is observed promptly, each read wrapped in decode attempts.
fn producer_loop(
    mut port: Box<dyn SerialPort>,
    producer: Producer,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    let mut decoder = BinaryFrameDecoder::new(default_frame_check);
    let mut read_buf = [0u8; 256];
    let mut sample_count = 0u64;
    let mut dropped_frames = 0u64;

    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut read_buf) {
            Ok(0) => continue,
            Ok(n) => {
                decoder.extend(&read_buf[..n]);
                loop {
                    match decoder.poll() {
                        Ok(Decoded::Sample(sample)) => {
                            producer.push(sample);
                            sample_count += 1;
                            if sample_count % 500 == 0 {
                                log::debug!("[imu] {sample_count} samples decoded");
                            }
                        }
                        Ok(Decoded::NeedMore) => break,
                        Err(err) => {
                            dropped_frames += 1;
                            log::warn!("[imu] dropped frame: {err}");
                        }
                    }
                }
            }
            Err(ref err)
                if err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::Interrupted =>
            {
                continue;
            }
            Err(err) => {
                // Device disconnect or similar: terminate the producer; the
                // consumer observes this through the liveness flag rather
                // than an error in its control flow.
                log::warn!("[imu] serial read failed, terminating producer: {err}");
                break;
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    log::info!("[imu] producer exiting after {sample_count} samples ({dropped_frames} frames dropped)");
}

// ─── Mock replay acquisition ─────────────────────────────────────────────────

/// Replay adapter implementing the acquisition contract, so recorded flights
/// feed the identical control loop.
pub struct MockReplay {
    source: ReplaySource,
    running: bool,
}

impl MockReplay {
    pub fn new(source: ReplaySource) -> Self {
        Self {
            source,
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn drain_batch(&mut self, max_items: usize) -> Vec<ImuSample> {
        let mut batch = Vec::new();
        if !self.running {
            return batch;
        }
        while batch.len() < max_items {
            match self.source.fetch_next() {
                Fetch::Sample(sample) => batch.push(sample),
                Fetch::NotYet => break,
                Fetch::Exhausted => {
                    log::info!("[replay] recording exhausted");
                    self.running = false;
                    break;
                }
            }
        }
        batch
    }
}

// ─── Variant selection ───────────────────────────────────────────────────────

/// The closed set of acquisition sources. The variant is chosen once at
/// construction; call sites only ever use the shared contract.
pub enum Acquisition {
    Live(LiveAcquisition),
    Replay(MockReplay),
}

impl Acquisition {
    pub fn live(config: &PipelineConfig) -> Result<Self, AcquisitionError> {
        Ok(Self::Live(LiveAcquisition::open(config)?))
    }

    pub fn replay(source: ReplaySource) -> Self {
        Self::Replay(MockReplay::new(source))
    }

    pub fn start(&mut self) {
        match self {
            Self::Live(live) => live.start(),
            Self::Replay(replay) => replay.start(),
        }
    }

    pub fn stop(&mut self) {
        match self {
            Self::Live(live) => live.stop(),
            Self::Replay(replay) => replay.stop(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Self::Live(live) => live.is_running(),
            Self::Replay(replay) => replay.is_running(),
        }
    }

    pub fn drain_batch(&mut self, max_items: usize) -> Vec<ImuSample> {
        match self {
            Self::Live(live) => live.drain_batch(max_items),
            Self::Replay(replay) => replay.drain_batch(max_items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp_ms: f64) -> ImuSample {
        ImuSample {
            timestamp_ms,
            ..ImuSample::default()
        }
    }

    #[test]
    fn test_drain_preserves_fifo_order() {
        let channel = AcquisitionChannel::new(8);
        let producer = channel.producer();
        for i in 0..5 {
            producer.push(sample(1000.0 + i as f64 * 20.0));
        }
        let batch = channel.drain_batch(10);
        let timestamps: Vec<f64> = batch.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(timestamps, vec![1000.0, 1020.0, 1040.0, 1060.0, 1080.0]);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let capacity = 4;
        let channel = AcquisitionChannel::new(capacity);
        let producer = channel.producer();
        for i in 1..=5 {
            producer.push(sample(i as f64 * 1000.0));
        }
        assert_eq!(channel.dropped(), 1);
        let batch = channel.drain_batch(10);
        let timestamps: Vec<f64> = batch.iter().map(|s| s.timestamp_ms).collect();
        // The newest `capacity` samples survive, in order.
        assert_eq!(timestamps, vec![2000.0, 3000.0, 4000.0, 5000.0]);
    }

    #[test]
    fn test_empty_channel_yields_empty_batch() {
        let channel = AcquisitionChannel::new(4);
        assert!(channel.drain_batch(10).is_empty());
        assert!(channel.is_empty());
    }

    #[test]
    fn test_drain_batch_respects_cap() {
        let channel = AcquisitionChannel::new(16);
        let producer = channel.producer();
        for i in 0..10 {
            producer.push(sample(i as f64));
        }
        assert_eq!(channel.drain_batch(3).len(), 3);
        assert_eq!(channel.len(), 7);
    }

    #[test]
    fn test_discard_remaining_empties_channel() {
        let channel = AcquisitionChannel::new(16);
        let producer = channel.producer();
        for i in 0..6 {
            producer.push(sample(i as f64));
        }
        assert_eq!(channel.discard_remaining(), 6);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_replay_acquisition_terminates_on_exhaustion() {
        let source = ReplaySource::from_samples(
            vec![sample(0.0), sample(20.0), sample(40.0)],
            50.0,
            true,
        );
        let mut acquisition = Acquisition::replay(source);
        assert!(!acquisition.is_running());
        acquisition.start();
        assert!(acquisition.is_running());

        let mut total = 0;
        while acquisition.is_running() {
            total += acquisition.drain_batch(2).len();
        }
        assert_eq!(total, 3);
        // Once exhausted, further drains stay empty.
        assert!(acquisition.drain_batch(2).is_empty());
    }

    #[test]
    fn test_replayed_flight_reaches_landed() {
        use crate::flight_state::{FlightStateMachine, PhaseInput};
        use crate::processor::DataProcessor;
        use crate::PipelineConfig;

        fn flight_sample(timestamp_ms: f64, net_accel: f64, pressure_alt: f64) -> ImuSample {
            ImuSample {
                timestamp_ms,
                pressure_alt: Some(pressure_alt),
                accel_x: Some(0.0),
                accel_y: Some(0.0),
                accel_z: Some(-(net_accel + 9.80665)),
                angular_rate_x: Some(0.0),
                angular_rate_y: Some(0.0),
                angular_rate_z: Some(0.0),
                ..ImuSample::default()
            }
        }

        // Synthetic profile: pad, motor burn, free-fall coast/descent (the
        // accelerometer reads near zero, so the net value is about -g),
        // then at rest on the ground.
        let mut samples = Vec::new();
        let mut t = 1000.0;
        for _ in 0..20 {
            samples.push(flight_sample(t, 0.0, 350.0));
            t += 20.0;
        }
        for i in 0..20 {
            samples.push(flight_sample(t, 60.0, 350.0 + i as f64 * 5.0));
            t += 20.0;
        }
        for i in 0..20 {
            samples.push(flight_sample(t, -9.80665, 450.0 - i as f64 * 5.0));
            t += 20.0;
        }
        for _ in 0..20 {
            samples.push(flight_sample(t, 0.0, 350.5));
            t += 20.0;
        }

        let config = PipelineConfig::default();
        let mut acquisition =
            Acquisition::replay(ReplaySource::from_samples(samples, 50.0, true));
        let mut processor = DataProcessor::new(&config);
        let mut state_machine = FlightStateMachine::new(&config);

        acquisition.start();
        while acquisition.is_running() && !state_machine.is_terminal() {
            let batch = acquisition.drain_batch(config.drain_batch_size);
            if batch.is_empty() {
                continue;
            }
            processor.update(&batch).unwrap();
            for (s, p) in batch.iter().zip(processor.processed()) {
                state_machine.update(PhaseInput {
                    accel_magnitude: p.vertical_acceleration.map(f64::abs),
                    altitude: p.current_altitude,
                    timestamp_ms: s.timestamp_ms,
                });
            }
        }

        assert!(state_machine.is_terminal());
        let armed = state_machine
            .transition_time_ms(crate::FlightPhase::Armed)
            .unwrap();
        let landed = state_machine
            .transition_time_ms(crate::FlightPhase::Landed)
            .unwrap();
        assert!(armed < landed);
        assert!(processor.max_altitude() > 90.0);
        assert!(processor.max_vertical_velocity() > 10.0);
    }

    #[test]
    fn test_producer_thread_hand_off() {
        let channel = AcquisitionChannel::new(64);
        let producer = channel.producer();
        let handle = std::thread::spawn(move || {
            for i in 0..32 {
                producer.push(sample(i as f64 * 20.0));
            }
        });
        handle.join().unwrap();
        let mut received = Vec::new();
        loop {
            let batch = channel.drain_batch(8);
            if batch.is_empty() {
                break;
            }
            received.extend(batch);
        }
        assert_eq!(received.len(), 32);
        assert!(received.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }
}
