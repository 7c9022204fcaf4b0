/// Pipeline configuration, constructed once at startup and passed by
/// reference into each component's constructor. Nothing in the pipeline reads
/// ambient global state.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    // ── Acquisition ──
    /// Serial device the sensor module is attached to.
    pub serial_port: String,
    pub baud_rate: u32,
    /// Read timeout on the device, so the producer can observe a stop signal
    /// between blocking reads.
    pub read_timeout_ms: u64,
    /// Bounded capacity of the producer/consumer channel.
    pub channel_capacity: usize,
    /// Maximum samples drained per control-loop iteration.
    pub drain_batch_size: usize,
    /// Longest we wait for the producer thread to exit on stop().
    pub stop_timeout_ms: u64,
    /// Nominal sensor rate, also the replay pacing rate.
    pub sample_rate_hz: f64,

    // ── Processing ──
    /// Standard gravity subtracted from rotated vertical acceleration.
    pub gravity: f64,
    /// Acceleration magnitudes below this read as exactly zero. Suppresses
    /// sensor bias accumulating into velocity while the rocket sits on the
    /// rail.
    pub accel_deadband: f64,

    // ── Flight phases ──
    /// Acceleration magnitude that arms the payload. Tuned to reject handling
    /// vibration but catch motor ignition.
    pub launch_accel_threshold: f64,
    /// Acceleration magnitude at or below which the rocket counts as at rest.
    pub rest_accel_threshold: f64,
    /// Zeroed altitude at or below which the rocket counts as near ground.
    /// Required alongside the rest check so near-zero acceleration at apogee
    /// is not mistaken for a landing.
    pub ground_altitude_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
            channel_capacity: 250,
            drain_batch_size: 15,
            stop_timeout_ms: 3000,
            sample_rate_hz: 50.0,
            gravity: 9.80665,
            accel_deadband: 0.5,
            launch_accel_threshold: 50.0,
            rest_accel_threshold: 0.4,
            ground_altitude_threshold: 2.0,
        }
    }
}
