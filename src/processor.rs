//! The numerical core of the pipeline.
//!
//! Everything in this module is independent of the acquisition transport: it
//! takes ordered batches of samples in and produces per-sample estimates out,
//! so the identical code runs against the live serial stream and against
//! replayed recordings.

use nalgebra::UnitQuaternion;

use crate::config::PipelineConfig;
use crate::error::ProcessError;
use crate::physics::{deadband, pressure_to_altitude};
use crate::types::{ImuSample, ProcessedSample};

/// Integrates orientation, rotates and deadbands acceleration, integrates
/// vertical velocity, and tracks zeroed altitude with running maxima.
///
/// Owns the orientation state and the altitude baseline exclusively; a
/// rejected batch leaves both untouched.
pub struct DataProcessor {
    gravity: f64,
    deadband_threshold: f64,

    /// Mean pressure altitude of the first batch; set exactly once.
    baseline_altitude: Option<f64>,
    /// Attitude relative to the orientation at pipeline start.
    orientation: Option<UnitQuaternion<f64>>,
    last_sample: Option<ImuSample>,

    vertical_velocity: f64,
    max_vertical_velocity: f64,
    max_altitude: f64,
    processed: Vec<ProcessedSample>,
}

impl DataProcessor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            gravity: config.gravity,
            deadband_threshold: config.accel_deadband,
            baseline_altitude: None,
            orientation: None,
            last_sample: None,
            vertical_velocity: 0.0,
            max_vertical_velocity: 0.0,
            max_altitude: 0.0,
            processed: Vec::new(),
        }
    }

    /// Process one ordered batch of samples. An empty batch is a no-op.
    ///
    /// A negative time delta anywhere in the batch rejects the whole batch
    /// before any state is touched; processing resumes cleanly on the next
    /// call.
    pub fn update(&mut self, batch: &[ImuSample]) -> Result<(), ProcessError> {
        if batch.is_empty() {
            return Ok(());
        }

        let dts = self.validate_time_deltas(batch)?;

        if self.last_sample.is_none() {
            self.first_update(batch);
        }

        let mut orientation = self
            .orientation
            .unwrap_or_else(UnitQuaternion::identity);
        let mut velocity = self.vertical_velocity;

        self.processed.clear();
        self.processed.reserve(batch.len());

        for (sample, &dt) in batch.iter().zip(&dts) {
            // Incremental rotation from the angular rate over this interval
            // (rotation-vector convention). Missing rate data contributes an
            // identity increment.
            if let Some(rate) = sample.angular_rate_vector() {
                orientation *= UnitQuaternion::from_scaled_axis(rate * dt);
                orientation.renormalize();
            }

            // Rotate the body-frame acceleration into the world frame and
            // take the vertical component, negated so powered ascent reads
            // positive and drag deceleration negative.
            let vertical_accel = sample.accel_vector().map(|accel| {
                let world = orientation.transform_vector(&accel);
                deadband(-world.z - self.gravity, self.deadband_threshold)
            });

            if let Some(accel) = vertical_accel {
                velocity += accel * dt;
            }
            if velocity > self.max_vertical_velocity {
                self.max_vertical_velocity = velocity;
            }

            let altitude = match (sample_altitude(sample), self.baseline_altitude) {
                (Some(alt), Some(baseline)) => Some(alt - baseline),
                _ => None,
            };
            if let Some(alt) = altitude {
                if alt > self.max_altitude {
                    self.max_altitude = alt;
                }
            }

            self.processed.push(ProcessedSample {
                current_altitude: altitude,
                vertical_velocity: velocity,
                vertical_acceleration: vertical_accel,
                time_since_last_sample: dt,
            });
        }

        self.orientation = Some(orientation);
        self.vertical_velocity = velocity;
        self.last_sample = batch.last().cloned();
        Ok(())
    }

    /// Per-sample results aligned 1:1 with the most recent accepted batch.
    pub fn processed(&self) -> &[ProcessedSample] {
        &self.processed
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Zeroed altitude of the latest sample, if known.
    pub fn current_altitude(&self) -> Option<f64> {
        self.processed.last().and_then(|p| p.current_altitude)
    }

    pub fn vertical_velocity(&self) -> f64 {
        self.vertical_velocity
    }

    /// Highest zeroed altitude seen this flight.
    pub fn max_altitude(&self) -> f64 {
        self.max_altitude
    }

    /// Highest vertical velocity seen this flight.
    pub fn max_vertical_velocity(&self) -> f64 {
        self.max_vertical_velocity
    }

    /// Mean of the known vertical accelerations in the latest batch.
    pub fn average_vertical_acceleration(&self) -> Option<f64> {
        let known: Vec<f64> = self
            .processed
            .iter()
            .filter_map(|p| p.vertical_acceleration)
            .collect();
        if known.is_empty() {
            None
        } else {
            Some(known.iter().sum::<f64>() / known.len() as f64)
        }
    }

    pub fn current_timestamp_ms(&self) -> f64 {
        self.last_sample.as_ref().map_or(0.0, |s| s.timestamp_ms)
    }

    pub fn orientation(&self) -> Option<UnitQuaternion<f64>> {
        self.orientation
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Compute per-sample time deltas in seconds, prefixed by the previous
    /// batch's last sample (or this batch's first sample on the first call,
    /// making the first dt exactly zero). Fails without mutating state.
    fn validate_time_deltas(&self, batch: &[ImuSample]) -> Result<Vec<f64>, ProcessError> {
        let mut previous_ms = self
            .last_sample
            .as_ref()
            .map_or(batch[0].timestamp_ms, |s| s.timestamp_ms);
        let mut dts = Vec::with_capacity(batch.len());
        for (index, sample) in batch.iter().enumerate() {
            let dt_secs = (sample.timestamp_ms - previous_ms) * 1e-3;
            if dt_secs < 0.0 {
                return Err(ProcessError::NonMonotonicBatch { index, dt_secs });
            }
            dts.push(dt_secs);
            previous_ms = sample.timestamp_ms;
        }
        Ok(dts)
    }

    /// First-ever batch: establish the altitude baseline and the initial
    /// orientation. Runs exactly once per flight.
    fn first_update(&mut self, batch: &[ImuSample]) {
        let altitudes: Vec<f64> = batch.iter().filter_map(sample_altitude).collect();
        if altitudes.is_empty() {
            log::warn!("[processor] first batch carried no altitude; baseline unknown");
        } else {
            self.baseline_altitude =
                Some(altitudes.iter().sum::<f64>() / altitudes.len() as f64);
        }

        self.orientation = Some(
            batch[0]
                .orientation_quaternion()
                .unwrap_or_else(UnitQuaternion::identity),
        );
        log::debug!(
            "[processor] baseline {:?} m, initial orientation {}",
            self.baseline_altitude,
            if batch[0].orientation_quaternion().is_some() {
                "from sensor"
            } else {
                "identity"
            }
        );
    }
}

/// The sensor-supplied pressure altitude, falling back to the barometric
/// formula when only raw pressure and temperature are available.
fn sample_altitude(sample: &ImuSample) -> Option<f64> {
    sample.pressure_alt.or_else(|| match (sample.pressure, sample.temperature) {
        (Some(pressure), Some(temperature)) => pressure_to_altitude(pressure, temperature),
        _ => None,
    })
}
