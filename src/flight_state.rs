//! Flight-phase state machine.
//!
//! Phases only ever move forward: Standby → Armed → Landed. The machine
//! performs no I/O; callers observe transitions through the return value of
//! `update` and log or transmit as they see fit.

use serde::Serialize;

use crate::config::PipelineConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FlightPhase {
    /// On the rail, waiting for launch.
    Standby = 0,
    /// Launch detected; in flight.
    Armed = 1,
    /// Back on the ground. Terminal.
    Landed = 2,
}

pub const NUM_PHASES: usize = 3;

impl FlightPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Standby => "Standby",
            Self::Armed => "Armed",
            Self::Landed => "Landed",
        }
    }
}

/// Per-iteration input, derived from the latest processed sample.
///
/// Unknown inputs never fire a transition: a dropout must not arm the payload
/// or declare a landing.
#[derive(Clone, Copy, Debug)]
pub struct PhaseInput {
    /// Magnitude of the world-frame, gravity-removed acceleration in m/s^2.
    pub accel_magnitude: Option<f64>,
    /// Zeroed altitude in meters.
    pub altitude: Option<f64>,
    pub timestamp_ms: f64,
}

pub struct FlightStateMachine {
    launch_accel_threshold: f64,
    rest_accel_threshold: f64,
    ground_altitude_threshold: f64,
    phase: FlightPhase,
    transition_times_ms: [Option<f64>; NUM_PHASES],
}

impl FlightStateMachine {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            launch_accel_threshold: config.launch_accel_threshold,
            rest_accel_threshold: config.rest_accel_threshold,
            ground_altitude_threshold: config.ground_altitude_threshold,
            phase: FlightPhase::Standby,
            transition_times_ms: [None; NUM_PHASES],
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == FlightPhase::Landed
    }

    /// When the given phase was entered, if it has been reached.
    pub fn transition_time_ms(&self, phase: FlightPhase) -> Option<f64> {
        self.transition_times_ms[phase as usize]
    }

    /// Advance the state machine by one sample. Returns `Some(new_phase)`
    /// exactly when a transition fires.
    pub fn update(&mut self, input: PhaseInput) -> Option<FlightPhase> {
        let next = match self.phase {
            FlightPhase::Standby => match input.accel_magnitude {
                Some(accel) if accel >= self.launch_accel_threshold => Some(FlightPhase::Armed),
                _ => None,
            },
            // Acceleration alone cannot distinguish rest from coast at
            // apogee; landing also requires being near the ground.
            FlightPhase::Armed => match (input.accel_magnitude, input.altitude) {
                (Some(accel), Some(altitude))
                    if accel <= self.rest_accel_threshold
                        && altitude <= self.ground_altitude_threshold =>
                {
                    Some(FlightPhase::Landed)
                }
                _ => None,
            },
            FlightPhase::Landed => None,
        };

        if let Some(phase) = next {
            self.phase = phase;
            self.transition_times_ms[phase as usize] = Some(input.timestamp_ms);
        }
        next
    }
}
