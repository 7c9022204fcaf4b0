//! Collaborator contract for flight data sinks.
//!
//! The pipeline itself performs no persistent logging; it hands
//! partially-populated records to whatever sink is wired in (CSV writer,
//! radio, console). Sinks must tolerate records where most fields are
//! unknown.

use serde::Serialize;

use crate::flight_state::FlightPhase;
use crate::types::{ImuSample, ProcessedSample};

/// One record per sample, keyed by timestamp: the raw fields the sample had,
/// the processed fields if the batch was accepted, and the phase at the time.
#[derive(Clone, Debug, Serialize)]
pub struct FlightRecord {
    pub timestamp_ms: f64,
    pub phase: FlightPhase,
    pub sample: ImuSample,
    pub processed: Option<ProcessedSample>,
}

impl FlightRecord {
    pub fn new(phase: FlightPhase, sample: ImuSample, processed: Option<ProcessedSample>) -> Self {
        Self {
            timestamp_ms: sample.timestamp_ms,
            phase,
            sample,
            processed,
        }
    }
}

pub trait FlightLogger {
    fn log_record(&mut self, record: &FlightRecord);
}

/// Console sink on the `log` crate. Per-sample detail is demoted to debug in
/// the idle phases so a long pad wait does not swamp the flight log.
pub struct ConsoleLogger;

impl FlightLogger for ConsoleLogger {
    fn log_record(&mut self, record: &FlightRecord) {
        let altitude = record
            .processed
            .and_then(|p| p.current_altitude)
            .map_or("-".to_string(), |v| format!("{v:.1}"));
        let velocity = record
            .processed
            .map_or("-".to_string(), |p| format!("{:.2}", p.vertical_velocity));
        match record.phase {
            FlightPhase::Armed => log::info!(
                "[flight] t={:.3}s alt={altitude}m vel={velocity}m/s",
                record.timestamp_ms * 1e-3
            ),
            FlightPhase::Standby | FlightPhase::Landed => log::debug!(
                "[flight] {} t={:.3}s alt={altitude}m vel={velocity}m/s",
                record.phase.label(),
                record.timestamp_ms * 1e-3
            ),
        }
    }
}
