//! Batch regression replays: run recorded flights through the full pipeline
//! at full speed and print one JSON summary per flight.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::json;

use payload_flight_rs::acquisition::Acquisition;
use payload_flight_rs::config::PipelineConfig;
use payload_flight_rs::flight_state::{FlightPhase, FlightStateMachine, PhaseInput};
use payload_flight_rs::processor::DataProcessor;
use payload_flight_rs::replay::ReplaySource;

#[derive(Parser, Debug)]
struct Args {
    /// Path to one recorded flight CSV (optionally .gz)
    #[arg(long, conflicts_with = "flight_dir")]
    flight: Option<PathBuf>,

    /// Directory of recordings to batch replay (*.csv / *.csv.gz)
    #[arg(long)]
    flight_dir: Option<PathBuf>,

    /// Acceleration deadband in m/s^2
    #[arg(long, default_value = "0.5")]
    deadband: f64,

    /// Launch-detect acceleration threshold in m/s^2
    #[arg(long, default_value = "50.0")]
    launch_accel: f64,

    /// Landing rest-acceleration threshold in m/s^2
    #[arg(long, default_value = "0.4")]
    rest_accel: f64,

    /// Landing near-ground altitude threshold in meters
    #[arg(long, default_value = "2.0")]
    ground_altitude: f64,
}

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let config = PipelineConfig {
        accel_deadband: args.deadband,
        launch_accel_threshold: args.launch_accel,
        rest_accel_threshold: args.rest_accel,
        ground_altitude_threshold: args.ground_altitude,
        ..PipelineConfig::default()
    };

    let source = ReplaySource::open(path, &config, true)?;
    let recorded = source.len();
    let mut acquisition = Acquisition::replay(source);
    let mut processor = DataProcessor::new(&config);
    let mut state_machine = FlightStateMachine::new(&config);

    let mut processed_samples = 0usize;
    let mut rejected_batches = 0u64;

    acquisition.start();
    while acquisition.is_running() {
        let batch = acquisition.drain_batch(config.drain_batch_size);
        if batch.is_empty() {
            continue;
        }
        if processor.update(&batch).is_err() {
            rejected_batches += 1;
            continue;
        }
        processed_samples += batch.len();
        for (sample, processed) in batch.iter().zip(processor.processed()) {
            state_machine.update(PhaseInput {
                accel_magnitude: processed.vertical_acceleration.map(f64::abs),
                altitude: processed.current_altitude,
                timestamp_ms: sample.timestamp_ms,
            });
        }
        if state_machine.is_terminal() {
            break;
        }
    }
    acquisition.stop();

    Ok(json!({
        "flight": path.display().to_string(),
        "recorded_samples": recorded,
        "processed_samples": processed_samples,
        "rejected_batches": rejected_batches,
        "max_altitude_m": processor.max_altitude(),
        "max_vertical_velocity_ms": processor.max_vertical_velocity(),
        "final_phase": state_machine.phase().label(),
        "armed_at_ms": state_machine.transition_time_ms(FlightPhase::Armed),
        "landed_at_ms": state_machine.transition_time_ms(FlightPhase::Landed),
    }))
}

fn is_recording(name: &str) -> bool {
    name.ends_with(".csv") || name.ends_with(".csv.gz")
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut results = Vec::new();

    if let Some(dir) = args.flight_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !is_recording(name) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(result) => results.push(result),
                Err(err) => eprintln!("Failed {}: {}", path.display(), err),
            }
        }
    } else if let Some(flight) = args.flight.as_ref() {
        results.push(run_once(flight, &args)?);
    } else {
        anyhow::bail!("Provide --flight or --flight-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
