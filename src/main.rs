use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use payload_flight_rs::acquisition::Acquisition;
use payload_flight_rs::config::PipelineConfig;
use payload_flight_rs::flight_state::{FlightPhase, FlightStateMachine, PhaseInput};
use payload_flight_rs::logging::{ConsoleLogger, FlightLogger, FlightRecord};
use payload_flight_rs::processor::DataProcessor;
use payload_flight_rs::replay::ReplaySource;

#[derive(Parser, Debug)]
#[command(name = "payload_flight")]
#[command(about = "Rocket payload flight computer - serial IMU estimation pipeline", long_about = None)]
struct Args {
    /// Replay a recorded flight CSV (optionally .gz) instead of reading the
    /// serial IMU
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,

    /// Replay at full speed instead of the recorded sensor rate
    #[arg(long, requires = "replay")]
    fast_replay: bool,

    /// Serial device the sensor module is attached to
    #[arg(long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Serial baud rate
    #[arg(long, default_value_t = 115_200)]
    baud: u32,
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S%.3f").to_string()
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = PipelineConfig {
        serial_port: args.port,
        baud_rate: args.baud,
        ..PipelineConfig::default()
    };

    println!("[{}] Payload flight computer starting", ts_now());

    let mut acquisition = match args.replay {
        Some(ref path) => {
            println!("[{}] Replay mode: {}", ts_now(), path.display());
            let source = ReplaySource::open(path, &config, args.fast_replay)
                .with_context(|| format!("loading recording {}", path.display()))?;
            Acquisition::replay(source)
        }
        None => {
            println!(
                "[{}] Live mode: {} @ {} baud",
                ts_now(),
                config.serial_port,
                config.baud_rate
            );
            Acquisition::live(&config).context("the sensor must be reachable before launch")?
        }
    };

    let mut processor = DataProcessor::new(&config);
    let mut state_machine = FlightStateMachine::new(&config);
    let mut logger = ConsoleLogger;

    acquisition.start();
    run_control_loop(
        &mut acquisition,
        &mut processor,
        &mut state_machine,
        &mut logger,
        &config,
    );
    acquisition.stop();

    print_summary(&processor, &state_machine);
    Ok(())
}

/// The flight loop: drain, process, classify. Never blocks on I/O; ends when
/// the rocket lands or the acquisition source terminates.
fn run_control_loop(
    acquisition: &mut Acquisition,
    processor: &mut DataProcessor,
    state_machine: &mut FlightStateMachine,
    logger: &mut dyn FlightLogger,
    config: &PipelineConfig,
) {
    let mut total_samples = 0u64;
    let mut rejected_batches = 0u64;

    loop {
        if !acquisition.is_running() {
            println!("[{}] Acquisition ended", ts_now());
            break;
        }

        let batch = acquisition.drain_batch(config.drain_batch_size);
        if batch.is_empty() {
            // Sensor momentarily silent; keep the loop responsive.
            thread::sleep(Duration::from_millis(1));
            continue;
        }
        total_samples += batch.len() as u64;

        if let Err(err) = processor.update(&batch) {
            rejected_batches += 1;
            log::warn!("[loop] batch rejected: {err}");
            continue;
        }

        for (sample, processed) in batch.iter().zip(processor.processed()) {
            let input = PhaseInput {
                accel_magnitude: processed.vertical_acceleration.map(f64::abs),
                altitude: processed.current_altitude,
                timestamp_ms: sample.timestamp_ms,
            };
            if let Some(phase) = state_machine.update(input) {
                log::info!(
                    "[phase] {} at t={:.3}s",
                    phase.label(),
                    sample.timestamp_secs()
                );
            }
            logger.log_record(&FlightRecord::new(
                state_machine.phase(),
                sample.clone(),
                Some(*processed),
            ));
        }

        if state_machine.is_terminal() {
            println!("[{}] Landing detected, ending flight loop", ts_now());
            break;
        }
    }

    log::info!("[loop] {total_samples} samples processed, {rejected_batches} batches rejected");
}

fn print_summary(processor: &DataProcessor, state_machine: &FlightStateMachine) {
    println!("[{}] Flight summary", ts_now());
    println!("  Max altitude: {:.1} m", processor.max_altitude());
    println!(
        "  Max vertical velocity: {:.2} m/s",
        processor.max_vertical_velocity()
    );
    for phase in [FlightPhase::Armed, FlightPhase::Landed] {
        match state_machine.transition_time_ms(phase) {
            Some(ts) => println!("  {}: t={:.3}s", phase.label(), ts * 1e-3),
            None => println!("  {}: not reached", phase.label()),
        }
    }
}
