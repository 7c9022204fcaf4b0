pub mod acquisition;
pub mod config;
pub mod decoder;
pub mod error;
pub mod flight_state;
pub mod logging;
pub mod physics;
pub mod processor;
pub mod replay;
pub mod types;

pub use acquisition::{Acquisition, AcquisitionChannel, LiveAcquisition, MockReplay};
pub use config::PipelineConfig;
pub use decoder::{BinaryFrameDecoder, Decoded, LineRecordDecoder};
pub use error::{AcquisitionError, DecodeError, ProcessError};
pub use flight_state::{FlightPhase, FlightStateMachine, PhaseInput};
pub use processor::DataProcessor;
pub use replay::{Fetch, ReplaySource};
pub use types::{ImuSample, ProcessedSample};
