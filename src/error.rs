use std::path::PathBuf;

use thiserror::Error;

/// Recoverable decode failures. The affected frame or line has already been
/// discarded when one of these is returned; the decoder keeps working.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A start marker was found but the bytes after it failed the structural
    /// check. The marker byte was dropped and scanning continues, so an
    /// alignment-shifted stream is never misread as valid data.
    #[error("implausible binary frame discarded while resynchronizing")]
    MalformedFrame,

    /// A newline-terminated record did not parse. The line was dropped.
    #[error("malformed line record: {0}")]
    MalformedLine(#[from] serde_json::Error),

    /// The frame parsed but its timestamp did not advance past the previous
    /// accepted frame. The frame was dropped.
    #[error("non-monotonic timestamp: {got_ms} ms after {previous_ms} ms")]
    NonMonotonic { previous_ms: f64, got_ms: f64 },
}

/// Data-integrity failure inside the processor. The whole batch is rejected
/// and internal state (baseline, orientation, velocity) is left untouched.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("non-monotonic timestamp at batch index {index} (dt = {dt_secs:.6} s)")]
    NonMonotonicBatch { index: usize, dt_secs: f64 },
}

/// Startup failures of an acquisition source. A flight computer that cannot
/// reach its sensor before launch has no recovery path, so these abort
/// startup.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to open serial device {port}")]
    DeviceOpen {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("failed to open recording {}", path.display())]
    RecordingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse recording {}", path.display())]
    RecordingParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("recording {} contains no samples", path.display())]
    EmptyRecording { path: PathBuf },
}
