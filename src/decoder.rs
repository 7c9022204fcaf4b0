//! Framing and decoding of the raw sensor byte stream.
//!
//! Two wire formats exist across firmware generations: a fixed binary frame
//! (`0xAA` start marker followed by 21 little-endian f32 fields) and a
//! newline-terminated JSON record. Both decoders accumulate bytes and hand
//! back at most one sample per `poll()` without ever blocking; "not enough
//! bytes yet" is a value, not an error.

use serde::Deserialize;

use crate::error::DecodeError;
use crate::types::ImuSample;

/// Start-of-frame marker for the binary format.
pub const PACKET_START_MARKER: u8 = 0xAA;
/// Number of f32 fields in one binary frame.
pub const FRAME_FIELD_COUNT: usize = 21;
/// Payload bytes following the marker.
pub const FRAME_PAYLOAD_BYTES: usize = FRAME_FIELD_COUNT * 4;

/// Outcome of one decode attempt.
#[derive(Debug)]
pub enum Decoded {
    Sample(ImuSample),
    /// Not enough buffered bytes for a complete frame; buffered bytes are
    /// retained for the next call.
    NeedMore,
}

/// Structural plausibility check applied to a candidate frame before it is
/// accepted. Returning false discards the marker byte and resumes scanning.
pub type FrameCheck = fn(&[f32; FRAME_FIELD_COUNT]) -> bool;

/// Default check: the timestamp field must be a finite, positive number.
/// Alignment-shifted garbage almost never satisfies this.
pub fn default_frame_check(fields: &[f32; FRAME_FIELD_COUNT]) -> bool {
    fields[0].is_finite() && fields[0] > 0.0
}

/// Decoder for the binary frame format.
///
/// Field order on the wire: timestamp_ms, voltage, temperature, pressure,
/// pressure_alt, accel x/y/z, angular rate x/y/z, mag x/y/z, quaternion
/// w/x/y/z, gps lat/lon/alt. Channels the firmware has no reading for are
/// sent as NaN and decode to `None`.
pub struct BinaryFrameDecoder {
    buf: Vec<u8>,
    frame_check: FrameCheck,
    last_timestamp_ms: Option<f64>,
}

impl BinaryFrameDecoder {
    pub fn new(frame_check: FrameCheck) -> Self {
        Self {
            buf: Vec::with_capacity(2 * (1 + FRAME_PAYLOAD_BYTES)),
            frame_check,
            last_timestamp_ms: None,
        }
    }

    /// Append freshly read bytes to the working buffer.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Try to decode one frame from the buffer.
    ///
    /// Garbage before a marker is discarded. A marker followed by an
    /// implausible payload costs only the marker byte and reports
    /// `DecodeError::MalformedFrame` so the caller can count it; scanning
    /// resumes on the next call. A truncated frame is `Decoded::NeedMore`.
    pub fn poll(&mut self) -> Result<Decoded, DecodeError> {
        loop {
            let marker_pos = match self.buf.iter().position(|&b| b == PACKET_START_MARKER) {
                Some(pos) => pos,
                None => {
                    self.buf.clear();
                    return Ok(Decoded::NeedMore);
                }
            };
            self.buf.drain(..marker_pos);

            if self.buf.len() < 1 + FRAME_PAYLOAD_BYTES {
                return Ok(Decoded::NeedMore);
            }

            let mut fields = [0f32; FRAME_FIELD_COUNT];
            for (i, chunk) in self.buf[1..1 + FRAME_PAYLOAD_BYTES].chunks_exact(4).enumerate() {
                fields[i] = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }

            if !(self.frame_check)(&fields) {
                self.buf.drain(..1);
                return Err(DecodeError::MalformedFrame);
            }

            self.buf.drain(..1 + FRAME_PAYLOAD_BYTES);
            let sample = sample_from_fields(&fields);

            if let Some(previous_ms) = self.last_timestamp_ms {
                if sample.timestamp_ms <= previous_ms {
                    return Err(DecodeError::NonMonotonic {
                        previous_ms,
                        got_ms: sample.timestamp_ms,
                    });
                }
            }
            self.last_timestamp_ms = Some(sample.timestamp_ms);
            return Ok(Decoded::Sample(sample));
        }
    }
}

fn opt(value: f32) -> Option<f64> {
    if value.is_finite() {
        Some(f64::from(value))
    } else {
        None
    }
}

fn sample_from_fields(fields: &[f32; FRAME_FIELD_COUNT]) -> ImuSample {
    ImuSample {
        timestamp_ms: f64::from(fields[0]),
        voltage: opt(fields[1]),
        temperature: opt(fields[2]),
        pressure: opt(fields[3]),
        pressure_alt: opt(fields[4]),
        accel_x: opt(fields[5]),
        accel_y: opt(fields[6]),
        accel_z: opt(fields[7]),
        angular_rate_x: opt(fields[8]),
        angular_rate_y: opt(fields[9]),
        angular_rate_z: opt(fields[10]),
        mag_x: opt(fields[11]),
        mag_y: opt(fields[12]),
        mag_z: opt(fields[13]),
        quat_w: opt(fields[14]),
        quat_x: opt(fields[15]),
        quat_y: opt(fields[16]),
        quat_z: opt(fields[17]),
        gps_latitude: opt(fields[18]),
        gps_longitude: opt(fields[19]),
        gps_altitude: opt(fields[20]),
    }
}

// ─── Line-oriented records ───────────────────────────────────────────────────

#[derive(Deserialize)]
struct Axes {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Deserialize)]
struct QuatGroup {
    // One firmware revision sends quaternions as {real, i, j, k}.
    #[serde(alias = "real")]
    w: f64,
    #[serde(alias = "i")]
    x: f64,
    #[serde(alias = "j")]
    y: f64,
    #[serde(alias = "k")]
    z: f64,
}

#[derive(Deserialize)]
struct GpsGroup {
    lat: f64,
    lon: f64,
    alt: Option<f64>,
}

#[derive(Deserialize)]
struct LineRecord {
    timestamp: f64,
    voltage: Option<f64>,
    temperature: Option<f64>,
    pressure: Option<f64>,
    altitude: Option<f64>,
    accel: Option<Axes>,
    gyro: Option<Axes>,
    // The magnetometer group key differs by firmware revision; normalize both
    // spellings into the same fields.
    #[serde(alias = "magneticField")]
    mag: Option<Axes>,
    quat: Option<QuatGroup>,
    gps: Option<GpsGroup>,
}

impl LineRecord {
    fn into_sample(self) -> ImuSample {
        let mut sample = ImuSample {
            timestamp_ms: self.timestamp,
            voltage: self.voltage,
            temperature: self.temperature,
            pressure: self.pressure,
            pressure_alt: self.altitude,
            ..ImuSample::default()
        };
        if let Some(a) = self.accel {
            sample.accel_x = Some(a.x);
            sample.accel_y = Some(a.y);
            sample.accel_z = Some(a.z);
        }
        if let Some(g) = self.gyro {
            sample.angular_rate_x = Some(g.x);
            sample.angular_rate_y = Some(g.y);
            sample.angular_rate_z = Some(g.z);
        }
        if let Some(m) = self.mag {
            sample.mag_x = Some(m.x);
            sample.mag_y = Some(m.y);
            sample.mag_z = Some(m.z);
        }
        if let Some(q) = self.quat {
            sample.quat_w = Some(q.w);
            sample.quat_x = Some(q.x);
            sample.quat_y = Some(q.y);
            sample.quat_z = Some(q.z);
        }
        if let Some(g) = self.gps {
            sample.gps_latitude = Some(g.lat);
            sample.gps_longitude = Some(g.lon);
            sample.gps_altitude = g.alt;
        }
        sample
    }
}

/// Decoder for newline-terminated JSON records.
pub struct LineRecordDecoder {
    buf: Vec<u8>,
    last_timestamp_ms: Option<f64>,
}

impl LineRecordDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(512),
            last_timestamp_ms: None,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Try to decode one record. A malformed line is dropped and reported;
    /// blank lines are skipped; an incomplete trailing line is retained.
    pub fn poll(&mut self) -> Result<Decoded, DecodeError> {
        loop {
            let newline_pos = match self.buf.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => return Ok(Decoded::NeedMore),
            };
            let line: Vec<u8> = self.buf.drain(..=newline_pos).collect();
            let trimmed = trim_line(&line);
            if trimmed.is_empty() {
                continue;
            }

            let record: LineRecord = serde_json::from_slice(trimmed)?;
            let sample = record.into_sample();

            if let Some(previous_ms) = self.last_timestamp_ms {
                if sample.timestamp_ms <= previous_ms {
                    return Err(DecodeError::NonMonotonic {
                        previous_ms,
                        got_ms: sample.timestamp_ms,
                    });
                }
            }
            self.last_timestamp_ms = Some(sample.timestamp_ms);
            return Ok(Decoded::Sample(sample));
        }
    }
}

impl Default for LineRecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut slice = line;
    while let Some((&last, rest)) = slice.split_last() {
        if last == b'\n' || last == b'\r' {
            slice = rest;
        } else {
            break;
        }
    }
    slice
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(fields: &[f32; FRAME_FIELD_COUNT]) -> Vec<u8> {
        let mut bytes = vec![PACKET_START_MARKER];
        for f in fields {
            bytes.extend_from_slice(&f.to_le_bytes());
        }
        bytes
    }

    fn test_fields(timestamp_ms: f32) -> [f32; FRAME_FIELD_COUNT] {
        let mut fields = [f32::NAN; FRAME_FIELD_COUNT];
        fields[0] = timestamp_ms;
        fields[4] = 350.0; // pressure_alt
        fields[5] = 0.0;
        fields[6] = 0.0;
        fields[7] = -9.81;
        fields
    }

    #[test]
    fn test_garbage_then_valid_frame_decodes_once() {
        let mut decoder = BinaryFrameDecoder::new(default_frame_check);
        decoder.extend(&[0x01, 0x02, 0x03, 0x7f]);
        decoder.extend(&frame_bytes(&test_fields(1000.0)));

        match decoder.poll() {
            Ok(Decoded::Sample(sample)) => {
                assert_eq!(sample.timestamp_ms, 1000.0);
                assert_eq!(sample.pressure_alt, Some(350.0));
                assert_eq!(sample.voltage, None);
            }
            other => panic!("expected a sample, got {other:?}"),
        }
        assert!(matches!(decoder.poll(), Ok(Decoded::NeedMore)));
    }

    #[test]
    fn test_partial_payload_is_retained() {
        let mut decoder = BinaryFrameDecoder::new(default_frame_check);
        let full = frame_bytes(&test_fields(1000.0));
        decoder.extend(&full[..10]);

        assert!(matches!(decoder.poll(), Ok(Decoded::NeedMore)));
        assert_eq!(decoder.buffered_len(), 10);

        decoder.extend(&full[10..]);
        assert!(matches!(decoder.poll(), Ok(Decoded::Sample(_))));
    }

    #[test]
    fn test_false_marker_resynchronizes() {
        let mut decoder = BinaryFrameDecoder::new(default_frame_check);
        // A stray marker followed by non-frame bytes (timestamp decodes as
        // NaN), then a genuine frame.
        decoder.extend(&[PACKET_START_MARKER]);
        decoder.extend(&[0xFF; FRAME_PAYLOAD_BYTES]);
        decoder.extend(&frame_bytes(&test_fields(2000.0)));

        assert!(matches!(decoder.poll(), Err(DecodeError::MalformedFrame)));
        match decoder.poll() {
            Ok(Decoded::Sample(sample)) => assert_eq!(sample.timestamp_ms, 2000.0),
            other => panic!("expected resynchronized sample, got {other:?}"),
        }
    }

    #[test]
    fn test_non_monotonic_frame_is_dropped() {
        let mut decoder = BinaryFrameDecoder::new(default_frame_check);
        decoder.extend(&frame_bytes(&test_fields(2000.0)));
        decoder.extend(&frame_bytes(&test_fields(1000.0)));
        decoder.extend(&frame_bytes(&test_fields(3000.0)));

        assert!(matches!(decoder.poll(), Ok(Decoded::Sample(_))));
        assert!(matches!(
            decoder.poll(),
            Err(DecodeError::NonMonotonic { .. })
        ));
        match decoder.poll() {
            Ok(Decoded::Sample(sample)) => assert_eq!(sample.timestamp_ms, 3000.0),
            other => panic!("expected decoding to continue, got {other:?}"),
        }
    }

    #[test]
    fn test_line_record_with_mag_alias() {
        let mut decoder = LineRecordDecoder::new();
        decoder.extend(
            br#"{"timestamp": 1000.0, "altitude": 351.2, "voltage": 3.7, "accel": {"x": 0.1, "y": 0.0, "z": -9.8}, "magneticField": {"x": 1.0, "y": 2.0, "z": 3.0}}"#,
        );
        decoder.extend(b"\n");

        match decoder.poll() {
            Ok(Decoded::Sample(sample)) => {
                assert_eq!(sample.pressure_alt, Some(351.2));
                assert_eq!(sample.mag_y, Some(2.0));
                assert_eq!(sample.accel_z, Some(-9.8));
                assert_eq!(sample.temperature, None);
            }
            other => panic!("expected a sample, got {other:?}"),
        }
    }

    #[test]
    fn test_quaternion_firmware_aliases() {
        let mut decoder = LineRecordDecoder::new();
        decoder.extend(
            br#"{"timestamp": 1000.0, "quat": {"real": 1.0, "i": 0.0, "j": 0.0, "k": 0.0}}"#,
        );
        decoder.extend(b"\n");

        match decoder.poll() {
            Ok(Decoded::Sample(sample)) => {
                assert_eq!(sample.quat_w, Some(1.0));
                assert_eq!(sample.quat_z, Some(0.0));
            }
            other => panic!("expected a sample, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_line_is_dropped_and_decoding_continues() {
        let mut decoder = LineRecordDecoder::new();
        decoder.extend(b"{not json at all\r\n");
        decoder.extend(br#"{"timestamp": 1000.0, "altitude": 350.0}"#);
        decoder.extend(b"\n");

        assert!(matches!(
            decoder.poll(),
            Err(DecodeError::MalformedLine(_))
        ));
        assert!(matches!(decoder.poll(), Ok(Decoded::Sample(_))));
        assert!(matches!(decoder.poll(), Ok(Decoded::NeedMore)));
    }

    #[test]
    fn test_incomplete_line_waits_for_newline() {
        let mut decoder = LineRecordDecoder::new();
        decoder.extend(br#"{"timestamp": 1000.0"#);
        assert!(matches!(decoder.poll(), Ok(Decoded::NeedMore)));
        decoder.extend(b", \"altitude\": 350.0}\n");
        assert!(matches!(decoder.poll(), Ok(Decoded::Sample(_))));
    }
}
