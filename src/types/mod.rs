use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// One structured reading from the sensor module.
///
/// Every measurement channel is optional: the firmware omits channels it has
/// no fix for, and a dropout must stay visible downstream instead of reading
/// as zero. Only the timestamp is mandatory. Timestamps are milliseconds and
/// strictly increase within one acquisition channel.
///
/// The same struct deserializes from line-mode JSON groups and from recorded
/// flight CSVs (column headers matched by field name).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuSample {
    pub timestamp_ms: f64,
    pub voltage: Option<f64>,
    /// Ambient temperature in °C.
    pub temperature: Option<f64>,
    /// Ambient pressure in mbar.
    pub pressure: Option<f64>,
    /// Pressure altitude in meters, as computed by the sensor itself.
    pub pressure_alt: Option<f64>,
    // Compensated acceleration in m/s^2, body frame, includes gravity.
    pub accel_x: Option<f64>,
    pub accel_y: Option<f64>,
    pub accel_z: Option<f64>,
    // Angular rate in rad/s.
    pub angular_rate_x: Option<f64>,
    pub angular_rate_y: Option<f64>,
    pub angular_rate_z: Option<f64>,
    // Magnetic field.
    pub mag_x: Option<f64>,
    pub mag_y: Option<f64>,
    pub mag_z: Option<f64>,
    // Orientation quaternion (scalar first).
    pub quat_w: Option<f64>,
    pub quat_x: Option<f64>,
    pub quat_y: Option<f64>,
    pub quat_z: Option<f64>,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub gps_altitude: Option<f64>,
}

impl ImuSample {
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ms * 1e-3
    }

    /// Body-frame compensated acceleration, if all three axes are known.
    pub fn accel_vector(&self) -> Option<Vector3<f64>> {
        match (self.accel_x, self.accel_y, self.accel_z) {
            (Some(x), Some(y), Some(z)) => Some(Vector3::new(x, y, z)),
            _ => None,
        }
    }

    /// Angular rate vector, if all three axes are known.
    pub fn angular_rate_vector(&self) -> Option<Vector3<f64>> {
        match (self.angular_rate_x, self.angular_rate_y, self.angular_rate_z) {
            (Some(x), Some(y), Some(z)) => Some(Vector3::new(x, y, z)),
            _ => None,
        }
    }

    /// Orientation quaternion reported by the sensor, normalized.
    pub fn orientation_quaternion(&self) -> Option<UnitQuaternion<f64>> {
        match (self.quat_w, self.quat_x, self.quat_y, self.quat_z) {
            (Some(w), Some(x), Some(y), Some(z)) => Some(UnitQuaternion::from_quaternion(
                Quaternion::new(w, x, y, z),
            )),
            _ => None,
        }
    }
}

/// Per-sample output of the data processor, immutable once emitted.
///
/// `current_altitude` and `vertical_acceleration` stay `None` when the inputs
/// needed to compute them were unknown for this sample; the velocity is a
/// running value and is always defined.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProcessedSample {
    /// Altitude in meters, zeroed against the flight baseline.
    pub current_altitude: Option<f64>,
    /// Integrated vertical velocity in m/s.
    pub vertical_velocity: f64,
    /// World-frame vertical acceleration in m/s^2, gravity removed and
    /// deadbanded. Positive under powered ascent, negative under drag.
    pub vertical_acceleration: Option<f64>,
    /// Seconds since the previous sample (0.0 for the very first sample).
    pub time_since_last_sample: f64,
}
