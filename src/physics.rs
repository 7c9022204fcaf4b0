//! Small numeric helpers shared by the processing pipeline.

/// Sea-level standard pressure in mbar.
const SEA_LEVEL_PRESSURE_MBAR: f64 = 1013.25;
/// Temperature lapse rate in K/m for the lower atmosphere.
const TEMP_LAPSE_RATE: f64 = 0.0065;
/// R * L / (g0 * M) for dry air, the exponent of the barometric formula.
const BAROMETRIC_EXPONENT: f64 = 8.314_459_8 * TEMP_LAPSE_RATE / (9.80665 * 0.028_964_4);
const ZERO_CELSIUS_KELVIN: f64 = 273.15;

/// Returns 0.0 when `value` is within the deadband threshold, otherwise the
/// value unchanged. Values exactly at the threshold pass through.
pub fn deadband(value: f64, threshold: f64) -> f64 {
    if value.abs() < threshold {
        0.0
    } else {
        value
    }
}

/// Altitude from ambient pressure and temperature via the standard-atmosphere
/// formula. Used only where the sensor does not supply a pressure altitude
/// directly.
///
/// Returns `None` for non-positive pressure or non-positive absolute
/// temperature: the formula is undefined there and a fabricated number would
/// be worse than an unknown.
pub fn pressure_to_altitude(pressure_mbar: f64, temperature_c: f64) -> Option<f64> {
    let temperature_k = temperature_c + ZERO_CELSIUS_KELVIN;
    if pressure_mbar <= 0.0 || temperature_k <= 0.0 {
        return None;
    }
    let pressure_ratio = pressure_mbar / SEA_LEVEL_PRESSURE_MBAR;
    Some(temperature_k / TEMP_LAPSE_RATE * (1.0 - pressure_ratio.powf(BAROMETRIC_EXPONENT)))
}
