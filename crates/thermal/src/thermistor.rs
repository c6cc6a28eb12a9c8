//! Thermistor model for converting ADC readings to pit temperatures.

/// Resistance of the fixed leg of the probe voltage divider, in ohms.
pub const HIGH_RESIST: f64 = 10_000.0;

/// A thermistor model using the Steinhart-Hart equation.
///
/// The probes sit in a voltage divider against a 10 kΩ fixed resistor, so the
/// ADC reports the ratio `v = R / (R + HIGH_RESIST)` in `[0, 1)`. The three
/// coefficients come from the probe manufacturer (or a three-point fit):
/// `1/T = a + b * ln(R) + c * (ln(R))^3`, with `T` in Kelvin.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SteinhartHart {
    /// Steinhart-Hart coefficient A.
    pub a: f64,
    /// Steinhart-Hart coefficient B.
    pub b: f64,
    /// Steinhart-Hart coefficient C.
    pub c: f64,
}

impl SteinhartHart {
    /// Creates a new `SteinhartHart` model from its three coefficients.
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Calculates the thermistor's resistance from the divider ratio.
    ///
    /// Returns `None` when the ratio sits on a rail (`v <= 0` or `v >= 1`),
    /// which a real divider never produces: rail readings mean a shorted or
    /// disconnected probe and must not reach `ln`.
    pub fn ratio_to_resistance(&self, v: f64) -> Option<f64> {
        if !(v > 0.0 && v < 1.0) {
            return None;
        }
        Some(HIGH_RESIST * v / (1.0 - v))
    }

    /// Converts a divider ratio to degrees Fahrenheit.
    ///
    /// Returns `None` for rail readings or a non-positive `1/T` (both only
    /// occur on hardware faults, never on a connected probe).
    pub fn ratio_to_fahrenheit(&self, v: f64) -> Option<f64> {
        let resistance = self.ratio_to_resistance(v)?;
        let ln_r = resistance.ln();
        let temp_inv = self.a + self.b * ln_r + self.c * ln_r.powi(3);
        if temp_inv <= 0.0 {
            return None;
        }
        let temp_k = 1.0 / temp_inv;
        Some((9.0 / 5.0) * (temp_k - 273.15) + 32.0)
    }
}
