//! NTC 100K thermistor sensor
//!
//! The usual sensor in homebrew thermowells. Temperature comes from a
//! resistance lookup table with linear interpolation, so no `libm` is needed.

use mashtun_core::traits::{Sensor, SensorError};

/// Resistance/temperature table, ordered by falling resistance
///
/// Table format: (resistance_ohms, temperature_c)
/// Generated using beta equation with:
/// - R0 = 100,000 ohms at T0 = 25°C
/// - Beta = 3950K
const TEMP_TABLE: &[(u32, f32)] = &[
    (1_053_847, -20.0),
    (582_457, -10.0),
    (336_206, 0.0),
    (201_746, 10.0),
    (125_353, 20.0),
    (100_000, 25.0),
    (80_371, 30.0),
    (53_015, 40.0),
    (35_882, 50.0),
    (24_862, 60.0),
    (17_598, 70.0),
    (12_703, 80.0),
    (9_336, 90.0),
    (6_975, 100.0),
    (5_291, 110.0),
    (4_071, 120.0),
    (3_173, 130.0),
    (2_503, 140.0),
    (1_997, 150.0),
];

/// ADC conversion did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdcError;

/// ADC reading trait for platform abstraction
pub trait AdcReader {
    /// Read ADC value (12-bit, 0-4095)
    fn read(&mut self) -> Result<u16, AdcError>;
}

/// Full scale of a 12-bit converter
const ADC_MAX: u16 = 4096;

/// Counts from either rail treated as a wiring fault
const RAIL_MARGIN: u16 = 10;

/// NTC 100K thermistor with B=3950
///
/// Circuit: VCC -- pullup -- ADC_PIN -- NTC -- GND
pub struct NtcSensor<ADC> {
    adc: ADC,
    /// Pull-up resistor value in ohms
    pullup_ohms: u32,
}

impl<ADC> NtcSensor<ADC> {
    /// Create a new NTC sensor
    ///
    /// `pullup_ohms` is typically 4700 on 3.3 V boards.
    pub fn new(adc: ADC, pullup_ohms: u32) -> Self {
        Self { adc, pullup_ohms }
    }

    /// Convert an ADC reading to thermistor resistance
    ///
    /// R_ntc = R_pullup * adc / (adc_max - adc)
    pub fn adc_to_resistance(&self, adc_value: u16) -> Result<u32, SensorError> {
        if adc_value >= ADC_MAX - RAIL_MARGIN {
            return Err(SensorError::OpenCircuit);
        }
        if adc_value < RAIL_MARGIN {
            return Err(SensorError::ShortCircuit);
        }

        let numerator = u64::from(self.pullup_ohms) * u64::from(adc_value);
        let denominator = u64::from(ADC_MAX - adc_value);
        Ok((numerator / denominator) as u32)
    }

    /// Interpolate the temperature of a resistance
    pub fn resistance_to_celsius(resistance: u32) -> Result<f32, SensorError> {
        let (coldest, _) = TEMP_TABLE[0];
        let (hottest, _) = TEMP_TABLE[TEMP_TABLE.len() - 1];
        if resistance > coldest || resistance < hottest {
            return Err(SensorError::OutOfRange);
        }

        TEMP_TABLE
            .windows(2)
            .find_map(|pair| {
                let (r_high, t_low) = pair[0];
                let (r_low, t_high) = pair[1];
                (resistance <= r_high && resistance >= r_low).then(|| {
                    let fraction = (r_high - resistance) as f32 / (r_high - r_low) as f32;
                    t_low + (t_high - t_low) * fraction
                })
            })
            .ok_or(SensorError::OutOfRange)
    }
}

impl<ADC: AdcReader> Sensor for NtcSensor<ADC> {
    fn read(&mut self) -> Result<f32, SensorError> {
        let adc_value = self.adc.read().map_err(|_| SensorError::ConversionError)?;
        let resistance = self.adc_to_resistance(adc_value)?;
        Self::resistance_to_celsius(resistance)
    }
}
