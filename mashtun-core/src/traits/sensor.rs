//! Sensor capability

/// Reading reported in place of a failed sensor read
///
/// Read accessors that cannot return an error hand this value out so a
/// tick keeps making progress through transient faults.
pub const SENSOR_FAULT: f32 = f32::NEG_INFINITY;

/// Errors that can occur while reading a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// Sensor disconnected (open circuit)
    OpenCircuit,
    /// Sensor shorted to ground
    ShortCircuit,
    /// Reading out of expected range
    OutOfRange,
    /// Bus or ADC conversion error
    ConversionError,
}

/// Trait for process sensors (thermistors, level switches, ...)
///
/// Takes `&mut self` because ADC and bus reads typically require mutable
/// access.
pub trait Sensor {
    /// Read the current value
    fn read(&mut self) -> Result<f32, SensorError>;

    /// Read the current value, or [`SENSOR_FAULT`] on failure
    fn read_or_fault(&mut self) -> f32 {
        self.read().unwrap_or(SENSOR_FAULT)
    }
}
