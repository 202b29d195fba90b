//! Hardware abstraction traits
//!
//! These traits define the interface between the controller logic
//! and hardware-specific implementations.

pub mod actuator;
pub mod clock;
pub mod sensor;
pub mod storage;

pub use actuator::{Actuator, ActuatorError};
pub use clock::{elapsed_ms, Clock};
pub use sensor::{Sensor, SensorError, SENSOR_FAULT};
pub use storage::{Eeprom, MemEeprom, StorageError};
