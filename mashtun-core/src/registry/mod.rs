//! Device registry
//!
//! Maps board pins to the sensors and actuators plugged into them. The
//! registry owns every device; each pin hosts at most one. The main sensor
//! and main actuator are registered at construction and cannot be removed.

use heapless::Vec;

use crate::config::{PinMap, MAX_DEVICES};
use crate::error::Error;
use crate::traits::{Actuator, Sensor, SENSOR_FAULT};

/// Kind of device in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceKind {
    Sensor,
    Actuator,
}

impl DeviceKind {
    /// Wire code of the kind
    pub const fn code(self) -> i8 {
        match self {
            DeviceKind::Sensor => 0,
            DeviceKind::Actuator => 1,
        }
    }
}

/// Wire code of an unused pin
pub const UNUSED_DEVICE_CODE: i8 = -1;

/// A registered device
#[derive(Debug)]
pub enum Device<S, A> {
    Sensor(S),
    Actuator(A),
}

impl<S, A> Device<S, A> {
    /// Kind of the device
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Sensor(_) => DeviceKind::Sensor,
            Device::Actuator(_) => DeviceKind::Actuator,
        }
    }
}

#[derive(Debug)]
struct Slot<S, A> {
    pin: u8,
    index: usize,
    device: Device<S, A>,
}

/// Pin-to-device mapping with a fixed number of slots
#[derive(Debug)]
pub struct DeviceRegistry<S, A> {
    pins: PinMap,
    /// Ordered by pin index, digital before analog
    slots: Vec<Slot<S, A>, MAX_DEVICES>,
    main_sensor_pin: u8,
    main_actuator_pin: u8,
}

impl<S: Sensor, A: Actuator> DeviceRegistry<S, A> {
    /// Create a registry holding the main sensor and main actuator
    pub fn new(
        pins: PinMap,
        main_sensor_pin: u8,
        main_sensor: S,
        main_actuator_pin: u8,
        main_actuator: A,
    ) -> Result<Self, Error> {
        let mut registry = Self {
            pins,
            slots: Vec::new(),
            main_sensor_pin,
            main_actuator_pin,
        };
        registry.insert(main_sensor_pin, Device::Sensor(main_sensor))?;
        registry.insert(main_actuator_pin, Device::Actuator(main_actuator))?;
        Ok(registry)
    }

    fn index_of(&self, pin: u8) -> Result<usize, Error> {
        self.pins.index_of(pin).ok_or(Error::InvalidArgument)
    }

    fn slot(&self, pin: u8) -> Option<&Slot<S, A>> {
        self.slots.iter().find(|slot| slot.pin == pin)
    }

    fn slot_mut(&mut self, pin: u8) -> Option<&mut Slot<S, A>> {
        self.slots.iter_mut().find(|slot| slot.pin == pin)
    }

    fn insert(&mut self, pin: u8, device: Device<S, A>) -> Result<(), Error> {
        let index = self.index_of(pin)?;
        if self.slot(pin).is_some() {
            return Err(Error::InvalidArgument);
        }
        if self.slots.is_full() {
            return Err(Error::Full);
        }

        let at = self
            .slots
            .iter()
            .position(|slot| slot.index > index)
            .unwrap_or(self.slots.len());
        self.slots
            .insert(at, Slot { pin, index, device })
            .map_err(|_| Error::Full)
    }

    /// Register a sensor on a free pin
    pub fn add_sensor(&mut self, pin: u8, sensor: S) -> Result<(), Error> {
        self.insert(pin, Device::Sensor(sensor))
    }

    /// Register an actuator on a free pin
    pub fn add_actuator(&mut self, pin: u8, actuator: A) -> Result<(), Error> {
        self.insert(pin, Device::Actuator(actuator))
    }

    /// Unregister a device and hand it back
    pub fn remove(&mut self, pin: u8) -> Result<Device<S, A>, Error> {
        self.index_of(pin)?;
        if self.is_main(pin) {
            return Err(Error::InvalidArgument);
        }

        let at = self
            .slots
            .iter()
            .position(|slot| slot.pin == pin)
            .ok_or(Error::NotFound)?;
        Ok(self.slots.remove(at).device)
    }

    /// Unregister every device except the main ones
    pub fn clear(&mut self) {
        let (sensor, actuator) = (self.main_sensor_pin, self.main_actuator_pin);
        self.slots
            .retain(|slot| slot.pin == sensor || slot.pin == actuator);
    }

    /// Check if a pin holds the main sensor or main actuator
    pub fn is_main(&self, pin: u8) -> bool {
        pin == self.main_sensor_pin || pin == self.main_actuator_pin
    }

    /// Device on a pin
    pub fn find(&self, pin: u8) -> Option<&Device<S, A>> {
        self.slot(pin).map(|slot| &slot.device)
    }

    /// Check if a pin hosts a device
    pub fn is_in_use(&self, pin: u8) -> Result<bool, Error> {
        self.index_of(pin)?;
        Ok(self.slot(pin).is_some())
    }

    /// Kind of the device on a pin
    pub fn kind_of(&self, pin: u8) -> Option<DeviceKind> {
        self.find(pin).map(Device::kind)
    }

    /// Wire code of the device on a pin: 0 sensor, 1 actuator, -1 unused
    pub fn device_type(&self, pin: u8) -> i8 {
        self.kind_of(pin)
            .map_or(UNUSED_DEVICE_CODE, DeviceKind::code)
    }

    /// Sensor on a pin
    pub fn sensor_mut(&mut self, pin: u8) -> Option<&mut S> {
        match self.slot_mut(pin).map(|slot| &mut slot.device) {
            Some(Device::Sensor(sensor)) => Some(sensor),
            _ => None,
        }
    }

    /// Actuator on a pin
    pub fn actuator(&self, pin: u8) -> Option<&A> {
        match self.find(pin) {
            Some(Device::Actuator(actuator)) => Some(actuator),
            _ => None,
        }
    }

    /// Actuator on a pin, mutably
    pub fn actuator_mut(&mut self, pin: u8) -> Option<&mut A> {
        match self.slot_mut(pin).map(|slot| &mut slot.device) {
            Some(Device::Actuator(actuator)) => Some(actuator),
            _ => None,
        }
    }

    /// Every registered actuator with its pin
    pub fn actuators_mut(&mut self) -> impl Iterator<Item = (u8, &mut A)> {
        self.slots.iter_mut().filter_map(|slot| match &mut slot.device {
            Device::Actuator(actuator) => Some((slot.pin, actuator)),
            Device::Sensor(_) => None,
        })
    }

    /// Read the sensor on a pin, [`SENSOR_FAULT`] if absent or failing
    pub fn sensor_reading(&mut self, pin: u8) -> f32 {
        self.sensor_mut(pin)
            .map_or(SENSOR_FAULT, |sensor| sensor.read_or_fault())
    }

    /// Check if the actuator on a pin is driving its output
    pub fn is_actuator_on(&self, pin: u8) -> bool {
        self.actuator(pin).is_some_and(|actuator| actuator.is_active())
    }

    /// Pin of the main sensor
    pub fn main_sensor_pin(&self) -> u8 {
        self.main_sensor_pin
    }

    /// Pin of the main actuator
    pub fn main_actuator_pin(&self) -> u8 {
        self.main_actuator_pin
    }

    /// Pins available to devices
    pub fn pin_map(&self) -> &PinMap {
        &self.pins
    }

    /// Registered pins in slot order
    pub fn pins(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots.iter().map(|slot| slot.pin)
    }

    /// Number of registered devices
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no device is registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
