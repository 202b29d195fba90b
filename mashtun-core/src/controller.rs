//! Brew control engine
//!
//! Owns the device registry, the recipe store and the storage device, and
//! walks the recipe one tick at a time. Every mutation of the recipe or of
//! the controller status is flushed to storage before the call returns.

use heapless::Vec;

use crate::config::{ConfigHeader, ControllerConfig, MAX_DEVICES};
use crate::error::Error;
use crate::recipe::{ControlProcess, RecipeStore, Region, Stage};
use crate::registry::{Device, DeviceRegistry};
use crate::state::{Event, Status};
use crate::traits::{elapsed_ms, Actuator, Clock, Eeprom, Sensor};

/// Most faults recorded in one tick outcome
pub const MAX_FAULTS: usize = 2 * MAX_DEVICES;

/// Runtime state of the controller
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerState {
    /// Current status
    pub status: Status,
    /// Position of the stage being brewed
    pub stage: usize,
    /// Time spent in the current stage, kept across stops
    pub elapsed_ms: u64,
    /// Clock reading at the last accounted tick
    last_tick_ms: u32,
}

impl ControllerState {
    const fn idle() -> Self {
        Self {
            status: Status::Idle,
            stage: 0,
            elapsed_ms: 0,
            last_tick_ms: 0,
        }
    }
}

/// Why a device was skipped during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Sensor returned an error
    SensorRead,
    /// No sensor registered on the pin
    MissingSensor,
    /// No actuator registered on the pin
    MissingActuator,
    /// Actuator rejected the command
    ActuatorDrive,
}

/// Device fault seen during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fault {
    pub pin: u8,
    pub kind: FaultKind,
}

/// Recipe progress made during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickEvent {
    /// Moved on to the stage at this position
    StageAdvanced(usize),
    /// Last stage finished, controller is idle
    RecipeFinished,
}

/// Result of one control tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Recipe progress, if any
    pub event: Option<TickEvent>,
    /// Devices skipped this tick (first [`MAX_FAULTS`] only)
    pub faults: Vec<Fault, MAX_FAULTS>,
}

impl TickOutcome {
    fn fault(&mut self, pin: u8, kind: FaultKind) {
        #[cfg(feature = "defmt")]
        defmt::warn!("pin {} skipped: {}", pin, kind);

        let _ = self.faults.push(Fault { pin, kind });
    }
}

/// Brewing controller
pub struct Controller<S, A, C, E> {
    config: ControllerConfig,
    registry: DeviceRegistry<S, A>,
    store: RecipeStore,
    clock: C,
    storage: E,
    state: ControllerState,
}

impl<S, A, C, E> Controller<S, A, C, E>
where
    S: Sensor,
    A: Actuator,
    C: Clock,
    E: Eeprom,
{
    /// Bring the controller up from the storage device
    ///
    /// A device without a valid header is formatted. A brew interrupted by
    /// power loss comes back stopped at its stage with no elapsed time. A
    /// recipe that does not decode leaves the controller in
    /// [`Status::Error`].
    pub fn new(
        config: ControllerConfig,
        registry: DeviceRegistry<S, A>,
        clock: C,
        storage: E,
    ) -> Result<Self, Error> {
        if config.time_unit_ms == 0 {
            return Err(Error::InvalidArgument);
        }

        let store = RecipeStore::open(Region::load(&storage)?);
        let mut controller = Self {
            config,
            registry,
            store,
            clock,
            storage,
            state: ControllerState::idle(),
        };
        controller.restore();
        Ok(controller)
    }

    fn restore(&mut self) {
        let Some(header) = self.store.header() else {
            #[cfg(feature = "defmt")]
            defmt::info!("formatting recipe memory");

            let header = self.header();
            match self.store.clear(&header) {
                Ok(()) => {
                    let _ = self.commit();
                }
                Err(_) => self.fail(),
            }
            return;
        };

        if self.store.validate().is_err() {
            self.fail();
            return;
        }

        self.state.status = match Status::from_code(header.status) {
            Some(Status::Brewing | Status::BrewingStopped) => Status::BrewingStopped,
            Some(Status::Error) => Status::Error,
            _ => Status::Idle,
        };
        if self.state.status == Status::BrewingStopped {
            self.state.stage = header.stage as usize;
        }

        #[cfg(feature = "defmt")]
        defmt::info!(
            "restored {} at stage {}",
            self.state.status,
            self.state.stage
        );

        // Main pins follow the registry, not the stored header
        let _ = self.save_state();
    }

    fn header(&self) -> ConfigHeader {
        ConfigHeader {
            status: self.state.status.code(),
            stage: self.state.stage.min(u16::MAX as usize) as u16,
            ..ConfigHeader::new(
                self.registry.main_sensor_pin(),
                self.registry.main_actuator_pin(),
            )
        }
    }

    /// Flush pending region changes
    fn commit(&mut self) -> Result<(), Error> {
        match self.store.flush(&mut self.storage) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    fn write_state(&mut self) -> Result<(), Error> {
        let header = self.header();
        self.store.set_header(&header)?;
        self.store.flush(&mut self.storage)?;
        Ok(())
    }

    /// Persist status and stage
    fn save_state(&mut self) -> Result<(), Error> {
        match self.write_state() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail();
                Err(e)
            }
        }
    }

    /// Enter the error state after a store failure
    fn fail(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::error!("recipe store failure at stage {}", self.state.stage);

        self.state.status = self.state.status.transition(Event::StoreCorrupted);
        self.release_all();
        // The device may be what failed
        let _ = self.write_state();
    }

    fn apply(&mut self, event: Event) -> Result<(), Error> {
        let next = self.state.status.transition(event);

        #[cfg(feature = "defmt")]
        defmt::info!("{} --{}--> {}", self.state.status, event, next);

        self.state.status = next;
        self.save_state()
    }

    fn ensure_operational(&self) -> Result<(), Error> {
        if self.state.status.is_error() {
            return Err(Error::InvalidState);
        }
        Ok(())
    }

    fn deactivate_all(&mut self) {
        for (_, actuator) in self.registry.actuators_mut() {
            actuator.deactivate();
        }
    }

    fn release_all(&mut self) {
        for (_, actuator) in self.registry.actuators_mut() {
            actuator.release();
        }
    }

    /// Account clock time since the last tick
    fn account_time(&mut self) {
        let now = self.clock.now_ms();
        self.state.elapsed_ms += u64::from(elapsed_ms(now, self.state.last_tick_ms));
        self.state.last_tick_ms = now;
    }

    // ----- Brew control -----

    /// Start brewing
    ///
    /// With `restart` the recipe starts over at the first stage; otherwise a
    /// stopped brew resumes where it was. Starting an already running brew
    /// without `restart` does nothing.
    pub fn start(&mut self, restart: bool) -> Result<(), Error> {
        self.ensure_operational()?;
        if self.store.is_empty() {
            return Err(Error::NotFound);
        }

        let event = match (self.state.status, restart) {
            (Status::Brewing, false) => return Ok(()),
            (_, true) => {
                self.deactivate_all();
                self.state.stage = 0;
                self.state.elapsed_ms = 0;
                Event::Restart
            }
            (Status::BrewingStopped, false) => Event::Resume,
            _ => Event::Start,
        };

        self.state.last_tick_ms = self.clock.now_ms();
        self.apply(event)
    }

    /// Pause the brew, keeping the time spent in the current stage
    pub fn stop(&mut self) -> Result<(), Error> {
        if !self.state.status.is_brewing() {
            return Err(Error::InvalidState);
        }

        self.account_time();
        self.deactivate_all();
        self.apply(Event::Stop)
    }

    /// Abandon the brew and rest at the first stage
    pub fn reset(&mut self) -> Result<(), Error> {
        self.ensure_operational()?;

        self.release_all();
        self.state.stage = 0;
        self.state.elapsed_ms = 0;
        self.apply(Event::Reset)
    }

    /// Force an actuator fully on
    pub fn activate(&mut self, pin: u8) -> Result<(), Error> {
        if !self.state.status.manual_control_allowed() {
            return Err(Error::InvalidState);
        }

        let actuator = self
            .registry
            .actuator_mut(pin)
            .ok_or(Error::InvalidArgument)?;
        actuator.act(0.0, true)?;
        Ok(())
    }

    /// Return an actuator to its idle level
    pub fn deactivate(&mut self, pin: u8) -> Result<(), Error> {
        if !self.state.status.manual_control_allowed() {
            return Err(Error::InvalidState);
        }

        self.registry
            .actuator_mut(pin)
            .ok_or(Error::InvalidArgument)?
            .deactivate();
        Ok(())
    }

    /// Run one control tick
    ///
    /// Does nothing unless brewing. Device faults skip the affected
    /// actuator and are reported in the outcome; a recipe that no longer
    /// decodes stops the controller in [`Status::Error`].
    pub fn run(&mut self) -> Result<TickOutcome, Error> {
        let mut outcome = TickOutcome::default();
        if !self.state.status.is_brewing() {
            return Ok(outcome);
        }

        self.account_time();

        let stage = match self.store.stage(self.state.stage) {
            Ok(stage) => stage,
            // Recipe was shortened under the running brew
            Err(Error::NotFound) => {
                self.finish()?;
                outcome.event = Some(TickEvent::RecipeFinished);
                return Ok(outcome);
            }
            Err(e) => {
                self.fail();
                return Err(e);
            }
        };

        let (sensor, actuator) = (
            self.registry.main_sensor_pin(),
            self.registry.main_actuator_pin(),
        );
        self.drive(sensor, actuator, stage.target, stage.tolerance, &mut outcome);

        for index in 0..stage.process_count as usize {
            let process = match self.store.control_process(stage.position, index) {
                Ok(process) => process,
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            };
            self.drive(
                process.sensor_pin,
                process.actuator_pin,
                process.target,
                process.tolerance,
                &mut outcome,
            );
        }

        if self.state.elapsed_ms >= self.duration_ms(&stage) {
            outcome.event = Some(self.advance()?);
        }

        Ok(outcome)
    }

    fn duration_ms(&self, stage: &Stage) -> u64 {
        stage.duration as u64 * u64::from(self.config.time_unit_ms)
    }

    fn drive(
        &mut self,
        sensor_pin: u8,
        actuator_pin: u8,
        target: f32,
        tolerance: f32,
        outcome: &mut TickOutcome,
    ) {
        let reading = match self.registry.sensor_mut(sensor_pin).map(|sensor| sensor.read()) {
            Some(Ok(reading)) => reading,
            Some(Err(_)) => return outcome.fault(sensor_pin, FaultKind::SensorRead),
            None => return outcome.fault(sensor_pin, FaultKind::MissingSensor),
        };

        let Some(actuator) = self.registry.actuator_mut(actuator_pin) else {
            return outcome.fault(actuator_pin, FaultKind::MissingActuator);
        };
        actuator.set_reference(target, tolerance);
        if actuator.act(reading, false).is_err() {
            outcome.fault(actuator_pin, FaultKind::ActuatorDrive);
        }
    }

    fn advance(&mut self) -> Result<TickEvent, Error> {
        self.deactivate_all();

        let next = self.state.stage + 1;
        if next >= self.store.stage_count()? {
            self.finish()?;
            return Ok(TickEvent::RecipeFinished);
        }

        #[cfg(feature = "defmt")]
        defmt::info!("stage {} -> {}", self.state.stage, next);

        self.state.stage = next;
        self.state.elapsed_ms = 0;
        self.save_state()?;
        Ok(TickEvent::StageAdvanced(next))
    }

    fn finish(&mut self) -> Result<(), Error> {
        self.release_all();
        self.state.stage = 0;
        self.state.elapsed_ms = 0;
        self.apply(Event::RecipeFinished)
    }

    // ----- Reads -----

    /// Runtime state
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Current status
    pub fn status(&self) -> Status {
        self.state.status
    }

    /// Wire code of the current status
    pub fn status_code(&self) -> u8 {
        self.state.status.code()
    }

    /// Position of the stage being brewed
    pub fn current_stage_number(&self) -> usize {
        self.state.stage
    }

    /// Target of the stage being brewed
    pub fn current_stage_target(&self) -> Result<f32, Error> {
        self.store.stage_target(self.state.stage)
    }

    /// Duration of the stage being brewed
    pub fn current_stage_duration(&self) -> Result<f32, Error> {
        self.store.stage_duration(self.state.stage)
    }

    /// Remaining time of the stage being brewed, in time units
    pub fn time_left(&self) -> Result<f32, Error> {
        let duration = self.current_stage_duration()?;
        let elapsed = self.state.elapsed_ms as f32 / self.config.time_unit_ms as f32;
        Ok((duration - elapsed).max(0.0))
    }

    /// Reading of the main sensor
    pub fn current_reading(&mut self) -> f32 {
        let pin = self.registry.main_sensor_pin();
        self.registry.sensor_reading(pin)
    }

    pub fn stage(&self, pos: usize) -> Result<Stage, Error> {
        self.store.stage(pos)
    }

    pub fn stage_target(&self, pos: usize) -> Result<f32, Error> {
        self.store.stage_target(pos)
    }

    pub fn stage_tolerance(&self, pos: usize) -> Result<f32, Error> {
        self.store.stage_tolerance(pos)
    }

    pub fn stage_duration(&self, pos: usize) -> Result<f32, Error> {
        self.store.stage_duration(pos)
    }

    pub fn stage_count(&self) -> Result<usize, Error> {
        self.store.stage_count()
    }

    pub fn process_count(&self, pos: usize) -> Result<u8, Error> {
        self.store.process_count(pos)
    }

    pub fn control_process(&self, pos: usize, index: usize) -> Result<ControlProcess, Error> {
        self.store.control_process(pos, index)
    }

    /// Free bytes in the recipe section
    pub fn memory_left(&self) -> usize {
        self.store.memory_remaining()
    }

    /// Reading of the sensor on a pin, negative infinity if unavailable
    pub fn sensor_reading(&mut self, pin: u8) -> f32 {
        self.registry.sensor_reading(pin)
    }

    pub fn is_actuator_on(&self, pin: u8) -> bool {
        self.registry.is_actuator_on(pin)
    }

    /// Wire code of the device on a pin
    pub fn device_type(&self, pin: u8) -> i8 {
        self.registry.device_type(pin)
    }

    pub fn is_pin_in_use(&self, pin: u8) -> Result<bool, Error> {
        self.registry.is_in_use(pin)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &DeviceRegistry<S, A> {
        &self.registry
    }

    /// Board-level access to the devices
    pub fn registry_mut(&mut self) -> &mut DeviceRegistry<S, A> {
        &mut self.registry
    }

    pub fn store(&self) -> &RecipeStore {
        &self.store
    }

    /// Storage device holding the region
    pub fn storage(&self) -> &E {
        &self.storage
    }

    // ----- Devices -----

    pub fn add_sensor(&mut self, pin: u8, sensor: S) -> Result<(), Error> {
        self.ensure_operational()?;
        self.registry.add_sensor(pin, sensor)
    }

    pub fn add_actuator(&mut self, pin: u8, actuator: A) -> Result<(), Error> {
        self.ensure_operational()?;
        self.registry.add_actuator(pin, actuator)
    }

    /// Unregister a device; an actuator is released first
    pub fn remove_device(&mut self, pin: u8) -> Result<Device<S, A>, Error> {
        self.ensure_operational()?;
        let mut device = self.registry.remove(pin)?;
        if let Device::Actuator(actuator) = &mut device {
            actuator.release();
        }
        Ok(device)
    }

    /// Unregister every device except the main ones
    pub fn clear_devices(&mut self) -> Result<(), Error> {
        self.ensure_operational()?;
        let (sensor, actuator) = (
            self.registry.main_sensor_pin(),
            self.registry.main_actuator_pin(),
        );
        for (pin, device) in self.registry.actuators_mut() {
            if pin != sensor && pin != actuator {
                device.release();
            }
        }
        self.registry.clear();
        Ok(())
    }

    // ----- Recipe edits -----

    fn edit<T>(&mut self, op: impl FnOnce(&mut RecipeStore) -> Result<T, Error>) -> Result<T, Error> {
        self.ensure_operational()?;
        match op(&mut self.store) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(Error::CorruptStore) => {
                self.fail();
                Err(Error::CorruptStore)
            }
            Err(e) => Err(e),
        }
    }

    fn check_pin(&self, pin: u8) -> Result<(), Error> {
        if !self.registry.pin_map().contains(pin) {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    pub fn set_stage(
        &mut self,
        pos: usize,
        duration: f32,
        target: f32,
        tolerance: f32,
    ) -> Result<(), Error> {
        self.edit(|store| store.set_stage(pos, duration, target, tolerance))
    }

    pub fn add_process(&mut self, pos: usize, process: ControlProcess) -> Result<(), Error> {
        self.check_pin(process.sensor_pin)?;
        self.check_pin(process.actuator_pin)?;
        self.edit(|store| store.add_process(pos, process))
    }

    pub fn remove_process(&mut self, pos: usize, process: ControlProcess) -> Result<(), Error> {
        self.edit(|store| store.remove_process(pos, process))
    }

    pub fn remove_stage(&mut self, pos: usize) -> Result<(), Error> {
        self.edit(|store| store.remove_stage(pos))
    }

    pub fn remove_all_stages(&mut self) -> Result<(), Error> {
        self.edit(RecipeStore::remove_all_stages)
    }

    pub fn reset_stage(&mut self, pos: usize, reset_processes: bool) -> Result<(), Error> {
        self.edit(|store| store.reset_stage(pos, reset_processes))
    }

    pub fn reset_all_stages(&mut self, reset_processes: bool) -> Result<(), Error> {
        self.edit(|store| store.reset_all_stages(reset_processes))
    }

    /// Format the whole region and rest
    ///
    /// Accepted in every state; the only way out of [`Status::Error`].
    pub fn clear_all_memory(&mut self) -> Result<(), Error> {
        self.release_all();
        self.state.stage = 0;
        self.state.elapsed_ms = 0;

        let header = self.header();
        self.store.clear(&header)?;
        self.apply(Event::MemoryCleared)
    }
}
