//! Command dispatcher
//!
//! Maps link commands onto controller operations. Every command gets exactly
//! one [`Update::CommandReturn`] first, followed by the values it asked for.

use heapless::Vec;
use mashtun_protocol::{Command, CommandCode, Link, LinkError, ParamCode, Update};

use crate::controller::Controller;
use crate::error::Error;
use crate::recipe::ControlProcess;
use crate::traits::{Actuator, Clock, Eeprom, Sensor};

/// Values sent for [`Command::UpdateAll`]
pub const UPDATE_ALL_PARAMS: [ParamCode; 8] = [
    ParamCode::Status,
    ParamCode::StageNumber,
    ParamCode::StageTarget,
    ParamCode::CurrentReading,
    ParamCode::Duration,
    ParamCode::TimeLeft,
    ParamCode::MemoryLeft,
    ParamCode::ProcessCount,
];

/// Upper bound of replies to one command
pub const MAX_REPLIES: usize = 1 + UPDATE_ALL_PARAMS.len();

/// Replies to one command, acknowledgement first
pub type Replies = Vec<Update, MAX_REPLIES>;

/// Execute one command against the controller
pub fn execute<S, A, C, E>(controller: &mut Controller<S, A, C, E>, command: Command) -> Replies
where
    S: Sensor,
    A: Actuator,
    C: Clock,
    E: Eeprom,
{
    let mut replies = Replies::new();
    let code = command.code();

    let result = match command {
        Command::Connection => None,
        Command::Request {
            param,
            stage,
            process,
        } => {
            ack(&mut replies, code, None);
            push(&mut replies, request(controller, param, stage, process));
            return replies;
        }
        Command::UpdateAll => {
            ack(&mut replies, code, None);
            for param in UPDATE_ALL_PARAMS {
                push(&mut replies, request(controller, param, 0, 0));
            }
            return replies;
        }
        Command::Start => Some(controller.start(false)),
        Command::Restart => Some(controller.start(true)),
        Command::Stop => Some(controller.stop()),
        Command::Reset => Some(controller.reset()),
        Command::Activate { pin } => Some(controller.activate(pin)),
        Command::Deactivate { pin } => Some(controller.deactivate(pin)),
        Command::SetStage {
            position,
            duration,
            target,
            tolerance,
        } => Some(controller.set_stage(position as usize, duration, target, tolerance)),
        Command::ResetStage {
            position,
            reset_processes,
        } => Some(controller.reset_stage(position as usize, reset_processes)),
        Command::ResetAllStages { reset_processes } => {
            Some(controller.reset_all_stages(reset_processes))
        }
        Command::RemoveStage { position } => Some(controller.remove_stage(position as usize)),
        Command::RemoveAllStages => Some(controller.remove_all_stages()),
        Command::AddProcess {
            position,
            sensor_pin,
            actuator_pin,
            target,
            tolerance,
        } => Some(controller.add_process(
            position as usize,
            ControlProcess::new(sensor_pin, actuator_pin, target, tolerance),
        )),
        Command::RemoveProcess {
            position,
            sensor_pin,
            actuator_pin,
            target,
            tolerance,
        } => Some(controller.remove_process(
            position as usize,
            ControlProcess::new(sensor_pin, actuator_pin, target, tolerance),
        )),
        Command::ClearMemory => Some(controller.clear_all_memory()),
    };

    #[cfg(feature = "defmt")]
    if let Some(Err(e)) = result {
        defmt::warn!("{} rejected: {}", code, e);
    }

    ack(&mut replies, code, result.map(|r| r.is_ok()));
    replies
}

fn ack(replies: &mut Replies, command: CommandCode, result: Option<bool>) {
    push(replies, Update::CommandReturn { command, result });
}

fn push(replies: &mut Replies, update: Update) {
    // Capacity covers the longest reply sequence
    let _ = replies.push(update);
}

/// Read one parameter; anything that cannot be served is [`Update::Invalid`]
pub fn request<S, A, C, E>(
    controller: &mut Controller<S, A, C, E>,
    param: ParamCode,
    stage: u16,
    process: u16,
) -> Update
where
    S: Sensor,
    A: Actuator,
    C: Clock,
    E: Eeprom,
{
    read_param(controller, param, stage as usize, process as usize).unwrap_or(Update::Invalid)
}

fn read_param<S, A, C, E>(
    controller: &mut Controller<S, A, C, E>,
    param: ParamCode,
    stage: usize,
    process: usize,
) -> Result<Update, Error>
where
    S: Sensor,
    A: Actuator,
    C: Clock,
    E: Eeprom,
{
    let current = controller.current_stage_number();

    Ok(match param {
        ParamCode::CommandReturn => return Err(Error::InvalidArgument),
        ParamCode::Status => Update::Status {
            status: controller.status_code(),
        },
        ParamCode::StageNumber => Update::StageNumber {
            stage: saturate(current),
        },
        ParamCode::StageTarget => Update::StageTarget {
            target: controller.current_stage_target()?,
        },
        ParamCode::CurrentReading => Update::CurrentReading {
            reading: controller.current_reading(),
        },
        ParamCode::Duration => Update::Duration {
            duration: controller.current_stage_duration()?,
        },
        ParamCode::TimeLeft => Update::TimeLeft {
            time_left: controller.time_left()?,
        },
        ParamCode::MemoryLeft => Update::MemoryLeft {
            bytes: saturate(controller.memory_left()),
        },
        ParamCode::ProcessCount => Update::ProcessCount {
            count: controller.process_count(current)?,
        },
        ParamCode::Process => {
            let p = controller.control_process(stage, process)?;
            Update::Process {
                sensor_pin: p.sensor_pin,
                actuator_pin: p.actuator_pin,
                target: p.target,
                tolerance: p.tolerance,
            }
        }
        ParamCode::ProcessReading => {
            let p = controller.control_process(stage, process)?;
            Update::ProcessReading {
                reading: controller.sensor_reading(p.sensor_pin),
            }
        }
    })
}

fn saturate(value: usize) -> u16 {
    value.min(u16::MAX as usize) as u16
}

/// Serve at most one pending command from the link
///
/// Returns `Ok(true)` when a command (or an undecodable line) was answered,
/// `Ok(false)` when nothing was waiting.
pub fn poll<S, A, C, E, L>(controller: &mut Controller<S, A, C, E>, link: &mut L) -> Result<bool, LinkError>
where
    S: Sensor,
    A: Actuator,
    C: Clock,
    E: Eeprom,
    L: Link,
{
    let replies = match link.try_receive() {
        None => return Ok(false),
        Some(Ok(command)) => execute(controller, command),
        Some(Err(_e)) => {
            #[cfg(feature = "defmt")]
            defmt::warn!("undecodable command: {}", _e);

            let mut replies = Replies::new();
            push(&mut replies, Update::Invalid);
            replies
        }
    };

    for update in &replies {
        link.send(update)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use mashtun_protocol::MessageError;

    use super::*;
    use crate::config::{ControllerConfig, PinMap};
    use crate::registry::DeviceRegistry;
    use crate::traits::{ActuatorError, MemEeprom, SensorError};

    const SENSOR_PIN: u8 = 26;
    const ACTUATOR_PIN: u8 = 6;

    struct FixedSensor(f32);

    impl Sensor for FixedSensor {
        fn read(&mut self) -> Result<f32, SensorError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct Switch {
        reference: f32,
        tolerance: f32,
        on: bool,
    }

    impl Actuator for Switch {
        fn set_reference(&mut self, reference: f32, tolerance: f32) {
            self.reference = reference;
            self.tolerance = tolerance;
        }

        fn reference(&self) -> f32 {
            self.reference
        }

        fn tolerance(&self) -> f32 {
            self.tolerance
        }

        fn act(&mut self, input: f32, ignore_input: bool) -> Result<(), ActuatorError> {
            self.on = ignore_input || input < self.reference;
            Ok(())
        }

        fn deactivate(&mut self) {
            self.on = false;
        }

        fn is_active(&self) -> bool {
            self.on
        }
    }

    struct StillClock(Cell<u32>);

    impl Clock for StillClock {
        fn now_ms(&self) -> u32 {
            self.0.get()
        }
    }

    /// Link fed from a fixed script, recording everything sent
    struct ScriptLink {
        inbox: Vec<Result<Command, MessageError>, 4>,
        sent: Vec<Update, 32>,
        fail_send: bool,
    }

    impl ScriptLink {
        fn new(inbox: &[Result<Command, MessageError>]) -> Self {
            Self {
                inbox: Vec::from_slice(inbox).unwrap(),
                sent: Vec::new(),
                fail_send: false,
            }
        }
    }

    impl Link for ScriptLink {
        fn send(&mut self, update: &Update) -> Result<(), LinkError> {
            if self.fail_send {
                return Err(LinkError::Busy);
            }
            self.sent.push(*update).map_err(|_| LinkError::Busy)
        }

        fn try_receive(&mut self) -> Option<Result<Command, MessageError>> {
            if self.inbox.is_empty() {
                None
            } else {
                Some(self.inbox.remove(0))
            }
        }
    }

    type TestController<'a> = Controller<FixedSensor, Switch, &'a StillClock, MemEeprom<256>>;

    fn controller(clock: &StillClock) -> TestController<'_> {
        let registry = DeviceRegistry::new(
            PinMap::default(),
            SENSOR_PIN,
            FixedSensor(61.5),
            ACTUATOR_PIN,
            Switch::default(),
        )
        .unwrap();
        Controller::new(ControllerConfig::default(), registry, clock, MemEeprom::new()).unwrap()
    }

    fn acked(replies: &Replies, command: CommandCode, result: Option<bool>) -> bool {
        replies.first() == Some(&Update::CommandReturn { command, result })
    }

    #[test]
    fn test_every_command_is_acknowledged_once() {
        let clock = StillClock(Cell::new(0));
        let mut controller = controller(&clock);

        let commands = [
            Command::Connection,
            Command::Start,
            Command::SetStage {
                position: 0,
                duration: 10.0,
                target: 65.0,
                tolerance: 1.0,
            },
            Command::Start,
            Command::Activate { pin: ACTUATOR_PIN },
            Command::Stop,
            Command::Reset,
            Command::ClearMemory,
        ];
        for command in commands {
            let replies = execute(&mut controller, command);
            let acks = replies
                .iter()
                .filter(|u| matches!(u, Update::CommandReturn { .. }))
                .count();
            assert_eq!(acks, 1, "{:?}", command);
        }
    }

    #[test]
    fn test_failures_ack_zero() {
        let clock = StillClock(Cell::new(0));
        let mut controller = controller(&clock);

        let replies = execute(&mut controller, Command::Start);
        assert!(acked(&replies, CommandCode::Start, Some(false)));

        let replies = execute(&mut controller, Command::RemoveStage { position: 3 });
        assert!(acked(&replies, CommandCode::RemoveStage, Some(false)));

        let replies = execute(&mut controller, Command::Activate { pin: ACTUATOR_PIN });
        assert!(acked(&replies, CommandCode::Activate, Some(true)));
        assert!(controller.is_actuator_on(ACTUATOR_PIN));
    }

    #[test]
    fn test_recipe_commands_edit_store() {
        let clock = StillClock(Cell::new(0));
        let mut controller = controller(&clock);

        // Fractional values do not encode
        let replies = execute(
            &mut controller,
            Command::SetStage {
                position: 0,
                duration: 30.0,
                target: 52.0,
                tolerance: 0.5,
            },
        );
        assert!(acked(&replies, CommandCode::SetStage, Some(false)));
        assert_eq!(controller.stage_count(), Ok(0));

        let replies = execute(
            &mut controller,
            Command::SetStage {
                position: 0,
                duration: 30.0,
                target: 52.0,
                tolerance: 1.0,
            },
        );
        assert!(acked(&replies, CommandCode::SetStage, Some(true)));

        let replies = execute(
            &mut controller,
            Command::AddProcess {
                position: 0,
                sensor_pin: 27,
                actuator_pin: 7,
                target: 78.0,
                tolerance: 1.0,
            },
        );
        assert!(acked(&replies, CommandCode::AddProcess, Some(true)));
        assert_eq!(controller.process_count(0), Ok(1));

        let replies = execute(
            &mut controller,
            Command::Request {
                param: ParamCode::Process,
                stage: 0,
                process: 0,
            },
        );
        assert_eq!(
            replies.as_slice(),
            &[
                Update::CommandReturn {
                    command: CommandCode::Request,
                    result: None
                },
                Update::Process {
                    sensor_pin: 27,
                    actuator_pin: 7,
                    target: 78.0,
                    tolerance: 1.0
                },
            ]
        );

        let replies = execute(&mut controller, Command::RemoveAllStages);
        assert!(acked(&replies, CommandCode::RemoveAllStages, Some(true)));
        assert_eq!(controller.stage_count(), Ok(0));
    }

    #[test]
    fn test_update_all() {
        let clock = StillClock(Cell::new(0));
        let mut controller = controller(&clock);
        controller.set_stage(0, 10.0, 65.0, 1.0).unwrap();

        let replies = execute(&mut controller, Command::UpdateAll);
        assert_eq!(replies.len(), MAX_REPLIES);
        assert!(acked(&replies, CommandCode::UpdateAll, None));
        assert_eq!(replies[1], Update::Status { status: 0 });
        assert_eq!(replies[2], Update::StageNumber { stage: 0 });
        assert_eq!(replies[3], Update::StageTarget { target: 65.0 });
        assert_eq!(replies[4], Update::CurrentReading { reading: 61.5 });
        assert_eq!(replies[5], Update::Duration { duration: 10.0 });
        assert_eq!(replies[6], Update::TimeLeft { time_left: 10.0 });
        assert_eq!(replies[8], Update::ProcessCount { count: 0 });
    }

    #[test]
    fn test_unservable_request_is_invalid() {
        let clock = StillClock(Cell::new(0));
        let mut controller = controller(&clock);

        let replies = execute(
            &mut controller,
            Command::Request {
                param: ParamCode::StageTarget,
                stage: 0,
                process: 0,
            },
        );
        assert_eq!(replies[1], Update::Invalid);

        let replies = execute(
            &mut controller,
            Command::Request {
                param: ParamCode::CommandReturn,
                stage: 0,
                process: 0,
            },
        );
        assert_eq!(replies[1], Update::Invalid);
    }

    #[test]
    fn test_poll_serves_one_command() {
        let clock = StillClock(Cell::new(0));
        let mut controller = controller(&clock);
        let mut link = ScriptLink::new(&[
            Err(MessageError::UnknownCode),
            Ok(Command::Connection),
        ]);

        assert_eq!(poll(&mut controller, &mut link), Ok(true));
        assert_eq!(link.sent.as_slice(), &[Update::Invalid]);

        assert_eq!(poll(&mut controller, &mut link), Ok(true));
        assert_eq!(link.sent.len(), 2);
        assert_eq!(
            link.sent[1],
            Update::CommandReturn {
                command: CommandCode::Connection,
                result: None
            }
        );

        assert_eq!(poll(&mut controller, &mut link), Ok(false));
    }

    #[test]
    fn test_poll_reports_send_failure() {
        let clock = StillClock(Cell::new(0));
        let mut controller = controller(&clock);
        let mut link = ScriptLink::new(&[Ok(Command::Restart)]);
        link.fail_send = true;

        assert_eq!(poll(&mut controller, &mut link), Err(LinkError::Busy));
    }
}
