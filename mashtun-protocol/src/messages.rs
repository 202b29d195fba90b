//! Message types for the brewing controller link
//!
//! Message types are divided into two categories:
//! - App → Controller: commands ([`Command`])
//! - Controller → App: acknowledgements and values ([`Update`])
//!
//! Both travel as [`Line`]s; booleans are sent as `0`/`1`.

use crate::line::{Line, LineError, INVALID_CODE, MAX_FIELDS};

/// Command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i8)]
pub enum CommandCode {
    Connection = 0,
    Request = 1,
    UpdateAll = 2,
    Start = 3,
    Restart = 4,
    Stop = 5,
    Reset = 6,
    Activate = 7,
    Deactivate = 8,
    SetStage = 9,
    ResetStage = 10,
    ResetAllStages = 11,
    RemoveStage = 12,
    RemoveAllStages = 13,
    AddProcess = 14,
    RemoveProcess = 15,
    ClearMemory = 16,
}

impl CommandCode {
    /// Wire code
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// Command code from its wire code
    pub const fn from_code(code: i8) -> Option<Self> {
        use CommandCode::*;

        Some(match code {
            0 => Connection,
            1 => Request,
            2 => UpdateAll,
            3 => Start,
            4 => Restart,
            5 => Stop,
            6 => Reset,
            7 => Activate,
            8 => Deactivate,
            9 => SetStage,
            10 => ResetStage,
            11 => ResetAllStages,
            12 => RemoveStage,
            13 => RemoveAllStages,
            14 => AddProcess,
            15 => RemoveProcess,
            16 => ClearMemory,
            _ => return None,
        })
    }
}

/// Parameter codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i8)]
pub enum ParamCode {
    CommandReturn = 0,
    Status = 1,
    StageNumber = 2,
    StageTarget = 3,
    CurrentReading = 4,
    Duration = 5,
    TimeLeft = 6,
    MemoryLeft = 7,
    ProcessCount = 8,
    Process = 9,
    ProcessReading = 10,
}

impl ParamCode {
    /// Wire code
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// Parameter code from its wire code
    pub const fn from_code(code: i8) -> Option<Self> {
        use ParamCode::*;

        Some(match code {
            0 => CommandReturn,
            1 => Status,
            2 => StageNumber,
            3 => StageTarget,
            4 => CurrentReading,
            5 => Duration,
            6 => TimeLeft,
            7 => MemoryLeft,
            8 => ProcessCount,
            9 => Process,
            10 => ProcessReading,
            _ => return None,
        })
    }
}

/// Errors that can occur while decoding a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    /// Line framing failed
    Line(LineError),
    /// Code is not a known command or parameter
    UnknownCode,
    /// Required field missing
    MissingField,
    /// Field out of range for its meaning
    InvalidField,
}

impl From<LineError> for MessageError {
    fn from(e: LineError) -> Self {
        MessageError::Line(e)
    }
}

/// Commands sent to the controller
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Link handshake
    Connection,
    /// Ask for one parameter; `stage`/`process` select a control process
    Request {
        param: ParamCode,
        stage: u16,
        process: u16,
    },
    /// Ask for every status parameter
    UpdateAll,
    Start,
    Restart,
    Stop,
    Reset,
    Activate {
        pin: u8,
    },
    Deactivate {
        pin: u8,
    },
    SetStage {
        position: u16,
        duration: f32,
        target: f32,
        tolerance: f32,
    },
    ResetStage {
        position: u16,
        reset_processes: bool,
    },
    ResetAllStages {
        reset_processes: bool,
    },
    RemoveStage {
        position: u16,
    },
    RemoveAllStages,
    AddProcess {
        position: u16,
        sensor_pin: u8,
        actuator_pin: u8,
        target: f32,
        tolerance: f32,
    },
    RemoveProcess {
        position: u16,
        sensor_pin: u8,
        actuator_pin: u8,
        target: f32,
        tolerance: f32,
    },
    /// Format the recipe memory
    ClearMemory,
}

fn field(line: &Line, index: usize) -> Result<f32, MessageError> {
    line.field(index).ok_or(MessageError::MissingField)
}

fn whole(value: f32, max: f32) -> Result<f32, MessageError> {
    if !(0.0..=max).contains(&value) || value != (value as u32) as f32 {
        return Err(MessageError::InvalidField);
    }
    Ok(value)
}

fn pin(line: &Line, index: usize) -> Result<u8, MessageError> {
    Ok(whole(field(line, index)?, u8::MAX as f32)? as u8)
}

fn position(line: &Line, index: usize) -> Result<u16, MessageError> {
    Ok(whole(field(line, index)?, u16::MAX as f32)? as u16)
}

fn flag(line: &Line, index: usize) -> Result<bool, MessageError> {
    match field(line, index)? {
        v if v == 0.0 => Ok(false),
        v if v == 1.0 => Ok(true),
        _ => Err(MessageError::InvalidField),
    }
}

fn optional_position(line: &Line, index: usize) -> Result<u16, MessageError> {
    match line.field(index) {
        Some(_) => position(line, index),
        None => Ok(0),
    }
}

// No message carries more than MAX_FIELDS fields
fn line(code: i8, fields: &[f32]) -> Line {
    Line::new(code, fields).unwrap_or_else(|_| Line::empty(code))
}

fn bool_field(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl Command {
    /// Command code
    pub fn code(&self) -> CommandCode {
        match self {
            Command::Connection => CommandCode::Connection,
            Command::Request { .. } => CommandCode::Request,
            Command::UpdateAll => CommandCode::UpdateAll,
            Command::Start => CommandCode::Start,
            Command::Restart => CommandCode::Restart,
            Command::Stop => CommandCode::Stop,
            Command::Reset => CommandCode::Reset,
            Command::Activate { .. } => CommandCode::Activate,
            Command::Deactivate { .. } => CommandCode::Deactivate,
            Command::SetStage { .. } => CommandCode::SetStage,
            Command::ResetStage { .. } => CommandCode::ResetStage,
            Command::ResetAllStages { .. } => CommandCode::ResetAllStages,
            Command::RemoveStage { .. } => CommandCode::RemoveStage,
            Command::RemoveAllStages => CommandCode::RemoveAllStages,
            Command::AddProcess { .. } => CommandCode::AddProcess,
            Command::RemoveProcess { .. } => CommandCode::RemoveProcess,
            Command::ClearMemory => CommandCode::ClearMemory,
        }
    }

    /// Parse a command from a line
    ///
    /// Fields a command does not use are ignored.
    pub fn from_line(line: &Line) -> Result<Self, MessageError> {
        let code = CommandCode::from_code(line.code).ok_or(MessageError::UnknownCode)?;

        Ok(match code {
            CommandCode::Connection => Command::Connection,
            CommandCode::Request => {
                let param = field(line, 0)?;
                let param = ParamCode::from_code(whole(param, i8::MAX as f32)? as i8)
                    .ok_or(MessageError::InvalidField)?;
                Command::Request {
                    param,
                    stage: optional_position(line, 1)?,
                    process: optional_position(line, 2)?,
                }
            }
            CommandCode::UpdateAll => Command::UpdateAll,
            CommandCode::Start => Command::Start,
            CommandCode::Restart => Command::Restart,
            CommandCode::Stop => Command::Stop,
            CommandCode::Reset => Command::Reset,
            CommandCode::Activate => Command::Activate { pin: pin(line, 0)? },
            CommandCode::Deactivate => Command::Deactivate { pin: pin(line, 0)? },
            CommandCode::SetStage => Command::SetStage {
                position: position(line, 0)?,
                duration: field(line, 1)?,
                target: field(line, 2)?,
                tolerance: field(line, 3)?,
            },
            CommandCode::ResetStage => Command::ResetStage {
                position: position(line, 0)?,
                reset_processes: flag(line, 1)?,
            },
            CommandCode::ResetAllStages => Command::ResetAllStages {
                reset_processes: flag(line, 0)?,
            },
            CommandCode::RemoveStage => Command::RemoveStage {
                position: position(line, 0)?,
            },
            CommandCode::RemoveAllStages => Command::RemoveAllStages,
            CommandCode::AddProcess => Command::AddProcess {
                position: position(line, 0)?,
                sensor_pin: pin(line, 1)?,
                actuator_pin: pin(line, 2)?,
                target: field(line, 3)?,
                tolerance: field(line, 4)?,
            },
            CommandCode::RemoveProcess => Command::RemoveProcess {
                position: position(line, 0)?,
                sensor_pin: pin(line, 1)?,
                actuator_pin: pin(line, 2)?,
                target: field(line, 3)?,
                tolerance: field(line, 4)?,
            },
            CommandCode::ClearMemory => Command::ClearMemory,
        })
    }

    /// Encode this command into a line (for host tools or simulation)
    pub fn to_line(&self) -> Line {
        let code = self.code().code();
        match *self {
            Command::Request {
                param,
                stage,
                process,
            } => line(code, &[param.code() as f32, stage as f32, process as f32]),
            Command::Activate { pin } | Command::Deactivate { pin } => line(code, &[pin as f32]),
            Command::SetStage {
                position,
                duration,
                target,
                tolerance,
            } => line(code, &[position as f32, duration, target, tolerance]),
            Command::ResetStage {
                position,
                reset_processes,
            } => line(code, &[position as f32, bool_field(reset_processes)]),
            Command::ResetAllStages { reset_processes } => {
                line(code, &[bool_field(reset_processes)])
            }
            Command::RemoveStage { position } => line(code, &[position as f32]),
            Command::AddProcess {
                position,
                sensor_pin,
                actuator_pin,
                target,
                tolerance,
            }
            | Command::RemoveProcess {
                position,
                sensor_pin,
                actuator_pin,
                target,
                tolerance,
            } => line(
                code,
                &[
                    position as f32,
                    sensor_pin as f32,
                    actuator_pin as f32,
                    target,
                    tolerance,
                ],
            ),
            _ => Line::empty(code),
        }
    }
}

/// Messages sent by the controller
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Update {
    /// Acknowledgement of a command; `result` is `None` for commands
    /// without a success value
    CommandReturn {
        command: CommandCode,
        result: Option<bool>,
    },
    Status {
        status: u8,
    },
    StageNumber {
        stage: u16,
    },
    StageTarget {
        target: f32,
    },
    CurrentReading {
        reading: f32,
    },
    /// Duration of the current stage in time units
    Duration {
        duration: f32,
    },
    /// Remaining time of the current stage in time units
    TimeLeft {
        time_left: f32,
    },
    /// Free recipe memory in bytes
    MemoryLeft {
        bytes: u16,
    },
    ProcessCount {
        count: u8,
    },
    Process {
        sensor_pin: u8,
        actuator_pin: u8,
        target: f32,
        tolerance: f32,
    },
    ProcessReading {
        reading: f32,
    },
    /// Reply to a command or request that could not be served
    Invalid,
}

impl Update {
    /// Parameter code, `None` for [`Update::Invalid`]
    pub fn param(&self) -> Option<ParamCode> {
        Some(match self {
            Update::CommandReturn { .. } => ParamCode::CommandReturn,
            Update::Status { .. } => ParamCode::Status,
            Update::StageNumber { .. } => ParamCode::StageNumber,
            Update::StageTarget { .. } => ParamCode::StageTarget,
            Update::CurrentReading { .. } => ParamCode::CurrentReading,
            Update::Duration { .. } => ParamCode::Duration,
            Update::TimeLeft { .. } => ParamCode::TimeLeft,
            Update::MemoryLeft { .. } => ParamCode::MemoryLeft,
            Update::ProcessCount { .. } => ParamCode::ProcessCount,
            Update::Process { .. } => ParamCode::Process,
            Update::ProcessReading { .. } => ParamCode::ProcessReading,
            Update::Invalid => return None,
        })
    }

    /// Encode this update into a line
    pub fn to_line(&self) -> Line {
        let code = self.param().map_or(INVALID_CODE, ParamCode::code);

        match *self {
            Update::CommandReturn { command, result } => line(
                code,
                &[command.code() as f32, result.map_or(-1.0, bool_field)],
            ),
            Update::Status { status } => line(code, &[status as f32]),
            Update::StageNumber { stage } => line(code, &[stage as f32]),
            Update::StageTarget { target } => line(code, &[target]),
            Update::CurrentReading { reading } | Update::ProcessReading { reading } => {
                line(code, &[reading])
            }
            Update::Duration { duration } => line(code, &[duration]),
            Update::TimeLeft { time_left } => line(code, &[time_left]),
            Update::MemoryLeft { bytes } => line(code, &[bytes as f32]),
            Update::ProcessCount { count } => line(code, &[count as f32]),
            Update::Process {
                sensor_pin,
                actuator_pin,
                target,
                tolerance,
            } => line(
                code,
                &[sensor_pin as f32, actuator_pin as f32, target, tolerance],
            ),
            Update::Invalid => line(code, &[INVALID_CODE as f32; MAX_FIELDS]),
        }
    }

    /// Parse an update from a line (for host tools or simulation)
    pub fn from_line(line: &Line) -> Result<Self, MessageError> {
        if line.code == INVALID_CODE {
            return Ok(Update::Invalid);
        }
        let param = ParamCode::from_code(line.code).ok_or(MessageError::UnknownCode)?;

        Ok(match param {
            ParamCode::CommandReturn => {
                let command = whole(field(line, 0)?, i8::MAX as f32)? as i8;
                Update::CommandReturn {
                    command: CommandCode::from_code(command).ok_or(MessageError::InvalidField)?,
                    result: match field(line, 1)? {
                        v if v < 0.0 => None,
                        _ => Some(flag(line, 1)?),
                    },
                }
            }
            ParamCode::Status => Update::Status { status: pin(line, 0)? },
            ParamCode::StageNumber => Update::StageNumber {
                stage: position(line, 0)?,
            },
            ParamCode::StageTarget => Update::StageTarget {
                target: field(line, 0)?,
            },
            ParamCode::CurrentReading => Update::CurrentReading {
                reading: field(line, 0)?,
            },
            ParamCode::Duration => Update::Duration {
                duration: field(line, 0)?,
            },
            ParamCode::TimeLeft => Update::TimeLeft {
                time_left: field(line, 0)?,
            },
            ParamCode::MemoryLeft => Update::MemoryLeft {
                bytes: position(line, 0)?,
            },
            ParamCode::ProcessCount => Update::ProcessCount {
                count: pin(line, 0)?,
            },
            ParamCode::Process => Update::Process {
                sensor_pin: pin(line, 0)?,
                actuator_pin: pin(line, 1)?,
                target: field(line, 2)?,
                tolerance: field(line, 3)?,
            },
            ParamCode::ProcessReading => Update::ProcessReading {
                reading: field(line, 0)?,
            },
        })
    }
}
