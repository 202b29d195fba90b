//! Recipe record layout
//!
//! ```text
//! stage    [STAGE_START][duration][target][tolerance][NO_EXTRA_PROCESSES]
//!          [STAGE_START][duration][target][tolerance][EXTRA_PROCESSES][count][process]...
//! process  [sensor pin][target][tolerance][actuator pin]
//! recipe   [stage]...[RECIPE_END]
//! ```

use heapless::Vec;

use crate::codec::{self, CodecError, MAX_LITERAL};

/// First byte of every stage record
pub const STAGE_START: u8 = 252;

/// Stage is followed by a process count and that many processes
pub const EXTRA_PROCESSES: u8 = 253;

/// Stage has no extra processes
pub const NO_EXTRA_PROCESSES: u8 = 254;

/// Terminator of the recipe section
pub const RECIPE_END: u8 = 255;

/// Most extra processes one stage can carry
pub const MAX_PROCESSES_PER_STAGE: u8 = MAX_LITERAL;

/// Longest encoded stage header: marker plus three values
const MAX_HEADER_LEN: usize = 1 + 3 * codec::MAX_ENCODED_LEN;

/// Encoded stage header or process (a process never exceeds a header)
pub type Record = Vec<u8, MAX_HEADER_LEN>;

/// One recipe phase
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stage {
    /// Position in the recipe (0-based)
    pub position: usize,
    /// Duration in time units
    pub duration: f32,
    /// Target value of the main sensor
    pub target: f32,
    /// Accepted deviation from the target
    pub tolerance: f32,
    /// Number of extra control processes
    pub process_count: u8,
}

/// Extra sensor/actuator pair attached to a stage
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlProcess {
    /// Pin of the sensor read each tick
    pub sensor_pin: u8,
    /// Pin of the actuator fed with the reading
    pub actuator_pin: u8,
    /// Target value
    pub target: f32,
    /// Accepted deviation from the target
    pub tolerance: f32,
}

impl ControlProcess {
    /// Create a control process
    pub const fn new(sensor_pin: u8, actuator_pin: u8, target: f32, tolerance: f32) -> Self {
        Self {
            sensor_pin,
            actuator_pin,
            target,
            tolerance,
        }
    }
}

/// Byte boundaries of one stage record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StageSpan {
    /// Address of the stage start marker
    pub start: usize,
    /// Address of the process marker
    pub marker: usize,
    /// Address of the first process
    pub processes: usize,
    /// One past the last byte of the record
    pub end: usize,
    /// Number of extra processes
    pub process_count: u8,
}

impl StageSpan {
    pub fn contains(&self, addr: usize) -> bool {
        (self.start..self.end).contains(&addr)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

fn push_value(out: &mut Record, value: f32) -> Result<(), CodecError> {
    let encoded = codec::encode(value)?;
    out.extend_from_slice(&encoded)
        .map_err(|_| CodecError::Unencodable)
}

fn check_pin(pin: u8) -> Result<(), CodecError> {
    if pin > MAX_LITERAL {
        return Err(CodecError::Unencodable);
    }
    Ok(())
}

/// Encode the start marker and scalar fields of a stage
pub fn encode_stage_header(duration: f32, target: f32, tolerance: f32) -> Result<Record, CodecError> {
    let mut out = Record::new();
    out.push(STAGE_START).map_err(|_| CodecError::Unencodable)?;
    push_value(&mut out, duration)?;
    push_value(&mut out, target)?;
    push_value(&mut out, tolerance)?;
    Ok(out)
}

/// Encode the process marker for `count` processes
pub fn encode_marker(count: u8) -> Vec<u8, 2> {
    let mut out = Vec::new();
    // Two pushes into a capacity of two
    if count == 0 {
        let _ = out.push(NO_EXTRA_PROCESSES);
    } else {
        let _ = out.push(EXTRA_PROCESSES);
        let _ = out.push(count.min(MAX_PROCESSES_PER_STAGE));
    }
    out
}

/// Encode one control process
pub fn encode_process(process: &ControlProcess) -> Result<Record, CodecError> {
    check_pin(process.sensor_pin)?;
    check_pin(process.actuator_pin)?;

    let mut out = Record::new();
    out.push(process.sensor_pin)
        .map_err(|_| CodecError::Unencodable)?;
    push_value(&mut out, process.target)?;
    push_value(&mut out, process.tolerance)?;
    out.push(process.actuator_pin)
        .map_err(|_| CodecError::Unencodable)?;
    Ok(out)
}

/// Decode the stage record starting at `addr`
pub(crate) fn parse_stage(
    bytes: &[u8],
    addr: usize,
    position: usize,
) -> Result<(Stage, StageSpan), CodecError> {
    if bytes.get(addr) != Some(&STAGE_START) {
        return Err(CodecError::Corrupt);
    }

    let mut pos = addr + 1;
    let (duration, len) = codec::decode(bytes, pos)?;
    pos += len;
    let (target, len) = codec::decode(bytes, pos)?;
    pos += len;
    let (tolerance, len) = codec::decode(bytes, pos)?;
    pos += len;

    let marker = pos;
    let process_count = match bytes.get(marker) {
        Some(&NO_EXTRA_PROCESSES) => {
            pos += 1;
            0
        }
        Some(&EXTRA_PROCESSES) => {
            let (count, len) = codec::decode_u8(bytes, marker + 1)?;
            if count == 0 {
                return Err(CodecError::Corrupt);
            }
            pos += 1 + len;
            count
        }
        _ => return Err(CodecError::Corrupt),
    };

    let processes = pos;
    for _ in 0..process_count {
        let (_, len) = parse_process(bytes, pos)?;
        pos += len;
    }

    let stage = Stage {
        position,
        duration,
        target,
        tolerance,
        process_count,
    };
    let span = StageSpan {
        start: addr,
        marker,
        processes,
        end: pos,
        process_count,
    };

    Ok((stage, span))
}

/// Decode the process starting at `addr`
pub(crate) fn parse_process(bytes: &[u8], addr: usize) -> Result<(ControlProcess, usize), CodecError> {
    let mut pos = addr;
    let (sensor_pin, len) = codec::decode_u8(bytes, pos)?;
    pos += len;
    let (target, len) = codec::decode(bytes, pos)?;
    pos += len;
    let (tolerance, len) = codec::decode(bytes, pos)?;
    pos += len;
    let (actuator_pin, len) = codec::decode_u8(bytes, pos)?;
    pos += len;

    Ok((
        ControlProcess::new(sensor_pin, actuator_pin, target, tolerance),
        pos - addr,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_without_processes() {
        let mut bytes = encode_stage_header(10.0, 65.0, 1.0).unwrap();
        bytes.extend_from_slice(&encode_marker(0)).unwrap();
        assert_eq!(bytes.as_slice(), &[252, 10, 65, 1, 254]);

        let (stage, span) = parse_stage(&bytes, 0, 0).unwrap();
        assert_eq!(stage.duration, 10.0);
        assert_eq!(stage.target, 65.0);
        assert_eq!(stage.process_count, 0);
        assert_eq!(span.marker, 4);
        assert_eq!(span.end, 5);
    }

    #[test]
    fn test_stage_with_process() {
        let bytes = [252, 10, 251, 1, 251, 1, 253, 1, 5, 70, 2, 6, 255];
        let (stage, span) = parse_stage(&bytes, 0, 3).unwrap();
        assert_eq!(stage.position, 3);
        assert_eq!(stage.target, 250.0);
        assert_eq!(stage.process_count, 1);
        assert_eq!(span.processes, 8);
        assert_eq!(span.end, 12);

        let (process, len) = parse_process(&bytes, span.processes).unwrap();
        assert_eq!(process, ControlProcess::new(5, 6, 70.0, 2.0));
        assert_eq!(len, 4);
    }

    #[test]
    fn test_encode_process_layout() {
        let bytes = encode_process(&ControlProcess::new(5, 6, 300.0, 2.0)).unwrap();
        assert_eq!(bytes.as_slice(), &[5, 251, 1, 50, 251, 2, 6]);
    }

    #[test]
    fn test_corrupt_stage_records() {
        // Missing start marker
        assert!(parse_stage(&[10, 65, 1, 254], 0, 0).is_err());
        // Process marker with zero count
        assert!(parse_stage(&[252, 10, 65, 1, 253, 0], 0, 0).is_err());
        // Unknown marker
        assert!(parse_stage(&[252, 10, 65, 1, 7], 0, 0).is_err());
        // Process list cut short by the terminator
        assert!(parse_stage(&[252, 10, 65, 1, 253, 1, 5, 255], 0, 0).is_err());
    }

    #[test]
    fn test_unencodable_pin() {
        let process = ControlProcess::new(250, 6, 70.0, 2.0);
        assert_eq!(encode_process(&process), Err(CodecError::Unencodable));
    }
}
