//! Line framing
//!
//! Line format:
//! - CODE: integer command or parameter code (`-1` = invalid)
//! - FIELDS: up to [`MAX_FIELDS`] decimal numbers, each preceded by `|`
//! - END: `\n` (a `\r` anywhere on the line is ignored)
//!
//! ```text
//! 9|0|60|65|1\n
//! ```

use core::fmt::{self, Write};

use heapless::{String, Vec};

/// Separator between the code and each field
pub const FIELD_SEPARATOR: u8 = b'|';

/// Line terminator
pub const LINE_END: u8 = b'\n';

/// Maximum number of fields after the code
pub const MAX_FIELDS: usize = 5;

/// Maximum line length in bytes, terminator excluded
pub const MAX_LINE_LEN: usize = 128;

/// Code marking an invalid command or reply
pub const INVALID_CODE: i8 = -1;

/// Errors that can occur during line parsing or encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineError {
    /// Line exceeds [`MAX_LINE_LEN`]
    TooLong,
    /// More than [`MAX_FIELDS`] fields
    TooManyFields,
    /// Code or field is not a number
    InvalidNumber,
    /// Nothing between two separators
    EmptyField,
    /// Encoded line does not fit the buffer
    BufferTooSmall,
}

/// A parsed or constructed line
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Command or parameter code
    pub code: i8,
    /// Numeric fields
    pub fields: Vec<f32, MAX_FIELDS>,
}

impl Line {
    /// Create a line with the given code and fields
    pub fn new(code: i8, fields: &[f32]) -> Result<Self, LineError> {
        Ok(Self {
            code,
            fields: Vec::from_slice(fields).map_err(|_| LineError::TooManyFields)?,
        })
    }

    /// Create a line with no fields
    pub fn empty(code: i8) -> Self {
        Self {
            code,
            fields: Vec::new(),
        }
    }

    /// Field at `index`, if present
    pub fn field(&self, index: usize) -> Option<f32> {
        self.fields.get(index).copied()
    }

    /// Parse a line without its terminator
    pub fn parse(text: &[u8]) -> Result<Self, LineError> {
        let text = core::str::from_utf8(text).map_err(|_| LineError::InvalidNumber)?;
        // An empty part is an error, never skipped: later fields would slide
        // into the wrong positions
        let mut parts = text.split(FIELD_SEPARATOR as char).map(|part| part.trim());

        let code = parts.next().ok_or(LineError::InvalidNumber)?;
        let code = parse_code(code)?;

        let mut fields = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(LineError::EmptyField);
            }
            let value = part.parse::<f32>().map_err(|_| LineError::InvalidNumber)?;
            fields.push(value).map_err(|_| LineError::TooManyFields)?;
        }

        Ok(Self { code, fields })
    }

    /// Encode this line, terminator included
    pub fn encode(&self) -> Result<String<{ MAX_LINE_LEN + 1 }>, LineError> {
        let mut out = String::new();
        writeln!(out, "{}", self).map_err(|_| LineError::BufferTooSmall)?;
        Ok(out)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        for field in &self.fields {
            write!(f, "|{}", field)?;
        }
        Ok(())
    }
}

fn parse_code(text: &str) -> Result<i8, LineError> {
    if let Ok(code) = text.parse::<i8>() {
        return Ok(code);
    }

    // Senders that print every number as a float ("3.0")
    let value = text.parse::<f32>().map_err(|_| LineError::InvalidNumber)?;
    let code = value as i8;
    if code as f32 != value {
        return Err(LineError::InvalidNumber);
    }
    Ok(code)
}

/// Accumulates bytes into lines
#[derive(Debug, Clone, Default)]
pub struct LineParser {
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflow: bool,
}

impl LineParser {
    /// Create a new line parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.overflow = false;
    }

    /// Feed a single byte to the parser
    ///
    /// Returns `Ok(Some(line))` when a complete line is parsed, `Ok(None)`
    /// when more bytes are needed or the line was blank, or `Err` when the
    /// finished line was malformed.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Line>, LineError> {
        match byte {
            LINE_END => {
                let result = if self.overflow {
                    Err(LineError::TooLong)
                } else if self.buffer.iter().all(u8::is_ascii_whitespace) {
                    Ok(None)
                } else {
                    Line::parse(&self.buffer).map(Some)
                };
                self.reset();
                result
            }
            b'\r' => Ok(None),
            _ => {
                if self.buffer.push(byte).is_err() {
                    // Discard until the terminator
                    self.overflow = true;
                }
                Ok(None)
            }
        }
    }

    /// Feed multiple bytes to the parser
    ///
    /// Returns the first complete line found, if any.
    /// Remaining bytes after a complete line are not consumed.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Result<Option<Line>, LineError> {
        for &byte in bytes {
            if let Some(line) = self.feed(byte)? {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }
}
