//! Incremental RESP Protocol Parser
//!
//! The parser works over an accumulated byte buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the message is incomplete
//! - `Err(ParseError)` - Invalid protocol data
//!
//! The connection layer appends network reads to its buffer, calls `parse()`,
//! advances by `consumed` on success, reads more on `None`, and answers with
//! an error reply on `Err` before skipping past the offending line.
//!
//! ## Leniency
//!
//! Lines end at `\n`. A `\r` immediately before it is stripped, so a line sent
//! with a bare `\n` terminator is accepted as if it ended in `\r\n`. Bulk string
//! payloads are followed by two terminator bytes that are skipped without
//! inspection, and payload text that is not valid UTF-8 is replaced later when
//! it is rendered as a token, never rejected here.

use crate::protocol::types::{prefix, RespValue};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Leading byte is not one of the five RESP prefixes
    #[error("Protocol error: unknown RESP type byte {0:#04x}")]
    UnknownPrefix(u8),

    /// A length, count or integer line that is not a base-10 integer
    #[error("Protocol error: invalid integer {0:?}")]
    InvalidInteger(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("Protocol error: invalid bulk length {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("Protocol error: invalid multibulk length {0}")]
    InvalidArrayLength(i64),

    /// The peer sent an error frame; its text is carried through
    #[error("{0}")]
    ErrorFrame(String),

    /// Arrays nested deeper than [`MAX_NESTING_DEPTH`]
    #[error("Protocol error: maximum nesting depth of {0} exceeded")]
    TooDeep(usize),

    /// The message exceeds maximum allowed size
    #[error("Protocol error: bulk string too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (16 MB)
pub const MAX_BULK_SIZE: usize = 16 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental RESP protocol parser.
///
/// # Example
///
/// ```
/// use flintkv::protocol::{RespParser, RespValue};
///
/// let mut parser = RespParser::new();
/// let buffer = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
///
/// let (value, consumed) = parser.parse(buffer).unwrap().unwrap();
/// assert_eq!(consumed, buffer.len());
/// assert_eq!(value.into_tokens(), vec!["GET", "name"]);
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP frame from the start of the buffer.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    /// Internal recursive parsing function.
    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::TooDeep(MAX_NESTING_DEPTH));
        }

        match buf[0] {
            prefix::ARRAY => self.parse_array(buf),
            prefix::BULK_STRING => parse_bulk_string(buf),
            prefix::SIMPLE_STRING => parse_simple_string(buf),
            prefix::INTEGER => parse_integer(buf),
            prefix::ERROR => parse_error(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let (count, mut consumed) = match parse_header(buf)? {
            Some(header) => header,
            None => return Ok(None),
        };

        if count == -1 {
            return Ok(Some((RespValue::NullArray, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // Cap the preallocation; the count comes from the peer.
        let mut elements = Vec::with_capacity(count.min(1024));

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => {
                    self.depth -= 1;
                    return Ok(None);
                }
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(elements), consumed)))
    }
}

/// Parses a bulk string: `$<length>\r\n<data>\r\n`
fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let (length, data_start) = match parse_header(buf)? {
        Some(header) => header,
        None => return Ok(None),
    };

    if length == -1 {
        return Ok(Some((RespValue::Null, data_start)));
    }
    if length < 0 {
        return Err(ParseError::InvalidBulkLength(length));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    // Payload plus its two terminator bytes, which are dropped unchecked
    let total_needed = data_start + length + 2;
    if buf.len() < total_needed {
        return Ok(None);
    }

    let data = Bytes::copy_from_slice(&buf[data_start..data_start + length]);
    Ok(Some((RespValue::BulkString(data), total_needed)))
}

/// Parses a simple string: `+<string>\r\n`
fn parse_simple_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    Ok(read_line(&buf[1..]).map(|(content, consumed)| {
        let text = String::from_utf8_lossy(content).into_owned();
        (RespValue::SimpleString(text), 1 + consumed)
    }))
}

/// Parses an integer: `:<integer>\r\n`
fn parse_integer(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    Ok(parse_header(buf)?.map(|(n, consumed)| (RespValue::Integer(n), consumed)))
}

/// Reads an error line: `-<error message>\r\n`
///
/// Clients have no business sending errors, so the frame surfaces as a
/// protocol error carrying the peer's text.
fn parse_error(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    match read_line(&buf[1..]) {
        Some((content, _)) => Err(ParseError::ErrorFrame(
            String::from_utf8_lossy(content).into_owned(),
        )),
        None => Ok(None),
    }
}

/// Reads the integer line that follows a prefix byte.
///
/// Returns the integer and the bytes consumed, prefix included.
fn parse_header(buf: &[u8]) -> ParseResult<Option<(i64, usize)>> {
    let (content, consumed) = match read_line(&buf[1..]) {
        Some(line) => line,
        None => return Ok(None),
    };

    let text = String::from_utf8_lossy(content);
    let n = text
        .trim()
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))?;

    Ok(Some((n, 1 + consumed)))
}

/// Finds the next line in the buffer.
///
/// Returns the line content (without terminator) and the number of bytes
/// consumed including the terminator. A missing `\r` before `\n` is tolerated.
#[inline]
fn read_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let newline = buf.iter().position(|&b| b == b'\n')?;
    let content = buf[..newline].strip_suffix(b"\r").unwrap_or(&buf[..newline]);
    Some((content, newline + 1))
}

/// Returns how many bytes to drop after a parse error so that the next
/// parse starts on a fresh line: through the next `\n`, or everything
/// buffered if there is none yet.
pub fn error_skip_len(buf: &[u8]) -> usize {
    buf.iter()
        .position(|&b| b == b'\n')
        .map_or(buf.len(), |newline| newline + 1)
}

/// Helper function to parse a single RESP message from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
