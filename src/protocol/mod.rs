//! RESP Protocol Implementation
//!
//! The wire codec: reply serialization and incremental frame decoding.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental parser for inbound frames
//!
//! ## Example
//!
//! ```
//! use flintkv::protocol::{parse_message, RespValue};
//!
//! // Parsing incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! // Creating responses
//! let response = RespValue::from(Some("Ariz"));
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{
    error_skip_len, parse_message, ParseError, ParseResult, RespParser, MAX_BULK_SIZE,
};
pub use types::RespValue;
