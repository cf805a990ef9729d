//! Byte transport abstraction for devices under test.
//!
//! Provides the minimal contract the AT engine needs from a link to a DUT:
//! - `write` a complete byte sequence
//! - `read` up to `max_len` bytes, returning whatever is available (possibly nothing)
//! - `purge` any data buffered by the link
//!
//! This is the lowest layer of dutlink. Everything else builds on top of
//! the [`DutTransport`] trait provided here.

pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;

pub use error::{Result, TransportError};
pub use mock::ScriptedTransport;
pub use serial::{
    list_ports, PortInfo, SerialConfig, SerialTransport, DEFAULT_BAUD_RATE, DEFAULT_MAX_READ_LEN,
};
pub use traits::DutTransport;
