//! AT-command transaction engine.
//!
//! This is the core value-add layer of dutlink. A transaction is:
//! - the command, terminated with the configured newline marker
//! - zero or more response lines, optionally preceded by the command echo
//! - a terminal `OK` or `ERROR` line
//!
//! Bytes read past the terminal line are carried forward to the next read,
//! so consecutive transactions on one stream never lose or reorder data.

pub mod buffer;
pub mod clock;
pub mod error;
pub mod messenger;
pub mod response;
pub mod sink;

pub use buffer::PendingBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AtError, DeviceErrorKind, ProtocolErrorKind, Result};
pub use messenger::{
    AtMessenger, MessengerConfig, DEFAULT_NEWLINE, DEFAULT_POLL_INTERVAL, DEFAULT_READ_BLOCK_LEN,
};
pub use response::{take_complete_lines, Terminal, TerminalMatch, Transaction};
pub use sink::{Direction, RecordingSink, TracingSink, TrafficSink};
