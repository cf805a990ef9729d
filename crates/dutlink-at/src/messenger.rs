use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use dutlink_transport::DutTransport;
use tracing::trace;

use crate::buffer::PendingBuffer;
use crate::clock::{Clock, SystemClock};
use crate::error::{AtError, ProtocolErrorKind, Result};
use crate::response::{self, Transaction};
use crate::sink::{collapse_newlines, Direction, TracingSink, TrafficSink};

/// Default newline marker.
pub const DEFAULT_NEWLINE: &str = "\r\n";

/// Default transport read size used while polling a transaction.
pub const DEFAULT_READ_BLOCK_LEN: usize = 64;

/// Default sleep between transaction polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for an AT messenger.
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Terminates every line written and received. Must not be empty.
    pub newline: String,
    /// Whether the device echoes each command before its response.
    pub expect_echo: bool,
    /// Transport read size while polling a transaction. Default: 64.
    pub read_block_len: usize,
    /// Sleep between polls. Default: 100 ms.
    pub poll_interval: Duration,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            newline: DEFAULT_NEWLINE.to_string(),
            expect_echo: false,
            read_block_len: DEFAULT_READ_BLOCK_LEN,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// AT-command messenger over any [`DutTransport`].
///
/// Owns the pending-byte buffer that carries data between reads and
/// transactions. Not designed for concurrent callers; every operation runs
/// to completion on the calling thread.
pub struct AtMessenger<T, C = SystemClock> {
    transport: T,
    clock: C,
    sink: Box<dyn TrafficSink + Send>,
    config: MessengerConfig,
    pending: PendingBuffer,
}

impl<T: DutTransport> AtMessenger<T> {
    /// Create a messenger with default tuning.
    pub fn new(transport: T, newline: &str, expect_echo: bool) -> Result<Self> {
        Self::with_config(
            transport,
            MessengerConfig {
                newline: newline.to_string(),
                expect_echo,
                ..MessengerConfig::default()
            },
        )
    }

    /// Create a messenger with explicit configuration.
    pub fn with_config(transport: T, config: MessengerConfig) -> Result<Self> {
        Self::with_clock(transport, config, SystemClock)
    }
}

impl<T: DutTransport, C: Clock> AtMessenger<T, C> {
    /// Create a messenger driven by an explicit clock.
    ///
    /// Configuration is validated before the transport is touched.
    pub fn with_clock(transport: T, config: MessengerConfig, clock: C) -> Result<Self> {
        if config.newline.is_empty() {
            return Err(AtError::Configuration(
                "newline string is invalid (empty)".to_string(),
            ));
        }
        validate_block_len(config.read_block_len)?;

        Ok(Self {
            transport,
            clock,
            sink: Box::new(TracingSink),
            config,
            pending: PendingBuffer::new(),
        })
    }

    /// Replace the traffic sink.
    pub fn with_sink(mut self, sink: impl TrafficSink + Send + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Run one command/response transaction.
    ///
    /// Returns the response lines with the result line and any echo removed.
    /// A zero `timeout` performs exactly one read.
    pub fn transact(&mut self, command: &str, timeout: Duration) -> Result<Vec<String>> {
        self.transact_outcome(command, timeout)?.into_result()
    }

    /// Run one transaction and return its classified outcome.
    ///
    /// Only transport failures are reported as errors.
    pub fn transact_outcome(&mut self, command: &str, timeout: Duration) -> Result<Transaction> {
        self.write(command)?;

        let start = self.clock.now();
        let mut accumulated = BytesMut::new();
        let mut terminal = None;

        loop {
            let chunk = self.read(self.config.read_block_len, false)?;
            accumulated.extend_from_slice(&chunk);

            if let Some(found) = response::find_terminal(&accumulated, &self.config.newline) {
                let trailing = accumulated.split_off(found.end);
                accumulated.truncate(found.start);
                self.pending.push_front(&trailing);
                terminal = Some(found.terminal);
                break;
            }

            if self.elapsed_since(start) >= timeout {
                break;
            }
            self.clock.sleep(self.config.poll_interval);
            if self.elapsed_since(start) >= timeout {
                break;
            }
        }

        let lines = response::split_lines(&accumulated, &self.config.newline);
        let outcome = response::classify(terminal, lines, command, self.config.expect_echo);
        trace!(command, ?outcome, "transaction finished");
        Ok(outcome)
    }

    /// Write `message` followed by the newline marker.
    pub fn write(&mut self, message: &str) -> Result<()> {
        let mut framed = Vec::with_capacity(message.len() + self.config.newline.len());
        framed.extend_from_slice(message.as_bytes());
        framed.extend_from_slice(self.config.newline.as_bytes());
        self.transport.write(&framed)?;

        self.sink.record(Direction::Tx, message);
        Ok(())
    }

    /// Read up to `max_len` bytes, serving pending bytes first.
    ///
    /// The transport is read at most once, and only if the pending buffer
    /// cannot satisfy the request on its own. Bytes beyond `max_len` stay
    /// pending for the next call.
    pub fn read(&mut self, max_len: usize, trim_whitespace: bool) -> Result<Bytes> {
        if max_len == 0 {
            return Err(AtError::Protocol(ProtocolErrorKind::EmptyReadRequest));
        }

        let shortfall = self.pending.shortfall(max_len);
        if shortfall > 0 {
            let chunk = self.transport.read(shortfall)?;
            if !chunk.is_empty() {
                self.sink
                    .record(Direction::Rx, &collapse_newlines(&chunk, &self.config.newline));
            }
            self.pending.extend(&chunk);
        }

        let data = self.pending.take(max_len);
        if trim_whitespace {
            return Ok(trim_ascii_whitespace(data));
        }
        Ok(data)
    }

    /// [`read`](Self::read), decoded as (lossy) UTF-8.
    pub fn read_text(&mut self, max_len: usize, trim_whitespace: bool) -> Result<String> {
        let data = self.read(max_len, trim_whitespace)?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    /// Set the transport read size used by future transactions.
    pub fn set_read_block_len(&mut self, len: usize) -> Result<()> {
        validate_block_len(len)?;
        self.config.read_block_len = len;
        Ok(())
    }

    /// Bytes read from the transport but not yet consumed.
    pub fn pending(&self) -> &[u8] {
        self.pending.as_slice()
    }

    /// Drop any pending bytes.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Current messenger configuration.
    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    pub fn newline(&self) -> &str {
        &self.config.newline
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Borrow the underlying transport.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the messenger and return the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    fn elapsed_since(&self, start: Instant) -> Duration {
        self.clock.now().saturating_duration_since(start)
    }
}

impl<T, C> std::fmt::Debug for AtMessenger<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtMessenger")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn validate_block_len(len: usize) -> Result<()> {
    if len == 0 {
        return Err(AtError::Configuration(
            "read block length must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn trim_ascii_whitespace(data: Bytes) -> Bytes {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    data.slice(start..end)
}
