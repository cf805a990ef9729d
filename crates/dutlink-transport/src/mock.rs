//! Scripted in-memory transport.
//!
//! Replays queued receive chunks and records everything written, so the
//! layers above can be exercised without a device attached.

use std::collections::VecDeque;

use crate::error::{Result, TransportError};
use crate::traits::DutTransport;

/// A transport that replays scripted receive data.
///
/// Each `read(max_len)` returns at most `max_len` bytes taken from the head
/// chunk; anything left of that chunk is returned by the next read. Once the
/// queue is exhausted reads return empty, as a timed-out port would.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    rx: VecDeque<Vec<u8>>,
    replies: VecDeque<(Vec<u8>, Vec<Vec<u8>>)>,
    writes: Vec<Vec<u8>>,
    reads: usize,
    purges: usize,
    fail_reads: bool,
    fail_writes: bool,
}

impl ScriptedTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that will deliver `chunks` in order.
    pub fn with_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let mut transport = Self::new();
        for chunk in chunks {
            transport.push_chunk(chunk);
        }
        transport
    }

    /// Queue one more receive chunk. Empty chunks model a read timeout.
    pub fn push_chunk(&mut self, chunk: impl AsRef<[u8]>) {
        self.rx.push_back(chunk.as_ref().to_vec());
    }

    /// Queue `chunks` to become readable once a write starting with `command` is seen.
    ///
    /// Replies are matched in the order they were registered.
    pub fn reply_to<I, B>(&mut self, command: &str, chunks: I)
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let chunks = chunks.into_iter().map(|c| c.as_ref().to_vec()).collect();
        self.replies
            .push_back((command.as_bytes().to_vec(), chunks));
    }

    /// Make every subsequent read fail with an I/O error.
    pub fn fail_reads(&mut self) {
        self.fail_reads = true;
    }

    /// Make every subsequent write fail with an I/O error.
    pub fn fail_writes(&mut self) {
        self.fail_writes = true;
    }

    /// Every write seen so far, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Writes decoded as (lossy) UTF-8.
    pub fn written_text(&self) -> Vec<String> {
        self.writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Number of `read` calls made.
    pub fn read_count(&self) -> usize {
        self.reads
    }

    /// Number of `purge` calls made.
    pub fn purge_count(&self) -> usize {
        self.purges
    }

    /// Bytes still waiting to be read.
    pub fn remaining(&self) -> usize {
        self.rx.iter().map(Vec::len).sum()
    }
}

impl DutTransport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted write failure",
            )));
        }
        if bytes.is_empty() {
            return Err(TransportError::EmptyWrite);
        }

        self.writes.push(bytes.to_vec());

        let matched = self
            .replies
            .front()
            .is_some_and(|(command, _)| bytes.starts_with(command));
        if matched {
            if let Some((_, chunks)) = self.replies.pop_front() {
                self.rx.extend(chunks);
            }
        }
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>> {
        self.reads += 1;
        if self.fail_reads {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted read failure",
            )));
        }
        if max_len == 0 {
            return Err(TransportError::EmptyRead);
        }

        let Some(mut chunk) = self.rx.pop_front() else {
            return Ok(Vec::new());
        };
        if chunk.len() > max_len {
            let rest = chunk.split_off(max_len);
            self.rx.push_front(rest);
        }
        Ok(chunk)
    }

    fn purge(&mut self) -> Result<()> {
        self.purges += 1;
        self.rx.clear();
        Ok(())
    }
}
