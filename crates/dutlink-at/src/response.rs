//! Stateless response post-processing.
//!
//! Turns the raw bytes accumulated by a transaction into the caller's lines:
//! terminal-line detection, line splitting, blank-line filtering, echo
//! removal and outcome classification.

use crate::error::{AtError, DeviceErrorKind, ProtocolErrorKind, Result};

/// Terminal result line of a successful transaction.
pub const OK_RESULT: &str = "OK";

/// Terminal result line of a rejected transaction.
pub const ERROR_RESULT: &str = "ERROR";

/// Which terminal line ended a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Ok,
    Error,
}

/// Location of a terminal line (including its newline) within a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalMatch {
    pub terminal: Terminal,
    pub start: usize,
    pub end: usize,
}

/// Classified result of one transaction.
///
/// Expected protocol states are values here; only transport failures are
/// reported through the error channel by the messenger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    /// `OK` received. Holds the response lines with any echo removed.
    Complete(Vec<String>),
    /// `ERROR` received. Holds whatever lines preceded it.
    DeviceRejected(Vec<String>),
    /// Nothing received within the timeout.
    NoResponse,
    /// Lines received but no terminal line within the timeout.
    Incomplete(Vec<String>),
    /// `OK` received but no line carried the expected command echo.
    MissingEcho(Vec<String>),
}

impl Transaction {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    /// Collapse the outcome into the caller-facing result.
    pub fn into_result(self) -> Result<Vec<String>> {
        match self {
            Self::Complete(lines) => Ok(lines),
            Self::DeviceRejected(_) => Err(AtError::Device(DeviceErrorKind::DeviceReportedFailure)),
            Self::NoResponse => Err(AtError::Protocol(ProtocolErrorKind::NoResponse)),
            Self::Incomplete(_) => Err(AtError::Protocol(ProtocolErrorKind::IncompleteResponse)),
            Self::MissingEcho(_) => Err(AtError::Protocol(ProtocolErrorKind::MissingCommandEcho)),
        }
    }
}

/// Find the earliest `OK<newline>` or `ERROR<newline>` in `buf`.
///
/// The match is a literal substring search, not anchored to a line start:
/// a data line ending in `OK` (such as `+STATUS:OK`) completes the
/// transaction there. Commands whose data can end that way need a
/// distinct encoding on the device side.
pub fn find_terminal(buf: &[u8], newline: &str) -> Option<TerminalMatch> {
    let ok = find_signature(buf, OK_RESULT, newline).map(|(start, end)| TerminalMatch {
        terminal: Terminal::Ok,
        start,
        end,
    });
    let error = find_signature(buf, ERROR_RESULT, newline).map(|(start, end)| TerminalMatch {
        terminal: Terminal::Error,
        start,
        end,
    });

    match (ok, error) {
        (Some(ok), Some(error)) if error.start < ok.start => Some(error),
        (Some(ok), _) => Some(ok),
        (None, error) => error,
    }
}

fn find_signature(buf: &[u8], result: &str, newline: &str) -> Option<(usize, usize)> {
    let sig_len = result.len() + newline.len();
    if buf.len() < sig_len {
        return None;
    }
    buf.windows(sig_len)
        .position(|w| w.starts_with(result.as_bytes()) && w.ends_with(newline.as_bytes()))
        .map(|start| (start, start + sig_len))
}

/// Remove every complete line from the front of `raw` and decode it.
///
/// Bytes after the last newline marker stay in `raw`, so a multi-byte
/// character split across reads is decoded once its line is whole.
/// Returns `None` when `raw` holds no complete line.
pub fn take_complete_lines(raw: &mut Vec<u8>, newline: &str) -> Option<String> {
    let marker = newline.as_bytes();
    if marker.is_empty() || raw.len() < marker.len() {
        return None;
    }
    let end = raw.windows(marker.len()).rposition(|w| w == marker)? + marker.len();
    let complete: Vec<u8> = raw.drain(..end).collect();
    Some(String::from_utf8_lossy(&complete).into_owned())
}

/// Split `body` on `newline`, dropping empty lines.
pub fn split_lines(body: &[u8], newline: &str) -> Vec<String> {
    if body.is_empty() {
        return Vec::new();
    }
    String::from_utf8_lossy(body)
        .split(newline)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drop the last line ending with `command` and everything before it.
///
/// Returns `None` if no line ends with the command.
pub fn strip_echo(mut lines: Vec<String>, command: &str) -> Option<Vec<String>> {
    let echo = lines.iter().rposition(|line| line.ends_with(command))?;
    lines.drain(..=echo);
    Some(lines)
}

/// Classify a finished poll loop.
pub fn classify(
    terminal: Option<Terminal>,
    lines: Vec<String>,
    command: &str,
    expect_echo: bool,
) -> Transaction {
    match terminal {
        None if lines.is_empty() => Transaction::NoResponse,
        None => Transaction::Incomplete(lines),
        Some(Terminal::Error) => Transaction::DeviceRejected(lines),
        Some(Terminal::Ok) if expect_echo => match strip_echo(lines.clone(), command) {
            Some(stripped) => Transaction::Complete(stripped),
            None => Transaction::MissingEcho(lines),
        },
        Some(Terminal::Ok) => Transaction::Complete(lines),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRLF: &str = "\r\n";

    #[test]
    fn finds_ok_terminal() {
        let m = find_terminal(b"data\r\nOK\r\ntail", CRLF).unwrap();
        assert_eq!(m.terminal, Terminal::Ok);
        assert_eq!((m.start, m.end), (6, 10));
    }

    #[test]
    fn terminal_needs_newline() {
        assert!(find_terminal(b"data\r\nOK", CRLF).is_none());
        assert!(find_terminal(b"ERROR\r", CRLF).is_none());
    }

    #[test]
    fn earliest_terminal_wins() {
        let m = find_terminal(b"ERROR\r\nOK\r\n", CRLF).unwrap();
        assert_eq!(m.terminal, Terminal::Error);
        assert_eq!(m.start, 0);

        let m = find_terminal(b"OK\r\nERROR\r\n", CRLF).unwrap();
        assert_eq!(m.terminal, Terminal::Ok);
    }

    #[test]
    fn terminal_inside_data_line_ends_transaction() {
        let m = find_terminal(b"+STATUS:OK\r\nmore\r\nOK\r\n", CRLF).unwrap();
        assert_eq!(m.terminal, Terminal::Ok);
        assert_eq!((m.start, m.end), (8, 12));
    }

    #[test]
    fn complete_lines_keep_split_characters_whole() {
        // "é" is 0xC3 0xA9; the first read ends between the two bytes.
        let mut raw = b"+NAME:caf\xC3".to_vec();
        assert!(take_complete_lines(&mut raw, CRLF).is_none());

        raw.extend_from_slice(b"\xA9\r\nnext");
        assert_eq!(take_complete_lines(&mut raw, CRLF).unwrap(), "+NAME:caf\u{e9}\r\n");
        assert_eq!(raw, b"next");
        assert!(take_complete_lines(&mut raw, CRLF).is_none());
    }

    #[test]
    fn custom_newline_marker() {
        let m = find_terminal(b"x\nOK\n", "\n").unwrap();
        assert_eq!((m.start, m.end), (2, 5));
    }

    #[test]
    fn split_drops_blank_lines() {
        assert_eq!(
            split_lines(b"\r\nline1\r\n\r\nline2\r\n", CRLF),
            vec!["line1", "line2"]
        );
        assert!(split_lines(b"", CRLF).is_empty());
        assert!(split_lines(b"\r\n\r\n", CRLF).is_empty());
    }

    #[test]
    fn split_keeps_unterminated_tail() {
        assert_eq!(split_lines(b"a\r\npart", CRLF), vec!["a", "part"]);
    }

    #[test]
    fn strip_echo_removes_noise_before_echo() {
        let lines = vec!["GARBAGE".into(), "AT+CMD".into(), "data1".into()];
        assert_eq!(strip_echo(lines, "AT+CMD").unwrap(), vec!["data1"]);
    }

    #[test]
    fn strip_echo_matches_suffix() {
        let lines = vec!["\u{0}noiseAT+CMD".into(), "data".into()];
        assert_eq!(strip_echo(lines, "AT+CMD").unwrap(), vec!["data"]);
    }

    #[test]
    fn strip_echo_uses_last_match() {
        let lines = vec!["AT+X".into(), "a".into(), "AT+X".into(), "b".into()];
        assert_eq!(strip_echo(lines, "AT+X").unwrap(), vec!["b"]);
    }

    #[test]
    fn strip_echo_missing() {
        assert!(strip_echo(vec!["data".into()], "AT+CMD").is_none());
    }

    #[test]
    fn classify_outcomes() {
        assert_eq!(classify(None, vec![], "AT", false), Transaction::NoResponse);
        assert_eq!(
            classify(None, vec!["x".into()], "AT", false),
            Transaction::Incomplete(vec!["x".into()])
        );
        assert_eq!(
            classify(Some(Terminal::Error), vec![], "AT", true),
            Transaction::DeviceRejected(vec![])
        );
        assert_eq!(
            classify(Some(Terminal::Ok), vec!["x".into()], "AT", false),
            Transaction::Complete(vec!["x".into()])
        );
        assert_eq!(
            classify(Some(Terminal::Ok), vec!["x".into()], "AT+Q", true),
            Transaction::MissingEcho(vec!["x".into()])
        );
    }

    #[test]
    fn into_result_maps_kinds() {
        assert!(matches!(
            Transaction::NoResponse.into_result(),
            Err(AtError::Protocol(ProtocolErrorKind::NoResponse))
        ));
        assert!(matches!(
            Transaction::Incomplete(vec![]).into_result(),
            Err(AtError::Protocol(ProtocolErrorKind::IncompleteResponse))
        ));
        assert!(matches!(
            Transaction::MissingEcho(vec![]).into_result(),
            Err(AtError::Protocol(ProtocolErrorKind::MissingCommandEcho))
        ));
        let err = Transaction::DeviceRejected(vec![]).into_result().unwrap_err();
        assert!(err.is_device_error());
        assert_eq!(
            Transaction::Complete(vec!["a".into()]).into_result().unwrap(),
            vec!["a"]
        );
    }
}
