//! Response-line helpers shared by the device facades.

use std::str::FromStr;

use crate::error::{DutError, Result};

/// Strip `PREFIX:` from every line.
///
/// Each line must be exactly `<prefix>:<data>`. A line with a different
/// prefix, no separator, or more than one separator is rejected.
pub fn strip_prefix(lines: Vec<String>, prefix: &str) -> Result<Vec<String>> {
    lines
        .into_iter()
        .map(|line| {
            let mut parts = line.split(':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(head), Some(data), None) if head == prefix => Ok(data.to_string()),
                (Some(_), Some(_), None) => Err(DutError::InvalidResponse(format!(
                    "line \"{line}\" does not contain expected \"{prefix}\" prefix"
                ))),
                _ => Err(DutError::InvalidResponse(format!(
                    "line \"{line}\" format is invalid, expecting \"{prefix}:<data>\""
                ))),
            }
        })
        .collect()
}

/// Split a comma-separated value list.
pub fn split_values(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// Parse one value, naming `what` in the error.
pub fn parse_value<V: FromStr>(text: &str, what: &str) -> Result<V> {
    text.trim().parse().map_err(|_| {
        DutError::InvalidResponse(format!("reported {what} \"{text}\" is invalid"))
    })
}

/// First line of a response, or a `MissingValue` error naming `what`.
pub fn first_line<'a>(lines: &'a [String], what: &str) -> Result<&'a str> {
    lines
        .first()
        .map(String::as_str)
        .ok_or_else(|| DutError::MissingValue(format!("no {what} reported by device")))
}

/// Interpret a `0`/`1` flag at the start of `text`.
///
/// With `exact`, the text must be the single flag character.
pub fn parse_flag(text: &str, exact: bool, what: &str) -> Result<bool> {
    let flag = match text.as_bytes() {
        [b'0'] => Some(false),
        [b'1'] => Some(true),
        [b'0', ..] if !exact => Some(false),
        [b'1', ..] if !exact => Some(true),
        _ => None,
    };
    flag.ok_or_else(|| {
        DutError::InvalidResponse(format!("{what} should be either '0' or '1', got \"{text}\""))
    })
}
