//! DTS challenge-response authentication.
//!
//! The device hands out a 16-byte nonce as 32 hex digits (`+AUTHSTART:`).
//! The station answers with the AES-CMAC of the nonce under the shared key.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use aes::Aes128;
use cmac::{Cmac, Mac};

use crate::error::{DutError, Result};

/// Key length in octets.
pub const AUTH_KEY_LEN: usize = 16;

/// Nonce length in bytes (twice that in hex digits on the wire).
pub const AUTH_CHALLENGE_LEN: usize = 16;

/// AES-128 key shared between the station and the DUT firmware.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey([u8; AUTH_KEY_LEN]);

impl AuthKey {
    pub fn new(bytes: [u8; AUTH_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// AES-CMAC of `challenge`.
    pub fn sign(&self, challenge: &[u8]) -> Result<[u8; AUTH_CHALLENGE_LEN]> {
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(&self.0)
            .map_err(|_| DutError::Config("authentication key must be 16 octets".to_string()))?;
        mac.update(challenge);
        let mut out = [0u8; AUTH_CHALLENGE_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthKey(..)")
    }
}

/// Parse 16 hex octets separated by commas or whitespace, e.g.
/// `"0x2b,0x7e,15,16,..."`. A `0x` prefix on each octet is optional.
impl FromStr for AuthKey {
    type Err = DutError;

    fn from_str(s: &str) -> Result<Self> {
        let octets: Vec<&str> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect();
        if octets.len() != AUTH_KEY_LEN {
            return Err(DutError::Config(format!(
                "authentication key should be a list of {AUTH_KEY_LEN} hex octets, got {}",
                octets.len()
            )));
        }

        let mut key = [0u8; AUTH_KEY_LEN];
        for (slot, &octet) in key.iter_mut().zip(&octets) {
            let digits = octet
                .strip_prefix("0x")
                .or_else(|| octet.strip_prefix("0X"))
                .unwrap_or(octet);
            if digits.is_empty() || digits.len() > 2 {
                return Err(invalid_octet(octet));
            }
            *slot = u8::from_str_radix(digits, 16).map_err(|_| invalid_octet(octet))?;
        }
        Ok(Self(key))
    }
}

fn invalid_octet(octet: &str) -> DutError {
    DutError::Config(format!("authentication key octet \"{octet}\" is not a hex byte"))
}

/// Decode the nonce text from `+AUTHSTART:`.
pub fn parse_challenge(text: &str) -> Result<[u8; AUTH_CHALLENGE_LEN]> {
    if text.len() != AUTH_CHALLENGE_LEN * 2 {
        return Err(DutError::InvalidResponse(format!(
            "authentication nonce \"{text}\" is not {} hex digits",
            AUTH_CHALLENGE_LEN * 2
        )));
    }
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DutError::InvalidResponse(format!(
            "authentication nonce \"{text}\" contains invalid hex digits"
        )));
    }

    let mut nonce = [0u8; AUTH_CHALLENGE_LEN];
    for (i, byte) in nonce.iter_mut().enumerate() {
        let pair = &text[i * 2..i * 2 + 2];
        *byte = u8::from_str_radix(pair, 16)
            .map_err(|_| DutError::InvalidResponse(format!("bad nonce byte \"{pair}\"")))?;
    }
    Ok(nonce)
}

/// Uppercase hex, two digits per byte.
pub fn to_hex_upper(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_KEY: &str = "2b,7e,15,16,28,ae,d2,a6,ab,f7,15,88,09,cf,4f,3c";

    #[test]
    fn cmac_matches_rfc4493_example() {
        let key: AuthKey = RFC_KEY.parse().unwrap();
        let nonce = parse_challenge("6bc1bee22e409f96e93d7e117393172a").unwrap();
        let mac = key.sign(&nonce).unwrap();
        assert_eq!(to_hex_upper(&mac), "070A16B46B4D4144F79BDD9DD04A287C");
    }

    #[test]
    fn key_accepts_prefixes_and_whitespace() {
        let text = "0x2b 0x7e 0x15 0x16 0x28 0xAE 0xd2 0xa6 0xab 0xf7 0x15 0x88 9 0xcf 0X4f 3c";
        let spaced: AuthKey = text.parse().unwrap();
        assert_eq!(spaced, RFC_KEY.parse().unwrap());
    }

    #[test]
    fn key_needs_sixteen_octets() {
        let err = "01,02,03".parse::<AuthKey>().unwrap_err();
        assert!(matches!(err, DutError::Config(ref m) if m.contains("got 3")));
    }

    #[test]
    fn key_rejects_bad_octet() {
        let text = RFC_KEY.replace("3c", "3g");
        let err = text.parse::<AuthKey>().unwrap_err();
        assert!(matches!(err, DutError::Config(ref m) if m.contains("\"3g\"")));

        let text = RFC_KEY.replace("3c", "13c");
        assert!(text.parse::<AuthKey>().is_err());
    }

    #[test]
    fn key_debug_is_redacted() {
        let key: AuthKey = RFC_KEY.parse().unwrap();
        assert_eq!(format!("{key:?}"), "AuthKey(..)");
    }

    #[test]
    fn challenge_length_and_digits() {
        let err = parse_challenge("6bc1be").unwrap_err();
        assert!(matches!(err, DutError::InvalidResponse(ref m) if m.contains("32 hex digits")));

        let err = parse_challenge("zbc1bee22e409f96e93d7e117393172a").unwrap_err();
        assert!(matches!(err, DutError::InvalidResponse(ref m) if m.contains("invalid hex")));
    }

    #[test]
    fn hex_is_zero_padded_uppercase() {
        assert_eq!(to_hex_upper(&[0x0a, 0xff, 0x00]), "0AFF00");
    }
}
