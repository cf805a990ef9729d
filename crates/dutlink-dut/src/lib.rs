//! Typed device facades over the dutlink AT engine.
//!
//! This is the layer a test station talks to:
//! - [`AtDevice`] wraps an [`AtMessenger`](dutlink_at::AtMessenger) with the
//!   standard timeout and prefix/value helpers
//! - [`ChargerDevice`] and [`DtsDevice`] turn domain operations into commands
//! - [`RetryPolicy`] gives any operation a bounded second chance
//! - [`AuthKey`] answers the DTS authentication challenge
//! - [`StationConfig`] loads per-station link settings from JSON

pub mod auth;
pub mod charger;
pub mod config;
pub mod device;
pub mod dts;
pub mod error;
pub mod parse;
pub mod retry;

pub use auth::AuthKey;
pub use charger::{
    ChargerDevice, ChargerIdentity, ChargerMode, CurrentSense, Earbud, EarbudStatus, GpioFunction,
    GpioPin, GpioState, GpioStatus, LedMode, LowPowerMode, RegLevel, EARBUD_TIMEOUT,
};
pub use config::{resolve_newline, StationConfig, DEFAULT_TIMEOUT_MS};
pub use device::{open, AtDevice, INDICATION_READ_LEN, STD_TIMEOUT};
pub use dts::{
    AudioChannel, AudioHardware, AudioOutput, DtsDevice, RssiReport, TouchAction,
    AUDIO_INSTANCE_MAX, AUDIO_TONE_MAX,
};
pub use error::{DutError, Result};
pub use retry::RetryPolicy;
