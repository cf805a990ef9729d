//! AT-command links to devices under test.
//!
//! dutlink drives production-line test stations: it opens a serial (or
//! Bluetooth SPP / USB virtual COM) link to a DUT, runs AT-command
//! transactions with reliable terminal detection, and exposes typed device
//! operations on top.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte transport abstraction (serial ports, scripted doubles)
//! - [`at`]: AT-command transaction engine with carried-over pending bytes
//! - [`dut`]: Device facades, retry policy and station configuration (behind `dut` feature)

/// Re-export transport types.
pub mod transport {
    pub use dutlink_transport::*;
}

/// Re-export AT engine types.
pub mod at {
    pub use dutlink_at::*;
}

/// Re-export device facade types (requires `dut` feature).
#[cfg(feature = "dut")]
pub mod dut {
    pub use dutlink_dut::*;
}
