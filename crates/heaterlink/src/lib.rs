//! Serial heater control with framed telemetry and safe shutdown.
//!
//! heaterlink drives a two-channel heater board over a serial link: a periodic
//! controller pushes duty-cycle setpoints, inbound telemetry is reassembled and
//! persisted per run, and shutdown always zeroes the heaters before the link
//! is released.
//!
//! # Crate Structure
//!
//! - [`transport`]: Serial link, device discovery, control socket
//! - [`frame`]: Fixed 8-byte frame codec and stream reassembly
//! - [`control`]: Control loop, telemetry pipeline, run store, shutdown

/// Re-export transport types.
pub mod transport {
    pub use heaterlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use heaterlink_frame::*;
}

/// Re-export control types.
pub mod control {
    pub use heaterlink_control::*;
}
