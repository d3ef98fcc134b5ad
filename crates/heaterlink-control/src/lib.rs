//! Heater control session.
//!
//! One task per concern, wired by [`Session`]:
//! - inbound: read pump → [`heaterlink_frame::Reassembler`] → [`TelemetryRouter`]
//! - [`PersistenceSink`]: drains telemetry samples into the run store
//! - [`ConfigWatcher`]: turns change notifications into new [`ControlParameters`]
//! - [`DutyCycleController`]: the only writer to the serial link
//! - [`ShutdownCoordinator`]: zeroes the heaters first, then stops everything else

pub mod controller;
pub mod error;
pub mod inbound;
pub mod notify;
pub mod params;
pub mod router;
pub mod session;
pub mod shutdown;
pub mod sink;
pub mod store;
pub mod watcher;

pub use controller::{
    ControllerReport, ControllerState, DutyCycleController, DEFAULT_TICK, SHUTDOWN_GRACE,
};
pub use error::{ConfigError, ControlError, Result, StoreError};
pub use inbound::Inbound;
pub use notify::{ControlMessage, Notification, SETTINGS_CHANGED, TEST_ENDED};
#[cfg(unix)]
pub use notify::{send_notification, serve};
pub use params::{ControlParameters, DutyCycles, HeaterConstants, Mode, Waveform};
pub use router::{Routed, TelemetryRouter, TelemetrySample};
pub use session::{
    Session, SessionConfig, SessionReport, SessionStats, StatsSnapshot, DEFAULT_QUEUE_CAPACITY,
};
pub use shutdown::{
    ShutdownCoordinator, ShutdownHandle, ShutdownOutcome, ShutdownTrigger, TASK_STOP_TIMEOUT,
};
pub use sink::PersistenceSink;
pub use store::{
    validate_run_id, CsvSettingsSource, CsvTelemetryStore, RunStore, SettingsRecord,
    SettingsSource, TelemetryStore,
};
pub use watcher::ConfigWatcher;
