use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use heaterlink_transport::{spawn_read_pump, DEFAULT_READ_CHUNK_SIZE};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::controller::{ControllerReport, DutyCycleController, DEFAULT_TICK};
use crate::error::{ConfigError, ControlError, Result};
use crate::inbound::Inbound;
use crate::notify::Notification;
use crate::params::{ControlParameters, DutyCycles, HeaterConstants};
use crate::router::TelemetryRouter;
use crate::shutdown::{ShutdownCoordinator, ShutdownHandle, ShutdownTrigger};
use crate::sink::PersistenceSink;
use crate::store::{SettingsSource, TelemetryStore};
use crate::watcher::ConfigWatcher;

/// Default telemetry queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tick: Duration,
    /// Telemetry samples buffered between the router and the sink.
    pub queue_capacity: usize,
    pub read_chunk_size: usize,
    pub heaters: HeaterConstants,
    /// Shut down on SIGINT/SIGTERM.
    pub os_signals: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            heaters: HeaterConstants::default(),
            os_signals: false,
        }
    }
}

/// Counters shared by the session's tasks.
#[derive(Debug, Default)]
pub struct SessionStats {
    samples_queued: AtomicU64,
    samples_dropped: AtomicU64,
    samples_persisted: AtomicU64,
    store_failures: AtomicU64,
    device_errors: AtomicU64,
    frames_rejected: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub samples_queued: u64,
    pub samples_dropped: u64,
    pub samples_persisted: u64,
    pub store_failures: u64,
    pub device_errors: u64,
    pub frames_rejected: u64,
}

impl SessionStats {
    pub fn record_queued(&self) {
        self.samples_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.samples_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_device_error(&self) {
        self.device_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_queued: self.samples_queued.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            samples_persisted: self.samples_persisted.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub struct SessionReport {
    pub trigger: ShutdownTrigger,
    pub controller: Option<ControllerReport>,
    pub stats: StatsSnapshot,
    /// Triggers that fired after shutdown had started.
    pub late_triggers: usize,
}

impl SessionReport {
    pub fn frames_sent(&self) -> u64 {
        self.controller.map_or(0, |report| report.frames_sent)
    }

    pub fn zero_sent(&self) -> bool {
        self.controller.is_some_and(|report| report.zero_sent)
    }
}

/// A running heater-control session.
pub struct Session {
    coordinator: ShutdownCoordinator,
    stats: Arc<SessionStats>,
}

impl Session {
    /// Wire up and spawn every task. Must be called from within a Tokio runtime.
    ///
    /// `reader` and `writer` are the two halves of the serial link. The
    /// latest settings are pulled once before the controller starts; with no
    /// settings on record it starts idle. Invalid settings on record are a
    /// configuration fault: the session starts only to run the shutdown
    /// sequence.
    pub fn start<R, W, T, S>(
        config: SessionConfig,
        reader: R,
        writer: W,
        telemetry: T,
        settings: S,
        notifications: mpsc::Receiver<Notification>,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
        T: TelemetryStore + 'static,
        S: SettingsSource + 'static,
    {
        let heaters = config.heaters.validate()?;
        if config.tick.is_zero() {
            return Err(ConfigError::ZeroTick.into());
        }
        let stats = Arc::new(SessionStats::default());
        let mut coordinator = ShutdownCoordinator::new().with_os_signals(config.os_signals);
        let shutdown = coordinator.handle();
        let tasks = coordinator.task_token();

        let (params_tx, params_rx) = watch::channel(ControlParameters::idle(Instant::now()));
        let (duty_tx, duty_rx) = watch::channel(DutyCycles::ZERO);
        let (samples_tx, samples_rx) = mpsc::channel(config.queue_capacity.max(1));

        let mut watcher = ConfigWatcher::new(settings, params_tx);
        match watcher.refresh() {
            Ok(_) => {}
            Err(ControlError::Config(err)) => {
                error!(%err, "recorded settings are invalid");
                shutdown.trigger(ShutdownTrigger::ConfigFault(err.to_string()));
            }
            Err(err) => warn!(%err, "initial settings read failed; starting idle"),
        }

        let (chunks, pump) = spawn_read_pump(reader, config.read_chunk_size, tasks.clone());
        coordinator.register("read-pump", pump);

        let inbound = Inbound::new(TelemetryRouter::new(
            duty_rx,
            samples_tx,
            Arc::clone(&stats),
        ));
        coordinator.register(
            "inbound",
            tokio::spawn(inbound.run(chunks, tasks.clone(), shutdown.clone())),
        );

        let sink = PersistenceSink::new(telemetry, Arc::clone(&stats));
        coordinator.register("persistence", tokio::spawn(sink.run(samples_rx, tasks.clone())));

        coordinator.register(
            "config-watcher",
            tokio::spawn(watcher.run(notifications, tasks, shutdown.clone())),
        );

        let controller_cancel = CancellationToken::new();
        let controller =
            DutyCycleController::new(writer, params_rx, heaters, config.tick, duty_tx);
        coordinator.set_controller(
            controller_cancel.clone(),
            tokio::spawn(controller.run(controller_cancel, shutdown)),
        );

        info!(
            tick_ms = config.tick.as_millis() as u64,
            queue = config.queue_capacity,
            "session started"
        );
        Ok(Self { coordinator, stats })
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.coordinator.handle()
    }

    /// Token for extra tasks that should stop with the session.
    pub fn task_token(&self) -> CancellationToken {
        self.coordinator.task_token()
    }

    /// Register an extra task stopped after the controller.
    pub fn register(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.coordinator.register(name, handle);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run until a shutdown trigger, then tear down in order.
    pub async fn run(self) -> SessionReport {
        let outcome = self.coordinator.run().await;
        let report = SessionReport {
            trigger: outcome.trigger,
            controller: outcome.controller,
            stats: self.stats.snapshot(),
            late_triggers: outcome.ignored.len(),
        };
        info!(
            trigger = %report.trigger,
            frames_sent = report.frames_sent(),
            zero_sent = report.zero_sent(),
            samples = report.stats.samples_persisted,
            dropped = report.stats.samples_dropped,
            "session finished"
        );
        report
    }
}
