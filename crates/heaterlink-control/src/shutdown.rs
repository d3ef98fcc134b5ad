//! Ordered teardown.
//!
//! The controller has its own cancellation token, separate from the one shared
//! by every other task. Shutdown cancels the controller first and waits for it
//! to zero the heaters and release the link; only then are the remaining tasks
//! cancelled.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::controller::ControllerReport;

/// How long a non-controller task may take to stop before it is aborted.
pub const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Why the session is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// OS termination signal.
    Signal(&'static str),
    /// The operator ended the test.
    TestEnded,
    /// The serial link failed.
    TransportFault(String),
    /// Settings that must not be applied.
    ConfigFault(String),
}

impl ShutdownTrigger {
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            ShutdownTrigger::TransportFault(_) | ShutdownTrigger::ConfigFault(_)
        )
    }
}

impl std::fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownTrigger::Signal(name) => write!(f, "signal {name}"),
            ShutdownTrigger::TestEnded => f.write_str("test ended"),
            ShutdownTrigger::TransportFault(reason) => write!(f, "transport fault: {reason}"),
            ShutdownTrigger::ConfigFault(reason) => write!(f, "configuration fault: {reason}"),
        }
    }
}

/// Cloneable handle any task can use to request shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::UnboundedSender<ShutdownTrigger>,
}

impl ShutdownHandle {
    /// A handle and the receiving end of its trigger channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ShutdownTrigger>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Request shutdown. Never fails; late triggers are ignored.
    pub fn trigger(&self, trigger: ShutdownTrigger) {
        if self.tx.send(trigger).is_err() {
            debug!("shutdown already complete; trigger ignored");
        }
    }
}

/// Result of a completed shutdown.
#[derive(Debug)]
pub struct ShutdownOutcome {
    /// The trigger that started shutdown.
    pub trigger: ShutdownTrigger,
    /// Controller report, if a controller was registered and finished.
    pub controller: Option<ControllerReport>,
    /// Triggers that arrived after the first one.
    pub ignored: Vec<ShutdownTrigger>,
}

pub struct ShutdownCoordinator {
    rx: mpsc::UnboundedReceiver<ShutdownTrigger>,
    handle: ShutdownHandle,
    controller: Option<(CancellationToken, JoinHandle<ControllerReport>)>,
    tasks_cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    triggered: Option<ShutdownTrigger>,
    report: Option<ControllerReport>,
    ignored: Vec<ShutdownTrigger>,
    os_signals: bool,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (handle, rx) = ShutdownHandle::channel();
        Self {
            rx,
            handle,
            controller: None,
            tasks_cancel: CancellationToken::new(),
            tasks: Vec::new(),
            triggered: None,
            report: None,
            ignored: Vec::new(),
            os_signals: false,
        }
    }

    /// Also shut down on SIGINT/SIGTERM.
    pub fn with_os_signals(mut self, enabled: bool) -> Self {
        self.os_signals = enabled;
        self
    }

    pub fn handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Token shared by every task except the controller.
    pub fn task_token(&self) -> CancellationToken {
        self.tasks_cancel.clone()
    }

    /// Register the controller task and its private cancellation token.
    pub fn set_controller(
        &mut self,
        cancel: CancellationToken,
        handle: JoinHandle<ControllerReport>,
    ) {
        self.controller = Some((cancel, handle));
    }

    /// Register a task stopped by [`task_token`](Self::task_token).
    pub fn register(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.push((name, handle));
    }

    /// Wait for the first trigger.
    pub async fn wait(&mut self) -> ShutdownTrigger {
        if self.os_signals {
            tokio::select! {
                trigger = recv_trigger(&mut self.rx) => trigger,
                name = os_signal() => ShutdownTrigger::Signal(name),
            }
        } else {
            recv_trigger(&mut self.rx).await
        }
    }

    /// Run the ordered shutdown. Only the first call does anything.
    pub async fn shutdown(&mut self, trigger: ShutdownTrigger) {
        if self.triggered.is_some() {
            debug!(%trigger, "shutdown already in progress");
            self.ignored.push(trigger);
            return;
        }
        if trigger.is_fault() {
            error!(%trigger, "shutting down");
        } else {
            info!(%trigger, "shutting down");
        }
        self.triggered = Some(trigger);

        if let Some((cancel, handle)) = self.controller.take() {
            cancel.cancel();
            match handle.await {
                Ok(report) => self.report = Some(report),
                Err(err) => error!(%err, "controller task failed"),
            }
        }

        self.tasks_cancel.cancel();
        for (name, mut handle) in std::mem::take(&mut self.tasks) {
            match tokio::time::timeout(TASK_STOP_TIMEOUT, &mut handle).await {
                Ok(Ok(())) => debug!(task = name, "task stopped"),
                Ok(Err(err)) => warn!(task = name, %err, "task failed"),
                Err(_) => {
                    warn!(task = name, "task did not stop in time; aborting");
                    handle.abort();
                }
            }
        }
    }

    /// Wait for a trigger, shut down, and report.
    pub async fn run(mut self) -> ShutdownOutcome {
        let trigger = self.wait().await;
        self.shutdown(trigger.clone()).await;
        while let Ok(late) = self.rx.try_recv() {
            debug!(trigger = %late, "ignoring trigger received during shutdown");
            self.ignored.push(late);
        }
        ShutdownOutcome {
            trigger: self.triggered.take().unwrap_or(trigger),
            controller: self.report.take(),
            ignored: self.ignored,
        }
    }
}

async fn recv_trigger(rx: &mut mpsc::UnboundedReceiver<ShutdownTrigger>) -> ShutdownTrigger {
    match rx.recv().await {
        Some(trigger) => trigger,
        // The coordinator keeps a sender, so the channel never closes.
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
async fn os_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
            Some(()) = term.recv() => "SIGTERM",
            else => std::future::pending().await,
        },
        Err(err) => {
            warn!(%err, "SIGTERM handler unavailable");
            ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(err) => {
            warn!(%err, "Ctrl-C handler unavailable");
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::controller::ControllerState;

    #[test]
    fn fault_classification() {
        assert!(ShutdownTrigger::TransportFault("eof".into()).is_fault());
        assert!(ShutdownTrigger::ConfigFault("mode".into()).is_fault());
        assert!(!ShutdownTrigger::TestEnded.is_fault());
        assert!(!ShutdownTrigger::Signal("SIGINT").is_fault());
    }

    #[tokio::test]
    async fn controller_stops_before_other_tasks() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut coordinator = ShutdownCoordinator::new();

        let task_cancel = coordinator.task_token();
        let task_order = Arc::clone(&order);
        coordinator.register(
            "worker",
            tokio::spawn(async move {
                task_cancel.cancelled().await;
                task_order.lock().unwrap().push("worker");
            }),
        );

        let controller_cancel = CancellationToken::new();
        let token = controller_cancel.clone();
        let controller_order = Arc::clone(&order);
        coordinator.set_controller(
            controller_cancel,
            tokio::spawn(async move {
                token.cancelled().await;
                tokio::task::yield_now().await;
                controller_order.lock().unwrap().push("controller");
                ControllerReport {
                    frames_sent: 0,
                    zero_sent: true,
                    final_state: ControllerState::ShuttingDown,
                }
            }),
        );

        coordinator.handle().trigger(ShutdownTrigger::TestEnded);
        let outcome = coordinator.run().await;

        assert_eq!(outcome.trigger, ShutdownTrigger::TestEnded);
        assert!(outcome.controller.unwrap().zero_sent);
        assert_eq!(*order.lock().unwrap(), vec!["controller", "worker"]);
    }

    #[tokio::test]
    async fn repeated_triggers_are_recorded_not_replayed() {
        let mut coordinator = ShutdownCoordinator::new();
        let handle = coordinator.handle();
        handle.trigger(ShutdownTrigger::TransportFault("eof".into()));
        handle.trigger(ShutdownTrigger::TestEnded);
        handle.trigger(ShutdownTrigger::Signal("SIGTERM"));

        let trigger = coordinator.wait().await;
        coordinator.shutdown(trigger).await;
        coordinator.shutdown(ShutdownTrigger::TestEnded).await;
        // Picks up the queued triggers; none of them restarts shutdown.
        let outcome = coordinator.run().await;

        assert_eq!(
            outcome.trigger,
            ShutdownTrigger::TransportFault("eof".into())
        );
        assert_eq!(outcome.ignored.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_task_is_aborted() {
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.register("stuck", tokio::spawn(std::future::pending::<()>()));
        coordinator.handle().trigger(ShutdownTrigger::TestEnded);

        let start = tokio::time::Instant::now();
        coordinator.run().await;
        assert!(start.elapsed() >= TASK_STOP_TIMEOUT);
    }

    #[tokio::test]
    async fn trigger_after_completion_is_harmless() {
        let coordinator = ShutdownCoordinator::new();
        let handle = coordinator.handle();
        handle.trigger(ShutdownTrigger::TestEnded);
        coordinator.run().await;
        handle.trigger(ShutdownTrigger::TestEnded);
    }
}
