//! The zero-duty frame goes out exactly once, before the link is released,
//! whatever ends the session.

mod common;

use std::time::Duration;

use common::{Op, Recorder, ZERO_FRAME};
use heaterlink_control::{
    ControlParameters, DutyCycleController, DutyCycles, HeaterConstants, Mode,
    ShutdownCoordinator, ShutdownTrigger, Waveform, DEFAULT_TICK, SHUTDOWN_GRACE,
};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

const POWER: Waveform = Waveform {
    mode: Mode::Power,
    frequency: 0.1,
    amplitude: 1.0,
};

fn spawn_controller(coordinator: &mut ShutdownCoordinator, link: common::RecordingLink) {
    let (_params_tx, params_rx) = watch::channel(ControlParameters::new(POWER, Instant::now()));
    let (duty_tx, _duty_rx) = watch::channel(DutyCycles::ZERO);
    let controller = DutyCycleController::new(
        link,
        params_rx,
        HeaterConstants::default(),
        DEFAULT_TICK,
        duty_tx,
    );
    let cancel = CancellationToken::new();
    coordinator.set_controller(
        cancel.clone(),
        tokio::spawn(controller.run(cancel, coordinator.handle())),
    );
}

fn spawn_worker(coordinator: &mut ShutdownCoordinator, recorder: &Recorder) {
    let cancel = coordinator.task_token();
    let recorder = recorder.clone();
    coordinator.register(
        "worker",
        tokio::spawn(async move {
            cancel.cancelled().await;
            recorder.note("worker stopped");
        }),
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_triggers_send_one_zero_frame_before_close() {
    let recorder = Recorder::default();
    let mut coordinator = ShutdownCoordinator::new();
    spawn_controller(&mut coordinator, recorder.link());
    spawn_worker(&mut coordinator, &recorder);

    let triggers = [
        ShutdownTrigger::TestEnded,
        ShutdownTrigger::Signal("SIGTERM"),
        ShutdownTrigger::TransportFault("unplugged".into()),
    ];
    for trigger in triggers.clone() {
        let handle = coordinator.handle();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(2)).await;
            handle.trigger(trigger);
        });
    }

    let started = Instant::now();
    let outcome = coordinator.run().await;

    assert!(triggers.contains(&outcome.trigger));
    assert_eq!(outcome.ignored.len(), 2);
    assert!(started.elapsed() >= Duration::from_secs(2) + SHUTDOWN_GRACE);

    let zero = Op::Write(ZERO_FRAME.to_vec());
    assert_eq!(recorder.count(&zero), 1);
    assert!(recorder.frames().len() > 1, "controller ticked before shutdown");
    assert_eq!(recorder.frames().last(), Some(&ZERO_FRAME.to_vec()));

    let zero_at = recorder.position(&zero).unwrap();
    let close_at = recorder.position(&Op::Close).unwrap();
    let worker_at = recorder.position(&Op::Note("worker stopped")).unwrap();
    assert!(zero_at < close_at);
    assert!(close_at < worker_at);
    assert_eq!(recorder.count(&Op::Close), 1);

    let report = outcome.controller.unwrap();
    assert!(report.zero_sent);
    assert_eq!(report.frames_sent as usize, recorder.frames().len());
}

#[tokio::test(start_paused = true)]
async fn zero_frame_is_attempted_on_dead_link() {
    let recorder = Recorder::default();
    let mut coordinator = ShutdownCoordinator::new();
    spawn_controller(&mut coordinator, recorder.failing_link(3));
    spawn_worker(&mut coordinator, &recorder);

    let outcome = coordinator.run().await;

    assert!(matches!(outcome.trigger, ShutdownTrigger::TransportFault(_)));
    let report = outcome.controller.unwrap();
    assert!(!report.zero_sent);
    assert_eq!(report.frames_sent, 3);

    let ops = recorder.ops();
    let failed: Vec<&Op> = ops.iter().filter(|op| matches!(op, Op::Failed(_))).collect();
    // The failing tick, then the zero frame; nothing in between.
    assert_eq!(failed.len(), 2);
    assert_eq!(*failed[1], Op::Failed(ZERO_FRAME.to_vec()));

    let zero_at = recorder.position(&Op::Failed(ZERO_FRAME.to_vec())).unwrap();
    let close_at = recorder.position(&Op::Close).unwrap();
    assert!(zero_at < close_at);
    assert!(close_at < recorder.position(&Op::Note("worker stopped")).unwrap());
}

#[tokio::test(start_paused = true)]
async fn cancelling_while_idle_still_zeroes() {
    let recorder = Recorder::default();
    let mut coordinator = ShutdownCoordinator::new();
    spawn_controller(&mut coordinator, recorder.link());
    coordinator.handle().trigger(ShutdownTrigger::Signal("SIGINT"));

    let outcome = coordinator.run().await;
    assert_eq!(outcome.trigger, ShutdownTrigger::Signal("SIGINT"));
    assert_eq!(recorder.frames().last(), Some(&ZERO_FRAME.to_vec()));
    assert_eq!(recorder.ops().last(), Some(&Op::Close));
}
