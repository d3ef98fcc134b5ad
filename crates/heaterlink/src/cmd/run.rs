use heaterlink_control::{HeaterConstants, RunStore, Session, SessionConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cmd::{open_link, parse_duration, RunArgs};
use crate::exit::{
    config_error, control_error, io_error, shutdown_code, store_error, transport_error, CliError,
    CliResult, USAGE,
};
use crate::output::{print_report, OutputFormat};

/// Notifications buffered between the control socket and the watcher.
const NOTIFICATION_DEPTH: usize = 16;

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let tick = parse_duration(&args.tick)?;
    let heaters = HeaterConstants {
        supply_voltage: args.supply_voltage,
        resistance: pair("--resistance", &args.resistance)?,
        scalar: pair("--scalar", &args.scalar)?,
    }
    .validate()
    .map_err(|err| config_error("invalid heater constants", err))?;

    let store = RunStore::open(&args.data_dir, &args.run_id)
        .map_err(|err| store_error("open run store failed", err))?;
    let telemetry = store
        .telemetry()
        .map_err(|err| store_error("open telemetry file failed", err))?;

    let link = open_link(args.port.as_deref(), args.baud)?;
    if let Err(err) = link.clear_buffers() {
        warn!(%err, "could not clear serial buffers");
    }
    let port = link.name().to_string();
    let (reader, writer) = link
        .split()
        .map_err(|err| transport_error("split serial link failed", err))?;

    let config = SessionConfig {
        tick,
        queue_capacity: args.queue_capacity,
        heaters,
        os_signals: true,
        ..SessionConfig::default()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime start failed", err))?;

    let report = runtime.block_on(async {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_DEPTH);

        // Bound before any task starts so a bad path fails without touching
        // the heaters.
        #[cfg(unix)]
        let socket = match &args.control_socket {
            Some(path) => Some(
                heaterlink_transport::ControlSocket::bind(path)
                    .map_err(|err| transport_error("control socket bind failed", err))?,
            ),
            None => None,
        };

        let mut session = Session::start(
            config,
            reader,
            writer,
            telemetry,
            store.settings(),
            notify_rx,
        )
        .map_err(|err| control_error("session start failed", err))?;

        #[cfg(unix)]
        if let Some(socket) = socket {
            let token = session.task_token();
            session.register(
                "control-socket",
                tokio::spawn(heaterlink_control::serve(socket, notify_tx.clone(), token)),
            );
        }
        drop(notify_tx);

        info!(run_id = store.run_id(), port = %port, "run started");
        Ok::<_, CliError>(session.run().await)
    })?;

    print_report(store.run_id(), &report, format);
    Ok(shutdown_code(&report.trigger))
}

fn pair(flag: &str, values: &[f64]) -> CliResult<[f64; 2]> {
    <[f64; 2]>::try_from(values)
        .map_err(|_| CliError::new(USAGE, format!("{flag} takes exactly two values")))
}
