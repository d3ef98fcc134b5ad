use heaterlink_control::{RunStore, SettingsRecord, Waveform};

use crate::cmd::SettingsArgs;
use crate::exit::{config_error, store_error, CliResult, SUCCESS};
use crate::output::{print_settings, OutputFormat};

pub fn run(args: SettingsArgs, format: OutputFormat) -> CliResult<i32> {
    let waveform = Waveform::parse(&args.mode, args.frequency, args.amplitude)
        .map_err(|err| config_error("invalid settings", err))?;
    let store = RunStore::open(&args.data_dir, &args.run_id)
        .map_err(|err| store_error("open run store failed", err))?;

    let record = SettingsRecord::new(
        waveform.mode.as_str(),
        waveform.frequency,
        waveform.amplitude,
    );
    store
        .append_settings(&record)
        .map_err(|err| store_error("write settings failed", err))?;

    #[cfg(unix)]
    if let Some(socket) = &args.notify {
        heaterlink_control::send_notification(
            socket,
            heaterlink_control::Notification::SettingsChanged,
        )
        .map_err(|err| crate::exit::control_error("notify failed", err))?;
    }

    print_settings(store.run_id(), &record, format);
    Ok(SUCCESS)
}
