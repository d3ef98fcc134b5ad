use std::io::{IsTerminal, Write};

use chrono::Utc;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use heaterlink_control::{SessionReport, SettingsRecord};
use heaterlink_frame::{DutyCommand, Frame, Message};
use heaterlink_transport::PortInfo;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

#[derive(Serialize)]
struct PortOutput<'a> {
    name: &'a str,
    kind: &'a str,
    manufacturer: Option<&'a str>,
    product: Option<&'a str>,
    serial_number: Option<&'a str>,
}

impl<'a> From<&'a PortInfo> for PortOutput<'a> {
    fn from(port: &'a PortInfo) -> Self {
        Self {
            name: &port.name,
            kind: port.kind.as_str(),
            manufacturer: port.manufacturer.as_deref(),
            product: port.product.as_deref(),
            serial_number: port.serial_number.as_deref(),
        }
    }
}

pub fn print_ports(ports: &[PortInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out: Vec<PortOutput<'_>> = ports.iter().map(PortOutput::from).collect();
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = table(vec!["PORT", "TYPE", "MANUFACTURER", "PRODUCT", "SERIAL"]);
            for port in ports {
                table.add_row(vec![
                    port.name.clone(),
                    port.kind.as_str().to_string(),
                    port.manufacturer.clone().unwrap_or_default(),
                    port.product.clone().unwrap_or_default(),
                    port.serial_number.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if ports.is_empty() {
                println!("no serial ports found");
            }
            for port in ports {
                let detail = [port.manufacturer.as_deref(), port.product.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{} ({}) {}", port.name, port.kind.as_str(), detail);
            }
        }
        OutputFormat::Raw => {
            for port in ports {
                println!("{}", port.name);
            }
        }
    }
}

#[derive(Serialize)]
struct FrameOutput {
    header: &'static str,
    header_byte: u8,
    field_a: u32,
    field_b: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    millivolts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    milliamps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duty: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fault_code: Option<u32>,
    timestamp: String,
}

impl From<&Frame> for FrameOutput {
    fn from(frame: &Frame) -> Self {
        let mut out = FrameOutput {
            header: frame.header().name(),
            header_byte: frame.header().as_byte(),
            field_a: frame.field_a(),
            field_b: frame.field_b(),
            channel: frame.header().channel(),
            millivolts: None,
            milliamps: None,
            duty: None,
            fault_code: None,
            timestamp: Utc::now().to_rfc3339(),
        };
        match frame.message() {
            Message::Telemetry(reading) => {
                out.millivolts = Some(reading.millivolts);
                out.milliamps = Some(reading.milliamps);
            }
            Message::Duty(DutyCommand::Heater0(p)) => out.duty = Some([p, 0.0]),
            Message::Duty(DutyCommand::Heater1(p)) => out.duty = Some([0.0, p]),
            Message::Duty(DutyCommand::Both { heater0, heater1 }) => {
                out.duty = Some([heater0, heater1])
            }
            Message::HeaterNotFound(fault) => out.fault_code = Some(fault.code),
        }
        out
    }
}

fn describe(frame: &Frame) -> String {
    match frame.message() {
        Message::Telemetry(r) => format!(
            "heater {} {:.2} mV {:.2} mA",
            r.channel, r.millivolts, r.milliamps
        ),
        Message::Duty(DutyCommand::Heater0(p)) => format!("duty heater 0 {p:.3}%"),
        Message::Duty(DutyCommand::Heater1(p)) => format!("duty heater 1 {p:.3}%"),
        Message::Duty(DutyCommand::Both { heater0, heater1 }) => {
            format!("duty {heater0:.3}% / {heater1:.3}%")
        }
        Message::HeaterNotFound(fault) => format!("heater not found (code {})", fault.code),
    }
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&FrameOutput::from(frame)),
        OutputFormat::Table => {
            let mut table = table(vec!["HEADER", "FIELD A", "FIELD B", "DECODED"]);
            table.add_row(vec![
                frame.header().name().to_string(),
                frame.field_a().to_string(),
                frame.field_b().to_string(),
                describe(frame),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} {}", frame.header().name(), describe(frame));
        }
        OutputFormat::Raw => print_raw(&frame.to_bytes()),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

#[derive(Serialize)]
struct ReportOutput<'a> {
    run_id: &'a str,
    trigger: String,
    fault: bool,
    frames_sent: u64,
    zero_sent: bool,
    samples_queued: u64,
    samples_persisted: u64,
    samples_dropped: u64,
    store_failures: u64,
    device_errors: u64,
    frames_rejected: u64,
}

pub fn print_report(run_id: &str, report: &SessionReport, format: OutputFormat) {
    let stats = report.stats;
    let out = ReportOutput {
        run_id,
        trigger: report.trigger.to_string(),
        fault: report.trigger.is_fault(),
        frames_sent: report.frames_sent(),
        zero_sent: report.zero_sent(),
        samples_queued: stats.samples_queued,
        samples_persisted: stats.samples_persisted,
        samples_dropped: stats.samples_dropped,
        store_failures: stats.store_failures,
        device_errors: stats.device_errors,
        frames_rejected: stats.frames_rejected,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = table(vec!["FIELD", "VALUE"]);
            table
                .add_row(vec!["run".to_string(), out.run_id.to_string()])
                .add_row(vec!["ended by".to_string(), out.trigger.clone()])
                .add_row(vec!["frames sent".to_string(), out.frames_sent.to_string()])
                .add_row(vec!["zero sent".to_string(), out.zero_sent.to_string()])
                .add_row(vec![
                    "samples persisted".to_string(),
                    out.samples_persisted.to_string(),
                ])
                .add_row(vec![
                    "samples dropped".to_string(),
                    out.samples_dropped.to_string(),
                ])
                .add_row(vec![
                    "device errors".to_string(),
                    out.device_errors.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "run={} ended_by=\"{}\" frames_sent={} zero_sent={} persisted={} dropped={} device_errors={}",
                out.run_id,
                out.trigger,
                out.frames_sent,
                out.zero_sent,
                out.samples_persisted,
                out.samples_dropped,
                out.device_errors
            );
        }
    }
}

pub fn print_settings(run_id: &str, record: &SettingsRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct SettingsOutput<'a> {
                run_id: &'a str,
                #[serde(flatten)]
                record: &'a SettingsRecord,
            }
            print_json(&SettingsOutput { run_id, record });
        }
        OutputFormat::Table => {
            let mut table = table(vec!["RUN", "MODE", "FREQUENCY", "AMPLITUDE", "TIME"]);
            table.add_row(vec![
                run_id.to_string(),
                record.test_mode.clone(),
                record.frequency.to_string(),
                record.amplitude.to_string(),
                record.time.to_rfc3339(),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "run={} mode={} frequency={} amplitude={}",
                run_id, record.test_mode, record.frequency, record.amplitude
            );
        }
    }
}
