//! Per-run CSV storage.
//!
//! Each run owns a directory `<data-dir>/<run-id>/` holding two append-only
//! tables: `telemetry.csv` and `settings.csv`. Settings are read back by
//! taking the last row.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, StoreError};
use crate::params::Waveform;
use crate::router::TelemetrySample;

pub const TELEMETRY_FILE: &str = "telemetry.csv";
pub const SETTINGS_FILE: &str = "settings.csv";

const MAX_RUN_ID_LEN: usize = 64;

/// Where telemetry samples go.
pub trait TelemetryStore: Send {
    fn append(&mut self, sample: &TelemetrySample) -> Result<(), StoreError>;
    fn flush(&mut self) -> Result<(), StoreError>;
}

/// Where the current settings are read from.
pub trait SettingsSource: Send {
    /// The most recent settings row, if any.
    fn latest(&mut self) -> Result<Option<SettingsRecord>, StoreError>;
}

/// One row of the settings history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub test_mode: String,
    pub frequency: f64,
    pub amplitude: f64,
    pub time: DateTime<Utc>,
}

impl SettingsRecord {
    pub fn new(test_mode: impl Into<String>, frequency: f64, amplitude: f64) -> Self {
        Self {
            test_mode: test_mode.into(),
            frequency,
            amplitude,
            time: Utc::now(),
        }
    }

    /// Validate the row and turn it into a waveform.
    pub fn to_waveform(&self) -> Result<Waveform, ConfigError> {
        Waveform::parse(&self.test_mode, self.frequency, self.amplitude)
    }
}

#[derive(Debug, Serialize)]
struct TelemetryRow {
    heater_num: u8,
    #[serde(rename = "mV")]
    millivolts: f64,
    #[serde(rename = "mA")]
    milliamps: f64,
    duty_cycle: f64,
    time: DateTime<Utc>,
}

impl From<&TelemetrySample> for TelemetryRow {
    fn from(sample: &TelemetrySample) -> Self {
        Self {
            heater_num: sample.channel,
            millivolts: sample.millivolts,
            milliamps: sample.milliamps,
            duty_cycle: sample.duty_cycle,
            time: sample.time,
        }
    }
}

/// Check that `run_id` is safe to use as a directory name.
pub fn validate_run_id(run_id: &str) -> Result<(), ConfigError> {
    let valid = !run_id.is_empty()
        && run_id.len() <= MAX_RUN_ID_LEN
        && run_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidRunId(run_id.to_string()))
    }
}

/// Storage namespace for one test run.
#[derive(Debug, Clone)]
pub struct RunStore {
    run_id: String,
    dir: PathBuf,
}

impl RunStore {
    /// Open (creating if needed) the directory for `run_id` under `data_dir`.
    pub fn open(data_dir: impl AsRef<Path>, run_id: &str) -> Result<Self, StoreError> {
        validate_run_id(run_id)?;
        let dir = data_dir.as_ref().join(run_id);
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        info!(run_id, dir = %dir.display(), "run store opened");
        Ok(Self {
            run_id: run_id.to_string(),
            dir,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn telemetry_path(&self) -> PathBuf {
        self.dir.join(TELEMETRY_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn telemetry(&self) -> Result<CsvTelemetryStore, StoreError> {
        CsvTelemetryStore::open(self.telemetry_path())
    }

    pub fn settings(&self) -> CsvSettingsSource {
        CsvSettingsSource::new(self.settings_path())
    }

    /// Append one row to the settings history.
    pub fn append_settings(&self, record: &SettingsRecord) -> Result<(), StoreError> {
        let path = self.settings_path();
        let mut writer = append_writer(&path)?;
        writer.serialize(record)?;
        writer
            .flush()
            .map_err(|source| StoreError::Io { path, source })?;
        debug!(
            mode = %record.test_mode,
            frequency = record.frequency,
            amplitude = record.amplitude,
            "settings appended"
        );
        Ok(())
    }
}

fn append_writer(path: &Path) -> Result<csv::Writer<File>, StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let empty = file.metadata().map_err(io_err)?.len() == 0;
    Ok(csv::WriterBuilder::new()
        .has_headers(empty)
        .from_writer(file))
}

/// Append-only telemetry table. Every row is flushed as it is written.
pub struct CsvTelemetryStore {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: u64,
}

impl CsvTelemetryStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let writer = append_writer(&path)?;
        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended through this handle.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl TelemetryStore for CsvTelemetryStore {
    fn append(&mut self, sample: &TelemetrySample) -> Result<(), StoreError> {
        self.writer.serialize(TelemetryRow::from(sample))?;
        self.flush()?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.writer.flush().map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

/// Reads the latest row of a settings table.
#[derive(Debug, Clone)]
pub struct CsvSettingsSource {
    path: PathBuf,
}

impl CsvSettingsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsSource for CsvSettingsSource {
    fn latest(&mut self) -> Result<Option<SettingsRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut last = None;
        for record in reader.deserialize() {
            last = Some(record?);
        }
        Ok(last)
    }
}
