use std::f64::consts::PI;
use std::str::FromStr;

use heaterlink_frame::DutyCommand;
use tokio::time::Instant;

use crate::error::ConfigError;

/// What the waveform amplitude is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Amplitude in watts.
    Power,
    /// Amplitude in kelvin. Recognized but not implemented.
    Temperature,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Power => "power",
            Mode::Temperature => "temperature",
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "power" => Ok(Mode::Power),
            "temperature" => Ok(Mode::Temperature),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

/// The heating waveform requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waveform {
    pub mode: Mode,
    /// Hz, > 0.
    pub frequency: f64,
    /// Unit depends on `mode`, >= 0.
    pub amplitude: f64,
}

impl Waveform {
    /// Heaters off until the first settings arrive.
    pub const IDLE: Waveform = Waveform {
        mode: Mode::Power,
        frequency: 0.1,
        amplitude: 0.0,
    };

    /// Parse and check a settings triple.
    pub fn parse(mode: &str, frequency: f64, amplitude: f64) -> Result<Self, ConfigError> {
        Waveform {
            mode: mode.parse()?,
            frequency,
            amplitude,
        }
        .validate()
    }

    /// Reject anything the control loop cannot run.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.mode == Mode::Temperature {
            return Err(ConfigError::UnsupportedMode(self.mode));
        }
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(ConfigError::InvalidFrequency(self.frequency));
        }
        if !self.amplitude.is_finite() || self.amplitude < 0.0 {
            return Err(ConfigError::InvalidAmplitude(self.amplitude));
        }
        Ok(self)
    }
}

/// Parameters the control loop reads on every tick.
///
/// Replaced as a whole, never field by field, so a tick always sees one
/// consistent waveform together with its epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlParameters {
    pub waveform: Waveform,
    /// When the current waveform started.
    pub epoch: Instant,
}

impl ControlParameters {
    pub fn new(waveform: Waveform, epoch: Instant) -> Self {
        Self { waveform, epoch }
    }

    pub fn idle(epoch: Instant) -> Self {
        Self::new(Waveform::IDLE, epoch)
    }
}

/// Physical constants of the rig, fixed for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaterConstants {
    /// Supply voltage in volts.
    pub supply_voltage: f64,
    /// Heater resistance in ohms, per channel.
    pub resistance: [f64; 2],
    /// Thermal-mass scalar, per channel.
    pub scalar: [f64; 2],
}

impl Default for HeaterConstants {
    fn default() -> Self {
        Self {
            supply_voltage: 12.0,
            resistance: [0.05, 0.05],
            scalar: [1.0, 1.0],
        }
    }
}

impl HeaterConstants {
    pub fn validate(self) -> Result<Self, ConfigError> {
        let checks = [
            ("supply voltage", self.supply_voltage),
            ("heater 0 resistance", self.resistance[0]),
            ("heater 1 resistance", self.resistance[1]),
            ("heater 0 scalar", self.scalar[0]),
            ("heater 1 scalar", self.scalar[1]),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidHeaterConstant { name, value });
            }
        }
        Ok(self)
    }

    /// Unclamped duty percentage for `heater` at `elapsed` seconds into the waveform.
    ///
    /// A rectified sine power reference `A·sin(2πft) + A` is converted to the
    /// voltage that dissipates it in the heater, as a share of the supply.
    pub fn raw_duty(&self, heater: usize, waveform: &Waveform, elapsed: f64) -> f64 {
        let power = waveform.amplitude * (2.0 * PI * waveform.frequency * elapsed).sin()
            + waveform.amplitude;
        let volts = (self.scalar[heater] * self.resistance[heater] * power.max(0.0)).sqrt();
        volts * 100.0 / self.supply_voltage
    }

    /// Duty cycles for both heaters at `now`, clamped to `[0, 100]`.
    pub fn duty_cycles(
        &self,
        params: &ControlParameters,
        now: Instant,
    ) -> Result<DutyCycles, ConfigError> {
        match params.waveform.mode {
            Mode::Power => {}
            Mode::Temperature => return Err(ConfigError::UnsupportedMode(Mode::Temperature)),
        }
        let elapsed = now.saturating_duration_since(params.epoch).as_secs_f64();
        Ok(DutyCycles {
            heater0: clamp_percent(self.raw_duty(0, &params.waveform, elapsed)),
            heater1: clamp_percent(self.raw_duty(1, &params.waveform, elapsed)),
        })
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Duty cycles currently commanded, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyCycles {
    pub heater0: f64,
    pub heater1: f64,
}

impl DutyCycles {
    pub const ZERO: DutyCycles = DutyCycles {
        heater0: 0.0,
        heater1: 0.0,
    };

    /// Duty cycle of `channel` (0 or 1).
    pub fn get(&self, channel: u8) -> Option<f64> {
        match channel {
            0 => Some(self.heater0),
            1 => Some(self.heater1),
            _ => None,
        }
    }

    /// The combined command that carries both setpoints.
    pub fn to_command(self) -> DutyCommand {
        DutyCommand::Both {
            heater0: self.heater0,
            heater1: self.heater1,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn waveform(amplitude: f64) -> Waveform {
        Waveform {
            mode: Mode::Power,
            frequency: 0.1,
            amplitude,
        }
    }

    #[test]
    fn duty_at_zero_crossing_matches_reference() {
        let constants = HeaterConstants::default();
        // sin(2π·0.1·0) = 0, so duty = sqrt(0.05·1·1)·100/12.
        let duty = constants.raw_duty(0, &waveform(1.0), 0.0);
        let expected = 0.05f64.sqrt() * 100.0 / 12.0;
        assert!((duty - expected).abs() < 1e-12);
        assert!((duty - 1.8634).abs() < 1e-4);

        // Half a period later the sine is back at zero.
        let half_period = constants.raw_duty(0, &waveform(1.0), 5.0);
        assert!((half_period - expected).abs() < 1e-9);
    }

    #[test]
    fn duty_peaks_and_troughs() {
        let constants = HeaterConstants::default();
        // Quarter period: sin = 1, power = 2A.
        let peak = constants.raw_duty(1, &waveform(1.0), 2.5);
        assert!((peak - (0.1f64).sqrt() * 100.0 / 12.0).abs() < 1e-9);
        // Three quarters: sin = -1, power = 0.
        let trough = constants.raw_duty(1, &waveform(1.0), 7.5);
        assert!(trough.abs() < 1e-6);
    }

    #[test]
    fn duty_cycles_are_clamped() {
        let constants = HeaterConstants {
            supply_voltage: 1.0,
            resistance: [100.0, 0.05],
            scalar: [1.0, 1.0],
        };
        let epoch = Instant::now();
        let params = ControlParameters::new(waveform(1000.0), epoch);
        let duty = constants
            .duty_cycles(&params, epoch + Duration::from_millis(2500))
            .unwrap();
        assert_eq!(duty.heater0, 100.0);
        assert!(duty.heater1 <= 100.0);
    }

    #[test]
    fn idle_waveform_is_zero_duty() {
        let epoch = Instant::now();
        let duty = HeaterConstants::default()
            .duty_cycles(&ControlParameters::idle(epoch), epoch + Duration::from_secs(3))
            .unwrap();
        assert_eq!(duty, DutyCycles::ZERO);
    }

    #[test]
    fn temperature_mode_fails_fast() {
        let epoch = Instant::now();
        let params = ControlParameters::new(
            Waveform {
                mode: Mode::Temperature,
                ..waveform(1.0)
            },
            epoch,
        );
        let err = HeaterConstants::default()
            .duty_cycles(&params, epoch)
            .unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedMode(Mode::Temperature));
    }

    #[test]
    fn waveform_parse_validates() {
        assert_eq!(Waveform::parse("power", 0.1, 1.0).unwrap(), waveform(1.0));
        assert!(matches!(
            Waveform::parse("voltage", 0.1, 1.0),
            Err(ConfigError::UnknownMode(m)) if m == "voltage"
        ));
        assert_eq!(
            Waveform::parse("temperature", 0.1, 1.0),
            Err(ConfigError::UnsupportedMode(Mode::Temperature))
        );
        assert!(matches!(
            Waveform::parse("power", 0.0, 1.0),
            Err(ConfigError::InvalidFrequency(_))
        ));
        assert!(matches!(
            Waveform::parse("power", 0.1, -1.0),
            Err(ConfigError::InvalidAmplitude(_))
        ));
        assert!(matches!(
            Waveform::parse("power", f64::NAN, 1.0),
            Err(ConfigError::InvalidFrequency(_))
        ));
    }

    #[test]
    fn heater_constants_validate() {
        assert!(HeaterConstants::default().validate().is_ok());
        let bad = HeaterConstants {
            resistance: [0.05, 0.0],
            ..HeaterConstants::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidHeaterConstant { name: "heater 1 resistance", .. })
        ));
    }

    #[test]
    fn duty_cycles_by_channel() {
        let duty = DutyCycles {
            heater0: 10.0,
            heater1: 20.0,
        };
        assert_eq!(duty.get(0), Some(10.0));
        assert_eq!(duty.get(1), Some(20.0));
        assert_eq!(duty.get(2), None);
        assert_eq!(
            duty.to_command(),
            DutyCommand::Both {
                heater0: 10.0,
                heater1: 20.0
            }
        );
    }
}
