//! TOML configuration file support.
//!
//! Settings that rarely change between runs live in `mfcblend.toml`; command
//! line flags override them:
//!
//! ```toml
//! # mfcblend.toml
//! [run]
//! step_minutes = 10
//! shuffle = true
//! output_dir = "runs"
//!
//! [idle]
//! span = 0.01
//! dilution = 0.6
//!
//! [program]
//! color_allowlist = ["00000000", "0", "43"]
//!
//! [program.nox]
//! concentration = "NOx ppb"
//!
//! [serial]
//! mfc_ports = ["/dev/ttyUSB0", "/dev/ttyUSB1"]
//!
//! [logger]
//! name = "flow"
//! interval_secs = 5
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mfcblend::instrument::discovery::{ARDUINO_MANUFACTURER, MFC_MANUFACTURER};
use mfcblend::instrument::DEFAULT_BAUD_RATE;
use mfcblend::logger::{LoggerConfig, ARDUINO_BAUD_RATE};
use mfcblend::mfc::IdleFractions;
use mfcblend::program::{LoaderConfig, PlanOptions, Species, SpeciesColumns};
use mfcblend::sequencer::SequencerConfig;

/// Config file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "mfcblend.toml";

/// Root configuration structure for mfcblend.toml files.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Run defaults.
    #[serde(default)]
    pub run: RunConfig,

    /// Idle flow fractions.
    #[serde(default)]
    pub idle: IdleConfig,

    /// Programme sheet interpretation.
    #[serde(default)]
    pub program: ProgramConfig,

    /// Serial ports and discovery.
    #[serde(default)]
    pub serial: SerialConfig,

    /// Auxiliary data logger.
    #[serde(default)]
    pub logger: LoggerFileConfig,
}

/// Configuration for the run command.
#[derive(Debug, Default, Deserialize)]
pub struct RunConfig {
    /// Minutes each step is held.
    pub step_minutes: Option<f64>,

    /// Shuffle multi-step programmes.
    pub shuffle: Option<bool>,

    /// Seed for a reproducible shuffle.
    pub seed: Option<u64>,

    /// Directory receiving the run folders.
    pub output_dir: Option<PathBuf>,

    /// Seconds between flow samples.
    pub poll_interval_secs: Option<f64>,
}

/// Fraction of each MFC's capacity written when a run stops.
#[derive(Debug, Default, Deserialize)]
pub struct IdleConfig {
    /// Span MFC fraction.
    pub span: Option<f64>,

    /// Dilution MFC fraction.
    pub dilution: Option<f64>,
}

/// Programme sheet settings.
#[derive(Debug, Default, Deserialize)]
pub struct ProgramConfig {
    /// Fill codes that do not mark a row.
    pub color_allowlist: Option<Vec<String>>,

    /// Column used by shift programmes.
    pub shift_column: Option<String>,

    /// Column overrides for SO2.
    pub so2: Option<ColumnsConfig>,

    /// Column overrides for NOx.
    pub nox: Option<ColumnsConfig>,
}

/// Header names of one species' columns.
#[derive(Debug, Default, Deserialize)]
pub struct ColumnsConfig {
    /// Dilution setpoint (%).
    pub dilution_pct: Option<String>,

    /// Dilution flow.
    pub dilution_flow: Option<String>,

    /// Span setpoint (%).
    pub span_pct: Option<String>,

    /// Span flow.
    pub span_flow: Option<String>,

    /// Concentration.
    pub concentration: Option<String>,
}

/// Serial port settings.
#[derive(Debug, Default, Deserialize)]
pub struct SerialConfig {
    /// Fixed MFC ports; discovery is skipped when set.
    pub mfc_ports: Option<Vec<String>>,

    /// USB manufacturer string of the MFC adapters.
    pub mfc_manufacturer: Option<String>,

    /// USB manufacturer string of the Arduino.
    pub arduino_manufacturer: Option<String>,

    /// Propar baud rate.
    pub baud_rate: Option<u32>,

    /// Read timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// Configuration for the data logger.
#[derive(Debug, Default, Deserialize)]
pub struct LoggerFileConfig {
    /// Log name used in daily file names.
    pub name: Option<String>,

    /// Seconds to wait after each stored record.
    pub interval_secs: Option<f64>,

    /// Header row of the daily CSV.
    pub header: Option<Vec<String>>,

    /// Fields in a valid Arduino line.
    pub expected_fields: Option<usize>,

    /// Directory holding logs/ and errorlogs/.
    pub base_dir: Option<PathBuf>,
}

/// Resolved serial settings
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub mfc_ports: Option<Vec<String>>,
    pub mfc_manufacturer: String,
    pub arduino_manufacturer: String,
    pub baud_rate: u32,
    pub arduino_baud_rate: u32,
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Load `explicit`, else `mfcblend.toml` when present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    log::info!("Using configuration from {}", default.display());
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Sheet settings merged over the defaults.
    pub fn loader_config(&self) -> LoaderConfig {
        let defaults = LoaderConfig::default();
        LoaderConfig {
            color_allowlist: self
                .program
                .color_allowlist
                .clone()
                .unwrap_or(defaults.color_allowlist),
            shift_column: self
                .program
                .shift_column
                .clone()
                .unwrap_or(defaults.shift_column),
        }
    }

    /// Column names for a species merged over its defaults.
    pub fn species_columns(&self, species: Species) -> SpeciesColumns {
        let defaults = species.default_columns();
        let overrides = match species {
            Species::So2 => self.program.so2.as_ref(),
            Species::Nox => self.program.nox.as_ref(),
        };
        let Some(o) = overrides else {
            return defaults;
        };
        SpeciesColumns {
            dilution_pct: o.dilution_pct.clone().unwrap_or(defaults.dilution_pct),
            dilution_flow: o.dilution_flow.clone().unwrap_or(defaults.dilution_flow),
            span_pct: o.span_pct.clone().unwrap_or(defaults.span_pct),
            span_flow: o.span_flow.clone().unwrap_or(defaults.span_flow),
            concentration: o.concentration.clone().unwrap_or(defaults.concentration),
        }
    }

    /// Plan options; CLI values win over the file.
    pub fn plan_options(
        &self,
        minutes: Option<f64>,
        shuffle: Option<bool>,
        seed: Option<u64>,
    ) -> PlanOptions {
        let defaults = PlanOptions::default();
        PlanOptions {
            shuffle: shuffle.or(self.run.shuffle).unwrap_or(defaults.shuffle),
            seed: seed.or(self.run.seed),
            step_minutes: minutes
                .or(self.run.step_minutes)
                .unwrap_or(defaults.step_minutes),
        }
    }

    /// Sequencer settings merged over the defaults.
    pub fn sequencer_config(&self) -> Result<SequencerConfig> {
        let defaults = SequencerConfig::default();
        let idle = IdleFractions {
            span: self.idle.span.unwrap_or(defaults.idle.span),
            dilution: self.idle.dilution.unwrap_or(defaults.idle.dilution),
        };
        idle.validate()?;
        let poll_interval = match self.run.poll_interval_secs {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid poll interval: {} s", secs))?,
            None => defaults.poll_interval,
        };
        Ok(SequencerConfig {
            poll_interval,
            idle,
        })
    }

    /// Output directory for run folders.
    pub fn output_dir(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.run.output_dir.clone())
            .unwrap_or_else(|| PathBuf::from("runs"))
    }

    /// Logger settings merged over the defaults.
    pub fn logger_config(&self) -> Result<LoggerConfig> {
        let defaults = LoggerConfig::default();
        let interval = match self.logger.interval_secs {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .with_context(|| format!("Invalid logger interval: {} s", secs))?,
            None => defaults.interval,
        };
        Ok(LoggerConfig {
            interval,
            name: self.logger.name.clone().unwrap_or(defaults.name),
            header: self.logger.header.clone().unwrap_or(defaults.header),
            expected_fields: self
                .logger
                .expected_fields
                .unwrap_or(defaults.expected_fields),
            base_dir: self.logger.base_dir.clone().unwrap_or(defaults.base_dir),
        })
    }

    /// Serial settings merged over the defaults.
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            mfc_ports: self.serial.mfc_ports.clone(),
            mfc_manufacturer: self
                .serial
                .mfc_manufacturer
                .clone()
                .unwrap_or_else(|| MFC_MANUFACTURER.to_string()),
            arduino_manufacturer: self
                .serial
                .arduino_manufacturer
                .clone()
                .unwrap_or_else(|| ARDUINO_MANUFACTURER.to_string()),
            baud_rate: self.serial.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            arduino_baud_rate: ARDUINO_BAUD_RATE,
            timeout: Duration::from_millis(self.serial.timeout_ms.unwrap_or(1000)),
        }
    }
}
