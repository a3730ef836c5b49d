use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use mfcblend::instrument::{discovery, ProparInstrument, SimulatedMfc};
use mfcblend::mfc::{Mfc, MfcPair};

mod config;
mod log_cmd;
mod operator;
mod ports;
mod program;
mod run;

use config::SerialSettings;

/// mfc-blend - Calibration gas blending with two Bronkhorst MFCs
#[derive(Parser)]
#[command(name = "mfc-blend")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that talk to the MFCs
#[derive(Args, Debug, Clone)]
pub struct HardwareArgs {
    /// Use simulated MFCs instead of serial hardware
    #[arg(long)]
    simulate: bool,

    /// Load settings from a TOML config file (default: ./mfcblend.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a programme from a workbook
    Run {
        /// Programme workbook (.xlsx)
        #[arg(value_name = "WORKBOOK")]
        workbook: PathBuf,

        /// Gas species (SO2 or NOx)
        #[arg(short, long)]
        species: String,

        /// Programme name (a programme column, Nul, Nulstilling or Afslutning)
        #[arg(short, long)]
        programme: String,

        /// Minutes each step is held
        #[arg(short, long)]
        minutes: Option<f64>,

        /// Shuffle the programme steps
        #[arg(long, conflicts_with = "ordered")]
        shuffle: bool,

        /// Keep the sheet order even if the config asks for shuffling
        #[arg(long)]
        ordered: bool,

        /// Seed for a reproducible shuffle
        #[arg(long)]
        seed: Option<u64>,

        /// Start time, "HH:MM" today or "YYYY-MM-DD HH:MM" (default: now)
        #[arg(long)]
        start: Option<String>,

        /// Directory receiving the run folder
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Also run the Arduino data logger on a background thread
        #[arg(long)]
        with_logger: bool,

        /// Replay logger lines from a file instead of the Arduino
        #[arg(long, value_name = "FILE", requires = "with_logger")]
        logger_input: Option<PathBuf>,

        /// Complete the run on a simulated clock (requires --simulate)
        #[arg(long, requires = "simulate")]
        instant: bool,

        #[command(flatten)]
        hardware: HardwareArgs,
    },

    /// Run the Arduino data logger
    Log {
        /// Log name used in the daily file names
        #[arg(short, long)]
        name: Option<String>,

        /// Seconds to wait after each stored record
        #[arg(short, long)]
        interval: Option<f64>,

        /// Directory holding logs/ and errorlogs/
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Arduino serial port (default: found by manufacturer)
        #[arg(long)]
        port: Option<String>,

        /// Read lines from a file instead of the Arduino
        #[arg(long, value_name = "FILE", conflicts_with = "port")]
        input: Option<PathBuf>,

        /// Append the MFC flows to each record
        #[arg(long)]
        with_mfcs: bool,

        #[command(flatten)]
        hardware: HardwareArgs,
    },

    /// List serial ports and the instruments found on them
    Ports {
        /// Ask every FTDI port for a Bronkhorst measurement
        #[arg(long)]
        probe: bool,

        /// Load settings from a TOML config file (default: ./mfcblend.toml)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Show the programmes of a workbook
    Program {
        /// Programme workbook (.xlsx)
        #[arg(value_name = "WORKBOOK")]
        workbook: PathBuf,

        /// Gas species, to preview the steps of a programme
        #[arg(short, long, requires = "programme")]
        species: Option<String>,

        /// Programme to preview
        #[arg(short, long, requires = "species")]
        programme: Option<String>,

        /// Load settings from a TOML config file (default: ./mfcblend.toml)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            workbook,
            species,
            programme,
            minutes,
            shuffle,
            ordered,
            seed,
            start,
            output,
            with_logger,
            logger_input,
            instant,
            hardware,
        } => run::run(run::RunRequest {
            workbook,
            species,
            programme,
            minutes,
            shuffle: shuffle_flag(shuffle, ordered),
            seed,
            start,
            output,
            with_logger,
            logger_input,
            instant,
            hardware,
        }),
        Commands::Log {
            name,
            interval,
            output,
            port,
            input,
            with_mfcs,
            hardware,
        } => log_cmd::run(name, interval, output, port, input, with_mfcs, hardware),
        Commands::Ports { probe, config } => ports::run(probe, config),
        Commands::Program {
            workbook,
            species,
            programme,
            config,
        } => program::run(workbook, species, programme, config),
    }
}

/// `--shuffle` / `--ordered` as an override of the config file
fn shuffle_flag(shuffle: bool, ordered: bool) -> Option<bool> {
    match (shuffle, ordered) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

/// Connect the two MFCs: simulated, fixed ports, or discovered by manufacturer
pub fn connect_pair(simulate: bool, serial: &SerialSettings) -> Result<MfcPair> {
    let mfcs = if simulate {
        info!("Using simulated MFCs (100 mln/min span, 5 ln/min dilution)");
        vec![
            Mfc::connect(Box::new(SimulatedMfc::new(100.0, "mln/min").with_response(0.995)))?,
            Mfc::connect(Box::new(SimulatedMfc::new(5.0, "ln/min").with_response(1.002)))?,
        ]
    } else {
        let ports = match &serial.mfc_ports {
            Some(ports) => ports.clone(),
            None => discovery::find_mfc_ports(&serial.mfc_manufacturer, serial.baud_rate, serial.timeout)
                .context("MFC discovery failed")?,
        };
        ports
            .iter()
            .map(|port| {
                let instrument = ProparInstrument::open(port, serial.baud_rate, serial.timeout)
                    .with_context(|| format!("Failed to open MFC port {}", port))?;
                Mfc::connect(Box::new(instrument))
                    .with_context(|| format!("Failed to read MFC capacity on {}", port))
            })
            .collect::<Result<Vec<_>>>()?
    };
    Ok(MfcPair::assign(mfcs)?)
}
