use anyhow::{Context, Result};
use log::info;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use mfcblend::logger::{self, LineReader, LineSource, Logger};
use mfcblend::sequencer::{CancellationToken, SystemClock};

use super::config::Config;
use super::HardwareArgs;

/// Run the Arduino data logger in the foreground
pub fn run(
    name: Option<String>,
    interval: Option<f64>,
    output: Option<PathBuf>,
    port: Option<String>,
    input: Option<PathBuf>,
    with_mfcs: bool,
    hardware: HardwareArgs,
) -> Result<()> {
    let config = Config::load(hardware.config.as_deref())?;
    let serial = config.serial_settings();

    let mut logger_config = config.logger_config()?;
    if let Some(name) = name {
        logger_config.name = name;
    }
    if let Some(secs) = interval {
        logger_config.interval = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid interval: {} s", secs))?;
    }
    if let Some(dir) = output {
        logger_config.base_dir = dir;
    }

    let source: Box<dyn LineSource + Send> = match (input, port) {
        (Some(path), _) => {
            let file = File::open(&path)
                .with_context(|| format!("Failed to open input {}", path.display()))?;
            Box::new(LineReader::new(BufReader::new(file)))
        }
        (None, Some(port)) => Box::new(
            logger::open_serial(&port, serial.arduino_baud_rate, serial.timeout)
                .with_context(|| format!("Failed to open Arduino port {}", port))?,
        ),
        (None, None) => Box::new(logger::find_arduino(
            &serial.arduino_manufacturer,
            serial.arduino_baud_rate,
            serial.timeout,
        )?),
    };

    let mut logger = Logger::new(logger_config, source, SystemClock)?;
    if with_mfcs {
        let pair = super::connect_pair(hardware.simulate, &serial)?;
        logger = logger.with_probe(Box::new(pair));
    }

    let token = CancellationToken::new();
    spawn_stop_listener(token.clone())?;
    println!("Data logging started; type 'stop' and press enter to end.");

    let stats = logger.run(&token)?;
    info!("Logger finished");
    println!(
        "Stored {} record(s), rejected {}, {} new day file(s)",
        stats.records, stats.rejected, stats.rollovers
    );
    Ok(())
}

/// Cancel `token` when the operator types `stop` or `abort`
fn spawn_stop_listener(token: CancellationToken) -> Result<()> {
    thread::Builder::new()
        .name("logger-console".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let command = line.trim();
                if command.eq_ignore_ascii_case("stop") || command.eq_ignore_ascii_case("abort") {
                    token.cancel();
                    break;
                }
            }
        })
        .context("Failed to spawn logger console thread")?;
    Ok(())
}
