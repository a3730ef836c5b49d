use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use crossbeam_channel::Sender;
use log::{info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use mfcblend::logger::{self, ChannelProbe, LineReader, LineSource, Logger, LoggerHandle};
use mfcblend::mfc::MfcPair;
use mfcblend::program::{ProgramSheet, Programme, RunPlan, Species, StepKind};
use mfcblend::record::{CommentFile, RunFolder, Sample};
use mfcblend::sequencer::{
    CancellationToken, Clock, ManualClock, RunOutcome, RunOutput, Sequencer, SystemClock,
};

use super::config::{Config, SerialSettings};
use super::operator::{self, StatusObserver};
use super::HardwareArgs;

/// Capacity of the sample channel between the sequencer and the logger thread
const SAMPLE_CHANNEL_CAPACITY: usize = 64;

/// Context added to a sequencer error; the idle write on that path is best effort
const RUN_FAILED: &str = "Run stopped on an error; an attempt was made to set the MFCs to idle";

/// Everything the run command was asked to do
pub struct RunRequest {
    pub workbook: PathBuf,
    pub species: String,
    pub programme: String,
    pub minutes: Option<f64>,
    pub shuffle: Option<bool>,
    pub seed: Option<u64>,
    pub start: Option<String>,
    pub output: Option<PathBuf>,
    pub with_logger: bool,
    pub logger_input: Option<PathBuf>,
    pub instant: bool,
    pub hardware: HardwareArgs,
}

/// Run a programme from a workbook
pub fn run(request: RunRequest) -> Result<()> {
    let config = Config::load(request.hardware.config.as_deref())?;

    let species: Species = request.species.parse()?;
    let sheet = ProgramSheet::open(&request.workbook, config.loader_config())
        .with_context(|| format!("Failed to read workbook {}", request.workbook.display()))?;
    let programme = Programme::parse(&request.programme);
    let loaded = sheet.load(&programme, &config.species_columns(species))?;

    let now = Local::now();
    let start = match &request.start {
        Some(text) => parse_start(text, now)?,
        None => now,
    };
    let options = config.plan_options(request.minutes, request.shuffle, request.seed);
    let plan = RunPlan::build(loaded, species, &options, start)?;
    if plan.is_empty() {
        println!("{} has no steps to run.", plan.programme);
        return Ok(());
    }
    print_plan(&plan);

    let serial = config.serial_settings();
    let mut pair = super::connect_pair(request.hardware.simulate, &serial)?;

    let folder = RunFolder::create(&config.output_dir(request.output.clone()), &plan)?;
    let comments = CommentFile::create(folder.comment_path(), &plan.comment_title())?;
    println!("Records: {}", folder.path().display());

    let token = CancellationToken::new();
    operator::spawn_console(token.clone(), comments.clone())?;

    let output = RunOutput { folder, comments };
    let seq_config = config.sequencer_config()?;

    let mut logger_handle = None;
    let mut sample_tx = None;
    if request.with_logger {
        let (tx, probe) = ChannelProbe::channel(SAMPLE_CHANNEL_CAPACITY);
        let source = logger_source(request.logger_input.as_ref(), &serial)?;
        let logger = Logger::new(config.logger_config()?, source, SystemClock)?
            .with_probe(Box::new(probe));
        logger_handle = Some(LoggerHandle::spawn(logger, CancellationToken::new())?);
        sample_tx = Some(tx);
    }

    let observer = StatusObserver::new(plan.expected_finish(start));
    let result = if request.instant {
        let sequencer = Sequencer::new(seq_config, ManualClock::new(Local::now()), token)?;
        execute(sequencer, observer, sample_tx, &mut pair, &plan, &output)
    } else {
        let sequencer = Sequencer::new(seq_config, SystemClock, token)?;
        execute(sequencer, observer, sample_tx, &mut pair, &plan, &output)
    };

    if let Some(handle) = logger_handle {
        match handle.stop() {
            Ok(stats) => info!(
                "Logger stored {} record(s), rejected {}",
                stats.records, stats.rejected
            ),
            Err(e) => warn!("Logger thread ended with an error: {}", e),
        }
    }
    result
}

fn execute<C: Clock>(
    sequencer: Sequencer<C>,
    observer: StatusObserver,
    sample_tx: Option<Sender<Sample>>,
    pair: &mut MfcPair,
    plan: &RunPlan,
    output: &RunOutput,
) -> Result<()> {
    let mut sequencer = sequencer.with_observer(Box::new(observer));
    if let Some(tx) = sample_tx {
        sequencer = sequencer.with_sample_channel(tx);
    }
    let report = sequencer
        .run(pair, plan, output)
        .context(RUN_FAILED)?;
    println!();
    match &report.outcome {
        RunOutcome::Completed => println!("Programme completed."),
        other => println!("Programme {}.", other),
    }
    println!(
        "{} sample(s) saved to {}",
        report.log.len(),
        output.folder.path().display()
    );
    Ok(())
}

/// Arduino port, or a file of recorded lines
fn logger_source(
    input: Option<&PathBuf>,
    serial: &SerialSettings,
) -> Result<Box<dyn LineSource + Send>> {
    match input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open logger input {}", path.display()))?;
            Ok(Box::new(LineReader::new(BufReader::new(file))))
        }
        None => Ok(Box::new(logger::find_arduino(
            &serial.arduino_manufacturer,
            serial.arduino_baud_rate,
            serial.timeout,
        )?)),
    }
}

fn print_plan(plan: &RunPlan) {
    println!(
        "{} {} ({}), {} step(s) of {} min",
        plan.species,
        plan.programme,
        plan.order.label(),
        plan.len(),
        plan.step_duration.as_secs_f64() / 60.0
    );
    for (i, planned) in plan.steps.iter().enumerate() {
        let step = &planned.step;
        let kind = match planned.kind {
            StepKind::Timed => "",
            StepKind::Immediate => " (immediate)",
        };
        println!(
            "  {:>2}. dilution {:>5}% span {:>5}% -> {:.2} ppb{}",
            i + 1,
            step.dilution_pct,
            step.span_pct,
            step.concentration_ppb,
            kind
        );
    }
    println!(
        "Start {}, expected finish {}",
        plan.start.format("%d/%m %H:%M"),
        plan.expected_finish(plan.start).format("%d/%m %H:%M")
    );
    println!("Type a comment and press enter to add it to the run notes; type 'abort' to stop.");
}

/// Parse `HH:MM` (today) or `YYYY-MM-DD HH:MM`
fn parse_start(text: &str, now: DateTime<Local>) -> Result<DateTime<Local>> {
    let text = text.trim();
    let naive = if let Ok(time) = NaiveTime::parse_from_str(text, "%H:%M") {
        NaiveDateTime::new(now.date_naive(), time)
    } else if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M") {
        datetime
    } else if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        date.and_time(NaiveTime::MIN)
    } else {
        bail!("Invalid start time '{}', expected HH:MM or YYYY-MM-DD HH:MM", text);
    };
    Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("Start time {} does not exist in the local time zone", naive))
}
