//! # mfcblend - Calibration Gas Blending
//!
//! `mfcblend` drives two Bronkhorst mass-flow controllers (MFCs) through
//! calibration programmes kept in an Excel workbook. A small span MFC
//! delivers the concentrated gas and a large dilution MFC the diluent; each
//! programme step sets both flows and holds them for a fixed time while the
//! actual flows are logged.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mfcblend::instrument::SimulatedMfc;
//! use mfcblend::mfc::{Mfc, MfcPair};
//! use mfcblend::program::{LoaderConfig, PlanOptions, ProgramSheet, Programme, RunPlan, Species};
//! use mfcblend::record::{CommentFile, RunFolder};
//! use mfcblend::sequencer::{CancellationToken, RunOutput, Sequencer, SequencerConfig, SystemClock};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Pick the programme rows for SO2
//! let sheet = ProgramSheet::open("programmes.xlsx", LoaderConfig::default())?;
//! let loaded = sheet.load(&Programme::parse("Liniaritet"), &Species::So2.default_columns())?;
//! let plan = RunPlan::build(loaded, Species::So2, &PlanOptions::default(), chrono::Local::now())?;
//!
//! // Two MFCs; roles are assigned by capacity
//! let mut pair = MfcPair::assign(vec![
//!     Mfc::connect(Box::new(SimulatedMfc::new(100.0, "mln/min")))?,
//!     Mfc::connect(Box::new(SimulatedMfc::new(5.0, "ln/min")))?,
//! ])?;
//!
//! // Run it, writing records under runs/
//! let folder = RunFolder::create(std::path::Path::new("runs"), &plan)?;
//! let comments = CommentFile::create(folder.comment_path(), &plan.comment_title())?;
//! let output = RunOutput { folder, comments };
//! let mut sequencer = Sequencer::new(SequencerConfig::default(), SystemClock, CancellationToken::new())?;
//! let report = sequencer.run(&mut pair, &plan, &output)?;
//! println!("{}: {} samples", report.outcome, report.log.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`instrument`]: the [`FlowInstrument`](instrument::FlowInstrument) seam,
//!   Propar ASCII transport, simulated MFCs and serial port discovery
//! - [`mfc`]: MFC handles, percentage conversion, span/dilution assignment
//! - [`program`]: xlsx reading, programme selection and run plans
//! - [`sequencer`]: the step state machine with cancellation and observers
//! - [`record`]: flow CSV, comment file, SVG plot and run summary
//! - [`logger`]: the auxiliary Arduino data logger

#![warn(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod instrument;
pub mod logger;
pub mod mfc;
pub mod program;
pub mod record;
pub mod sequencer;
