//! # mfc-blend
//!
//! Command-line front end for calibration gas blending with two Bronkhorst
//! mass-flow controllers.
//!
//! ## Usage
//!
//! ```bash
//! # List the programmes in a workbook
//! mfc-blend program programmes.xlsx
//!
//! # Run the SO2 linearity programme with 10-minute steps, shuffled
//! mfc-blend -v run programmes.xlsx -s SO2 -p Liniaritet -m 10 --shuffle
//!
//! # Dry run on simulated hardware, finishing immediately
//! mfc-blend run programmes.xlsx -s NOx -p Span --simulate --instant
//!
//! # Log the Arduino reference meters with the MFC flows
//! mfc-blend log --with-mfcs
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
