//! Terminal operator surface: live status lines and the comment/abort console.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use log::{info, warn};
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

#[cfg(feature = "colorized_output")]
use console::style;

use mfcblend::mfc::WrittenSetpoints;
use mfcblend::program::PlannedStep;
use mfcblend::record::{CommentFile, Sample};
use mfcblend::sequencer::{CancellationToken, RunObserver, RunState, StepProgress};

/// What the console did with one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Nothing to do
    Ignored,
    /// The run was cancelled
    Abort,
    /// The line was stored as a note
    Note(String),
}

/// Interpret one line typed by the operator
pub fn handle_line(
    line: &str,
    token: &CancellationToken,
    comments: &CommentFile,
    now: DateTime<Local>,
) -> ConsoleAction {
    let text = line.trim();
    if text.is_empty() {
        return ConsoleAction::Ignored;
    }
    if text.eq_ignore_ascii_case("abort") {
        token.cancel();
        return ConsoleAction::Abort;
    }
    if let Err(e) = comments.append_note(now, text) {
        warn!("Could not save comment: {}", e);
        return ConsoleAction::Ignored;
    }
    ConsoleAction::Note(text.to_string())
}

/// Read operator input from stdin on a detached thread
///
/// The thread ends at end of input; it is never joined because a blocked
/// stdin read cannot be interrupted.
pub fn spawn_console(token: CancellationToken, comments: CommentFile) -> Result<()> {
    thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match handle_line(&line, &token, &comments, Local::now()) {
                    ConsoleAction::Abort => {
                        println!();
                        println!("Aborting, setting MFCs to idle...");
                        break;
                    }
                    ConsoleAction::Note(_) => info!("Comment saved"),
                    ConsoleAction::Ignored => {}
                }
            }
        })
        .context("Failed to spawn operator console thread")?;
    Ok(())
}

/// Prints run progress to the terminal
pub struct StatusObserver {
    expected_finish: DateTime<Local>,
    last_countdown_minute: Option<u64>,
}

impl StatusObserver {
    pub fn new(expected_finish: DateTime<Local>) -> Self {
        Self {
            expected_finish,
            last_countdown_minute: None,
        }
    }
}

impl RunObserver for StatusObserver {
    fn on_state(&mut self, state: &RunState) {
        if matches!(state, RunState::Aborting | RunState::Done(_)) {
            println!();
            print_status(&format!("Status: {}", state));
        }
    }

    fn on_countdown(&mut self, remaining: Duration) {
        let minute = remaining.as_secs() / 60;
        if self.last_countdown_minute != Some(minute) {
            self.last_countdown_minute = Some(minute);
            println!(
                "Waiting for start: {} left (expected finish {})",
                format_duration(remaining),
                self.expected_finish.format("%d/%m %H:%M")
            );
        }
    }

    fn on_step(&mut self, index: usize, step: &PlannedStep, written: &WrittenSetpoints) {
        println!();
        print_status(&format!(
            "Step {}: dilution {}% ({:.2} L/min), span {}% ({:.2} mL/min), {:.2} ppb",
            index + 1,
            step.step.dilution_pct,
            written.dilution_flow,
            step.step.span_pct,
            written.span_flow,
            step.step.concentration_ppb
        ));
    }

    fn on_sample(&mut self, progress: &StepProgress, sample: &Sample) {
        let line = status_line(progress, sample);
        let mut stdout = io::stdout();
        let _ = write!(stdout, "\r{}", line);
        let _ = stdout.flush();
    }
}

fn print_status(text: &str) {
    #[cfg(feature = "colorized_output")]
    {
        println!("{}", style(text).bold().cyan());
    }

    #[cfg(not(feature = "colorized_output"))]
    {
        println!("{}", text);
    }
}

/// One-line run status
pub fn status_line(progress: &StepProgress, sample: &Sample) -> String {
    format!(
        "[{}/{}] span {:>7.3} mL/min  dilution {:>6.3} L/min  step {}  total {}  finish {}",
        progress.step + 1,
        progress.steps,
        sample.span_ml_min,
        sample.dilution_l_min,
        format_duration(progress.step_remaining),
        format_duration(progress.total_remaining),
        progress.expected_finish.format("%H:%M:%S")
    )
}

/// `H:MM:SS`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
