//! # Sequencer Module
//!
//! Runs a [`RunPlan`] against an [`MfcPair`].
//!
//! ## State Machine
//!
//! ```text
//! Idle ─► WaitingToStart ─► RunningStep(0) ─► … ─► RunningStep(n-1) ─► Done(Completed)
//!              │                    │
//!              ▼                    ▼
//!        Done(AbortedBeforeStart)  Aborting ─► Done(Aborted { step })
//! ```
//!
//! Cancellation is polled through a [`CancellationToken`] once per second
//! while waiting for the start time and once per poll interval during a
//! step. Every way out of a run leaves both MFCs at their idle flow, except
//! a completed immediate programme (reset), which keeps its own setpoints.

mod clock;
mod error;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SequencerError;

use crate::mfc::{IdleFractions, MfcPair, WrittenSetpoints};
use crate::program::{PlannedStep, RunPlan, StepKind};
use crate::record::{CommentFile, PlotAxes, RunFolder, RunLog, RunSummary, Sample, SettingsTable};

/// Interval at which the start-time wait checks for cancellation
const WAIT_TICK: Duration = Duration::from_secs(1);

/// Shared flag used to request that a run stops
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`cancel`](Self::cancel) has been called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step ran to completion
    Completed,
    /// Cancelled while waiting for the start time
    AbortedBeforeStart,
    /// Cancelled during the given step (0-based)
    Aborted {
        /// Step that was running
        step: usize,
    },
    /// Hardware or storage failure during the given step
    Failed {
        /// Step that was running
        step: usize,
    },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::AbortedBeforeStart => write!(f, "aborted before start"),
            RunOutcome::Aborted { step } => write!(f, "aborted during step {}", step + 1),
            RunOutcome::Failed { step } => write!(f, "failed during step {}", step + 1),
        }
    }
}

/// Sequencer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Not started
    Idle,
    /// Waiting for the scheduled start time
    WaitingToStart,
    /// Holding the given step (0-based)
    RunningStep(usize),
    /// Driving the MFCs to idle and saving records after a cancellation
    Aborting,
    /// Finished
    Done(RunOutcome),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::WaitingToStart => write!(f, "waiting to start"),
            RunState::RunningStep(i) => write!(f, "running step {}", i + 1),
            RunState::Aborting => write!(f, "aborting"),
            RunState::Done(outcome) => write!(f, "done ({})", outcome),
        }
    }
}

/// Position within the run when a sample is taken
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepProgress {
    /// Current step (0-based)
    pub step: usize,
    /// Number of planned steps
    pub steps: usize,
    /// Time left in the current step
    pub step_remaining: Duration,
    /// Time left in the whole run
    pub total_remaining: Duration,
    /// Expected end of the run
    pub expected_finish: DateTime<Local>,
}

/// Receives status updates from a running sequencer
///
/// All methods have empty defaults; implement the ones you need.
pub trait RunObserver {
    /// The sequencer changed state
    fn on_state(&mut self, _state: &RunState) {}

    /// Time left until the scheduled start
    fn on_countdown(&mut self, _remaining: Duration) {}

    /// Setpoints of a step were written
    fn on_step(&mut self, _index: usize, _step: &PlannedStep, _written: &WrittenSetpoints) {}

    /// A flow sample was recorded
    fn on_sample(&mut self, _progress: &StepProgress, _sample: &Sample) {}
}

/// Sequencer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Interval between flow samples
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Flow written to both MFCs when a run stops
    pub idle: IdleFractions,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            idle: IdleFractions::default(),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Where a run writes its records
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Run folder (CSV, plot, summary)
    pub folder: RunFolder,
    /// Comment file receiving the settings table
    pub comments: CommentFile,
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunReport {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Samples recorded
    pub log: RunLog,
    /// Setpoints written
    pub settings: SettingsTable,
    /// Summary written to `run.json`
    pub summary: RunSummary,
}

/// Executes a run plan step by step
pub struct Sequencer<C: Clock> {
    config: SequencerConfig,
    clock: C,
    token: CancellationToken,
    state: RunState,
    observers: Vec<Box<dyn RunObserver>>,
    samples_tx: Option<Sender<Sample>>,
}

impl<C: Clock> Sequencer<C> {
    /// Create a sequencer that stops when `token` is cancelled
    pub fn new(
        config: SequencerConfig,
        clock: C,
        token: CancellationToken,
    ) -> Result<Self, SequencerError> {
        if config.poll_interval.is_zero() {
            return Err(SequencerError::InvalidPollInterval);
        }
        Ok(Self {
            config,
            clock,
            token,
            state: RunState::Idle,
            observers: Vec::new(),
            samples_tx: None,
        })
    }

    /// Add a status observer
    pub fn with_observer(mut self, observer: Box<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Forward every sample to a channel (e.g. the logger thread)
    ///
    /// Samples are dropped, not queued, when the channel is full.
    pub fn with_sample_channel(mut self, tx: Sender<Sample>) -> Self {
        self.samples_tx = Some(tx);
        self
    }

    /// Current state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    fn transition(&mut self, state: RunState) {
        debug!("Sequencer: {} -> {}", self.state, state);
        self.state = state;
        for observer in &mut self.observers {
            observer.on_state(&self.state);
        }
    }

    /// Run the plan to completion or cancellation
    ///
    /// On return, both MFCs have been driven to the idle flow (best effort
    /// when an error is returned). A completed plan ending in an immediate
    /// step keeps that step's setpoints instead.
    pub fn run(
        &mut self,
        pair: &mut MfcPair,
        plan: &RunPlan,
        output: &RunOutput,
    ) -> Result<RunReport, SequencerError> {
        let (span_label, dilution_label) = pair.channel_labels();
        let mut log = RunLog::new(span_label, dilution_label);
        let mut settings = SettingsTable::new();
        let axes = PlotAxes::new(
            pair.span.max_flow() * pair.span.unit().to_mln_per_min(),
            pair.dilution.max_flow() * pair.dilution.unit().to_ln_per_min(),
        );

        self.transition(RunState::WaitingToStart);
        if !self.wait_for_start(plan.start) {
            info!("Run cancelled before the start time");
            self.transition(RunState::Aborting);
            pair.write_idle(&self.config.idle)?;
            return self.finish(RunOutcome::AbortedBeforeStart, plan, output, log, settings);
        }

        info!(
            "Starting {} {} with {} step(s)",
            plan.species,
            plan.programme.display_name(),
            plan.len()
        );
        let mut current = 0;
        let executed = self.execute(pair, plan, &mut log, &mut settings, &mut current);

        match executed {
            Ok(None) => {
                info!("Programme finished, saving records");
                let saved = output
                    .folder
                    .persist(&log, &axes)
                    .and_then(|_| output.comments.append_line(&settings.render()));
                let idle = if ends_immediately(plan) {
                    debug!("Immediate programme, leaving its setpoints in place");
                    Ok(())
                } else {
                    pair.write_idle(&self.config.idle).map(|_| ())
                };
                saved?;
                idle?;
                self.finish(RunOutcome::Completed, plan, output, log, settings)
            }
            Ok(Some(step)) => {
                warn!("Run aborted during step {}", step + 1);
                self.transition(RunState::Aborting);
                let idle = pair.write_idle(&self.config.idle);
                if let Err(save_err) = output.folder.persist(&log, &axes) {
                    warn!("Could not save flow log: {}", save_err);
                }
                idle?;
                self.finish(RunOutcome::Aborted { step }, plan, output, log, settings)
            }
            Err(e) => {
                warn!("Run failed during step {}: {}", current + 1, e);
                self.transition(RunState::Aborting);
                if let Err(idle_err) = pair.write_idle(&self.config.idle) {
                    warn!("Could not write idle setpoints: {}", idle_err);
                }
                if let Err(save_err) = output.folder.persist(&log, &axes) {
                    warn!("Could not save flow log: {}", save_err);
                }
                let outcome = RunOutcome::Failed { step: current };
                let summary = RunSummary::new(plan, outcome.clone(), log.len(), self.clock.now());
                if let Err(summary_err) = summary.write(&output.folder.summary_path()) {
                    warn!("Could not write run summary: {}", summary_err);
                }
                self.transition(RunState::Done(outcome));
                Err(e)
            }
        }
    }

    /// Wait until `start`; false when cancelled first
    fn wait_for_start(&mut self, start: DateTime<Local>) -> bool {
        loop {
            if self.token.is_cancelled() {
                return false;
            }
            let now = self.clock.now();
            if now >= start {
                return true;
            }
            let remaining = (start - now).to_std().unwrap_or_default();
            for observer in &mut self.observers {
                observer.on_countdown(remaining);
            }
            self.clock.sleep(remaining.min(WAIT_TICK));
        }
    }

    /// Walk the steps; `Some(step)` when cancelled during that step
    fn execute(
        &mut self,
        pair: &mut MfcPair,
        plan: &RunPlan,
        log: &mut RunLog,
        settings: &mut SettingsTable,
        current: &mut usize,
    ) -> Result<Option<usize>, SequencerError> {
        let poll = self.config.poll_interval;
        let polls_per_step = (plan.step_duration.as_secs_f64() / poll.as_secs_f64())
            .ceil()
            .max(1.0) as u32;

        for (index, planned) in plan.steps.iter().enumerate() {
            *current = index;
            self.transition(RunState::RunningStep(index));
            if self.token.is_cancelled() {
                return Ok(Some(index));
            }

            let written = pair.write_pct(planned.step.dilution_pct, planned.step.span_pct)?;
            settings.push(self.clock.now(), &planned.step, written.dilution_flow, written.span_flow);
            info!(
                "Step {}/{}: dilution {}% ({:.3}), span {}% ({:.3}), {:.2} ppb",
                index + 1,
                plan.len(),
                planned.step.dilution_pct,
                written.dilution_flow,
                planned.step.span_pct,
                written.span_flow,
                planned.step.concentration_ppb
            );
            for observer in &mut self.observers {
                observer.on_step(index, planned, &written);
            }

            if planned.kind == StepKind::Immediate {
                continue;
            }

            let timed_after = plan.steps[index + 1..]
                .iter()
                .filter(|s| s.kind == StepKind::Timed)
                .count() as u32;

            for tick in 0..polls_per_step {
                if self.token.is_cancelled() {
                    return Ok(Some(index));
                }

                let reading = pair.read()?;
                let sample = Sample {
                    timestamp: self.clock.now(),
                    span_ml_min: reading.span_ml_min,
                    dilution_l_min: reading.dilution_l_min,
                };
                log.push(sample);
                self.forward(sample);

                let step_remaining = plan.step_duration.saturating_sub(poll * tick);
                let total_remaining = step_remaining + plan.step_duration * timed_after;
                let progress = StepProgress {
                    step: index,
                    steps: plan.len(),
                    step_remaining,
                    total_remaining,
                    expected_finish: TimeDelta::from_std(total_remaining)
                        .ok()
                        .and_then(|d| sample.timestamp.checked_add_signed(d))
                        .unwrap_or(sample.timestamp),
                };
                for observer in &mut self.observers {
                    observer.on_sample(&progress, &sample);
                }

                self.clock.sleep(poll);
            }
        }
        Ok(None)
    }

    fn forward(&mut self, sample: Sample) {
        let Some(tx) = &self.samples_tx else {
            return;
        };
        match tx.try_send(sample) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Sample channel full, dropping sample"),
            Err(TrySendError::Disconnected(_)) => {
                debug!("Sample channel closed, no longer forwarding");
                self.samples_tx = None;
            }
        }
    }

    fn finish(
        &mut self,
        outcome: RunOutcome,
        plan: &RunPlan,
        output: &RunOutput,
        log: RunLog,
        settings: SettingsTable,
    ) -> Result<RunReport, SequencerError> {
        let summary = RunSummary::new(plan, outcome.clone(), log.len(), self.clock.now());
        summary.write(&output.folder.summary_path())?;
        info!("Run {}: {} samples recorded", outcome, log.len());
        self.transition(RunState::Done(outcome.clone()));
        Ok(RunReport {
            outcome,
            log,
            settings,
            summary,
        })
    }
}

/// True when the last step is applied without a hold (reset programmes)
fn ends_immediately(plan: &RunPlan) -> bool {
    plan.steps
        .last()
        .is_some_and(|planned| planned.kind == StepKind::Immediate)
}
