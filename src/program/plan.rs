use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::{LoadedProgramme, ProgramError, ProgramStep, Programme, Species};

/// Whether a step holds for the step duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Hold for the configured step duration while sampling
    Timed,
    /// Write the setpoints and move on
    Immediate,
}

/// A programme step scheduled for execution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    /// Setpoints
    pub step: ProgramStep,
    /// Hold behaviour
    pub kind: StepKind,
}

/// Run options chosen by the operator
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOptions {
    /// Randomize the order of multi-step programmes
    pub shuffle: bool,
    /// Seed for a reproducible shuffle
    pub seed: Option<u64>,
    /// Minutes each timed step is held
    pub step_minutes: f64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            shuffle: false,
            seed: None,
            step_minutes: 10.0,
        }
    }
}

/// Ordering applied to the programme rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Rows were shuffled
    Shuffled,
    /// Rows kept in sheet order
    Ordered,
    /// Single-step programme; ordering does not apply
    Single,
}

impl Order {
    /// Label shown to the operator
    pub fn label(&self) -> &'static str {
        match self {
            Order::Shuffled => "Tilfældig",
            Order::Ordered => "Ikke Tilfældig",
            Order::Single => "",
        }
    }
}

/// The ordered list of steps for one run, with its naming and timing
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Gas species
    pub species: Species,
    /// Selected programme
    pub programme: Programme,
    /// Steps in execution order, bracketing steps included
    pub steps: Vec<PlannedStep>,
    /// Ordering applied to the programme rows
    pub order: Order,
    /// Hold time of each timed step
    pub step_duration: Duration,
    /// Scheduled start
    pub start: DateTime<Local>,
}

impl RunPlan {
    /// Order the loaded steps and add bracketing steps
    ///
    /// Multi-step programmes are optionally shuffled and then wrapped in a
    /// 90 % dilution / zero span step at the highest listed dilution flow.
    pub fn build(
        loaded: LoadedProgramme,
        species: Species,
        options: &PlanOptions,
        start: DateTime<Local>,
    ) -> Result<Self, ProgramError> {
        if !options.step_minutes.is_finite() || options.step_minutes <= 0.0 {
            return Err(ProgramError::InvalidStepDuration(options.step_minutes));
        }
        let kind = if loaded.immediate {
            StepKind::Immediate
        } else {
            StepKind::Timed
        };

        let mut rows = loaded.steps;
        let order = if rows.len() > 1 {
            if options.shuffle {
                let mut rng = match options.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                rows.shuffle(&mut rng);
                Order::Shuffled
            } else {
                Order::Ordered
            }
        } else {
            Order::Single
        };

        let mut steps: Vec<PlannedStep> = rows
            .iter()
            .map(|step| PlannedStep { step: *step, kind })
            .collect();
        if order != Order::Single {
            let bracket = PlannedStep {
                step: bracketing_step(&rows),
                kind,
            };
            steps.insert(0, bracket);
            steps.push(bracket);
        }
        debug!(
            "Planned {} step(s) for {} ({})",
            steps.len(),
            loaded.programme.display_name(),
            order.label()
        );

        Ok(Self {
            species,
            programme: loaded.programme,
            steps,
            order,
            step_duration: Duration::from_secs_f64(options.step_minutes * 60.0),
            start,
        })
    }

    /// Number of planned steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when there is nothing to run
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Total time spent in timed steps
    pub fn total_duration(&self) -> Duration {
        let timed = self
            .steps
            .iter()
            .filter(|s| s.kind == StepKind::Timed)
            .count() as u32;
        self.step_duration * timed
    }

    /// When the last step is expected to end if started at `start`
    pub fn expected_finish(&self, start: DateTime<Local>) -> DateTime<Local> {
        TimeDelta::from_std(self.total_duration())
            .ok()
            .and_then(|total| start.checked_add_signed(total))
            .unwrap_or(start)
    }

    /// Folder/file stem for this run: `{%Y_%m_%d_%H_%M}_{species}_{programme}`
    pub fn save_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.start.format("%Y_%m_%d_%H_%M"),
            self.species,
            self.programme.clean_name()
        )
    }

    /// Title line of the run's comment file
    pub fn comment_title(&self) -> String {
        format!(
            "Kommentarer og information til {} {}",
            self.species,
            self.programme.title()
        )
    }
}

/// 90 % dilution at the highest listed dilution flow, no span gas
pub fn bracketing_step(rows: &[ProgramStep]) -> ProgramStep {
    let max_flow = rows
        .iter()
        .map(|s| s.dilution_flow)
        .fold(f64::NEG_INFINITY, f64::max);
    ProgramStep::flush(if max_flow.is_finite() { max_flow } else { 0.0 })
}
