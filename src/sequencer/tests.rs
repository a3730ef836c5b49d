use super::*;
use crate::instrument::{SimulatedMfc, WriteJournal};
use crate::mfc::Mfc;
use crate::program::{LoadedProgramme, PlanOptions, ProgramStep, Programme, Species};
use chrono::TimeZone;
use std::sync::atomic::AtomicUsize;
use tempfile::{tempdir, TempDir};

const POLL: Duration = Duration::from_secs(10);
/// One-minute steps polled every 10 s
const POLLS_PER_STEP: usize = 6;

fn t0() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap()
}

struct Rig {
    pair: MfcPair,
    span: WriteJournal,
    dilution: WriteJournal,
}

fn rig_with(span_sim: SimulatedMfc) -> Rig {
    let dilution_sim = SimulatedMfc::new(5.0, "ln/min");
    let span = span_sim.journal();
    let dilution = dilution_sim.journal();
    let pair = MfcPair::assign(vec![
        Mfc::connect(Box::new(dilution_sim)).unwrap(),
        Mfc::connect(Box::new(span_sim)).unwrap(),
    ])
    .unwrap();
    Rig {
        pair,
        span,
        dilution,
    }
}

fn rig() -> Rig {
    rig_with(SimulatedMfc::new(100.0, "mln/min"))
}

/// Two programme rows, bracketed to four one-minute steps
fn plan(start: DateTime<Local>) -> RunPlan {
    let loaded = LoadedProgramme {
        programme: Programme::parse("Liniaritet"),
        steps: vec![
            ProgramStep {
                dilution_pct: 80.0,
                dilution_flow: 4.0,
                span_pct: 20.0,
                span_flow: 20.0,
                concentration_ppb: 50.0,
            },
            ProgramStep {
                dilution_pct: 90.0,
                dilution_flow: 4.5,
                span_pct: 10.0,
                span_flow: 10.0,
                concentration_ppb: 25.0,
            },
        ],
        immediate: false,
    };
    let options = PlanOptions {
        step_minutes: 1.0,
        ..PlanOptions::default()
    };
    RunPlan::build(loaded, Species::So2, &options, start).unwrap()
}

fn output(dir: &TempDir, plan: &RunPlan) -> RunOutput {
    let folder = RunFolder::create(dir.path(), plan).unwrap();
    let comments = CommentFile::create(folder.comment_path(), &plan.comment_title()).unwrap();
    RunOutput { folder, comments }
}

fn sequencer(token: CancellationToken) -> Sequencer<ManualClock> {
    let config = SequencerConfig {
        poll_interval: POLL,
        ..SequencerConfig::default()
    };
    Sequencer::new(config, ManualClock::new(t0()), token).unwrap()
}

fn csv_rows(output: &RunOutput) -> usize {
    let content = std::fs::read_to_string(output.folder.csv_path()).unwrap();
    content.lines().count() - 1
}

fn assert_idle(rig: &Rig) {
    assert_eq!(rig.span.last_flow_setpoint(), Some(1.0));
    assert_eq!(rig.dilution.last_flow_setpoint(), Some(3.0));
}

/// Cancels the run once `after` samples have been recorded
struct CancelAfter {
    token: CancellationToken,
    after: usize,
    seen: Arc<AtomicUsize>,
}

impl RunObserver for CancelAfter {
    fn on_sample(&mut self, _progress: &StepProgress, _sample: &Sample) {
        let seen = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if seen == self.after {
            self.token.cancel();
        }
    }
}

#[test]
fn test_token_is_shared_between_clones() {
    let token = CancellationToken::new();
    let clone = token.clone();
    assert!(!token.is_cancelled());
    clone.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn test_zero_poll_interval_is_rejected() {
    let config = SequencerConfig {
        poll_interval: Duration::ZERO,
        ..SequencerConfig::default()
    };
    let result = Sequencer::new(config, ManualClock::new(t0()), CancellationToken::new());
    assert!(matches!(result, Err(SequencerError::InvalidPollInterval)));
}

#[test]
fn test_completed_run() {
    let dir = tempdir().unwrap();
    let mut rig = rig();
    let plan = plan(t0());
    let output = output(&dir, &plan);

    let mut seq = sequencer(CancellationToken::new());
    let report = seq.run(&mut rig.pair, &plan, &output).unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(seq.state(), &RunState::Done(RunOutcome::Completed));
    assert_eq!(report.log.len(), 4 * POLLS_PER_STEP);
    assert_eq!(report.settings.len(), 4);
    assert_eq!(csv_rows(&output), 4 * POLLS_PER_STEP);

    // Second step holds 20 mL/min span in 4 L/min dilution
    let sample = report.log.samples()[POLLS_PER_STEP];
    assert_eq!(sample.span_ml_min, 20.0);
    assert_eq!(sample.dilution_l_min, 4.0);

    // Bracketing flush at the highest dilution flow, then the rows, then idle
    assert_eq!(
        rig.dilution.flow_setpoints(),
        vec![4.5, 4.0, 4.5, 4.5, 3.0]
    );
    assert_eq!(rig.span.flow_setpoints(), vec![0.0, 20.0, 10.0, 0.0, 1.0]);

    let comments = output.comments.contents().unwrap();
    assert!(comments.starts_with("Kommentarer og information til SO2 Liniaritet"));
    assert!(comments.contains("Koncentration [ppb]"));
    assert!(output.folder.plot_path().exists());

    let summary: RunSummary =
        serde_json::from_str(&std::fs::read_to_string(output.folder.summary_path()).unwrap())
            .unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.samples, 4 * POLLS_PER_STEP);
}

#[test]
fn test_abort_mid_step_keeps_samples_and_idles() {
    let dir = tempdir().unwrap();
    let mut rig = rig();
    let plan = plan(t0());
    let output = output(&dir, &plan);

    let token = CancellationToken::new();
    let observer = CancelAfter {
        token: token.clone(),
        after: POLLS_PER_STEP + 2,
        seen: Arc::new(AtomicUsize::new(0)),
    };
    let mut seq = sequencer(token).with_observer(Box::new(observer));
    let report = seq.run(&mut rig.pair, &plan, &output).unwrap();

    assert_eq!(report.outcome, RunOutcome::Aborted { step: 1 });
    assert_eq!(report.log.len(), POLLS_PER_STEP + 2);
    assert_eq!(csv_rows(&output), POLLS_PER_STEP + 2);
    assert_idle(&rig);

    // Settings table only goes into the comment file on completion
    let comments = output.comments.contents().unwrap();
    assert!(!comments.contains("Koncentration [ppb]"));
}

#[test]
fn test_abort_at_step_boundary() {
    let dir = tempdir().unwrap();
    let mut rig = rig();
    let plan = plan(t0());
    let output = output(&dir, &plan);

    let token = CancellationToken::new();
    let observer = CancelAfter {
        token: token.clone(),
        after: POLLS_PER_STEP,
        seen: Arc::new(AtomicUsize::new(0)),
    };
    let mut seq = sequencer(token).with_observer(Box::new(observer));
    let report = seq.run(&mut rig.pair, &plan, &output).unwrap();

    // The next step is never written
    assert_eq!(report.outcome, RunOutcome::Aborted { step: 1 });
    assert_eq!(report.settings.len(), 1);
    assert_eq!(rig.dilution.flow_setpoints(), vec![4.5, 3.0]);
    assert_idle(&rig);
}

#[test]
fn test_abort_before_start() {
    struct CancelOnCountdown {
        token: CancellationToken,
        ticks: usize,
    }

    impl RunObserver for CancelOnCountdown {
        fn on_countdown(&mut self, remaining: Duration) {
            assert!(remaining <= Duration::from_secs(3600));
            self.ticks += 1;
            if self.ticks == 3 {
                self.token.cancel();
            }
        }
    }

    let dir = tempdir().unwrap();
    let mut rig = rig();
    let plan = plan(t0() + TimeDelta::hours(1));
    let output = output(&dir, &plan);

    let token = CancellationToken::new();
    let observer = CancelOnCountdown {
        token: token.clone(),
        ticks: 0,
    };
    let mut seq = sequencer(token).with_observer(Box::new(observer));
    let report = seq.run(&mut rig.pair, &plan, &output).unwrap();

    assert_eq!(report.outcome, RunOutcome::AbortedBeforeStart);
    assert!(report.log.is_empty());
    assert_eq!(rig.span.flow_setpoints(), vec![1.0]);
    assert_eq!(rig.dilution.flow_setpoints(), vec![3.0]);
    assert!(!output.folder.csv_path().exists());
    assert!(output.folder.summary_path().exists());
}

#[test]
fn test_read_failure_idles_and_saves() {
    let dir = tempdir().unwrap();
    // Two reads go to capacity and unit at connect time
    let mut rig = rig_with(SimulatedMfc::new(100.0, "mln/min").fail_reads_after(2 + 3));
    let plan = plan(t0());
    let output = output(&dir, &plan);

    let mut seq = sequencer(CancellationToken::new());
    let err = seq.run(&mut rig.pair, &plan, &output).unwrap_err();

    assert!(matches!(err, SequencerError::MfcError(_)));
    assert_eq!(seq.state(), &RunState::Done(RunOutcome::Failed { step: 0 }));
    assert_eq!(csv_rows(&output), 3);
    assert_idle(&rig);

    let summary: RunSummary =
        serde_json::from_str(&std::fs::read_to_string(output.folder.summary_path()).unwrap())
            .unwrap();
    assert_eq!(summary.outcome, RunOutcome::Failed { step: 0 });
}

#[test]
fn test_reset_programme_leaves_mfcs_closed() {
    let dir = tempdir().unwrap();
    let mut rig = rig();
    let loaded = LoadedProgramme {
        programme: Programme::Reset,
        steps: vec![ProgramStep::ZERO],
        immediate: true,
    };
    let plan = RunPlan::build(loaded, Species::So2, &PlanOptions::default(), t0()).unwrap();
    let output = output(&dir, &plan);

    let mut seq = sequencer(CancellationToken::new());
    let report = seq.run(&mut rig.pair, &plan, &output).unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(report.log.is_empty());
    assert_eq!(rig.span.flow_setpoints(), vec![0.0]);
    assert_eq!(rig.dilution.flow_setpoints(), vec![0.0]);
}

#[test]
fn test_abort_finishes_when_flow_log_cannot_be_saved() {
    let dir = tempdir().unwrap();
    let mut rig = rig();
    let plan = plan(t0());
    let output = output(&dir, &plan);
    // A directory in the way of the CSV makes saving fail
    std::fs::create_dir(output.folder.csv_path()).unwrap();

    let token = CancellationToken::new();
    let observer = CancelAfter {
        token: token.clone(),
        after: 2,
        seen: Arc::new(AtomicUsize::new(0)),
    };
    let mut seq = sequencer(token).with_observer(Box::new(observer));
    let report = seq.run(&mut rig.pair, &plan, &output).unwrap();

    assert_eq!(report.outcome, RunOutcome::Aborted { step: 0 });
    assert_eq!(seq.state(), &RunState::Done(RunOutcome::Aborted { step: 0 }));
    assert_idle(&rig);

    let summary: RunSummary =
        serde_json::from_str(&std::fs::read_to_string(output.folder.summary_path()).unwrap())
            .unwrap();
    assert_eq!(summary.outcome, RunOutcome::Aborted { step: 0 });
}

#[test]
fn test_samples_are_forwarded_to_channel() {
    let dir = tempdir().unwrap();
    let mut rig = rig();
    let plan = plan(t0());
    let output = output(&dir, &plan);

    let (tx, rx) = crossbeam_channel::bounded(64);
    let mut seq = sequencer(CancellationToken::new()).with_sample_channel(tx);
    let report = seq.run(&mut rig.pair, &plan, &output).unwrap();
    drop(seq);

    let forwarded: Vec<Sample> = rx.iter().collect();
    assert_eq!(forwarded, report.log.samples());
}

#[test]
fn test_progress_counts_down_to_finish() {
    struct Recorder(Arc<std::sync::Mutex<Vec<StepProgress>>>);

    impl RunObserver for Recorder {
        fn on_sample(&mut self, progress: &StepProgress, _sample: &Sample) {
            self.0.lock().unwrap().push(*progress);
        }
    }

    let dir = tempdir().unwrap();
    let mut rig = rig();
    let plan = plan(t0());
    let output = output(&dir, &plan);

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut seq = sequencer(CancellationToken::new()).with_observer(Box::new(Recorder(seen.clone())));
    seq.run(&mut rig.pair, &plan, &output).unwrap();

    let seen = seen.lock().unwrap();
    let first = seen[0];
    assert_eq!(first.step, 0);
    assert_eq!(first.steps, 4);
    assert_eq!(first.step_remaining, Duration::from_secs(60));
    assert_eq!(first.total_remaining, Duration::from_secs(4 * 60));
    assert_eq!(first.expected_finish, t0() + TimeDelta::minutes(4));

    let last = seen[seen.len() - 1];
    assert_eq!(last.step, 3);
    assert_eq!(last.total_remaining, POLL);
    assert_eq!(last.expected_finish, t0() + TimeDelta::minutes(4));
}

#[test]
fn test_outcome_display() {
    assert_eq!(RunOutcome::Aborted { step: 0 }.to_string(), "aborted during step 1");
    assert_eq!(
        RunState::Done(RunOutcome::Completed).to_string(),
        "done (completed)"
    );
}
