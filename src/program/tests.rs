use super::xlsx::{parse_cell_ref, Cell, CellValue, Sheet};
use super::*;
use chrono::{Local, TimeZone};

const YELLOW: &str = "FFFFFF00";

fn text(s: &str) -> Cell {
    Cell::new(CellValue::Text(s.to_string()))
}

fn num(n: f64) -> Cell {
    Cell::new(CellValue::Number(n))
}

fn marker(fill: &str) -> Cell {
    Cell::filled(CellValue::Empty, fill)
}

fn blank() -> Cell {
    Cell::default()
}

/// Header plus four numbered rows, a note row ending the data region and a
/// colored row below it
fn programme_sheet() -> Sheet {
    let header = [
        "Nr", "Fd %", "ml/min", "Fso2", "ml/min ", "SO2 ppb", "Liniaritet", "Span", "Inds v skift af ref",
    ];
    let data = [
        [1.0, 90.0, 4.5, 0.0, 0.0, 0.0],
        [2.0, 80.0, 4.0, 20.0, 20.0, 50.0],
        [3.0, 60.0, 3.0, 40.0, 40.0, 100.5],
        [4.0, 50.0, 2.5, 50.0, 50.0, 150.0],
    ];
    // (Liniaritet, Span, shift) fills per data row
    let marks = [
        (YELLOW, "00000000", "00000000"),
        ("5", "0", YELLOW),
        ("43", YELLOW, "00000000"),
        (YELLOW, "00000000", "00000000"),
    ];

    let mut rows = vec![header.iter().map(|h| text(h)).collect::<Vec<_>>()];
    for (values, (lin, span, shift)) in data.iter().zip(marks.iter()) {
        let mut row: Vec<Cell> = values.iter().map(|v| num(*v)).collect();
        row.push(marker(lin));
        row.push(marker(span));
        row.push(marker(shift));
        rows.push(row);
    }
    rows.push(vec![text("Note: flows in L/min")]);
    rows.push(vec![
        num(9.0),
        num(10.0),
        num(0.5),
        num(90.0),
        num(90.0),
        num(900.0),
        marker(YELLOW),
    ]);
    Sheet::from_rows("Program", rows)
}

fn loaded(steps: Vec<ProgramStep>) -> LoadedProgramme {
    LoadedProgramme {
        programme: Programme::Column("Liniaritet".to_string()),
        steps,
        immediate: false,
    }
}

fn step(dilution_pct: f64, dilution_flow: f64, span_pct: f64) -> ProgramStep {
    ProgramStep {
        dilution_pct,
        dilution_flow,
        span_pct,
        span_flow: span_pct,
        concentration_ppb: span_pct * 2.0,
    }
}

fn start() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap()
}

#[test]
fn test_species_parsing_and_columns() {
    assert_eq!("so2".parse::<Species>().unwrap(), Species::So2);
    assert_eq!(" NOx ".parse::<Species>().unwrap(), Species::Nox);
    assert!(matches!(
        "CO".parse::<Species>(),
        Err(ProgramError::UnknownSpecies(_))
    ));

    let so2 = Species::So2.default_columns();
    assert_eq!(so2.span_flow, "ml/min ");
    assert_eq!(so2.concentration, "SO2 ppb");
    assert_eq!(Species::Nox.default_columns().span_pct, "Fno");
}

#[test]
fn test_programme_names() {
    let shift = Programme::parse("Inds v skift af ref");
    assert_eq!(shift.display_name(), "Reference Gas Skift");
    assert_eq!(shift.clean_name(), "reference_gas_skift");
    assert_eq!(shift.title(), "Reference Gas Skift");
    assert!(!shift.is_shift());
    assert!(Programme::parse("Ref Skift").is_shift());

    assert_eq!(Programme::parse("Nul"), Programme::Zero);
    assert_eq!(Programme::parse("Nulstilling"), Programme::Reset);
    assert_eq!(Programme::parse("Afslutning"), Programme::End);
    assert_eq!(Programme::parse("Liniaritet").title(), "Liniaritet");
}

#[test]
fn test_cell_references() {
    assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
    assert_eq!(parse_cell_ref("AB12"), Some((11, 27)));
    assert_eq!(parse_cell_ref("1A"), None);
    assert_eq!(parse_cell_ref("A0"), None);
}

#[test]
fn test_cell_integer_view() {
    assert_eq!(CellValue::Number(3.0).as_integer(), Some(3));
    assert_eq!(CellValue::Number(3.5).as_integer(), Some(3));
    assert_eq!(CellValue::Number(f64::NAN).as_integer(), None);
    assert_eq!(CellValue::Text(" 7 ".to_string()).as_integer(), Some(7));
    assert_eq!(CellValue::Text("2.5".to_string()).as_integer(), None);
    assert_eq!(CellValue::Empty.as_integer(), None);
}

#[test]
fn test_data_region_and_options() {
    let sheet = ProgramSheet::from_sheet(programme_sheet(), LoaderConfig::default()).unwrap();
    assert_eq!(sheet.data_rows(), 4);
    assert_eq!(
        sheet.options(),
        vec!["Liniaritet", "Span", "Inds v skift af ref", "Nul"]
    );
}

#[test]
fn test_fractional_row_number_stays_in_data_region() {
    let mut rows = programme_sheet().rows().to_vec();
    rows[2][0] = num(2.5);
    let sheet = ProgramSheet::from_sheet(Sheet::from_rows("Program", rows), LoaderConfig::default())
        .unwrap();
    assert_eq!(sheet.data_rows(), 4);
    assert_eq!(sheet.colored_rows("Liniaritet").unwrap(), vec![1, 2, 4]);
}

#[test]
fn test_colored_rows_in_sheet_order() {
    let sheet = ProgramSheet::from_sheet(programme_sheet(), LoaderConfig::default()).unwrap();

    // indexed 43 is allowlisted; the colored row below the note is outside the region
    assert_eq!(sheet.colored_rows("Liniaritet").unwrap(), vec![1, 2, 4]);
    assert_eq!(sheet.colored_rows("Span").unwrap(), vec![3]);

    let columns = Species::So2.default_columns();
    let loaded = sheet
        .load(&Programme::parse("Liniaritet"), &columns)
        .unwrap();
    let concentrations: Vec<f64> = loaded.steps.iter().map(|s| s.concentration_ppb).collect();
    assert_eq!(concentrations, vec![0.0, 50.0, 150.0]);
    assert!(!loaded.immediate);
}

#[test]
fn test_custom_allowlist() {
    let config = LoaderConfig {
        color_allowlist: vec!["00000000".to_string(), YELLOW.to_string()],
        ..LoaderConfig::default()
    };
    let sheet = ProgramSheet::from_sheet(programme_sheet(), config).unwrap();
    assert_eq!(sheet.colored_rows("Liniaritet").unwrap(), vec![2, 3]);
}

#[test]
fn test_shift_programmes_use_shift_column() {
    let mut sheet = programme_sheet();
    let mut rows = sheet.rows().to_vec();
    rows[0].push(text("Ref Skift"));
    sheet = Sheet::from_rows("Program", rows);

    let sheet = ProgramSheet::from_sheet(sheet, LoaderConfig::default()).unwrap();
    let loaded = sheet
        .load(&Programme::parse("Ref Skift"), &Species::So2.default_columns())
        .unwrap();
    assert_eq!(loaded.steps.len(), 1);
    assert_eq!(loaded.steps[0].dilution_pct, 80.0);
}

#[test]
fn test_zero_reset_and_end_programmes() {
    let sheet = ProgramSheet::from_sheet(programme_sheet(), LoaderConfig::default()).unwrap();
    let columns = Species::So2.default_columns();

    let zero = sheet.load(&Programme::Zero, &columns).unwrap();
    assert_eq!(zero.steps, vec![ProgramStep::flush(4.5)]);

    let reset = sheet.load(&Programme::Reset, &columns).unwrap();
    assert_eq!(reset.steps, vec![ProgramStep::ZERO]);
    assert!(reset.immediate);

    let end = sheet.load(&Programme::End, &columns).unwrap();
    assert!(end.steps.is_empty());
}

#[test]
fn test_loader_errors() {
    let sheet = ProgramSheet::from_sheet(programme_sheet(), LoaderConfig::default()).unwrap();

    assert!(matches!(
        sheet.load(&Programme::parse("Stabilitet"), &Species::So2.default_columns()),
        Err(ProgramError::UnknownProgramme { .. })
    ));
    assert!(matches!(
        sheet.load(&Programme::parse("Span"), &Species::Nox.default_columns()),
        Err(ProgramError::MissingColumn(ref c)) if c == "Fno"
    ));

    let no_data = Sheet::from_rows("Empty", vec![vec![text("Nr")], vec![text("x")]]);
    assert!(matches!(
        ProgramSheet::from_sheet(no_data, LoaderConfig::default()),
        Err(ProgramError::NoDataRegion)
    ));
}

#[test]
fn test_non_numeric_setpoint_is_reported() {
    let mut rows = programme_sheet().rows().to_vec();
    rows[2][3] = text("n/a");
    let sheet = ProgramSheet::from_sheet(Sheet::from_rows("Program", rows), LoaderConfig::default())
        .unwrap();
    match sheet.load(&Programme::parse("Liniaritet"), &Species::So2.default_columns()) {
        Err(ProgramError::InvalidValue { row, column, .. }) => {
            assert_eq!(row, 3);
            assert_eq!(column, "Fso2");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_plan_brackets_ordered_steps() {
    let rows = vec![step(80.0, 4.0, 20.0), step(60.0, 3.0, 40.0), step(50.0, 2.5, 50.0)];
    let plan = RunPlan::build(loaded(rows.clone()), Species::So2, &PlanOptions::default(), start())
        .unwrap();

    assert_eq!(plan.order, Order::Ordered);
    assert_eq!(plan.order.label(), "Ikke Tilfældig");
    assert_eq!(plan.len(), 5);

    let bracket = ProgramStep::flush(4.0);
    assert_eq!(plan.steps[0].step, bracket);
    assert_eq!(plan.steps[4].step, bracket);
    let middle: Vec<ProgramStep> = plan.steps[1..4].iter().map(|p| p.step).collect();
    assert_eq!(middle, rows);
    assert!(plan.steps.iter().all(|p| p.kind == StepKind::Timed));
}

#[test]
fn test_single_step_plan_is_not_bracketed() {
    let options = PlanOptions {
        shuffle: true,
        ..PlanOptions::default()
    };
    let plan = RunPlan::build(loaded(vec![step(90.0, 4.5, 0.0)]), Species::So2, &options, start())
        .unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.order, Order::Single);
    assert_eq!(plan.order.label(), "");
}

#[test]
fn test_seeded_shuffle_is_reproducible_permutation() {
    let rows: Vec<ProgramStep> = (1..=8).map(|i| step(90.0 - i as f64, 4.0, i as f64)).collect();
    let options = PlanOptions {
        shuffle: true,
        seed: Some(42),
        step_minutes: 5.0,
    };
    let a = RunPlan::build(loaded(rows.clone()), Species::Nox, &options, start()).unwrap();
    let b = RunPlan::build(loaded(rows.clone()), Species::Nox, &options, start()).unwrap();

    assert_eq!(a.order.label(), "Tilfældig");
    assert_eq!(a.steps, b.steps);

    let mut spans: Vec<f64> = a.steps[1..9].iter().map(|p| p.step.span_pct).collect();
    spans.sort_by(f64::total_cmp);
    assert_eq!(spans, (1..=8).map(|i| i as f64).collect::<Vec<_>>());
}

#[test]
fn test_expected_finish_and_names() {
    let rows = vec![step(80.0, 4.0, 20.0), step(60.0, 3.0, 40.0), step(50.0, 2.5, 50.0)];
    let options = PlanOptions {
        step_minutes: 15.0,
        ..PlanOptions::default()
    };
    let mut lin = loaded(rows);
    lin.programme = Programme::parse("Inds v skift af ref");
    let plan = RunPlan::build(lin, Species::So2, &options, start()).unwrap();

    let finish = plan.expected_finish(start());
    assert_eq!((finish - start()).num_minutes(), 15 * 5);
    assert_eq!(plan.save_name(), "2024_03_05_09_30_SO2_reference_gas_skift");
    assert_eq!(
        plan.comment_title(),
        "Kommentarer og information til SO2 Reference Gas Skift"
    );
}

#[test]
fn test_reset_plan_is_immediate() {
    let reset = LoadedProgramme {
        programme: Programme::Reset,
        steps: vec![ProgramStep::ZERO],
        immediate: true,
    };
    let plan = RunPlan::build(reset, Species::So2, &PlanOptions::default(), start()).unwrap();
    assert_eq!(plan.steps[0].kind, StepKind::Immediate);
    assert_eq!(plan.expected_finish(start()), start());
}

#[test]
fn test_invalid_step_duration() {
    let options = PlanOptions {
        step_minutes: 0.0,
        ..PlanOptions::default()
    };
    assert!(matches!(
        RunPlan::build(loaded(vec![]), Species::So2, &options, start()),
        Err(ProgramError::InvalidStepDuration(_))
    ));
}
