//! Programme workbooks read from real `.xlsx` files

mod common;

use std::fs::File;
use std::io::Write;

use chrono::{Local, TimeZone};
use tempfile::tempdir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use common::{programme_rows, write_workbook, TestCell};
use mfcblend::program::xlsx::{self, CellValue};
use mfcblend::program::{
    LoaderConfig, Order, PlanOptions, ProgramError, ProgramSheet, ProgramStep, Programme,
    RunPlan, Species,
};

fn open_programmes() -> (tempfile::TempDir, ProgramSheet) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("programmes.xlsx");
    write_workbook(&path, &programme_rows());
    let sheet = ProgramSheet::open(&path, LoaderConfig::default()).unwrap();
    (dir, sheet)
}

#[test]
fn test_sheet_cells_and_fills() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("programmes.xlsx");
    write_workbook(&path, &programme_rows());

    let sheet = xlsx::read_first_sheet(&path).unwrap();
    assert_eq!(sheet.name(), "Program");
    assert_eq!(sheet.value(0, 4), CellValue::Text("ml/min ".to_string()));
    assert_eq!(sheet.value(1, 2), CellValue::Number(4.5));
    assert_eq!(sheet.value(3, 5), CellValue::Text("100.5".to_string()));
    assert_eq!(sheet.value(4, 0), CellValue::Text("4".to_string()));

    assert_eq!(sheet.cell(1, 6).unwrap().fill, "FFFFFF00");
    assert_eq!(sheet.cell(2, 6).unwrap().fill, "5");
    assert_eq!(sheet.cell(2, 7).unwrap().fill, "43");
    assert_eq!(sheet.cell(2, 8).unwrap().fill, "4");
    assert_eq!(sheet.cell(1, 8).unwrap().fill, xlsx::NO_FILL);
    assert!(sheet.cell(1, 7).is_none() || sheet.value(1, 7).is_empty());
}

#[test]
fn test_options_and_data_region() {
    let (_dir, sheet) = open_programmes();

    // The note row ends the data region
    assert_eq!(sheet.data_rows(), 4);
    assert_eq!(
        sheet.options(),
        vec!["Liniaritet", "Span", "Inds v skift af ref", "Nul"]
    );
}

#[test]
fn test_colored_rows_follow_the_allowlist() {
    let (_dir, sheet) = open_programmes();

    // Yellow, indexed and theme fills mark rows; the mark under the note row does not
    assert_eq!(sheet.colored_rows("Liniaritet").unwrap(), vec![1, 2, 4]);
    // Indexed 43 is allowlisted
    assert_eq!(sheet.colored_rows("Span").unwrap(), vec![3]);
    assert_eq!(sheet.colored_rows("Inds v skift af ref").unwrap(), vec![2]);

    let strict = LoaderConfig {
        color_allowlist: vec![xlsx::NO_FILL.to_string()],
        ..LoaderConfig::default()
    };
    let dir = tempdir().unwrap();
    let path = dir.path().join("strict.xlsx");
    write_workbook(&path, &programme_rows());
    let sheet = ProgramSheet::open(&path, strict).unwrap();
    assert_eq!(sheet.colored_rows("Span").unwrap(), vec![2, 3]);
}

#[test]
fn test_load_linearity_programme() {
    let (_dir, sheet) = open_programmes();
    let loaded = sheet
        .load(&Programme::parse("Liniaritet"), &Species::So2.default_columns())
        .unwrap();

    assert!(!loaded.immediate);
    assert_eq!(
        loaded.steps,
        vec![
            ProgramStep {
                dilution_pct: 90.0,
                dilution_flow: 4.5,
                span_pct: 0.0,
                span_flow: 0.0,
                concentration_ppb: 0.0,
            },
            ProgramStep {
                dilution_pct: 80.0,
                dilution_flow: 4.0,
                span_pct: 20.0,
                span_flow: 20.0,
                concentration_ppb: 50.0,
            },
            ProgramStep {
                dilution_pct: 50.0,
                dilution_flow: 2.5,
                span_pct: 50.0,
                span_flow: 50.0,
                concentration_ppb: 150.0,
            },
        ]
    );

    let start = Local.with_ymd_and_hms(2024, 3, 5, 9, 30, 0).unwrap();
    let plan = RunPlan::build(loaded, Species::So2, &PlanOptions::default(), start).unwrap();
    assert_eq!(plan.order, Order::Ordered);
    assert_eq!(plan.len(), 5);
    assert_eq!(plan.steps[0].step, ProgramStep::flush(4.5));
    assert_eq!(plan.steps[4].step, ProgramStep::flush(4.5));
    assert_eq!(plan.save_name(), "2024_03_05_09_30_SO2_liniaritet");
}

#[test]
fn test_numeric_text_cells_are_read_as_numbers() {
    let (_dir, sheet) = open_programmes();
    let loaded = sheet
        .load(&Programme::parse("Span"), &Species::So2.default_columns())
        .unwrap();
    assert_eq!(loaded.steps.len(), 1);
    assert_eq!(loaded.steps[0].concentration_ppb, 100.5);
}

#[test]
fn test_shift_programme_reads_the_shift_column() {
    let (_dir, sheet) = open_programmes();
    let programme = Programme::parse("Inds v skift af ref");
    let loaded = sheet
        .load(&programme, &Species::So2.default_columns())
        .unwrap();
    assert_eq!(loaded.steps.len(), 1);
    assert_eq!(loaded.steps[0].span_flow, 20.0);
    assert_eq!(programme.display_name(), "Reference Gas Skift");
}

#[test]
fn test_zero_programme_uses_the_ninety_percent_row() {
    let (_dir, sheet) = open_programmes();
    let loaded = sheet
        .load(&Programme::Zero, &Species::So2.default_columns())
        .unwrap();
    assert_eq!(loaded.steps, vec![ProgramStep::flush(4.5)]);
}

#[test]
fn test_missing_species_columns() {
    let (_dir, sheet) = open_programmes();
    let result = sheet.load(&Programme::parse("Liniaritet"), &Species::Nox.default_columns());
    assert!(matches!(result, Err(ProgramError::MissingColumn(column)) if column == "Fno"));
}

#[test]
fn test_unknown_programme_lists_options() {
    let (_dir, sheet) = open_programmes();
    let result = sheet.load(&Programme::parse("Nr"), &Species::So2.default_columns());
    match result {
        Err(ProgramError::UnknownProgramme { name, available }) => {
            assert_eq!(name, "Nr");
            assert!(available.contains("Liniaritet"));
        }
        other => panic!("expected UnknownProgramme, got {:?}", other),
    }
}

#[test]
fn test_sheet_without_data_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.xlsx");
    write_workbook(
        &path,
        &[
            vec![TestCell::Str("Nr"), TestCell::Str("Fd %")],
            vec![TestCell::Inline("Ingen data")],
        ],
    );
    let result = ProgramSheet::open(&path, LoaderConfig::default());
    assert!(matches!(result, Err(ProgramError::NoDataRegion)));
}

#[test]
fn test_archive_without_workbook_part() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.xlsx");
    let mut zip = ZipWriter::new(File::create(&path).unwrap());
    zip.start_file("docProps/app.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"<Properties/>").unwrap();
    zip.finish().unwrap();

    let result = xlsx::read_first_sheet(&path);
    assert!(matches!(result, Err(ProgramError::MissingPart(_))));
}

#[test]
fn test_not_a_zip_archive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("programmes.xlsx");
    std::fs::write(&path, "Nr;Fd %;ml/min\n1;90;4.5\n").unwrap();

    let result = xlsx::read_first_sheet(&path);
    assert!(matches!(result, Err(ProgramError::ZipError(_))));
}
