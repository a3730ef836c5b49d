use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;

use mfcblend::program::{PlanOptions, ProgramSheet, Programme, RunPlan, Species};

use super::config::Config;

/// Show the programmes of a workbook, or preview one programme's steps
pub fn run(
    workbook: PathBuf,
    species: Option<String>,
    programme: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load(config.as_deref())?;
    let sheet = ProgramSheet::open(&workbook, config.loader_config())
        .with_context(|| format!("Failed to read workbook {}", workbook.display()))?;

    println!("Workbook: {}", workbook.display());
    println!("Data rows: {}", sheet.data_rows());
    println!("Programmes:");
    for option in sheet.options() {
        let rows = match Programme::parse(&option) {
            Programme::Column(ref name) => {
                let column = if Programme::parse(name).is_shift() {
                    config.loader_config().shift_column
                } else {
                    name.clone()
                };
                match sheet.colored_rows(&column) {
                    Ok(rows) => format!("rows {:?}", rows),
                    Err(e) => e.to_string(),
                }
            }
            _ => "built in".to_string(),
        };
        println!("  {:<24} {}", option, rows);
    }

    let (Some(species), Some(programme)) = (species, programme) else {
        return Ok(());
    };
    let species: Species = species.parse()?;
    let loaded = sheet.load(&Programme::parse(&programme), &config.species_columns(species))?;
    let plan = RunPlan::build(loaded, species, &PlanOptions::default(), Local::now())?;

    println!();
    println!("{} {} ({})", plan.species, plan.programme, plan.order.label());
    println!(
        "{:>4} {:>10} {:>12} {:>8} {:>12} {:>12}",
        "#", "Fd [%]", "Fd [L/min]", "Span [%]", "Span [mL/min]", "Conc [ppb]"
    );
    for (i, planned) in plan.steps.iter().enumerate() {
        let step = &planned.step;
        println!(
            "{:>4} {:>10} {:>12.2} {:>8} {:>12.2} {:>12.2}",
            i + 1,
            step.dilution_pct,
            step.dilution_flow,
            step.span_pct,
            step.span_flow,
            step.concentration_ppb
        );
    }
    println!("Save name: {}", plan.save_name());
    Ok(())
}
