use std::path::Path;

use plotters::prelude::*;

use super::{RecordError, RunLog};

/// Axis labels and ranges for the flow plot
#[derive(Debug, Clone, PartialEq)]
pub struct PlotAxes {
    /// Span axis description (left)
    pub span_label: String,
    /// Upper bound of the span axis
    pub span_max: f64,
    /// Dilution axis description (right)
    pub dilution_label: String,
    /// Upper bound of the dilution axis
    pub dilution_max: f64,
}

impl PlotAxes {
    /// Axes for a span MFC in mL/min and a dilution MFC in L/min
    pub fn new(span_max_ml: f64, dilution_max_l: f64) -> Self {
        Self {
            span_label: "Span [mL/min]".to_string(),
            span_max: span_max_ml,
            dilution_label: "Fortynding [L/min]".to_string(),
            dilution_max: dilution_max_l,
        }
    }
}

const SPAN_COLOR: RGBColor = RGBColor(0, 128, 0);
const DILUTION_COLOR: RGBColor = BLUE;

fn plot_err<E: std::fmt::Display>(e: E) -> RecordError {
    RecordError::PlotError(e.to_string())
}

/// Render both flow channels against minutes since the first sample as SVG
pub fn render_svg(path: &Path, log: &RunLog, axes: &PlotAxes) -> Result<(), RecordError> {
    let root = SVGBackend::new(path, (1000, 500)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let origin = log.samples().first().map(|s| s.timestamp);
    let points: Vec<(f64, f64, f64)> = log
        .samples()
        .iter()
        .map(|s| {
            let minutes = origin
                .map(|t0| (s.timestamp - t0).num_milliseconds() as f64 / 60_000.0)
                .unwrap_or(0.0);
            (minutes, s.span_ml_min, s.dilution_l_min)
        })
        .collect();

    let x_max = points.last().map(|p| p.0).unwrap_or(0.0).max(1.0);
    let span_max = axis_max(axes.span_max, points.iter().map(|p| p.1));
    let dilution_max = axis_max(axes.dilution_max, points.iter().map(|p| p.2));

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .right_y_label_area_size(60)
        .build_cartesian_2d(0f64..x_max, 0f64..span_max)
        .map_err(plot_err)?
        .set_secondary_coord(0f64..x_max, 0f64..dilution_max);

    chart
        .configure_mesh()
        .x_desc("Tid [min]")
        .y_desc(axes.span_label.as_str())
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;
    chart
        .configure_secondary_axes()
        .y_desc(axes.dilution_label.as_str())
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            points.iter().map(|p| (p.0, p.1)),
            &SPAN_COLOR,
        ))
        .map_err(plot_err)?;
    chart
        .draw_secondary_series(LineSeries::new(
            points.iter().map(|p| (p.0, p.2)),
            &DILUTION_COLOR,
        ))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Axis upper bound: the configured maximum, widened to fit the data
fn axis_max(configured: f64, values: impl Iterator<Item = f64>) -> f64 {
    let data_max = values.fold(0.0f64, f64::max);
    let max = configured.max(data_max * 1.05);
    if max.is_finite() && max > 0.0 {
        max
    } else {
        1.0
    }
}
