//! Spot figures: image heatmap with the line cuts and the line cut profiles

use std::path::Path;

use plotters::prelude::*;

use super::{ReportError, Result};
use crate::{grid::IntensityGrid, spot::SpotFit};

fn plot_error<E: std::fmt::Display>(e: E) -> ReportError {
    ReportError::Plot(e.to_string())
}

/// Image heatmap with both line cuts overlaid
pub fn heatmap<P: AsRef<Path>>(grid: &IntensityGrid, spot: &SpotFit, path: P) -> Result<()> {
    let (rows, cols) = (grid.rows(), grid.cols());
    let (min, max) = (grid.min(), grid.max());
    let range = if max > min { max - min } else { 1. };

    let plot = BitMapBackend::new(path.as_ref(), (768, 768 * rows as u32 / cols.max(1) as u32))
        .into_drawing_area();
    plot.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&plot)
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .margin(10)
        .build_cartesian_2d(-0.5..cols as f64 - 0.5, -0.5..rows as f64 - 0.5)
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("x [pixel]")
        .y_desc("y [pixel]")
        .draw()
        .map_err(plot_error)?;

    let colormap = colorous::VIRIDIS;
    chart
        .draw_series(grid.samples().map(|(x, y, v)| {
            let color = colormap.eval_continuous((v - min) / range);
            Rectangle::new(
                [(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)],
                RGBColor(color.r, color.g, color.b).filled(),
            )
        }))
        .map_err(plot_error)?;

    let mut colors = colorous::TABLEAU10.iter().cycle();
    for (label, cut) in [("θ-45°", &spot.cuts.minus_45), ("θ+45°", &spot.cuts.plus_45)] {
        let Some(color) = colors.next() else { break };
        let rgb = RGBColor(color.r, color.g, color.b);
        chart
            .draw_series(LineSeries::new(
                cut.points.iter().map(|p| (p.x, p.y)),
                rgb.stroke_width(2),
            ))
            .map_err(plot_error)?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &rgb));
    }
    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(plot_error)?;
    plot.present().map_err(plot_error)?;
    Ok(())
}

/// Image and fit along both line cuts
pub fn line_cuts<P: AsRef<Path>>(spot: &SpotFit, path: P) -> Result<()> {
    let cuts = [("θ-45°", &spot.cuts.minus_45), ("θ+45°", &spot.cuts.plus_45)];
    let (x_min, x_max) = cuts
        .iter()
        .flat_map(|(_, cut)| cut.positions())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), x| {
            (a.min(x), b.max(x))
        });
    let (y_min, y_max) = cuts
        .iter()
        .flat_map(|(_, cut)| cut.data().chain(cut.fit()))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), y| {
            (a.min(y), b.max(y))
        });
    if x_min > x_max || y_min > y_max {
        return Err(ReportError::Plot("empty line cuts".into()));
    }
    let y_padding = 0.05 * (y_max - y_min).max(1.);

    let plot = BitMapBackend::new(path.as_ref(), (768, 512)).into_drawing_area();
    plot.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&plot)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .margin(10)
        .caption(format!("R² = {:.4}", spot.r_squared), ("sans-serif", 20))
        .build_cartesian_2d(x_min..x_max, y_min - y_padding..y_max + y_padding)
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .x_desc("Distance to the center [pixel]")
        .y_desc("Intensity")
        .draw()
        .map_err(plot_error)?;

    let mut colors = colorous::TABLEAU10.iter().cycle();
    for (label, cut) in cuts {
        let Some(color) = colors.next() else { break };
        let rgb = RGBColor(color.r, color.g, color.b);
        chart
            .draw_series(
                cut.points
                    .iter()
                    .map(|p| Circle::new((p.position, p.data), 2, rgb.filled())),
            )
            .map_err(plot_error)?
            .label(format!("{label} data"))
            .legend(move |(x, y)| Circle::new((x + 10, y), 3, rgb.filled()));
        chart
            .draw_series(LineSeries::new(
                cut.points.iter().map(|p| (p.position, p.fit)),
                &rgb,
            ))
            .map_err(plot_error)?
            .label(format!("{label} fit"))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &rgb));
    }
    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(plot_error)?;
    plot.present().map_err(plot_error)?;
    Ok(())
}
