use std::path::Path;

use anyhow::{anyhow, Result};
use plotters::prelude::*;
use tracing::info;

const GOOD_COLOUR: RGBColor = RGBColor(34, 139, 34);
const BAD_COLOUR: RGBColor = RGBColor(200, 30, 30);
const MISSING_COLOUR: RGBColor = RGBColor(30, 60, 200);

pub fn colour_for_key(key: &str) -> RGBColor {
    match key {
        "good" => GOOD_COLOUR,
        "bad" => BAD_COLOUR,
        "missing" => MISSING_COLOUR,
        _ => BLACK,
    }
}

/// Min/max/mean/median curves of one good/bad/missing fraction, in percent.
#[derive(Debug, Clone)]
pub struct CurveSet {
    pub name: &'static str,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
    pub mean: Vec<f64>,
    pub median: Vec<f64>,
}

fn draw_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow!("plotting failed: {e}")
}

/// Draws the evolution of good/bad/missing prediction fractions across genes
/// per sampling percentage (or cumulative threshold).
pub fn fraction_curves(
    output_path: &Path,
    x: &[f64],
    curves: &[CurveSet],
    cumulative: bool,
) -> Result<()> {
    let caption = if cumulative {
        "Cumulative evolution of good/bad/missing predictions vs 100% sampling"
    } else {
        "Evolution of good/bad/missing predictions vs 100% sampling"
    };
    let x_min = x.first().copied().unwrap_or(0.0);
    let x_max = x.last().copied().unwrap_or(100.0).max(x_min + 1.0);

    let root = BitMapBackend::new(output_path, (1000, 700)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, 0.0..100.0)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("Sampling (%)")
        .y_desc("Good/bad/missing predictions (%)")
        .draw()
        .map_err(draw_err)?;

    for set in curves {
        let base = colour_for_key(set.name);
        let stats: [(&str, &Vec<f64>, f64, u32); 4] = [
            ("Min", &set.min, 0.35, 2),
            ("Max", &set.max, 0.35, 2),
            ("Mean", &set.mean, 1.0, 3),
            ("Median", &set.median, 0.7, 2),
        ];
        for (stat_name, series, opacity, width) in stats {
            let colour = base.mix(opacity);
            chart
                .draw_series(LineSeries::new(
                    x.iter().copied().zip(series.iter().copied()),
                    colour.stroke_width(width),
                ))
                .map_err(draw_err)?
                .label(format!("{stat_name} {}", set.name))
                .legend(move |(lx, ly)| {
                    PathElement::new(vec![(lx, ly), (lx + 25, ly)], colour.stroke_width(3))
                });
        }
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::MiddleRight)
        .draw()
        .map_err(draw_err)?;

    root.present().map_err(draw_err)?;
    info!("Plot saved to: {}", output_path.display());
    Ok(())
}

/// Draws one box of per-run scores per sampling, plus an optional single
/// point for the complete (100% sampling) predictions.
pub fn score_boxplot(
    output_path: &Path,
    samplings: &[(String, Vec<f64>)],
    complete_score: Option<f64>,
) -> Result<()> {
    let mut labels: Vec<String> = samplings.iter().map(|(label, _)| label.clone()).collect();
    if complete_score.is_some() {
        labels.push("100".to_string());
    }

    let mut all: Vec<f64> = samplings.iter().flat_map(|(_, s)| s.iter().copied()).collect();
    if let Some(score) = complete_score {
        all.push(score);
    }
    let lo = all.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = if all.is_empty() { (0.0, 1.0) } else { (lo, hi) };
    let pad = ((hi - lo) * 0.1).max(0.05);
    let y_range = (lo - pad) as f32..(hi + pad) as f32;

    let root = BitMapBackend::new(output_path, (1000, 650)).into_drawing_area();
    root.fill(&WHITE).map_err(draw_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Precision scores for each sampling", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(labels[..].into_segmented(), y_range)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .x_desc("Sampling (%)")
        .y_desc("Score")
        .draw()
        .map_err(draw_err)?;

    let boxes: Vec<(usize, Quartiles)> = samplings
        .iter()
        .enumerate()
        .filter(|(_, (_, scores))| !scores.is_empty())
        .map(|(i, (_, scores))| (i, Quartiles::new(scores)))
        .collect();
    chart
        .draw_series(
            boxes
                .iter()
                .map(|(i, q)| Boxplot::new_vertical(SegmentValue::CenterOf(&labels[*i]), q)),
        )
        .map_err(draw_err)?;

    if let Some(score) = complete_score {
        let last = labels.len() - 1;
        chart
            .draw_series(std::iter::once(Circle::new(
                (SegmentValue::CenterOf(&labels[last]), score as f32),
                5,
                GOOD_COLOUR.filled(),
            )))
            .map_err(draw_err)?;
    }

    root.present().map_err(draw_err)?;
    info!("Plot saved to: {}", output_path.display());
    Ok(())
}
