//! PNG figures rendered with `plotters`.
//!
//! All figures share the same axes: days on x, the measured value on y.
//! Controls are drawn in blue, treated patients in orange.

use std::{error::Error, ops::Range, path::Path};

use crptrial_data::record::Group;
use crptrial_stats::{descriptive::DescriptiveStats, mixed::Z_975};
use plotters::{
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use serde::{Deserialize, Serialize};

use crate::{describe::GroupDayStats, patient::PatientTrajectory, secondary::DayComparison};

const CONTROL_COLOR: RGBColor = RGBColor(31, 119, 180);
const TREATED_COLOR: RGBColor = RGBColor(255, 127, 14);
const FONT: &str = "sans-serif";
const X_DESC: &str = "Day after surgery";
const GRID_COLUMNS: usize = 5;
/// Panels drawn per group in the individual patient grid.
const MAX_GRID_PATIENTS_PER_GROUP: usize = 30;
const GRID_ROW_HEIGHT: usize = 220;

type DrawResult = Result<(), Box<dyn Error>>;

/// The four figures referenced by the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Figure {
    GroupMeans,
    IndividualPatients,
    Boxplot,
    GroupComparison,
}

impl Figure {
    pub const ALL: [Figure; 4] = [
        Figure::GroupMeans,
        Figure::IndividualPatients,
        Figure::Boxplot,
        Figure::GroupComparison,
    ];

    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Figure::GroupMeans => "crp_over_time.png",
            Figure::IndividualPatients => "individual_patient_plots.png",
            Figure::Boxplot => "crp_boxplot.png",
            Figure::GroupComparison => "crp_over_time_by_group.png",
        }
    }

    /// Caption, also used as the image alt text in the report.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Figure::GroupMeans => "Mean trajectories over time by group",
            Figure::IndividualPatients => "Individual patient trajectories",
            Figure::Boxplot => "Values by day and group",
            Figure::GroupComparison => "Trajectories by group with per-day p-values",
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("failed to draw {}: {message}", figure.file_name())]
pub struct PlotError {
    pub figure: Figure,
    pub message: String,
}

/// Data shared by all figures.
#[derive(Debug, Clone, Copy)]
pub struct PlotInput<'a> {
    /// Y axis label, e.g. `CRP (mg/L)`.
    pub value_label: &'a str,
    pub trajectories: &'a [PatientTrajectory],
    pub group_day: &'a [GroupDayStats],
    pub comparisons: &'a [DayComparison],
}

/// Draws every figure into `dir`.
pub fn draw_all(dir: &Path, input: &PlotInput<'_>) -> Result<(), PlotError> {
    for figure in Figure::ALL {
        let path = dir.join(figure.file_name());
        let result = match figure {
            Figure::GroupMeans => draw_group_means(&path, input),
            Figure::IndividualPatients => draw_individual_patients(&path, input),
            Figure::Boxplot => draw_boxplot(&path, input),
            Figure::GroupComparison => draw_group_comparison(&path, input),
        };
        result.map_err(|err| PlotError {
            figure,
            message: err.to_string(),
        })?;
        tracing::info!(path = %path.display(), "figure saved");
    }
    Ok(())
}

fn group_color(group: Group) -> RGBColor {
    match group {
        Group::Control => CONTROL_COLOR,
        Group::Treated => TREATED_COLOR,
    }
}

fn group_rows<'a>(input: &PlotInput<'a>, group: Group) -> impl Iterator<Item = &'a GroupDayStats> {
    input
        .group_day
        .iter()
        .filter(move |r| r.group == group && r.stats.count > 0)
}

/// Trajectories shown in the patient grid (the first
/// [`MAX_GRID_PATIENTS_PER_GROUP`] of each group) and the number left out.
fn grid_trajectories<'a>(
    trajectories: &'a [PatientTrajectory],
) -> (Vec<&'a PatientTrajectory>, usize) {
    let mut shown = vec![];
    let mut omitted = 0;
    for group in Group::ALL {
        let mut members = trajectories.iter().filter(|t| t.group == group);
        shown.extend(members.by_ref().take(MAX_GRID_PATIENTS_PER_GROUP));
        omitted += members.count();
    }
    (shown, omitted)
}

fn grid_height(panels: usize) -> usize {
    panels.max(1).div_ceil(GRID_COLUMNS) * GRID_ROW_HEIGHT + 60
}

/// Half width of the 95% confidence interval of the mean.
fn ci_half_width(stats: &DescriptiveStats) -> f64 {
    Z_975 * stats.std_error()
}

fn day_range(input: &PlotInput<'_>) -> Range<f64> {
    let days = input.group_day.iter().map(|r| f64::from(r.day));
    let first = days.clone().fold(f64::INFINITY, f64::min);
    let last = days.fold(f64::NEG_INFINITY, f64::max);
    if first.is_finite() {
        (first - 0.5)..(last + 0.5)
    } else {
        -0.5..0.5
    }
}

fn value_range<I>(values: I) -> Range<f64>
where
    I: IntoIterator<Item = f64>,
{
    let max = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    0.0..if max > 0.0 { max * 1.1 } else { 1.0 }
}

fn draw_group_means(path: &Path, input: &PlotInput<'_>) -> DrawResult {
    let root = BitMapBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let upper = input
        .group_day
        .iter()
        .map(|r| r.stats.mean + ci_half_width(&r.stats).max(0.0));
    let mut chart = ChartBuilder::on(&root)
        .caption(Figure::GroupMeans.title(), (FONT, 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(day_range(input), value_range(upper))?;
    chart
        .configure_mesh()
        .x_desc(X_DESC)
        .y_desc(input.value_label)
        .draw()?;

    for group in Group::ALL {
        let color = group_color(group);
        let rows = group_rows(input, group).collect::<Vec<_>>();
        let with_band = rows
            .iter()
            .filter(|r| ci_half_width(&r.stats).is_finite())
            .collect::<Vec<_>>();
        let polygon = with_band
            .iter()
            .map(|r| (f64::from(r.day), r.stats.mean + ci_half_width(&r.stats)))
            .chain(
                with_band
                    .iter()
                    .rev()
                    .map(|r| (f64::from(r.day), r.stats.mean - ci_half_width(&r.stats))),
            )
            .collect::<Vec<_>>();
        if polygon.len() >= 4 {
            chart.draw_series(std::iter::once(Polygon::new(
                polygon,
                color.mix(0.2).filled(),
            )))?;
        }
        chart
            .draw_series(LineSeries::new(
                rows.iter().map(|r| (f64::from(r.day), r.stats.mean)),
                color.stroke_width(2),
            ))?
            .label(group.label())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

fn draw_individual_patients(path: &Path, input: &PlotInput<'_>) -> DrawResult {
    let (shown, omitted) = grid_trajectories(input.trajectories);
    let rows = shown.len().max(1).div_ceil(GRID_COLUMNS);
    let height = u32::try_from(grid_height(shown.len()))?;
    let root = BitMapBackend::new(path, (1500, height)).into_drawing_area();
    root.fill(&WHITE)?;
    let title = if omitted == 0 {
        Figure::IndividualPatients.title().to_owned()
    } else {
        tracing::warn!(
            shown = shown.len(),
            omitted,
            "too many patients for the grid, drawing a subset"
        );
        format!(
            "{} (first {MAX_GRID_PATIENTS_PER_GROUP} per group, {omitted} not shown)",
            Figure::IndividualPatients.title()
        )
    };
    let root = root.titled(&title, (FONT, 28))?;

    let x_range = day_range(input);
    let y_range = value_range(
        shown
            .iter()
            .flat_map(|t| t.points.iter().map(|(_, v)| *v)),
    );
    let panels = root.split_evenly((rows, GRID_COLUMNS));
    for (panel, trajectory) in panels.iter().zip(&shown) {
        let color = group_color(trajectory.group);
        let mut chart = ChartBuilder::on(panel)
            .caption(
                format!("{} ({})", trajectory.patient_id, trajectory.group),
                (FONT, 14),
            )
            .margin(6)
            .x_label_area_size(20)
            .y_label_area_size(35)
            .build_cartesian_2d(x_range.clone(), y_range.clone())?;
        chart
            .configure_mesh()
            .x_labels(5)
            .y_labels(4)
            .label_style((FONT, 10))
            .draw()?;
        chart.draw_series(LineSeries::new(
            trajectory.points.iter().map(|(d, v)| (f64::from(*d), *v)),
            color.stroke_width(2),
        ))?;
    }
    root.present()?;
    Ok(())
}

fn draw_boxplot(path: &Path, input: &PlotInput<'_>) -> DrawResult {
    const HALF_WIDTH: f64 = 0.15;
    let root = BitMapBackend::new(path, (1200, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(Figure::Boxplot.title(), (FONT, 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            day_range(input),
            value_range(input.group_day.iter().map(|r| r.stats.max)),
        )?;
    chart
        .configure_mesh()
        .x_desc(X_DESC)
        .y_desc(input.value_label)
        .draw()?;

    for group in Group::ALL {
        let color = group_color(group);
        let shift = match group {
            Group::Control => -0.2,
            Group::Treated => 0.2,
        };
        let rows = group_rows(input, group).collect::<Vec<_>>();

        chart
            .draw_series(rows.iter().map(|r| {
                let x = f64::from(r.day) + shift;
                Rectangle::new(
                    [(x - HALF_WIDTH, r.stats.q1), (x + HALF_WIDTH, r.stats.q3)],
                    color.mix(0.6).filled(),
                )
            }))?
            .label(group.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));

        // whiskers span the full range of the day's values
        chart.draw_series(rows.iter().flat_map(|r| {
            let x = f64::from(r.day) + shift;
            let cap = HALF_WIDTH / 2.0;
            [
                vec![(x - HALF_WIDTH, r.stats.median), (x + HALF_WIDTH, r.stats.median)],
                vec![(x, r.stats.min), (x, r.stats.q1)],
                vec![(x, r.stats.q3), (x, r.stats.max)],
                vec![(x - cap, r.stats.min), (x + cap, r.stats.min)],
                vec![(x - cap, r.stats.max), (x + cap, r.stats.max)],
            ]
            .map(|points| PathElement::new(points, BLACK.stroke_width(1)))
        }))?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

fn draw_group_comparison(path: &Path, input: &PlotInput<'_>) -> DrawResult {
    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let upper = input
        .group_day
        .iter()
        .map(|r| r.stats.mean + r.stats.std_dev.max(r.stats.std_error()));
    let mut chart = ChartBuilder::on(&root)
        .caption(Figure::GroupComparison.title(), (FONT, 22))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(day_range(input), value_range(upper))?;
    chart
        .configure_mesh()
        .x_desc(X_DESC)
        .y_desc(input.value_label)
        .light_line_style(BLACK.mix(0.05))
        .draw()?;

    for group in [Group::Treated, Group::Control] {
        let color = group_color(group);
        let rows = group_rows(input, group).collect::<Vec<_>>();

        let with_sd = rows
            .iter()
            .filter(|r| r.stats.std_dev.is_finite())
            .collect::<Vec<_>>();
        let band = with_sd
            .iter()
            .map(|r| (f64::from(r.day), r.stats.mean + r.stats.std_dev))
            .chain(
                with_sd
                    .iter()
                    .rev()
                    .map(|r| (f64::from(r.day), r.stats.mean - r.stats.std_dev)),
            )
            .collect::<Vec<_>>();
        if band.len() >= 4 {
            chart.draw_series(std::iter::once(Polygon::new(band, color.mix(0.2).filled())))?;
        }

        chart.draw_series(
            rows.iter()
                .filter(|r| r.stats.std_error().is_finite())
                .flat_map(|r| {
                    let x = f64::from(r.day);
                    let sem = r.stats.std_error();
                    let (lo, hi) = (r.stats.mean - sem, r.stats.mean + sem);
                    [
                        vec![(x, lo), (x, hi)],
                        vec![(x - 0.05, lo), (x + 0.05, lo)],
                        vec![(x - 0.05, hi), (x + 0.05, hi)],
                    ]
                    .map(|points| PathElement::new(points, color.stroke_width(1)))
                }),
        )?;

        chart
            .draw_series(
                LineSeries::new(
                    rows.iter().map(|r| (f64::from(r.day), r.stats.mean)),
                    color.stroke_width(2),
                )
                .point_size(4),
            )?
            .label(format!("{} (mean ± SEM)", group.label()))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    let label_style = (FONT, 14)
        .into_font()
        .color(&RED)
        .pos(Pos::new(HPos::Center, VPos::Top));
    chart.draw_series(
        input
            .comparisons
            .iter()
            .filter(|c| c.test.p_value.is_finite())
            .map(|c| {
                let y = c.treated.mean.max(c.control.mean);
                Text::new(
                    format!("p={:.3}", c.test.p_value),
                    (f64::from(c.day), y),
                    label_style.clone(),
                )
            }),
    )?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.draw(&Text::new(
        "SEM: standard error of the mean",
        (10, 580),
        (FONT, 12),
    ))?;
    root.present()?;
    Ok(())
}
