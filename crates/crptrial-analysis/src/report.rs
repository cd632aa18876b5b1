//! Markdown rendering of [`AnalysisResults`] and the console summary.
//!
//! Undefined statistics are printed as `NaN`.

use std::fmt;

use crptrial_data::record::Group;
use crptrial_stats::{descriptive::DescriptiveStats, hypothesis::TestResult};

use crate::{
    analysis::AnalysisResults,
    model::{INTERACTION_TERM, ModelOutcome},
    plot::Figure,
};

const ALPHA: f64 = 0.05;

const LIMITATIONS: [&str; 3] = [
    "Potential influence of missing data",
    "Generalizability to broader populations",
    "Possible unaccounted confounders",
];

fn format_p(p: f64) -> String {
    if p.is_nan() {
        "NaN".to_owned()
    } else if p < 1e-4 {
        "<0.0001".to_owned()
    } else {
        format!("{p:.4}")
    }
}

fn format_test(test: &TestResult) -> String {
    format!(
        "T-statistic: {:.4}, p-value: {}",
        test.statistic,
        format_p(test.p_value)
    )
}

fn is_significant(test: &TestResult) -> bool {
    test.p_value < ALPHA
}

/// Markdown report; render it with `to_string()` or `write!`.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownReport<'a> {
    results: &'a AnalysisResults,
}

impl<'a> MarkdownReport<'a> {
    #[must_use]
    pub fn new(results: &'a AnalysisResults) -> Self {
        Self { results }
    }

    fn value_name(&self) -> String {
        self.results.overview.value_column.to_uppercase()
    }

    fn write_overview(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let overview = &self.results.overview;
        writeln!(f, "## Data Overview")?;
        writeln!(f)?;
        writeln!(f, "- Rows: {}", overview.rows)?;
        writeln!(f, "- Patients: {}", overview.patients)?;
        let groups = overview
            .patients_per_group
            .iter()
            .map(|(group, n)| format!("{group} ({n} patients)"))
            .collect::<Vec<_>>();
        writeln!(f, "- Groups: {}", groups.join(", "))?;
        let days = overview
            .days
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>();
        writeln!(f, "- Days: {} ({} time points)", days.join(", "), days.len())?;
        writeln!(f, "- Value column: `{}`", overview.value_column)?;
        writeln!(f)
    }

    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        type Getter = fn(&DescriptiveStats) -> String;
        let rows: [(&str, Getter); 8] = [
            ("count", |s| s.count.to_string()),
            ("mean", |s| format!("{:.3}", s.mean)),
            ("std", |s| format!("{:.3}", s.std_dev)),
            ("min", |s| format!("{:.3}", s.min)),
            ("25%", |s| format!("{:.3}", s.q1)),
            ("50%", |s| format!("{:.3}", s.median)),
            ("75%", |s| format!("{:.3}", s.q3)),
            ("max", |s| format!("{:.3}", s.max)),
        ];

        let columns = &self.results.summary.columns;
        writeln!(f, "## Summary Statistics")?;
        writeln!(f)?;
        write!(f, "| |")?;
        for (name, _) in columns {
            write!(f, " {name} |")?;
        }
        writeln!(f)?;
        writeln!(f, "|---|{}", "---:|".repeat(columns.len()))?;
        for (label, getter) in rows {
            write!(f, "| {label} |")?;
            for (_, stats) in columns {
                write!(f, " {} |", getter(stats))?;
            }
            writeln!(f)?;
        }
        writeln!(f)
    }

    fn write_group_day(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Descriptive Statistics by Group and Day")?;
        writeln!(f)?;
        writeln!(f, "| group | day | mean | median | std | count |")?;
        writeln!(f, "|---|---:|---:|---:|---:|---:|")?;
        for row in &self.results.group_day {
            let s = &row.stats;
            writeln!(
                f,
                "| {} | {} | {:.3} | {:.3} | {:.3} | {} |",
                row.group, row.day, s.mean, s.median, s.std_dev, s.count
            )?;
        }
        writeln!(f)
    }

    fn write_missing(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Missing Values")?;
        writeln!(f)?;
        writeln!(f, "| column | missing |")?;
        writeln!(f, "|---|---:|")?;
        for (column, count) in &self.results.missing.columns {
            writeln!(f, "| {column} | {count} |")?;
        }
        writeln!(f)
    }

    fn write_model(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Linear Mixed Model Results")?;
        writeln!(f)?;
        writeln!(
            f,
            "Model: `{} ~ group + day + group:day`, random intercept per patient, fitted by REML.",
            self.results.overview.value_column
        )?;
        writeln!(f)?;
        match &self.results.model {
            ModelOutcome::Fitted(fit) => {
                writeln!(f, "| term | coef | std err | z | P>\\|z\\| | [0.025 | 0.975] |")?;
                writeln!(f, "|---|---:|---:|---:|---:|---:|---:|")?;
                for c in &fit.coefficients {
                    writeln!(
                        f,
                        "| {} | {:.4} | {:.4} | {:.3} | {} | {:.4} | {:.4} |",
                        c.name,
                        c.estimate,
                        c.std_error,
                        c.z,
                        format_p(c.p_value),
                        c.ci_lower,
                        c.ci_upper
                    )?;
                }
                writeln!(f)?;
                writeln!(f, "- Patient (random intercept) variance: {:.4}", fit.group_variance)?;
                writeln!(f, "- Residual variance: {:.4}", fit.residual_variance)?;
                writeln!(f, "- REML log-likelihood: {:.4}", fit.reml_log_likelihood)?;
                writeln!(
                    f,
                    "- Observations: {}, patients: {}",
                    fit.observations, fit.clusters
                )?;
            }
            ModelOutcome::NotConverged { reason } => {
                writeln!(f, "> The model did not converge: {reason}.")?;
            }
        }
        writeln!(f)
    }

    fn write_secondary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let results = self.results;
        let name = self.value_name();
        writeln!(f, "## T-Test: Maximum {name} Values")?;
        writeln!(f)?;
        writeln!(f, "{}", format_test(&results.max_value_test))?;
        writeln!(f)?;

        let normalization = &results.normalization;
        writeln!(f, "## T-Test: Time to {name} Normalization")?;
        writeln!(f)?;
        writeln!(
            f,
            "Normalization: first day below {} after having reached it.",
            normalization.threshold
        )?;
        writeln!(f)?;
        writeln!(f, "{}", format_test(&normalization.test))?;
        writeln!(f)?;
        writeln!(
            f,
            "| group | patients | events | censored | mean day | Kaplan-Meier median |"
        )?;
        writeln!(f, "|---|---:|---:|---:|---:|---:|")?;
        for (group, stats) in &normalization.by_group {
            let median = stats
                .median_km
                .map_or_else(|| "not reached".to_owned(), |day| day.to_string());
            writeln!(
                f,
                "| {group} | {} | {} | {} | {:.2} | {median} |",
                stats.patients, stats.events, stats.censored, stats.mean_event_day
            )?;
        }
        writeln!(f)?;

        writeln!(f, "## Per-Day Group Comparison")?;
        writeln!(f)?;
        writeln!(f, "| day | treated mean | control mean | t | p |")?;
        writeln!(f, "|---:|---:|---:|---:|---:|")?;
        for c in &results.day_comparisons {
            writeln!(
                f,
                "| {} | {:.2} | {:.2} | {:.3} | {} |",
                c.day,
                c.treated.mean,
                c.control.mean,
                c.test.statistic,
                format_p(c.test.p_value)
            )?;
        }
        writeln!(f)
    }

    fn write_conclusion(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Conclusion")?;
        writeln!(f)?;
        for sentence in self.conclusion() {
            writeln!(f, "{sentence}")?;
        }
        writeln!(f)?;
        writeln!(f, "### Limitations")?;
        writeln!(f)?;
        for limitation in LIMITATIONS {
            writeln!(f, "- {limitation}")?;
        }
        writeln!(f)
    }

    fn conclusion(&self) -> Vec<String> {
        let results = self.results;
        let name = self.value_name();
        let mut sentences = vec![];

        let interaction = results
            .model
            .fit()
            .and_then(|fit| fit.coefficient(INTERACTION_TERM));
        sentences.push(match interaction {
            Some(c) if c.p_value < ALPHA => format!(
                "The mixed model shows a significant group-by-time interaction \
                 (estimate {:.3}, p = {}), indicating different {name} trajectories \
                 between the groups.",
                c.estimate,
                format_p(c.p_value)
            ),
            Some(c) => format!(
                "The mixed model shows no significant group-by-time interaction (p = {}).",
                format_p(c.p_value)
            ),
            None => "The mixed model did not converge, so the group-by-time interaction \
                     could not be assessed."
                .to_owned(),
        });

        let compare = |test: &TestResult, what: &str, lower: &str, higher: &str| {
            if !test.is_defined() {
                format!("The comparison of {what} could not be computed.")
            } else if is_significant(test) {
                let direction = if test.statistic < 0.0 { lower } else { higher };
                format!(
                    "Treated patients show significantly {direction} {what} (p = {}).",
                    format_p(test.p_value)
                )
            } else {
                format!(
                    "There is no significant difference in {what} (p = {}).",
                    format_p(test.p_value)
                )
            }
        };
        sentences.push(compare(
            &results.max_value_test,
            &format!("maximum {name} values"),
            "lower",
            "higher",
        ));
        sentences.push(compare(
            &results.normalization.test,
            &format!("time to {name} normalization"),
            "shorter",
            "longer",
        ));

        let days = results
            .day_comparisons
            .iter()
            .filter(|c| is_significant(&c.test))
            .map(|c| c.day.to_string())
            .collect::<Vec<_>>();
        sentences.push(if days.is_empty() {
            "No single day shows a significant group difference.".to_owned()
        } else {
            format!(
                "Per-day tests reach p < {ALPHA} on day(s) {}.",
                days.join(", ")
            )
        });
        sentences
    }

    fn write_figures(f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Figures")?;
        writeln!(f)?;
        for figure in Figure::ALL {
            writeln!(f, "![{}]({})", figure.title(), figure.file_name())?;
        }
        Ok(())
    }
}

impl fmt::Display for MarkdownReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {} Data Analysis Results", self.value_name())?;
        writeln!(f)?;
        writeln!(
            f,
            "_Generated: {}_",
            self.results.generated_at.format("%Y-%m-%d %H:%M:%S %:z")
        )?;
        writeln!(f)?;
        self.write_overview(f)?;
        self.write_summary(f)?;
        self.write_group_day(f)?;
        self.write_missing(f)?;
        self.write_model(f)?;
        self.write_secondary(f)?;
        self.write_conclusion(f)?;
        Self::write_figures(f)
    }
}

/// Short plain-text summary of the model and the per-day tests for the
/// terminal.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSummary<'a> {
    results: &'a AnalysisResults,
}

impl<'a> ConsoleSummary<'a> {
    #[must_use]
    pub fn new(results: &'a AnalysisResults) -> Self {
        Self { results }
    }
}

impl fmt::Display for ConsoleSummary<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let results = self.results;
        writeln!(out, "Mixed model:")?;
        match &results.model {
            ModelOutcome::Fitted(fit) => {
                writeln!(
                    out,
                    "  {:<22} {:>10} {:>10} {:>8} {:>9}",
                    "term", "coef", "std err", "z", "p"
                )?;
                for c in &fit.coefficients {
                    writeln!(
                        out,
                        "  {:<22} {:>10.4} {:>10.4} {:>8.3} {:>9}",
                        c.name,
                        c.estimate,
                        c.std_error,
                        c.z,
                        format_p(c.p_value)
                    )?;
                }
                writeln!(
                    out,
                    "  patient variance {:.4}, residual variance {:.4}",
                    fit.group_variance, fit.residual_variance
                )?;
            }
            ModelOutcome::NotConverged { reason } => writeln!(out, "  did not converge: {reason}")?,
        }

        writeln!(out, "Per-day t-tests (treated vs control):")?;
        for c in &results.day_comparisons {
            writeln!(
                out,
                "  day {:>3}: {:>9.2} vs {:>9.2}  t = {:>8.3}  p = {}",
                c.day,
                c.treated.mean,
                c.control.mean,
                c.test.statistic,
                format_p(c.test.p_value)
            )?;
        }
        writeln!(
            out,
            "Maximum value: {}",
            format_test(&results.max_value_test)
        )?;
        let normalization = &results.normalization;
        writeln!(
            out,
            "Time to normalization: {}",
            format_test(&normalization.test)
        )?;
        for group in Group::ALL {
            if let Some(stats) = normalization.by_group.get(&group) {
                writeln!(
                    out,
                    "  {}: {} of {} normalized",
                    group.label(),
                    stats.events,
                    stats.patients
                )?;
            }
        }
        Ok(())
    }
}
