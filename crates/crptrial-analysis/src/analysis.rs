//! The full analysis pipeline: statistics over a loaded table plus the
//! report, figure and wide-table outputs.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use crptrial_data::{
    long::{DEFAULT_VALUE_COLUMN, LongTable},
    missing::MissingValues,
    record::Group,
    wide::WideTable,
};
use crptrial_stats::hypothesis::TestResult;
use serde::{Deserialize, Serialize};

use crate::{
    describe::{self, GroupDayStats, SummaryTable},
    model::{self, ModelOutcome},
    patient::PatientTrajectory,
    plot::{self, PlotError, PlotInput},
    report::MarkdownReport,
    secondary::{self, DEFAULT_THRESHOLD, DayComparison, NormalizationAnalysis},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Name of the measured value column.
    pub value_column: String,
    /// Normalization threshold for the time-to-normalization test.
    pub threshold: f64,
    pub render_figures: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            value_column: DEFAULT_VALUE_COLUMN.to_owned(),
            threshold: DEFAULT_THRESHOLD,
            render_figures: true,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum AnalysisError {
    #[display("normalization threshold must be a positive number, got {value}")]
    InvalidThreshold { value: f64 },
    #[display("table has no complete observations")]
    NoObservations,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum OutputError {
    #[display("failed to create directory {}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[display("failed to write report {}", path.display())]
    WriteReport { path: PathBuf, source: io::Error },
    #[display("failed to write wide table {}", path.display())]
    WriteWide { path: PathBuf, source: csv::Error },
    #[display("failed to render figures")]
    Plot(PlotError),
}

/// Shape of the analyzed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataOverview {
    pub rows: usize,
    pub patients: usize,
    pub patients_per_group: BTreeMap<Group, usize>,
    pub days: Vec<u32>,
    pub value_column: String,
}

impl DataOverview {
    #[must_use]
    pub fn from_table(table: &LongTable) -> Self {
        let patients = table.patients();
        let mut patients_per_group = BTreeMap::new();
        for group in patients.values() {
            *patients_per_group.entry(*group).or_default() += 1;
        }
        Self {
            rows: table.len(),
            patients: patients.len(),
            patients_per_group,
            days: table.days().into_iter().collect(),
            value_column: table.value_column().to_owned(),
        }
    }
}

/// Everything that ends up in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub generated_at: DateTime<Local>,
    pub overview: DataOverview,
    pub summary: SummaryTable,
    pub group_day: Vec<GroupDayStats>,
    pub missing: MissingValues,
    pub model: ModelOutcome,
    pub max_value_test: TestResult,
    pub normalization: NormalizationAnalysis,
    pub day_comparisons: Vec<DayComparison>,
}

/// A completed analysis of one table.
#[derive(Debug, Clone)]
pub struct Analysis {
    config: AnalysisConfig,
    table: LongTable,
    trajectories: Vec<PatientTrajectory>,
    results: AnalysisResults,
}

impl Analysis {
    /// Computes every statistic of the report.
    ///
    /// Degenerate statistics are reported as `NaN` (or, for the mixed model,
    /// as a non-converged outcome) and never abort the analysis.
    pub fn run(table: LongTable, config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        if !(config.threshold.is_finite() && config.threshold > 0.0) {
            return Err(AnalysisError::InvalidThreshold {
                value: config.threshold,
            });
        }
        if table.observations().next().is_none() {
            return Err(AnalysisError::NoObservations);
        }

        let overview = DataOverview::from_table(&table);
        tracing::info!(
            rows = overview.rows,
            patients = overview.patients,
            days = overview.days.len(),
            "analyzing table"
        );

        let trajectories = PatientTrajectory::collect(&table);
        let summary = SummaryTable::from_table(&table);
        let group_day = describe::group_day_stats(&table);
        let missing = table.missing_values();
        if !missing.is_complete() {
            tracing::warn!(missing = missing.total(), "table has missing cells");
        }

        tracing::info!("fitting mixed model");
        let model = model::fit_model(&table);
        let max_value_test = secondary::max_value_test(&trajectories);
        let normalization = NormalizationAnalysis::from_trajectories(&trajectories, config.threshold);
        let day_comparisons = secondary::day_comparisons(&table);

        let results = AnalysisResults {
            generated_at: Local::now(),
            overview,
            summary,
            group_day,
            missing,
            model,
            max_value_test,
            normalization,
            day_comparisons,
        };
        Ok(Self {
            config: config.clone(),
            table,
            trajectories,
            results,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    #[must_use]
    pub fn table(&self) -> &LongTable {
        &self.table
    }

    #[must_use]
    pub fn trajectories(&self) -> &[PatientTrajectory] {
        &self.trajectories
    }

    #[must_use]
    pub fn results(&self) -> &AnalysisResults {
        &self.results
    }

    #[must_use]
    pub fn report(&self) -> MarkdownReport<'_> {
        MarkdownReport::new(&self.results)
    }

    /// Writes the report, the wide table and (unless disabled) the figures.
    ///
    /// Figures are saved next to the report so that its relative image links
    /// resolve.
    pub fn write_outputs(&self, report_path: &Path, wide_path: &Path) -> Result<(), OutputError> {
        let report_dir = parent_dir(report_path);
        create_dir(report_dir)?;
        create_dir(parent_dir(wide_path))?;

        if self.config.render_figures {
            let value_label = format!("{} (mg/L)", self.table.value_column().to_uppercase());
            let input = PlotInput {
                value_label: &value_label,
                trajectories: &self.trajectories,
                group_day: &self.results.group_day,
                comparisons: &self.results.day_comparisons,
            };
            plot::draw_all(report_dir, &input).map_err(OutputError::Plot)?;
        } else {
            tracing::info!("figure rendering disabled");
        }

        self.write_report(report_path)
            .map_err(|source| OutputError::WriteReport {
                path: report_path.to_owned(),
                source,
            })?;
        tracing::info!(path = %report_path.display(), "report saved");

        WideTable::from_long(&self.table)
            .write_path(wide_path)
            .map_err(|source| OutputError::WriteWide {
                path: wide_path.to_owned(),
                source,
            })?;
        tracing::info!(path = %wide_path.display(), "wide table saved");
        Ok(())
    }

    fn write_report(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "{}", self.report())?;
        writer.flush()
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn create_dir(path: &Path) -> Result<(), OutputError> {
    fs::create_dir_all(path).map_err(|source| OutputError::CreateDir {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use crptrial_data::record::{PatientId, Record};
    use crptrial_generator::{config::GeneratorConfig, generate::generate};

    use super::*;
    use crate::plot::Figure;

    fn generated() -> LongTable {
        let config = GeneratorConfig {
            seed: Some(42),
            ..GeneratorConfig::default()
        };
        generate(&config).unwrap()
    }

    fn no_figures() -> AnalysisConfig {
        AnalysisConfig {
            render_figures: false,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_run_on_generated_table() {
        let analysis = Analysis::run(generated(), &no_figures()).unwrap();
        let results = analysis.results();
        assert_eq!(results.overview.rows, 320);
        assert_eq!(results.overview.patients, 40);
        assert_eq!(results.overview.patients_per_group[&Group::Treated], 20);
        assert_eq!(results.overview.days, (0..=7).collect::<Vec<_>>());
        assert_eq!(results.group_day.len(), 16);
        assert!(results.missing.is_complete());
        assert!(results.model.fit().is_some());
        assert_eq!(results.day_comparisons.len(), 8);
        assert!(results.max_value_test.is_defined());
        assert_eq!(analysis.trajectories().len(), 40);
    }

    #[test]
    fn test_invalid_inputs() {
        let config = AnalysisConfig {
            threshold: f64::NAN,
            ..no_figures()
        };
        assert!(matches!(
            Analysis::run(generated(), &config),
            Err(AnalysisError::InvalidThreshold { .. })
        ));

        let mut table = LongTable::new("crp");
        table.push(Record {
            patient_id: Some(PatientId(1)),
            group: Some(Group::Control),
            day: Some(0),
            value: None,
        });
        assert!(matches!(
            Analysis::run(table, &no_figures()),
            Err(AnalysisError::NoObservations)
        ));
    }

    #[test]
    fn test_write_outputs_without_events() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("results").join("report.md");
        let wide_path = dir.path().join("wide.csv");
        let config = AnalysisConfig {
            threshold: 10_000.0,
            ..no_figures()
        };

        let analysis = Analysis::run(generated(), &config).unwrap();
        assert!(analysis.results().normalization.test.p_value.is_nan());
        analysis.write_outputs(&report_path, &wide_path).unwrap();

        let report = fs::read_to_string(&report_path).unwrap();
        assert!(report.contains("## Conclusion"));
        assert!(report.contains("T-statistic: NaN, p-value: NaN"));
        for figure in Figure::ALL {
            assert!(report.contains(figure.file_name()));
            assert!(!report_path.with_file_name(figure.file_name()).exists());
        }

        let wide = fs::read_to_string(&wide_path).unwrap();
        assert_eq!(wide.lines().count(), 41);
        assert!(wide.starts_with("patient_id,group,day_0,"));
    }

    #[test]
    fn test_write_outputs_with_figures() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("report.md");
        let wide_path = dir.path().join("wide.csv");
        let config = GeneratorConfig {
            patients_per_group: 10,
            seed: Some(7),
            ..GeneratorConfig::default()
        };

        let table = generate(&config).unwrap();
        let analysis = Analysis::run(table, &AnalysisConfig::default()).unwrap();
        analysis.write_outputs(&report_path, &wide_path).unwrap();

        for figure in Figure::ALL {
            let path = dir.path().join(figure.file_name());
            let len = fs::metadata(&path)
                .unwrap_or_else(|err| panic!("{}: {err}", path.display()))
                .len();
            assert!(len > 0, "{} is empty", path.display());
        }
        assert!(report_path.exists());
        assert!(wide_path.exists());
    }

    #[test]
    fn test_results_serialize() {
        let analysis = Analysis::run(generated(), &no_figures()).unwrap();
        let json = serde_json::to_value(analysis.results()).unwrap();
        assert_eq!(json["overview"]["rows"], 320);
        assert_eq!(json["model"]["status"], "fitted");
        assert!(json["day_comparisons"].is_array());
    }
}
