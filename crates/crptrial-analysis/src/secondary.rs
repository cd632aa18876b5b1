//! Secondary comparisons between the treated and control groups.
//!
//! - maximum value per patient (one value per patient)
//! - time to normalization: the first day the value drops below a threshold
//!   after having reached it. Patients who never cross are censored at their
//!   last observed day. The t-test only uses observed events; the
//!   Kaplan-Meier median accounts for the censored patients.
//! - a t-test on every day of the schedule

use std::collections::BTreeMap;

use crptrial_data::{long::LongTable, record::Group};
use crptrial_stats::{
    descriptive::DescriptiveStats,
    hypothesis::{TestResult, students_t_test},
    survival::{KaplanMeierCurve, SurvivalObservation},
};
use serde::{Deserialize, Serialize};

use crate::patient::PatientTrajectory;

/// Default normalization threshold (mg/L).
pub const DEFAULT_THRESHOLD: f64 = 100.0;

/// Minimum number of events per group for the time-to-normalization test.
const MIN_EVENTS: usize = 2;

/// Treated-vs-control t-test, or [`TestResult::UNDEFINED`] when either
/// sample is degenerate.
fn compare(name: &str, treated: &[f64], control: &[f64]) -> TestResult {
    students_t_test(treated, control).unwrap_or_else(|| {
        tracing::warn!(
            test = name,
            treated = treated.len(),
            control = control.len(),
            "t-test is undefined, reporting NaN"
        );
        TestResult::UNDEFINED
    })
}

/// Per-group samples of one value per patient.
fn split_by_group<I>(values: I) -> (Vec<f64>, Vec<f64>)
where
    I: IntoIterator<Item = (Group, f64)>,
{
    let mut treated = vec![];
    let mut control = vec![];
    for (group, value) in values {
        match group {
            Group::Treated => treated.push(value),
            Group::Control => control.push(value),
        }
    }
    (treated, control)
}

/// Compares the per-patient maximum values.
#[must_use]
pub fn max_value_test(trajectories: &[PatientTrajectory]) -> TestResult {
    let (treated, control) =
        split_by_group(trajectories.iter().filter_map(|t| Some((t.group, t.max_value()?))));
    compare("maximum value", &treated, &control)
}

/// Time-to-normalization summary of one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationStats {
    pub patients: usize,
    pub events: usize,
    pub censored: usize,
    /// Mean day of normalization over patients with an event.
    pub mean_event_day: f64,
    /// Kaplan-Meier median day of normalization.
    pub median_km: Option<u32>,
    pub km_curve: KaplanMeierCurve,
}

impl NormalizationStats {
    fn from_observations(data: &[SurvivalObservation]) -> Self {
        let km_curve = KaplanMeierCurve::from_observations(data.iter().copied());
        let events = km_curve.total_events();
        let event_days = data.iter().filter(|o| o.event).map(|o| f64::from(o.time));
        Self {
            patients: km_curve.subjects,
            events,
            censored: km_curve.subjects - events,
            mean_event_day: DescriptiveStats::new(event_days).mean,
            median_km: km_curve.median(),
            km_curve,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationAnalysis {
    pub threshold: f64,
    pub by_group: BTreeMap<Group, NormalizationStats>,
    /// t-test on the event days, treated vs control.
    pub test: TestResult,
}

impl NormalizationAnalysis {
    #[must_use]
    pub fn from_trajectories(trajectories: &[PatientTrajectory], threshold: f64) -> Self {
        let mut data = BTreeMap::<Group, Vec<SurvivalObservation>>::new();
        for trajectory in trajectories {
            let observation = match trajectory.first_crossing_below(threshold) {
                Some(day) => SurvivalObservation::event(day),
                None => {
                    let Some(last) = trajectory.last_day() else {
                        continue;
                    };
                    SurvivalObservation::censored(last)
                }
            };
            data.entry(trajectory.group)
                .or_default()
                .push(observation);
        }

        let (treated, control) = split_by_group(data.iter().flat_map(|(&group, obs)| {
            obs.iter()
                .filter(|o| o.event)
                .map(move |o| (group, f64::from(o.time)))
        }));
        let test = if treated.len() < MIN_EVENTS || control.len() < MIN_EVENTS {
            tracing::warn!(
                threshold,
                treated_events = treated.len(),
                control_events = control.len(),
                "too few normalization events, reporting NaN"
            );
            TestResult::UNDEFINED
        } else {
            compare("time to normalization", &treated, &control)
        };

        Self {
            threshold,
            by_group: data
                .into_iter()
                .map(|(group, obs)| (group, NormalizationStats::from_observations(&obs)))
                .collect(),
            test,
        }
    }
}

/// Treated-vs-control comparison on one day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DayComparison {
    pub day: u32,
    pub treated: DescriptiveStats,
    pub control: DescriptiveStats,
    pub test: TestResult,
}

/// Runs a t-test on every day present in the table.
#[must_use]
pub fn day_comparisons(table: &LongTable) -> Vec<DayComparison> {
    let mut by_day = BTreeMap::<u32, Vec<(Group, f64)>>::new();
    for o in table.observations() {
        by_day.entry(o.day).or_default().push((o.group, o.value));
    }
    by_day
        .into_iter()
        .map(|(day, values)| {
            let (treated, control) = split_by_group(values);
            DayComparison {
                day,
                test: compare(&format!("day {day}"), &treated, &control),
                treated: DescriptiveStats::new(treated),
                control: DescriptiveStats::new(control),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crptrial_data::record::{PatientId, Record};

    use super::*;

    fn trajectory(id: u64, group: Group, values: &[f64]) -> PatientTrajectory {
        PatientTrajectory {
            patient_id: PatientId(id),
            group,
            points: (0..).zip(values.iter().copied()).collect(),
        }
    }

    fn cohort() -> Vec<PatientTrajectory> {
        vec![
            trajectory(1, Group::Treated, &[5.0, 120.0, 90.0, 40.0]),
            trajectory(2, Group::Treated, &[4.0, 140.0, 110.0, 60.0]),
            trajectory(3, Group::Treated, &[6.0, 130.0, 95.0, 30.0]),
            trajectory(4, Group::Control, &[5.0, 180.0, 160.0, 90.0]),
            trajectory(5, Group::Control, &[3.0, 170.0, 150.0, 120.0]),
            trajectory(6, Group::Control, &[7.0, 190.0, 130.0, 80.0]),
            trajectory(7, Group::Control, &[4.0, 200.0, 140.0, 95.0]),
        ]
    }

    #[test]
    fn test_max_value_test() {
        let result = max_value_test(&cohort());
        assert!(result.is_defined());
        assert!(result.statistic < 0.0);
        assert_eq!(result.df, 5.0);
        assert!(result.p_value < 0.01);
    }

    #[test]
    fn test_normalization_with_censoring() {
        let analysis = NormalizationAnalysis::from_trajectories(&cohort(), 100.0);
        let treated = &analysis.by_group[&Group::Treated];
        assert_eq!(treated.patients, 3);
        assert_eq!(treated.events, 3);
        assert!((treated.mean_event_day - 7.0 / 3.0).abs() < 1e-12);
        assert_eq!(treated.median_km, Some(2));

        let control = &analysis.by_group[&Group::Control];
        assert_eq!(control.events, 3);
        assert_eq!(control.censored, 1);
        assert_eq!(control.median_km, Some(3));

        // treated normalize on days 2, 3, 2; controls on 3, 3, 3
        assert!(analysis.test.is_defined());
        assert!(analysis.test.statistic < 0.0);
    }

    #[test]
    fn test_normalization_without_events_is_nan() {
        // nobody ever reaches the threshold
        let analysis = NormalizationAnalysis::from_trajectories(&cohort(), 1_000.0);
        assert!(analysis.test.statistic.is_nan());
        assert!(analysis.test.p_value.is_nan());
        assert_eq!(analysis.by_group[&Group::Treated].events, 0);
        assert_eq!(analysis.by_group[&Group::Control].median_km, None);
        assert!(analysis.by_group[&Group::Treated].mean_event_day.is_nan());
    }

    #[test]
    fn test_day_comparisons() {
        let mut table = LongTable::new("crp");
        for t in cohort() {
            for (day, value) in t.points {
                table.push(Record::complete(t.patient_id, t.group, day, value));
            }
        }
        let comparisons = day_comparisons(&table);
        assert_eq!(comparisons.len(), 4);
        assert_eq!(comparisons[1].day, 1);
        assert_eq!(comparisons[1].treated.count, 3);
        assert_eq!(comparisons[1].control.count, 4);
        assert_eq!(comparisons[1].treated.mean, 130.0);
        assert!(comparisons[1].test.p_value < 0.05);
    }

    #[test]
    fn test_day_with_single_group_is_undefined() {
        let mut table = LongTable::new("crp");
        table.push(Record::complete(PatientId(1), Group::Treated, 0, 1.0));
        table.push(Record::complete(PatientId(2), Group::Treated, 0, 2.0));
        let comparisons = day_comparisons(&table);
        assert!(!comparisons[0].test.is_defined());
        assert_eq!(comparisons[0].control.count, 0);
    }
}
