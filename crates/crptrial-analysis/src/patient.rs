use std::collections::BTreeMap;

use crptrial_data::{
    long::LongTable,
    record::{Group, PatientId},
};

/// Observed values of one patient, sorted by day.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientTrajectory {
    pub patient_id: PatientId,
    pub group: Group,
    pub points: Vec<(u32, f64)>,
}

impl PatientTrajectory {
    /// Collects every patient with at least one complete observation,
    /// ordered by group then patient id.
    #[must_use]
    pub fn collect(table: &LongTable) -> Vec<Self> {
        let mut by_patient = BTreeMap::<(Group, PatientId), Vec<(u32, f64)>>::new();
        for o in table.observations() {
            by_patient
                .entry((o.group, o.patient_id))
                .or_default()
                .push((o.day, o.value));
        }
        by_patient
            .into_iter()
            .map(|((group, patient_id), mut points)| {
                points.sort_by_key(|(day, _)| *day);
                Self {
                    patient_id,
                    group,
                    points,
                }
            })
            .collect()
    }

    #[must_use]
    pub fn max_value(&self) -> Option<f64> {
        self.points.iter().map(|(_, v)| *v).max_by(f64::total_cmp)
    }

    /// First day on which the value falls below `threshold` after having
    /// been at or above it.
    #[must_use]
    pub fn first_crossing_below(&self, threshold: f64) -> Option<u32> {
        let start = self.points.iter().position(|(_, v)| *v >= threshold)?;
        self.points[start..]
            .iter()
            .find(|(_, v)| *v < threshold)
            .map(|(day, _)| *day)
    }

    #[must_use]
    pub fn last_day(&self) -> Option<u32> {
        self.points.last().map(|(day, _)| *day)
    }
}

#[cfg(test)]
mod tests {
    use crptrial_data::record::Record;

    use super::*;

    #[test]
    fn test_collect_sorts_points_and_skips_missing() {
        let mut table = LongTable::new("crp");
        table.push(Record::complete(PatientId(2), Group::Treated, 1, 150.0));
        table.push(Record::complete(PatientId(2), Group::Treated, 0, 5.0));
        table.push(Record::complete(PatientId(2), Group::Treated, 2, 80.0));
        table.push(Record {
            value: None,
            ..Record::complete(PatientId(1), Group::Control, 0, 0.0)
        });
        table.push(Record::complete(PatientId(3), Group::Control, 0, 120.0));

        let trajectories = PatientTrajectory::collect(&table);
        assert_eq!(trajectories.len(), 2);
        assert_eq!(trajectories[0].patient_id, PatientId(3));

        let treated = &trajectories[1];
        assert_eq!(treated.points, vec![(0, 5.0), (1, 150.0), (2, 80.0)]);
        assert_eq!(treated.max_value(), Some(150.0));
        // day 0 is below the threshold but precedes the peak
        assert_eq!(treated.first_crossing_below(100.0), Some(2));
        assert_eq!(treated.first_crossing_below(1.0), None);
        assert_eq!(treated.first_crossing_below(500.0), None);
        assert_eq!(treated.last_day(), Some(2));
    }
}
