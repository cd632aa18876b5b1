//! Descriptive tables: the overall column summary and the group x day
//! breakdown of the measured value.

use std::collections::BTreeMap;

use crptrial_data::{
    long::{DAY_COLUMN, LongTable, PATIENT_ID_COLUMN},
    record::Group,
};
use crptrial_stats::descriptive::DescriptiveStats;
use serde::{Deserialize, Serialize};

/// Summary of each numeric column, computed over the non-missing cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryTable {
    pub columns: Vec<(String, DescriptiveStats)>,
}

impl SummaryTable {
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_table(table: &LongTable) -> Self {
        let records = table.records();
        let patient_ids = records
            .iter()
            .filter_map(|r| r.patient_id)
            .map(|id| id.get() as f64);
        let days = records.iter().filter_map(|r| r.day).map(f64::from);
        let values = records.iter().filter_map(|r| r.value);
        Self {
            columns: vec![
                (
                    PATIENT_ID_COLUMN.to_owned(),
                    DescriptiveStats::new(patient_ids),
                ),
                (DAY_COLUMN.to_owned(), DescriptiveStats::new(days)),
                (
                    table.value_column().to_owned(),
                    DescriptiveStats::new(values),
                ),
            ],
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&DescriptiveStats> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, stats)| stats)
    }
}

/// Statistics of the value for one `(group, day)` cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupDayStats {
    pub group: Group,
    pub day: u32,
    pub stats: DescriptiveStats,
}

/// One row per `(group, day)` pair present in the table, sorted by group
/// then day. Pairs whose values are all missing have a count of zero.
#[must_use]
pub fn group_day_stats(table: &LongTable) -> Vec<GroupDayStats> {
    let mut cells = BTreeMap::<(Group, u32), Vec<f64>>::new();
    for record in table.records() {
        if let (Some(group), Some(day)) = (record.group, record.day) {
            let values = cells.entry((group, day)).or_default();
            values.extend(record.value);
        }
    }
    cells
        .into_iter()
        .map(|((group, day), values)| GroupDayStats {
            group,
            day,
            stats: DescriptiveStats::new(values),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crptrial_data::record::{PatientId, Record};

    use super::*;

    fn table() -> LongTable {
        let mut table = LongTable::new("crp");
        for (id, group, values) in [
            (1, Group::Treated, [10.0, 20.0]),
            (2, Group::Treated, [30.0, 40.0]),
            (3, Group::Control, [50.0, 60.0]),
        ] {
            for (day, value) in (0..).zip(values) {
                table.push(Record::complete(PatientId(id), group, day, value));
            }
        }
        table
    }

    #[test]
    fn test_summary_columns() {
        let summary = SummaryTable::from_table(&table());
        let names = summary
            .columns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["patient_id", "day", "crp"]);

        let crp = summary.get("crp").unwrap();
        assert_eq!(crp.count, 6);
        assert_eq!(crp.mean, 35.0);
        assert_eq!(crp.min, 10.0);
        assert_eq!(crp.max, 60.0);
        assert_eq!(summary.get("day").unwrap().mean, 0.5);
    }

    #[test]
    fn test_group_day_rows() {
        let rows = group_day_stats(&table());
        let keys = rows.iter().map(|r| (r.group, r.day)).collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                (Group::Control, 0),
                (Group::Control, 1),
                (Group::Treated, 0),
                (Group::Treated, 1),
            ]
        );
        assert_eq!(rows.iter().map(|r| r.stats.count).sum::<usize>(), 6);

        // a single control patient leaves the spread undefined
        assert!(rows[0].stats.std_dev.is_nan());
        assert_eq!(rows[2].stats.mean, 20.0);
        assert_eq!(rows[2].stats.median, 20.0);
    }

    #[test]
    fn test_all_missing_cell_counts_zero() {
        let mut table = table();
        for record in table.records_mut() {
            if record.group == Some(Group::Control) && record.day == Some(1) {
                record.value = None;
            }
        }
        let rows = group_day_stats(&table);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1].stats.count, 0);
        assert!(rows[1].stats.mean.is_nan());
    }
}
