use serde::{Deserialize, Serialize};

/// Missing cell counts per column, in table column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingValues {
    pub columns: Vec<(String, usize)>,
}

impl MissingValues {
    pub fn new<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (String, usize)>,
    {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, count)| *count)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.columns.iter().map(|(_, count)| count).sum()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        long::LongTable,
        record::{Group, PatientId, Record},
    };

    fn complete_table() -> LongTable {
        let records = (0..3)
            .flat_map(|p| {
                (0..4).map(move |day| {
                    Record::complete(PatientId(64_000_000 + p), Group::Control, day, 10.0)
                })
            })
            .collect();
        LongTable::with_records("crp", records)
    }

    #[test]
    fn test_complete_table_has_no_missing_values() {
        let missing = complete_table().missing_values();
        assert!(missing.is_complete());
        assert_eq!(missing.columns.len(), 4);
        assert!(missing.columns.iter().all(|(_, count)| *count == 0));
    }

    #[test]
    fn test_single_missing_cell() {
        let mut table = complete_table();
        table.records_mut()[5].day = None;
        let missing = table.missing_values();
        assert_eq!(missing.get("day"), Some(1));
        assert_eq!(missing.get("patient_id"), Some(0));
        assert_eq!(missing.get("group"), Some(0));
        assert_eq!(missing.get("crp"), Some(0));
        assert_eq!(missing.total(), 1);
        assert_eq!(missing.get("age"), None);
    }
}
