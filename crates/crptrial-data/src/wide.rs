//! Wide-format export: one row per patient, one `day_<n>` column per day.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    long::{GROUP_COLUMN, LongTable, PATIENT_ID_COLUMN, format_cell},
    record::{Group, PatientId, Record},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideRow {
    pub patient_id: PatientId,
    pub group: Group,
    /// One entry per day of [`WideTable::days`].
    pub values: Vec<Option<f64>>,
}

/// Pivoted table, rows sorted by group then patient id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WideTable {
    pub days: Vec<u32>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    /// Pivots a long table.
    ///
    /// Patients without a known group are left out, as are rows missing the
    /// patient id or the day. A missing value leaves its cell empty.
    #[must_use]
    pub fn from_long(table: &LongTable) -> Self {
        let days = table.days().into_iter().collect::<Vec<_>>();
        let mut rows = table
            .patients()
            .into_iter()
            .map(|(patient_id, group)| WideRow {
                patient_id,
                group,
                values: vec![None; days.len()],
            })
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| (row.group, row.patient_id));

        let row_index = rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.patient_id, i))
            .collect::<HashMap<_, _>>();
        for record in table.records() {
            let (Some(patient_id), Some(day), Some(value)) =
                (record.patient_id, record.day, record.value)
            else {
                continue;
            };
            let (Some(&row), Ok(col)) = (row_index.get(&patient_id), days.binary_search(&day))
            else {
                continue;
            };
            rows[row].values[col] = Some(value);
        }

        Self { days, rows }
    }

    /// Melts the table back into long format, one record per patient and day.
    #[must_use]
    pub fn to_long(&self, value_column: &str) -> LongTable {
        let records = self
            .rows
            .iter()
            .flat_map(|row| {
                self.days.iter().zip(&row.values).map(|(&day, &value)| Record {
                    patient_id: Some(row.patient_id),
                    group: Some(row.group),
                    day: Some(day),
                    value,
                })
            })
            .collect();
        LongTable::with_records(value_column, records)
    }

    #[cfg(test)]
    fn get(&self, patient_id: PatientId, day: u32) -> Option<f64> {
        let col = self.days.binary_search(&day).ok()?;
        self.rows
            .iter()
            .find(|row| row.patient_id == patient_id)
            .and_then(|row| row.values[col])
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        [PATIENT_ID_COLUMN.to_owned(), GROUP_COLUMN.to_owned()]
            .into_iter()
            .chain(self.days.iter().map(|day| format!("day_{day}")))
            .collect()
    }

    pub fn write_csv<W>(&self, writer: W) -> Result<(), csv::Error>
    where
        W: io::Write,
    {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.column_names())?;
        for row in &self.rows {
            let cells = [row.patient_id.to_string(), row.group.to_string()]
                .into_iter()
                .chain(row.values.iter().map(|v| format_cell(*v)));
            writer.write_record(cells)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_path<P>(&self, path: P) -> Result<(), csv::Error>
    where
        P: AsRef<Path>,
    {
        let file = File::create(path)?;
        self.write_csv(BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn triples(table: &LongTable) -> Vec<(PatientId, u32, u64)> {
        let mut triples = table
            .observations()
            .map(|o| (o.patient_id, o.day, o.value.to_bits()))
            .collect::<Vec<_>>();
        triples.sort_unstable();
        triples
    }

    #[test]
    fn test_rows_sorted_by_group_then_patient() {
        let table = LongTable::with_records(
            "crp",
            vec![
                Record::complete(PatientId(64_000_009), Group::Treated, 0, 1.0),
                Record::complete(PatientId(64_000_005), Group::Control, 1, 2.0),
                Record::complete(PatientId(64_000_001), Group::Treated, 1, 3.0),
                Record::complete(PatientId(64_000_005), Group::Control, 0, 4.0),
            ],
        );
        let wide = WideTable::from_long(&table);
        let order = wide.rows.iter().map(|r| r.patient_id.get()).collect::<Vec<_>>();
        assert_eq!(order, vec![64_000_005, 64_000_001, 64_000_009]);
        assert_eq!(wide.get(PatientId(64_000_005), 0), Some(4.0));
        assert_eq!(wide.get(PatientId(64_000_009), 1), None);
        assert_eq!(wide.column_names(), vec!["patient_id", "group", "day_0", "day_1"]);
    }

    #[test]
    fn test_csv_leaves_missing_cells_empty() {
        let table = LongTable::with_records(
            "crp",
            vec![
                Record::complete(PatientId(1), Group::Control, 0, 5.5),
                Record::complete(PatientId(2), Group::Treated, 1, 7.25),
            ],
        );
        let mut buf = vec![];
        WideTable::from_long(&table).write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "patient_id,group,day_0,day_1\n1,control,5.5,\n2,treated,,7.25\n"
        );
    }

    proptest! {
        #[test]
        fn long_wide_long_keeps_observations(
            patients in 1_usize..8,
            days in 1_u32..9,
            values in prop::collection::vec(0.01_f64..400.0, 8 * 9),
        ) {
            let mut table = LongTable::new("crp");
            for p in 0..patients {
                let group = if p % 2 == 0 { Group::Treated } else { Group::Control };
                for day in 0..days {
                    let value = values[p * 9 + day as usize];
                    table.push(Record::complete(PatientId(64_000_000 + p as u64), group, day, value));
                }
            }
            let round_trip = WideTable::from_long(&table).to_long("crp");
            prop_assert_eq!(round_trip.len(), table.len());
            prop_assert_eq!(triples(&round_trip), triples(&table));
        }
    }
}
