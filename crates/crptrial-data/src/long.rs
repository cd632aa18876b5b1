//! Long-format table: one row per `(patient, day)` observation.
//!
//! This is the contract between the generator and the analyzer. On disk it
//! is a CSV file with the header `patient_id,group,day,<value column>`;
//! header names are matched case-insensitively and extra columns are
//! ignored. Empty cells (and the usual `NA`/`NaN` spellings) are read as
//! missing.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fs::File,
    io::{self, BufWriter},
    path::Path,
};

use crate::{
    missing::MissingValues,
    record::{Group, Observation, PatientId, Record},
};

pub const PATIENT_ID_COLUMN: &str = "patient_id";
pub const GROUP_COLUMN: &str = "group";
pub const DAY_COLUMN: &str = "day";
pub const DEFAULT_VALUE_COLUMN: &str = "crp";

const MISSING_MARKERS: [&str; 6] = ["", "na", "n/a", "nan", "null", "none"];

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ReadTableError {
    #[display("failed to read CSV: {source}")]
    Csv { source: csv::Error },
    #[display("missing required column {column:?}")]
    MissingColumn { column: String },
    #[display("row {line}: invalid value {value:?} in column {column:?} (expected {expected})")]
    InvalidCell {
        line: u64,
        column: String,
        value: String,
        expected: &'static str,
    },
    #[display("row {line}: patient {patient_id} has more than one row for day {day}")]
    DuplicateObservation {
        line: u64,
        patient_id: PatientId,
        day: u32,
    },
    #[display("row {line}: patient {patient_id} is listed in both groups")]
    InconsistentGroup { line: u64, patient_id: PatientId },
}

impl From<csv::Error> for ReadTableError {
    fn from(source: csv::Error) -> Self {
        Self::Csv { source }
    }
}

/// Long-format table of observations.
#[derive(Debug, Clone, PartialEq)]
pub struct LongTable {
    value_column: String,
    records: Vec<Record>,
}

impl LongTable {
    pub fn new<S>(value_column: S) -> Self
    where
        S: Into<String>,
    {
        Self::with_records(value_column, vec![])
    }

    pub fn with_records<S>(value_column: S, records: Vec<Record>) -> Self
    where
        S: Into<String>,
    {
        Self {
            value_column: value_column.into(),
            records,
        }
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    #[must_use]
    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows without any missing cell.
    pub fn observations(&self) -> impl Iterator<Item = Observation> + '_ {
        self.records.iter().filter_map(Record::observation)
    }

    /// Group assignment of every patient with a known group.
    #[must_use]
    pub fn patients(&self) -> BTreeMap<PatientId, Group> {
        self.records
            .iter()
            .filter_map(|r| Some((r.patient_id?, r.group?)))
            .collect()
    }

    /// Distinct days present in the table.
    #[must_use]
    pub fn days(&self) -> BTreeSet<u32> {
        self.records.iter().filter_map(|r| r.day).collect()
    }

    /// Distinct groups present in the table.
    #[must_use]
    pub fn groups(&self) -> BTreeSet<Group> {
        self.records.iter().filter_map(|r| r.group).collect()
    }

    #[must_use]
    pub fn missing_values(&self) -> MissingValues {
        let count = |f: fn(&Record) -> bool| self.records.iter().filter(|r| f(r)).count();
        MissingValues::new([
            (PATIENT_ID_COLUMN.to_owned(), count(|r| r.patient_id.is_none())),
            (GROUP_COLUMN.to_owned(), count(|r| r.group.is_none())),
            (DAY_COLUMN.to_owned(), count(|r| r.day.is_none())),
            (self.value_column.clone(), count(|r| r.value.is_none())),
        ])
    }

    /// Reads a table from CSV.
    ///
    /// `value_column` is matched case-insensitively and stored lowercased.
    pub fn from_reader<R>(reader: R, value_column: &str) -> Result<Self, ReadTableError>
    where
        R: io::Read,
    {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader
            .headers()?
            .iter()
            .map(str::to_lowercase)
            .collect::<Vec<_>>();
        let value_column = value_column.to_lowercase();
        let column_index = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| ReadTableError::MissingColumn {
                    column: name.to_owned(),
                })
        };
        let id_index = column_index(PATIENT_ID_COLUMN)?;
        let group_index = column_index(GROUP_COLUMN)?;
        let day_index = column_index(DAY_COLUMN)?;
        let value_index = column_index(&value_column)?;

        let mut table = Self::new(value_column.clone());
        let mut assigned = HashMap::<PatientId, Group>::new();
        let mut seen = HashSet::<(PatientId, u32)>::new();

        for row in reader.records() {
            let row = row?;
            let line = row.position().map_or(0, csv::Position::line);
            let cell = |index: usize| row.get(index).unwrap_or_default();

            let record = Record {
                patient_id: parse_cell(
                    cell(id_index),
                    line,
                    PATIENT_ID_COLUMN,
                    "a non-negative integer",
                    parse_integer,
                )?
                .map(PatientId),
                group: parse_cell(
                    cell(group_index),
                    line,
                    GROUP_COLUMN,
                    "\"control\" or \"treated\"",
                    |s| s.parse().ok(),
                )?,
                day: parse_cell(
                    cell(day_index),
                    line,
                    DAY_COLUMN,
                    "a non-negative integer",
                    |s| parse_integer(s).and_then(|v| u32::try_from(v).ok()),
                )?,
                value: parse_cell(
                    cell(value_index),
                    line,
                    &value_column,
                    "a non-negative number",
                    |s| s.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0),
                )?,
            };

            if let (Some(patient_id), Some(group)) = (record.patient_id, record.group)
                && *assigned.entry(patient_id).or_insert(group) != group
            {
                return Err(ReadTableError::InconsistentGroup { line, patient_id });
            }
            if let (Some(patient_id), Some(day)) = (record.patient_id, record.day)
                && !seen.insert((patient_id, day))
            {
                return Err(ReadTableError::DuplicateObservation {
                    line,
                    patient_id,
                    day,
                });
            }
            table.push(record);
        }

        Ok(table)
    }

    pub fn from_path<P>(path: P, value_column: &str) -> Result<Self, ReadTableError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path).map_err(csv::Error::from)?;
        Self::from_reader(file, value_column)
    }

    /// Writes the table as CSV. Missing cells are written empty.
    pub fn write_csv<W>(&self, writer: W) -> Result<(), csv::Error>
    where
        W: io::Write,
    {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record([
            PATIENT_ID_COLUMN,
            GROUP_COLUMN,
            DAY_COLUMN,
            &self.value_column,
        ])?;
        for record in &self.records {
            writer.write_record([
                format_cell(record.patient_id),
                format_cell(record.group),
                format_cell(record.day),
                format_cell(record.value),
            ])?;
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

pub(crate) fn format_cell<T>(value: Option<T>) -> String
where
    T: ToString,
{
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_cell<T, F>(
    cell: &str,
    line: u64,
    column: &str,
    expected: &'static str,
    parse: F,
) -> Result<Option<T>, ReadTableError>
where
    F: FnOnce(&str) -> Option<T>,
{
    let cell = cell.trim();
    if MISSING_MARKERS
        .iter()
        .any(|marker| cell.eq_ignore_ascii_case(marker))
    {
        return Ok(None);
    }
    parse(cell)
        .map(Some)
        .ok_or_else(|| ReadTableError::InvalidCell {
            line,
            column: column.to_owned(),
            value: cell.to_owned(),
            expected,
        })
}

/// Parses an integer, also accepting integral floats such as `3.0`.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_integer(cell: &str) -> Option<u64> {
    cell.parse::<u64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|v| v.fract() == 0.0 && (0.0..1e15).contains(v))
            .map(|v| v as u64)
    })
}
