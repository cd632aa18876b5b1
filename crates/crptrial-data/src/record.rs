use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Trial arm a patient is assigned to.
///
/// Ordering follows the label ordering (`control` before `treated`), which
/// is also the row order of grouped tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Control,
    Treated,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::Control, Group::Treated];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Group::Control => "control",
            Group::Treated => "treated",
        }
    }

    /// Human-readable label used in plots and reports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Group::Control => "Control",
            Group::Treated => "Treated",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unknown group label {label:?} (expected \"control\" or \"treated\")")]
pub struct ParseGroupError {
    pub label: String,
}

impl FromStr for Group {
    type Err = ParseGroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        if label.eq_ignore_ascii_case("control") {
            Ok(Group::Control)
        } else if label.eq_ignore_ascii_case("treated") {
            Ok(Group::Treated)
        } else {
            Err(ParseGroupError {
                label: s.to_owned(),
            })
        }
    }
}

/// Patient identifier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct PatientId(pub u64);

impl PatientId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// One row of the long-format table.
///
/// Every cell may be missing; a missing cell is kept so that it can be
/// reported, and skipped by computations that need it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub patient_id: Option<PatientId>,
    pub group: Option<Group>,
    pub day: Option<u32>,
    pub value: Option<f64>,
}

impl Record {
    #[must_use]
    pub fn complete(patient_id: PatientId, group: Group, day: u32, value: f64) -> Self {
        Self {
            patient_id: Some(patient_id),
            group: Some(group),
            day: Some(day),
            value: Some(value),
        }
    }

    /// Returns the observation if no cell is missing.
    #[must_use]
    pub fn observation(&self) -> Option<Observation> {
        Some(Observation {
            patient_id: self.patient_id?,
            group: self.group?,
            day: self.day?,
            value: self.value?,
        })
    }
}

/// A fully populated row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub patient_id: PatientId,
    pub group: Group,
    pub day: u32,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_parse() {
        assert_eq!("treated".parse::<Group>().unwrap(), Group::Treated);
        assert_eq!(" Control ".parse::<Group>().unwrap(), Group::Control);
        let err = "placebo".parse::<Group>().unwrap_err();
        assert_eq!(err.label, "placebo");
        assert!(err.to_string().contains("placebo"));
    }

    #[test]
    fn test_group_order() {
        assert!(Group::Control < Group::Treated);
        assert_eq!(Group::Treated.to_string(), "treated");
    }

    #[test]
    fn test_observation_requires_every_cell() {
        let mut record = Record::complete(PatientId(64_000_001), Group::Control, 3, 42.0);
        assert!(record.observation().is_some());
        record.value = None;
        assert!(record.observation().is_none());
    }
}
