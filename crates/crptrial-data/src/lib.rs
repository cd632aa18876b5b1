//! Tabular data model shared by the generator and the analyzer.
//!
//! - [`record`]: [`Group`](record::Group), [`PatientId`](record::PatientId)
//!   and the row types
//! - [`long`]: the long-format [`LongTable`](long::LongTable) with CSV I/O
//! - [`wide`]: the per-patient [`WideTable`](wide::WideTable) export
//! - [`missing`]: per-column missing cell counts
//!
//! # Examples
//!
//! ```
//! use crptrial_data::{long::LongTable, wide::WideTable};
//!
//! let csv = "patient_id,group,day,crp\n64000001,treated,0,4.2\n64000001,treated,1,130\n";
//! let table = LongTable::from_reader(csv.as_bytes(), "crp").unwrap();
//! assert!(table.missing_values().is_complete());
//!
//! let wide = WideTable::from_long(&table);
//! assert_eq!(wide.rows.len(), 1);
//! assert_eq!(wide.rows[0].values, vec![Some(4.2), Some(130.0)]);
//! ```

pub mod long;
pub mod missing;
pub mod record;
pub mod wide;
