//! Statistical analysis of a treated-vs-control trial measured over days.
//!
//! [`analysis::Analysis::run`] computes every result from a
//! [`LongTable`](crptrial_data::long::LongTable):
//!
//! - descriptive tables ([`describe`])
//! - a random-intercept mixed model of the value over time ([`model`])
//! - secondary t-tests and time to normalization ([`secondary`])
//!
//! and writes the Markdown report ([`report`]), the figures ([`plot`]) and
//! the wide-format table.

pub mod analysis;
pub mod describe;
pub mod model;
pub mod patient;
pub mod plot;
pub mod report;
pub mod secondary;
