//! Statistical routines for analyzing clinical trial measurements.
//!
//! - [`descriptive`]: count, mean, sample standard deviation and quartiles
//! - [`percentiles`]: linearly interpolated percentiles
//! - [`hypothesis`]: two-sample Student's t-test
//! - [`mixed`]: random-intercept linear mixed model fitted by REML
//! - [`survival`]: Kaplan-Meier estimator for time-to-event data
//!
//! Distribution functions and dense matrices come from [`u_numflow`].
//!
//! # Examples
//!
//! ```
//! use crptrial_stats::{descriptive::DescriptiveStats, hypothesis::students_t_test};
//!
//! let control = [180.0, 150.0, 210.0, 175.0];
//! let treated = [60.0, 75.0, 40.0, 55.0];
//! assert_eq!(DescriptiveStats::new(control).mean, 178.75);
//! assert!(students_t_test(&control, &treated).unwrap().p_value < 0.001);
//! ```

pub mod descriptive;
pub mod hypothesis;
pub mod mixed;
pub mod percentiles;
pub mod survival;
