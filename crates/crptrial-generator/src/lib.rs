//! Synthetic postoperative CRP trajectories for a two-arm trial.
//!
//! [`generate::generate`] turns a [`config::GeneratorConfig`] into a
//! long-format [`LongTable`](crptrial_data::long::LongTable). The treatment
//! effect per day is described by [`effects::DayEffects`].

pub mod config;
pub mod effects;
pub mod generate;
