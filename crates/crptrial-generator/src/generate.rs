//! Synthetic trajectory generation.
//!
//! Every patient follows the same population curve: a linear rise from the
//! baseline to the peak on `peak_day`, then exponential decay. Around it each
//! patient gets a random baseline, a random intercept and per-day noise
//! proportional to the curve. On days with a treatment effect, treated
//! patients are shifted down by the effect (plus jitter) while controls only
//! receive the jitter.

use std::collections::HashSet;

use crptrial_data::{
    long::LongTable,
    record::{Group, PatientId, Record},
};
use rand::{Rng, SeedableRng as _};
use rand_distr::{Exp1, StandardNormal};
use rand_pcg::Pcg64;

use crate::{
    config::{ConfigError, GeneratorConfig, TrajectoryParams},
    effects::DayEffects,
};

/// Lowest value that can ever be produced.
pub const VALUE_FLOOR: f64 = 0.01;

const PATIENT_ID_PREFIX: u64 = 64_000_000;
const PATIENT_ID_RANGE: u64 = 1_000_000;

/// Generates a complete long-format table.
///
/// The first `patients_per_group` patients are treated, the next ones are
/// controls. With a fixed seed the output is identical across runs.
///
/// # Examples
///
/// ```
/// use crptrial_generator::{config::GeneratorConfig, generate::generate};
///
/// let config = GeneratorConfig {
///     patients_per_group: 3,
///     days: 4,
///     seed: Some(1),
///     day_effects: "{2: 30}".parse().unwrap(),
///     ..GeneratorConfig::default()
/// };
/// let table = generate(&config).unwrap();
/// assert_eq!(table.len(), 2 * 3 * 5);
/// assert!(table.observations().all(|o| o.value >= 0.01));
/// ```
pub fn generate(config: &GeneratorConfig) -> Result<LongTable, ConfigError> {
    config.validate()?;

    let mut rng = match config.seed {
        Some(seed) => Pcg64::seed_from_u64(seed),
        None => Pcg64::from_rng(&mut rand::rng()),
    };
    tracing::info!(
        patients_per_group = config.patients_per_group,
        days = config.days,
        day_effects = %config.day_effects,
        seed = ?config.seed,
        "generating synthetic data"
    );

    let ids = draw_patient_ids(&mut rng, config.patients_per_group * 2);
    let mut table = LongTable::new(config.value_column.clone());
    for (index, patient_id) in ids.into_iter().enumerate() {
        let group = if index < config.patients_per_group {
            Group::Treated
        } else {
            Group::Control
        };
        let values = sample_patient(
            &mut rng,
            &config.trajectory,
            &config.day_effects,
            config.days,
            group,
        );
        tracing::debug!(%patient_id, %group, ?values, "sampled patient");
        for (day, value) in (0..=config.days).zip(values) {
            table.push(Record::complete(patient_id, group, day, value));
        }
    }

    tracing::info!(rows = table.len(), "generated synthetic data");
    Ok(table)
}

/// Draws distinct 8-digit ids starting with `64`.
fn draw_patient_ids<R>(rng: &mut R, count: usize) -> Vec<PatientId>
where
    R: Rng,
{
    let mut seen = HashSet::with_capacity(count);
    let mut ids = Vec::with_capacity(count);
    while ids.len() < count {
        let id = PATIENT_ID_PREFIX + rng.random_range(0..PATIENT_ID_RANGE);
        if seen.insert(id) {
            ids.push(PatientId(id));
        }
    }
    ids
}

/// Population curve value on `day`, given the patient's baseline.
fn population_curve(params: &TrajectoryParams, baseline: f64, day: u32) -> f64 {
    if day <= params.peak_day {
        let progress = f64::from(day) / f64::from(params.peak_day);
        baseline + (params.peak_value - baseline) * progress
    } else {
        params.peak_value * (-params.decay_rate * f64::from(day - params.peak_day)).exp()
    }
}

fn sample_patient<R>(
    rng: &mut R,
    params: &TrajectoryParams,
    effects: &DayEffects,
    days: u32,
    group: Group,
) -> Vec<f64>
where
    R: Rng,
{
    let baseline = params.baseline_mean + normal(rng, params.baseline_sd);
    let offset = normal(rng, params.individual_sd);

    (0..=days)
        .map(|day| {
            let mut value = if day == 0 {
                let draw = baseline + normal(rng, params.day0_sd);
                draw.max(min_draw(rng, params))
            } else {
                let base = population_curve(params, baseline, day);
                let noise = if day <= params.peak_day {
                    params.rise_noise
                } else {
                    params.decay_noise
                };
                base + normal(rng, base.abs() * noise) + offset
            };

            if let Some(effect) = effects.get(day).filter(|&e| e > 0.0) {
                let jitter = normal(rng, effect * params.effect_jitter);
                match group {
                    Group::Treated => value -= effect + jitter,
                    Group::Control => value += jitter,
                }
            }

            let floored = value.max(min_draw(rng, params)).max(VALUE_FLOOR);
            (floored * 100.0).round() / 100.0
        })
        .collect()
}

/// Zero-mean normal draw with standard deviation `sd`.
fn normal<R>(rng: &mut R, sd: f64) -> f64
where
    R: Rng,
{
    sd * rng.sample::<f64, _>(StandardNormal)
}

/// Random lower bound `offset + Exp(rate)`.
fn min_draw<R>(rng: &mut R, params: &TrajectoryParams) -> f64
where
    R: Rng,
{
    params.min_draw_offset + rng.sample::<f64, _>(Exp1) / params.min_draw_rate
}
