use crptrial_data::long::DEFAULT_VALUE_COLUMN;
use serde::{Deserialize, Serialize};

use crate::effects::DayEffects;

/// Largest number of distinct `64xxxxxx` patient ids.
pub const MAX_PATIENTS: usize = 1_000_000;

/// Shape of the shared population curve and the noise around it.
///
/// Noise scales named `*_noise` and `effect_jitter` are relative (a fraction
/// of the curve value or of the effect size); `*_sd` are absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrajectoryParams {
    pub baseline_mean: f64,
    pub baseline_sd: f64,
    pub peak_value: f64,
    pub peak_day: u32,
    pub decay_rate: f64,
    /// Standard deviation of the per-patient random offset.
    pub individual_sd: f64,
    pub day0_sd: f64,
    pub rise_noise: f64,
    pub decay_noise: f64,
    pub effect_jitter: f64,
    /// Values are floored at `min_draw_offset + Exp(min_draw_rate)`.
    pub min_draw_offset: f64,
    pub min_draw_rate: f64,
}

impl Default for TrajectoryParams {
    fn default() -> Self {
        Self {
            baseline_mean: 5.0,
            baseline_sd: 2.0,
            peak_value: 180.0,
            peak_day: 2,
            decay_rate: 0.3,
            individual_sd: 35.0,
            day0_sd: 15.0,
            rise_noise: 0.30,
            decay_noise: 0.35,
            effect_jitter: 0.30,
            min_draw_offset: 0.5,
            min_draw_rate: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("patients per group must be positive")]
    NoPatients,
    #[display("{requested} patients requested but only 1000000 distinct ids exist")]
    TooManyPatients { requested: usize },
    #[display("effect on day {day} must be finite and non-negative (got {effect})")]
    InvalidEffect { day: u32, effect: f64 },
    #[display("effect on day {day} is outside the follow-up days 0..={days}")]
    EffectOutOfRange { day: u32, days: u32 },
    #[display("trajectory parameter `{name}` is invalid ({value})")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Everything needed to generate one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub patients_per_group: usize,
    /// Last follow-up day; the schedule is `0..=days`.
    pub days: u32,
    pub day_effects: DayEffects,
    /// `None` draws a fresh seed from the OS.
    pub seed: Option<u64>,
    pub value_column: String,
    pub trajectory: TrajectoryParams,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            patients_per_group: 20,
            days: 7,
            day_effects: DayEffects::default(),
            seed: None,
            value_column: DEFAULT_VALUE_COLUMN.to_owned(),
            trajectory: TrajectoryParams::default(),
        }
    }
}

impl GeneratorConfig {
    /// Checks the configuration before anything is generated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.patients_per_group == 0 {
            return Err(ConfigError::NoPatients);
        }
        let requested = self.patients_per_group.saturating_mul(2);
        if requested > MAX_PATIENTS {
            return Err(ConfigError::TooManyPatients { requested });
        }
        for (day, effect) in self.day_effects.iter() {
            if !effect.is_finite() || effect < 0.0 {
                return Err(ConfigError::InvalidEffect { day, effect });
            }
            if day > self.days {
                return Err(ConfigError::EffectOutOfRange {
                    day,
                    days: self.days,
                });
            }
        }
        self.trajectory.validate()
    }
}

impl TrajectoryParams {
    fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("baseline_mean", self.baseline_mean),
            ("peak_value", self.peak_value),
        ];
        let non_negative = [
            ("baseline_sd", self.baseline_sd),
            ("decay_rate", self.decay_rate),
            ("individual_sd", self.individual_sd),
            ("day0_sd", self.day0_sd),
            ("rise_noise", self.rise_noise),
            ("decay_noise", self.decay_noise),
            ("effect_jitter", self.effect_jitter),
            ("min_draw_offset", self.min_draw_offset),
        ];
        if let Some(&(name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::InvalidParameter { name, value });
        }
        if let Some(&(name, value)) = non_negative
            .iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::InvalidParameter { name, value });
        }
        if !self.min_draw_rate.is_finite() || self.min_draw_rate <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "min_draw_rate",
                value: self.min_draw_rate,
            });
        }
        if self.peak_day == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "peak_day",
                value: 0.0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = GeneratorConfig::default();
        assert_eq!(config.patients_per_group, 20);
        assert_eq!(config.days, 7);
        assert_eq!(config.day_effects.get(5), Some(50.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_invalid_values() {
        let config = GeneratorConfig {
            patients_per_group: 0,
            ..GeneratorConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NoPatients));

        let config = GeneratorConfig {
            day_effects: DayEffects::from_iter([(9, 10.0)]),
            ..GeneratorConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::EffectOutOfRange { day: 9, days: 7 })
        );

        let config = GeneratorConfig {
            day_effects: DayEffects::from_iter([(3, -1.0)]),
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEffect { day: 3, .. })
        ));

        let mut config = GeneratorConfig::default();
        config.trajectory.decay_noise = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameter {
                name: "decay_noise",
                ..
            })
        ));
    }

    #[test]
    fn test_json_uses_defaults_for_omitted_fields() {
        let config =
            serde_json::from_str::<GeneratorConfig>(r#"{"seed": 7, "day_effects": {}}"#).unwrap();
        assert_eq!(config.seed, Some(7));
        assert!(config.day_effects.is_empty());
        assert_eq!(config.trajectory, TrajectoryParams::default());
        assert!(serde_json::from_str::<GeneratorConfig>(r#"{"bogus": 1}"#).is_err());
    }
}
