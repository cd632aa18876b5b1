//! Random-intercept model of the value over time:
//! `value ~ group + day + group:day`, one intercept per patient.

use std::collections::BTreeMap;

use crptrial_data::{
    long::LongTable,
    record::{Group, PatientId},
};
use crptrial_stats::mixed::{MixedModelFit, RandomInterceptModel};
use serde::{Deserialize, Serialize};

pub const INTERCEPT_TERM: &str = "Intercept";
pub const GROUP_TERM: &str = "group[T.treated]";
pub const DAY_TERM: &str = "day";
pub const INTERACTION_TERM: &str = "group[T.treated]:day";

/// Result of fitting the model; a failed fit carries the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelOutcome {
    Fitted(MixedModelFit),
    NotConverged { reason: String },
}

impl ModelOutcome {
    #[must_use]
    pub fn fit(&self) -> Option<&MixedModelFit> {
        match self {
            ModelOutcome::Fitted(fit) => Some(fit),
            ModelOutcome::NotConverged { .. } => None,
        }
    }
}

/// Fits the model on the complete observations of `table`.
#[must_use]
pub fn fit_model(table: &LongTable) -> ModelOutcome {
    let mut clusters = BTreeMap::<PatientId, Vec<([f64; 4], f64)>>::new();
    for o in table.observations() {
        let treated = if o.group == Group::Treated { 1.0 } else { 0.0 };
        let day = f64::from(o.day);
        clusters
            .entry(o.patient_id)
            .or_default()
            .push(([1.0, treated, day, treated * day], o.value));
    }

    let mut model =
        RandomInterceptModel::new([INTERCEPT_TERM, GROUP_TERM, DAY_TERM, INTERACTION_TERM]);
    for rows in clusters.into_values() {
        model.add_cluster(rows);
    }

    match model.fit() {
        Ok(fit) => {
            tracing::debug!(
                iterations = fit.iterations,
                group_variance = fit.group_variance,
                residual_variance = fit.residual_variance,
                "mixed model fitted"
            );
            ModelOutcome::Fitted(fit)
        }
        Err(err) => {
            tracing::warn!(%err, "mixed model did not converge");
            ModelOutcome::NotConverged {
                reason: err.to_string(),
            }
        }
    }
}
