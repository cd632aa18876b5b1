//! Kaplan-Meier estimation for right-censored time-to-event data.

use serde::{Deserialize, Serialize};

/// One subject's follow-up: the time of the event, or of the last
/// observation when the event was never seen (censored).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurvivalObservation {
    pub time: u32,
    pub event: bool,
}

impl SurvivalObservation {
    #[must_use]
    pub fn event(time: u32) -> Self {
        Self { time, event: true }
    }

    #[must_use]
    pub fn censored(time: u32) -> Self {
        Self { time, event: false }
    }
}

/// A single step of the Kaplan-Meier curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurvivalStep {
    pub time: u32,
    pub at_risk: usize,
    pub events: usize,
    /// Survival probability just after `time`.
    pub survival: f64,
}

/// Kaplan-Meier survival curve.
///
/// The curve only has steps at times where at least one event occurred.
/// Censored subjects leave the risk set after their censoring time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KaplanMeierCurve {
    pub subjects: usize,
    pub steps: Vec<SurvivalStep>,
}

impl KaplanMeierCurve {
    /// Estimates the survival curve.
    ///
    /// # Arguments
    ///
    /// * `observations` - Follow-up of each subject, in any order
    ///
    /// # Returns
    ///
    /// A curve with one step per distinct event time. An empty input gives a
    /// curve without steps.
    ///
    /// # Examples
    ///
    /// ```
    /// use crptrial_stats::survival::{KaplanMeierCurve, SurvivalObservation};
    ///
    /// let curve = KaplanMeierCurve::from_observations([
    ///     SurvivalObservation::event(1),
    ///     SurvivalObservation::censored(2),
    ///     SurvivalObservation::event(3),
    /// ]);
    /// assert_eq!(curve.steps.len(), 2);
    /// assert!((curve.steps[0].survival - 2.0 / 3.0).abs() < 1e-12);
    /// assert_eq!(curve.steps[1].survival, 0.0);
    /// assert_eq!(curve.median(), Some(3));
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = SurvivalObservation>,
    {
        let mut data = observations.into_iter().collect::<Vec<_>>();
        data.sort_by_key(|o| o.time);

        let subjects = data.len();
        let mut steps = vec![];
        let mut survival = 1.0;
        let mut removed = 0;

        for chunk in data.chunk_by(|a, b| a.time == b.time) {
            let at_risk = subjects - removed;
            let events = chunk.iter().filter(|o| o.event).count();
            if events > 0 {
                survival *= 1.0 - events as f64 / at_risk as f64;
                steps.push(SurvivalStep {
                    time: chunk[0].time,
                    at_risk,
                    events,
                    survival,
                });
            }
            removed += chunk.len();
        }

        Self { subjects, steps }
    }

    /// Number of observed events over the whole curve.
    #[must_use]
    pub fn total_events(&self) -> usize {
        self.steps.iter().map(|s| s.events).sum()
    }

    /// Survival probability at `time` (right-continuous step function).
    #[cfg(test)]
    fn survival_at(&self, time: u32) -> f64 {
        self.steps
            .iter()
            .take_while(|s| s.time <= time)
            .last()
            .map_or(1.0, |s| s.survival)
    }

    /// Median survival time: the first time at which the curve drops to 0.5
    /// or below, or `None` if it never does.
    #[must_use]
    pub fn median(&self) -> Option<u32> {
        self.steps
            .iter()
            .find(|s| s.survival <= 0.5)
            .map(|s| s.time)
    }
}
