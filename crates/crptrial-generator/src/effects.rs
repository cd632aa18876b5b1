use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Per-day treatment effects: how much lower the treated group's value is
/// on a given day.
///
/// The default is a single large effect on day 5 (`{5: 50}`);
/// [`DayEffects::none`] applies no effect at all.
///
/// # Examples
///
/// ```
/// use crptrial_generator::effects::DayEffects;
///
/// let effects = "{3: 15, 5: 50}".parse::<DayEffects>().unwrap();
/// assert_eq!(effects.get(5), Some(50.0));
/// assert_eq!(effects.to_string(), "{3: 15, 5: 50}");
///
/// assert!("{}".parse::<DayEffects>().unwrap().is_empty());
/// assert_eq!("5:50".parse::<DayEffects>().unwrap(), DayEffects::default());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayEffects(BTreeMap<u32, f64>);

impl Default for DayEffects {
    fn default() -> Self {
        Self::from_iter([(5, 50.0)])
    }
}

impl FromIterator<(u32, f64)> for DayEffects {
    fn from_iter<T: IntoIterator<Item = (u32, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl DayEffects {
    #[must_use]
    pub fn none() -> Self {
        Self(BTreeMap::new())
    }

    #[must_use]
    pub fn get(&self, day: u32) -> Option<f64> {
        self.0.get(&day).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.0.iter().map(|(&day, &effect)| (day, effect))
    }
}

impl fmt::Display for DayEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (day, effect)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{day}: {effect}")?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("invalid day effect entry {entry:?}: {reason}")]
pub struct ParseDayEffectsError {
    pub entry: String,
    pub reason: &'static str,
}

impl FromStr for DayEffects {
    type Err = ParseDayEffectsError;

    /// Parses `{5: 50, 3: 15}` or `5:50,3:15`. `{}` and the empty string
    /// mean no effect.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let body = s
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(s);

        let mut effects = BTreeMap::new();
        for entry in body.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let error = |reason| ParseDayEffectsError {
                entry: entry.to_owned(),
                reason,
            };
            let (day, effect) = entry
                .split_once(':')
                .ok_or_else(|| error("expected `day: effect`"))?;
            let day = day
                .trim()
                .trim_matches(['"', '\''])
                .parse::<u32>()
                .map_err(|_| error("day must be a non-negative integer"))?;
            let effect = effect
                .trim()
                .parse::<f64>()
                .map_err(|_| error("effect must be a number"))?;
            if !effect.is_finite() || effect < 0.0 {
                return Err(error("effect must be finite and non-negative"));
            }
            if effects.insert(day, effect).is_some() {
                return Err(error("day listed more than once"));
            }
        }
        Ok(Self(effects))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        let braces = "{5: 50, 3: 15}".parse::<DayEffects>().unwrap();
        let bare = " 3:15 , 5:50 ".parse::<DayEffects>().unwrap();
        assert_eq!(braces, bare);
        assert_eq!(braces.iter().collect::<Vec<_>>(), vec![(3, 15.0), (5, 50.0)]);

        assert_eq!("".parse::<DayEffects>().unwrap(), DayEffects::none());
        assert_eq!("{ }".parse::<DayEffects>().unwrap(), DayEffects::none());
        assert_eq!("{'4': 2.5}".parse::<DayEffects>().unwrap().get(4), Some(2.5));
    }

    #[test]
    fn test_parse_errors() {
        for input in ["{5 50}", "{x: 1}", "{5: big}", "{5: -1}", "{5: inf}", "5:1,5:2"] {
            let err = input.parse::<DayEffects>().unwrap_err();
            assert!(!err.reason.is_empty(), "{input}");
        }
    }

    #[test]
    fn test_display_round_trip() {
        let effects = DayEffects::from_iter([(2, 7.5), (6, 30.0)]);
        assert_eq!(effects.to_string(), "{2: 7.5, 6: 30}");
        assert_eq!(effects.to_string().parse::<DayEffects>().unwrap(), effects);
        assert_eq!(DayEffects::none().to_string(), "{}");
    }

    #[test]
    fn test_json_form() {
        let effects = serde_json::from_str::<DayEffects>(r#"{"5": 50.0}"#).unwrap();
        assert_eq!(effects, DayEffects::default());
        assert_eq!(serde_json::to_string(&effects).unwrap(), r#"{"5":50.0}"#);
    }
}
