//! Alert bands.

use crate::alerts::alert::AlertSeverity;
use crate::kpi::Direction;
use serde::{Deserialize, Serialize};

/// Relative bands past the target, as fractions of the target.
///
/// `deviation <= tolerance` is in band. Past that the severity is `Info` up
/// to `warning_band`, `Warning` up to `critical_band`, and `Critical` beyond.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPolicy {
    /// Acceptable distance past the target
    pub tolerance: f64,
    /// Upper edge of the `Info` band
    pub warning_band: f64,
    /// Upper edge of the `Warning` band
    pub critical_band: f64,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            tolerance: 0.10,
            warning_band: 0.10,
            critical_band: 0.25,
        }
    }
}

impl AlertPolicy {
    /// Policy with a given tolerance and the default critical band.
    pub fn with_tolerance(tolerance: f64) -> Self {
        let defaults = Self::default();
        Self {
            tolerance,
            warning_band: tolerance.max(defaults.warning_band),
            critical_band: defaults.critical_band.max(tolerance),
        }
    }

    /// Bands must be finite, non-negative and ordered.
    pub fn validate(&self) -> Result<(), String> {
        let bands = [self.tolerance, self.warning_band, self.critical_band];
        if bands.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err("alert bands must be finite and non-negative".to_string());
        }
        if self.tolerance > self.warning_band || self.warning_band > self.critical_band {
            return Err(format!(
                "alert bands out of order: tolerance {} <= warning {} <= critical {} required",
                self.tolerance, self.warning_band, self.critical_band
            ));
        }
        Ok(())
    }

    /// Severity for a deviation, or `None` when in band.
    pub fn classify(&self, deviation: f64) -> Option<AlertSeverity> {
        if deviation <= self.tolerance {
            None
        } else if deviation <= self.warning_band {
            Some(AlertSeverity::Info)
        } else if deviation <= self.critical_band {
            Some(AlertSeverity::Warning)
        } else {
            Some(AlertSeverity::Critical)
        }
    }
}

/// Relative distance of `value` past `target` in the unfavorable direction.
///
/// Negative when the value is on the favorable side. A zero target yields
/// the absolute distance.
pub fn deviation(value: f64, target: f64, direction: Direction) -> f64 {
    let shortfall = match direction {
        Direction::HigherIsBetter => target - value,
        Direction::LowerIsBetter => value - target,
    };
    if target == 0.0 {
        shortfall
    } else {
        shortfall / target.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deviation_direction() {
        assert_eq!(deviation(3.0, 2.0, Direction::LowerIsBetter), 0.5);
        assert_eq!(deviation(1.5, 2.0, Direction::LowerIsBetter), -0.25);
        assert_eq!(deviation(80.0, 100.0, Direction::HigherIsBetter), 0.2);
        assert_eq!(deviation(3.0, 0.0, Direction::LowerIsBetter), 3.0);
    }

    #[test]
    fn test_default_classification() {
        let policy = AlertPolicy::default();
        assert_eq!(policy.classify(-0.3), None);
        assert_eq!(policy.classify(0.10), None);
        assert_eq!(policy.classify(0.15), Some(AlertSeverity::Warning));
        assert_eq!(policy.classify(0.25), Some(AlertSeverity::Warning));
        assert_eq!(policy.classify(0.26), Some(AlertSeverity::Critical));
    }

    #[test]
    fn test_info_band() {
        let policy = AlertPolicy {
            tolerance: 0.05,
            warning_band: 0.10,
            critical_band: 0.25,
        };
        assert_eq!(policy.classify(0.07), Some(AlertSeverity::Info));
        assert_eq!(policy.classify(0.12), Some(AlertSeverity::Warning));
    }

    #[test]
    fn test_validate() {
        assert!(AlertPolicy::default().validate().is_ok());
        assert!(AlertPolicy::with_tolerance(0.3).validate().is_ok());

        let unordered = AlertPolicy {
            tolerance: 0.3,
            warning_band: 0.2,
            critical_band: 0.25,
        };
        assert!(unordered.validate().is_err());

        let negative = AlertPolicy {
            tolerance: -0.1,
            ..AlertPolicy::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_partial_policy_json_uses_defaults() {
        let policy: AlertPolicy = serde_json::from_str(r#"{"critical_band": 0.5}"#).unwrap();
        assert_eq!(policy.tolerance, 0.10);
        assert_eq!(policy.critical_band, 0.5);
    }
}
