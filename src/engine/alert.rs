//! Trigger derivation and the alert classification state machine (spec
//! §4.3): a small pure-function core over `[Forecast]`, kept independent of
//! which dataset (admin or station) the forecasts belong to.

use crate::config::{ClassifyMode, CountryPolicy};
use crate::error::PipelineError;
use crate::model::{AlertClass, Forecast};

fn likelihood_at(forecasts: &[Forecast], return_period: f64) -> Option<f64> {
    forecasts.iter().find(|f| f.return_period == return_period).map(|f| f.likelihood)
}

/// `(triggered, return_period)` per spec §4.3's trigger derivation formula.
pub fn derive_trigger(
    forecasts: &[Forecast],
    lead_time: u8,
    policy: &CountryPolicy,
    key: &str,
) -> Result<(bool, f64), PipelineError> {
    let likelihood_at_trigger_rp = likelihood_at(forecasts, policy.trigger_rp).ok_or_else(|| {
        PipelineError::ThresholdMissing { key: key.to_string(), return_period: policy.trigger_rp }
    })?;

    let triggered = likelihood_at_trigger_rp >= policy.trigger_min_prob && lead_time <= policy.trigger_lead_time;

    let return_period = forecasts
        .iter()
        .filter(|f| f.likelihood >= policy.trigger_min_prob)
        .map(|f| f.return_period)
        .fold(0.0, f64::max);

    Ok((triggered, return_period))
}

/// Walks the class->criterion table in ascending class order, keeping the
/// highest class whose criterion is satisfied.
pub fn classify(forecasts: &[Forecast], triggered: bool, policy: &CountryPolicy, key: &str) -> Result<AlertClass, PipelineError> {
    match &policy.classify {
        ClassifyMode::ReturnPeriod { alert_on_rp, alert_min_prob } => {
            let mut result = AlertClass::No;
            for class in AlertClass::ascending() {
                let Some(&rp) = alert_on_rp.get(&class) else { continue };
                let likelihood = likelihood_at(forecasts, rp)
                    .ok_or_else(|| PipelineError::ThresholdMissing { key: key.to_string(), return_period: rp })?;
                if likelihood >= *alert_min_prob {
                    result = class;
                }
            }
            Ok(result)
        }
        ClassifyMode::Probability { alert_on_rp, alert_on_prob } => {
            let likelihood = likelihood_at(forecasts, *alert_on_rp)
                .ok_or_else(|| PipelineError::ThresholdMissing { key: key.to_string(), return_period: *alert_on_rp })?;
            let mut result = AlertClass::No;
            for class in AlertClass::ascending() {
                if let Some(&min_likelihood) = alert_on_prob.get(&class) {
                    if likelihood >= min_likelihood {
                        result = class;
                    }
                }
            }
            Ok(result)
        }
        ClassifyMode::Disable { defined_classes } => {
            if triggered {
                Ok(defined_classes.keys().copied().max().unwrap_or(AlertClass::No))
            } else {
                Ok(AlertClass::No)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn policy_return_period() -> CountryPolicy {
        CountryPolicy {
            country: "PHL".into(),
            admin_levels: vec![1],
            trigger_lead_time: 3,
            trigger_rp: 5.0,
            trigger_min_prob: 0.5,
            classify: ClassifyMode::ReturnPeriod {
                alert_on_rp: HashMap::from([(AlertClass::Min, 2.0), (AlertClass::Med, 5.0)]),
                alert_min_prob: 0.5,
            },
            no_ensemble_members: 51,
            minimum_flood_depth: 0.0,
            bbox: crate::geometry::BoundingBox { min_lon: 0.0, min_lat: 0.0, max_lon: 1.0, max_lat: 1.0 },
        }
    }

    fn forecasts() -> Vec<Forecast> {
        vec![
            Forecast { return_period: 2.0, likelihood: 0.9 },
            Forecast { return_period: 5.0, likelihood: 0.6 },
        ]
    }

    #[test]
    fn trigger_requires_lead_time_within_bound() {
        let policy = policy_return_period();
        let (triggered, rp) = derive_trigger(&forecasts(), 3, &policy, "PH1").unwrap();
        assert!(triggered);
        assert_eq!(rp, 5.0);

        let (triggered_late, _) = derive_trigger(&forecasts(), 4, &policy, "PH1").unwrap();
        assert!(!triggered_late);
    }

    #[test]
    fn trigger_missing_rp_is_fatal() {
        let mut policy = policy_return_period();
        policy.trigger_rp = 100.0;
        assert!(derive_trigger(&forecasts(), 1, &policy, "PH1").is_err());
    }

    #[test]
    fn classify_return_period_picks_highest_satisfied_class() {
        let policy = policy_return_period();
        let class = classify(&forecasts(), true, &policy, "PH1").unwrap();
        assert_eq!(class, AlertClass::Med);
    }

    #[test]
    fn classify_disable_mode_uses_highest_defined_class_when_triggered() {
        let mut policy = policy_return_period();
        policy.classify = ClassifyMode::Disable {
            defined_classes: HashMap::from([(AlertClass::Min, 2.0), (AlertClass::Max, 10.0)]),
        };
        assert_eq!(classify(&forecasts(), true, &policy, "PH1").unwrap(), AlertClass::Max);
        assert_eq!(classify(&forecasts(), false, &policy, "PH1").unwrap(), AlertClass::No);
    }
}
