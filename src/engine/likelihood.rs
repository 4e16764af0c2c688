//! Strict-inequality likelihood reduction over an ensemble (spec §4.3).

use crate::model::{Forecast, Threshold};

/// Fraction of ensemble members strictly exceeding `threshold`. `0.0` for an
/// empty ensemble (a dropped-to-nothing member set).
pub fn likelihood(ensemble: &[f64], threshold: f64) -> f64 {
    if ensemble.is_empty() {
        return 0.0;
    }
    let exceeding = ensemble.iter().filter(|&&x| x > threshold).count();
    exceeding as f64 / ensemble.len() as f64
}

/// Builds the `[Forecast]` series for a unit, one entry per configured
/// threshold, in the thresholds' stored (ascending return-period) order.
pub fn forecasts_for(thresholds: &[Threshold], ensemble: &[f64]) -> Vec<Forecast> {
    thresholds
        .iter()
        .map(|t| Forecast { return_period: t.return_period, likelihood: likelihood(ensemble, t.value) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn likelihood_uses_strict_inequality() {
        let ensemble = vec![5.0, 10.0, 10.0, 15.0];
        assert_eq!(likelihood(&ensemble, 10.0), 0.25); // only 15.0 strictly exceeds 10.0
    }

    #[test]
    fn likelihood_of_empty_ensemble_is_zero() {
        assert_eq!(likelihood(&[], 10.0), 0.0);
    }

    #[test]
    fn forecasts_for_preserves_threshold_order() {
        let thresholds = vec![
            Threshold { return_period: 2.0, value: 5.0 },
            Threshold { return_period: 5.0, value: 10.0 },
        ];
        let forecasts = forecasts_for(&thresholds, &[6.0, 11.0, 11.0, 11.0]);
        assert_eq!(forecasts[0].return_period, 2.0);
        assert_eq!(forecasts[1].return_period, 5.0);
        assert_eq!(forecasts[1].likelihood, 0.75);
    }
}
