//! ForecastEngine: turns discharge ensembles and thresholds into classified
//! forecasts (spec §4.3).

pub mod alert;
pub mod events;
pub mod likelihood;

pub use events::{derive_event, EventType, StationEvent};

use crate::config::CountryPolicy;
use crate::error::PipelineError;
use crate::model::{
    AdminDataset, DischargeAdminDataset, DischargeStationDataset, ForecastAdmin, ForecastAdminDataset,
    ForecastStation, ForecastStationDataset, StationDataset, StationThresholdDataset,
};
use crate::model::AdminThresholdDataset;

pub struct ForecastEngine;

impl ForecastEngine {
    /// Builds `ForecastAdminDataset` for every discharge unit. `pop_affected`
    /// and `pop_affected_pct` are left at zero; `ExposureCalc` fills them in
    /// once the flood extents exist.
    pub fn run_admin(
        discharge: &DischargeAdminDataset,
        thresholds: &AdminThresholdDataset,
        policy: &CountryPolicy,
    ) -> Result<ForecastAdminDataset, PipelineError> {
        let mut out: ForecastAdminDataset =
            AdminDataset::new(&discharge.country, discharge.timestamp, discharge.adm_levels.clone());

        for unit in discharge.units() {
            let threshold_unit = thresholds.get(&unit.pcode, None).ok_or_else(|| PipelineError::ThresholdMissing {
                key: unit.pcode.clone(),
                return_period: policy.trigger_rp,
            })?;
            let forecasts = likelihood::forecasts_for(&threshold_unit.thresholds, &unit.ensemble);
            let (triggered, return_period) = alert::derive_trigger(&forecasts, unit.lead_time, policy, &unit.pcode)?;
            let alert_class = alert::classify(&forecasts, triggered, policy, &unit.pcode)?;

            out.upsert(ForecastAdmin {
                adm_level: unit.adm_level,
                pcode: unit.pcode.clone(),
                lead_time: unit.lead_time,
                forecasts,
                triggered,
                return_period,
                alert_class,
                pop_affected: 0,
                pop_affected_pct: 0.0,
            });
        }
        Ok(out)
    }

    pub fn run_station(
        discharge: &DischargeStationDataset,
        thresholds: &StationThresholdDataset,
        policy: &CountryPolicy,
    ) -> Result<ForecastStationDataset, PipelineError> {
        let mut out: ForecastStationDataset = StationDataset::new(&discharge.country, discharge.timestamp);

        for unit in discharge.units() {
            let threshold_unit = thresholds.get(&unit.station_code, None).ok_or_else(|| PipelineError::ThresholdMissing {
                key: unit.station_code.clone(),
                return_period: policy.trigger_rp,
            })?;
            let forecasts = likelihood::forecasts_for(&threshold_unit.thresholds, &unit.ensemble);
            let (triggered, return_period) = alert::derive_trigger(&forecasts, unit.lead_time, policy, &unit.station_code)?;
            let alert_class = alert::classify(&forecasts, triggered, policy, &unit.station_code)?;

            out.upsert(ForecastStation {
                station_code: unit.station_code.clone(),
                lead_time: unit.lead_time,
                forecasts,
                triggered,
                return_period,
                alert_class,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifyMode;
    use crate::model::{AdminThreshold, DischargeAdmin, Threshold};
    use chrono::Utc;
    use std::collections::HashMap;

    fn policy() -> CountryPolicy {
        CountryPolicy {
            country: "PHL".into(),
            admin_levels: vec![1],
            trigger_lead_time: 3,
            trigger_rp: 5.0,
            trigger_min_prob: 0.5,
            classify: ClassifyMode::ReturnPeriod {
                alert_on_rp: HashMap::from([(crate::model::AlertClass::Med, 5.0)]),
                alert_min_prob: 0.5,
            },
            no_ensemble_members: 4,
            minimum_flood_depth: 0.0,
            bbox: crate::geometry::BoundingBox { min_lon: 0.0, min_lat: 0.0, max_lon: 1.0, max_lat: 1.0 },
        }
    }

    #[test]
    fn run_admin_classifies_each_unit() {
        let mut thresholds: AdminThresholdDataset = AdminDataset::new("PHL", Utc::now(), vec![1]);
        thresholds.upsert(AdminThreshold {
            adm_level: 1,
            pcode: "PH1".into(),
            thresholds: vec![Threshold { return_period: 2.0, value: 10.0 }, Threshold { return_period: 5.0, value: 20.0 }],
        });

        let mut discharge: DischargeAdminDataset = AdminDataset::new("PHL", Utc::now(), vec![1]);
        discharge.upsert(DischargeAdmin::new(1, "PH1", 3, vec![25.0, 25.0, 25.0, 5.0]));

        let forecasts = ForecastEngine::run_admin(&discharge, &thresholds, &policy()).unwrap();
        let unit = forecasts.get("PH1", Some(3)).unwrap();
        assert!(unit.triggered);
        assert_eq!(unit.alert_class, crate::model::AlertClass::Med);
    }

    #[test]
    fn run_admin_missing_threshold_unit_is_fatal() {
        let thresholds: AdminThresholdDataset = AdminDataset::new("PHL", Utc::now(), vec![1]);
        let mut discharge: DischargeAdminDataset = AdminDataset::new("PHL", Utc::now(), vec![1]);
        discharge.upsert(DischargeAdmin::new(1, "PH1", 3, vec![25.0]));
        assert!(ForecastEngine::run_admin(&discharge, &thresholds, &policy()).is_err());
    }
}
