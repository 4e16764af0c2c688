//! Publisher: emits the full per-country snapshot in the order the
//! downstream dashboard expects (spec §4.6, §5 "Ordering guarantees").

pub mod client;
pub mod payloads;

pub use client::{HttpPublisher, LoggingPublisher, Publisher};
pub use payloads::*;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::cancel::CancellationToken;
use crate::config::CountryPolicy;
use crate::engine::{derive_event, EventType};
use crate::error::PipelineError;
use crate::extent::ExtentSet;
use crate::model::{DischargeStationDataset, ForecastAdminDataset, ForecastStationDataset, StationThresholdDataset};

fn format_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Runs the full publish sequence for one country. Returns early (without
/// emitting `events/process`) if `cancel` fires mid-run.
#[allow(clippy::too_many_arguments)]
pub fn publish_country(
    publisher: &dyn Publisher,
    policy: &CountryPolicy,
    forecast_admin: &ForecastAdminDataset,
    forecast_station: &ForecastStationDataset,
    discharge_station: &DischargeStationDataset,
    station_thresholds: &StationThresholdDataset,
    extents: &ExtentSet,
    timestamp: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let country = &policy.country;
    let date = format_date(timestamp);

    let mut touched_admin_levels: HashSet<u8> = HashSet::new();
    let mut published_stations: HashSet<String> = HashSet::new();

    for station_code in forecast_station.station_codes() {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let mut per_lead_time = forecast_station.list_for_station(station_code);
        per_lead_time.sort_by_key(|f| f.lead_time);
        let Some(event) = derive_event(station_code, &per_lead_time, policy.trigger_lead_time) else { continue };

        let Some(station) = station_thresholds.get(station_code, None) else { continue };

        // per-event exposures
        for (&adm_level, pcodes) in &station.pcodes {
            for pcode in pcodes {
                let Some(admin_unit) = forecast_admin.get(pcode, Some(event.event_lead_time)) else { continue };
                touched_admin_levels.insert(adm_level);

                let severity = severity_of(admin_unit.alert_class, event.event_type == EventType::Trigger);
                let forecast_trigger = if event.event_type == EventType::Trigger && severity == 1.0 { 1.0 } else { 0.0 };

                for (indicator, amount) in [
                    ("population_affected", admin_unit.pop_affected as f64),
                    ("population_affected_percentage", admin_unit.pop_affected_pct),
                    ("forecast_severity", severity),
                    ("forecast_trigger", forecast_trigger),
                ] {
                    publisher.post_exposure(&ExposurePayload {
                        country_code_iso3: country.clone(),
                        lead_time: format!("{}-day", event.event_lead_time),
                        dynamic_indicator: indicator.to_string(),
                        admin_level: adm_level,
                        exposure_place_codes: vec![ExposurePlaceCode { place_code: pcode.clone(), amount }],
                        disaster_type: "floods".to_string(),
                        event_name: Some(station_code.to_string()),
                        date: date.clone(),
                    })?;
                }
            }
        }

        // per-event alertsPerLeadTime
        let alerts_per_lead_time = (0..=7u8)
            .map(|lead_time| {
                let forecast_trigger = event.event_type == EventType::Trigger && lead_time >= event.event_lead_time;
                let forecast_alert = matches!(event.event_type, EventType::Trigger | EventType::Alert)
                    && lead_time >= event.event_lead_time;
                AlertPerLeadTime { lead_time, forecast_alert, forecast_trigger }
            })
            .collect();
        publisher.post_alerts_per_lead_time(&AlertsPerLeadTimePayload {
            country_code_iso3: country.clone(),
            alerts_per_lead_time,
            disaster_type: "floods".to_string(),
            event_name: station_code.to_string(),
            date: date.clone(),
        })?;

        // per-event station dynamics
        if let (Some(forecast_unit), Some(discharge_unit)) = (
            forecast_station.get(station_code, Some(event.event_lead_time)),
            discharge_station.get(station_code, Some(event.event_lead_time)),
        ) {
            let eap_alert_class = if event.event_type == EventType::Alert && forecast_unit.alert_class == crate::model::AlertClass::Max
            {
                crate::model::AlertClass::Med
            } else {
                forecast_unit.alert_class
            };
            let trigger_level = station.threshold(policy.trigger_rp)?;

            for (key, value) in [
                ("forecastLevel", json!(discharge_unit.mean as i64)),
                ("eapAlertClass", json!(eap_alert_class.as_str())),
                ("forecastReturnPeriod", json!(forecast_unit.return_period)),
                ("triggerLevel", json!(trigger_level)),
            ] {
                publisher.post_point_dynamic(&PointDynamicPayload {
                    lead_time: format!("{}-day", event.event_lead_time),
                    key: key.to_string(),
                    dynamic_point_data: vec![PointDatum { fid: station_code.to_string(), value }],
                    point_data_category: "glofas_stations".to_string(),
                    disaster_type: "floods".to_string(),
                    country_code_iso3: country.clone(),
                    date: date.clone(),
                })?;
            }
        }
        published_stations.insert(station_code.to_string());
    }

    // always, after the event loop: extent rasters lead_time 0 -> 7
    for lead_time in 0..=7u8 {
        if cancel.is_cancelled() {
            return Ok(());
        }
        let bytes = extents
            .get(lead_time)
            .to_geotiff_bytes()
            .map_err(|e| PipelineError::ConfigMissing(format!("encoding extent raster: {e}")))?;
        publisher.post_raster(country, lead_time, &bytes)?;
    }

    // empty-sentinel exposures if no admin was touched
    if touched_admin_levels.is_empty() {
        for &adm_level in &policy.admin_levels {
            publisher.post_exposure(&ExposurePayload {
                country_code_iso3: country.clone(),
                lead_time: "1-day".to_string(),
                dynamic_indicator: "population_affected".to_string(),
                admin_level: adm_level,
                exposure_place_codes: vec![],
                disaster_type: "floods".to_string(),
                event_name: None,
                date: date.clone(),
            })?;
        }
    }

    // other-station dynamics, at lead_time=7
    for station_code in forecast_station.station_codes() {
        if published_stations.contains(station_code) {
            continue;
        }
        let Some(station) = station_thresholds.get(station_code, None) else { continue };
        let Some(forecast_unit) = forecast_station.get(station_code, Some(7)) else { continue };
        let Some(discharge_unit) = discharge_station.get(station_code, Some(7)) else { continue };
        let trigger_level = station.threshold(policy.trigger_rp)?;

        for (key, value) in [
            ("forecastLevel", json!(discharge_unit.mean.round() as i64)),
            ("eapAlertClass", json!(forecast_unit.alert_class.as_str())),
            ("forecastReturnPeriod", json!(forecast_unit.return_period)),
            ("triggerLevel", json!(trigger_level)),
        ] {
            publisher.post_point_dynamic(&PointDynamicPayload {
                lead_time: "7-day".to_string(),
                key: key.to_string(),
                dynamic_point_data: vec![PointDatum { fid: station_code.to_string(), value }],
                point_data_category: "glofas_stations".to_string(),
                disaster_type: "floods".to_string(),
                country_code_iso3: country.clone(),
                date: date.clone(),
            })?;
        }
    }

    publisher.post_events_process(&EventsProcessPayload {
        country_code_iso3: country.clone(),
        disaster_type: "floods".to_string(),
        date,
    })?;

    Ok(())
}
