//! Wire payloads for the five downstream endpoints (spec §6).

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct ExposurePlaceCode {
    #[serde(rename = "placeCode")]
    pub place_code: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExposurePayload {
    #[serde(rename = "countryCodeISO3")]
    pub country_code_iso3: String,
    #[serde(rename = "leadTime")]
    pub lead_time: String,
    #[serde(rename = "dynamicIndicator")]
    pub dynamic_indicator: String,
    #[serde(rename = "adminLevel")]
    pub admin_level: u8,
    #[serde(rename = "exposurePlaceCodes")]
    pub exposure_place_codes: Vec<ExposurePlaceCode>,
    #[serde(rename = "disasterType")]
    pub disaster_type: String,
    #[serde(rename = "eventName")]
    pub event_name: Option<String>,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointDatum {
    pub fid: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PointDynamicPayload {
    #[serde(rename = "leadTime")]
    pub lead_time: String,
    pub key: String,
    #[serde(rename = "dynamicPointData")]
    pub dynamic_point_data: Vec<PointDatum>,
    #[serde(rename = "pointDataCategory")]
    pub point_data_category: String,
    #[serde(rename = "disasterType")]
    pub disaster_type: String,
    #[serde(rename = "countryCodeISO3")]
    pub country_code_iso3: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertPerLeadTime {
    #[serde(rename = "leadTime")]
    pub lead_time: u8,
    #[serde(rename = "forecastAlert")]
    pub forecast_alert: bool,
    #[serde(rename = "forecastTrigger")]
    pub forecast_trigger: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsPerLeadTimePayload {
    #[serde(rename = "countryCodeISO3")]
    pub country_code_iso3: String,
    #[serde(rename = "alertsPerLeadTime")]
    pub alerts_per_lead_time: Vec<AlertPerLeadTime>,
    #[serde(rename = "disasterType")]
    pub disaster_type: String,
    #[serde(rename = "eventName")]
    pub event_name: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventsProcessPayload {
    #[serde(rename = "countryCodeISO3")]
    pub country_code_iso3: String,
    #[serde(rename = "disasterType")]
    pub disaster_type: String,
    pub date: String,
}

/// `severityOf(alert_class, is_trigger)` (spec §4.6).
pub fn severity_of(alert_class: crate::model::AlertClass, is_trigger: bool) -> f64 {
    use crate::model::AlertClass::*;
    match (alert_class, is_trigger) {
        (No, _) => 0.0,
        (Min, _) => 0.3,
        (Med, _) => 0.7,
        (Max, true) => 1.0,
        (Max, false) => 0.7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertClass;

    #[test]
    fn severity_matches_the_spec_table() {
        assert_eq!(severity_of(AlertClass::No, true), 0.0);
        assert_eq!(severity_of(AlertClass::Min, false), 0.3);
        assert_eq!(severity_of(AlertClass::Med, false), 0.7);
        assert_eq!(severity_of(AlertClass::Max, true), 1.0);
        assert_eq!(severity_of(AlertClass::Max, false), 0.7);
    }

    #[test]
    fn exposure_payload_serializes_with_wire_field_names() {
        let payload = ExposurePayload {
            country_code_iso3: "PHL".into(),
            lead_time: "2-day".into(),
            dynamic_indicator: "population_affected".into(),
            admin_level: 1,
            exposure_place_codes: vec![ExposurePlaceCode { place_code: "PH1".into(), amount: 100.0 }],
            disaster_type: "floods".into(),
            event_name: Some("S1".into()),
            date: "2026-07-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"countryCodeISO3\":\"PHL\""));
        assert!(json.contains("\"exposurePlaceCodes\""));
        assert!(json.contains("\"placeCode\":\"PH1\""));
    }
}
