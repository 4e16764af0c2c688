//! Loads and holds per-admin and per-station return-period thresholds
//! (spec §4.2). Thresholds are durable for the run: loaded once, read-only
//! thereafter.
//!
//! Threshold batches arrive as JSON produced by the out-of-scope
//! threshold-derivation job, read through the `BlobStore` interface. The
//! schema mirrors the original Python `ThresholdDataUnit`: a list of admin
//! entries and a list of station entries, each carrying an ascending
//! `thresholds` series.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;

use crate::error::PipelineError;
use crate::model::{
    validate_thresholds, AdminDataset, AdminThreshold, AdminThresholdDataset, StationDataset,
    StationThreshold, StationThresholdDataset, Threshold,
};

#[derive(Debug, Deserialize)]
struct RawThreshold {
    return_period: f64,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct RawAdminThreshold {
    adm_level: u8,
    pcode: String,
    thresholds: Vec<RawThreshold>,
}

#[derive(Debug, Deserialize)]
struct RawStationThreshold {
    station_code: String,
    name: String,
    lat: f64,
    lon: f64,
    pcodes: HashMap<u8, Vec<String>>,
    thresholds: Vec<RawThreshold>,
}

fn to_thresholds(raw: Vec<RawThreshold>) -> Vec<Threshold> {
    raw.into_iter().map(|t| Threshold { return_period: t.return_period, value: t.value }).collect()
}

/// Parses and validates an admin threshold batch (spec §4.2's load-time
/// checks: ascending order already expected from the producer, duplicate
/// return periods and non-monotone values are rejected here).
pub fn parse_admin_thresholds(country: &str, json: &[u8], adm_levels: Vec<u8>) -> Result<AdminThresholdDataset, PipelineError> {
    let entries: Vec<RawAdminThreshold> = serde_json::from_slice(json)
        .map_err(|e| PipelineError::ConfigMissing(format!("malformed admin threshold batch for {country}: {e}")))?;

    let mut dataset: AdminThresholdDataset = AdminDataset::new(country, Utc::now(), adm_levels);
    for entry in entries {
        let thresholds = to_thresholds(entry.thresholds);
        validate_thresholds(&entry.pcode, &thresholds)?;
        dataset.upsert(AdminThreshold { adm_level: entry.adm_level, pcode: entry.pcode, thresholds });
    }
    Ok(dataset)
}

pub fn parse_station_thresholds(country: &str, json: &[u8]) -> Result<StationThresholdDataset, PipelineError> {
    let entries: Vec<RawStationThreshold> = serde_json::from_slice(json)
        .map_err(|e| PipelineError::ConfigMissing(format!("malformed station threshold batch for {country}: {e}")))?;

    let mut dataset: StationThresholdDataset = StationDataset::new(country, Utc::now());
    for entry in entries {
        let thresholds = to_thresholds(entry.thresholds);
        validate_thresholds(&entry.station_code, &thresholds)?;
        dataset.upsert(StationThreshold {
            station_code: entry.station_code,
            name: entry.name,
            lat: entry.lat,
            lon: entry.lon,
            pcodes: entry.pcodes,
            thresholds,
        });
    }
    Ok(dataset)
}

/// Holds the per-country admin and station threshold datasets for a run.
pub struct ThresholdStore {
    admin: HashMap<String, AdminThresholdDataset>,
    station: HashMap<String, StationThresholdDataset>,
}

impl ThresholdStore {
    pub fn new() -> Self {
        Self { admin: HashMap::new(), station: HashMap::new() }
    }

    /// Loads and registers both admin and station thresholds for a country
    /// from raw JSON bytes (as obtained from a `BlobStore`).
    pub fn load_country(
        &mut self,
        country: &str,
        admin_json: &[u8],
        station_json: &[u8],
        adm_levels: Vec<u8>,
    ) -> Result<(), PipelineError> {
        let admin = parse_admin_thresholds(country, admin_json, adm_levels)?;
        let station = parse_station_thresholds(country, station_json)?;
        self.admin.insert(country.to_string(), admin);
        self.station.insert(country.to_string(), station);
        Ok(())
    }

    pub fn get_admin_thresholds(&self, country: &str) -> Result<&AdminThresholdDataset, PipelineError> {
        self.admin
            .get(country)
            .ok_or_else(|| PipelineError::ConfigMissing(format!("no admin thresholds loaded for {country}")))
    }

    pub fn get_station_thresholds(&self, country: &str) -> Result<&StationThresholdDataset, PipelineError> {
        self.station
            .get(country)
            .ok_or_else(|| PipelineError::ConfigMissing(format!("no station thresholds loaded for {country}")))
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN_JSON: &str = r#"[
        {"adm_level": 1, "pcode": "PH1", "thresholds": [{"return_period": 2.0, "value": 10.0}, {"return_period": 5.0, "value": 20.0}]},
        {"adm_level": 1, "pcode": "PH2", "thresholds": [{"return_period": 2.0, "value": 5.0}, {"return_period": 5.0, "value": 15.0}]}
    ]"#;

    const STATION_JSON: &str = r#"[
        {"station_code": "S1", "name": "Gate 1", "lat": 1.0, "lon": 2.0,
         "pcodes": {"1": ["PH1"]},
         "thresholds": [{"return_period": 2.0, "value": 100.0}, {"return_period": 5.0, "value": 200.0}]}
    ]"#;

    #[test]
    fn parses_admin_thresholds() {
        let ds = parse_admin_thresholds("PHL", ADMIN_JSON.as_bytes(), vec![1]).unwrap();
        assert_eq!(ds.units().len(), 2);
        let ph1 = ds.get("PH1", None).unwrap();
        assert_eq!(ph1.threshold(5.0).unwrap(), 20.0);
        assert!(ph1.threshold(10.0).is_err());
    }

    #[test]
    fn parses_station_thresholds() {
        let ds = parse_station_thresholds("PHL", STATION_JSON.as_bytes()).unwrap();
        let s1 = ds.get("S1", None).unwrap();
        assert_eq!(s1.pcodes.get(&1).unwrap(), &vec!["PH1".to_string()]);
        assert_eq!(s1.threshold(2.0).unwrap(), 100.0);
    }

    #[test]
    fn rejects_non_monotone_batch() {
        let bad = r#"[{"adm_level": 1, "pcode": "PH1", "thresholds": [{"return_period": 5.0, "value": 20.0}, {"return_period": 2.0, "value": 10.0}]}]"#;
        assert!(parse_admin_thresholds("PHL", bad.as_bytes(), vec![1]).is_err());
    }

    #[test]
    fn threshold_store_round_trip() {
        let mut store = ThresholdStore::new();
        store
            .load_country("PHL", ADMIN_JSON.as_bytes(), STATION_JSON.as_bytes(), vec![1])
            .unwrap();
        assert!(store.get_admin_thresholds("PHL").is_ok());
        assert!(store.get_station_thresholds("PHL").is_ok());
        assert!(store.get_admin_thresholds("UGA").is_err());
    }
}
