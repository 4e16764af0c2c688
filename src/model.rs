//! Core domain entities: thresholds, discharge, forecasts, and the generic
//! dataset containers that index them by pcode/station_code and lead time.
//!
//! Two parallel hierarchies share the same shape: admin-keyed units
//! (`AdminThreshold`, `DischargeAdmin`, `ForecastAdmin`) and station-keyed
//! units (`StationThreshold`, `DischargeStation`, `ForecastStation`). Rather
//! than modelling this with inheritance, each side implements a small
//! `AdminUnit`/`StationUnit` trait and is stored in a generic
//! `AdminDataset<U>`/`StationDataset<U>` container.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const MAX_LEAD_TIME: u8 = 7;

// ---------------------------------------------------------------------------
// Alert class
// ---------------------------------------------------------------------------

/// Ordered qualitative severity label. Declaration order is the total order
/// `No < Min < Med < Max` that the classification state machine walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertClass {
    No,
    Min,
    Med,
    Max,
}

impl AlertClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertClass::No => "no",
            AlertClass::Min => "min",
            AlertClass::Med => "med",
            AlertClass::Max => "max",
        }
    }

    /// All non-`No` classes in ascending order, the order the classification
    /// state machine walks when looking for the highest satisfied criterion.
    pub fn ascending() -> [AlertClass; 3] {
        [AlertClass::Min, AlertClass::Med, AlertClass::Max]
    }
}

impl std::str::FromStr for AlertClass {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" => Ok(AlertClass::No),
            "min" => Ok(AlertClass::Min),
            "med" => Ok(AlertClass::Med),
            "max" => Ok(AlertClass::Max),
            other => Err(PipelineError::PolicyInvalid(format!(
                "unknown alert class '{other}', expected one of no/min/med/max"
            ))),
        }
    }
}

impl std::fmt::Display for AlertClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Threshold
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub return_period: f64,
    pub value: f64,
}

/// Validates a threshold series on load: ascending sort by return period
/// already applied, no duplicate return periods, and monotone values.
pub fn validate_thresholds(key: &str, thresholds: &[Threshold]) -> Result<(), PipelineError> {
    for pair in thresholds.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.return_period == b.return_period {
            return Err(PipelineError::PolicyInvalid(format!(
                "duplicate return period {} in thresholds for {key}",
                a.return_period
            )));
        }
        if a.return_period > b.return_period {
            return Err(PipelineError::PolicyInvalid(format!(
                "thresholds for {key} are not sorted ascending by return period"
            )));
        }
        if a.value >= b.value {
            return Err(PipelineError::PolicyInvalid(format!(
                "thresholds for {key} are not monotone: value at rp={} ({}) >= value at rp={} ({})",
                a.return_period, a.value, b.return_period, b.value
            )));
        }
    }
    Ok(())
}

/// Looks up the value for an exact return period, failing with
/// `ThresholdMissing` if it is not present in the series.
pub fn threshold_value(key: &str, thresholds: &[Threshold], return_period: f64) -> Result<f64, PipelineError> {
    thresholds
        .iter()
        .find(|t| t.return_period == return_period)
        .map(|t| t.value)
        .ok_or_else(|| PipelineError::ThresholdMissing {
            key: key.to_string(),
            return_period,
        })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminThreshold {
    pub adm_level: u8,
    pub pcode: String,
    pub thresholds: Vec<Threshold>,
}

impl AdminThreshold {
    pub fn threshold(&self, return_period: f64) -> Result<f64, PipelineError> {
        threshold_value(&self.pcode, &self.thresholds, return_period)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationThreshold {
    pub station_code: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// adm_level -> pcodes the station informs at that level.
    pub pcodes: HashMap<u8, Vec<String>>,
    pub thresholds: Vec<Threshold>,
}

impl StationThreshold {
    pub fn threshold(&self, return_period: f64) -> Result<f64, PipelineError> {
        threshold_value(&self.station_code, &self.thresholds, return_period)
    }
}

// ---------------------------------------------------------------------------
// Discharge
// ---------------------------------------------------------------------------

fn mean_of(ensemble: &[f64]) -> f64 {
    if ensemble.is_empty() {
        0.0
    } else {
        ensemble.iter().sum::<f64>() / ensemble.len() as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DischargeAdmin {
    pub adm_level: u8,
    pub pcode: String,
    pub lead_time: u8,
    pub ensemble: Vec<f64>,
    pub mean: f64,
}

impl DischargeAdmin {
    pub fn new(adm_level: u8, pcode: impl Into<String>, lead_time: u8, ensemble: Vec<f64>) -> Self {
        let mean = mean_of(&ensemble);
        Self { adm_level, pcode: pcode.into(), lead_time, ensemble, mean }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DischargeStation {
    pub station_code: String,
    pub lead_time: u8,
    pub ensemble: Vec<f64>,
    pub mean: f64,
}

impl DischargeStation {
    pub fn new(station_code: impl Into<String>, lead_time: u8, ensemble: Vec<f64>) -> Self {
        let mean = mean_of(&ensemble);
        Self { station_code: station_code.into(), lead_time, ensemble, mean }
    }
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Forecast {
    pub return_period: f64,
    pub likelihood: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastAdmin {
    pub adm_level: u8,
    pub pcode: String,
    pub lead_time: u8,
    pub forecasts: Vec<Forecast>,
    pub triggered: bool,
    pub return_period: f64,
    pub alert_class: AlertClass,
    pub pop_affected: u64,
    pub pop_affected_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastStation {
    pub station_code: String,
    pub lead_time: u8,
    pub forecasts: Vec<Forecast>,
    pub triggered: bool,
    pub return_period: f64,
    pub alert_class: AlertClass,
}

// ---------------------------------------------------------------------------
// Dataset containers
// ---------------------------------------------------------------------------

pub trait AdminUnit {
    fn pcode(&self) -> &str;
    fn adm_level(&self) -> u8;
    /// `None` for thresholds (not lead-time scoped), `Some(lt)` otherwise.
    fn lead_time(&self) -> Option<u8>;
}

pub trait StationUnit {
    fn station_code(&self) -> &str;
    fn lead_time(&self) -> Option<u8>;
}

macro_rules! impl_admin_unit {
    ($ty:ty, $lead_time:expr) => {
        impl AdminUnit for $ty {
            fn pcode(&self) -> &str {
                &self.pcode
            }
            fn adm_level(&self) -> u8 {
                self.adm_level
            }
            fn lead_time(&self) -> Option<u8> {
                $lead_time(self)
            }
        }
    };
}

macro_rules! impl_station_unit {
    ($ty:ty, $code_field:ident, $lead_time:expr) => {
        impl StationUnit for $ty {
            fn station_code(&self) -> &str {
                &self.$code_field
            }
            fn lead_time(&self) -> Option<u8> {
                $lead_time(self)
            }
        }
    };
}

impl_admin_unit!(AdminThreshold, |_: &AdminThreshold| None);
impl_admin_unit!(DischargeAdmin, |u: &DischargeAdmin| Some(u.lead_time));
impl_admin_unit!(ForecastAdmin, |u: &ForecastAdmin| Some(u.lead_time));

impl_station_unit!(StationThreshold, station_code, |_: &StationThreshold| None);
impl_station_unit!(DischargeStation, station_code, |u: &DischargeStation| Some(u.lead_time));
impl_station_unit!(ForecastStation, station_code, |u: &ForecastStation| Some(u.lead_time));

/// Generic admin-keyed dataset container. Uniqueness key is `(pcode, lead_time)`;
/// `upsert` replaces any existing unit with the same key.
#[derive(Debug, Clone)]
pub struct AdminDataset<U: AdminUnit> {
    pub country: String,
    pub timestamp: DateTime<Utc>,
    pub adm_levels: Vec<u8>,
    units: Vec<U>,
    index: HashMap<(String, Option<u8>), usize>,
}

impl<U: AdminUnit + Clone> AdminDataset<U> {
    pub fn new(country: impl Into<String>, timestamp: DateTime<Utc>, adm_levels: Vec<u8>) -> Self {
        Self {
            country: country.into(),
            timestamp,
            adm_levels,
            units: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn upsert(&mut self, unit: U) {
        let key = (unit.pcode().to_string(), unit.lead_time());
        match self.index.get(&key) {
            Some(&i) => self.units[i] = unit,
            None => {
                self.index.insert(key, self.units.len());
                self.units.push(unit);
            }
        }
    }

    pub fn get(&self, pcode: &str, lead_time: Option<u8>) -> Option<&U> {
        self.index
            .get(&(pcode.to_string(), lead_time))
            .map(|&i| &self.units[i])
    }

    pub fn list_by_lead_time(&self, lead_time: u8) -> Vec<&U> {
        self.units.iter().filter(|u| u.lead_time() == Some(lead_time)).collect()
    }

    pub fn list_by_adm_level(&self, adm_level: u8) -> Vec<&U> {
        self.units.iter().filter(|u| u.adm_level() == adm_level).collect()
    }

    pub fn units(&self) -> &[U] {
        &self.units
    }

    pub fn pcodes(&self) -> Vec<&str> {
        let set: HashSet<&str> = self.units.iter().map(|u| u.pcode()).collect();
        let mut v: Vec<&str> = set.into_iter().collect();
        v.sort_unstable();
        v
    }

    pub fn lead_times(&self) -> Vec<u8> {
        let set: HashSet<u8> = self.units.iter().filter_map(|u| u.lead_time()).collect();
        let mut v: Vec<u8> = set.into_iter().collect();
        v.sort_unstable();
        v
    }
}

impl AdminDataset<ForecastAdmin> {
    pub fn any_triggered(&self) -> bool {
        self.units().iter().any(|u| u.triggered)
    }
}

/// Generic station-keyed dataset container. Uniqueness key is
/// `(station_code, lead_time)`; `upsert` replaces any existing unit.
#[derive(Debug, Clone)]
pub struct StationDataset<U: StationUnit> {
    pub country: String,
    pub timestamp: DateTime<Utc>,
    units: Vec<U>,
    index: HashMap<(String, Option<u8>), usize>,
}

impl<U: StationUnit + Clone> StationDataset<U> {
    pub fn new(country: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            country: country.into(),
            timestamp,
            units: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn upsert(&mut self, unit: U) {
        let key = (unit.station_code().to_string(), unit.lead_time());
        match self.index.get(&key) {
            Some(&i) => self.units[i] = unit,
            None => {
                self.index.insert(key, self.units.len());
                self.units.push(unit);
            }
        }
    }

    pub fn get(&self, station_code: &str, lead_time: Option<u8>) -> Option<&U> {
        self.index
            .get(&(station_code.to_string(), lead_time))
            .map(|&i| &self.units[i])
    }

    pub fn list_by_lead_time(&self, lead_time: u8) -> Vec<&U> {
        self.units.iter().filter(|u| u.lead_time() == Some(lead_time)).collect()
    }

    pub fn list_for_station(&self, station_code: &str) -> Vec<&U> {
        self.units.iter().filter(|u| u.station_code() == station_code).collect()
    }

    pub fn units(&self) -> &[U] {
        &self.units
    }

    pub fn station_codes(&self) -> Vec<&str> {
        let set: HashSet<&str> = self.units.iter().map(|u| u.station_code()).collect();
        let mut v: Vec<&str> = set.into_iter().collect();
        v.sort_unstable();
        v
    }

    pub fn lead_times(&self) -> Vec<u8> {
        let set: HashSet<u8> = self.units.iter().filter_map(|u| u.lead_time()).collect();
        let mut v: Vec<u8> = set.into_iter().collect();
        v.sort_unstable();
        v
    }
}

impl StationDataset<ForecastStation> {
    pub fn any_triggered(&self) -> bool {
        self.units().iter().any(|u| u.triggered)
    }
}

pub type AdminThresholdDataset = AdminDataset<AdminThreshold>;
pub type DischargeAdminDataset = AdminDataset<DischargeAdmin>;
pub type ForecastAdminDataset = AdminDataset<ForecastAdmin>;
pub type StationThresholdDataset = StationDataset<StationThreshold>;
pub type DischargeStationDataset = StationDataset<DischargeStation>;
pub type ForecastStationDataset = StationDataset<ForecastStation>;
