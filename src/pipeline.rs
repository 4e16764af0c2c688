//! Pipeline: the per-country supervisor that wires `Ingest`, `ForecastEngine`,
//! `ExtentBuilder`, `ExposureCalc`, and `Publisher` into one run (spec §5/§7).
//!
//! Mirrors the reference `Daemon`'s shape: collaborators are owned fields,
//! `run_country` is the single-station equivalent of `poll_station`, and
//! `run_all` is `poll_all_stations`'s per-country fan-out with the same
//! isolate-one-failure-don't-abort-the-rest behavior.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::cancel::CancellationToken;
use crate::config::{CountryPolicy, CountryPolicyRegistry};
use crate::engine::ForecastEngine;
use crate::error::PipelineError;
use crate::exposure::ExposureCalc;
use crate::extent::{ExtentBuilder, FloodMapSet};
use crate::geometry::AdminBoundarySet;
use crate::ingest::{BlobStore, ForecastSource, Ingest, WorkingDir};
use crate::model::AdminThresholdDataset;
use crate::publish::{publish_country, Publisher};
use crate::raster::Grid;
use crate::threshold_store::ThresholdStore;

/// Blob key conventions for the collaborators out of scope here (a
/// threshold-derivation job, a boundary/population warehouse): one JSON
/// batch per country for thresholds, one GeoJSON per admin level for
/// boundaries, one GeoTIFF for population, one GeoTIFF per return period
/// for the global flood maps.
mod blob_keys {
    pub fn admin_thresholds(country: &str) -> String {
        format!("{country}/thresholds/admin.json")
    }
    pub fn station_thresholds(country: &str) -> String {
        format!("{country}/thresholds/station.json")
    }
    pub fn boundaries(country: &str, adm_level: u8) -> String {
        format!("{country}/boundaries/adm{adm_level}.geojson")
    }
    pub fn population(country: &str) -> String {
        format!("{country}/population.tif")
    }
    pub fn flood_map(country: &str, return_period: f64) -> String {
        format!("{country}/flood-maps/rp{return_period:.0}.tif")
    }
}

pub struct Pipeline {
    policies: CountryPolicyRegistry,
    thresholds: ThresholdStore,
    blob_store: Arc<dyn BlobStore>,
    ingest: Ingest,
    publisher: Arc<dyn Publisher>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        policies: CountryPolicyRegistry,
        blob_store: Arc<dyn BlobStore>,
        source: Arc<dyn ForecastSource>,
        working_dir: WorkingDir,
        publisher: Arc<dyn Publisher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            policies,
            thresholds: ThresholdStore::new(),
            blob_store,
            ingest: Ingest::new(source, working_dir),
            publisher,
            cancel,
        }
    }

    fn load_boundaries(&self, policy: &CountryPolicy) -> Result<HashMap<u8, AdminBoundarySet>, PipelineError> {
        let mut out = HashMap::new();
        for &adm_level in &policy.admin_levels {
            let bytes = self.blob_store.get(&blob_keys::boundaries(&policy.country, adm_level))?;
            out.insert(adm_level, AdminBoundarySet::from_geojson(adm_level, &bytes)?);
        }
        Ok(out)
    }

    fn load_population(&self, policy: &CountryPolicy) -> Result<Grid, PipelineError> {
        let bytes = self.blob_store.get(&blob_keys::population(&policy.country))?;
        Grid::from_geotiff_bytes(&bytes)
            .map_err(|e| PipelineError::ConfigMissing(format!("decoding population raster for {}: {e}", policy.country)))
    }

    /// Loads one global flood map per distinct return period the country's
    /// admin thresholds reference (spec §4.4: the rasters the trigger
    /// return periods actually index into).
    fn load_flood_maps(&self, policy: &CountryPolicy, admin_thresholds: &AdminThresholdDataset) -> Result<FloodMapSet, PipelineError> {
        let mut return_periods: Vec<f64> = admin_thresholds
            .units()
            .iter()
            .flat_map(|u| u.thresholds.iter().map(|t| t.return_period))
            .collect();
        return_periods.sort_by(|a, b| a.partial_cmp(b).expect("return periods are not NaN"));
        return_periods.dedup();

        let mut rasters = Vec::with_capacity(return_periods.len());
        for return_period in return_periods {
            let key = blob_keys::flood_map(&policy.country, return_period);
            let bytes = self.blob_store.get(&key)?;
            let grid = Grid::from_geotiff_bytes(&bytes)
                .map_err(|e| PipelineError::ConfigMissing(format!("decoding flood map {key}: {e}")))?;
            rasters.push((return_period, grid));
        }
        FloodMapSet::new(rasters)
    }

    /// Runs the full pipeline for one country and publishes the result.
    /// Returns early without publishing if `cancel` fires before the
    /// publish stage.
    pub fn run_country(&mut self, country: &str, date: NaiveDate, timestamp: DateTime<Utc>) -> Result<(), PipelineError> {
        let policy = self.policies.get(country)?.clone();
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let admin_json = self.blob_store.get(&blob_keys::admin_thresholds(country))?;
        let station_json = self.blob_store.get(&blob_keys::station_thresholds(country))?;
        self.thresholds.load_country(country, &admin_json, &station_json, policy.admin_levels.clone())?;

        let boundaries = self.load_boundaries(&policy)?;
        for station in self.thresholds.get_station_thresholds(country)?.units() {
            for (&adm_level, pcodes) in &station.pcodes {
                if let Some(boundary_set) = boundaries.get(&adm_level) {
                    boundary_set.validate_pcodes(pcodes)?;
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let (discharge_admin, discharge_station) =
            self.ingest.run(&policy, date, &boundaries, self.thresholds.get_station_thresholds(country)?)?;

        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let admin_thresholds = self.thresholds.get_admin_thresholds(country)?;
        let mut forecast_admin = ForecastEngine::run_admin(&discharge_admin, admin_thresholds, &policy)?;
        let forecast_station =
            ForecastEngine::run_station(&discharge_station, self.thresholds.get_station_thresholds(country)?, &policy)?;

        if self.cancel.is_cancelled() {
            return Ok(());
        }

        let flood_maps = self.load_flood_maps(&policy, admin_thresholds)?;
        let deepest_level = policy.deepest_admin_level().expect("admin_levels validated non-empty at config load");
        let deepest_boundaries = boundaries
            .get(&deepest_level)
            .ok_or(PipelineError::AdminLevelMissing(deepest_level))?;
        let extents = ExtentBuilder::build(&forecast_admin, deepest_boundaries, &flood_maps)?;

        let population = self.load_population(&policy)?;
        ExposureCalc::apply(&mut forecast_admin, &extents, &population, &boundaries, policy.minimum_flood_depth)?;

        if self.cancel.is_cancelled() {
            return Ok(());
        }

        publish_country(
            self.publisher.as_ref(),
            &policy,
            &forecast_admin,
            &forecast_station,
            &discharge_station,
            self.thresholds.get_station_thresholds(country)?,
            &extents,
            timestamp,
            &self.cancel,
        )
    }

    /// Runs every configured country, isolating one country's failure from
    /// the rest (mirrors the reference `poll_all_stations`'s
    /// continue-on-error loop).
    pub fn run_all(&mut self, date: NaiveDate, timestamp: DateTime<Utc>) -> HashMap<String, Result<(), PipelineError>> {
        let countries: Vec<String> = self.policies.countries().map(|c| c.to_string()).collect();
        let mut results = HashMap::with_capacity(countries.len());

        for country in countries {
            if self.cancel.is_cancelled() {
                println!("⏹ cancellation requested, stopping before {country}");
                break;
            }
            println!("▶ running pipeline for {country}");
            let result = self.run_country(&country, date, timestamp);
            match &result {
                Ok(()) => println!("✓ {country} published"),
                Err(e) => eprintln!("✗ {country} failed: {e} (fatal={})", e.is_fatal()),
            }
            results.insert(country, result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_country_reports_missing_policy() {
        let policies = CountryPolicyRegistry::load_str("").unwrap();
        let mut pipeline = Pipeline::new(
            policies,
            Arc::new(crate::ingest::InMemoryBlobStore::new()),
            Arc::new(crate::ingest::FixtureForecastSource::new("/nonexistent")),
            WorkingDir::new("/tmp/glofas-pipeline-test"),
            Arc::new(crate::publish::LoggingPublisher::new()),
            CancellationToken::new(),
        );
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let result = pipeline.run_country("ZZZ", date, Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn run_country_short_circuits_when_cancelled_before_start() {
        let policies = CountryPolicyRegistry::load_str(
            r#"
            [countries.PHL]
            admin-levels = [1]
            trigger-on-lead-time = 3
            trigger-on-return-period = 5.0
            trigger-on-minimum-probability = 0.5
            classify-alert-on = "return-period"
            alert-on-return-period = { min = 2.0 }
            alert-on-minimum-probability = 0.5
            no_ensemble_members = 2
            bbox = [116.0, 4.0, 127.0, 21.0]
            "#,
        )
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut pipeline = Pipeline::new(
            policies,
            Arc::new(crate::ingest::InMemoryBlobStore::new()),
            Arc::new(crate::ingest::FixtureForecastSource::new("/nonexistent")),
            WorkingDir::new("/tmp/glofas-pipeline-test"),
            Arc::new(crate::publish::LoggingPublisher::new()),
            cancel,
        );
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        assert!(pipeline.run_country("PHL", date, Utc::now()).is_ok());
    }
}
