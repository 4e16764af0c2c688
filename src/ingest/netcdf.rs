//! Ensemble NetCDF slicing and zonal/point reduction (spec §4.1).
//!
//! Slicing fans out across a `threadpool::ThreadPool`, mirroring the
//! reference service's use of `threadpool` for parallel station polling;
//! results come back over an mpsc channel tagged with their ensemble index
//! and are re-sorted before folding into the ensemble vectors, so the
//! output is independent of completion order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use chrono::NaiveDate;
use threadpool::ThreadPool;

use crate::config::CountryPolicy;
use crate::error::PipelineError;
use crate::geometry::AdminBoundarySet;
use crate::ingest::source::ForecastSource;
use crate::model::{
    DischargeAdmin, DischargeAdminDataset, DischargeStation, DischargeStationDataset,
};
use crate::model::{AdminDataset, StationDataset};
use crate::model::{StationThresholdDataset, MAX_LEAD_TIME};
use crate::raster::Grid;

/// Per-(country, date) scoped filesystem scratch space for sliced rasters.
pub struct WorkingDir {
    root: PathBuf,
}

impl WorkingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn sliced_path(&self, country: &str, date: NaiveDate, ensemble: u32, lead_time: u8) -> PathBuf {
        self.root.join(country).join(date.format("%Y%m%d").to_string()).join(format!("ens{ensemble:02}_lt{lead_time}.tif"))
    }
}

/// Opens the raw NetCDF at `raw_path`, slices band `lead_time` to `policy`'s
/// bbox, and writes the result to the working-directory cache path,
/// returning the sliced grid either way.
fn slice_one_lead_time(
    working_dir: &WorkingDir,
    raw_path: &Path,
    country: &str,
    date: NaiveDate,
    ensemble: u32,
    lead_time: u8,
    policy: &CountryPolicy,
) -> Result<Grid, PipelineError> {
    let cache_path = working_dir.sliced_path(country, date, ensemble, lead_time);
    if cache_path.exists() {
        return Grid::read_band(&cache_path, 1)
            .map_err(|e| PipelineError::RetryableIo(format!("reading cached slice {}: {e}", cache_path.display())));
    }

    let raw = Grid::read_band(raw_path, lead_time as usize)
        .map_err(|e| PipelineError::SourceUnavailable(format!("opening {}: {e}", raw_path.display())))?;
    let sliced = raw.slice_to_bbox(policy.bbox);
    let _ = sliced.write_geotiff(&cache_path); // best-effort cache; a write failure does not invalidate the slice
    Ok(sliced)
}

/// Attempts to fetch and fully slice one ensemble member (all lead times).
/// A failed fetch is retried once (spec §9 decision); two failures produce
/// `EnsembleDropped` for the whole member.
fn slice_member(
    source: &dyn ForecastSource,
    working_dir: &WorkingDir,
    country: &str,
    date: NaiveDate,
    ensemble: u32,
    policy: &CountryPolicy,
) -> Result<Vec<Grid>, PipelineError> {
    let raw_path = source
        .fetch_ensemble_member(country, date, ensemble)
        .or_else(|_| source.fetch_ensemble_member(country, date, ensemble))
        .map_err(|_| PipelineError::EnsembleDropped {
            key: country.to_string(),
            lead_time: 0,
            found: 0,
            expected: policy.no_ensemble_members as usize,
        })?;

    (1..=MAX_LEAD_TIME)
        .map(|lead_time| slice_one_lead_time(working_dir, &raw_path, country, date, ensemble, lead_time, policy))
        .collect()
}

/// Slices every ensemble member in parallel and returns the per-ensemble
/// grids in ensemble-index order; members that could not be retrieved twice
/// are omitted and logged.
fn slice_all_members(
    source: Arc<dyn ForecastSource>,
    working_dir: Arc<WorkingDir>,
    country: &str,
    date: NaiveDate,
    policy: &CountryPolicy,
) -> Vec<(u32, Vec<Grid>)> {
    let pool = ThreadPool::new(num_cpus());
    let (tx, rx) = mpsc::channel();

    for ensemble in 0..policy.no_ensemble_members {
        let source = Arc::clone(&source);
        let working_dir = Arc::clone(&working_dir);
        let country = country.to_string();
        let policy = policy.clone();
        let tx = tx.clone();
        pool.execute(move || {
            let result = slice_member(source.as_ref(), working_dir.as_ref(), &country, date, ensemble, &policy);
            tx.send((ensemble, result)).expect("receiver outlives the pool");
        });
    }
    drop(tx);

    let mut results: Vec<(u32, Result<Vec<Grid>, PipelineError>)> = rx.into_iter().collect();
    results.sort_by_key(|(ensemble, _)| *ensemble);

    results
        .into_iter()
        .filter_map(|(ensemble, result)| match result {
            Ok(grids) => Some((ensemble, grids)),
            Err(e) => {
                eprintln!("⚠ dropping ensemble member {ensemble} for {country}: {e}");
                None
            }
        })
        .collect()
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

/// Reduces sliced ensemble grids to `DischargeAdminDataset` and
/// `DischargeStationDataset` for one country/date (spec §4.1 steps 2-3).
pub struct Ingest {
    source: Arc<dyn ForecastSource>,
    working_dir: Arc<WorkingDir>,
}

impl Ingest {
    pub fn new(source: Arc<dyn ForecastSource>, working_dir: WorkingDir) -> Self {
        Self { source, working_dir: Arc::new(working_dir) }
    }

    pub fn run(
        &self,
        policy: &CountryPolicy,
        date: NaiveDate,
        boundaries: &HashMap<u8, AdminBoundarySet>,
        stations: &StationThresholdDataset,
    ) -> Result<(DischargeAdminDataset, DischargeStationDataset), PipelineError> {
        let members = slice_all_members(
            Arc::clone(&self.source),
            Arc::clone(&self.working_dir),
            &policy.country,
            date,
            policy,
        );
        if members.is_empty() {
            return Err(PipelineError::SourceUnavailable(format!(
                "no ensemble members available for {}",
                policy.country
            )));
        }

        let mut admin_dataset: DischargeAdminDataset =
            AdminDataset::new(&policy.country, chrono::Utc::now(), policy.admin_levels.clone());
        for &adm_level in &policy.admin_levels {
            let Some(boundary_set) = boundaries.get(&adm_level) else {
                eprintln!("⚠ {}: no boundary set loaded for admin level {adm_level}", policy.country);
                continue;
            };
            for &pcode in &boundary_set.pcodes() {
                let polygon = boundary_set.get(pcode)?;
                for lead_time in 1..=MAX_LEAD_TIME {
                    let ensemble: Vec<f64> = members
                        .iter()
                        .map(|(_, grids)| grids[(lead_time - 1) as usize].zonal_max(polygon).unwrap_or(0.0))
                        .collect();
                    admin_dataset.upsert(DischargeAdmin::new(adm_level, pcode, lead_time, ensemble));
                }
            }
        }

        let mut station_dataset: DischargeStationDataset = StationDataset::new(&policy.country, chrono::Utc::now());
        for station in stations.units() {
            for lead_time in 1..=MAX_LEAD_TIME {
                let ensemble: Vec<f64> = members
                    .iter()
                    .map(|(_, grids)| grids[(lead_time - 1) as usize].sample_point(station.lon, station.lat))
                    .collect();
                station_dataset.upsert(DischargeStation::new(&station.station_code, lead_time, ensemble));
            }
        }

        Ok((admin_dataset, station_dataset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sliced_path_is_scoped_by_country_date_ensemble_lead_time() {
        let working_dir = WorkingDir::new("/tmp/glofas-test");
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let path = working_dir.sliced_path("PHL", date, 3, 2);
        assert_eq!(path, PathBuf::from("/tmp/glofas-test/PHL/20260701/ens03_lt2.tif"));
    }
}
