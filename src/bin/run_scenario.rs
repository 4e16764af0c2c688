//! Demonstration harness: scripts one station event end-to-end through an
//! in-memory pipeline and prints what would have been published. Mirrors
//! the reference project's `run_scenario` command-line tool, minus the
//! click option parsing and the real blob-storage log upload at the end.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use gdal::raster::{Buffer, RasterCreationOption};
use gdal::DriverManager;

use glofas_pipeline::cancel::CancellationToken;
use glofas_pipeline::config::CountryPolicyRegistry;
use glofas_pipeline::ingest::{FixtureForecastSource, InMemoryBlobStore, WorkingDir};
use glofas_pipeline::model::MAX_LEAD_TIME;
use glofas_pipeline::pipeline::Pipeline;
use glofas_pipeline::publish::LoggingPublisher;
use glofas_pipeline::raster::Grid;

const COUNTRY: &str = "DEMO";
const PCODE: &str = "DM1";
const STATION: &str = "G5100";
const TRIGGER_LEAD_TIME: u8 = 5;
const NO_ENSEMBLE_MEMBERS: u32 = 4;

fn country_policy_toml() -> String {
    format!(
        r#"
        [countries.{COUNTRY}]
        admin-levels = [1]
        trigger-on-lead-time = 3
        trigger-on-return-period = 5.0
        trigger-on-minimum-probability = 0.5
        classify-alert-on = "return-period"
        alert-on-return-period = {{ min = 2.0, med = 5.0, max = 10.0 }}
        alert-on-minimum-probability = 0.5
        no_ensemble_members = {NO_ENSEMBLE_MEMBERS}
        minimum_flood_depth = 0.1
        bbox = [0.0, 0.0, 4.0, 4.0]
        "#
    )
}

fn boundary_geojson() -> String {
    format!(
        r#"{{"type":"FeatureCollection","features":[{{"type":"Feature","properties":{{"ADM1_PCODE":"{PCODE}"}},"geometry":{{"type":"Polygon","coordinates":[[[0.0,0.0],[0.0,4.0],[4.0,4.0],[4.0,0.0],[0.0,0.0]]]}}}}]}}"#
    )
}

fn admin_thresholds_json() -> String {
    format!(
        r#"[{{"adm_level": 1, "pcode": "{PCODE}", "thresholds": [
            {{"return_period": 2.0, "value": 10.0}},
            {{"return_period": 5.0, "value": 20.0}},
            {{"return_period": 10.0, "value": 30.0}}
        ]}}]"#
    )
}

fn station_thresholds_json() -> String {
    format!(
        r#"[{{"station_code": "{STATION}", "name": "Demo Gate", "lat": 2.0, "lon": 2.0,
            "pcodes": {{"1": ["{PCODE}"]}},
            "thresholds": [
                {{"return_period": 2.0, "value": 10.0}},
                {{"return_period": 5.0, "value": 20.0}},
                {{"return_period": 10.0, "value": 30.0}}
            ]}}]"#
    )
}

fn template_grid(fill: f64) -> Grid {
    Grid {
        width: 4,
        height: 4,
        geo_transform: [0.0, 1.0, 0.0, 4.0, 0.0, -1.0],
        projection_wkt: "EPSG:4326".to_string(),
        nodata: -9999.0,
        data: vec![fill; 16],
    }
}

/// Writes a `MAX_LEAD_TIME`-band GeoTIFF standing in for one ensemble
/// member's raw multi-band NetCDF (`dis_{ee}_{date}00.nc`): GDAL identifies
/// drivers by content, not extension, so a `.nc`-named GeoTIFF opens the
/// same way the real download would.
fn write_ensemble_member(path: &std::path::Path, per_lead_time_value: &[f64]) {
    let driver = DriverManager::get_driver_by_name("GTiff").expect("GTiff driver available");
    let options = [RasterCreationOption { key: "COMPRESS", value: "LZW" }];
    let mut dataset = driver
        .create_with_band_type_with_options::<f64, _>(path, 4, 4, per_lead_time_value.len() as isize, &options)
        .expect("create fixture raster");
    dataset.set_geo_transform(&[0.0, 1.0, 0.0, 4.0, 0.0, -1.0]).unwrap();
    dataset.set_projection("EPSG:4326").unwrap();
    for (i, &value) in per_lead_time_value.iter().enumerate() {
        let mut band = dataset.rasterband((i + 1) as isize).unwrap();
        band.set_no_data_value(Some(-9999.0)).unwrap();
        let mut buffer = Buffer::new((4, 4), vec![value; 16]);
        band.write((0, 0), (4, 4), &mut buffer).unwrap();
    }
}

fn main() {
    println!("glofas-pipeline demonstration scenario");
    println!("scripted event: station {STATION} trigger at lead time {TRIGGER_LEAD_TIME}");

    let working_root = std::env::temp_dir().join(format!("glofas-demo-{}", std::process::id()));
    let fixture_root = working_root.join("fixtures");
    std::fs::create_dir_all(&fixture_root).expect("create fixture dir");

    let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
    // Every lead time stays below the min threshold (10.0) except the
    // scripted trigger lead time, which clears the max threshold (30.0).
    for ensemble in 0..NO_ENSEMBLE_MEMBERS {
        let per_lead_time_value: Vec<f64> = (1..=MAX_LEAD_TIME)
            .map(|lt| if lt == TRIGGER_LEAD_TIME { 35.0 } else { 5.0 })
            .collect();
        let path = fixture_root.join(format!("{COUNTRY}_{}_{ensemble:02}.nc", date.format("%Y%m%d")));
        write_ensemble_member(&path, &per_lead_time_value);
    }

    let blob_store = Arc::new(InMemoryBlobStore::new());
    blob_store.seed(format!("{COUNTRY}/boundaries/adm1.geojson"), boundary_geojson().into_bytes());
    blob_store.seed(format!("{COUNTRY}/thresholds/admin.json"), admin_thresholds_json().into_bytes());
    blob_store.seed(format!("{COUNTRY}/thresholds/station.json"), station_thresholds_json().into_bytes());

    let population = template_grid(100.0).to_geotiff_bytes().expect("encode population raster");
    blob_store.seed(format!("{COUNTRY}/population.tif"), population);

    for return_period in [2.0, 5.0, 10.0] {
        let bytes = template_grid(return_period).to_geotiff_bytes().expect("encode flood map");
        blob_store.seed(format!("{COUNTRY}/flood-maps/rp{return_period:.0}.tif"), bytes);
    }

    let policies = CountryPolicyRegistry::load_str(&country_policy_toml()).expect("load demo policy");
    let source = Arc::new(FixtureForecastSource::new(fixture_root));
    let working_dir = WorkingDir::new(working_root.join("working"));
    let publisher = Arc::new(LoggingPublisher::new());
    let cancel = CancellationToken::new();

    let mut pipeline = Pipeline::new(policies, blob_store, source, working_dir, publisher.clone(), cancel);

    match pipeline.run_country(COUNTRY, date, Utc::now()) {
        Ok(()) => println!(
            "done: {} exposure posts, {} alert posts, {} point-dynamic posts, {} rasters, {} events/process calls",
            publisher.exposures.lock().unwrap().len(),
            publisher.alerts.lock().unwrap().len(),
            publisher.point_dynamics.lock().unwrap().len(),
            publisher.rasters.lock().unwrap().len(),
            publisher.events_processed.lock().unwrap().len(),
        ),
        Err(e) => eprintln!("scenario failed: {e}"),
    }
}
