/// glofas_pipeline: river-flood early-warning pipeline.
///
/// # Module structure
///
/// ```
/// glofas_pipeline
/// ├── error           — PipelineError, the single error type crossing module boundaries
/// ├── model           — shared domain types (thresholds, discharge, forecasts, datasets)
/// ├── geometry        — admin boundary GeoJSON parsing, bounding boxes
/// ├── config          — per-country policy loader (country-policy.toml)
/// ├── threshold_store — per-admin/per-station return-period threshold batches
/// ├── raster          — GDAL-backed raster grid: NetCDF/GeoTIFF I/O, zonal stats, merges
/// ├── ingest
/// │   ├── source      — ForecastSource: raw ensemble NetCDF retrieval
/// │   ├── blob_store  — BlobStore: thresholds/boundaries/population/flood-map bytes
/// │   └── netcdf      — Ingest: per-country ensemble slicing and reduction
/// ├── engine
/// │   ├── likelihood  — ensemble -> per-threshold exceedance likelihood
/// │   ├── alert       — trigger/alert classification state machine
/// │   └── events      — per-station event derivation
/// ├── extent          — ExtentBuilder: per-lead-time flood-extent raster composition
/// ├── exposure        — ExposureCalc: per-admin population-affected numbers
/// ├── cancel          — CancellationToken
/// ├── publish
/// │   ├── payloads    — downstream REST wire payloads
/// │   └── client      — Publisher trait, HttpPublisher, LoggingPublisher
/// └── pipeline        — Pipeline: per-country supervisor wiring everything together
/// ```
pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod exposure;
pub mod extent;
pub mod geometry;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod raster;
pub mod threshold_store;
