//! Ingest: per-country ensemble slicing and reduction (spec §4.1).

pub mod blob_store;
pub mod netcdf;
pub mod source;

pub use blob_store::{BlobStore, FsBlobStore, InMemoryBlobStore};
pub use netcdf::{Ingest, WorkingDir};
pub use source::{FixtureForecastSource, ForecastSource};
