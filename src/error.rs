//! Typed error taxonomy shared across pipeline stages.
//!
//! `raster::RasterError` is the one stage-local error type, converted at
//! the raster module boundary via `From`. `ingest` and `publish` construct
//! `PipelineError` variants directly rather than layering their own error
//! enum on top, since neither has call sites outside this crate that would
//! benefit from a narrower type.

use std::fmt;

/// Top-level error taxonomy. Variants are grouped by the categories in the
/// error handling design: configuration, input, transient I/O, and publisher.
#[derive(Debug)]
pub enum PipelineError {
    // --- Configuration: fatal for the country ---
    ConfigMissing(String),
    PolicyInvalid(String),
    ThresholdMissing { key: String, return_period: f64 },

    // --- Input: some recoverable, some fatal ---
    SourceUnavailable(String),
    EnsembleDropped { key: String, lead_time: u8, found: usize, expected: usize },
    AdminLevelMissing(u8),
    BoundaryMissing(String),

    // --- Transient I/O: retried with backoff upstream, fatal once budget is spent ---
    RetryableIo(String),

    // --- Publisher: fatal, aborts the country before events/process ---
    DownstreamRejected { status: u16, body: String },
}

impl PipelineError {
    /// Whether this error aborts the current country's run outright, versus
    /// being logged and allowing the stage to continue with reduced data.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::EnsembleDropped { .. } | PipelineError::AdminLevelMissing(_) => false,
            _ => true,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::ConfigMissing(what) => {
                write!(f, "configuration missing: {what}")
            }
            PipelineError::PolicyInvalid(why) => {
                write!(f, "country policy is invalid: {why}")
            }
            PipelineError::ThresholdMissing { key, return_period } => write!(
                f,
                "no threshold defined for return period {return_period} on {key}"
            ),
            PipelineError::SourceUnavailable(what) => {
                write!(f, "forecast source unavailable: {what}")
            }
            PipelineError::EnsembleDropped { key, lead_time, found, expected } => write!(
                f,
                "ensemble for {key} at lead_time={lead_time} has {found}/{expected} members, dropping the missing ones"
            ),
            PipelineError::AdminLevelMissing(level) => {
                write!(f, "country has no admin level {level} configured")
            }
            PipelineError::BoundaryMissing(pcode) => {
                write!(f, "no boundary geometry loaded for pcode {pcode}")
            }
            PipelineError::RetryableIo(what) => {
                write!(f, "transient I/O failure: {what}")
            }
            PipelineError::DownstreamRejected { status, body } => write!(
                f,
                "downstream publisher rejected the request (status {status}): {body}"
            ),
        }
    }
}

impl std::error::Error for PipelineError {}
