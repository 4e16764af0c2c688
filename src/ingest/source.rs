//! The `ForecastSource` seam: retrieval of raw ensemble NetCDFs is an
//! out-of-scope external collaborator (FTP/object-store fetch), so `Ingest`
//! only depends on this trait.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::PipelineError;

/// Fetches one ensemble member's raw multi-band NetCDF
/// (`dis_{ee:02d}_{YYYYMMDD}00.nc`) and returns a local path to it.
///
/// Implementations own the FTP/object-store retrieval loop described in the
/// ingest contract: retry on "421 maximum number of connections" with a
/// short sleep, bounded by a 12-hour outer deadline. `Ingest` itself only
/// retries the call once on failure before giving up on that member.
pub trait ForecastSource: Send + Sync {
    fn fetch_ensemble_member(
        &self,
        country: &str,
        date: NaiveDate,
        ensemble: u32,
    ) -> Result<PathBuf, PipelineError>;
}

/// Serves pre-staged fixture files from a local directory, named
/// `{country}_{date}_{ensemble:02}.nc`. Used by the demonstration binary and
/// integration tests in place of the real FTP/object-store client.
pub struct FixtureForecastSource {
    root: PathBuf,
}

impl FixtureForecastSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, country: &str, date: NaiveDate, ensemble: u32) -> PathBuf {
        self.root.join(format!("{country}_{}_{ensemble:02}.nc", date.format("%Y%m%d")))
    }
}

impl ForecastSource for FixtureForecastSource {
    fn fetch_ensemble_member(&self, country: &str, date: NaiveDate, ensemble: u32) -> Result<PathBuf, PipelineError> {
        let path = self.path_for(country, date, ensemble);
        if path.exists() {
            Ok(path)
        } else {
            Err(PipelineError::SourceUnavailable(format!(
                "no fixture ensemble member at {}",
                path.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_source_reports_missing_member() {
        let source = FixtureForecastSource::new("/nonexistent/dir");
        let date = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        assert!(source.fetch_ensemble_member("PHL", date, 0).is_err());
    }
}
