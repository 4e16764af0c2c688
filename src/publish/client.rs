//! `Publisher` trait and its two implementations: `HttpPublisher` (the real
//! downstream REST client) and `LoggingPublisher` (a network-free test
//! double), following the reference daemon's pattern of keeping HTTP
//! construction isolated behind a small surface so tests don't need a live
//! server.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::error::PipelineError;
use crate::publish::payloads::{AlertsPerLeadTimePayload, EventsProcessPayload, ExposurePayload, PointDynamicPayload};

pub trait Publisher {
    fn post_exposure(&self, payload: &ExposurePayload) -> Result<(), PipelineError>;
    fn post_point_dynamic(&self, payload: &PointDynamicPayload) -> Result<(), PipelineError>;
    fn post_alerts_per_lead_time(&self, payload: &AlertsPerLeadTimePayload) -> Result<(), PipelineError>;
    fn post_raster(&self, country: &str, lead_time: u8, bytes: &[u8]) -> Result<(), PipelineError>;
    fn post_events_process(&self, payload: &EventsProcessPayload) -> Result<(), PipelineError>;
}

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);

/// Sends one request, retrying connect-class failures and 5xx/401 with
/// exponential backoff (spec §5 "Retries"). 4xx other than 401 is fatal
/// immediately.
fn send_with_retry(mut attempt_request: impl FnMut() -> reqwest::Result<reqwest::blocking::Response>) -> Result<(), PipelineError> {
    let mut attempt = 0;
    loop {
        match attempt_request() {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(());
                }
                let retryable = status.as_u16() == 401 || status.is_server_error();
                if !retryable || attempt >= MAX_RETRIES {
                    let body = response.text().unwrap_or_default();
                    return Err(PipelineError::DownstreamRejected { status: status.as_u16(), body });
                }
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    return Err(PipelineError::RetryableIo(e.to_string()));
                }
            }
        }
        std::thread::sleep(BASE_DELAY * 2u32.pow(attempt));
        attempt += 1;
    }
}

/// Blocking HTTP client for the downstream alerting API. The bearer token is
/// supplied at construction; loading it from the environment or a secrets
/// file is the out-of-scope external collaborator's job.
pub struct HttpPublisher {
    base_url: String,
    token: String,
    client: reqwest::blocking::Client,
}

impl HttpPublisher {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), token: token.into(), client: reqwest::blocking::Client::new() }
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<(), PipelineError> {
        let url = format!("{}/{path}", self.base_url.trim_end_matches('/'));
        send_with_retry(|| self.client.post(&url).bearer_auth(&self.token).json(body).send())
    }
}

impl Publisher for HttpPublisher {
    fn post_exposure(&self, payload: &ExposurePayload) -> Result<(), PipelineError> {
        self.post_json("admin-area-dynamic-data/exposure", payload)
    }

    fn post_point_dynamic(&self, payload: &PointDynamicPayload) -> Result<(), PipelineError> {
        self.post_json("point-data/dynamic", payload)
    }

    fn post_alerts_per_lead_time(&self, payload: &AlertsPerLeadTimePayload) -> Result<(), PipelineError> {
        self.post_json("event/alerts-per-lead-time", payload)
    }

    fn post_raster(&self, country: &str, lead_time: u8, bytes: &[u8]) -> Result<(), PipelineError> {
        let filename = format!("{country}_leadtime{lead_time}.tif");
        let url = format!("{}/admin-area-dynamic-data/raster/floods", self.base_url.trim_end_matches('/'));
        send_with_retry(|| {
            let part = reqwest::blocking::multipart::Part::bytes(bytes.to_vec()).file_name(filename.clone());
            let form = reqwest::blocking::multipart::Form::new().part("file", part);
            self.client.post(&url).bearer_auth(&self.token).multipart(form).send()
        })
    }

    fn post_events_process(&self, payload: &EventsProcessPayload) -> Result<(), PipelineError> {
        self.post_json("events/process", payload)
    }
}

/// Records every call for assertions in integration tests, without a
/// network dependency.
#[derive(Default)]
pub struct LoggingPublisher {
    pub exposures: Mutex<Vec<ExposurePayload>>,
    pub point_dynamics: Mutex<Vec<PointDynamicPayload>>,
    pub alerts: Mutex<Vec<AlertsPerLeadTimePayload>>,
    pub rasters: Mutex<Vec<(String, u8, usize)>>,
    pub events_processed: Mutex<Vec<EventsProcessPayload>>,
}

impl LoggingPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Publisher for LoggingPublisher {
    fn post_exposure(&self, payload: &ExposurePayload) -> Result<(), PipelineError> {
        println!(
            "→ exposure {} lt={} indicator={} adminLevel={}",
            payload.country_code_iso3, payload.lead_time, payload.dynamic_indicator, payload.admin_level
        );
        self.exposures.lock().unwrap().push(payload.clone());
        Ok(())
    }

    fn post_point_dynamic(&self, payload: &PointDynamicPayload) -> Result<(), PipelineError> {
        println!("→ point-dynamic {} key={} lt={}", payload.country_code_iso3, payload.key, payload.lead_time);
        self.point_dynamics.lock().unwrap().push(payload.clone());
        Ok(())
    }

    fn post_alerts_per_lead_time(&self, payload: &AlertsPerLeadTimePayload) -> Result<(), PipelineError> {
        println!("→ alerts-per-lead-time {} event={}", payload.country_code_iso3, payload.event_name);
        self.alerts.lock().unwrap().push(payload.clone());
        Ok(())
    }

    fn post_raster(&self, country: &str, lead_time: u8, bytes: &[u8]) -> Result<(), PipelineError> {
        println!("→ raster {country} lt={lead_time} ({} bytes)", bytes.len());
        self.rasters.lock().unwrap().push((country.to_string(), lead_time, bytes.len()));
        Ok(())
    }

    fn post_events_process(&self, payload: &EventsProcessPayload) -> Result<(), PipelineError> {
        println!("→ events/process {}", payload.country_code_iso3);
        self.events_processed.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_publisher_records_every_call() {
        let publisher = LoggingPublisher::new();
        publisher
            .post_events_process(&EventsProcessPayload {
                country_code_iso3: "PHL".into(),
                disaster_type: "floods".into(),
                date: "2026-07-01T00:00:00Z".into(),
            })
            .unwrap();
        assert_eq!(publisher.events_processed.lock().unwrap().len(), 1);
    }
}
