//! Withings provider integration.
//!
//! Talks to the Withings measure API (`/measure?action=getmeas`) and maps the
//! numeric measurement type codes onto canonical metrics. Withings wraps its
//! real status in the JSON envelope, so both the HTTP status and the envelope
//! status are inspected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::providers::trait_::{
    CanonicalMetric, FetchWindow, ProviderError, ProviderMeasurement, WearableProvider,
};

/// Withings envelope status: request succeeded
const WITHINGS_STATUS_OK: i64 = 0;
/// Withings envelope status: token invalid or expired
const WITHINGS_STATUS_UNAUTHORIZED: i64 = 401;
/// Withings envelope status: rate limited
const WITHINGS_STATUS_RATE_LIMITED: i64 = 601;

/// Withings measure API provider
pub struct WithingsProvider {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct MeasureResponse {
    status: i64,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    body: Option<MeasureBody>,
}

#[derive(Debug, Deserialize)]
struct MeasureBody {
    #[serde(default)]
    measuregrps: Vec<MeasureGroup>,
}

#[derive(Debug, Deserialize)]
struct MeasureGroup {
    date: i64,
    #[serde(default)]
    measures: Vec<Measure>,
}

#[derive(Debug, Deserialize)]
struct Measure {
    value: i64,
    unit: i32,
    #[serde(rename = "type")]
    kind: i32,
}

impl WithingsProvider {
    pub fn new(client: reqwest::Client, api_base: String) -> Self {
        Self { client, api_base }
    }
}

/// Map a Withings measurement type code to a canonical metric
fn map_measure_type(code: i32) -> Option<CanonicalMetric> {
    match code {
        1 => Some(CanonicalMetric::Weight),
        5 => Some(CanonicalMetric::FatFreeMass),
        6 => Some(CanonicalMetric::FatRatio),
        8 => Some(CanonicalMetric::FatMass),
        76 => Some(CanonicalMetric::MuscleMass),
        77 => Some(CanonicalMetric::Hydration),
        88 => Some(CanonicalMetric::BoneMass),
        _ => None,
    }
}

/// Withings encodes values as `value * 10^unit`
fn scale_value(value: i64, unit: i32) -> f64 {
    (value as f64) * 10f64.powi(unit)
}

fn map_envelope_status(status: i64, error: Option<String>) -> ProviderError {
    let details = error.unwrap_or_else(|| format!("withings status {}", status));
    match status {
        WITHINGS_STATUS_UNAUTHORIZED => ProviderError::Unauthorized { details },
        WITHINGS_STATUS_RATE_LIMITED => ProviderError::RateLimited {
            retry_after_secs: None,
        },
        _ => ProviderError::Api {
            status: status as u16,
            details,
        },
    }
}

#[async_trait]
impl WearableProvider for WithingsProvider {
    fn slug(&self) -> &'static str {
        "withings"
    }

    async fn fetch_measurements(
        &self,
        access_token: &str,
        window: FetchWindow,
    ) -> Result<Vec<ProviderMeasurement>, ProviderError> {
        let url = format!("{}/measure", self.api_base);
        let params = [
            ("action", "getmeas".to_string()),
            ("category", "1".to_string()),
            ("startdate", window.start.timestamp().to_string()),
            ("enddate", window.end.timestamp().to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .form(&params)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(ProviderError::Unauthorized {
                    details: "HTTP 401 from measure endpoint".to_string(),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(ProviderError::RateLimited { retry_after_secs });
            }
            status if !status.is_success() => {
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    details: "measure endpoint returned non-success status".to_string(),
                });
            }
            _ => {}
        }

        let envelope: MeasureResponse = response.json().await?;
        if envelope.status != WITHINGS_STATUS_OK {
            return Err(map_envelope_status(envelope.status, envelope.error));
        }

        let groups = envelope.body.map(|b| b.measuregrps).unwrap_or_default();

        let mut measurements = Vec::new();
        for group in groups {
            let Some(measured_at) = DateTime::<Utc>::from_timestamp(group.date, 0) else {
                debug!(date = group.date, "Skipping measure group with invalid timestamp");
                continue;
            };
            for measure in group.measures {
                let Some(metric) = map_measure_type(measure.kind) else {
                    continue;
                };
                measurements.push(ProviderMeasurement {
                    metric,
                    measured_at,
                    value: scale_value(measure.value, measure.unit),
                });
            }
        }

        debug!(
            count = measurements.len(),
            start = %window.start,
            end = %window.end,
            "Fetched Withings measurements"
        );

        Ok(measurements)
    }
}
