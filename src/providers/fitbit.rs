//! Fitbit provider integration.
//!
//! Pulls body logs from the Fitbit Web API. Fitbit reports weight in kg (with
//! the metric unit profile this service requests) and body fat as a
//! percentage; both map directly onto canonical metrics.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::providers::trait_::{
    CanonicalMetric, FetchWindow, ProviderError, ProviderMeasurement, WearableProvider,
};

/// Fitbit body log provider
pub struct FitbitProvider {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct WeightLogResponse {
    #[serde(default)]
    weight: Vec<WeightLogEntry>,
}

#[derive(Debug, Deserialize)]
struct WeightLogEntry {
    date: String,
    #[serde(default)]
    time: Option<String>,
    weight: f64,
    #[serde(default)]
    fat: Option<f64>,
}

impl FitbitProvider {
    pub fn new(client: reqwest::Client, api_base: String) -> Self {
        Self { client, api_base }
    }
}

fn parse_measured_at(date: &str, time: Option<&str>) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let time = time
        .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M:%S").ok())
        .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight"));
    Some(date.and_time(time).and_utc())
}

#[async_trait]
impl WearableProvider for FitbitProvider {
    fn slug(&self) -> &'static str {
        "fitbit"
    }

    async fn fetch_measurements(
        &self,
        access_token: &str,
        window: FetchWindow,
    ) -> Result<Vec<ProviderMeasurement>, ProviderError> {
        let url = format!(
            "{}/1/user/-/body/log/weight/date/{}/{}.json",
            self.api_base,
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d"),
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header("Accept-Language", "en_GB") // metric weight units
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::Unauthorized {
                    details: format!("HTTP {} from body log endpoint", response.status()),
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
                    details: "body log endpoint returned non-success status".to_string(),
                });
            }
            _ => {}
        }

        let log: WeightLogResponse = response.json().await?;

        let mut measurements = Vec::new();
        for entry in log.weight {
            let Some(measured_at) = parse_measured_at(&entry.date, entry.time.as_deref()) else {
                debug!(date = %entry.date, "Skipping body log entry with unparseable date");
                continue;
            };
            measurements.push(ProviderMeasurement {
                metric: CanonicalMetric::Weight,
                measured_at,
                value: entry.weight,
            });
            if let Some(fat) = entry.fat {
                measurements.push(ProviderMeasurement {
                    metric: CanonicalMetric::FatRatio,
                    measured_at,
                    value: fat,
                });
            }
        }

        debug!(
            count = measurements.len(),
            start = %window.start,
            end = %window.end,
            "Fetched Fitbit measurements"
        );

        Ok(measurements)
    }
}
