//! Provider trait and shared measurement types.
//!
//! A provider turns an access token and a time window into canonical
//! measurements; everything else (claiming, retry, persistence) lives in the
//! job runner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical body-composition metrics the service understands.
///
/// Provider-specific measurement codes are mapped onto these; codes with no
/// mapping are skipped at the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalMetric {
    Weight,
    FatFreeMass,
    FatRatio,
    FatMass,
    MuscleMass,
    Hydration,
    BoneMass,
}

impl CanonicalMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalMetric::Weight => "weight",
            CanonicalMetric::FatFreeMass => "fat_free_mass",
            CanonicalMetric::FatRatio => "fat_ratio",
            CanonicalMetric::FatMass => "fat_mass",
            CanonicalMetric::MuscleMass => "muscle_mass",
            CanonicalMetric::Hydration => "hydration",
            CanonicalMetric::BoneMass => "bone_mass",
        }
    }

    /// Canonical unit label for the metric
    pub fn unit(&self) -> &'static str {
        match self {
            CanonicalMetric::FatRatio => "percent",
            _ => "kg",
        }
    }
}

/// Inclusive time window to fetch measurements for
#[derive(Debug, Clone, Copy)]
pub struct FetchWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A single measurement as returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMeasurement {
    pub metric: CanonicalMetric,
    pub measured_at: DateTime<Utc>,
    pub value: f64,
}

/// Errors surfaced by provider integrations
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider rejected the access token: {details}")]
    Unauthorized { details: String },

    #[error("provider rate limited the request")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("network error talking to provider: {details}")]
    Network { details: String, retryable: bool },

    #[error("provider returned status {status}: {details}")]
    Api { status: u16, details: String },

    #[error("failed to decode provider response: {details}")]
    Decode { details: String },

    #[error("unknown provider: {slug}")]
    UnknownProvider { slug: String },
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode {
                details: err.to_string(),
            }
        } else {
            ProviderError::Network {
                details: err.to_string(),
                retryable: err.is_timeout() || err.is_connect(),
            }
        }
    }
}

/// A wearable data provider the sync service can pull from
#[async_trait]
pub trait WearableProvider: Send + Sync {
    /// Provider slug as stored on connections and jobs
    fn slug(&self) -> &'static str;

    /// Fetch measurements recorded within the window, mapped to canonical
    /// metrics
    async fn fetch_measurements(
        &self,
        access_token: &str,
        window: FetchWindow,
    ) -> Result<Vec<ProviderMeasurement>, ProviderError>;
}
