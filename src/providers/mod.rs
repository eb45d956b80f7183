//! # Wearable Providers
//!
//! This module contains the provider abstraction and the concrete
//! integrations the sync service can pull measurements from.

pub mod fitbit;
pub mod registry;
pub mod trait_;
pub mod withings;

pub use registry::Registry;
pub use trait_::{
    CanonicalMetric, FetchWindow, ProviderError, ProviderMeasurement, WearableProvider,
};
