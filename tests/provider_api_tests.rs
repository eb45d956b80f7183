//! Integration tests for the provider clients against a mocked HTTP API:
//! response parsing, value scaling, and error mapping.

use chrono::{TimeZone, Utc};
use curie_sync::providers::fitbit::FitbitProvider;
use curie_sync::providers::withings::WithingsProvider;
use curie_sync::providers::{CanonicalMetric, FetchWindow, ProviderError, WearableProvider};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn window() -> FetchWindow {
    FetchWindow {
        start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn withings_parses_and_scales_measure_groups() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/measure"))
        .and(header("authorization", "Bearer access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "body": {
                "measuregrps": [
                    {
                        "grpid": 1,
                        "date": 1704153600,
                        "measures": [
                            {"value": 72500, "unit": -3, "type": 1},
                            {"value": 213, "unit": -1, "type": 6}
                        ]
                    },
                    {
                        "grpid": 2,
                        "date": 1704240000,
                        "measures": [
                            {"value": 541, "unit": -1, "type": 76}
                        ]
                    }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = WithingsProvider::new(reqwest::Client::new(), server.uri());
    let measurements = provider
        .fetch_measurements("access-token", window())
        .await
        .expect("fetch succeeds");

    assert_eq!(measurements.len(), 3);
    assert_eq!(measurements[0].metric, CanonicalMetric::Weight);
    assert_eq!(measurements[0].value, 72.5);
    assert_eq!(measurements[1].metric, CanonicalMetric::FatRatio);
    assert_eq!(measurements[1].value, 21.3);
    assert_eq!(measurements[2].metric, CanonicalMetric::MuscleMass);
    assert_eq!(measurements[2].value, 54.1);
}

#[tokio::test]
async fn withings_http_401_maps_to_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/measure"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let provider = WithingsProvider::new(reqwest::Client::new(), server.uri());
    let err = provider
        .fetch_measurements("stale-token", window())
        .await
        .expect_err("must fail");
    assert!(matches!(err, ProviderError::Unauthorized { .. }));
}

#[tokio::test]
async fn withings_http_429_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/measure"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "120"))
        .mount(&server)
        .await;

    let provider = WithingsProvider::new(reqwest::Client::new(), server.uri());
    let err = provider
        .fetch_measurements("access-token", window())
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        ProviderError::RateLimited {
            retry_after_secs: Some(120)
        }
    ));
}

#[tokio::test]
async fn withings_envelope_rate_limit_is_detected_behind_http_200() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/measure"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": 601 })))
        .mount(&server)
        .await;

    let provider = WithingsProvider::new(reqwest::Client::new(), server.uri());
    let err = provider
        .fetch_measurements("access-token", window())
        .await
        .expect_err("must fail");
    assert!(matches!(err, ProviderError::RateLimited { .. }));
}

#[tokio::test]
async fn fitbit_maps_weight_and_fat_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/1/user/-/body/log/weight/date/2024-01-01/2024-01-31.json"))
        .and(header("authorization", "Bearer access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "weight": [
                {"bmi": 23.1, "date": "2024-01-15", "time": "08:15:30", "logId": 1,
                 "weight": 72.5, "fat": 21.3, "source": "Aria"},
                {"date": "2024-01-16", "logId": 2, "weight": 72.1}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = FitbitProvider::new(reqwest::Client::new(), server.uri());
    let measurements = provider
        .fetch_measurements("access-token", window())
        .await
        .expect("fetch succeeds");

    // First entry yields weight + fat ratio, second only weight.
    assert_eq!(measurements.len(), 3);
    assert_eq!(measurements[0].metric, CanonicalMetric::Weight);
    assert_eq!(measurements[1].metric, CanonicalMetric::FatRatio);
    assert_eq!(measurements[2].metric, CanonicalMetric::Weight);
    assert_eq!(measurements[2].value, 72.1);
}

#[tokio::test]
async fn fitbit_forbidden_maps_to_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let provider = FitbitProvider::new(reqwest::Client::new(), server.uri());
    let err = provider
        .fetch_measurements("access-token", window())
        .await
        .expect_err("must fail");
    assert!(matches!(err, ProviderError::Unauthorized { .. }));
}
