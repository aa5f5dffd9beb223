//! Tariff API client against a mock server

use assert_matches::assert_matches;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tariff_sync::api::{RetryPolicy, TariffApiError, TariffProvider, WbTariffsClient};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::fakes::RecordingSleeper;
use crate::common::{fixtures, logging};

fn client(server: &MockServer, max_retries: u32) -> (WbTariffsClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = WbTariffsClient::with_settings(&server.uri(), "test-key", RetryPolicy::new(max_retries, 1000, 30_000))
        .unwrap()
        .with_sleeper(sleeper.clone());
    (client, sleeper)
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_successful_fetch_sends_key_and_date() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tariffs/box"))
        .and(header("Authorization", "test-key"))
        .and(query_param("date", "2025-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::sample_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (client, sleeper) = client(&server, 3);
    let response = client.get_box_tariffs(Some(day())).await.unwrap();

    let data = &response.response.data;
    assert_eq!(data.warehouse_list.len(), 2);
    assert_eq!(data.warehouse_list[0].warehouse_name, "Коледино");
    assert_eq!(data.warehouse_list[0].box_delivery_liter.as_deref(), Some("11,2"));
    assert_eq!(data.dt_next_box.as_deref(), Some("2025-03-02"));
    assert!(sleeper.waits().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_rate_limit_retries_with_backoff_then_succeeds() {
    logging::log_test_step("429 three times, then 200");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tariffs/box"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tariffs/box"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::sample_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (client, sleeper) = client(&server, 3);
    let response = client.get_box_tariffs(Some(day())).await.unwrap();

    assert_eq!(response.response.data.warehouse_list.len(), 2);
    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]
    );
}

#[test_log::test(tokio::test)]
async fn test_retry_after_header_sets_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "5"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::sample_body()))
        .mount(&server)
        .await;

    let (client, sleeper) = client(&server, 3);
    client.get_box_tariffs(Some(day())).await.unwrap();

    assert_eq!(sleeper.waits(), vec![Duration::from_secs(5)]);
}

#[test_log::test(tokio::test)]
async fn test_rate_limit_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "1")
                .set_body_json(json!({ "title": "too many requests", "status": 429 })),
        )
        .expect(3)
        .mount(&server)
        .await;

    let (client, sleeper) = client(&server, 2);
    let err = client.get_box_tariffs(Some(day())).await.unwrap_err();

    assert_matches!(err, TariffApiError::RateLimited { retry_after: Some(1), .. });
    assert_eq!(err.problem().and_then(|p| p.title.as_deref()), Some("too many requests"));
    assert_eq!(sleeper.waits().len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_unauthorized_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "title": "unauthorized",
            "detail": "token expired",
            "requestId": "req-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, sleeper) = client(&server, 3);
    let err = client.get_box_tariffs(Some(day())).await.unwrap_err();

    assert_matches!(&err, TariffApiError::Unauthorized { message, .. } if message == "token expired");
    assert_eq!(err.problem().and_then(|p| p.request_id.as_deref()), Some("req-1"));
    assert!(sleeper.waits().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_bad_request_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(400).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let (client, sleeper) = client(&server, 3);
    let err = client.get_box_tariffs(Some(day())).await.unwrap_err();

    assert_matches!(err, TariffApiError::BadRequest { problem: None });
    assert!(sleeper.waits().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_server_errors_exhaust_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let (client, sleeper) = client(&server, 3);
    let err = client.get_box_tariffs(Some(day())).await.unwrap_err();

    assert_matches!(err, TariffApiError::Transient { status: Some(503), .. });
    assert_eq!(
        sleeper.waits(),
        vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]
    );
}

#[test_log::test(tokio::test)]
async fn test_zero_retries_means_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (client, sleeper) = client(&server, 0);
    let err = client.get_box_tariffs(Some(day())).await.unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(sleeper.waits().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_unexpected_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "no such route" })))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _sleeper) = client(&server, 3);
    let err = client.get_box_tariffs(Some(day())).await.unwrap_err();

    assert_matches!(err, TariffApiError::Api { status: 404, .. });
    assert_eq!(err.problem().and_then(|p| p.detail.as_deref()), Some("no such route"));
}

#[test_log::test(tokio::test)]
async fn test_malformed_success_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
        .mount(&server)
        .await;

    let (client, _sleeper) = client(&server, 3);
    let err = client.get_box_tariffs(Some(day())).await.unwrap_err();

    assert_matches!(err, TariffApiError::Decode(_));
}

#[test_log::test(tokio::test)]
async fn test_connection_failures_are_transient() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = WbTariffsClient::with_settings("http://127.0.0.1:1", "test-key", RetryPolicy::new(2, 100, 30_000))
        .unwrap()
        .with_sleeper(sleeper.clone());

    let err = client.get_box_tariffs(Some(day())).await.unwrap_err();

    assert_matches!(err, TariffApiError::Transient { status: None, .. });
    assert_eq!(sleeper.waits(), vec![Duration::from_millis(200), Duration::from_millis(400)]);
}
