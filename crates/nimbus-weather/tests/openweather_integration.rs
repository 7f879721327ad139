//! Integration tests for OpenWeatherFetcher against a mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use nimbus_weather::{
    FetchPipeline, Fetcher, NetworkErrorKind, OpenWeatherFetcher, RetryPolicy, SdkConfig,
    WeatherError,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WEATHER_PATH: &str = "/data/2.5/weather";

/// Helper to create a provider payload
fn weather_json(name: &str) -> serde_json::Value {
    serde_json::json!({
        "coord": {"lon": 2.35, "lat": 48.85},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
        "base": "stations",
        "main": {"temp": 291.4, "feels_like": 290.9, "pressure": 1018, "humidity": 60},
        "visibility": 10000,
        "wind": {"speed": 2.6, "deg": 70},
        "dt": 1700000000,
        "sys": {"country": "FR", "sunrise": 1699944000, "sunset": 1699978000},
        "timezone": 3600,
        "name": name,
        "cod": 200
    })
}

fn config_for(server: &MockServer) -> SdkConfig {
    SdkConfig::builder()
        .api_key("test-key")
        .base_url(format!("{}{}", server.uri(), WEATHER_PATH))
        .connect_timeout(Duration::from_secs(1))
        .read_timeout(Duration::from_secs(2))
        .retry_delay(Duration::from_millis(10))
        .build()
        .unwrap()
}

fn fetcher_for(server: &MockServer) -> OpenWeatherFetcher {
    OpenWeatherFetcher::new(&config_for(server)).unwrap()
}

#[tokio::test]
async fn test_fetch_success_sends_expected_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .and(query_param("q", "Paris"))
        .and(query_param("appid", "test-key"))
        .and(query_param("units", "standard"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_json("Paris")))
        .expect(1)
        .mount(&server)
        .await;

    let data = fetcher_for(&server).fetch("  Paris ", " test-key ").await.unwrap();

    assert_eq!(data.name, "Paris");
    assert_eq!(data.condition().unwrap().main, "Clear");
    assert_eq!(data.timezone, 3600);
}

#[tokio::test]
async fn test_fetch_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "cod": 401,
            "message": "Invalid API key"
        })))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("Paris", "bad").await.unwrap_err();
    assert_eq!(err, WeatherError::Unauthorized("Invalid or missing API key".to_string()));
}

#[tokio::test]
async fn test_fetch_not_found_uses_body_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "cod": "404",
            "message": "city not found"
        })))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("Atlantis", "test-key").await.unwrap_err();
    assert_eq!(err, WeatherError::NotFound("City not found: city not found".to_string()));
}

#[tokio::test]
async fn test_fetch_not_found_without_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("Atlantis", "test-key").await.unwrap_err();
    assert_eq!(err, WeatherError::NotFound("City not found: Unknown error".to_string()));
}

#[tokio::test]
async fn test_fetch_rate_limited_reads_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "42"))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("Paris", "test-key").await.unwrap_err();
    assert_eq!(err, WeatherError::RateLimited { retry_after_secs: 42 });
}

#[tokio::test]
async fn test_fetch_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("Paris", "test-key").await.unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.http_status(), Some(503));
    assert!(err.to_string().contains("Server error (HTTP 503): maintenance"));
}

#[tokio::test]
async fn test_fetch_unexpected_status_is_not_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("Paris", "test-key").await.unwrap_err();

    assert!(!err.is_retryable());
    match err {
        WeatherError::Network { kind, status, .. } => {
            assert_eq!(kind, NetworkErrorKind::UnexpectedStatus);
            assert_eq!(status, Some(400));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_invalid_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("Paris", "test-key").await.unwrap_err();
    assert!(matches!(
        err,
        WeatherError::Network {
            kind: NetworkErrorKind::InvalidResponse,
            ..
        }
    ));
}

#[tokio::test]
async fn test_fetch_empty_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("Paris", "test-key").await.unwrap_err();
    assert!(err.to_string().contains("Empty response body"));
}

#[tokio::test]
async fn test_fetch_connection_refused() {
    // Bind then drop a listener so nothing answers on the port.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let uri = format!("http://127.0.0.1:{}{}", port, WEATHER_PATH);
    let config = SdkConfig::builder()
        .api_key("test-key")
        .base_url(uri)
        .build()
        .unwrap();

    let err = OpenWeatherFetcher::new(&config)
        .unwrap()
        .fetch("Paris", "test-key")
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert_eq!(err.http_status(), None);
}

#[tokio::test]
async fn test_pipeline_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_json("Paris")))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = FetchPipeline::new(
        Arc::new(fetcher_for(&server)),
        RetryPolicy::new(3, Duration::from_millis(10)),
    );
    let data = pipeline
        .fetch("Paris", "test-key", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.name, "Paris");
}

#[tokio::test]
async fn test_pipeline_gives_up_after_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let pipeline = FetchPipeline::new(
        Arc::new(fetcher_for(&server)),
        RetryPolicy::new(3, Duration::from_millis(10)),
    );
    let err = pipeline
        .fetch("Paris", "test-key", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("after 3 attempts"));
    assert_eq!(err.http_status(), Some(500));
}

#[tokio::test]
async fn test_pipeline_does_not_retry_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WEATHER_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = FetchPipeline::new(
        Arc::new(fetcher_for(&server)),
        RetryPolicy::new(3, Duration::from_millis(10)),
    );
    let err = pipeline
        .fetch("Atlantis", "test-key", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, WeatherError::NotFound(_)));
}
