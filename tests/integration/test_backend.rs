//! Tests for the onboarding API in front of the HTTP backend client.
//!
//! The registration backend is played by a wiremock server.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use evalon_backend::HttpBackend;
use evalon_wizard::{create_router, AppState, Config};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("fixtures")
        .join("evalon.json")
}

/// Spawns the API against a backend at `backend_url` and returns the API base URL.
async fn spawn_test_server(backend_url: &str) -> String {
    let config = Config {
        backend_url: backend_url.to_string(),
        request_timeout_secs: 2,
        ..Config::default()
    };
    let backend = Arc::new(HttpBackend::from_config(&config).expect("client builds"));
    let state = AppState::new(config, backend.clone(), backend);
    let router = create_router(state);

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://{addr}/api")
}

#[test]
fn test_fixture_config_loads() {
    let config = Config::load_from_file(&fixture_path()).expect("fixture parses");

    assert_eq!(config.backend_url, "http://localhost:5001");
    assert_eq!(config.default_country_code, "+44");
    assert_eq!(config.port, 4100);
    assert_eq!(config.otp_resend_cooldown_secs, 30);
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn test_locations_are_proxied_from_backend() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/locations/countries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [
                { "code": "IN", "name": "India", "phonecode": "91", "currency": "INR" },
                { "code": "GB", "name": "United Kingdom", "phonecode": "44", "currency": "GBP" }
            ]
        })))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/locations/countries/IN/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{ "code": "MH", "name": "Maharashtra", "country_code": "IN" }]
        })))
        .mount(&mock)
        .await;

    let base = spawn_test_server(&mock.uri()).await;
    let client = reqwest::Client::new();

    let countries: Value = client
        .get(format!("{base}/locations/countries"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(countries.as_array().map(Vec::len), Some(2));
    assert_eq!(countries[0]["phoneCode"], "91");
    assert_eq!(countries[1]["name"], "United Kingdom");

    let states: Value = client
        .get(format!("{base}/locations/countries/IN/states"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(states[0]["code"], "MH");
    assert_eq!(states[0]["countryCode"], "IN");
}

#[tokio::test]
async fn test_backend_rejection_reaches_wizard_notification() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/teachers/register/step1"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "success": false,
            "message": "Teacher with this email already exists"
        })))
        .mount(&mock)
        .await;

    let base = spawn_test_server(&mock.uri()).await;
    let client = reqwest::Client::new();

    let view: Value = client
        .post(format!("{base}/wizards"))
        .json(&json!({ "kind": "teacher" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = view["id"].as_str().unwrap().to_string();

    for (field, value) in [
        ("fullName", "Asha Rao"),
        ("emailAddress", "asha@school.edu"),
        ("country", "IN"),
        ("city", "Mysuru"),
        ("pincode", "570001"),
    ] {
        let response = client
            .patch(format!("{base}/wizards/{id}/fields"))
            .json(&json!({ "field": field, "value": value }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    let body: Value = client
        .post(format!("{base}/wizards/{id}/advance"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["outcome"], "rejected");
    assert!(body["notification"]["message"]
        .as_str()
        .unwrap()
        .contains("invited by an admin"));
    assert_eq!(body["wizard"]["step"], 0);
    assert_eq!(body["wizard"]["hasRegistrationToken"], false);
}

#[tokio::test]
async fn test_unreachable_backend_is_reported_as_disconnected() {
    // Nothing listens on the discard port.
    let base = spawn_test_server("http://127.0.0.1:9").await;
    let client = reqwest::Client::new();

    let view: Value = client
        .post(format!("{base}/wizards"))
        .json(&json!({ "kind": "organization" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = view["id"].as_str().unwrap().to_string();

    for (field, value) in [
        ("organisationName", "Green Valley School"),
        ("country", "IN"),
        ("state", "MH"),
        ("city", "Pune"),
        ("pincode", "411001"),
        ("organisationType", "school"),
    ] {
        client
            .patch(format!("{base}/wizards/{id}/fields"))
            .json(&json!({ "field": field, "value": value }))
            .send()
            .await
            .unwrap();
    }

    let body: Value = client
        .post(format!("{base}/wizards/{id}/advance"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["outcome"], "rejected");
    assert_eq!(
        body["notification"]["message"],
        "Backend server is not connected. Please try again."
    );
    assert_eq!(body["wizard"]["step"], 0);

    let response = client
        .get(format!("{base}/locations/countries"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 502);
}
