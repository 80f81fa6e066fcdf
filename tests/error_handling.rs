// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Failure-path tests: every gateway-originated error must come back as the
//! uniform JSON envelope with the documented status code.

mod common;

use common::start_gateway;
use serde_json::{Value, json};
use serial_test::serial;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
#[serial]
async fn unknown_path_is_404_envelope() {
    let base = start_gateway(json!({})).await;

    let resp = reqwest::get(format!("{base}/api/does-not-exist"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Endpoint not found in gateway");
    // Development mode carries the detail
    assert!(body["error"].as_str().unwrap().contains("/api/does-not-exist"));
}

#[tokio::test]
#[serial]
async fn unreachable_upstream_is_502() {
    // Nothing listens on this port
    let base = start_gateway(json!({
        "routes": [{"prefix": "/api/files", "upstream": "http://127.0.0.1:59997"}]
    }))
    .await;

    let resp = reqwest::get(format!("{base}/api/files/list")).await.unwrap();
    assert_eq!(resp.status(), 502);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Service unavailable");
}

#[tokio::test]
#[serial]
async fn upstream_failure_does_not_poison_other_routes() {
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("still here"))
        .mount(&healthy)
        .await;

    let base = start_gateway(json!({
        "routes": [
            {"prefix": "/api/files", "upstream": "http://127.0.0.1:59996"},
            {"prefix": "/api/auth", "upstream": healthy.uri()}
        ]
    }))
    .await;

    let resp = reqwest::get(format!("{base}/api/files/list")).await.unwrap();
    assert_eq!(resp.status(), 502);

    let resp = reqwest::get(format!("{base}/api/auth/me")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "still here");
}

#[tokio::test]
#[serial]
async fn rejected_origin_never_reaches_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let base = start_gateway(json!({
        "cors": {"allowed_origins": ["http://localhost:5173"]},
        "routes": [{"prefix": "/api/auth", "upstream": upstream.uri()}]
    }))
    .await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/api/auth/me"))
        .header("origin", "http://evil.example")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Not allowed by CORS");
}

#[tokio::test]
#[serial]
async fn disallowed_origin_cannot_read_local_endpoints() {
    let base = start_gateway(json!({
        "cors": {"allowed_origins": ["http://localhost:5173"]}
    }))
    .await;

    for path in ["/health", "/"] {
        let resp = reqwest::Client::new()
            .get(format!("{base}{path}"))
            .header("origin", "http://evil.example")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 403, "{path} must be guarded too");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Not allowed by CORS");
    }
}

#[tokio::test]
#[serial]
async fn slow_upstream_is_504() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
        .mount(&upstream)
        .await;

    let base = start_gateway(json!({
        "proxy": {"timeout": 1},
        "routes": [{"prefix": "/api/files", "upstream": upstream.uri()}]
    }))
    .await;

    let resp = reqwest::get(format!("{base}/api/files/slow")).await.unwrap();
    assert_eq!(resp.status(), 504);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Gateway timeout");
}

#[tokio::test]
#[serial]
async fn production_hides_error_detail() {
    let base = start_gateway(json!({"environment": "production"})).await;

    let resp = reqwest::get(format!("{base}/api/does-not-exist"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Endpoint not found in gateway");
    assert!(body.get("error").is_none());
}
