// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests: a real gateway in front of wiremock upstreams.

mod common;

use std::time::Duration;

use common::start_gateway;
use serde_json::{Value, json};
use serial_test::serial;
use tokio::io::AsyncReadExt;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
#[serial]
async fn forwards_with_prefix_stripped() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("auth says hi"))
        .expect(1)
        .mount(&upstream)
        .await;

    let base = start_gateway(json!({
        "routes": [{"prefix": "/api/auth", "upstream": upstream.uri()}]
    }))
    .await;

    let resp = reqwest::get(format!("{base}/api/auth/login")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "auth says hi");
}

#[tokio::test]
#[serial]
async fn longest_prefix_wins_over_shorter() {
    let generic = MockServer::start().await;
    let auth = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("generic"))
        .mount(&generic)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("auth"))
        .mount(&auth)
        .await;

    let base = start_gateway(json!({
        "routes": [
            {"prefix": "/api", "upstream": generic.uri()},
            {"prefix": "/api/auth", "upstream": auth.uri()}
        ]
    }))
    .await;

    let body = reqwest::get(format!("{base}/api/auth/me"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "auth");

    let body = reqwest::get(format!("{base}/api/departments"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "generic");
}

#[tokio::test]
#[serial]
async fn query_string_is_preserved() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "nghị định"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let base = start_gateway(json!({
        "routes": [{"prefix": "/api/files", "upstream": upstream.uri()}]
    }))
    .await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/api/files/search"))
        .query(&[("q", "nghị định")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
#[serial]
async fn json_body_is_relayed_with_byte_accurate_length() {
    let upstream = MockServer::start().await;
    let payload = json!({"title": "Công văn", "count": 2});
    let expected_len = serde_json::to_vec(&payload).unwrap().len();

    Mock::given(method("POST"))
        .and(path("/documents"))
        .and(body_json(&payload))
        .and(header("content-type", "application/json"))
        .and(header("content-length", expected_len.to_string().as_str()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&upstream)
        .await;

    let base = start_gateway(json!({
        "routes": [{"prefix": "/api/incoming-documents", "upstream": upstream.uri()}]
    }))
    .await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/incoming-documents/documents"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
}

#[tokio::test]
#[serial]
async fn health_reports_configured_upstreams() {
    let base = start_gateway(json!({
        "services": {
            "auth": "http://auth.internal:3002",
            "documents": "http://docs.internal:3003",
            "departments": "http://departments.internal:3004",
            "files": "http://files.internal:3005"
        }
    }))
    .await;

    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["gateway"], "running");
    assert_eq!(body["services"]["AUTH"], "http://auth.internal:3002");
    assert_eq!(body["services"]["DOCUMENTS"], "http://docs.internal:3003");
    assert_eq!(body["services"]["DEPARTMENTS"], "http://departments.internal:3004");
    assert_eq!(body["services"]["FILES"], "http://files.internal:3005");
}

#[tokio::test]
#[serial]
async fn health_carries_cors_headers_for_allowed_origin() {
    let base = start_gateway(json!({
        "cors": {"allowed_origins": ["http://localhost:5173"]}
    }))
    .await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/health"))
        .header("origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();

    // A browser frontend must be able to read the health report
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        resp.headers()
            .get("access-control-allow-credentials")
            .unwrap(),
        "true"
    );
    assert_eq!(resp.headers().get("vary").unwrap(), "Origin");
}

#[tokio::test]
#[serial]
async fn root_describes_the_gateway() {
    let base = start_gateway(json!({})).await;

    let body: Value = reqwest::get(format!("{base}/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["architecture"], "Microservices");
    assert_eq!(body["services"]["auth"], "/api/auth/*");
}

#[tokio::test]
#[serial]
async fn preflight_is_answered_locally() {
    let upstream = MockServer::start().await;
    // The upstream must never see the OPTIONS probe
    Mock::given(method("OPTIONS"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&upstream)
        .await;

    let base = start_gateway(json!({
        "cors": {"allowed_origins": ["http://localhost:5173"]},
        "routes": [{"prefix": "/api/auth", "upstream": upstream.uri()}]
    }))
    .await;

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{base}/api/auth/login"))
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 204);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        resp.headers()
            .get("access-control-allow-credentials")
            .unwrap(),
        "true"
    );
    assert_eq!(
        resp.headers()
            .get("access-control-allow-headers")
            .unwrap(),
        "content-type"
    );
}

#[tokio::test]
#[serial]
async fn allowed_origin_gets_cors_headers_on_proxied_response() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&upstream)
        .await;

    let base = start_gateway(json!({
        "cors": {"allowed_origins": ["http://localhost:5173"]},
        "routes": [{"prefix": "/api/auth", "upstream": upstream.uri()}]
    }))
    .await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/api/auth/me"))
        .header("origin", "http://localhost:5173")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(resp.headers().get("vary").unwrap(), "Origin");
}

#[tokio::test]
#[serial]
async fn client_disconnect_aborts_upstream_forward() {
    // A raw upstream that never answers; it reports when its peer (the
    // gateway) hangs up.
    let upstream = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = upstream.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = closed_tx.send(());
    });

    let base = start_gateway(json!({
        "routes": [{"prefix": "/api/files", "upstream": format!("http://{upstream_addr}")}]
    }))
    .await;

    // The client gives up while the upstream is still holding the response
    let result = reqwest::Client::new()
        .get(format!("{base}/api/files/slow"))
        .timeout(Duration::from_millis(300))
        .send()
        .await;
    assert!(result.is_err());

    // Dropping the client request must abort the in-flight forward: the
    // gateway's connection to the upstream closes instead of waiting out
    // the full proxy timeout.
    tokio::time::timeout(Duration::from_secs(5), closed_rx)
        .await
        .expect("forward was not aborted after the client disconnected")
        .unwrap();
}
