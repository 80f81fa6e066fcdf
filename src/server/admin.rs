// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Locally answered endpoints: `/health` and `/`.
//!
//! The health report describes the gateway itself plus the configured
//! upstream registry. No upstream is probed; the gateway advertises where it
//! forwards, not whether those services are currently up.

use serde_json::json;

use crate::router::UpstreamServices;

/// Body for `GET /health`.
pub(crate) fn health_body(services: &UpstreamServices) -> Vec<u8> {
    let body = json!({
        "status": "healthy",
        "gateway": "running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": services,
    });
    serde_json::to_vec(&body).expect("health body serialization cannot fail")
}

/// Body for `GET /`: a short self-description with the mounted route
/// patterns.
pub(crate) fn root_body() -> Vec<u8> {
    let body = json!({
        "message": "Document Management API Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "architecture": "Microservices",
        "services": {
            "auth": "/api/auth/*",
            "incomingDocuments": "/api/incoming-documents/*",
            "outgoingDocuments": "/api/outgoing-documents/*",
            "departments": "/api/departments/*",
            "files": "/api/files/*",
        },
    });
    serde_json::to_vec(&body).expect("root body serialization cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn health_reports_every_upstream() {
        let services = UpstreamServices::default();
        let body: Value = serde_json::from_slice(&health_body(&services)).unwrap();

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["gateway"], "running");
        assert!(body["timestamp"].is_string());
        assert_eq!(body["services"]["AUTH"], services.auth);
        assert_eq!(body["services"]["DOCUMENTS"], services.documents);
        assert_eq!(body["services"]["DEPARTMENTS"], services.departments);
        assert_eq!(body["services"]["FILES"], services.files);
    }

    #[test]
    fn root_lists_route_patterns() {
        let body: Value = serde_json::from_slice(&root_body()).unwrap();

        assert_eq!(body["architecture"], "Microservices");
        assert_eq!(body["services"]["auth"], "/api/auth/*");
        assert_eq!(body["services"]["files"], "/api/files/*");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
