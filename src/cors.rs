// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CORS guard: origin allow-list checked before any route is resolved.
//!
//! The guard runs ahead of dispatch so a disallowed browser origin never
//! costs an upstream connection, and so the security decision stays out of
//! per-route logic. Non-browser callers (no `Origin` header) pass
//! unconditionally; allowed origins get credentialed CORS headers on the way
//! out; everything else is rejected with a client-visible 403.

use reqwest::header::{HeaderMap, HeaderValue};

use crate::config::{Config, ConfigError};

const ALLOW_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,HEAD,OPTIONS";
const DEFAULT_ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Outcome of checking a request's declared origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsDecision {
    /// No `Origin` header; CORS does not apply.
    NotApplicable,
    /// Origin is on the allow-list; response headers must be attached.
    Allowed(String),
    /// Origin is not allowed; reject before dispatch.
    Rejected(String),
}

/// Origin allow-list evaluated per request.
#[derive(Debug, Clone)]
pub struct CorsGuard {
    allowed_origins: Vec<String>,
}

impl CorsGuard {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    /// Build the guard from configuration.
    ///
    /// An explicit `cors.allowed_origins` list wins. Otherwise the list is
    /// derived the way the deployment always has: production allows only the
    /// configured frontend, anything else allows the frontend (or the local
    /// Vite dev server) plus its fallback port.
    pub fn from_config(config: &Config, production: bool) -> Result<Self, ConfigError> {
        if let Some(explicit) = config.get::<Vec<String>>("cors.allowed_origins")? {
            return Ok(Self::new(explicit));
        }

        let frontend: Option<String> = config.get("cors.frontend_url")?;
        let allowed = if production {
            match frontend {
                Some(url) => vec![url],
                None => {
                    crate::warn_fmt!(
                        "Cors",
                        "production mode with no FRONTEND_URL configured; all cross-origin requests will be rejected"
                    );
                    Vec::new()
                }
            }
        } else {
            vec![
                frontend.unwrap_or_else(|| "http://localhost:5173".to_string()),
                "http://localhost:5174".to_string(),
            ]
        };

        Ok(Self::new(allowed))
    }

    /// Check a request's `Origin` header against the allow-list.
    pub fn evaluate(&self, origin: Option<&str>) -> CorsDecision {
        match origin {
            None => CorsDecision::NotApplicable,
            Some(origin) if self.allowed_origins.iter().any(|o| o == origin) => {
                CorsDecision::Allowed(origin.to_string())
            }
            Some(origin) => CorsDecision::Rejected(origin.to_string()),
        }
    }

    /// Attach credentialed CORS headers for an allowed origin.
    pub fn apply_response_headers(origin: &str, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert("access-control-allow-origin", value);
        }
        headers.insert(
            "access-control-allow-credentials",
            HeaderValue::from_static("true"),
        );
        headers.insert("vary", HeaderValue::from_static("Origin"));
    }

    /// Headers for a locally answered OPTIONS preflight. The requested
    /// headers are echoed back when present.
    pub fn preflight_headers(origin: &str, requested_headers: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        Self::apply_response_headers(origin, &mut headers);
        headers.insert(
            "access-control-allow-methods",
            HeaderValue::from_static(ALLOW_METHODS),
        );
        let allow_headers = requested_headers.unwrap_or(DEFAULT_ALLOW_HEADERS);
        if let Ok(value) = HeaderValue::from_str(allow_headers) {
            headers.insert("access-control-allow-headers", value);
        }
        headers
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }
}
