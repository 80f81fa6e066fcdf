// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The uniform JSON envelope and the error translation table.
//!
//! Every gateway-originated response is `{success, message, error?}`. All
//! failures are caught at the dispatch boundary and translated here exactly
//! once; raw network or parsing errors never reach the client. The `error`
//! detail field is populated only outside production mode.

use serde::{Deserialize, Serialize};

use crate::core::GatewayError;

/// The response shape for every gateway-originated body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            error: None,
        }
    }

    /// Attach raw error detail, but only outside production; production
    /// responses keep the generic message to avoid leaking internals.
    pub fn with_detail(mut self, detail: String, production: bool) -> Self {
        if !production {
            self.error = Some(detail);
        }
        self
    }

    /// Serialize to the JSON bytes sent over the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("envelope serialization cannot fail")
    }
}

/// Translate a gateway error into its status code and envelope.
///
/// | condition | status | message |
/// |---|---|---|
/// | no route matched | 404 | Endpoint not found in gateway |
/// | origin rejected | 403 | Not allowed by CORS |
/// | upstream unreachable | 502 | Service unavailable |
/// | forward timeout | 504 | Gateway timeout |
/// | anything else | 500 | Gateway internal error |
pub fn translate(error: &GatewayError, production: bool) -> (u16, Envelope) {
    let (status, message) = match error {
        GatewayError::RouteNotFound(_) => (404, "Endpoint not found in gateway"),
        GatewayError::CorsRejected(_) => (403, "Not allowed by CORS"),
        GatewayError::Timeout(_) => (504, "Gateway timeout"),
        GatewayError::ClientError(e) if e.is_timeout() => (504, "Gateway timeout"),
        GatewayError::ClientError(_) => (502, "Service unavailable"),
        _ => (500, "Gateway internal error"),
    };

    let envelope = Envelope::failure(message).with_detail(error.to_string(), production);
    (status, envelope)
}
