// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Body relay: rebuilding the outbound request payload.
//!
//! JSON bodies are parsed at the gateway boundary (the original stack's JSON
//! middleware consumed the raw byte stream, so forwarding had to re-serialize
//! from the parsed object). The relay reproduces that contract explicitly:
//! for body-carrying methods a JSON payload is re-serialized and
//! `Content-Length` is fixed to the exact **byte** length of the UTF-8
//! serialization before any part of the outbound request is transmitted.
//! Payloads may contain multi-byte text, so character counts are never used.
//!
//! Non-JSON payloads (e.g. multipart uploads to the files service) pass
//! through byte-for-byte with their original headers.

use bytes::Bytes;
use reqwest::Method;

/// The outbound payload decided by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayBody {
    /// No body is attached, regardless of what the client sent.
    None,
    /// A re-serialized JSON document; `Content-Type: application/json` and a
    /// byte-accurate `Content-Length` must be set from it.
    Json(Vec<u8>),
    /// The client's payload, forwarded unmodified under its original headers.
    Raw(Bytes),
}

impl RelayBody {
    /// Decide the outbound payload for a request.
    ///
    /// POST, PUT and PATCH semantically carry a body; everything else (GET,
    /// DELETE, HEAD, ...) forwards without one even when the client attached
    /// bytes.
    pub fn prepare(method: &Method, content_type: Option<&str>, payload: &Bytes) -> RelayBody {
        if !method_carries_body(method) {
            return RelayBody::None;
        }

        if payload.is_empty() {
            return RelayBody::None;
        }

        if is_json(content_type) {
            // Invalid JSON on a JSON-typed request is forwarded untouched;
            // schema validation belongs to the upstream, not the gateway.
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) {
                let bytes = serde_json::to_vec(&value)
                    .expect("re-serializing a parsed JSON value cannot fail");
                return RelayBody::Json(bytes);
            }
        }

        RelayBody::Raw(payload.clone())
    }

    /// The exact `Content-Length` for the outbound request, when the relay
    /// owns it.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            RelayBody::Json(bytes) => Some(bytes.len() as u64),
            _ => None,
        }
    }
}

/// Whether a method semantically carries a request body.
pub fn method_carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        let essence = ct.split(';').next().unwrap_or("").trim();
        essence.eq_ignore_ascii_case("application/json") || essence.ends_with("+json")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn post_json_is_reserialized() {
        let body = RelayBody::prepare(&Method::POST, Some("application/json"), &bytes("{\"a\":1}"));
        match body {
            RelayBody::Json(ref serialized) => {
                let value: serde_json::Value = serde_json::from_slice(serialized).unwrap();
                assert_eq!(value, serde_json::json!({"a": 1}));
                assert_eq!(body.content_length(), Some(serialized.len() as u64));
            }
            other => panic!("expected Json, got {other:?}"),
        }
    }

    #[test]
    fn content_length_counts_bytes_not_chars() {
        // "xin chào" carries multi-byte UTF-8; byte length != char count
        let payload = serde_json::json!({"title": "xin chào"}).to_string();
        let body = RelayBody::prepare(&Method::PUT, Some("application/json"), &bytes(&payload));

        let expected = payload.as_bytes().len() as u64;
        assert!(expected > payload.chars().count() as u64);
        assert_eq!(body.content_length(), Some(expected));
    }

    #[test]
    fn json_with_charset_parameter() {
        let body = RelayBody::prepare(
            &Method::PATCH,
            Some("application/json; charset=utf-8"),
            &bytes("[1,2,3]"),
        );
        assert!(matches!(body, RelayBody::Json(_)));
    }

    #[test]
    fn get_delete_head_never_carry_a_body() {
        for method in [Method::GET, Method::DELETE, Method::HEAD] {
            let body = RelayBody::prepare(&method, Some("application/json"), &bytes("{}"));
            assert_eq!(body, RelayBody::None, "{method} must not attach a body");
        }
    }

    #[test]
    fn empty_payload_attaches_nothing() {
        let body = RelayBody::prepare(&Method::POST, Some("application/json"), &Bytes::new());
        assert_eq!(body, RelayBody::None);
    }

    #[test]
    fn non_json_passes_through_raw() {
        let payload = bytes("--boundary\r\ncontent\r\n--boundary--");
        let body = RelayBody::prepare(
            &Method::POST,
            Some("multipart/form-data; boundary=boundary"),
            &payload,
        );
        assert_eq!(body, RelayBody::Raw(payload));
    }

    #[test]
    fn malformed_json_passes_through_raw() {
        let payload = bytes("{not json");
        let body = RelayBody::prepare(&Method::POST, Some("application/json"), &payload);
        assert_eq!(body, RelayBody::Raw(payload));
    }
}
