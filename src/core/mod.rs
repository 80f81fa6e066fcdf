// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core primitives: requests, responses, errors and the dispatcher.
//!
//! Everything that physically moves through the gateway is defined here. No
//! protocol-level IO lives in this module; that sits in `server` (hyper) and
//! the outbound `reqwest` client owned by the [`Dispatcher`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderMap, HeaderValue, TRANSFER_ENCODING};
use reqwest::Method;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::config::Config;
use crate::interceptor::Interceptor;
use crate::relay::RelayBody;
use crate::router::RouteTable;

/// Errors that can occur while handling a request.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Outbound HTTP client error (connection refused, DNS failure, ...)
    #[error("upstream request failed: {0}")]
    ClientError(#[from] reqwest::Error),

    /// The bounded forwarding timeout expired
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    /// No route prefix matched the request path
    #[error("no route matched path '{0}'")]
    RouteNotFound(String),

    /// The request's origin is not on the CORS allow-list
    #[error("origin '{0}' is not allowed")]
    CorsRejected(String),

    /// Configuration error surfacing at request time
    #[error("configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    /// An interceptor failed
    #[error("interceptor error: {0}")]
    InterceptorError(String),

    /// Anything else inside the gateway itself
    #[error("{0}")]
    Other(String),
}

/// An inbound HTTP request after the server boundary.
///
/// The payload is fully buffered (`Bytes`), which is what makes the body
/// relay possible; response bodies, by contrast, stay streamed.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub context: Arc<RwLock<RequestContext>>,
}

impl GatewayRequest {
    /// The declared browser origin, if any.
    pub fn origin(&self) -> Option<&str> {
        self.headers.get("origin").and_then(|v| v.to_str().ok())
    }

    /// The declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }
}

/// A response on its way back to the client. The body is a stream so large
/// upstream responses are relayed with bounded memory and backpressure.
#[derive(Debug)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: reqwest::Body,
}

/// Per-request context, created on arrival and discarded once the response
/// is sent. Never shared across requests.
#[derive(Debug, Default, Clone)]
pub struct RequestContext {
    /// The original client's IP address
    pub client_ip: Option<String>,
    /// When the gateway received the request
    pub start_time: Option<Instant>,
    /// Free-form attributes set by interceptors
    pub attributes: std::collections::HashMap<String, serde_json::Value>,
}

/// Resolves routes and relays requests to upstreams.
///
/// The dispatcher is immutable once built: the route table and interceptor
/// chain are fixed at startup and shared read-only across all concurrent
/// request handlers, so dispatching takes no locks.
#[derive(Debug)]
pub struct Dispatcher {
    /// Gateway configuration
    pub config: Arc<Config>,
    /// HTTP client for outbound calls; connection pooling lives here
    client: reqwest::Client,
    /// The immutable route table
    table: Arc<RouteTable>,
    /// Ordered interceptor chain, run pre in order and post in reverse
    interceptors: Vec<Arc<dyn Interceptor>>,
    /// Bound on a single forward
    forward_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher from configuration and a validated route table.
    pub fn new(config: Arc<Config>, table: Arc<RouteTable>) -> Result<Self, GatewayError> {
        let timeout_secs: u64 = config.get_or_default("proxy.timeout", 30)?;
        let forward_timeout = Duration::from_secs(timeout_secs);

        // The client-level timeout is a backstop; the per-forward timeout
        // below is what produces a 504.
        let client = reqwest::Client::builder()
            .timeout(forward_timeout + Duration::from_secs(5))
            .build()
            .map_err(GatewayError::ClientError)?;

        Ok(Self {
            config,
            client,
            table,
            interceptors: Vec::new(),
            forward_timeout,
        })
    }

    /// Append an interceptor to the chain. Only callable before the
    /// dispatcher is shared, which keeps the chain lock-free afterwards.
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.table
    }

    /// Process one request: interceptors, route resolution, body relay,
    /// the outbound call, and response interceptors.
    pub async fn dispatch(
        &self,
        mut request: GatewayRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let overall_start = Instant::now();

        /* ---------- pre-interceptors ---------- */
        for interceptor in &self.interceptors {
            request = interceptor.before(request).await?;
        }

        /* ---------- route resolution ---------- */
        let route = self
            .table
            .resolve(&request.path)
            .ok_or_else(|| GatewayError::RouteNotFound(request.path.clone()))?
            .clone();

        /* ---------- build the outbound request ---------- */
        let mut url = format!(
            "{}{}",
            route.upstream.trim_end_matches('/'),
            route.remainder(&request.path)
        );
        if let Some(query) = &request.query {
            url.push('?');
            url.push_str(query);
        }

        let mut headers = request.headers.clone();
        // Host is rewritten to the upstream's host by the client; forwarding
        // the client's Host would confuse virtual-host routing upstream.
        headers.remove(HOST);

        let relay = RelayBody::prepare(&request.method, request.content_type(), &request.body);

        let mut builder = self.client.request(request.method.clone(), &url);
        match relay {
            RelayBody::None => {
                // Content-Length must describe the (absent) outbound body,
                // not whatever the client sent.
                headers.remove(CONTENT_LENGTH);
                headers.remove(TRANSFER_ENCODING);
            }
            RelayBody::Json(bytes) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len() as u64));
                headers.remove(TRANSFER_ENCODING);
                builder = builder.body(bytes);
            }
            RelayBody::Raw(bytes) => {
                // Chunked inbound bodies were buffered, so the exact length
                // is known either way.
                headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len() as u64));
                headers.remove(TRANSFER_ENCODING);
                builder = builder.body(bytes);
            }
        }
        let builder = builder.headers(headers);

        crate::debug_fmt!("Dispatch", "{} {} -> {}", request.method, request.path, url);

        /* ---------- send with a bounded timeout ---------- */
        let upstream_start = Instant::now();
        let resp = timeout(self.forward_timeout, builder.send())
            .await
            .map_err(|_| GatewayError::Timeout(self.forward_timeout))?
            .map_err(GatewayError::ClientError)?;
        let upstream_elapsed = upstream_start.elapsed();

        /* ---------- relay the response, streamed ---------- */
        let status = resp.status().as_u16();
        let resp_headers = resp.headers().clone();
        let body = reqwest::Body::wrap_stream(resp.bytes_stream());

        let mut response = GatewayResponse {
            status,
            headers: resp_headers,
            body,
        };

        /* ---------- post-interceptors ---------- */
        for interceptor in self.interceptors.iter().rev() {
            response = interceptor.after(request.clone(), response).await?;
        }

        let overall_elapsed = overall_start.elapsed();
        crate::debug_fmt!(
            "Dispatch",
            "{} {} -> {} | total={:?} upstream={:?}",
            request.method,
            request.path,
            response.status,
            overall_elapsed,
            upstream_elapsed
        );

        Ok(response)
    }
}
