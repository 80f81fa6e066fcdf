// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP server boundary.
//!
//! A thin wrapper around **hyper-util**: it owns the listening socket and
//! translates between hyper's body types and the internal
//! [`GatewayRequest`] / [`GatewayResponse`] pair the dispatcher works on.
//!
//! **Protocol support**
//! Uses `hyper_util::server::conn::auto::Builder`, so the same connection
//! transparently handles both HTTP/1.1 and HTTP/2.
//!
//! ## Request lifecycle
//! Each connection gets its own task; each in-flight forward blocks only its
//! own task, never the accept loop. Inbound bodies are buffered (the body
//! relay needs the whole payload); response bodies stream straight through.
//! When a client disconnects mid-request, hyper drops the service future and
//! the in-flight upstream call is aborted with it rather than left to run to
//! completion.
//!
//! The server answers `/health` and `/` locally; everything else goes
//! through the CORS guard and then the dispatcher.

mod admin;

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use reqwest::Body;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::RwLock;
use tokio::sync::oneshot;
use tokio::task::{Id, JoinSet};

use crate::core::{Dispatcher, GatewayRequest, GatewayResponse, RequestContext};
use crate::cors::{CorsDecision, CorsGuard};
use crate::envelope::{self, Envelope};
use crate::router::UpstreamServices;
use crate::{error_fmt, warn_fmt};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Configuration for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Everything a request handler needs, shared read-only across connections.
#[derive(Debug)]
pub(crate) struct ServerState {
    pub dispatcher: Dispatcher,
    pub cors: CorsGuard,
    pub services: UpstreamServices,
    pub production: bool,
}

/// The gateway's HTTP server.
#[derive(Debug, Clone)]
pub struct GatewayServer {
    config: ServerConfig,
    state: Arc<ServerState>,
    /// Shutdown senders for each connection task
    shutdown_senders: Arc<RwLock<HashMap<Id, oneshot::Sender<()>>>>,
}

impl GatewayServer {
    pub(crate) fn new(config: ServerConfig, state: ServerState) -> Self {
        Self {
            config,
            state: Arc::new(state),
            shutdown_senders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Run the accept loop until Ctrl-C or SIGTERM, then drain connections.
    pub async fn start(&self) -> Result<(), crate::core::GatewayError> {
        let addr = format!("{}:{}", self.config.host, self.config.port)
            .parse::<SocketAddr>()
            .map_err(|e| crate::core::GatewayError::Other(format!("invalid server address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| crate::core::GatewayError::Other(format!("failed to bind: {e}")))?;

        info!("API Gateway listening on http://{addr}");
        for route in self.state.dispatcher.route_table().routes() {
            info!("  route {} -> {}", route.prefix, route.upstream);
        }

        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let mut term_stream = signal(SignalKind::terminate()).map_err(|e| {
            crate::core::GatewayError::Other(format!("cannot install SIGTERM handler: {e}"))
        })?;

        #[cfg(unix)]
        let sigterm = term_stream.recv();
        #[cfg(not(unix))]
        let sigterm = std::future::pending::<Option<()>>();

        tokio::pin!(ctrl_c);
        tokio::pin!(sigterm);

        let shutdown_senders = self.shutdown_senders.clone();
        let mut join_set = JoinSet::new();
        let state = self.state.clone();
        let shutdown_initiated = Arc::new(AtomicBool::new(false));

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl-C; shutting down API Gateway");
                    shutdown_initiated.store(true, Ordering::SeqCst);
                    break;
                }
                _ = &mut sigterm => {
                    info!("Received SIGTERM; shutting down API Gateway");
                    shutdown_initiated.store(true, Ordering::SeqCst);
                    break;
                }
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, remote_addr)) => {
                            if shutdown_initiated.load(Ordering::SeqCst) {
                                info!("Rejecting new connection during shutdown");
                                continue;
                            }

                            let state = state.clone();
                            let client_ip = remote_addr.ip().to_string();
                            let (tx, rx) = oneshot::channel();
                            let shutdown_senders_clone = shutdown_senders.clone();

                            let handle = join_set.spawn(async move {
                                let task_id = tokio::task::id();

                                let service = service_fn(move |req: Request<Incoming>| {
                                    handle_request(req, state.clone(), client_ip.clone())
                                });
                                let io = TokioIo::new(stream);

                                let builder = {
                                    let mut b = AutoBuilder::new(TokioExecutor::new());
                                    b.http1();
                                    b.http2();
                                    b
                                };

                                let connection = builder.serve_connection(io, service);
                                let mut conn = std::pin::pin!(connection);

                                tokio::select! {
                                    res = &mut conn => {
                                        if let Err(e) = res {
                                            let err_str = e.to_string();
                                            if !err_str.contains("connection closed")
                                                && !err_str.contains("connection reset") {
                                                error!("Connection error: {e}");
                                            }
                                        }
                                    }
                                    _ = rx => {
                                        conn.as_mut().graceful_shutdown();
                                        if let Err(e) = conn.await {
                                            let err_str = e.to_string();
                                            if !err_str.contains("connection closed")
                                                && !err_str.contains("connection reset") {
                                                error!("Connection error during graceful shutdown: {e}");
                                            }
                                        }
                                    }
                                }

                                shutdown_senders_clone.write().await.remove(&task_id);
                            });

                            shutdown_senders.write().await.insert(handle.id(), tx);
                        }
                        Err(e) => error!("Accept error: {e}"),
                    }
                }
            }
        }

        info!("Shutting down; waiting for {} connection(s)", join_set.len());

        {
            let mut senders = shutdown_senders.write().await;
            for (_, sender) in senders.drain() {
                let _ = sender.send(());
            }
        }

        let shutdown_timeout = tokio::time::Duration::from_secs(30);
        let drain = async {
            while let Some(res) = join_set.join_next().await {
                match res {
                    Ok(_) => {}
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!("Connection task failed: {e}"),
                }
            }
        };

        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            warn!(
                "Shutdown timed out after {}s, closing remaining connections",
                shutdown_timeout.as_secs()
            );
            join_set.shutdown().await;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Convert a hyper request into a [`GatewayRequest`], buffering the body.
async fn convert_hyper_request(
    req: Request<Incoming>,
    client_ip: String,
) -> Result<GatewayRequest, crate::core::GatewayError> {
    let (parts, body) = req.into_parts();

    let path = parts.uri.path().to_owned();
    let query = parts.uri.query().map(|q| q.to_owned());

    let body: Bytes = body
        .collect()
        .await
        .map_err(|e| crate::core::GatewayError::Other(format!("failed to read request body: {e}")))?
        .to_bytes();

    Ok(GatewayRequest {
        method: parts.method,
        path,
        query,
        headers: parts.headers,
        body,
        context: Arc::new(tokio::sync::RwLock::new(RequestContext {
            client_ip: Some(client_ip),
            start_time: Some(std::time::Instant::now()),
            attributes: std::collections::HashMap::new(),
        })),
    })
}

/// Convert a [`GatewayResponse`] into a hyper response, keeping the body
/// streamed.
fn convert_gateway_response(
    resp: GatewayResponse,
) -> Result<Response<Body>, crate::core::GatewayError> {
    let mut builder = Response::builder().status(resp.status);
    let headers = builder.headers_mut().ok_or_else(|| {
        crate::core::GatewayError::Other("failed to build response: invalid status".into())
    })?;
    *headers = resp.headers;

    builder
        .body(resp.body)
        .map_err(|e| crate::core::GatewayError::Other(e.to_string()))
}

/// Build a gateway-originated JSON response.
fn json_response(status: u16, body: Vec<u8>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("static response cannot fail to build")
}

/// Attach credentialed CORS headers when the request came from an allowed
/// origin.
fn with_cors_headers(mut response: Response<Body>, origin: Option<&str>) -> Response<Body> {
    if let Some(origin) = origin {
        CorsGuard::apply_response_headers(origin, response.headers_mut());
    }
    response
}

fn envelope_response(
    status: u16,
    envelope: &Envelope,
    cors_origin: Option<&str>,
) -> Response<Body> {
    with_cors_headers(json_response(status, envelope.to_bytes()), cors_origin)
}

/// Handle one inbound request end to end.
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<ServerState>,
    client_ip: String,
) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    debug!("Received request: {method} {path}");

    /* ---------- CORS guard, before anything is served ---------- */
    let origin = req
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let decision = state.cors.evaluate(origin.as_deref());

    let cors_origin = match &decision {
        CorsDecision::Rejected(origin) => {
            warn_fmt!("Cors", "rejected origin {origin} for {method} {path}");
            let err = crate::core::GatewayError::CorsRejected(origin.clone());
            let (status, envelope) = envelope::translate(&err, state.production);
            return Ok(envelope_response(status, &envelope, None));
        }
        CorsDecision::Allowed(origin) => Some(origin.clone()),
        CorsDecision::NotApplicable => None,
    };

    // Preflight is answered locally; upstreams never see OPTIONS probes.
    if method == hyper::Method::OPTIONS
        && req.headers().contains_key("access-control-request-method")
    {
        if let Some(origin) = &cors_origin {
            let requested = req
                .headers()
                .get("access-control-request-headers")
                .and_then(|v| v.to_str().ok());
            let headers = CorsGuard::preflight_headers(origin, requested);

            let mut response = Response::builder()
                .status(204)
                .body(Body::from(""))
                .expect("static response cannot fail to build");
            *response.headers_mut() = headers;
            return Ok(response);
        }
    }

    /* ---------- local endpoints ---------- */
    // Served after the guard: a browser frontend must be able to read these,
    // and a disallowed origin gets the same 403 as everywhere else.
    if method == hyper::Method::GET && path == "/health" {
        let response = json_response(200, admin::health_body(&state.services));
        return Ok(with_cors_headers(response, cors_origin.as_deref()));
    }
    if method == hyper::Method::GET && path == "/" {
        let response = json_response(200, admin::root_body());
        return Ok(with_cors_headers(response, cors_origin.as_deref()));
    }

    /* ---------- convert and dispatch ---------- */
    let gateway_req = match convert_hyper_request(req, client_ip).await {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to read request {method} {path}: {e}");
            let (status, envelope) = envelope::translate(&e, state.production);
            return Ok(envelope_response(status, &envelope, cors_origin.as_deref()));
        }
    };

    match state.dispatcher.dispatch(gateway_req).await {
        Ok(gateway_resp) => {
            debug!("Processed {method} {path} -> {}", gateway_resp.status);
            match convert_gateway_response(gateway_resp) {
                Ok(response) => Ok(with_cors_headers(response, cors_origin.as_deref())),
                Err(e) => {
                    error!("Failed to convert response for {method} {path}: {e}");
                    let (status, envelope) = envelope::translate(&e, state.production);
                    Ok(envelope_response(status, &envelope, cors_origin.as_deref()))
                }
            }
        }
        Err(e) => {
            match &e {
                crate::core::GatewayError::RouteNotFound(_) => {
                    warn!("No route for {method} {path}")
                }
                crate::core::GatewayError::Timeout(d) => {
                    warn!("Forward of {method} {path} timed out after {d:?}")
                }
                _ => error_fmt!("Proxy", "{method} {path}: {e}"),
            }
            let (status, envelope) = envelope::translate(&e, state.production);
            Ok(envelope_response(status, &envelope, cors_origin.as_deref()))
        }
    }
}
