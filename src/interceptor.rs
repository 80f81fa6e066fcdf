// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The ordered request interceptor chain.
//!
//! Interceptors are the gateway's extension seam: cross-cutting concerns
//! (request logging today; rate limiting or hardened headers tomorrow) hook
//! into dispatch without restructuring it. The chain runs `before` hooks in
//! configuration order ahead of route resolution and `after` hooks in
//! reverse order once the upstream has answered.
//!
//! Built-ins:
//!
//! | type      | purpose                                   |
//! |-----------|-------------------------------------------|
//! | `logging` | timestamped request/response lines        |
//! | `header`  | add/remove request and response headers   |
//!
//! External interceptors register through [`register_interceptor`] before
//! the gateway is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{GatewayError, GatewayRequest, GatewayResponse};

/// A hook pair around dispatch.
#[async_trait]
pub trait Interceptor: fmt::Debug + Send + Sync {
    /// Name for diagnostics and configuration.
    fn name(&self) -> &str;

    /// Runs before route resolution. May rewrite the request.
    async fn before(&self, request: GatewayRequest) -> Result<GatewayRequest, GatewayError> {
        Ok(request)
    }

    /// Runs after the upstream response arrives. May rewrite the response.
    async fn after(
        &self,
        _request: GatewayRequest,
        response: GatewayResponse,
    ) -> Result<GatewayResponse, GatewayError> {
        Ok(response)
    }
}

/// Constructor signature every dynamically registered interceptor implements.
pub type InterceptorConstructor = fn(Value) -> Result<Arc<dyn Interceptor>, GatewayError>;

/// Global registry: `register_interceptor()` writes to it,
/// `InterceptorFactory::create()` reads from it.
static INTERCEPTOR_REGISTRY: Lazy<RwLock<HashMap<String, InterceptorConstructor>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register an interceptor constructor under a unique name. Call this before
/// building the gateway so configuration can reference the name.
pub fn register_interceptor(name: &str, ctor: InterceptorConstructor) {
    INTERCEPTOR_REGISTRY
        .write()
        .expect("INTERCEPTOR_REGISTRY poisoned")
        .insert(name.to_string(), ctor);
}

fn get_registered_interceptor(name: &str) -> Option<InterceptorConstructor> {
    INTERCEPTOR_REGISTRY
        .read()
        .expect("INTERCEPTOR_REGISTRY poisoned")
        .get(name)
        .copied()
}

/// One entry of the `interceptors` configuration array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorConfig {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub config: Value,
}

/// Configuration for the logging interceptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingInterceptorConfig {
    /// Level for the per-request lines
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingInterceptorConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Logs one line per request on the way in and one with the status on the
/// way out, the gateway's original access log.
#[derive(Debug, Default)]
pub struct LoggingInterceptor {
    config: LoggingInterceptorConfig,
}

impl LoggingInterceptor {
    pub fn new(config: LoggingInterceptorConfig) -> Self {
        Self { config }
    }

    fn level(&self) -> log::Level {
        match self.config.level.to_lowercase().as_str() {
            "error" => log::Level::Error,
            "warn" => log::Level::Warn,
            "debug" => log::Level::Debug,
            "trace" => log::Level::Trace,
            _ => log::Level::Info,
        }
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before(&self, request: GatewayRequest) -> Result<GatewayRequest, GatewayError> {
        log::log!(
            self.level(),
            "{} - [Gateway] {} {}",
            chrono::Utc::now().to_rfc3339(),
            request.method,
            request.path
        );
        Ok(request)
    }

    async fn after(
        &self,
        request: GatewayRequest,
        response: GatewayResponse,
    ) -> Result<GatewayResponse, GatewayError> {
        let elapsed = request
            .context
            .read()
            .await
            .start_time
            .map(|t| t.elapsed());
        match elapsed {
            Some(elapsed) => log::log!(
                self.level(),
                "[Gateway] {} {} -> {} ({elapsed:?})",
                request.method,
                request.path,
                response.status
            ),
            None => log::log!(
                self.level(),
                "[Gateway] {} {} -> {}",
                request.method,
                request.path,
                response.status
            ),
        }
        Ok(response)
    }
}

/// Configuration for the header interceptor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HeaderInterceptorConfig {
    #[serde(default)]
    pub add_request_headers: HashMap<String, String>,
    #[serde(default)]
    pub remove_request_headers: Vec<String>,
    #[serde(default)]
    pub add_response_headers: HashMap<String, String>,
    #[serde(default)]
    pub remove_response_headers: Vec<String>,
}

/// Adds or removes headers on either side of the forward.
#[derive(Debug, Default)]
pub struct HeaderInterceptor {
    config: HeaderInterceptorConfig,
}

impl HeaderInterceptor {
    pub fn new(config: HeaderInterceptorConfig) -> Self {
        Self { config }
    }

    fn apply(
        headers: &mut reqwest::header::HeaderMap,
        add: &HashMap<String, String>,
        remove: &[String],
    ) {
        for name in remove {
            if let Ok(name) = reqwest::header::HeaderName::from_bytes(name.as_bytes()) {
                headers.remove(&name);
            }
        }
        for (name, value) in add {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
    }
}

#[async_trait]
impl Interceptor for HeaderInterceptor {
    fn name(&self) -> &str {
        "header"
    }

    async fn before(&self, mut request: GatewayRequest) -> Result<GatewayRequest, GatewayError> {
        Self::apply(
            &mut request.headers,
            &self.config.add_request_headers,
            &self.config.remove_request_headers,
        );
        Ok(request)
    }

    async fn after(
        &self,
        _request: GatewayRequest,
        mut response: GatewayResponse,
    ) -> Result<GatewayResponse, GatewayError> {
        Self::apply(
            &mut response.headers,
            &self.config.add_response_headers,
            &self.config.remove_response_headers,
        );
        Ok(response)
    }
}

/// Builds interceptors from configuration entries.
#[derive(Debug)]
pub struct InterceptorFactory;

impl InterceptorFactory {
    pub fn create(type_: &str, config: Value) -> Result<Arc<dyn Interceptor>, GatewayError> {
        crate::debug_fmt!("Interceptor", "creating '{type_}' with config: {config}");

        if let Some(ctor) = get_registered_interceptor(type_) {
            return ctor(config);
        }

        match type_ {
            "logging" => {
                let config: LoggingInterceptorConfig = parse_config("logging", config)?;
                Ok(Arc::new(LoggingInterceptor::new(config)))
            }
            "header" => {
                let config: HeaderInterceptorConfig = parse_config("header", config)?;
                Ok(Arc::new(HeaderInterceptor::new(config)))
            }
            _ => Err(GatewayError::InterceptorError(format!(
                "unknown interceptor type: {type_}"
            ))),
        }
    }
}

fn parse_config<T: serde::de::DeserializeOwned + Default>(
    type_: &str,
    config: Value,
) -> Result<T, GatewayError> {
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config).map_err(|e| {
        GatewayError::InterceptorError(format!("invalid {type_} interceptor config: {e}"))
    })
}
