// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! egate - a small, configuration-driven API gateway
//!
//! egate is the internal front door for a set of independently deployed
//! backend services. Every inbound request is resolved against an immutable
//! route table and forwarded to exactly one upstream; failures are translated
//! into a uniform JSON envelope so clients never see raw network errors.
//!
//! # Core Principles
//!
//! - **One route, one upstream**: longest-prefix resolution over path
//!   segments, validated at startup. No silent misrouting.
//! - **Failure isolation**: an unreachable upstream yields a 502 for its
//!   routes and nothing else; other services keep serving.
//! - **Uniform boundary**: every gateway-originated response is
//!   `{success, message, error?}`.
//! - **Configuration-driven**: environment variables and/or a config file,
//!   layered through [`ConfigProvider`]s.
//!
//! # Request flow
//!
//! ```text
//! request -> CORS guard -> interceptors (pre) -> route table -> body relay
//!         -> upstream call (bounded timeout) -> interceptors (post)
//!         -> response  (errors: envelope translation)
//! ```
//!
//! # Custom interceptors
//!
//! Cross-cutting concerns (the original deployment kept rate limiting and
//! hardened headers as commented-out middleware) plug in without touching the
//! dispatcher:
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use egate::{Interceptor, GatewayRequest, GatewayResponse, GatewayError};
//!
//! #[derive(Debug)]
//! struct MyInterceptor;
//!
//! #[async_trait]
//! impl Interceptor for MyInterceptor {
//!     fn name(&self) -> &str {
//!         "my_interceptor"
//!     }
//!
//!     async fn before(&self, request: GatewayRequest) -> Result<GatewayRequest, GatewayError> {
//!         Ok(request)
//!     }
//!
//!     async fn after(
//!         &self,
//!         _request: GatewayRequest,
//!         response: GatewayResponse,
//!     ) -> Result<GatewayResponse, GatewayError> {
//!         Ok(response)
//!     }
//! }
//! ```

// Module declarations
pub mod config;
pub mod core;
pub mod cors;
pub mod envelope;
pub mod interceptor;
pub mod loader;
pub mod logging;
pub mod relay;
pub mod router;
pub mod server;

// Re-export key types at the crate root for convenience
pub use config::{Config, ConfigError, ConfigProvider, ConfigProviderExt};
pub use core::{Dispatcher, GatewayError, GatewayRequest, GatewayResponse, RequestContext};
pub use cors::{CorsDecision, CorsGuard};
pub use envelope::Envelope;
pub use interceptor::{
    HeaderInterceptor, Interceptor, InterceptorFactory, LoggingInterceptor, register_interceptor,
};
pub use loader::{Gateway, GatewayLoader, LoaderError};
pub use relay::RelayBody;
pub use router::{Route, RouteTable};
pub use server::{GatewayServer, ServerConfig};
