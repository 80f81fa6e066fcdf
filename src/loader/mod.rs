// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembles a gateway from layered configuration.
//!
//! The loader is the one place where configuration is read and turned into
//! runtime structure: route table, CORS guard, dispatcher, interceptor chain
//! and server. Everything it produces is immutable afterwards, so invalid
//! configuration fails here, at startup, never mid-request.
//!
//! ```rust,no_run
//! use egate::Gateway;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::loader()
//!     .with_env_vars()
//!     .with_config_file("config.json")?
//!     .build()?;
//!
//! gateway.start().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;
use std::sync::Arc;

use log::LevelFilter;
use thiserror::Error;

use crate::config::{
    Config, ConfigBuilder, ConfigError, ConfigProvider, EnvConfigProvider, FileConfigProvider,
};
use crate::core::{Dispatcher, GatewayError};
use crate::cors::CorsGuard;
use crate::interceptor::{Interceptor, InterceptorConfig, InterceptorFactory};
use crate::logging;
use crate::router::{RouteTable, UpstreamServices};
use crate::server::{GatewayServer, ServerConfig, ServerState};

/// Errors produced while assembling a gateway.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("gateway error: {0}")]
    GatewayError(#[from] GatewayError),
}

/// Builder that layers configuration providers and extension points, then
/// produces a ready-to-start [`Gateway`].
///
/// Providers layer in registration order with the last registered taking
/// precedence, so `with_config_file(..)?.with_env_vars()` gives environment
/// variables the final say.
#[derive(Default)]
pub struct GatewayLoader {
    builder: ConfigBuilder,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl GatewayLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer environment variables: the deployment's well-known names
    /// (`GATEWAY_PORT`, `NODE_ENV`, `FRONTEND_URL`, `*_SERVICE_URL`) plus
    /// anything under the `EGATE_` prefix.
    pub fn with_env_vars(self) -> Self {
        self.with_provider(EnvConfigProvider::default())
    }

    /// Layer prefixed environment variables with a custom prefix.
    pub fn with_env_prefix(self, prefix: &str) -> Self {
        self.with_provider(EnvConfigProvider::new(prefix))
    }

    /// Layer a JSON, TOML or YAML configuration file.
    pub fn with_config_file(self, path: &str) -> Result<Self, LoaderError> {
        let provider = FileConfigProvider::new(path)?;
        Ok(self.with_provider(provider))
    }

    /// Layer an arbitrary configuration provider.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.builder = self.builder.with_provider(provider);
        self
    }

    /// Append a programmatic interceptor. Runs after any configured via the
    /// `interceptors` array.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Validate configuration and assemble the gateway.
    pub fn build(self) -> Result<Gateway, LoaderError> {
        let config = Arc::new(self.builder.build());

        let level = config
            .get::<String>("logging.level")?
            .and_then(|s| LevelFilter::from_str(&s).ok());
        logging::init(level);

        let environment: String =
            config.get_or_default("environment", "development".to_string())?;
        let production = environment == "production";
        crate::info_fmt!("Loader", "assembling gateway (environment: {environment})");

        let table = Arc::new(RouteTable::from_config(&config)?);
        let services = UpstreamServices::from_config(&config)?;
        let cors = CorsGuard::from_config(&config, production)?;

        let mut dispatcher = Dispatcher::new(config.clone(), table)?;

        if let Some(entries) = config.get::<Vec<InterceptorConfig>>("interceptors")? {
            for entry in entries {
                let interceptor = InterceptorFactory::create(&entry.type_, entry.config)?;
                crate::debug_fmt!("Loader", "configured interceptor '{}'", interceptor.name());
                dispatcher.add_interceptor(interceptor);
            }
        }
        for interceptor in self.interceptors {
            crate::debug_fmt!("Loader", "programmatic interceptor '{}'", interceptor.name());
            dispatcher.add_interceptor(interceptor);
        }

        let server_config: ServerConfig = config.get("server")?.unwrap_or_default();

        let server = GatewayServer::new(
            server_config,
            ServerState {
                dispatcher,
                cors,
                services,
                production,
            },
        );

        Ok(Gateway { config, server })
    }
}

/// A fully assembled gateway, ready to serve.
#[derive(Clone)]
pub struct Gateway {
    config: Arc<Config>,
    server: GatewayServer,
}

impl Gateway {
    /// Start building a gateway.
    pub fn loader() -> GatewayLoader {
        GatewayLoader::new()
    }

    /// The layered configuration backing this gateway.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the listener and serve until shutdown.
    pub async fn start(&self) -> Result<(), GatewayError> {
        self.server.start().await
    }
}
