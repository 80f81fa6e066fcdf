// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gateway configuration subsystem.
//!
//! A running gateway is assembled from an ordered list of [`ConfigProvider`]s;
//! later providers override earlier ones. The usual stacking order is:
//!
//! 1. `FileConfigProvider` – `egate.{toml,json,yaml}`
//! 2. `EnvConfigProvider`  – `EGATE_SERVER_PORT=3001`, plus the flat
//!    deployment variables (`GATEWAY_PORT`, `AUTH_SERVICE_URL`, ...)
//!
//! First-class keys:
//!
//! | key | type | default | description |
//! |-----|------|---------|-------------|
//! | `server.host`        | string  | `0.0.0.0`  | Address to bind          |
//! | `server.port`        | u16     | `3001`     | Port to listen on        |
//! | `environment`        | string  | `development` | `production` hides error detail |
//! | `proxy.timeout`      | u64     | `30`       | Per-forward timeout, seconds |
//! | `cors.allowed_origins` | array | derived    | Browser origins allowed  |
//! | `services.*`         | string  | localhost  | Upstream base URLs       |
//! | `routes`             | array   | built-in   | `{prefix, upstream}` rules |
//! | `interceptors`       | array   | –          | `{type, config}` chain   |

mod env;
pub mod error;
mod file;

pub use env::EnvConfigProvider;
pub use error::ConfigError;
pub use file::FileConfigProvider;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// A source of configuration values. Object-safe so providers can be boxed
/// into a chain.
pub trait ConfigProvider: Debug + Send + Sync {
    /// Check whether this provider has a value for the given key.
    fn has(&self, key: &str) -> bool;

    /// Name of the provider, for diagnostics.
    fn provider_name(&self) -> &str;

    /// Get a raw configuration value by dot-separated key.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed access on top of [`ConfigProvider`]. Not object-safe.
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a configuration value and deserialize it into `T`.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ConfigError::ParseError(format!("failed to deserialize '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

/// Builder for the configuration chain.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration provider. Providers added later take precedence.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// The assembled configuration chain.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        // Later providers override earlier ones, so walk the chain backwards.
        for provider in self.providers.iter().rev() {
            if provider.has(key) {
                return provider.get_raw(key);
            }
        }
        Ok(None)
    }

    /// Get a configuration value, taking the first provider (highest
    /// precedence) that knows the key.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ConfigError::ParseError(format!("failed to deserialize '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Get a configuration value with a fallback.
    pub fn get_or_default<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(key)? {
            Some(value) => Ok(value),
            None => Ok(default),
        }
    }
}
