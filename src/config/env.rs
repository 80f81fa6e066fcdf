// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variable-based configuration provider.
//!
//! Two families of variables are recognised:
//!
//! - Prefixed variables (`EGATE_SERVER_PORT` -> `server.port`), the generic
//!   mechanism.
//! - The flat names the deployment scripts already export (`GATEWAY_PORT`,
//!   `AUTH_SERVICE_URL`, `NODE_ENV`, ...), mapped through a fixed alias
//!   table. Prefixed variables win when both are set.

use std::collections::HashMap;
use std::env;

use serde_json::{Value, json};

use super::ConfigError;
use super::ConfigProvider;

/// Flat deployment variables and the config keys they populate.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("GATEWAY_PORT", "server.port"),
    ("NODE_ENV", "environment"),
    ("FRONTEND_URL", "cors.frontend_url"),
    ("AUTH_SERVICE_URL", "services.auth"),
    ("DOCUMENTS_SERVICE_URL", "services.documents"),
    ("DEPARTMENTS_SERVICE_URL", "services.departments"),
    ("FILES_SERVICE_URL", "services.files"),
];

/// Configuration provider backed by process environment variables.
#[derive(Debug)]
pub struct EnvConfigProvider {
    /// Prefix for namespaced variables (e.g. "EGATE_").
    prefix: String,
    /// Snapshot of matching variables, keyed by config key.
    cache: HashMap<String, String>,
}

impl EnvConfigProvider {
    /// Create a provider with the given prefix and take a snapshot of the
    /// environment.
    pub fn new(prefix: &str) -> Self {
        let mut provider = Self {
            prefix: prefix.to_string(),
            cache: HashMap::new(),
        };
        provider.refresh_cache();
        provider
    }

    /// Re-read the environment. Aliases load first so prefixed variables
    /// override them.
    pub fn refresh_cache(&mut self) {
        self.cache.clear();

        for (var, key) in ENV_ALIASES {
            if let Ok(value) = env::var(var) {
                self.cache.insert((*key).to_string(), value);
            }
        }

        for (key, value) in env::vars() {
            if key.starts_with(&self.prefix) {
                // EGATE_SERVER_PORT -> server.port
                let config_key = key[self.prefix.len()..].to_lowercase().replace('_', ".");
                self.cache.insert(config_key, value);
            }
        }
    }

    /// Interpret an environment string as the most specific JSON value it
    /// parses to, falling back to a plain string.
    fn parse_value_to_json(&self, value: &str) -> Result<Value, ConfigError> {
        if let Ok(json_value) = serde_json::from_str(value) {
            return Ok(json_value);
        }

        if value.eq_ignore_ascii_case("true") {
            return Ok(json!(true));
        } else if value.eq_ignore_ascii_case("false") {
            return Ok(json!(false));
        }

        if let Ok(int_val) = value.parse::<i64>() {
            return Ok(json!(int_val));
        }

        if let Ok(float_val) = value.parse::<f64>() {
            return Ok(json!(float_val));
        }

        Ok(json!(value))
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new("EGATE_")
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        match self.cache.get(key) {
            Some(value) => self.parse_value_to_json(value).map(Some),
            None => Ok(None),
        }
    }

    fn has(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    fn provider_name(&self) -> &str {
        "env"
    }
}
