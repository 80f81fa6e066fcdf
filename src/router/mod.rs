// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The route table: literal path-prefix rules mapping to upstream base URLs.
//!
//! Matching is prefix-based over path *segments*, never raw substrings, so
//! `/api/auth2` does not match the prefix `/api/auth`. Comparison is
//! case-sensitive and trailing slashes are normalized away first. When more
//! than one prefix matches, the longest one wins; two identical prefixes are
//! rejected when the table is built, so precedence is never decided by
//! declaration order.
//!
//! The table is immutable after startup and shared read-only across all
//! request handlers (`Arc<RouteTable>`), which is why resolution needs no
//! locking.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};

/// A single routing rule: a literal path-segment prefix and the upstream
/// base URL it forwards to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Literal path prefix, e.g. `/api/auth`.
    pub prefix: String,
    /// Opaque base URL of the upstream service. The gateway holds no
    /// knowledge of the upstream's internals or health.
    pub upstream: String,
}

impl Route {
    pub fn new(prefix: &str, upstream: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            upstream: upstream.to_string(),
        }
    }

    /// The part of `path` after this route's prefix, always starting with
    /// `/`. The matched prefix is stripped before forwarding, so
    /// `/api/auth/login` against prefix `/api/auth` forwards to
    /// `<upstream>/login`.
    pub fn remainder(&self, path: &str) -> String {
        let path = normalize(path);
        let prefix_len = segments(&self.prefix).count();
        let rest: Vec<&str> = segments(path).skip(prefix_len).collect();
        if rest.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", rest.join("/"))
        }
    }
}

/// The upstream base URLs for the four backend services, mirroring the
/// deployment's service registry. Serialized verbatim by the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct UpstreamServices {
    pub auth: String,
    pub documents: String,
    pub departments: String,
    pub files: String,
}

impl Default for UpstreamServices {
    fn default() -> Self {
        Self {
            auth: "http://localhost:3002".to_string(),
            documents: "http://localhost:3003".to_string(),
            departments: "http://localhost:3004".to_string(),
            files: "http://localhost:3005".to_string(),
        }
    }
}

impl UpstreamServices {
    /// Read `services.*` from configuration, falling back to the local
    /// defaults for anything unset.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            auth: config.get_or_default("services.auth", defaults.auth)?,
            documents: config.get_or_default("services.documents", defaults.documents)?,
            departments: config.get_or_default("services.departments", defaults.departments)?,
            files: config.get_or_default("services.files", defaults.files)?,
        })
    }

    /// The built-in route set of the gateway. Two document prefixes share
    /// one upstream; that is deliberate, failure isolation is per service,
    /// not per prefix.
    pub fn default_routes(&self) -> Vec<Route> {
        vec![
            Route::new("/api/auth", &self.auth),
            Route::new("/api/incoming-documents", &self.documents),
            Route::new("/api/outgoing-documents", &self.documents),
            Route::new("/api/departments", &self.departments),
            Route::new("/api/files", &self.files),
        ]
    }
}

/// Immutable longest-prefix route table.
#[derive(Debug)]
pub struct RouteTable {
    /// Routes sorted by prefix segment count, longest first, so the first
    /// match during resolution is the longest match.
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build and validate a table. Fails on empty or non-absolute prefixes,
    /// empty upstreams, and duplicate prefixes; these are startup errors,
    /// never resolved implicitly at request time.
    pub fn new(routes: Vec<Route>) -> Result<Self, ConfigError> {
        let mut seen: HashSet<Vec<String>> = HashSet::new();

        for route in &routes {
            if !route.prefix.starts_with('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "route prefix must start with '/': '{}'",
                    route.prefix
                )));
            }
            let segs: Vec<String> = segments(&route.prefix).map(str::to_string).collect();
            if segs.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "route prefix must contain at least one segment".to_string(),
                ));
            }
            if route.upstream.trim().is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "route '{}' has an empty upstream URL",
                    route.prefix
                )));
            }
            if !seen.insert(segs) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate route prefix '{}'",
                    normalize(&route.prefix)
                )));
            }
        }

        let mut routes = routes;
        routes.sort_by_key(|r| std::cmp::Reverse(segments(&r.prefix).count()));

        Ok(Self { routes })
    }

    /// Build the table from configuration: the `routes` array when present,
    /// otherwise the built-in set derived from `services.*`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let configured: Option<Vec<Route>> = config.get("routes")?;
        let routes = match configured {
            Some(routes) => routes,
            None => UpstreamServices::from_config(config)?.default_routes(),
        };
        Self::new(routes)
    }

    /// Resolve a request path to the unique longest-prefix route, or `None`
    /// when no prefix matches.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let path = normalize(path);
        let path_segs: Vec<&str> = segments(path).collect();

        self.routes.iter().find(|route| {
            let prefix_segs: Vec<&str> = segments(&route.prefix).collect();
            path_segs.len() >= prefix_segs.len()
                && prefix_segs
                    .iter()
                    .zip(path_segs.iter())
                    .all(|(p, s)| p == s)
        })
    }

    /// All routes, longest prefix first.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

/// Strip trailing slashes (but never the leading one).
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

/// Iterate the non-empty segments of a path.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
