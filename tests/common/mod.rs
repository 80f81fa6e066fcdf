// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared helpers for the integration tests: an in-memory config provider
//! and a harness that boots a real gateway on a free port.

use std::net::TcpListener;
use std::time::Duration;

use egate::{ConfigError, ConfigProvider, Gateway};
use serde_json::Value;

/// Serves a JSON document as a configuration provider.
#[derive(Debug)]
pub struct TestConfigProvider(pub Value);

impl ConfigProvider for TestConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.get_raw(key).map(|v| v.is_some()).unwrap_or(false)
    }

    fn provider_name(&self) -> &str {
        "test"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        let mut current = &self.0;
        for part in key.split('.') {
            match current.get(part) {
                Some(v) => current = v,
                None => return Ok(None),
            }
        }
        Ok(Some(current.clone()))
    }
}

/// Ask the OS for a free port.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Boot a gateway with the given configuration on a free port and wait for
/// it to answer. Returns the base URL; the server task dies with the test's
/// runtime.
pub async fn start_gateway(mut config: Value) -> String {
    let port = free_port();
    config["server"] = serde_json::json!({"host": "127.0.0.1", "port": port});

    let gateway = Gateway::loader()
        .with_provider(TestConfigProvider(config))
        .build()
        .expect("gateway should assemble");

    tokio::spawn(async move {
        let _ = gateway.start().await;
    });

    let base = format!("http://127.0.0.1:{port}");
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client.get(format!("{base}/health")).send().await.is_ok() {
            return base;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("gateway did not come up on {base}");
}
