// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gateway entry point.
//!
//! Configuration comes from the environment, optionally layered over a file
//! named by `EGATE_CONFIG_FILE`. Environment variables always win.

use std::env;
use std::process;

use egate::Gateway;

#[tokio::main]
async fn main() {
    let mut loader = Gateway::loader();

    if let Ok(path) = env::var("EGATE_CONFIG_FILE") {
        loader = match loader.with_config_file(&path) {
            Ok(loader) => {
                println!("Loaded config file: {path}");
                loader
            }
            Err(e) => {
                eprintln!("Failed to load config file '{path}': {e}");
                process::exit(1);
            }
        };
    }

    let gateway = match loader.with_env_vars().build() {
        Ok(gateway) => gateway,
        Err(e) => {
            eprintln!("Failed to assemble gateway: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = gateway.start().await {
        eprintln!("Gateway terminated with error: {e}");
        process::exit(1);
    }
}
