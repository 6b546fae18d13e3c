// Copyright 2023 Comcast Cable Communications Management, LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0
//

use crate::bootstrap::boot::boot;
use worktrack_sdk::{
    api::config::TrackerConfig,
    log::{error, info},
    tokio,
};

use state::bootstrap_state::BootstrapState;
pub mod bootstrap;
pub mod service;
pub mod state;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main(worker_threads = 2)]
async fn main() {
    let config = match TrackerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("{:?} config load error", e);
            std::process::exit(exitcode::CONFIG);
        }
    };
    let bootstate = match BootstrapState::build(config) {
        Ok(state) => state,
        Err(e) => {
            println!("{:?} failure to init state for bootstrap", e);
            std::process::exit(exitcode::CONFIG);
        }
    };

    match boot(bootstate).await {
        Ok(_) => {
            info!("worktrack {} exited gracefully", VERSION);
            std::process::exit(exitcode::OK);
        }
        Err(e) => {
            error!("worktrack failed with error: {:?}", e);
            std::process::exit(exitcode::SOFTWARE);
        }
    }
}
