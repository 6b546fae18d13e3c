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

use std::{sync::Arc, time::Duration};

use worktrack_sdk::{
    api::config::TrackerConfig, runtime::lifecycle::WorkTracker, utils::error::TrackerError,
};

use crate::service::demo_host::{AuthorizationIdentity, DemoHost};

const SLOW_WORK: Duration = Duration::from_millis(1500);

#[derive(Clone)]
pub struct BootstrapState {
    pub config: Arc<TrackerConfig>,
    pub tracker: WorkTracker,
    pub host: DemoHost,
}

impl BootstrapState {
    pub fn build(config: TrackerConfig) -> Result<BootstrapState, TrackerError> {
        let tracker = WorkTracker::builder(config.clone())
            .with_identity_provider(AuthorizationIdentity)
            .build()?;
        let host = DemoHost::new(tracker.clone(), SLOW_WORK);
        Ok(BootstrapState {
            config: Arc::new(config),
            tracker,
            host,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = TrackerConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            BootstrapState::build(config),
            Err(TrackerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_build_with_defaults() {
        let state = BootstrapState::build(TrackerConfig::default()).unwrap();
        assert!(state.tracker.registry().is_empty());
        assert!(!state.tracker.is_running());
    }
}
