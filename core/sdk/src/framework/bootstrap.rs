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

use async_trait::async_trait;
use log::{debug, error};

use crate::utils::error::TrackerError;

pub struct Bootstrap<S: Clone> {
    state: S,
}

impl<S: Clone> Bootstrap<S> {
    pub fn new(s: S) -> Bootstrap<S> {
        Bootstrap { state: s }
    }

    pub async fn step(&self, s: impl Bootstep<S>) -> Result<&Self, TrackerError> {
        debug!(">>>Starting Bootstep {}<<<", s.get_name());
        if let Err(e) = s.setup(self.state.clone()).await {
            error!("Bootstep {} failed: {}", s.get_name(), e);
            return Err(e);
        }

        debug!("---Successful Bootstep {}---", s.get_name());
        Ok(self)
    }
}

#[async_trait]
pub trait Bootstep<S: Clone> {
    fn get_name(&self) -> String;
    async fn setup(&self, s: S) -> Result<(), TrackerError>;
}
