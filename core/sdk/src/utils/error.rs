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

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum TrackerError {
    /// Context was written outside of any unit of work scope.
    ContextNotInitialized,
    InvalidConfig(String),
    ConfigNotFound(String),
    ParseError(String),
    /// The unit of work with this id was interrupted by the zombie detector.
    Interrupted(u64),
    ShutdownTimeout,
    NotStarted,
    AlreadyStarted,
    BootstrapError,
}

impl std::fmt::Display for TrackerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerError::ContextNotInitialized => {
                write!(f, "context store used outside of a unit of work")
            }
            TrackerError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            TrackerError::ConfigNotFound(path) => write!(f, "configuration not found: {}", path),
            TrackerError::ParseError(reason) => write!(f, "parse error: {}", reason),
            TrackerError::Interrupted(id) => write!(f, "unit of work {} was interrupted", id),
            TrackerError::ShutdownTimeout => write!(f, "timed out waiting for shutdown"),
            TrackerError::NotStarted => write!(f, "tracker not started"),
            TrackerError::AlreadyStarted => write!(f, "tracker already started"),
            TrackerError::BootstrapError => write!(f, "bootstrap failure"),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        TrackerError::ParseError(e.to_string())
    }
}

impl From<regex::Error> for TrackerError {
    fn from(e: regex::Error) -> Self {
        TrackerError::InvalidConfig(e.to_string())
    }
}
