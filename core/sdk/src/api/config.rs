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

use std::{collections::HashSet, path::Path, time::Duration};

use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    api::work_record::{WorkRecord, WorkRequest},
    runtime::limiter::{ConnectionLimitRule, RuleMatcher},
    utils::error::TrackerError,
};

pub const CONFIG_PATH_ENV: &str = "WORKTRACK_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "runaway_threshold_secs_default")]
    pub runaway_threshold_secs: u64,
    #[serde(default = "sweep_interval_secs_default")]
    pub sweep_interval_secs: u64,
    #[serde(default = "shutdown_timeout_ms_default")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default)]
    pub connection_limits: Vec<RuleConfig>,
    #[serde(default)]
    pub exclusions: ExclusionConfig,
}

fn runaway_threshold_secs_default() -> u64 {
    300
}

fn sweep_interval_secs_default() -> u64 {
    10
}

fn shutdown_timeout_ms_default() -> u64 {
    2000
}

fn log_level_default() -> String {
    "info".into()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            runaway_threshold_secs: runaway_threshold_secs_default(),
            sweep_interval_secs: sweep_interval_secs_default(),
            shutdown_timeout_ms: shutdown_timeout_ms_default(),
            log_level: log_level_default(),
            connection_limits: Vec::new(),
            exclusions: ExclusionConfig::default(),
        }
    }
}

/*
A connection limit as written in the configuration file. With `equals` or `pattern`
the rule counts every record whose field matches. Without either, records are
grouped by the value of the field and each value gets its own limit.
*/
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    pub limit: usize,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl TrackerConfig {
    /// Loads from the file named by `WORKTRACK_CONFIG`, or defaults when unset.
    pub fn load() -> Result<TrackerConfig, TrackerError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                info!("Loading tracker configuration from {}", path);
                Self::from_file(path)
            }
            Err(_) => {
                info!("{} not set, using default tracker configuration", CONFIG_PATH_ENV);
                Ok(TrackerConfig::default())
            }
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<TrackerConfig, TrackerError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            warn!("error reading tracker configuration {:?}: {:?}", path, e);
            TrackerError::ConfigNotFound(path.display().to_string())
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<TrackerConfig, TrackerError> {
        let config: TrackerConfig = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.runaway_threshold_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "runaway_threshold_secs must be positive".into(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "sweep_interval_secs must be positive".into(),
            ));
        }
        let mut names = HashSet::new();
        for rule in &self.connection_limits {
            if !names.insert(rule.name.as_str()) {
                return Err(TrackerError::InvalidConfig(format!(
                    "duplicate connection limit {}",
                    rule.name
                )));
            }
            rule.to_rule()?;
        }
        self.exclusions.compile()?;
        Ok(())
    }

    pub fn runaway_threshold(&self) -> Duration {
        Duration::from_secs(self.runaway_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }

    pub fn rules(&self) -> Result<Vec<ConnectionLimitRule>, TrackerError> {
        self.connection_limits.iter().map(|r| r.to_rule()).collect()
    }
}

impl RuleConfig {
    pub fn to_rule(&self) -> Result<ConnectionLimitRule, TrackerError> {
        if self.limit == 0 {
            return Err(TrackerError::InvalidConfig(format!(
                "connection limit {} must be positive",
                self.name
            )));
        }
        let field = self.field.clone();
        let matcher = match (&self.equals, &self.pattern) {
            (Some(_), Some(_)) => {
                return Err(TrackerError::InvalidConfig(format!(
                    "connection limit {} has both equals and pattern",
                    self.name
                )))
            }
            (Some(expected), None) => {
                let expected = expected.clone();
                RuleMatcher::predicate(move |r: &WorkRecord| {
                    r.field(&field).as_deref() == Some(expected.as_str())
                })
            }
            (None, Some(pattern)) => {
                let re = Regex::new(pattern)?;
                RuleMatcher::predicate(move |r: &WorkRecord| {
                    r.field(&field).map(|v| re.is_match(&v)).unwrap_or(false)
                })
            }
            (None, None) => RuleMatcher::category(move |r: &WorkRecord| r.field(&field)),
        };
        Ok(ConnectionLimitRule::new(self.name.clone(), self.limit, matcher))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    paths: Vec<Regex>,
    categories: HashSet<String>,
}

impl ExclusionConfig {
    pub fn compile(&self) -> Result<Exclusions, TrackerError> {
        let paths = self
            .paths
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Exclusions {
            paths,
            categories: self.categories.iter().cloned().collect(),
        })
    }
}

impl Exclusions {
    pub fn is_excluded(&self, request: &WorkRequest) -> bool {
        if let Some(category) = &request.category {
            if self.categories.contains(category) {
                return true;
            }
        }
        self.paths.iter().any(|re| re.is_match(&request.path))
    }
}
