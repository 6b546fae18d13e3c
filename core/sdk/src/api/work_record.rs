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

use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{AbortHandle, AbortRegistration};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::api::context_store::{self, ContextMap};

pub const ZOMBIE_FLAG: &str = "zombie";
pub const FLOODED_FLAG: &str = "flooded";
/// Per-rule flags live under this prefix, apart from the zombie and flooded flags.
pub const RULE_FLAG_PREFIX: &str = "rule:";
pub const REQUEST_ID_ATTRIBUTE: &str = "x-request-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkId(pub u64);

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the host knows about an inbound unit of work before it starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub method: String,
    pub path: String,
    pub category: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl WorkRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> WorkRequest {
        WorkRequest {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&String> {
        self.attributes.get(key)
    }
}

#[derive(Debug)]
pub struct WorkRecord {
    id: WorkId,
    request_id: String,
    request: WorkRequest,
    user: Option<String>,
    started: Instant,
    started_at: DateTime<Utc>,
    flags: DashMap<String, bool>,
    abort_handle: AbortHandle,
    interrupts: AtomicU32,
}

impl WorkRecord {
    /// Creates the record together with the registration that makes its unit of
    /// work abortable through [`WorkRecord::interrupt`].
    pub fn new(
        id: WorkId,
        request: WorkRequest,
        user: Option<String>,
    ) -> (WorkRecord, AbortRegistration) {
        Self::new_with_start(id, request, user, Instant::now())
    }

    pub fn new_with_start(
        id: WorkId,
        request: WorkRequest,
        user: Option<String>,
        started: Instant,
    ) -> (WorkRecord, AbortRegistration) {
        let (abort_handle, registration) = AbortHandle::new_pair();
        let request_id = request
            .attribute(REQUEST_ID_ATTRIBUTE)
            .cloned()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let record = WorkRecord {
            id,
            request_id,
            request,
            user,
            started,
            started_at: Utc::now(),
            flags: DashMap::new(),
            abort_handle,
            interrupts: AtomicU32::new(0),
        };
        (record, registration)
    }

    pub fn id(&self) -> WorkId {
        self.id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn request(&self) -> &WorkRequest {
        &self.request
    }

    pub fn method(&self) -> &str {
        &self.request.method
    }

    pub fn path(&self) -> &str {
        &self.request.path
    }

    pub fn category(&self) -> Option<&str> {
        self.request.category.as_deref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.request.method, self.request.path)
    }

    /// Looks up a classification field by name; unknown names fall back to the
    /// request attributes.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "method" => Some(self.request.method.clone()),
            "path" => Some(self.request.path.clone()),
            "category" | "service" => self.request.category.clone(),
            "user" => self.user.clone(),
            other => self.request.attribute(other).cloned(),
        }
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn age(&self) -> Duration {
        self.age_at(Instant::now())
    }

    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).map(|v| *v).unwrap_or(false)
    }

    pub fn set_flag(&self, name: &str, value: bool) {
        self.flags.insert(name.to_owned(), value);
    }

    /// Sets the flag and reports whether this call was the one that raised it.
    pub fn raise_flag_once(&self, name: &str) -> bool {
        !self.flags.insert(name.to_owned(), true).unwrap_or(false)
    }

    pub fn flags(&self) -> BTreeMap<String, bool> {
        self.flags
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    pub fn is_zombie(&self) -> bool {
        self.flag(ZOMBIE_FLAG)
    }

    pub fn is_flooded(&self) -> bool {
        self.flag(FLOODED_FLAG)
    }

    pub fn rule_flag(&self, rule: &str) -> bool {
        self.flag(&format!("{}{}", RULE_FLAG_PREFIX, rule))
    }

    pub fn set_rule_flag(&self, rule: &str) {
        self.set_flag(&format!("{}{}", RULE_FLAG_PREFIX, rule), true);
    }

    /// Aborts the unit of work at its next await point. Has no effect once the
    /// unit of work finished.
    pub fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        self.abort_handle.abort();
    }

    pub fn interrupt_count(&self) -> u32 {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn is_interrupted(&self) -> bool {
        self.abort_handle.is_aborted()
    }

    /// Request derived metadata that seeds the context store of the unit of work.
    pub fn context(&self) -> ContextMap {
        let mut ctx = ContextMap::new();
        ctx.insert(context_store::WORK_ID.into(), self.id.to_string());
        ctx.insert(context_store::REQUEST_ID.into(), self.request_id.clone());
        ctx.insert(context_store::METHOD.into(), self.request.method.clone());
        ctx.insert(context_store::PATH.into(), self.request.path.clone());
        if let Some(category) = &self.request.category {
            ctx.insert(context_store::CATEGORY.into(), category.clone());
        }
        if let Some(user) = &self.user {
            ctx.insert(context_store::USER.into(), user.clone());
        }
        ctx
    }
}
