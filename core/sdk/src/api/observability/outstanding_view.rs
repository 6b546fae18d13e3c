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

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    api::work_record::WorkRecord,
    runtime::registry::OutstandingRegistry,
    utils::time_utils::{format_age, to_iso8601},
};

/*
Read only picture of the outstanding registry for live triage. Operators get it
either as an HTML table or as JSON.
*/
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutstandingEntry {
    pub work_id: u64,
    pub request_id: String,
    pub label: String,
    pub category: Option<String>,
    pub user: Option<String>,
    pub started_at: String,
    pub age_ms: u64,
    pub flags: BTreeMap<String, bool>,
}

impl OutstandingEntry {
    fn from_record(record: &WorkRecord, now: Instant) -> Self {
        OutstandingEntry {
            work_id: record.id().0,
            request_id: record.request_id().to_owned(),
            label: record.label(),
            category: record.category().map(str::to_owned),
            user: record.user().map(str::to_owned),
            started_at: to_iso8601(record.started_at()),
            age_ms: record.age_at(now).as_millis() as u64,
            flags: record.flags(),
        }
    }

    fn raised_flags(&self) -> String {
        let raised: Vec<&str> = self
            .flags
            .iter()
            .filter(|(_, v)| **v)
            .map(|(k, _)| k.as_str())
            .collect();
        raised.join(",")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutstandingView {
    pub captured_at: String,
    pub entries: Vec<OutstandingEntry>,
}

impl OutstandingView {
    pub fn capture(registry: &OutstandingRegistry) -> Self {
        Self::capture_at(registry, Instant::now())
    }

    pub fn capture_at(registry: &OutstandingRegistry, now: Instant) -> Self {
        let entries = registry
            .snapshot()
            .iter()
            .map(|r| OutstandingEntry::from_record(r, now))
            .collect();
        OutstandingView {
            captured_at: to_iso8601(Utc::now()),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn to_html(&self) -> String {
        let mut html = String::from("<table>\n");
        html.push_str(
            "<tr><th>Request</th><th>Category</th><th>User</th><th>Started</th><th>Age</th><th>Flags</th></tr>\n",
        );
        for e in &self.entries {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape_html(&e.label),
                escape_html(e.category.as_deref().unwrap_or("")),
                escape_html(e.user.as_deref().unwrap_or("")),
                e.started_at,
                format_age(std::time::Duration::from_millis(e.age_ms)),
                e.raised_flags()
            ));
        }
        html.push_str("</table>\n");
        html
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
