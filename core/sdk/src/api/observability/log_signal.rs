use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::{
    context_store::{ContextMap, ContextStore},
    work_record::WorkRecord,
};

/*

Abstractions around ease of use contextual logging
*/
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkSummary {
    pub work_id: u64,
    pub request_id: String,
    pub label: String,
    pub age_ms: u64,
    pub flags: BTreeMap<String, bool>,
}

impl From<&WorkRecord> for WorkSummary {
    fn from(record: &WorkRecord) -> Self {
        WorkSummary {
            work_id: record.id().0,
            request_id: record.request_id().to_owned(),
            label: record.label(),
            age_ms: record.age().as_millis() as u64,
            flags: record.flags(),
        }
    }
}

impl std::fmt::Display for WorkSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "work_id={}, request_id={}, label={}, age_ms={}",
            self.work_id, self.request_id, self.label, self.age_ms
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogSignal {
    message: String,
    diagnostic_context: ContextMap,
    work: WorkSummary,
}

impl std::fmt::Display for LogSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "message={}, diagnostic_context={}, work={}",
            self.message,
            diagnostic_context_to_string(&self.diagnostic_context),
            self.work
        )
    }
}

fn diagnostic_context_to_string(diagnostic_context: &ContextMap) -> String {
    let mut diagnostic_context_string = String::new();
    for (key, value) in diagnostic_context {
        diagnostic_context_string.push_str(&format!("{}:{} ", key, value));
    }
    diagnostic_context_string
}

impl From<LogSignal> for serde_json::Value {
    fn from(signal: LogSignal) -> serde_json::Value {
        serde_json::to_value(signal).unwrap_or(serde_json::Value::Null)
    }
}

impl LogSignal {
    pub fn new(message: impl Into<String>, record: &WorkRecord) -> Self {
        LogSignal {
            message: message.into(),
            diagnostic_context: ContextMap::new(),
            work: record.into(),
        }
    }

    pub fn with_diagnostic_context(mut self, diagnostic_context: ContextMap) -> Self {
        self.diagnostic_context = diagnostic_context;
        self
    }

    /// Attaches whatever the context store holds for the caller.
    pub fn with_current_context(self) -> Self {
        self.with_diagnostic_context(ContextStore::snapshot())
    }

    pub fn with_entry(mut self, key: &str, value: impl ToString) -> Self {
        self.diagnostic_context
            .insert(key.to_owned(), value.to_string());
        self
    }
}
