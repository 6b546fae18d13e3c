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

use std::{cell::RefCell, collections::BTreeMap, future::Future};

use crate::utils::error::TrackerError;

/*
Execution scoped diagnostic context. Async units of work carry their context in a
task local scope; closures running on the blocking pool carry it in a thread local
that is installed and cleared around the closure. The task scope wins when both exist.
*/
pub type ContextMap = BTreeMap<String, String>;

pub const WORK_ID: &str = "work_id";
pub const REQUEST_ID: &str = "request_id";
pub const METHOD: &str = "method";
pub const PATH: &str = "path";
pub const CATEGORY: &str = "category";
pub const USER: &str = "user";

tokio::task_local! {
    static TASK_CONTEXT: RefCell<ContextMap>;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<ContextMap>> = const { RefCell::new(None) };
}

pub struct ContextStore;

impl ContextStore {
    /// Runs `fut` with `initial` as its context. The context is dropped when the
    /// future completes, is cancelled or panics.
    pub async fn scope<F>(initial: ContextMap, fut: F) -> F::Output
    where
        F: Future,
    {
        TASK_CONTEXT.scope(RefCell::new(initial), fut).await
    }

    pub fn sync_scope<R>(initial: ContextMap, f: impl FnOnce() -> R) -> R {
        TASK_CONTEXT.sync_scope(RefCell::new(initial), f)
    }

    /// Installs `context` on the current thread until the returned guard drops.
    pub fn install_thread(context: ContextMap) -> ThreadContextGuard {
        let previous = THREAD_CONTEXT.with(|c| c.replace(Some(context)));
        ThreadContextGuard { previous }
    }

    pub fn is_active() -> bool {
        TASK_CONTEXT.try_with(|_| ()).is_ok() || THREAD_CONTEXT.with(|c| c.borrow().is_some())
    }

    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Result<Option<String>, TrackerError> {
        let (key, value) = (key.into(), value.into());
        Self::with_mut(move |map| map.insert(key, value))
    }

    pub fn remove(key: &str) -> Result<Option<String>, TrackerError> {
        Self::with_mut(|map| map.remove(key))
    }

    pub fn get(key: &str) -> Option<String> {
        Self::with(|map| map.get(key).cloned()).flatten()
    }

    /// Copy of the current context, empty outside of any scope.
    pub fn snapshot() -> ContextMap {
        Self::with(|map| map.clone()).unwrap_or_default()
    }

    /// Empties the current context without closing the scope.
    pub fn clear() {
        let _ = Self::with_mut(|map| map.clear());
    }

    /// Renders the current context as `{k=v, ...}`, or `None` when it is empty.
    pub fn render() -> Option<String> {
        Self::with(|map| {
            if map.is_empty() {
                return None;
            }
            let pairs: Vec<String> = map.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            Some(format!("{{{}}}", pairs.join(", ")))
        })
        .flatten()
    }

    fn with<R>(f: impl FnOnce(&ContextMap) -> R) -> Option<R> {
        let mut f = Some(f);
        // try_borrow keeps a log call made while the map is borrowed from panicking
        if let Ok(r) = TASK_CONTEXT.try_with(|c| match c.try_borrow() {
            Ok(map) => f.take().map(|f| f(&map)),
            Err(_) => None,
        }) {
            return r;
        }
        THREAD_CONTEXT.with(|c| match c.try_borrow() {
            Ok(slot) => match (slot.as_ref(), f.take()) {
                (Some(map), Some(f)) => Some(f(map)),
                _ => None,
            },
            Err(_) => None,
        })
    }

    fn with_mut<R>(f: impl FnOnce(&mut ContextMap) -> R) -> Result<R, TrackerError> {
        let mut f = Some(f);
        if let Ok(r) = TASK_CONTEXT.try_with(|c| {
            let mut map = c.borrow_mut();
            f.take().map(|f| f(&mut map))
        }) {
            return r.ok_or(TrackerError::ContextNotInitialized);
        }
        THREAD_CONTEXT.with(|c| {
            let mut slot = c.borrow_mut();
            match (slot.as_mut(), f.take()) {
                (Some(map), Some(f)) => Ok(f(map)),
                _ => Err(TrackerError::ContextNotInitialized),
            }
        })
    }
}

/// Restores whatever the thread carried before the install, normally nothing.
pub struct ThreadContextGuard {
    previous: Option<ContextMap>,
}

impl Drop for ThreadContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        THREAD_CONTEXT.with(|c| {
            c.replace(previous);
        });
    }
}

pub fn context_of(pairs: &[(&str, &str)]) -> ContextMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
