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

use std::future::Future;

use log::trace;
use tokio::{runtime::Handle, task::JoinHandle};

use crate::api::context_store::ContextStore;

/// Submits work to a tokio runtime carrying a copy of the submitter's context.
///
/// The copy is taken when `execute` is called. The worker's own changes to the
/// context stay with the worker and are discarded when the task ends, whether it
/// returns, fails or panics. Failures reach the caller through the `JoinHandle`.
#[derive(Debug, Clone)]
pub struct ContextExecutor {
    handle: Handle,
}

impl ContextExecutor {
    pub fn new(handle: Handle) -> Self {
        ContextExecutor { handle }
    }

    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn execute<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let snapshot = ContextStore::snapshot();
        trace!("execute: propagating {} context entries", snapshot.len());
        self.handle.spawn(ContextStore::scope(snapshot, task))
    }

    pub fn execute_blocking<F, R>(&self, task: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let snapshot = ContextStore::snapshot();
        trace!(
            "execute_blocking: propagating {} context entries",
            snapshot.len()
        );
        self.handle.spawn_blocking(move || {
            let _installed = ContextStore::install_thread(snapshot);
            task()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::context_store::{context_of, ContextMap};

    fn single_blocking_thread() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_sees_submit_time_context() {
        let executor = ContextExecutor::current();
        let handle = ContextStore::scope(context_of(&[("user", "alice")]), async {
            let handle = executor.execute(async { ContextStore::snapshot() });
            // later changes in the submitter are not visible to the task
            ContextStore::put("user", "mallory").unwrap();
            handle
        })
        .await;
        assert_eq!(handle.await.unwrap(), context_of(&[("user", "alice")]));
    }

    #[tokio::test]
    async fn test_worker_changes_do_not_flow_back() {
        let executor = ContextExecutor::current();
        let seen = ContextStore::scope(context_of(&[("k", "submitter")]), async {
            executor
                .execute(async {
                    ContextStore::put("k", "worker").unwrap();
                    ContextStore::put("extra", "1").unwrap();
                })
                .await
                .unwrap();
            ContextStore::snapshot()
        })
        .await;
        assert_eq!(seen, context_of(&[("k", "submitter")]));
    }

    #[test]
    fn test_blocking_thread_not_polluted_after_task() {
        let rt = single_blocking_thread();
        let executor = ContextExecutor::new(rt.handle().clone());
        let (first, first_thread) = rt.block_on(ContextStore::scope(
            context_of(&[("request_id", "r-1")]),
            async {
                executor
                    .execute_blocking(|| (ContextStore::snapshot(), std::thread::current().id()))
                    .await
                    .unwrap()
            },
        ));
        assert_eq!(first, context_of(&[("request_id", "r-1")]));

        let (second, second_thread) = rt.block_on(async {
            executor
                .execute_blocking(|| (ContextStore::snapshot(), std::thread::current().id()))
                .await
                .unwrap()
        });
        assert_eq!(first_thread, second_thread);
        assert_eq!(second, ContextMap::new());
    }

    #[test]
    fn test_blocking_failure_still_clears() {
        let rt = single_blocking_thread();
        let executor = ContextExecutor::new(rt.handle().clone());
        let failed = rt.block_on(ContextStore::scope(context_of(&[("k", "v")]), async {
            executor
                .execute_blocking(|| -> () { panic!("task body failed") })
                .await
        }));
        assert!(failed.unwrap_err().is_panic());
        let after = rt.block_on(async {
            executor
                .execute_blocking(ContextStore::snapshot)
                .await
                .unwrap()
        });
        assert!(after.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_many_submitters_no_cross_talk() {
        let executor = ContextExecutor::current();
        let mut handles = vec![];
        for i in 0..50 {
            let executor = executor.clone();
            let id = i.to_string();
            let ctx = context_of(&[("request_id", id.as_str())]);
            handles.push(tokio::spawn(ContextStore::scope(
                ctx,
                async move {
                    let inner = executor.execute(async {
                        tokio::task::yield_now().await;
                        ContextStore::get("request_id")
                    });
                    let blocking = executor.execute_blocking(|| ContextStore::get("request_id"));
                    (id, inner.await.unwrap(), blocking.await.unwrap())
                },
            )));
        }
        for h in handles {
            let (id, inner, blocking) = h.await.unwrap();
            assert_eq!(inner.as_deref(), Some(id.as_str()));
            assert_eq!(blocking.as_deref(), Some(id.as_str()));
        }
    }
}
