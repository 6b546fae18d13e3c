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

use std::sync::Arc;

use dashmap::DashMap;
use log::{trace, warn};

use crate::api::work_record::{WorkId, WorkRecord};

const OUTSTANDING_SIZE_WARNING: usize = 1000;

/// Every unit of work currently executing, keyed by id.
#[derive(Debug, Default)]
pub struct OutstandingRegistry {
    records: DashMap<WorkId, Arc<WorkRecord>>,
}

impl OutstandingRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn add(&self, record: Arc<WorkRecord>) {
        let id = record.id();
        if self.records.insert(id, record).is_some() {
            warn!("add: replaced outstanding record with duplicate id {}", id);
        }
        let size = self.records.len();
        trace!("add: registered {} outstanding={}", id, size);
        if size >= OUTSTANDING_SIZE_WARNING && size % OUTSTANDING_SIZE_WARNING == 0 {
            warn!("add: outstanding registry size warning: {}", size);
        }
    }

    /// Removes the record with the same id. Returns `false` if it was already gone.
    pub fn remove(&self, record: &WorkRecord) -> bool {
        self.remove_id(record.id())
    }

    pub fn remove_id(&self, id: WorkId) -> bool {
        let removed = self.records.remove(&id).is_some();
        trace!("remove: {} removed={}", id, removed);
        removed
    }

    pub fn get(&self, id: WorkId) -> Option<Arc<WorkRecord>> {
        self.records.get(&id).map(|e| e.value().clone())
    }

    pub fn contains(&self, id: WorkId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Counts records matching `predicate`. The predicate runs while a shard is
    /// read-locked and must not call back into the registry.
    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&WorkRecord) -> bool,
    {
        self.records.iter().filter(|e| predicate(e.value())).count()
    }

    pub fn snapshot(&self) -> Vec<Arc<WorkRecord>> {
        let mut records: Vec<Arc<WorkRecord>> =
            self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|r| r.id());
        records
    }

    /// Visits a snapshot, so `f` may add or remove records while iterating.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<WorkRecord>),
    {
        for record in self.snapshot() {
            f(&record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::work_record::WorkRequest;
    use rstest::rstest;

    fn record(id: u64, category: &str) -> Arc<WorkRecord> {
        let request = WorkRequest::new("GET", "/items").with_category(category);
        Arc::new(WorkRecord::new(WorkId(id), request, None).0)
    }

    #[test]
    fn test_add_remove_idempotent() {
        let registry = OutstandingRegistry::new();
        let r = record(1, "service");
        registry.add(r.clone());
        assert_eq!(registry.size(), 1);
        assert!(registry.contains(WorkId(1)));
        assert!(registry.remove(&r));
        assert!(!registry.remove(&r));
        assert!(registry.is_empty());
        assert!(registry.get(WorkId(1)).is_none());
    }

    #[rstest(adds, removes, case(10, 0), case(10, 10), case(50, 17))]
    fn test_count_by_predicate(adds: u64, removes: u64) {
        let registry = OutstandingRegistry::new();
        for id in 0..adds {
            let category = if id % 2 == 0 { "service" } else { "static" };
            registry.add(record(id, category));
        }
        for id in 0..removes {
            registry.remove_id(WorkId(id));
        }
        let remaining_service = (removes..adds).filter(|id| id % 2 == 0).count();
        assert_eq!(registry.size(), (adds - removes) as usize);
        assert_eq!(
            registry.count(|r| r.category() == Some("service")),
            remaining_service
        );
    }

    #[test]
    fn test_for_each_may_mutate() {
        let registry = OutstandingRegistry::new();
        for id in 0..5 {
            registry.add(record(id, "service"));
        }
        let mut seen = vec![];
        registry.for_each(|r| {
            seen.push(r.id().0);
            registry.remove(r);
        });
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_remove() {
        let registry = Arc::new(OutstandingRegistry::new());
        let mut handles = vec![];
        for worker in 0..8u64 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250u64 {
                    let r = record(worker * 1000 + i, "service");
                    registry.add(r.clone());
                    if i % 5 != 0 {
                        tokio::task::yield_now().await;
                        registry.remove(&r);
                    }
                    // counts taken mid flight never exceed what was added
                    assert!(registry.count(|_| true) <= 8 * 250);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(registry.size(), 8 * 50);
        let ids: std::collections::HashSet<WorkId> =
            registry.snapshot().iter().map(|r| r.id()).collect();
        assert_eq!(ids.len(), 8 * 50);
        assert!(ids.iter().all(|id| id.0 % 1000 % 5 == 0));
    }
}
