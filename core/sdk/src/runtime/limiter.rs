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

use log::{debug, warn};

use crate::{
    api::{
        observability::log_signal::LogSignal,
        work_record::{WorkRecord, FLOODED_FLAG},
    },
    runtime::registry::OutstandingRegistry,
};

pub type RecordPredicate = Arc<dyn Fn(&WorkRecord) -> bool + Send + Sync>;
pub type RecordClassifier = Arc<dyn Fn(&WorkRecord) -> Option<String> + Send + Sync>;

/// How a rule decides which outstanding records compete with the one being admitted.
#[derive(Clone)]
pub enum RuleMatcher {
    /// All records satisfying the predicate share one limit.
    Predicate(RecordPredicate),
    /// Records are grouped by category value; each value has its own limit.
    Category(RecordClassifier),
}

impl RuleMatcher {
    pub fn predicate<F>(f: F) -> RuleMatcher
    where
        F: Fn(&WorkRecord) -> bool + Send + Sync + 'static,
    {
        RuleMatcher::Predicate(Arc::new(f))
    }

    pub fn category<F>(f: F) -> RuleMatcher
    where
        F: Fn(&WorkRecord) -> Option<String> + Send + Sync + 'static,
    {
        RuleMatcher::Category(Arc::new(f))
    }
}

impl std::fmt::Debug for RuleMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleMatcher::Predicate(_) => write!(f, "Predicate"),
            RuleMatcher::Category(_) => write!(f, "Category"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionLimitRule {
    name: String,
    limit: usize,
    matcher: RuleMatcher,
}

impl ConnectionLimitRule {
    pub fn new(name: impl Into<String>, limit: usize, matcher: RuleMatcher) -> Self {
        ConnectionLimitRule {
            name: name.into(),
            limit,
            matcher,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn applies_to(&self, record: &WorkRecord) -> bool {
        match &self.matcher {
            RuleMatcher::Predicate(p) => p(record),
            RuleMatcher::Category(c) => c(record).is_some(),
        }
    }

    /// Outstanding records competing with `record` under this rule, itself included
    /// when registered. `None` when the rule does not apply to `record`.
    pub fn population(&self, record: &WorkRecord, registry: &OutstandingRegistry) -> Option<usize> {
        match &self.matcher {
            RuleMatcher::Predicate(p) => {
                if !p(record) {
                    return None;
                }
                Some(registry.count(|r| p(r)))
            }
            RuleMatcher::Category(c) => {
                let category = c(record)?;
                Some(registry.count(|r| c(r).as_deref() == Some(category.as_str())))
            }
        }
    }
}

/// Outcome of admission. Being flooded is advisory; the caller decides what to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Admission {
    pub flooded_rules: Vec<String>,
}

impl Admission {
    pub fn is_flooded(&self) -> bool {
        !self.flooded_rules.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    registry: Arc<OutstandingRegistry>,
    rules: Vec<ConnectionLimitRule>,
}

impl ConnectionLimiter {
    pub fn new(registry: Arc<OutstandingRegistry>, rules: Vec<ConnectionLimitRule>) -> Self {
        ConnectionLimiter { registry, rules }
    }

    pub fn rules(&self) -> &[ConnectionLimitRule] {
        &self.rules
    }

    /// Evaluates every rule against the registry and raises the rule flag of each rule
    /// whose limit is exceeded, plus the generic `flooded` flag.
    /// Expects `record` to be registered already.
    pub fn check_and_mark(&self, record: &WorkRecord) -> Admission {
        let mut admission = Admission::default();
        for rule in &self.rules {
            let population = match rule.population(record, &self.registry) {
                Some(p) => p,
                None => continue,
            };
            if population > rule.limit {
                record.set_rule_flag(rule.name());
                record.set_flag(FLOODED_FLAG, true);
                warn!(
                    "{}",
                    LogSignal::new("connection limit exceeded", record)
                        .with_entry("rule", rule.name())
                        .with_entry("limit", rule.limit())
                        .with_entry("population", population)
                );
                admission.flooded_rules.push(rule.name().to_owned());
            } else {
                debug!(
                    "check_and_mark: {} rule={} population={}/{}",
                    record.id(),
                    rule.name(),
                    population,
                    rule.limit()
                );
            }
        }
        admission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::work_record::{WorkId, WorkRequest};
    use rstest::rstest;

    fn service_rule(limit: usize) -> ConnectionLimitRule {
        ConnectionLimitRule::new(
            "service",
            limit,
            RuleMatcher::predicate(|r| r.category() == Some("service")),
        )
    }

    fn accept_rule(limit: usize) -> ConnectionLimitRule {
        ConnectionLimitRule::new(
            "acceptHeader",
            limit,
            RuleMatcher::category(|r| r.field("accept")),
        )
    }

    fn admit(
        registry: &Arc<OutstandingRegistry>,
        limiter: &ConnectionLimiter,
        id: u64,
        request: WorkRequest,
    ) -> (Arc<WorkRecord>, Admission) {
        let record = Arc::new(WorkRecord::new(WorkId(id), request, None).0);
        registry.add(record.clone());
        let admission = limiter.check_and_mark(&record);
        (record, admission)
    }

    #[rstest(limit, admitted, case(25, 26), case(1, 5), case(3, 3))]
    fn test_sequential_admission_flags_after_limit(limit: usize, admitted: u64) {
        let registry = Arc::new(OutstandingRegistry::new());
        let limiter = ConnectionLimiter::new(registry.clone(), vec![service_rule(limit)]);
        for id in 1..=admitted {
            let (record, admission) = admit(
                &registry,
                &limiter,
                id,
                WorkRequest::new("GET", "/service").with_category("service"),
            );
            let expected = id as usize > limit;
            assert_eq!(admission.is_flooded(), expected, "request {}", id);
            assert_eq!(record.is_flooded(), expected);
            assert_eq!(record.rule_flag("service"), expected);
        }
    }

    #[test]
    fn test_rules_are_independent() {
        let registry = Arc::new(OutstandingRegistry::new());
        let never = ConnectionLimitRule::new("never", 1, RuleMatcher::predicate(|_| false));
        let limiter = ConnectionLimiter::new(
            registry.clone(),
            vec![never, service_rule(10), accept_rule(1)],
        );
        let json = || {
            WorkRequest::new("GET", "/service")
                .with_category("service")
                .with_attribute("accept", "application/json")
        };
        let (_, first) = admit(&registry, &limiter, 1, json());
        assert!(!first.is_flooded());
        let (second, admission) = admit(&registry, &limiter, 2, json());
        assert_eq!(admission.flooded_rules, vec!["acceptHeader".to_string()]);
        assert!(second.rule_flag("acceptHeader"));
        assert!(!second.rule_flag("service"));
        assert!(!second.rule_flag("never"));
        // a different accept value is its own category
        let (_, xml) = admit(
            &registry,
            &limiter,
            3,
            WorkRequest::new("GET", "/service")
                .with_category("service")
                .with_attribute("accept", "text/xml"),
        );
        assert!(!xml.is_flooded());
    }

    #[test]
    fn test_unmatched_record_is_untouched() {
        let registry = Arc::new(OutstandingRegistry::new());
        let limiter = ConnectionLimiter::new(registry.clone(), vec![service_rule(0), accept_rule(0)]);
        let (record, admission) = admit(&registry, &limiter, 1, WorkRequest::new("GET", "/"));
        assert!(!admission.is_flooded());
        assert!(record.flags().is_empty());
    }

    #[test]
    fn test_departures_free_capacity() {
        let registry = Arc::new(OutstandingRegistry::new());
        let limiter = ConnectionLimiter::new(registry.clone(), vec![service_rule(1)]);
        let req = || WorkRequest::new("GET", "/service").with_category("service");
        let (first, _) = admit(&registry, &limiter, 1, req());
        registry.remove(&first);
        let (_, admission) = admit(&registry, &limiter, 2, req());
        assert!(!admission.is_flooded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admission_flags_at_least_one() {
        let registry = Arc::new(OutstandingRegistry::new());
        let limiter = Arc::new(ConnectionLimiter::new(registry.clone(), vec![service_rule(25)]));
        let barrier = Arc::new(tokio::sync::Barrier::new(26));
        let mut handles = vec![];
        for id in 0..26u64 {
            let (registry, limiter, barrier) = (registry.clone(), limiter.clone(), barrier.clone());
            handles.push(tokio::spawn(async move {
                let record = Arc::new(
                    WorkRecord::new(
                        WorkId(id),
                        WorkRequest::new("GET", "/service").with_category("service"),
                        None,
                    )
                    .0,
                );
                registry.add(record.clone());
                // hold every request in flight until all 26 are registered
                barrier.wait().await;
                limiter.check_and_mark(&record).is_flooded()
            }));
        }
        let mut flagged = 0;
        for h in handles {
            if h.await.unwrap() {
                flagged += 1;
            }
        }
        assert!(flagged >= 1);
    }
}
