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
    collections::HashSet,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use futures::future::{AbortRegistration, Abortable};
use log::{debug, info, warn};

use crate::{
    api::{
        config::{Exclusions, TrackerConfig},
        context_store::ContextStore,
        identity::IdentityProvider,
        observability::outstanding_view::OutstandingView,
        work_record::{WorkId, WorkRecord, WorkRequest},
    },
    runtime::{
        executor::ContextExecutor,
        limiter::{Admission, ConnectionLimitRule, ConnectionLimiter},
        registry::OutstandingRegistry,
        zombie::{ZombieDetector, ZombieDetectorHandle},
    },
    sync_mutex_lock,
    utils::error::TrackerError,
};

/// Owns the registry, limiter and zombie detector for the life of the process and
/// brackets every unit of work with registration and deregistration.
#[derive(Clone)]
pub struct WorkTracker {
    config: Arc<TrackerConfig>,
    exclusions: Arc<Exclusions>,
    registry: Arc<OutstandingRegistry>,
    limiter: Arc<ConnectionLimiter>,
    detector: Arc<ZombieDetector>,
    identity: Option<Arc<dyn IdentityProvider>>,
    detector_handle: Arc<Mutex<Option<ZombieDetectorHandle>>>,
    next_id: Arc<AtomicU64>,
}

pub struct WorkTrackerBuilder {
    config: TrackerConfig,
    rules: Vec<ConnectionLimitRule>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl WorkTrackerBuilder {
    /// Adds a rule on top of those in the configuration.
    pub fn with_rule(mut self, rule: ConnectionLimitRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_identity_provider(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.identity = Some(Arc::new(provider));
        self
    }

    pub fn build(self) -> Result<WorkTracker, TrackerError> {
        self.config.validate()?;
        let mut rules = self.config.rules()?;
        rules.extend(self.rules);
        {
            let mut names = HashSet::new();
            for rule in &rules {
                if !names.insert(rule.name()) {
                    return Err(TrackerError::InvalidConfig(format!(
                        "duplicate connection limit {}",
                        rule.name()
                    )));
                }
            }
        }
        let exclusions = self.config.exclusions.compile()?;
        let registry = Arc::new(OutstandingRegistry::new());
        let limiter = Arc::new(ConnectionLimiter::new(registry.clone(), rules));
        let detector = Arc::new(ZombieDetector::new(
            registry.clone(),
            self.config.runaway_threshold(),
        ));
        Ok(WorkTracker {
            config: Arc::new(self.config),
            exclusions: Arc::new(exclusions),
            registry,
            limiter,
            detector,
            identity: self.identity,
            detector_handle: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }
}

impl WorkTracker {
    pub fn builder(config: TrackerConfig) -> WorkTrackerBuilder {
        WorkTrackerBuilder {
            config,
            rules: Vec::new(),
            identity: None,
        }
    }

    /// Starts the zombie detector polling loop. Must be called within a tokio runtime.
    pub fn start(&self) -> Result<(), TrackerError> {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("start: no tokio runtime available");
            return Err(TrackerError::BootstrapError);
        }
        let mut slot = sync_mutex_lock!(self.detector_handle);
        if slot.is_some() {
            return Err(TrackerError::AlreadyStarted);
        }
        *slot = Some(self.detector.clone().spawn(self.config.sweep_interval()));
        info!(
            "work tracker started rules={} runaway_threshold={:?} sweep_interval={:?}",
            self.limiter.rules().len(),
            self.config.runaway_threshold(),
            self.config.sweep_interval()
        );
        Ok(())
    }

    /// Stops the polling loop within the configured shutdown timeout.
    pub async fn stop(&self) -> Result<(), TrackerError> {
        let handle = sync_mutex_lock!(self.detector_handle).take();
        match handle {
            Some(handle) => {
                let result = handle.shutdown(self.config.shutdown_timeout()).await;
                info!(
                    "work tracker stopped outstanding={}",
                    self.registry.size()
                );
                result
            }
            None => Err(TrackerError::NotStarted),
        }
    }

    pub fn is_running(&self) -> bool {
        sync_mutex_lock!(self.detector_handle)
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<OutstandingRegistry> {
        self.registry.clone()
    }

    pub fn limiter(&self) -> Arc<ConnectionLimiter> {
        self.limiter.clone()
    }

    pub fn detector(&self) -> Arc<ZombieDetector> {
        self.detector.clone()
    }

    /// Executor bound to the current runtime. Panics outside of a tokio runtime.
    pub fn executor(&self) -> ContextExecutor {
        ContextExecutor::current()
    }

    pub fn outstanding_view(&self) -> OutstandingView {
        OutstandingView::capture(&self.registry)
    }

    pub fn is_excluded(&self, request: &WorkRequest) -> bool {
        self.exclusions.is_excluded(request)
    }

    /// Registers a unit of work. `None` when the request is excluded from tracking.
    /// The unit of work ends when the guard drops.
    pub fn enter(&self, request: WorkRequest) -> Option<WorkGuard> {
        if self.is_excluded(&request) {
            debug!("enter: {} {} excluded", request.method, request.path);
            return None;
        }
        let id = WorkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let user = self.identity.as_ref().and_then(|p| p.resolve(&request));
        let (record, registration) = WorkRecord::new(id, request, user);
        let record = Arc::new(record);
        self.registry.add(record.clone());
        let admission = self.limiter.check_and_mark(&record);
        debug!(
            "enter: {} {} flooded={} outstanding={}",
            id,
            record.label(),
            admission.is_flooded(),
            self.registry.size()
        );
        Some(WorkGuard {
            record,
            admission,
            registration: Some(registration),
            registry: self.registry.clone(),
        })
    }

    /// Runs `handler` as one tracked unit of work. The handler sees the admission
    /// outcome and decides whether to serve a flooded request.
    pub async fn run<H, Fut, T>(&self, request: WorkRequest, handler: H) -> Result<T, TrackerError>
    where
        H: FnOnce(WorkHandle) -> Fut,
        Fut: Future<Output = T>,
    {
        match self.enter(request) {
            Some(mut guard) => {
                let handle = WorkHandle {
                    record: Some(guard.record().clone()),
                    admission: guard.admission().clone(),
                };
                guard.run(handler(handle)).await
            }
            None => Ok(handler(WorkHandle::untracked()).await),
        }
    }
}

/// What a handler knows about its own unit of work.
#[derive(Debug, Clone)]
pub struct WorkHandle {
    record: Option<Arc<WorkRecord>>,
    admission: Admission,
}

impl WorkHandle {
    fn untracked() -> Self {
        WorkHandle {
            record: None,
            admission: Admission::default(),
        }
    }

    pub fn record(&self) -> Option<&Arc<WorkRecord>> {
        self.record.as_ref()
    }

    pub fn is_tracked(&self) -> bool {
        self.record.is_some()
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn is_flooded(&self) -> bool {
        self.admission.is_flooded()
    }
}

/// Keeps a unit of work registered; deregisters on drop, including on panic and
/// cancellation.
#[derive(Debug)]
pub struct WorkGuard {
    record: Arc<WorkRecord>,
    admission: Admission,
    registration: Option<AbortRegistration>,
    registry: Arc<OutstandingRegistry>,
}

impl WorkGuard {
    pub fn record(&self) -> &Arc<WorkRecord> {
        &self.record
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn is_flooded(&self) -> bool {
        self.admission.is_flooded()
    }

    /// Polls `fut` with the unit of work's context installed. The first call is
    /// interruptible by the zombie detector; later calls only get the context.
    pub async fn run<F>(&mut self, fut: F) -> Result<F::Output, TrackerError>
    where
        F: Future,
    {
        let context = self.record.context();
        match self.registration.take() {
            Some(registration) => {
                match ContextStore::scope(context, Abortable::new(fut, registration)).await {
                    Ok(output) => Ok(output),
                    Err(_) => {
                        info!(
                            "unit of work {} {} interrupted after {:?}",
                            self.record.id(),
                            self.record.label(),
                            self.record.age()
                        );
                        Err(TrackerError::Interrupted(self.record.id().0))
                    }
                }
            }
            None => Ok(ContextStore::scope(context, fut).await),
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.record);
        debug!(
            "exit: {} {} after {:?}",
            self.record.id(),
            self.record.label(),
            self.record.age()
        );
    }
}
