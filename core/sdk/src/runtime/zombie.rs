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

use std::{sync::Arc, time::Duration};

use log::{debug, error, info, warn};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    api::{observability::log_signal::LogSignal, work_record::ZOMBIE_FLAG},
    runtime::registry::OutstandingRegistry,
    utils::error::TrackerError,
};

/*
Finds units of work that have been running longer than the runaway threshold and
interrupts them. The zombie flag is raised with a test-and-set before the interrupt,
so each record is interrupted at most once no matter how many sweeps observe it.
A unit of work that never reaches an await point after the interrupt keeps running
and is not signalled again.
*/
#[derive(Debug)]
pub struct ZombieDetector {
    registry: Arc<OutstandingRegistry>,
    threshold: Duration,
}

impl ZombieDetector {
    pub fn new(registry: Arc<OutstandingRegistry>, threshold: Duration) -> Self {
        ZombieDetector {
            registry,
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// One sweep. Returns how many units of work were interrupted.
    pub fn kill_runaway(&self) -> usize {
        self.kill_runaway_at(Instant::now())
    }

    pub fn kill_runaway_at(&self, now: Instant) -> usize {
        let mut killed = 0;
        self.registry.for_each(|record| {
            let age = record.age_at(now);
            if age <= self.threshold {
                return;
            }
            if !record.raise_flag_once(ZOMBIE_FLAG) {
                return;
            }
            // the record holds its own abort handle, so a unit of work that
            // already finished turns this into a no-op
            record.interrupt();
            killed += 1;
            warn!(
                "{}",
                LogSignal::new("interrupted runaway unit of work", record)
                    .with_diagnostic_context(record.context())
                    .with_entry("threshold_ms", self.threshold.as_millis())
            );
        });
        if killed > 0 {
            info!(
                "kill_runaway: interrupted {} of {} outstanding",
                killed,
                self.registry.size()
            );
        }
        killed
    }

    /// Starts the polling loop. The first sweep runs one `interval` after start.
    /// `interval` must be non-zero; `TrackerConfig::validate` guarantees it for the
    /// tracker.
    pub(crate) fn spawn(self: Arc<Self>, interval: Duration) -> ZombieDetectorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let detector = self;
        let join = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(
                "zombie detector started threshold={:?} interval={:?}",
                detector.threshold, interval
            );
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        detector.kill_runaway();
                    }
                }
            }
            debug!("zombie detector stopped");
        });
        ZombieDetectorHandle {
            shutdown: Some(shutdown_tx),
            join,
        }
    }
}

#[derive(Debug)]
pub struct ZombieDetectorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl ZombieDetectorHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the polling loop, waiting at most `timeout` for it to exit. A loop that
    /// does not exit in time is aborted.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<(), TrackerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match time::timeout(timeout, &mut self.join).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("zombie detector loop failed: {:?}", e);
                Ok(())
            }
            Err(_) => {
                warn!("zombie detector did not stop within {:?}, aborting", timeout);
                self.join.abort();
                Err(TrackerError::ShutdownTimeout)
            }
        }
    }
}
