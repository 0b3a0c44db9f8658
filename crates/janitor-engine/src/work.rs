//! Shared work queue processing
//!
//! [`WorkQueueManager`] keeps the queue seeded with one item per
//! configuration and action while work is allowed, and empties it when it
//! is not. [`WorkProcessor`] drains it under a fleet-wide lock, running each
//! item under its namespace lock. Items popped by a worker that dies, or
//! whose namespace is busy, are gone; the next refill restores them.

use crate::agent::{AgentJob, WorkGate};
use crate::error::{StoreError, WorkError};
use crate::handler::HandlerRegistry;
use crate::lock::{LockOptions, LockingService, WORK_PROCESSOR_LOCK, namespace_lock, with_lock};
use crate::metrics::{Metrics, names, results, tags};
use crate::model::{WorkConfiguration, WorkItem};
use crate::store::WorkQueue;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counts from one drain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items dropped because their namespace was busy
    pub busy: usize,
}

pub struct WorkProcessor {
    queue: Arc<dyn WorkQueue>,
    registry: Arc<HandlerRegistry>,
    locks: Arc<dyn LockingService>,
    lock_options: LockOptions,
    metrics: Arc<Metrics>,
}

impl WorkProcessor {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        registry: Arc<HandlerRegistry>,
        locks: Arc<dyn LockingService>,
        max_lock_duration: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            registry,
            locks,
            lock_options: LockOptions::new(WORK_PROCESSOR_LOCK, max_lock_duration),
            metrics,
        }
    }

    /// Drain the queue if no other worker is draining it
    pub async fn run(&self) -> Result<Option<DrainReport>, WorkError> {
        match with_lock(self.locks.as_ref(), &self.lock_options, || self.drain()).await? {
            Some(report) => Ok(Some(report?)),
            None => {
                self.metrics.increment(
                    names::LOCK_UNAVAILABLE,
                    &[(tags::LOCK, self.lock_options.name.as_str())],
                );
                Ok(None)
            }
        }
    }

    /// Pop and dispatch until the queue reports empty
    async fn drain(&self) -> Result<DrainReport, StoreError> {
        let mut report = DrainReport::default();

        while let Some(item) = self.queue.pop().await? {
            report.processed += 1;
            let action = item.action.as_str();

            let namespace = LockOptions::new(
                namespace_lock(&item.work_configuration.namespace),
                self.lock_options.max_duration,
            );
            let outcome = match with_lock(self.locks.as_ref(), &namespace, || {
                self.registry.dispatch(&item)
            })
            .await
            {
                Ok(Some(outcome)) => outcome,
                Ok(None) => {
                    // Another agent is cycling this namespace; a later refill brings it back
                    report.busy += 1;
                    debug!(item = %item.id(), "Namespace busy, dropping item");
                    continue;
                }
                Err(e) => {
                    warn!(item = %item.id(), error = ?e, "Lock service unavailable, dropping item");
                    report.failed += 1;
                    continue;
                }
            };

            match outcome {
                Ok(cycle) => {
                    report.succeeded += 1;
                    debug!(item = %item.id(), cycle = ?cycle, "Work item done");
                    self.metrics.increment(
                        names::WORK_ITEMS,
                        &[(tags::ACTION, action), (tags::RESULT, results::SUCCESS)],
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(item = %item.id(), error = ?e, "Work item failed");
                    self.metrics.increment(
                        names::WORK_ITEMS,
                        &[(tags::ACTION, action), (tags::RESULT, results::FAILURE)],
                    );
                    let [configuration, resource_type] = item.work_configuration.metric_tags();
                    self.metrics.increment(
                        names::HANDLER_FAILURES,
                        &[configuration, resource_type, (tags::ACTION, action)],
                    );
                }
            }
        }

        if report.processed > 0 {
            info!(
                processed = report.processed,
                failed = report.failed,
                busy = report.busy,
                "Work queue drained"
            );
        }
        Ok(report)
    }
}

#[async_trait]
impl AgentJob for WorkProcessor {
    fn name(&self) -> &str {
        "work-processor"
    }

    async fn run_once(&self) -> Result<()> {
        self.run().await?;
        Ok(())
    }
}

/// What a monitor pass did to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Refilled(usize),
    Unchanged,
    Cleared,
}

pub struct WorkQueueManager {
    queue: Arc<dyn WorkQueue>,
    configurations: Vec<WorkConfiguration>,
    gate: WorkGate,
    metrics: Arc<Metrics>,
}

impl WorkQueueManager {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        configurations: Vec<WorkConfiguration>,
        gate: WorkGate,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            configurations,
            gate,
            metrics,
        }
    }

    /// Refill when empty and allowed, clear when not allowed
    pub async fn monitor(&self) -> Result<QueueAction, WorkError> {
        if let Some(reason) = self.gate.check() {
            let had_items = !self.queue.is_empty().await?;
            if had_items {
                self.queue.clear().await?;
                info!(reason = ?reason, "Work not allowed, cleared work queue");
            }
            self.metrics.gauge(names::QUEUE_SIZE, &[], 0);
            return Ok(if had_items {
                QueueAction::Cleared
            } else {
                QueueAction::Unchanged
            });
        }

        let action = if self.queue.is_empty().await? {
            self.refill().await?
        } else {
            QueueAction::Unchanged
        };

        let size = self.queue.size().await?;
        self.metrics
            .gauge(names::QUEUE_SIZE, &[], i64::try_from(size).unwrap_or(i64::MAX));
        Ok(action)
    }

    async fn refill(&self) -> Result<QueueAction, WorkError> {
        let items = WorkItem::all_for(&self.configurations);
        match self.queue.seed(&items).await {
            Ok(()) => {
                self.metrics
                    .increment(names::QUEUE_FILL, &[(tags::RESULT, results::SUCCESS)]);
                info!(items = items.len(), "Seeded work queue");
                Ok(QueueAction::Refilled(items.len()))
            }
            Err(e) => {
                self.metrics
                    .increment(names::QUEUE_FILL, &[(tags::RESULT, results::FAILURE)]);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl AgentJob for WorkQueueManager {
    fn name(&self) -> &str {
        "queue-monitor"
    }

    async fn run_once(&self) -> Result<()> {
        self.monitor().await?;
        Ok(())
    }
}
