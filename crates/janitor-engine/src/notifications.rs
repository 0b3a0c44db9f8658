//! Owner notification dispatch
//!
//! Handlers only enqueue notification tasks. The sender drains that queue
//! under a fleet-wide lock, batches unnotified resources per owner and
//! stamps them only after the notifier confirms delivery.

use crate::agent::AgentJob;
use crate::collaborators::{NotificationContext, Notifier};
use crate::error::NotificationError;
use crate::events::{Event, ResourceStateManager};
use crate::lock::{LockOptions, LockingService, NOTIFICATION_LOCK, namespace_lock, with_lock};
use crate::metrics::{Metrics, names, results, tags};
use crate::model::{MarkedResource, NotificationInfo, NotificationTask, WorkConfiguration};
use crate::store::{NotificationQueue, ResourceTrackingRepository};
use async_trait::async_trait;
use janitor_common::{Action, Clock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counts from one sender run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub tasks: usize,
    pub messages_sent: usize,
    pub messages_failed: usize,
    pub resources_notified: usize,
    /// Namespaces requeued because another worker was cycling them
    pub deferred: usize,
}

impl NotificationReport {
    fn merge(&mut self, other: &NotificationReport) {
        self.messages_sent += other.messages_sent;
        self.messages_failed += other.messages_failed;
        self.resources_notified += other.resources_notified;
        self.deferred += other.deferred;
    }
}

pub struct NotificationSender {
    tracking: Arc<dyn ResourceTrackingRepository>,
    queue: Arc<dyn NotificationQueue>,
    configurations: HashMap<String, WorkConfiguration>,
    notifier: Arc<dyn Notifier>,
    events: Arc<ResourceStateManager>,
    locks: Arc<dyn LockingService>,
    lock_options: LockOptions,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
}

impl NotificationSender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracking: Arc<dyn ResourceTrackingRepository>,
        queue: Arc<dyn NotificationQueue>,
        configurations: &[WorkConfiguration],
        notifier: Arc<dyn Notifier>,
        events: Arc<ResourceStateManager>,
        locks: Arc<dyn LockingService>,
        max_lock_duration: Duration,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracking,
            queue,
            configurations: configurations
                .iter()
                .map(|c| (c.namespace.clone(), c.clone()))
                .collect(),
            notifier,
            events,
            locks,
            lock_options: LockOptions::new(NOTIFICATION_LOCK, max_lock_duration),
            metrics,
            clock,
        }
    }

    /// Drain the notification queue if no other worker is doing so
    ///
    /// `Ok(None)` means another worker holds the lock.
    pub async fn run(&self) -> Result<Option<NotificationReport>, NotificationError> {
        let outcome = with_lock(self.locks.as_ref(), &self.lock_options, || self.send_all()).await;

        match outcome {
            Ok(Some(report)) => report.map(Some),
            Ok(None) => {
                self.metrics.increment(
                    names::LOCK_UNAVAILABLE,
                    &[(tags::LOCK, self.lock_options.name.as_str())],
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn send_all(&self) -> Result<NotificationReport, NotificationError> {
        let tasks = self.queue.pop_all().await?;
        let mut report = NotificationReport {
            tasks: tasks.len(),
            ..NotificationReport::default()
        };

        // Several workers may have queued the same namespace
        let namespaces: BTreeSet<String> = tasks
            .into_iter()
            .map(|task: NotificationTask| task.namespace)
            .collect();

        for namespace in namespaces {
            let Some(config) = self.configurations.get(&namespace) else {
                warn!(namespace, "No work configuration for notification task");
                continue;
            };
            if !config.notification.enabled {
                debug!(namespace, "Notifications disabled");
                continue;
            }

            let options = LockOptions::new(
                namespace_lock(&config.namespace),
                self.lock_options.max_duration,
            );
            let outcome =
                with_lock(self.locks.as_ref(), &options, || self.notify_configuration(config))
                    .await?;
            match outcome {
                Some(result) => report.merge(&result?),
                None => {
                    debug!(namespace, "Namespace busy, requeueing notification task");
                    self.queue
                        .add(&NotificationTask {
                            resource_type: config.resource_type,
                            namespace: config.namespace.clone(),
                        })
                        .await?;
                    report.deferred += 1;
                    self.metrics
                        .increment(names::LOCK_UNAVAILABLE, &[(tags::LOCK, options.name.as_str())]);
                }
            }
        }

        info!(
            tasks = report.tasks,
            sent = report.messages_sent,
            failed = report.messages_failed,
            resources = report.resources_notified,
            deferred = report.deferred,
            "Notification run complete"
        );
        Ok(report)
    }

    /// Send to each owner of unnotified resources in one namespace
    async fn notify_configuration(
        &self,
        config: &WorkConfiguration,
    ) -> Result<NotificationReport, NotificationError> {
        let mut report = NotificationReport::default();
        let pending: Vec<MarkedResource> = self
            .tracking
            .marked_resources_in(&config.namespace)
            .await?
            .into_iter()
            .filter(|m| !m.is_notified() && m.resource_type() == config.resource_type)
            .take(config.max_items_per_cycle)
            .collect();

        let mut by_owner: BTreeMap<String, Vec<MarkedResource>> = BTreeMap::new();
        for marked in pending {
            by_owner
                .entry(marked.resource_owner.clone())
                .or_default()
                .push(marked);
        }

        let per_message = config.notification.items_per_message.max(1);
        for (owner, mut resources) in by_owner {
            // The rest go out on a later run
            resources.truncate(per_message);
            let context = NotificationContext {
                resource_type: config.resource_type,
                namespace: config.namespace.clone(),
                resources,
            };

            let outcome = self
                .notifier
                .notify(&owner, &context, &config.notification)
                .await;

            match outcome {
                Ok(result) if result.success => {
                    let notified = self
                        .record_sent(
                            config,
                            context.resources,
                            &result.recipient,
                            &result.notification_type,
                        )
                        .await?;
                    report.resources_notified += notified;
                    report.messages_sent += 1;
                    self.count(results::SUCCESS);
                }
                Ok(result) => {
                    warn!(recipient = %result.recipient, "Notifier reported failure");
                    report.messages_failed += 1;
                    self.count(results::FAILURE);
                }
                Err(source) => {
                    let err = NotificationError::Transport {
                        recipient: owner.clone(),
                        source,
                    };
                    warn!(error = ?err, "Notification failed, will retry next run");
                    report.messages_failed += 1;
                    self.count(results::FAILURE);
                }
            }
        }

        Ok(report)
    }

    /// Stamp notified resources and give them a full grace window from now
    ///
    /// Each row is re-read first. Rows unmarked or stamped since the pending
    /// list was built are left as they are.
    async fn record_sent(
        &self,
        config: &WorkConfiguration,
        resources: Vec<MarkedResource>,
        recipient: &str,
        notification_type: &str,
    ) -> Result<usize, NotificationError> {
        let now = self.clock.now_millis();
        let mut notified = 0;

        for sent in resources {
            let Some(marked) = self.tracking.find(sent.resource_id(), &sent.namespace).await? else {
                debug!(resource_id = %sent.resource_id(), "Unmarked while notifying, not stamping");
                continue;
            };
            if marked.is_notified() {
                continue;
            }

            let elapsed = now - marked.mark_ts;
            let updated = marked
                .with_notification_info(NotificationInfo {
                    recipient: recipient.to_string(),
                    notification_type: notification_type.to_string(),
                    notification_stamp: now,
                })
                .with_additional_time_for_deletion(elapsed);

            self.tracking.upsert(&updated).await?;
            notified += 1;
            self.events
                .handle(&Event::new(Action::Notify, updated, config))
                .await?;
        }

        Ok(notified)
    }

    fn count(&self, result: &str) {
        self.metrics
            .increment(names::NOTIFICATIONS, &[(tags::RESULT, result)]);
    }
}

#[async_trait]
impl AgentJob for NotificationSender {
    fn name(&self) -> &str {
        "notification-sender"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        self.run().await?;
        Ok(())
    }
}
