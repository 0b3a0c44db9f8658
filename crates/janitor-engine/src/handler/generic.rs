use super::{CandidatePreProcessor, CycleReport, HandlerContext, ResourceTypeHandler};
use crate::collaborators::ResourceProvider;
use crate::error::HandlerError;
use crate::events::Event;
use crate::metrics::{names, tags};
use crate::model::{
    MarkedResource, NotificationTask, Resource, TaskRecord, TaskStatus, WorkConfiguration,
};
use async_trait::async_trait;
use janitor_common::{Action, ResourceKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Handler for one resource type and cloud provider
///
/// Type specific behaviour lives in the provider and the pre-processor.
pub struct GenericHandler {
    resource_type: ResourceKind,
    cloud_provider: String,
    provider: Arc<dyn ResourceProvider>,
    pre_processor: Arc<dyn CandidatePreProcessor>,
    ctx: HandlerContext,
}

impl GenericHandler {
    pub fn new(
        resource_type: ResourceKind,
        cloud_provider: impl Into<String>,
        provider: Arc<dyn ResourceProvider>,
        pre_processor: Arc<dyn CandidatePreProcessor>,
        ctx: HandlerContext,
    ) -> Self {
        Self {
            resource_type,
            cloud_provider: cloud_provider.into(),
            provider,
            pre_processor,
            ctx,
        }
    }

    async fn fetch_candidates(
        &self,
        config: &WorkConfiguration,
    ) -> Result<Vec<Resource>, HandlerError> {
        let mut candidates =
            self.provider
                .get_candidates(config)
                .await
                .map_err(|source| HandlerError::Provider {
                    namespace: config.namespace.clone(),
                    source,
                })?;

        for candidate in &mut candidates {
            candidate.details.clear();
        }
        self.pre_processor
            .pre_process(&mut candidates, config)
            .await
            .map_err(|source| HandlerError::PreProcess {
                namespace: config.namespace.clone(),
                source,
            })?;

        Ok(candidates)
    }

    fn rule_failed(&self, config: &WorkConfiguration, resource_id: &str, rule: &str) {
        self.ctx.metrics.increment(
            names::RULE_FAILURES,
            &[
                (tags::CONFIGURATION, config.namespace.as_str()),
                (tags::RESOURCE_TYPE, config.resource_type.as_str()),
                ("rule", rule),
            ],
        );
        debug!(resource_id, rule, "Resource skipped after rule failure");
    }
}

#[async_trait]
impl ResourceTypeHandler for GenericHandler {
    fn handles(&self, config: &WorkConfiguration) -> bool {
        config.resource_type == self.resource_type
            && config.cloud_provider == self.cloud_provider
            && !config.rules.is_empty()
    }

    async fn mark(&self, config: &WorkConfiguration) -> Result<CycleReport, HandlerError> {
        let ctx = &self.ctx;
        let namespace = config.namespace.as_str();
        let mut report = CycleReport::default();

        let candidates = self.fetch_candidates(config).await?;
        report.candidates = candidates.len();

        let mut tracked: HashMap<String, MarkedResource> = ctx
            .repos
            .tracking
            .marked_resources_in(namespace)
            .await?
            .into_iter()
            .map(|m| (m.resource_id().to_string(), m))
            .collect();
        let mut seen: HashSet<String> = HashSet::new();
        let now = ctx.clock.now_millis();

        for resource in candidates {
            if !seen.insert(resource.resource_id.clone()) {
                continue;
            }
            let existing = tracked.remove(&resource.resource_id);

            if ctx
                .events
                .is_opted_out(&resource.resource_id, namespace)
                .await?
            {
                debug!(resource_id = %resource.resource_id, "Skipping opted-out resource");
                if existing.is_some() && !config.dry_run {
                    ctx.repos
                        .tracking
                        .remove(&resource.resource_id, namespace)
                        .await?;
                }
                report.skipped += 1;
                continue;
            }

            let result = match ctx.evaluator.evaluate(&resource, config) {
                Ok(result) => result,
                Err(e) => {
                    warn!(resource_id = %resource.resource_id, error = %e, "Rule evaluation failed");
                    self.rule_failed(config, &resource.resource_id, e.rule());
                    report.failures += 1;
                    if let Some(existing) = existing {
                        tracked.insert(existing.resource_id().to_string(), existing);
                    }
                    continue;
                }
            };

            if result.excluded {
                report.excluded += 1;
                match existing {
                    Some(existing) if !config.dry_run => {
                        ctx.unmark(existing, config).await?;
                        report.unmarked += 1;
                    }
                    Some(_) => report.unmarked += 1,
                    None => ctx.events.resource_excluded(&resource, config),
                }
                continue;
            }

            if !result.eligible {
                if let Some(existing) = existing {
                    if !config.dry_run {
                        ctx.unmark(existing, config).await?;
                    }
                    report.unmarked += 1;
                }
                continue;
            }

            match existing {
                Some(_) if config.dry_run => report.refreshed += 1,
                Some(_) => {
                    // Re-read so a notification stamped since the snapshot survives.
                    // Refresh keeps the deletion date.
                    let Some(mut current) = ctx
                        .repos
                        .tracking
                        .find(&resource.resource_id, namespace)
                        .await?
                    else {
                        debug!(resource_id = %resource.resource_id, "Unmarked during cycle, not refreshing");
                        continue;
                    };
                    current.resource = resource;
                    current.summaries = result.matched_summaries;
                    ctx.repos.tracking.upsert(&current).await?;
                    report.refreshed += 1;
                }
                None => {
                    if report.marked >= config.max_items_per_cycle {
                        report.throttled += 1;
                        continue;
                    }

                    let owner = ctx
                        .owners
                        .resolve(&resource, &config.notification.default_owner);
                    let marked = MarkedResource::new(
                        resource,
                        result.matched_summaries,
                        namespace,
                        owner,
                        now,
                        config.retention_days,
                    );

                    if config.dry_run {
                        info!(resource_id = %marked.resource_id(), "Dry run, would mark");
                    } else {
                        ctx.repos.tracking.upsert(&marked).await?;
                        ctx.events
                            .handle(&Event::new(Action::Mark, marked, config))
                            .await?;
                    }
                    report.marked += 1;
                }
            }
        }

        // Tracked resources the provider no longer returns
        for (_, gone) in tracked.into_iter().filter(|(id, _)| !seen.contains(id)) {
            debug!(resource_id = %gone.resource_id(), "Tracked resource disappeared");
            if !config.dry_run {
                ctx.unmark(gone, config).await?;
            }
            report.unmarked += 1;
        }

        let metric_tags = config.metric_tags();
        ctx.metrics
            .gauge(names::CANDIDATES, &metric_tags, report.candidates as i64);
        ctx.metrics
            .gauge(names::MARKED_IN_CYCLE, &metric_tags, report.marked as i64);

        info!(
            namespace,
            candidates = report.candidates,
            excluded = report.excluded,
            marked = report.marked,
            refreshed = report.refreshed,
            unmarked = report.unmarked,
            throttled = report.throttled,
            failures = report.failures,
            "Mark cycle complete"
        );
        Ok(report)
    }

    async fn notify(&self, config: &WorkConfiguration) -> Result<CycleReport, HandlerError> {
        let mut report = CycleReport::default();
        if !config.notification.enabled {
            debug!(namespace = %config.namespace, "Notifications disabled");
            return Ok(report);
        }

        let pending = self
            .ctx
            .repos
            .tracking
            .marked_resources_in(&config.namespace)
            .await?
            .iter()
            .filter(|m| !m.is_notified())
            .count();
        if pending == 0 || config.dry_run {
            debug!(namespace = %config.namespace, pending, "Nothing to notify");
            return Ok(report);
        }

        self.ctx
            .repos
            .notification_queue
            .add(&NotificationTask {
                resource_type: config.resource_type,
                namespace: config.namespace.clone(),
            })
            .await?;
        report.notifications_queued = 1;

        info!(namespace = %config.namespace, pending, "Notification queued");
        Ok(report)
    }

    async fn delete(&self, config: &WorkConfiguration) -> Result<CycleReport, HandlerError> {
        let ctx = &self.ctx;
        let namespace = config.namespace.as_str();
        let mut report = CycleReport::default();
        let now = ctx.clock.now_millis();

        let due = ctx
            .repos
            .tracking
            .marked_resources_due(namespace, now)
            .await?;
        report.candidates = due.len();

        for marked in due {
            // Due filtering is done by the repository query
            let resource_id = marked.resource_id().to_string();

            if config.notification.enabled && !marked.is_notified() {
                debug!(resource_id, "Owner not notified yet, not deleting");
                report.skipped += 1;
                continue;
            }
            if ctx.events.is_opted_out(&resource_id, namespace).await? {
                debug!(resource_id, "Skipping opted-out resource");
                if !config.dry_run {
                    ctx.repos.tracking.remove(&resource_id, namespace).await?;
                }
                report.skipped += 1;
                continue;
            }

            let current = self
                .provider
                .get_one(&resource_id, config)
                .await
                .map_err(|source| HandlerError::Provider {
                    namespace: config.namespace.clone(),
                    source,
                })?;

            let Some(current) = current else {
                info!(resource_id, "Resource already gone");
                if !config.dry_run {
                    ctx.repos.tracking.remove(&resource_id, namespace).await?;
                    ctx.events
                        .handle(&Event::new(Action::Delete, marked, config))
                        .await?;
                }
                report.deleted += 1;
                continue;
            };

            // Independently confirm the resource is still eligible
            let mut batch = [current];
            batch[0].details.clear();
            self.pre_processor
                .pre_process(&mut batch, config)
                .await
                .map_err(|source| HandlerError::PreProcess {
                    namespace: config.namespace.clone(),
                    source,
                })?;
            let [current] = batch;

            match ctx.evaluator.evaluate(&current, config) {
                Ok(result) if result.excluded || !result.eligible => {
                    info!(resource_id, "No longer eligible, unmarking instead of deleting");
                    if !config.dry_run {
                        ctx.unmark(marked, config).await?;
                    }
                    report.unmarked += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(resource_id, error = %e, "Rule evaluation failed");
                    self.rule_failed(config, &resource_id, e.rule());
                    report.failures += 1;
                    continue;
                }
            }

            if config.dry_run {
                info!(resource_id, "Dry run, would delete");
                report.deleted += 1;
                continue;
            }

            let task_id = self
                .provider
                .delete(&marked, config)
                .await
                .map_err(|source| {
                    error!(resource_id, error = ?source, "Provider delete failed");
                    HandlerError::Provider {
                        namespace: config.namespace.clone(),
                        source,
                    }
                })?;

            ctx.repos.tracking.remove(&resource_id, namespace).await?;
            if let Some(task_id) = task_id {
                ctx.repos
                    .tasks
                    .add(&TaskRecord {
                        task_id,
                        action: Action::Delete,
                        namespace: namespace.to_string(),
                        resource_ids: vec![resource_id.clone()],
                        description: format!("Deleting {}", marked.resource.type_and_name()),
                        submitted_at: now,
                        status: TaskStatus::InProgress,
                    })
                    .await?;
            }
            ctx.events
                .handle(&Event::new(Action::Delete, marked, config))
                .await?;
            report.deleted += 1;
        }

        info!(
            namespace,
            due = report.candidates,
            deleted = report.deleted,
            unmarked = report.unmarked,
            skipped = report.skipped,
            failures = report.failures,
            "Delete cycle complete"
        );
        Ok(report)
    }
}
