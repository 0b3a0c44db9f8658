//! Lifecycle events and the single writer of resource state
//!
//! Every transition is one [`Event`]. Handling it appends a status to the
//! resource's history, bumps the per-action counter and requests the
//! matching tag change from the cloud provider.

use crate::collaborators::ResourceTagger;
use crate::error::StoreError;
use crate::metrics::{Metrics, names, tags};
use crate::model::{
    MarkedResource, OPT_OUT_CLEARED, Resource, ResourceState, Status, TaskRecord, TaskStatus,
    WorkConfiguration,
};
use crate::store::{ResourceStateRepository, TaskTrackingRepository};
use janitor_common::tags::{
    EXPIRATION_NEVER, TAG_DELETION_DATE, TAG_EXPIRATION_TIME, TAG_MARKED_AT, format_timestamp,
};
use janitor_common::{Action, Clock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One lifecycle transition of one resource
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub action: Action,
    pub marked_resource: MarkedResource,
    pub work_configuration: WorkConfiguration,
}

impl Event {
    pub fn new(
        action: Action,
        marked_resource: MarkedResource,
        work_configuration: &WorkConfiguration,
    ) -> Self {
        Self {
            action,
            marked_resource,
            work_configuration: work_configuration.clone(),
        }
    }
}

/// Counter incremented for each action
pub fn counter_for(action: Action) -> &'static str {
    match action {
        Action::Mark => names::MARK_COUNT,
        Action::Unmark => names::UNMARK_COUNT,
        Action::Delete => names::DELETE_COUNT,
        Action::Notify => names::NOTIFY_COUNT,
        Action::OptOut => names::OPT_OUT_COUNT,
        Action::Exclude => names::EXCLUDED_COUNT,
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(format_timestamp)
        .unwrap_or_else(|| millis.to_string())
}

/// Applies events to the state repository
pub struct ResourceStateManager {
    states: Arc<dyn ResourceStateRepository>,
    tasks: Arc<dyn TaskTrackingRepository>,
    tagger: Arc<dyn ResourceTagger>,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
}

impl ResourceStateManager {
    pub fn new(
        states: Arc<dyn ResourceStateRepository>,
        tasks: Arc<dyn TaskTrackingRepository>,
        tagger: Arc<dyn ResourceTagger>,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            states,
            tasks,
            tagger,
            metrics,
            clock,
        }
    }

    /// Record an event
    ///
    /// The state write happens before tagging so history order always
    /// matches emission order. Tagging failures are logged and counted.
    pub async fn handle(&self, event: &Event) -> Result<(), StoreError> {
        let config = &event.work_configuration;
        let marked = &event.marked_resource;
        self.metrics
            .increment(counter_for(event.action), &config.metric_tags());

        if event.action == Action::Exclude {
            debug!(
                namespace = %config.namespace,
                resource_id = %marked.resource_id(),
                "Resource excluded"
            );
            return Ok(());
        }

        let now = self.clock.now_millis();
        let mut state = self
            .states
            .get(marked.resource_id(), &marked.namespace)
            .await?
            .unwrap_or_else(|| ResourceState::new(marked.clone()));

        state.marked_resource = marked.clone();
        state.record(Status::new(event.action, now));
        match event.action {
            Action::Delete => state.deleted = true,
            Action::OptOut => state.opted_out = true,
            _ => {}
        }
        self.states.upsert(&state).await?;

        info!(
            action = %event.action,
            namespace = %config.namespace,
            resource_id = %marked.resource_id(),
            "Resource state updated"
        );

        self.apply_tags(event).await;
        Ok(())
    }

    /// Count a candidate filtered out before it was ever marked
    pub fn resource_excluded(&self, resource: &Resource, config: &WorkConfiguration) {
        self.metrics
            .increment(counter_for(Action::Exclude), &config.metric_tags());
        debug!(
            namespace = %config.namespace,
            resource_id = %resource.resource_id,
            "Candidate excluded"
        );
    }

    /// Operator action re-admitting an opted-out resource
    ///
    /// Returns false when the resource is unknown or not opted out.
    pub async fn clear_opt_out(
        &self,
        resource_id: &str,
        namespace: &str,
    ) -> Result<bool, StoreError> {
        let Some(mut state) = self.states.get(resource_id, namespace).await? else {
            return Ok(false);
        };
        if !state.opted_out {
            return Ok(false);
        }

        state.opted_out = false;
        state.record(Status::named(OPT_OUT_CLEARED, self.clock.now_millis()));
        self.states.upsert(&state).await?;

        info!(namespace, resource_id, "Opt-out cleared");
        Ok(true)
    }

    /// Whether automated processing must leave this resource alone
    pub async fn is_opted_out(
        &self,
        resource_id: &str,
        namespace: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .states
            .get(resource_id, namespace)
            .await?
            .is_some_and(|state| state.opted_out))
    }

    async fn apply_tags(&self, event: &Event) {
        let config = &event.work_configuration;
        let marked = &event.marked_resource;
        let type_and_name = marked.resource.type_and_name();

        let janitor_tags = || {
            BTreeMap::from([
                (TAG_MARKED_AT.to_string(), format_millis(marked.mark_ts)),
                (TAG_DELETION_DATE.to_string(), format_millis(marked.deletion_date)),
            ])
        };

        let requests: Vec<(Option<BTreeMap<String, String>>, String)> = match event.action {
            Action::Mark => vec![(
                Some(janitor_tags()),
                format!(
                    "{type_and_name} scheduled to be cleaned up on {}",
                    format_millis(marked.deletion_date)
                ),
            )],
            Action::Notify => vec![(
                Some(janitor_tags()),
                format!(
                    "{type_and_name} owner {} notified, cleanup on {}",
                    marked.resource_owner,
                    format_millis(marked.deletion_date)
                ),
            )],
            Action::Unmark => vec![(None, "No longer a cleanup candidate".to_string())],
            Action::Delete => vec![(None, format!("{type_and_name} deleted"))],
            Action::OptOut => vec![
                (None, "Opted Out".to_string()),
                (
                    Some(BTreeMap::from([(
                        TAG_EXPIRATION_TIME.to_string(),
                        EXPIRATION_NEVER.to_string(),
                    )])),
                    "Opted Out".to_string(),
                ),
            ],
            Action::Exclude => Vec::new(),
        };

        for (tags_to_set, description) in requests {
            let result = match &tags_to_set {
                Some(t) => self.tagger.tag(marked, config, t, &description).await,
                None => self.tagger.untag(marked, config, &description).await,
            };

            match result {
                Ok(Some(task_id)) => self.track_task(event, task_id, description).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        action = %event.action,
                        resource_id = %marked.resource_id(),
                        error = ?e,
                        "Tagging failed"
                    );
                    self.metrics.increment(
                        names::TAGGING_FAILURES,
                        &[
                            (tags::CONFIGURATION, config.namespace.as_str()),
                            (tags::ACTION, event.action.as_str()),
                        ],
                    );
                }
            }
        }
    }

    async fn track_task(&self, event: &Event, task_id: String, description: String) {
        let record = TaskRecord {
            task_id,
            action: event.action,
            namespace: event.marked_resource.namespace.clone(),
            resource_ids: vec![event.marked_resource.resource_id().to_string()],
            description,
            submitted_at: self.clock.now_millis(),
            status: TaskStatus::InProgress,
        };
        if let Err(e) = self.tasks.add(&record).await {
            warn!(task_id = %record.task_id, error = ?e, "Failed to record provider task");
        }
    }
}
