//! Resource type handlers
//!
//! A handler drives one resource type through MARK, NOTIFY and DELETE for a
//! work configuration. Handlers are looked up through [`HandlerRegistry`];
//! each failure aborts only the configuration being processed.

mod generic;
pub mod preprocess;

pub use generic::GenericHandler;
pub use preprocess::{
    CandidatePreProcessor, LaunchConfigurationPreProcessor, NoopPreProcessor, VolumePreProcessor,
};

use crate::collaborators::OwnerResolverChain;
use crate::error::HandlerError;
use crate::evaluator::Evaluator;
use crate::events::{Event, ResourceStateManager};
use crate::metrics::Metrics;
use crate::model::{MarkedResource, WorkConfiguration, WorkItem};
use crate::store::Repositories;
use async_trait::async_trait;
use janitor_common::{Action, Clock};
use std::sync::Arc;
use tracing::{debug, info};

/// Counts from one handler invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub candidates: usize,
    pub excluded: usize,
    pub marked: usize,
    pub refreshed: usize,
    pub unmarked: usize,
    pub throttled: usize,
    pub notifications_queued: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failures: usize,
}

#[async_trait]
pub trait ResourceTypeHandler: Send + Sync {
    /// Whether this handler accepts the configuration
    fn handles(&self, config: &WorkConfiguration) -> bool;

    async fn mark(&self, config: &WorkConfiguration) -> Result<CycleReport, HandlerError>;

    async fn notify(&self, config: &WorkConfiguration) -> Result<CycleReport, HandlerError>;

    async fn delete(&self, config: &WorkConfiguration) -> Result<CycleReport, HandlerError>;

    async fn dispatch(
        &self,
        action: Action,
        config: &WorkConfiguration,
    ) -> Result<CycleReport, HandlerError> {
        match action {
            Action::Mark => self.mark(config).await,
            Action::Notify => self.notify(config).await,
            Action::Delete => self.delete(config).await,
            other => {
                debug!(action = %other, "Action is not dispatchable, ignoring");
                Ok(CycleReport::default())
            }
        }
    }
}

/// Dependencies shared by every handler of one process
#[derive(Clone)]
pub struct HandlerContext {
    pub repos: Repositories,
    pub events: Arc<ResourceStateManager>,
    pub evaluator: Arc<Evaluator>,
    pub owners: Arc<OwnerResolverChain>,
    pub metrics: Arc<Metrics>,
    pub clock: Arc<dyn Clock>,
}

impl HandlerContext {
    /// Operator opt-out of a marked resource
    ///
    /// Removes the tracking entry and records OPTOUT. Returns false when the
    /// resource is neither tracked nor known to the state history.
    pub async fn opt_out(
        &self,
        resource_id: &str,
        config: &WorkConfiguration,
    ) -> Result<bool, HandlerError> {
        let namespace = config.namespace.as_str();
        let marked = match self.repos.tracking.find(resource_id, namespace).await? {
            Some(marked) => Some(marked),
            None => self
                .repos
                .state
                .get(resource_id, namespace)
                .await?
                .map(|state| state.marked_resource),
        };
        let Some(marked) = marked else {
            return Ok(false);
        };

        self.repos.tracking.remove(resource_id, namespace).await?;
        self.events
            .handle(&Event::new(Action::OptOut, marked, config))
            .await?;

        info!(namespace, resource_id, "Resource opted out");
        Ok(true)
    }

    /// Remove a tracking entry and record UNMARK
    pub(crate) async fn unmark(
        &self,
        marked: MarkedResource,
        config: &WorkConfiguration,
    ) -> Result<(), HandlerError> {
        self.repos
            .tracking
            .remove(marked.resource_id(), &marked.namespace)
            .await?;
        self.events
            .handle(&Event::new(Action::Unmark, marked, config))
            .await?;
        Ok(())
    }
}

/// Every handler known to a process
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ResourceTypeHandler>>,
}

impl HandlerRegistry {
    pub fn new(handlers: Vec<Arc<dyn ResourceTypeHandler>>) -> Self {
        Self { handlers }
    }

    pub fn register(&mut self, handler: Arc<dyn ResourceTypeHandler>) {
        self.handlers.push(handler);
    }

    pub fn handlers_for<'a>(
        &'a self,
        config: &'a WorkConfiguration,
    ) -> impl Iterator<Item = &'a Arc<dyn ResourceTypeHandler>> + 'a {
        self.handlers.iter().filter(move |h| h.handles(config))
    }

    /// Run one work item on every handler that accepts it
    pub async fn dispatch(&self, item: &WorkItem) -> Result<CycleReport, HandlerError> {
        let config = &item.work_configuration;
        let mut handled = false;
        let mut total = CycleReport::default();

        for handler in self.handlers_for(config) {
            handled = true;
            let report = handler.dispatch(item.action, config).await?;
            total.merge(&report);
        }

        if !handled {
            return Err(HandlerError::Unhandled {
                namespace: config.namespace.clone(),
            });
        }
        Ok(total)
    }
}

impl CycleReport {
    pub fn merge(&mut self, other: &CycleReport) {
        self.candidates += other.candidates;
        self.excluded += other.excluded;
        self.marked += other.marked;
        self.refreshed += other.refreshed;
        self.unmarked += other.unmarked;
        self.throttled += other.throttled;
        self.notifications_queued += other.notifications_queued;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failures += other.failures;
    }
}
