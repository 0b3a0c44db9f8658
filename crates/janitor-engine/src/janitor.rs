//! Process wiring
//!
//! [`Janitor`] turns a validated [`JanitorConfig`] plus collaborators into
//! handlers and scheduled agents sharing one store, one metrics sink and one
//! membership signal.

use crate::agent::{ActionDispatcher, AgentJob, AgentSettings, ScheduledAgent, WorkGate};
use crate::collaborators::{
    Notifier, OwnerResolverChain, ReferenceCache, ResourceProvider, ResourceTagger,
};
use crate::config::JanitorConfig;
use crate::discovery::{ClusterMembership, DynamicFlags};
use crate::evaluator::Evaluator;
use crate::events::ResourceStateManager;
use crate::exclusions::default_policies;
use crate::handler::{
    CandidatePreProcessor, GenericHandler, HandlerContext, HandlerRegistry,
    LaunchConfigurationPreProcessor, NoopPreProcessor, VolumePreProcessor,
};
use crate::lock::LockingService;
use crate::metrics::Metrics;
use crate::model::WorkConfiguration;
use crate::notifications::NotificationSender;
use crate::rules::RuleRegistry;
use crate::store::Repositories;
use crate::work::{WorkProcessor, WorkQueueManager};
use janitor_common::{Action, Clock, ResourceKind};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Systems the engine drives but does not implement
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn ResourceProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub tagger: Arc<dyn ResourceTagger>,
    pub cache: Arc<dyn ReferenceCache>,
    pub owners: OwnerResolverChain,
}

pub struct Janitor {
    config: JanitorConfig,
    configurations: Vec<WorkConfiguration>,
    ctx: HandlerContext,
    registry: Arc<HandlerRegistry>,
    locks: Arc<dyn LockingService>,
    collaborators: Collaborators,
    membership: ClusterMembership,
    flags: DynamicFlags,
}

impl std::fmt::Debug for Janitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Janitor")
            .field("configurations", &self.configurations.len())
            .field("membership", &self.membership.status())
            .finish()
    }
}

impl Janitor {
    pub fn new(
        config: JanitorConfig,
        repos: Repositories,
        locks: Arc<dyn LockingService>,
        collaborators: Collaborators,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = Arc::new(ResourceStateManager::new(
            repos.state.clone(),
            repos.tasks.clone(),
            collaborators.tagger.clone(),
            metrics.clone(),
            clock.clone(),
        ));
        let ctx = HandlerContext {
            repos,
            events,
            evaluator: Arc::new(Evaluator::new(
                default_policies(),
                RuleRegistry::with_defaults(),
            )),
            owners: Arc::new(collaborators.owners.clone()),
            metrics,
            clock,
        };

        let configurations = config.work_configurations();
        let registry = Arc::new(build_registry(&configurations, &collaborators, &ctx));

        Self {
            config,
            configurations,
            ctx,
            registry,
            locks,
            collaborators,
            membership: ClusterMembership::default(),
            flags: DynamicFlags::new(),
        }
    }

    pub fn configurations(&self) -> &[WorkConfiguration] {
        &self.configurations
    }

    /// Configuration by namespace
    pub fn configuration(&self, namespace: &str) -> Option<&WorkConfiguration> {
        self.configurations.iter().find(|c| c.namespace == namespace)
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn membership(&self) -> &ClusterMembership {
        &self.membership
    }

    pub fn flags(&self) -> &DynamicFlags {
        &self.flags
    }

    fn gate(&self) -> WorkGate {
        WorkGate::new(
            self.flags.clone(),
            self.config.schedule.clone(),
            self.ctx.clock.clone(),
        )
    }

    pub fn notification_sender(&self) -> NotificationSender {
        NotificationSender::new(
            self.ctx.repos.tracking.clone(),
            self.ctx.repos.notification_queue.clone(),
            &self.configurations,
            self.collaborators.notifier.clone(),
            self.ctx.events.clone(),
            self.locks.clone(),
            self.config.work.max_lock_duration(),
            self.ctx.metrics.clone(),
            self.ctx.clock.clone(),
        )
    }

    pub fn work_processor(&self) -> WorkProcessor {
        WorkProcessor::new(
            self.ctx.repos.work_queue.clone(),
            self.registry.clone(),
            self.locks.clone(),
            self.config.work.max_lock_duration(),
            self.ctx.metrics.clone(),
        )
    }

    pub fn queue_manager(&self) -> WorkQueueManager {
        WorkQueueManager::new(
            self.ctx.repos.work_queue.clone(),
            self.configurations.clone(),
            self.gate(),
            self.ctx.metrics.clone(),
        )
    }

    pub fn dispatcher(&self, action: Action) -> ActionDispatcher {
        ActionDispatcher::new(
            action,
            self.configurations.clone(),
            self.registry.clone(),
            self.locks.clone(),
            self.config.work.max_lock_duration(),
            self.config.agents.max_concurrent_dispatch,
            self.ctx.metrics.clone(),
        )
    }

    fn agent(&self, job: Arc<dyn AgentJob>, settings: AgentSettings) -> ScheduledAgent {
        ScheduledAgent::new(
            job,
            settings,
            self.membership.clone(),
            self.ctx.metrics.clone(),
            self.ctx.clock.clone(),
        )
    }

    /// Every agent this process runs
    pub fn agents(&self) -> Vec<Arc<ScheduledAgent>> {
        let timing = &self.config.agents;
        let cache = &self.collaborators.cache;

        let mark = self
            .agent(
                Arc::new(self.dispatcher(Action::Mark)),
                timing.settings(&timing.mark),
            )
            .with_cache(cache.clone())
            .with_gate(self.gate());
        let notify = self
            .agent(
                Arc::new(self.dispatcher(Action::Notify)),
                timing.settings(&timing.notify),
            )
            .with_gate(self.gate());
        let delete = self
            .agent(
                Arc::new(self.dispatcher(Action::Delete)),
                timing.settings(&timing.delete),
            )
            .with_cache(cache.clone())
            .with_gate(self.gate());
        let sender = self
            .agent(
                Arc::new(self.notification_sender()),
                timing.periodic(self.config.notifications.interval_secs),
            )
            .with_gate(self.gate());
        let processor = self
            .agent(
                Arc::new(self.work_processor()),
                timing.periodic(self.config.work.processor_interval_secs),
            )
            .with_gate(self.gate());
        // Ungated: it clears the queue when work is not allowed
        let monitor = self.agent(
            Arc::new(self.queue_manager()),
            timing.periodic(self.config.work.queue_monitor_interval_secs),
        );

        [mark, notify, delete, sender, processor, monitor]
            .into_iter()
            .map(Arc::new)
            .collect()
    }

    /// Run every agent until `shutdown` fires
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut join_set = JoinSet::new();
        for agent in self.agents() {
            join_set.spawn(agent.run(shutdown.clone()));
        }
        info!(
            agents = join_set.len(),
            configurations = self.configurations.len(),
            "Janitor running"
        );

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(()) => {}
                Err(e) if e.is_panic() => error!(error = ?e, "Agent panicked"),
                Err(e) => error!(error = ?e, "Agent task failed"),
            }
        }
    }
}

/// One generic handler per (resource type, cloud provider) in use
fn build_registry(
    configurations: &[WorkConfiguration],
    collaborators: &Collaborators,
    ctx: &HandlerContext,
) -> HandlerRegistry {
    let pairs: BTreeSet<(ResourceKind, &str)> = configurations
        .iter()
        .map(|c| (c.resource_type, c.cloud_provider.as_str()))
        .collect();

    let mut registry = HandlerRegistry::default();
    for (resource_type, cloud_provider) in pairs {
        let pre_processor: Arc<dyn CandidatePreProcessor> = match resource_type {
            ResourceKind::Volume => Arc::new(VolumePreProcessor::new(
                ctx.repos.usage.clone(),
                ctx.clock.clone(),
            )),
            ResourceKind::LaunchConfiguration => Arc::new(LaunchConfigurationPreProcessor::new(
                collaborators.cache.clone(),
            )),
            _ => Arc::new(NoopPreProcessor),
        };
        registry.register(Arc::new(GenericHandler::new(
            resource_type,
            cloud_provider,
            collaborators.provider.clone(),
            pre_processor,
            ctx.clone(),
        )));
    }
    registry
}
