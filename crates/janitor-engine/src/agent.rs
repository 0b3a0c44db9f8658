//! Discovery-gated scheduled agents
//!
//! An agent runs one [`AgentJob`] on a fixed delay while this process is a
//! cluster member. Its lifecycle is an explicit state machine:
//!
//! ```text
//! Idle --up--> WaitingOnDependency --cache loaded--> Active --down--> Idle
//!   any state --shutdown--> Stopped
//! ```
//!
//! Going down or shutting down stops future ticks. A tick already running is
//! allowed to finish.

use crate::collaborators::ReferenceCache;
use crate::discovery::{ClusterMembership, DynamicFlags, MembershipStatus};
use crate::handler::{CycleReport, HandlerRegistry};
use crate::lock::{LockOptions, LockingService, namespace_lock, with_lock};
use crate::metrics::{Metrics, names, tags};
use crate::model::{WorkConfiguration, WorkItem};
use crate::schedule::Schedule;
use crate::wait::wait_for_cache;
use anyhow::Result;
use async_trait::async_trait;
use janitor_common::{Action, Clock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ── Jobs ────────────────────────────────────────────────────────────────

/// One unit of periodic work driven by a [`ScheduledAgent`]
#[async_trait]
pub trait AgentJob: Send + Sync {
    fn name(&self) -> &str;

    /// Run one tick. Errors are logged by the agent and retried next tick.
    async fn run_once(&self) -> Result<()>;
}

/// Why a gated tick did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    OffHours,
}

/// Kill switch plus working-hours window
#[derive(Clone)]
pub struct WorkGate {
    flags: DynamicFlags,
    schedule: Schedule,
    clock: Arc<dyn Clock>,
}

impl WorkGate {
    pub fn new(flags: DynamicFlags, schedule: Schedule, clock: Arc<dyn Clock>) -> Self {
        Self {
            flags,
            schedule,
            clock,
        }
    }

    /// `None` when work may happen now
    pub fn check(&self) -> Option<SkipReason> {
        if self.flags.work_disabled() {
            return Some(SkipReason::Disabled);
        }
        if !self.schedule.time_to_work(self.clock.now()) {
            return Some(SkipReason::OffHours);
        }
        None
    }
}

// ── Agent ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    WaitingOnDependency,
    Active,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Delay before the first tick after becoming active
    pub initial_delay: Duration,
    /// Delay between the end of one tick and the start of the next
    pub frequency: Duration,
    pub cache_poll_interval: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        use janitor_common::defaults::{
            DEFAULT_AGENT_DELAY_SECS, DEFAULT_AGENT_FREQUENCY_SECS,
            DEFAULT_CACHE_POLL_INTERVAL_SECS,
        };
        Self {
            initial_delay: Duration::from_secs(DEFAULT_AGENT_DELAY_SECS),
            frequency: Duration::from_secs(DEFAULT_AGENT_FREQUENCY_SECS),
            cache_poll_interval: Duration::from_secs(DEFAULT_CACHE_POLL_INTERVAL_SECS),
        }
    }
}

pub struct ScheduledAgent {
    job: Arc<dyn AgentJob>,
    settings: AgentSettings,
    membership: ClusterMembership,
    cache: Option<Arc<dyn ReferenceCache>>,
    gate: Option<WorkGate>,
    metrics: Arc<Metrics>,
    clock: Arc<dyn Clock>,
    state: watch::Sender<AgentState>,
}

impl std::fmt::Debug for ScheduledAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledAgent")
            .field("job", &self.job.name())
            .field("state", &self.state())
            .field("settings", &self.settings)
            .finish()
    }
}

impl ScheduledAgent {
    pub fn new(
        job: Arc<dyn AgentJob>,
        settings: AgentSettings,
        membership: ClusterMembership,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _rx) = watch::channel(AgentState::Idle);
        Self {
            job,
            settings,
            membership,
            cache: None,
            gate: None,
            metrics,
            clock,
            state,
        }
    }

    /// Do not start ticking until `cache` has loaded
    pub fn with_cache(mut self, cache: Arc<dyn ReferenceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Skip ticks while the kill switch is on or outside working hours
    pub fn with_gate(mut self, gate: WorkGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: AgentState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(agent = self.name(), from = ?previous, to = ?state, "Agent state changed");
        }
    }

    /// Follow membership transitions until `shutdown` fires
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut membership = self.membership.subscribe();
        info!(agent = self.name(), "Agent started");

        loop {
            let status = *membership.borrow_and_update();
            match status {
                MembershipStatus::Up => {
                    let active = shutdown.child_token();
                    let work = self.run_active(&active);
                    tokio::pin!(work);

                    let keep_going = tokio::select! {
                        _ = &mut work => !shutdown.is_cancelled(),
                        changed = membership.changed() => {
                            active.cancel();
                            work.await;
                            changed.is_ok()
                        }
                        _ = shutdown.cancelled() => {
                            active.cancel();
                            work.await;
                            false
                        }
                    };
                    if !keep_going {
                        break;
                    }
                }
                MembershipStatus::Down => {
                    self.set_state(AgentState::Idle);
                    tokio::select! {
                        changed = membership.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        self.set_state(AgentState::Stopped);
        info!(agent = self.name(), "Agent stopped");
    }

    /// Wait for dependencies, then tick until `active` is cancelled
    async fn run_active(&self, active: &CancellationToken) {
        if let Some(cache) = &self.cache {
            self.set_state(AgentState::WaitingOnDependency);
            if let Err(e) =
                wait_for_cache(cache.as_ref(), self.settings.cache_poll_interval, active).await
            {
                debug!(agent = self.name(), error = %e, "Stopped waiting for cache");
                return;
            }
        }

        self.set_state(AgentState::Active);
        let mut delay = self.settings.initial_delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = active.cancelled() => return,
            }
            self.tick().await;
            delay = self.settings.frequency;
        }
    }

    /// Run the job once unless the gate says otherwise
    pub async fn tick(&self) -> Option<SkipReason> {
        if let Some(reason) = self.gate.as_ref().and_then(WorkGate::check) {
            debug!(agent = self.name(), reason = ?reason, "Skipping tick");
            return Some(reason);
        }

        if let Err(e) = self.job.run_once().await {
            error!(agent = self.name(), error = ?e, "Agent tick failed");
        }
        self.metrics.gauge(
            names::AGENT_LAST_RUN,
            &[(tags::AGENT, self.name())],
            self.clock.now_millis(),
        );
        None
    }
}

// ── Action dispatch ─────────────────────────────────────────────────────

/// Counts from one dispatch tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub succeeded: usize,
    pub failed: usize,
    pub lock_held: usize,
    pub unhandled: usize,
    pub cycle: CycleReport,
}

/// Runs one action across every work configuration
///
/// Configurations are dispatched concurrently up to `max_concurrent`, each
/// under its namespace lock. One configuration failing never affects the
/// others.
pub struct ActionDispatcher {
    name: String,
    action: Action,
    configurations: Vec<WorkConfiguration>,
    registry: Arc<HandlerRegistry>,
    locks: Arc<dyn LockingService>,
    lock_max_duration: Duration,
    max_concurrent: usize,
    metrics: Arc<Metrics>,
}

impl ActionDispatcher {
    pub fn new(
        action: Action,
        configurations: Vec<WorkConfiguration>,
        registry: Arc<HandlerRegistry>,
        locks: Arc<dyn LockingService>,
        lock_max_duration: Duration,
        max_concurrent: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            name: format!("{}-agent", action.as_str().to_ascii_lowercase()),
            action,
            configurations,
            registry,
            locks,
            lock_max_duration,
            max_concurrent,
            metrics,
        }
    }

    pub async fn dispatch_all(&self) -> TickReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent.max(1)));
        let mut join_set = JoinSet::new();
        let mut report = TickReport::default();

        for config in &self.configurations {
            if self.registry.handlers_for(config).next().is_none() {
                debug!(namespace = %config.namespace, "No handler for configuration");
                report.unhandled += 1;
                continue;
            }

            let semaphore = semaphore.clone();
            let registry = self.registry.clone();
            let locks = self.locks.clone();
            let options =
                LockOptions::new(namespace_lock(&config.namespace), self.lock_max_duration);
            let item = WorkItem::new(config.clone(), self.action);

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let outcome =
                    with_lock(locks.as_ref(), &options, || registry.dispatch(&item)).await;
                (item, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(Some(Ok(cycle))))) => {
                    report.succeeded += 1;
                    report.cycle.merge(&cycle);
                }
                Ok((item, Ok(Some(Err(e))))) => {
                    report.failed += 1;
                    self.count_failure(&item);
                    error!(
                        namespace = %item.work_configuration.namespace,
                        action = %item.action,
                        error = ?e,
                        "Work configuration failed, retrying next tick"
                    );
                }
                Ok((item, Ok(None))) => {
                    report.lock_held += 1;
                    let lock = namespace_lock(&item.work_configuration.namespace);
                    self.metrics
                        .increment(names::LOCK_UNAVAILABLE, &[(tags::LOCK, lock.as_str())]);
                    debug!(namespace = %item.work_configuration.namespace, "Namespace busy, skipping");
                }
                Ok((item, Err(e))) => {
                    report.failed += 1;
                    self.count_failure(&item);
                    warn!(
                        namespace = %item.work_configuration.namespace,
                        error = ?e,
                        "Lock service unavailable, skipping"
                    );
                }
                Err(e) if e.is_panic() => {
                    report.failed += 1;
                    error!(agent = %self.name, error = ?e, "Dispatch task panicked");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(agent = %self.name, error = ?e, "Dispatch task cancelled");
                }
            }
        }

        info!(
            agent = %self.name,
            succeeded = report.succeeded,
            failed = report.failed,
            lock_held = report.lock_held,
            "Dispatch tick complete"
        );
        report
    }

    fn count_failure(&self, item: &WorkItem) {
        let [configuration, resource_type] = item.work_configuration.metric_tags();
        self.metrics.increment(
            names::HANDLER_FAILURES,
            &[configuration, resource_type, (tags::ACTION, item.action.as_str())],
        );
    }
}

#[async_trait]
impl AgentJob for ActionDispatcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_once(&self) -> Result<()> {
        self.dispatch_all().await;
        Ok(())
    }
}
