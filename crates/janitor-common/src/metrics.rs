//! Shared metric names and tag keys.
//!
//! This module is the single source of truth for metric identifiers. The
//! engine records against these names and the operator CLI reads them back
//! when printing a metrics snapshot.

/// Prefix shared by every janitor metric
pub const PREFIX: &str = "janitor";

/// Tag keys attached to metrics
pub mod tags {
    pub const CONFIGURATION: &str = "configuration";
    pub const RESOURCE_TYPE: &str = "resourceType";
    pub const ACTION: &str = "action";
    pub const RESULT: &str = "result";
    pub const LOCK: &str = "lock";
    pub const AGENT: &str = "agent";
}

/// Metric names
pub mod names {
    // Lifecycle transition counters
    pub const MARK_COUNT: &str = "janitor.resources.markCount";
    pub const UNMARK_COUNT: &str = "janitor.resources.unMarkCount";
    pub const DELETE_COUNT: &str = "janitor.resources.deleteCount";
    pub const NOTIFY_COUNT: &str = "janitor.resources.notifyCount";
    pub const OPT_OUT_COUNT: &str = "janitor.resources.optOutCount";
    pub const EXCLUDED_COUNT: &str = "janitor.resources.excludedCount";

    // Per-cycle gauges
    pub const CANDIDATES: &str = "janitor.resources.candidates";
    pub const VISITED: &str = "janitor.resources.visited";
    pub const MARKED_IN_CYCLE: &str = "janitor.resources.markedInCycle";

    // Failures
    pub const RULE_FAILURES: &str = "janitor.rules.failures";
    pub const HANDLER_FAILURES: &str = "janitor.handlers.failures";
    pub const TAGGING_FAILURES: &str = "janitor.tagging.failures";

    // Work queue
    pub const WORK_ITEMS: &str = "janitor.work.items";
    pub const QUEUE_FILL: &str = "janitor.queue.fill";
    pub const QUEUE_SIZE: &str = "janitor.queue.size";

    // Coordination
    pub const LOCK_UNAVAILABLE: &str = "janitor.locks.unavailable";
    pub const NOTIFICATIONS: &str = "janitor.notifications";
    pub const AGENT_LAST_RUN: &str = "janitor.agents.lastRunMillis";
}

/// Values for the [`tags::RESULT`] tag
pub mod results {
    pub const SUCCESS: &str = "success";
    pub const FAILURE: &str = "failure";
}
