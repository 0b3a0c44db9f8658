//! Default configuration values
//!
//! These constants keep the config file, the CLI and the engine in agreement.

/// Default cloud provider name
pub const DEFAULT_CLOUD_PROVIDER: &str = "aws";

/// Default days between mark and delete
pub const DEFAULT_RETENTION_DAYS: u32 = 14;

/// Default days a resource must sit unused before it can be marked
pub const DEFAULT_OUT_OF_USE_THRESHOLD_DAYS: u32 = 30;

/// Default cap on resources processed per work configuration per cycle
pub const DEFAULT_MAX_ITEMS_PER_CYCLE: usize = 10;

/// Default number of resources listed in a single notification
pub const DEFAULT_ITEMS_PER_MESSAGE: usize = 10;

/// Default owner used when no owner can be resolved for a resource
pub const DEFAULT_OWNER: &str = "janitor@localhost";

/// Default interval of the work queue processor (3 minutes)
pub const DEFAULT_WORK_INTERVAL_SECS: u64 = 180;

/// Default interval of the work queue monitor (15 minutes)
pub const DEFAULT_QUEUE_MONITOR_INTERVAL_SECS: u64 = 900;

/// Default interval of the notification sender (1 hour)
pub const DEFAULT_NOTIFICATION_INTERVAL_SECS: u64 = 3600;

/// Default maximum lock duration before a lease is considered abandoned (30 minutes)
pub const DEFAULT_MAX_LOCK_DURATION_SECS: u64 = 1800;

/// Default fixed delay between agent ticks (1 hour)
pub const DEFAULT_AGENT_FREQUENCY_SECS: u64 = 3600;

/// Default delay before an agent's first tick
pub const DEFAULT_AGENT_DELAY_SECS: u64 = 0;

/// Default polling interval while waiting for reference caches to load
pub const DEFAULT_CACHE_POLL_INTERVAL_SECS: u64 = 5;

/// Default number of work configurations dispatched concurrently per tick
pub const DEFAULT_MAX_CONCURRENT_DISPATCH: usize = 4;

/// Flag key that disables all scheduled work when set
pub const WORK_DISABLED_FLAG: &str = "janitor.work";

// Serde default functions for struct field defaults

pub fn default_cloud_provider() -> String {
    DEFAULT_CLOUD_PROVIDER.to_string()
}

pub fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

pub fn default_out_of_use_threshold_days() -> u32 {
    DEFAULT_OUT_OF_USE_THRESHOLD_DAYS
}

pub fn default_max_items_per_cycle() -> usize {
    DEFAULT_MAX_ITEMS_PER_CYCLE
}

pub fn default_items_per_message() -> usize {
    DEFAULT_ITEMS_PER_MESSAGE
}

pub fn default_owner() -> String {
    DEFAULT_OWNER.to_string()
}

pub fn default_work_interval_secs() -> u64 {
    DEFAULT_WORK_INTERVAL_SECS
}

pub fn default_queue_monitor_interval_secs() -> u64 {
    DEFAULT_QUEUE_MONITOR_INTERVAL_SECS
}

pub fn default_notification_interval_secs() -> u64 {
    DEFAULT_NOTIFICATION_INTERVAL_SECS
}

pub fn default_max_lock_duration_secs() -> u64 {
    DEFAULT_MAX_LOCK_DURATION_SECS
}

pub fn default_agent_frequency_secs() -> u64 {
    DEFAULT_AGENT_FREQUENCY_SECS
}

pub fn default_agent_delay_secs() -> u64 {
    DEFAULT_AGENT_DELAY_SECS
}

pub fn default_cache_poll_interval_secs() -> u64 {
    DEFAULT_CACHE_POLL_INTERVAL_SECS
}

pub fn default_max_concurrent_dispatch() -> usize {
    DEFAULT_MAX_CONCURRENT_DISPATCH
}

pub fn default_true() -> bool {
    true
}
