//! Fleet-wide advisory locks
//!
//! A lock is a lease row in the shared store. Acquisition succeeds when the
//! row is absent or its lease has expired, so a crashed holder is reclaimed
//! once `max_duration` elapses.

use crate::error::LockError;
use crate::store::DbPool;
use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use janitor_common::Clock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the lock serialising queue drains across the fleet
pub const WORK_PROCESSOR_LOCK: &str = "janitor.work";

/// Name of the lock serialising notification sends
pub const NOTIFICATION_LOCK: &str = "janitor.notifications";

/// Lock scoped to one work configuration
pub fn namespace_lock(namespace: &str) -> String {
    format!("janitor.{namespace}")
}

/// How to take a lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub name: String,
    /// Lease length; after this the lock is considered abandoned
    pub max_duration: Duration,
    /// How long to keep retrying while another worker holds the lock.
    /// Zero means a single attempt.
    pub acquire_timeout: Duration,
}

impl LockOptions {
    pub fn new(name: impl Into<String>, max_duration: Duration) -> Self {
        Self {
            name: name.into(),
            max_duration,
            acquire_timeout: Duration::ZERO,
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// A held lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub name: String,
    pub token: String,
    /// Epoch millis
    pub expires_at: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockingService: Send + Sync {
    /// One acquisition attempt. `Ok(None)` when another worker holds it.
    async fn try_acquire(&self, options: &LockOptions) -> Result<Option<Lease>, LockError>;

    /// Release a lease. Returns false if the lease had already been lost.
    async fn release(&self, lease: &Lease) -> Result<bool, LockError>;
}

/// Acquire with retries until `options.acquire_timeout` elapses
pub async fn acquire(
    service: &dyn LockingService,
    options: &LockOptions,
) -> Result<Option<Lease>, LockError> {
    let deadline = tokio::time::Instant::now() + options.acquire_timeout;
    let mut delays = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(2))
        .with_factor(2.0)
        .with_jitter()
        .without_max_times()
        .build();

    loop {
        if let Some(lease) = service.try_acquire(options).await? {
            return Ok(Some(lease));
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        let delay = delays
            .next()
            .unwrap_or(Duration::from_secs(2))
            .min(deadline - now);
        debug!(lock = %options.name, delay_ms = delay.as_millis(), "Lock held elsewhere, retrying");
        tokio::time::sleep(delay).await;
    }
}

/// Run `block` while holding the named lock
///
/// Returns `Ok(None)` without running `block` when another worker holds the
/// lock. Losing the lease while `block` runs is logged, not fatal.
pub async fn with_lock<F, Fut, T>(
    service: &dyn LockingService,
    options: &LockOptions,
    block: F,
) -> Result<Option<T>, LockError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let Some(lease) = acquire(service, options).await? else {
        debug!(lock = %options.name, "Lock unavailable, skipping");
        return Ok(None);
    };

    let value = block().await;

    match service.release(&lease).await {
        Ok(true) => {}
        Ok(false) => warn!(lock = %lease.name, "Lease expired before release"),
        Err(e) => warn!(lock = %lease.name, error = ?e, "Failed to release lock"),
    }

    Ok(Some(value))
}

/// Lease-row locks in the shared SQLite store
pub struct SqliteLockingService {
    pool: DbPool,
    owner: String,
    clock: Arc<dyn Clock>,
}

impl SqliteLockingService {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            owner: uuid::Uuid::new_v4().to_string(),
            clock,
        }
    }

    /// Identity written into held lock rows
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Current holder of a lock, if its lease is live
    pub async fn holder(&self, name: &str) -> Result<Option<String>, LockError> {
        sqlx::query_scalar("SELECT owner FROM locks WHERE name = ? AND expires_at > ?")
            .bind(name)
            .bind(self.clock.now_millis())
            .fetch_optional(&self.pool)
            .await
            .map_err(|source| LockError::Unavailable {
                name: name.to_string(),
                source,
            })
    }
}

#[async_trait]
impl LockingService for SqliteLockingService {
    async fn try_acquire(&self, options: &LockOptions) -> Result<Option<Lease>, LockError> {
        let now = self.clock.now_millis();
        let lease_millis = i64::try_from(options.max_duration.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(lease_millis);
        let token = uuid::Uuid::new_v4().to_string();

        let result = sqlx::query(
            "INSERT INTO locks (name, owner, token, acquired_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                owner = excluded.owner,
                token = excluded.token,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
             WHERE locks.expires_at <= excluded.acquired_at",
        )
        .bind(&options.name)
        .bind(&self.owner)
        .bind(&token)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|source| LockError::Unavailable {
            name: options.name.clone(),
            source,
        })?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        debug!(lock = %options.name, owner = %self.owner, expires_at, "Lock acquired");
        Ok(Some(Lease {
            name: options.name.clone(),
            token,
            expires_at,
        }))
    }

    async fn release(&self, lease: &Lease) -> Result<bool, LockError> {
        let result = sqlx::query("DELETE FROM locks WHERE name = ? AND token = ?")
            .bind(&lease.name)
            .bind(&lease.token)
            .execute(&self.pool)
            .await
            .map_err(|source| LockError::Unavailable {
                name: lease.name.clone(),
                source,
            })?;

        Ok(result.rows_affected() == 1)
    }
}
