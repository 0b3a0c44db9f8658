//! Cluster membership and runtime flags
//!
//! Membership says whether this process may do scheduled work right now.
//! Agents subscribe to it and react to up/down transitions. Flags are the
//! operator kill switches consulted on every tick.

use janitor_common::defaults::WORK_DISABLED_FLAG;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::info;

/// Whether this process is currently eligible to do work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    Up,
    Down,
}

/// Shared membership signal
///
/// Cloning yields another handle to the same signal.
#[derive(Debug, Clone)]
pub struct ClusterMembership {
    tx: Arc<watch::Sender<MembershipStatus>>,
}

impl ClusterMembership {
    pub fn new(initial: MembershipStatus) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn status(&self) -> MembershipStatus {
        *self.tx.borrow()
    }

    pub fn is_up(&self) -> bool {
        self.status() == MembershipStatus::Up
    }

    /// Move to `status`, notifying subscribers only on an actual change
    pub fn set(&self, status: MembershipStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            info!(status = ?status, "Cluster membership changed");
        }
    }

    pub fn up(&self) {
        self.set(MembershipStatus::Up);
    }

    pub fn down(&self) {
        self.set(MembershipStatus::Down);
    }

    pub fn subscribe(&self) -> watch::Receiver<MembershipStatus> {
        self.tx.subscribe()
    }
}

impl Default for ClusterMembership {
    fn default() -> Self {
        Self::new(MembershipStatus::Down)
    }
}

/// In-process boolean flags, read on every tick
#[derive(Debug, Clone, Default)]
pub struct DynamicFlags {
    flags: Arc<RwLock<HashMap<String, bool>>>,
}

impl DynamicFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: bool) {
        let mut flags = self.flags.write().unwrap_or_else(|e| e.into_inner());
        flags.insert(key.to_string(), value);
    }

    /// Unset flags read as false
    pub fn get(&self, key: &str) -> bool {
        let flags = self.flags.read().unwrap_or_else(|e| e.into_inner());
        flags.get(key).copied().unwrap_or(false)
    }

    /// Whether the global kill switch is on
    pub fn work_disabled(&self) -> bool {
        self.get(WORK_DISABLED_FLAG)
    }

    pub fn set_work_disabled(&self, disabled: bool) {
        if disabled != self.work_disabled() {
            info!(disabled, "Scheduled work kill switch changed");
        }
        self.set(WORK_DISABLED_FLAG, disabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let membership = ClusterMembership::default();
        let mut rx = membership.subscribe();
        assert_eq!(*rx.borrow_and_update(), MembershipStatus::Down);

        membership.up();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), MembershipStatus::Up);
        assert!(membership.is_up());
    }

    #[tokio::test]
    async fn test_repeated_status_does_not_notify() {
        let membership = ClusterMembership::new(MembershipStatus::Up);
        let mut rx = membership.subscribe();
        rx.borrow_and_update();

        membership.up();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_flags_default_to_false() {
        let flags = DynamicFlags::new();
        assert!(!flags.work_disabled());

        flags.set_work_disabled(true);
        assert!(flags.work_disabled());
        assert!(flags.get(WORK_DISABLED_FLAG));

        let shared = flags.clone();
        shared.set_work_disabled(false);
        assert!(!flags.work_disabled());
    }
}
