//! Marked resources and the summaries that justify a mark

use super::Resource;
use chrono::{DateTime, Utc};
use janitor_common::ResourceKind;
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Human readable reason a rule matched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub description: String,
    pub rule_name: String,
}

impl Summary {
    pub fn new(description: impl Into<String>, rule_name: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            rule_name: rule_name.into(),
        }
    }
}

/// Record of a confirmed owner notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationInfo {
    pub recipient: String,
    pub notification_type: String,
    /// Epoch millis of the confirmed send
    pub notification_stamp: i64,
}

/// A resource flagged for cleanup, keyed by `(resource_id, namespace)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkedResource {
    pub resource: Resource,
    pub summaries: Vec<Summary>,
    pub namespace: String,
    pub resource_owner: String,
    /// Epoch millis of the first mark
    pub mark_ts: i64,
    /// Epoch millis after which the resource may be deleted
    pub deletion_date: i64,
    #[serde(default)]
    pub notification_info: Option<NotificationInfo>,
}

impl MarkedResource {
    pub fn new(
        resource: Resource,
        summaries: Vec<Summary>,
        namespace: impl Into<String>,
        resource_owner: impl Into<String>,
        mark_ts: i64,
        retention_days: u32,
    ) -> Self {
        Self {
            resource,
            summaries,
            namespace: namespace.into(),
            resource_owner: resource_owner.into(),
            mark_ts,
            deletion_date: mark_ts + i64::from(retention_days) * MILLIS_PER_DAY,
            notification_info: None,
        }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource.resource_id
    }

    pub fn resource_type(&self) -> ResourceKind {
        self.resource.resource_type
    }

    /// `{namespace}:{resource_id}`
    pub fn unique_id(&self) -> String {
        format!("{}:{}", self.namespace, self.resource.resource_id)
    }

    pub fn deletion_date_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.deletion_date)
    }

    pub fn is_notified(&self) -> bool {
        self.notification_info.is_some()
    }

    /// Whether the grace window has elapsed at `now_millis`
    pub fn is_due(&self, now_millis: i64) -> bool {
        now_millis >= self.deletion_date
    }

    pub fn with_notification_info(mut self, info: NotificationInfo) -> Self {
        self.notification_info = Some(info);
        self
    }

    /// Push the deletion date out; negative amounts are ignored
    pub fn with_additional_time_for_deletion(mut self, millis: i64) -> Self {
        self.deletion_date = self.deletion_date.saturating_add(millis.max(0));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn marked(mark_ts: i64, retention_days: u32) -> MarkedResource {
        MarkedResource::new(
            Resource::new("vol-1", ResourceKind::Volume),
            vec![Summary::new("orphaned", "OrphanedVolumeRule")],
            "aws:test:us-east-1:volume",
            "owner@example.com",
            mark_ts,
            retention_days,
        )
    }

    #[test]
    fn test_deletion_date_from_retention() {
        let resource = marked(1_000, 2);
        assert_eq!(resource.deletion_date, 1_000 + 2 * MILLIS_PER_DAY);
        assert!(!resource.is_due(1_000));
        assert!(resource.is_due(1_000 + 2 * MILLIS_PER_DAY));
        assert_eq!(resource.unique_id(), "aws:test:us-east-1:volume:vol-1");
    }

    #[test]
    fn test_additional_time_ignores_negative() {
        let resource = marked(0, 1).with_additional_time_for_deletion(-5);
        assert_eq!(resource.deletion_date, MILLIS_PER_DAY);
    }

    #[test]
    fn test_roundtrip_keeps_notification() {
        let resource = marked(10, 1).with_notification_info(NotificationInfo {
            recipient: "owner@example.com".to_string(),
            notification_type: "email".to_string(),
            notification_stamp: 20,
        });
        let json = serde_json::to_string(&resource).unwrap();
        let back: MarkedResource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resource);
        assert!(back.is_notified());
    }

    proptest! {
        #[test]
        fn deletion_date_never_precedes_mark(
            mark_ts in 0i64..4_000_000_000_000,
            retention in 0u32..365,
            extra in -1_000_000i64..1_000_000_000,
        ) {
            let resource = marked(mark_ts, retention).with_additional_time_for_deletion(extra);
            prop_assert!(resource.deletion_date >= resource.mark_ts);
        }
    }
}
