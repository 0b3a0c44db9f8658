//! Last-seen-in-use bookkeeping

use super::{ResourceUseTrackingRepository, SqliteStore};
use crate::error::StoreError;
use crate::model::LastSeenInfo;
use async_trait::async_trait;
use sqlx::Row;
use std::collections::HashSet;

#[async_trait]
impl ResourceUseTrackingRepository for SqliteStore {
    async fn record_use(
        &self,
        resource_id: &str,
        used_by_resource_id: &str,
        at_millis: i64,
    ) -> Result<(), StoreError> {
        // Never move last_seen backwards when two workers race
        sqlx::query(
            "INSERT INTO resource_use (resource_id, used_by_resource_id, last_seen)
             VALUES (?, ?, ?)
             ON CONFLICT(resource_id) DO UPDATE SET
                used_by_resource_id = excluded.used_by_resource_id,
                last_seen = excluded.last_seen
             WHERE excluded.last_seen >= resource_use.last_seen",
        )
        .bind(resource_id)
        .bind(used_by_resource_id)
        .bind(at_millis)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_used(&self) -> Result<HashSet<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT resource_id FROM resource_use")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn get_unused(&self, threshold_millis: i64) -> Result<Vec<LastSeenInfo>, StoreError> {
        let rows = sqlx::query(
            "SELECT resource_id, used_by_resource_id, last_seen FROM resource_use
             WHERE last_seen < ? ORDER BY resource_id",
        )
        .bind(threshold_millis)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LastSeenInfo {
                    resource_id: row.try_get("resource_id")?,
                    used_by_resource_id: row.try_get("used_by_resource_id")?,
                    time_last_seen: row.try_get("last_seen")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_store;

    #[tokio::test]
    async fn test_record_and_query_use() {
        let store = test_store().await;
        let repo: &dyn ResourceUseTrackingRepository = &store;

        repo.record_use("vol-1", "i-1", 100).await.unwrap();
        repo.record_use("vol-2", "snap-1", 500).await.unwrap();

        let used = repo.get_used().await.unwrap();
        assert!(used.contains("vol-1"));
        assert!(used.contains("vol-2"));

        let unused = repo.get_unused(200).await.unwrap();
        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].resource_id, "vol-1");
        assert_eq!(unused[0].used_by_resource_id, "i-1");
        assert_eq!(unused[0].time_last_seen, 100);
    }

    #[tokio::test]
    async fn test_record_use_never_goes_backwards() {
        let store = test_store().await;
        let repo: &dyn ResourceUseTrackingRepository = &store;

        repo.record_use("vol-1", "i-2", 300).await.unwrap();
        repo.record_use("vol-1", "i-1", 100).await.unwrap();

        assert!(repo.get_unused(200).await.unwrap().is_empty());
        let unused = repo.get_unused(400).await.unwrap();
        assert_eq!(unused[0].used_by_resource_id, "i-2");
        assert_eq!(unused[0].time_last_seen, 300);
    }
}
