//! Marked resource tracking

use super::{ResourceTrackingRepository, SqliteStore};
use crate::error::StoreError;
use crate::model::MarkedResource;
use async_trait::async_trait;
use janitor_common::ResourceKind;

fn decode_all(rows: Vec<String>) -> Result<Vec<MarkedResource>, StoreError> {
    rows.iter()
        .map(|body| serde_json::from_str(body).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl ResourceTrackingRepository for SqliteStore {
    async fn upsert(&self, marked: &MarkedResource) -> Result<(), StoreError> {
        let body = serde_json::to_string(marked)?;

        sqlx::query(
            "INSERT INTO marked_resources
                (resource_id, namespace, resource_type, deletion_date, notified, body)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(resource_id, namespace) DO UPDATE SET
                resource_type = excluded.resource_type,
                deletion_date = excluded.deletion_date,
                notified = excluded.notified,
                body = excluded.body",
        )
        .bind(marked.resource_id())
        .bind(&marked.namespace)
        .bind(marked.resource_type().as_str())
        .bind(marked.deletion_date)
        .bind(marked.is_notified())
        .bind(&body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        resource_id: &str,
        namespace: &str,
    ) -> Result<Option<MarkedResource>, StoreError> {
        let body: Option<String> = sqlx::query_scalar(
            "SELECT body FROM marked_resources WHERE resource_id = ? AND namespace = ?",
        )
        .bind(resource_id)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;

        body.map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn marked_resources(&self) -> Result<Vec<MarkedResource>, StoreError> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT body FROM marked_resources ORDER BY namespace, resource_id")
                .fetch_all(&self.pool)
                .await?;
        decode_all(rows)
    }

    async fn marked_resources_in(
        &self,
        namespace: &str,
    ) -> Result<Vec<MarkedResource>, StoreError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM marked_resources WHERE namespace = ? ORDER BY resource_id",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn marked_resources_of_type(
        &self,
        resource_type: ResourceKind,
    ) -> Result<Vec<MarkedResource>, StoreError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM marked_resources WHERE resource_type = ?
             ORDER BY namespace, resource_id",
        )
        .bind(resource_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn marked_resources_due(
        &self,
        namespace: &str,
        now_millis: i64,
    ) -> Result<Vec<MarkedResource>, StoreError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM marked_resources WHERE namespace = ? AND deletion_date <= ?
             ORDER BY deletion_date, resource_id",
        )
        .bind(namespace)
        .bind(now_millis)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }

    async fn remove(&self, resource_id: &str, namespace: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM marked_resources WHERE resource_id = ? AND namespace = ?")
            .bind(resource_id)
            .bind(namespace)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
