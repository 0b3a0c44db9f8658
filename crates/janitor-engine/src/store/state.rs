//! Resource lifecycle audit history

use super::{ResourceStateRepository, SqliteStore};
use crate::error::StoreError;
use crate::model::ResourceState;
use async_trait::async_trait;

fn decode_all(rows: Vec<String>) -> Result<Vec<ResourceState>, StoreError> {
    rows.iter()
        .map(|body| serde_json::from_str(body).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl ResourceStateRepository for SqliteStore {
    async fn upsert(&self, state: &ResourceState) -> Result<(), StoreError> {
        let body = serde_json::to_string(state)?;
        let current = state.current_status.as_ref().map(|s| s.name.as_str());

        sqlx::query(
            "INSERT INTO resource_state
                (resource_id, namespace, resource_type, current_status, opted_out, deleted, body)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(resource_id, namespace) DO UPDATE SET
                resource_type = excluded.resource_type,
                current_status = excluded.current_status,
                opted_out = excluded.opted_out,
                deleted = excluded.deleted,
                body = excluded.body",
        )
        .bind(state.resource_id())
        .bind(state.namespace())
        .bind(state.marked_resource.resource_type().as_str())
        .bind(current)
        .bind(state.opted_out)
        .bind(state.deleted)
        .bind(&body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        resource_id: &str,
        namespace: &str,
    ) -> Result<Option<ResourceState>, StoreError> {
        let body: Option<String> = sqlx::query_scalar(
            "SELECT body FROM resource_state WHERE resource_id = ? AND namespace = ?",
        )
        .bind(resource_id)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;

        body.map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn get_all(&self) -> Result<Vec<ResourceState>, StoreError> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT body FROM resource_state ORDER BY namespace, resource_id")
                .fetch_all(&self.pool)
                .await?;
        decode_all(rows)
    }

    async fn get_by_status(&self, status: &str) -> Result<Vec<ResourceState>, StoreError> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM resource_state WHERE current_status = ?
             ORDER BY namespace, resource_id",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        decode_all(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarkedResource, Resource, Status};
    use crate::store::test_store;
    use janitor_common::{Action, ResourceKind};

    const NS: &str = "aws:test:us-east-1:image";

    fn state(id: &str) -> ResourceState {
        ResourceState::new(MarkedResource::new(
            Resource::new(id, ResourceKind::Image),
            vec![],
            NS,
            "owner",
            0,
            1,
        ))
    }

    #[tokio::test]
    async fn test_upsert_keeps_history() {
        let store = test_store().await;
        let repo: &dyn ResourceStateRepository = &store;

        let mut s = state("img-1");
        s.record(Status::new(Action::Mark, 1));
        repo.upsert(&s).await.unwrap();

        s.record(Status::new(Action::Notify, 2));
        repo.upsert(&s).await.unwrap();

        let stored = repo.get("img-1", NS).await.unwrap().unwrap();
        assert_eq!(stored.statuses.len(), 2);
        assert_eq!(stored.current_status, Some(Status::new(Action::Notify, 2)));
        assert_eq!(repo.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_status_uses_current_status() {
        let store = test_store().await;
        let repo: &dyn ResourceStateRepository = &store;

        let mut marked = state("img-1");
        marked.record(Status::new(Action::Mark, 1));
        repo.upsert(&marked).await.unwrap();

        let mut unmarked = state("img-2");
        unmarked.record(Status::new(Action::Mark, 1));
        unmarked.record(Status::new(Action::Unmark, 2));
        repo.upsert(&unmarked).await.unwrap();

        let by_mark = repo.get_by_status("MARK").await.unwrap();
        assert_eq!(by_mark.len(), 1);
        assert_eq!(by_mark[0].resource_id(), "img-1");
        assert_eq!(repo.get_by_status("UNMARK").await.unwrap().len(), 1);
        assert!(repo.get_by_status("DELETE").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_state() {
        let store = test_store().await;
        let repo: &dyn ResourceStateRepository = &store;
        assert!(repo.get("img-404", NS).await.unwrap().is_none());
    }
}
