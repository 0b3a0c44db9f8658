//! End-to-end resource lifecycle against an in-memory store and a JSON
//! inventory: mark, notify, wait out retention, delete.

use chrono::Duration;
use janitor_common::{Action, Clock, FixedClock, ResourceKind};
use janitor_engine::collaborators::{
    LogNotifier, NoopTagger, OwnerResolverChain, TagOwnerResolver,
};
use janitor_engine::config::{JanitorConfig, ProviderConfig, ResourceTypeConfig};
use janitor_engine::inventory::FileInventory;
use janitor_engine::janitor::{Collaborators, Janitor};
use janitor_engine::lock::SqliteLockingService;
use janitor_engine::metrics::Metrics;
use janitor_engine::model::{Account, Lifecycle, RuleDefinition, WorkItem};
use janitor_engine::rules::RuleRegistry;
use janitor_engine::store::{Repositories, SqliteStore, setup_schema};
use std::sync::Arc;
use tempfile::TempDir;

const NAMESPACE: &str = "aws:test:us-east-1:volume";

const INVENTORY: &str = r#"{
    "resources": {
        "aws:test:us-east-1": [
            { "resourceId": "vol-orphan", "resourceType": "volume",
              "tags": { "owner": "alice@example.com" },
              "spec": { "kind": "volume", "state": "available" } },
            { "resourceId": "vol-busy", "resourceType": "volume",
              "tags": { "owner": "bob@example.com" },
              "spec": { "kind": "volume", "state": "in-use" } }
        ]
    }
}"#;

struct Harness {
    janitor: Janitor,
    inventory: Arc<FileInventory>,
    clock: Arc<FixedClock>,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(&path, INVENTORY).unwrap();
        let inventory = Arc::new(FileInventory::new(path));

        let config = JanitorConfig {
            providers: vec![ProviderConfig {
                name: "aws".to_string(),
                accounts: vec![Account::new("test", None)],
                locations: vec!["us-east-1".to_string()],
                exclusions: Vec::new(),
                resource_types: vec![ResourceTypeConfig::new(
                    ResourceKind::Volume,
                    vec![RuleDefinition::named("OrphanedVolumeRule")],
                )],
            }],
            ..JanitorConfig::default()
        };
        config.validate(&RuleRegistry::with_defaults()).unwrap();

        let pool = janitor_test_utils::open_test_db().await.unwrap();
        setup_schema(&pool).await.unwrap();
        let clock = janitor_test_utils::fixed_clock();

        let janitor = Janitor::new(
            config,
            Repositories::sqlite(SqliteStore::new(pool.clone(), clock.clone())),
            Arc::new(SqliteLockingService::new(pool, clock.clone())),
            Collaborators {
                provider: inventory.clone(),
                notifier: Arc::new(LogNotifier),
                tagger: Arc::new(NoopTagger),
                cache: inventory.clone(),
                owners: OwnerResolverChain::new(vec![Arc::new(TagOwnerResolver::default())]),
            },
            Arc::new(Metrics::new()),
            clock.clone(),
        );

        Self {
            janitor,
            inventory,
            clock,
            _dir: dir,
        }
    }

    async fn dispatch(&self, action: Action) -> janitor_engine::handler::CycleReport {
        let config = self.janitor.configuration(NAMESPACE).unwrap().clone();
        self.janitor
            .registry()
            .dispatch(&WorkItem::new(config, action))
            .await
            .unwrap()
    }

    fn repos(&self) -> &Repositories {
        &self.janitor.context().repos
    }

    async fn lifecycle(&self, resource_id: &str) -> Option<Lifecycle> {
        self.repos()
            .state
            .get(resource_id, NAMESPACE)
            .await
            .unwrap()
            .map(|s| s.lifecycle())
    }
}

#[tokio::test]
async fn test_mark_notify_delete() {
    let h = Harness::new().await;
    let marked_at = h.clock.now_millis();

    // Only the orphaned volume is marked
    assert_eq!(h.dispatch(Action::Mark).await.marked, 1);
    let marked = h.repos().tracking.marked_resources().await.unwrap();
    assert_eq!(marked.len(), 1);
    assert_eq!(marked[0].resource_id(), "vol-orphan");
    assert_eq!(marked[0].resource_owner, "alice@example.com");
    assert_eq!(h.lifecycle("vol-orphan").await, Some(Lifecycle::Marked));
    assert_eq!(h.lifecycle("vol-busy").await, None);

    // Notified a day late: the owner still gets the full retention window
    h.clock.advance(Duration::days(1));
    assert_eq!(h.dispatch(Action::Notify).await.notifications_queued, 1);
    let report = h.janitor.notification_sender().run().await.unwrap().unwrap();
    assert_eq!(report.resources_notified, 1);
    assert_eq!(h.lifecycle("vol-orphan").await, Some(Lifecycle::Notified));

    let notified = h.repos().tracking.marked_resources().await.unwrap();
    assert_eq!(
        notified[0].deletion_date,
        marked_at + Duration::days(15).num_milliseconds()
    );

    // Original deletion date has passed but the extended one has not
    h.clock.advance(Duration::days(13) + Duration::hours(1));
    assert_eq!(h.dispatch(Action::Delete).await.deleted, 0);
    assert_eq!(h.repos().tracking.marked_resources().await.unwrap().len(), 1);

    h.clock.advance(Duration::days(1));
    assert_eq!(h.dispatch(Action::Delete).await.deleted, 1);
    assert!(h.repos().tracking.marked_resources().await.unwrap().is_empty());
    assert_eq!(h.lifecycle("vol-orphan").await, Some(Lifecycle::Deleted));

    let remaining = h.inventory.read().await.unwrap();
    let ids: Vec<&str> = remaining.resources["aws:test:us-east-1"]
        .iter()
        .map(|r| r.resource_id.as_str())
        .collect();
    assert_eq!(ids, vec!["vol-busy"]);
}

#[tokio::test]
async fn test_opted_out_resource_is_never_deleted() {
    let h = Harness::new().await;
    h.dispatch(Action::Mark).await;

    let config = h.janitor.configuration(NAMESPACE).unwrap();
    assert!(h.janitor.context().opt_out("vol-orphan", config).await.unwrap());
    assert_eq!(h.lifecycle("vol-orphan").await, Some(Lifecycle::OptedOut));
    assert!(h.repos().tracking.marked_resources().await.unwrap().is_empty());

    // Still orphaned, but later cycles leave it alone
    h.clock.advance(Duration::days(30));
    assert_eq!(h.dispatch(Action::Mark).await.marked, 0);
    h.dispatch(Action::Delete).await;
    assert_eq!(h.lifecycle("vol-orphan").await, Some(Lifecycle::OptedOut));
    assert_eq!(
        h.inventory.read().await.unwrap().resources["aws:test:us-east-1"].len(),
        2
    );

    // Clearing the opt-out makes it eligible again
    assert!(
        h.janitor
            .context()
            .events
            .clear_opt_out("vol-orphan", NAMESPACE)
            .await
            .unwrap()
    );
    assert_eq!(h.dispatch(Action::Mark).await.marked, 1);
}
