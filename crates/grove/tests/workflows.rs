mod common;

use bytes::Bytes;
use common::{recording, seed_entries, seeds};
use grove::kv::{Item, ItemKey};
use grove::prelude::*;
use grove_testing::prelude::*;
use std::sync::Arc;

struct Stores {
    blobs: Arc<grove::storage::MemoryBackend>,
    kv: Arc<grove::kv::MemoryBackend>,
}

impl Stores {
    fn new() -> Self {
        Self {
            blobs: Arc::new(grove::storage::MemoryBackend::new("assets")),
            kv: Arc::new(grove::kv::MemoryBackend::new("fixtures")),
        }
    }
}

fn orchestrator(
    config: GroveConfig,
    migrations: Vec<ScriptedMigration>,
    seed_names: &[&str],
    log: &CallLog,
    stores: &Stores,
) -> Orchestrator {
    Orchestrator::new(config, provider(migrations), seeds(recording(seed_names, log)))
        .unwrap()
        .with_blob_store(stores.blobs.clone())
        .with_kv_store(stores.kv.clone())
}

#[tokio::test]
async fn test_setup_migrates_then_seeds() {
    init_test_tracing();
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let grove = orchestrator(
        GroveConfig::default(),
        scripted(&["1_a", "2_b"], &log),
        &["1_a", "2_b"],
        &log,
        &stores,
    );

    let report = grove.setup(db.conn()).await.unwrap();

    assert_eq!(report.workflow, Workflow::Setup);
    assert_eq!(report.migration_names(), vec!["1_a", "2_b"]);
    assert_eq!(report.seeded, vec!["1_a", "2_b"]);
    assert_eq!(
        log.entries(),
        vec![
            "up:1_a",
            "up:2_b",
            "habitat.up:1_a",
            "seed.up:1_a",
            "habitat.up:2_b",
            "seed.up:2_b",
        ]
    );
    assert_eq!(stores.kv.len(), 2);
}

#[tokio::test]
async fn test_migrate_is_idempotent() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let grove = orchestrator(
        GroveConfig::default(),
        scripted(&["1_a", "2_b"], &log),
        &[],
        &log,
        &stores,
    );

    let first = grove.migrate(db.conn()).await.unwrap();
    let second = grove.migrate(db.conn()).await.unwrap();

    assert_eq!(first.migrations.len(), 2);
    assert!(second.migrations.is_empty());
    assert_eq!(
        db.ledger_names(&LedgerTable::default()).await.unwrap(),
        vec!["1_a".to_string(), "2_b".to_string()]
    );
}

#[tokio::test]
async fn test_seed_covers_migrations_applied_so_far() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let grove = orchestrator(
        GroveConfig::default(),
        scripted(&["1_a", "2_b"], &log),
        &["1_a", "2_b"],
        &log,
        &stores,
    );

    grove.migrator().up(db.conn(), Step::Count(1)).await.unwrap();
    let report = grove.seed(db.conn()).await.unwrap();

    assert!(report.migrations.is_empty());
    assert_eq!(report.seeded, vec!["1_a"]);
}

#[tokio::test]
async fn test_reset_reverts_migrations_and_clears_stores() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let grove = orchestrator(
        GroveConfig::default(),
        scripted(&["1_a", "2_b"], &log),
        &["1_a", "2_b"],
        &log,
        &stores,
    );
    grove.setup(db.conn()).await.unwrap();
    for i in 0..2500 {
        stores
            .blobs
            .put(&format!("uploads/{:05}", i), Bytes::from_static(b"x"))
            .await
            .unwrap();
    }
    log.clear();

    let report = grove.reset(db.conn()).await.unwrap();

    assert_eq!(report.migration_names(), vec!["2_b", "1_a"]);
    assert_eq!(report.blobs_cleared, 2504);
    assert_eq!(report.items_cleared, 2);
    assert_eq!(stores.blobs.delete_calls(), 3);
    assert!(stores.blobs.is_empty());
    assert!(stores.kv.is_empty());
    assert_eq!(log.entries(), vec!["down:2_b", "down:1_a"]);
    assert!(db.ledger_names(&LedgerTable::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reset_with_prefix_leaves_siblings() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let config = GroveConfig::default().with_blob_reset_prefix("users/1/");
    let grove = orchestrator(config, scripted(&["1_a"], &log), &[], &log, &stores);
    for key in ["users/1/a", "users/1/b", "users/10/a"] {
        stores.blobs.put(key, Bytes::from_static(b"x")).await.unwrap();
    }

    let report = grove.reset(db.conn()).await.unwrap();

    assert_eq!(report.blobs_cleared, 2);
    assert_eq!(stores.blobs.keys(), vec!["users/10/a"]);
}

#[tokio::test]
async fn test_reset_on_empty_everything_is_noop() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let grove = orchestrator(GroveConfig::default(), Vec::new(), &[], &log, &stores);

    let report = grove.reset(db.conn()).await.unwrap();
    assert!(report.migrations.is_empty());
    assert_eq!(report.blobs_cleared, 0);
    assert_eq!(report.items_cleared, 0);
}

#[tokio::test]
async fn test_migration_failure_aborts_workflow_with_unit_and_direction() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let migrations = vec![
        ScriptedMigration::new("1_a", &log),
        ScriptedMigration::new("2_b", &log).failing_up(),
        ScriptedMigration::new("3_c", &log),
    ];
    let grove = orchestrator(GroveConfig::default(), migrations, &["1_a"], &log, &stores);

    let err = grove.setup(db.conn()).await.unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("setup aborted"), "{}", message);
    assert!(message.contains("'2_b'") && message.contains("during up"), "{}", message);
    assert_eq!(err.unit(), Some("2_b"));
    match err {
        GroveError::MigrationStep { workflow, results } => {
            assert_eq!(workflow, Workflow::Setup);
            assert!(results.rolled_back);
            assert_eq!(results.succeeded(), vec!["1_a"]);
            assert_eq!(results.not_executed(), vec!["3_c"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Rolled back atomically, and seeding never started
    assert!(db.ledger_names(&LedgerTable::default()).await.unwrap().is_empty());
    assert!(seed_entries(&log).is_empty());
}

#[tokio::test]
async fn test_reset_stops_before_cleanup_when_down_fails() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let migrations = vec![
        ScriptedMigration::new("1_a", &log).failing_down(),
        ScriptedMigration::new("2_b", &log),
    ];
    let grove = orchestrator(GroveConfig::default(), migrations, &[], &log, &stores);
    grove.migrate(db.conn()).await.unwrap();
    stores.blobs.put("keep/me", Bytes::from_static(b"x")).await.unwrap();
    stores
        .kv
        .put_item(Item::new(ItemKey::composite("keep", "me")))
        .await
        .unwrap();

    let err = grove.reset(db.conn()).await.unwrap_err();

    assert!(matches!(err, GroveError::MigrationStep { workflow: Workflow::Reset, .. }));
    assert_eq!(stores.blobs.len(), 1);
    assert_eq!(stores.kv.len(), 1);
}

#[tokio::test]
async fn test_production_guard() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let config = GroveConfig::default().with_environment(Environment::Production);
    let grove = orchestrator(config, scripted(&["1_a"], &log), &["1_a"], &log, &stores);

    for result in [
        grove.seed(db.conn()).await,
        grove.setup(db.conn()).await,
        grove.reset(db.conn()).await,
    ] {
        assert!(matches!(
            result,
            Err(GroveError::EnvironmentGuard {
                environment: Environment::Production,
                ..
            })
        ));
    }
    assert!(log.is_empty());

    // Plain migrations are allowed
    let report = grove.migrate(db.conn()).await.unwrap();
    assert_eq!(report.migration_names(), vec!["1_a"]);
}

#[tokio::test]
async fn test_production_override_allows_setup() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let config = GroveConfig::default()
        .with_environment(Environment::Production)
        .allow_destructive_in_production(true);
    let grove = orchestrator(config, scripted(&["1_a"], &log), &["1_a"], &log, &stores);

    let report = grove.setup(db.conn()).await.unwrap();
    assert_eq!(report.seeded, vec!["1_a"]);
}

#[tokio::test]
async fn test_invalid_config_rejected_at_construction() {
    let log = CallLog::new();
    let config = GroveConfig::default().with_kv_delete_batch_size(100);
    let result = Orchestrator::new(config, provider(scripted(&["1_a"], &log)), seeds(Vec::new()));
    assert!(matches!(result, Err(GroveError::Config(_))));
}

#[tokio::test]
async fn test_custom_ledger_table_from_config() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let stores = Stores::new();
    let config = GroveConfig::default().with_ledger_table("schema_history");
    let grove = orchestrator(config, scripted(&["1_a"], &log), &[], &log, &stores);

    grove.migrate(db.conn()).await.unwrap();
    assert_eq!(
        db.ledger_names(&LedgerTable::new("schema_history")).await.unwrap(),
        vec!["1_a".to_string()]
    );
    assert!(!db.table_exists("migrations").await.unwrap());
}

#[tokio::test]
async fn test_report_display() {
    let mut report = WorkflowReport::new(Workflow::Reset);
    report.blobs_cleared = 3;
    assert_eq!(
        report.to_string(),
        "reset: 0 migrations, 0 seeded, 3 blobs cleared, 0 items cleared"
    );
}
