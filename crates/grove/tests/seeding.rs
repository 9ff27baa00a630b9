mod common;

use common::{recording, seed_entries, seeds, RecordingSeed};
use grove::prelude::*;
use grove::SeedRun;
use grove_testing::prelude::*;
use std::sync::Arc;

fn seeder_for(migrations: &[&str], seed_units: Vec<RecordingSeed>, log: &CallLog) -> (Arc<Migrator>, Seeder) {
    let migrator = Arc::new(Migrator::new(provider(scripted(migrations, log))));
    let seeder = Seeder::new(migrator.clone(), seeds(seed_units));
    (migrator, seeder)
}

#[tokio::test]
async fn test_phase_order_for_single_unit() {
    init_test_tracing();
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let (migrator, seeder) = seeder_for(&["1_a"], recording(&["1_a"], &log), &log);
    migrator.up(db.conn(), Step::All).await.unwrap();

    let mut ctx = SeedContext::new(db.conn());
    seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap();
    assert_eq!(seed_entries(&log), vec!["habitat.up:1_a", "seed.up:1_a"]);

    log.clear();
    seeder.seed_down(&mut ctx, PhaseSet::All).await.unwrap();
    assert_eq!(seed_entries(&log), vec!["seed.down:1_a", "habitat.down:1_a"]);
}

#[tokio::test]
async fn test_units_follow_numeric_prefix_order() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let (migrator, seeder) = seeder_for(&["9_x", "10_y"], recording(&["10_y", "9_x"], &log), &log);

    // Migrations run in string order
    migrator.up(db.conn(), Step::All).await.unwrap();
    assert_eq!(log.entries(), vec!["up:10_y", "up:9_x"]);
    log.clear();

    let mut ctx = SeedContext::new(db.conn());
    let run = seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap();
    assert_eq!(run.units, vec!["9_x", "10_y"]);

    let down = seeder.seed_down(&mut ctx, PhaseSet::All).await.unwrap();
    assert_eq!(down.units, vec!["10_y", "9_x"]);
    assert_eq!(
        seed_entries(&log)[4..].to_vec(),
        vec!["seed.down:10_y", "habitat.down:10_y", "seed.down:9_x", "habitat.down:9_x"]
    );
}

#[tokio::test]
async fn test_only_applied_migrations_are_seeded() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let (migrator, seeder) = seeder_for(&["1_a", "2_b", "3_c"], recording(&["1_a", "2_b", "3_c"], &log), &log);
    migrator.up(db.conn(), Step::Count(2)).await.unwrap();

    let mut ctx = SeedContext::new(db.conn());
    let run = seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap();
    assert_eq!(run.units, vec!["1_a", "2_b"]);
}

#[tokio::test]
async fn test_migrations_without_seed_units_are_skipped() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let (migrator, seeder) = seeder_for(&["1_a", "2_b"], recording(&["2_b"], &log), &log);
    migrator.up(db.conn(), Step::All).await.unwrap();

    let mut ctx = SeedContext::new(db.conn());
    let run = seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap();
    assert_eq!(
        run,
        SeedRun {
            units: vec!["2_b".to_string()],
            phases: vec![
                ("2_b".to_string(), SeedPhase::HabitatUp),
                ("2_b".to_string(), SeedPhase::SeedUp),
            ],
        }
    );
}

#[tokio::test]
async fn test_replant_skips_habitat() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let (migrator, seeder) = seeder_for(&["1_a", "2_b"], recording(&["1_a", "2_b"], &log), &log);
    migrator.up(db.conn(), Step::All).await.unwrap();

    let mut ctx = SeedContext::new(db.conn());
    seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap();
    log.clear();

    let replant = seeder.replant(&mut ctx).await.unwrap();
    assert_eq!(replant.removed.units, vec!["2_b", "1_a"]);
    assert_eq!(replant.planted.units, vec!["1_a", "2_b"]);
    assert_eq!(
        seed_entries(&log),
        vec!["seed.down:2_b", "seed.down:1_a", "seed.up:1_a", "seed.up:2_b"]
    );
}

#[tokio::test]
async fn test_phase_failure_aborts_remaining_units() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let units = vec![
        RecordingSeed::new("1_a", &log).failing_at(SeedPhase::SeedUp),
        RecordingSeed::new("2_b", &log),
    ];
    let (migrator, seeder) = seeder_for(&["1_a", "2_b"], units, &log);
    migrator.up(db.conn(), Step::All).await.unwrap();

    let mut ctx = SeedContext::new(db.conn());
    let err = seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap_err();

    assert!(matches!(
        &err,
        GroveError::Seed { unit, phase: SeedPhase::SeedUp, .. } if unit == "1_a"
    ));
    assert_eq!(err.unit(), Some("1_a"));
    assert_eq!(seed_entries(&log), vec!["habitat.up:1_a", "seed.up:1_a"]);
}

#[tokio::test]
async fn test_seed_without_migration_is_configuration_error() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let (_, seeder) = seeder_for(&["1_a"], recording(&["1_a", "7_orphan"], &log), &log);

    let mut ctx = SeedContext::new(db.conn());
    let err = seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap_err();
    assert!(matches!(err, GroveError::Configuration(ref m) if m.contains("7_orphan")));
    assert!(log.is_empty());
}

#[tokio::test]
async fn test_duplicate_seed_names_rejected() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let (migrator, seeder) = seeder_for(&["1_a"], recording(&["1_a", "1_a"], &log), &log);
    migrator.up(db.conn(), Step::All).await.unwrap();

    let mut ctx = SeedContext::new(db.conn());
    let err = seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap_err();
    assert!(matches!(err, GroveError::Configuration(ref m) if m.contains("duplicate")));
}

#[tokio::test]
async fn test_seed_writes_reach_external_stores() {
    let mut db = TestDatabase::new().await.unwrap();
    let log = CallLog::new();
    let (migrator, seeder) = seeder_for(&["1_a"], recording(&["1_a"], &log), &log);
    migrator.up(db.conn(), Step::All).await.unwrap();

    let blobs = grove::storage::MemoryBackend::new("assets");
    let kv = grove::kv::MemoryBackend::new("fixtures");
    let mut ctx = SeedContext::new(db.conn()).with_blobs(&blobs).with_kv(&kv);

    seeder.seed_up(&mut ctx, PhaseSet::All).await.unwrap();
    assert_eq!(blobs.keys(), vec!["habitat/1_a", "seed/1_a"]);
    assert_eq!(kv.len(), 1);

    seeder.replant(&mut ctx).await.unwrap();
    assert_eq!(blobs.keys(), vec!["habitat/1_a", "seed/1_a"]);

    seeder.seed_down(&mut ctx, PhaseSet::All).await.unwrap();
    assert!(blobs.is_empty());
    assert!(kv.is_empty());
}
