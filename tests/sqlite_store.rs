use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use scanbook::config::Config;
use scanbook::snapshot::SnapshotFile;
use scanbook::sqlite_store::SqliteStore;
use scanbook::{db, migrate};
use scanbook_core::store::SectionStore;
use scanbook_core::{InsertOutcome, StoreError};

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 7, 15)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

async fn open_store(config: &Config) -> SqliteStore {
    let pool = db::connect(config).await.unwrap();
    migrate::migrate_pool(&pool, config).await.unwrap();
    SqliteStore::new(pool).with_snapshot_file(SnapshotFile::new(&config.storage.snapshot_path))
}

#[tokio::test]
async fn test_seeds_default_sections_once() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path());

    let store = open_store(&config).await;
    assert_eq!(store.sections().await.unwrap(), vec!["bölüm1", "bölüm2"]);
    store.delete_section("bölüm2").await.unwrap();

    // A second migration must not re-seed a non-empty table.
    migrate::migrate_pool(store.pool(), &config).await.unwrap();
    assert_eq!(store.sections().await.unwrap(), vec!["bölüm1"]);
}

#[tokio::test]
async fn test_seeds_from_existing_snapshot_file() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path());
    std::fs::write(
        &config.storage.snapshot_path,
        r#"{"Manav": ["XYZ789", "xyz789"], "Depo1": ["ABC123"]}"#,
    )
    .unwrap();

    let store = open_store(&config).await;
    let snapshot = store.snapshot().await.unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();
    assert_eq!(json, r#"{"Manav":["XYZ789"],"Depo1":["ABC123"]}"#);
}

#[tokio::test]
async fn test_insert_is_idempotent_ignoring_case() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&Config::minimal(tmp.path())).await;

    assert_eq!(
        store.insert_code("bölüm1", "ABC123", at(21, 0, 0)).await.unwrap(),
        InsertOutcome::Inserted
    );
    assert_eq!(
        store.insert_code("bölüm1", "ABC123", at(21, 0, 1)).await.unwrap(),
        InsertOutcome::AlreadyExists
    );
    assert_eq!(
        store.insert_code("bölüm1", "abc123", at(21, 0, 2)).await.unwrap(),
        InsertOutcome::AlreadyExists
    );

    let records = store.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].timestamp, Some(at(21, 0, 0)));
}

#[tokio::test]
async fn test_section_names_unique_ignoring_unicode_case() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&Config::minimal(tmp.path())).await;

    store.create_section("Produce").await.unwrap();
    assert!(matches!(
        store.create_section("produce").await,
        Err(StoreError::DuplicateSection(_))
    ));
    assert!(matches!(
        store.create_section("BÖLÜM1").await,
        Err(StoreError::DuplicateSection(_))
    ));
    assert!(matches!(
        store.create_section("   ").await,
        Err(StoreError::InvalidSectionName)
    ));
}

#[tokio::test]
async fn test_unknown_section_handling() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&Config::minimal(tmp.path())).await;

    assert!(store
        .insert_code("ghost", "X", at(1, 0, 0))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(store.delete_section("ghost").await.unwrap_err().is_not_found());
    assert!(!store.delete_code("ghost", "X").await.unwrap());
    assert_eq!(store.bulk_delete("ghost", &["X".into()]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_section_keeps_history_but_not_membership() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path());
    let store = open_store(&config).await;

    store.insert_code("bölüm2", "KEEP1", at(1, 0, 0)).await.unwrap();
    store.delete_section("bölüm2").await.unwrap();

    let records = store.records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].section, "bölüm2");
    assert_eq!(records[0].code, "KEEP1");
    let history = store.history().await.unwrap();
    assert_eq!(history.get("bölüm2").unwrap()[0].code, "KEEP1");

    let on_disk = SnapshotFile::new(&config.storage.snapshot_path)
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(on_disk.names().collect::<Vec<_>>(), vec!["bölüm1"]);

    store.create_section("bölüm2").await.unwrap();
    assert!(store.snapshot().await.unwrap().get("bölüm2").unwrap().is_empty());
    assert_eq!(
        store.insert_code("bölüm2", "KEEP1", at(2, 0, 0)).await.unwrap(),
        InsertOutcome::Inserted
    );
    assert_eq!(store.records().await.unwrap().len(), 2);
    assert_eq!(store.bulk_delete("bölüm2", &["KEEP1".into()]).await.unwrap(), 1);
    assert_eq!(store.records().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_snapshot_and_history_ordering() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path());
    let store = open_store(&config).await;
    store.create_section("Depo1").await.unwrap();

    store.insert_code("Depo1", "first", at(9, 0, 0)).await.unwrap();
    store.insert_code("bölüm1", "middle", at(10, 0, 0)).await.unwrap();
    store.insert_code("Depo1", "last", at(11, 0, 0)).await.unwrap();
    store.insert_code("Depo1", "gone", at(12, 0, 0)).await.unwrap();

    let removed = store
        .bulk_delete("Depo1", &["gone".into(), "never".into()])
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let snapshot = serde_json::to_value(store.snapshot().await.unwrap()).unwrap();
    assert_eq!(
        snapshot,
        serde_json::json!({"bölüm1": ["middle"], "bölüm2": [], "Depo1": ["first", "last"]})
    );

    let history = store.history().await.unwrap();
    let names: Vec<&str> = history.names().collect();
    assert_eq!(names, vec!["Depo1", "bölüm1"]);
    let depo: Vec<&str> = history
        .get("Depo1")
        .unwrap()
        .iter()
        .map(|e| e.code.as_str())
        .collect();
    assert_eq!(depo, vec!["last", "first"]);

    let on_disk = SnapshotFile::new(&config.storage.snapshot_path)
        .load()
        .unwrap()
        .unwrap();
    assert_eq!(on_disk, store.snapshot().await.unwrap());
}

#[tokio::test]
async fn test_unparseable_timestamp_reads_as_none() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&Config::minimal(tmp.path())).await;

    sqlx::query("INSERT INTO barcodes (section, code, timestamp) VALUES ('bölüm1', 'X', 'garbage')")
        .execute(store.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO barcodes (section, code) VALUES ('bölüm1', 'Y')")
        .execute(store.pool())
        .await
        .unwrap();

    let records = store.records().await.unwrap();
    let x = records.iter().find(|r| r.code == "X").unwrap();
    let y = records.iter().find(|r| r.code == "Y").unwrap();
    assert_eq!(x.timestamp, None);
    assert!(y.timestamp.is_some(), "CURRENT_TIMESTAMP layout must parse");
}
