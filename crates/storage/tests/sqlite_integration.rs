use lab_core::model::{ChapterId, ProgressRecord, ProgressStatus, ProgressStore, SectionId, SyncMeta};
use lab_core::time::fixed_now;
use storage::repository::{ProgressRepository, StorageError};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn sample_store() -> ProgressStore {
    let mut first = ProgressRecord {
        status: ProgressStatus::InProgress,
        progress: 17,
        last_updated: Some(fixed_now()),
        time_spent: 240,
        ..ProgressRecord::default()
    };
    first.completed_sections.insert(SectionId::new("1-0"));
    first.completed_sections.insert(SectionId::new("1-1"));

    let second = ProgressRecord {
        status: ProgressStatus::Completed,
        progress: 100,
        score: Some(9),
        ..ProgressRecord::default()
    };

    [
        (ChapterId::new("chapter-1"), first),
        (ChapterId::new("chapter-2"), second),
    ]
    .into_iter()
    .collect()
}

#[tokio::test]
async fn sqlite_roundtrips_progress_and_meta() {
    let repo = connect("memdb_progress_roundtrip").await;
    assert!(repo.load_progress().await.unwrap().is_none());

    let store = sample_store();
    repo.save_progress(&store).await.unwrap();
    let meta = SyncMeta::default().touched(fixed_now());
    repo.save_sync_meta(&meta).await.unwrap();

    assert_eq!(repo.load_progress().await.unwrap(), Some(store));
    assert_eq!(repo.load_sync_meta().await.unwrap(), Some(meta));
}

#[tokio::test]
async fn sqlite_overwrites_whole_document() {
    let repo = connect("memdb_progress_overwrite").await;
    repo.save_progress(&sample_store()).await.unwrap();

    let mut smaller = sample_store();
    smaller.remove(&ChapterId::new("chapter-2"));
    repo.save_progress(&smaller).await.unwrap();

    let loaded = repo.load_progress().await.unwrap().unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(!loaded.contains(&ChapterId::new("chapter-2")));
}

#[tokio::test]
async fn sqlite_clear_and_rerun_migrations() {
    let repo = connect("memdb_progress_clear").await;
    repo.save_progress(&sample_store()).await.unwrap();
    repo.save_sync_meta(&SyncMeta::default()).await.unwrap();

    repo.migrate().await.expect("migrations are idempotent");
    repo.clear().await.unwrap();

    assert!(repo.load_progress().await.unwrap().is_none());
    assert!(repo.load_sync_meta().await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_reports_corrupt_documents() {
    let repo = connect("memdb_progress_corrupt").await;
    sqlx::query("INSERT INTO progress_documents (key, body, updated_at) VALUES (?1, ?2, ?3)")
        .bind(storage::repository::PROGRESS_KEY)
        .bind("[truncated")
        .bind(fixed_now())
        .execute(repo.pool())
        .await
        .unwrap();

    let err = repo.load_progress().await.unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}
