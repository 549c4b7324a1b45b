use stele::{
    DatabaseEngine, Error, MigrationSource, MigrationType, RecordRepair, ENGINE_IDENTITY,
};

fn select_one() -> MigrationSource {
    MigrationSource::new("1", MigrationType::Do, "first migration")
        .hash("h1")
        .body("SELECT 1;")
}

pub async fn test_open_creates_base_record<E: DatabaseEngine>(
    engine: &mut E,
) -> anyhow::Result<()> {
    engine.open().await?;

    let records = engine.records(0).await?;

    assert_eq!(records.len(), 1);

    let base = &records[0];

    assert_eq!(base.id, 1);
    assert_eq!(base.version, "0");
    assert_eq!(base.kind, MigrationType::Do);
    assert_eq!(base.title, "Base Migration");
    assert_eq!(base.hash, "");
    assert_eq!(base.applied_by, ENGINE_IDENTITY);
    assert!(!base.dirty);

    engine.close().await?;

    Ok(())
}

pub async fn test_open_twice_keeps_one_base_record<E: DatabaseEngine>(
    engine: &mut E,
) -> anyhow::Result<()> {
    engine.open().await?;
    engine.open().await?;

    let records = engine.records(0).await?;

    assert_eq!(records.len(), 1);

    engine.close().await?;

    Ok(())
}

pub async fn test_lock_roundtrip<E: DatabaseEngine>(engine: &mut E) -> anyhow::Result<()> {
    engine.open().await?;

    engine.lock().await?;
    engine.unlock().await?;

    engine.lock().await?;
    engine.unlock().await?;

    engine.close().await?;

    Ok(())
}

pub async fn test_lock_serializes<E: DatabaseEngine>(
    a: &mut E,
    b: &mut E,
) -> anyhow::Result<()> {
    a.open().await?;
    b.open().await?;

    let order = std::sync::Mutex::new(Vec::new());

    a.lock().await?;
    order.lock().unwrap().push("lock-a");

    let (b_locked, a_unlocked) = tokio::join!(
        async {
            b.lock().await?;
            order.lock().unwrap().push("lock-b");

            Ok::<_, Error>(())
        },
        async {
            a.unlock().await?;
            order.lock().unwrap().push("unlock-a");

            Ok::<_, Error>(())
        }
    );

    b_locked?;
    a_unlocked?;

    b.unlock().await?;
    order.lock().unwrap().push("unlock-b");

    assert_eq!(
        order.into_inner().unwrap(),
        vec!["lock-a", "unlock-a", "lock-b", "unlock-b"]
    );

    a.close().await?;
    b.close().await?;

    Ok(())
}

pub async fn test_unlock_without_lock<E: DatabaseEngine>(engine: &mut E) -> anyhow::Result<()> {
    engine.open().await?;

    let err = engine.unlock().await.unwrap_err();

    assert!(matches!(err, Error::LockNotReleased(_)));

    // The session survives the failed release.
    assert_eq!(engine.records(0).await?.len(), 1);

    engine.close().await?;

    Ok(())
}

pub async fn test_run_inserts_clean_record<E: DatabaseEngine>(
    engine: &mut E,
) -> anyhow::Result<()> {
    engine.open().await?;

    engine.run(&select_one()).await?;

    let records = engine.records(0).await?;

    assert_eq!(records.len(), 2);

    let record = records.last().unwrap();

    assert_eq!(record.version, "1");
    assert_eq!(record.kind, MigrationType::Do);
    assert_eq!(record.title, "first migration");
    assert_eq!(record.hash, "h1");
    assert!(!record.dirty);
    assert!(record.execution_time > 0.0);
    assert!(!record.applied_by.is_empty());

    engine.close().await?;

    Ok(())
}

pub async fn test_run_failure_inserts_dirty_record<E: DatabaseEngine>(
    engine: &mut E,
    failing: MigrationSource,
) -> anyhow::Result<()> {
    engine.open().await?;

    let before = engine.records(0).await?.len();

    let err = engine.run(&failing).await.unwrap_err();

    match err {
        Error::Execution { version, .. } => assert_eq!(version, failing.version),
        other => panic!("expected execution error, got {other}"),
    }

    let records = engine.records(0).await?;

    assert_eq!(records.len(), before + 1);

    let record = records.last().unwrap();

    assert!(record.dirty);
    assert_eq!(record.version, failing.version);
    assert_eq!(record.kind, failing.kind);
    assert_eq!(record.title, failing.title);
    assert_eq!(record.hash, failing.hash);

    engine.close().await?;

    Ok(())
}

pub async fn test_repair_rewrites_hash_and_drops_dirty<E: DatabaseEngine>(
    engine: &mut E,
    failing: MigrationSource,
) -> anyhow::Result<()> {
    engine.open().await?;

    engine.run(&select_one()).await?;
    engine.run(&failing).await.unwrap_err();

    let records = engine.records(0).await?;

    let clean_id = records
        .iter()
        .find(|record| record.version == "1" && !record.dirty)
        .unwrap()
        .id;
    let dirty_id = records.iter().find(|record| record.dirty).unwrap().id;

    engine
        .repair(&[
            RecordRepair::new(clean_id, "h1-repaired"),
            RecordRepair::new(dirty_id, "ghost"),
        ])
        .await?;

    let records = engine.records(0).await?;

    assert!(records.iter().all(|record| !record.dirty));
    assert!(records.iter().all(|record| record.id != dirty_id));
    assert_eq!(
        records
            .iter()
            .find(|record| record.id == clean_id)
            .unwrap()
            .hash,
        "h1-repaired"
    );

    engine.close().await?;

    Ok(())
}

pub async fn test_records_start_id<E: DatabaseEngine>(engine: &mut E) -> anyhow::Result<()> {
    engine.open().await?;

    engine.run(&select_one()).await?;
    engine
        .run(
            &MigrationSource::new("2", MigrationType::Do, "second migration")
                .hash("h2")
                .body("SELECT 2;"),
        )
        .await?;

    let all = engine.records(0).await?;

    assert_eq!(all.len(), 3);

    let ids: Vec<i64> = all.iter().map(|record| record.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();

    assert_eq!(ids, sorted);

    let from_second = engine.records(all[1].id).await?;

    assert_eq!(from_second.len(), 2);
    assert!(from_second.iter().all(|record| record.id >= all[1].id));

    assert!(engine.records(i64::MAX).await?.is_empty());

    engine.close().await?;

    Ok(())
}

pub async fn test_drop_and_reopen<E: DatabaseEngine>(engine: &mut E) -> anyhow::Result<()> {
    engine.open().await?;

    engine.run(&select_one()).await?;

    assert_eq!(engine.records(0).await?.len(), 2);

    engine.drop().await?;
    engine.close().await?;

    engine.open().await?;

    let records = engine.records(0).await?;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "Base Migration");

    engine.close().await?;

    Ok(())
}

pub async fn test_closed_engine_rejects<E: DatabaseEngine>(engine: &mut E) -> anyhow::Result<()> {
    assert!(matches!(engine.lock().await, Err(Error::Closed)));
    assert!(matches!(engine.unlock().await, Err(Error::Closed)));
    assert!(matches!(engine.drop().await, Err(Error::Closed)));
    assert!(matches!(engine.run(&select_one()).await, Err(Error::Closed)));
    assert!(matches!(engine.repair(&[]).await, Err(Error::Closed)));
    assert!(matches!(engine.records(0).await, Err(Error::Closed)));

    engine.open().await?;
    engine.close().await?;

    assert!(matches!(engine.records(0).await, Err(Error::Closed)));

    Ok(())
}
