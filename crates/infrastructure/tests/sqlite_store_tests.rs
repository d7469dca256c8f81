use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use crawler_core::config::models::DatabaseConfig;
use crawler_core::models::{
    EnqueueBatch, LogFilter, LogQuery, ProcessRecord, QueueEntry, QueueFilter,
};
use crawler_core::traits::{ProcessRepository, QueueRepository};
use crawler_infrastructure::{DatabaseManager, SqliteProcessRepository, SqliteQueueRepository};
use serde_json::json;

async fn file_database(dir: &tempfile::TempDir) -> Result<DatabaseManager> {
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("queue.db").display()),
        max_connections: 4,
        ..DatabaseConfig::default()
    };
    let database = DatabaseManager::new(&config).await?;
    database.migrate().await?;
    Ok(database)
}

fn batch(page_id: i64, urls: usize) -> EnqueueBatch {
    let scheduled = Utc::now() - Duration::seconds(5);
    EnqueueBatch {
        page_id,
        configuration_hash: format!("cfg-{page_id}"),
        entries: (0..urls)
            .map(|i| {
                QueueEntry::new(
                    page_id,
                    json!({ "url": format!("http://localhost/index.php?id={page_id}&L={i}") }),
                    format!("p-{page_id}-{i}"),
                    format!("cfg-{page_id}"),
                    "default",
                    7,
                    scheduled,
                )
            })
            .collect(),
        timeslot_seconds: None,
    }
}

#[tokio::test]
async fn test_concurrent_claims_are_disjoint() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let database = file_database(&dir).await?;
    let queue: Arc<dyn QueueRepository> =
        Arc::new(SqliteQueueRepository::new(database.pool().clone()));

    for page_id in 1..=4 {
        let ids = queue.enqueue_if_absent(&batch(page_id, 5)).await?;
        assert_eq!(ids.len(), 5);
    }

    let mut handles = Vec::new();
    for worker in 0..3 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            queue
                .claim_pending(&format!("worker-{worker}"), 8, Utc::now())
                .await
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        let claimed = handle.await??;
        for entry in claimed {
            assert!(seen.insert(entry.id), "entry {} claimed twice", entry.id);
            total += 1;
        }
    }
    // 输掉竞争的条目被跳过，不会重复认领
    let unclaimed = queue.count(&QueueFilter::all().unclaimed()).await?;
    assert_eq!(total + unclaimed, 20);
    assert!(total >= 8);

    database.close().await;
    Ok(())
}

#[tokio::test]
async fn test_duplicate_batch_is_rejected_until_executed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let database = file_database(&dir).await?;
    let queue = SqliteQueueRepository::new(database.pool().clone());

    let ids = queue.enqueue_if_absent(&batch(9, 2)).await?;
    assert_eq!(ids.len(), 2);
    assert!(queue.enqueue_if_absent(&batch(9, 2)).await?.is_empty());
    assert!(queue.exists_unprocessed(9, "cfg-9").await?);

    for entry in queue.claim_pending("worker-a", 10, Utc::now()).await? {
        queue
            .mark_executed(entry.id, &json!({"success": true}), "worker-a", Utc::now())
            .await?;
    }
    assert!(queue.is_unqueued(9, "cfg-9").await?);
    assert_eq!(queue.enqueue_if_absent(&batch(9, 2)).await?.len(), 2);

    let finished = queue
        .query_log(&LogQuery::for_page(9).with_filter(LogFilter::Finished))
        .await?;
    assert_eq!(finished.len(), 2);
    assert!(finished
        .iter()
        .all(|entry| entry.process_id_completed == "worker-a"));

    database.close().await;
    Ok(())
}

#[tokio::test]
async fn test_process_slots_survive_reconnect() -> Result<()> {
    let dir = tempfile::tempdir()?;
    {
        let database = file_database(&dir).await?;
        let processes = SqliteProcessRepository::new(database.pool().clone());
        assert!(
            processes
                .create_if_below_limit(&ProcessRecord::new("a1b2c3d4e5", 300), 1)
                .await?
        );
        database.close().await;
    }

    let database = file_database(&dir).await?;
    let processes = SqliteProcessRepository::new(database.pool().clone());
    assert!(
        !processes
            .create_if_below_limit(&ProcessRecord::new("f6a7b8c9d0", 300), 1)
            .await?
    );
    assert_eq!(processes.count_active().await?, 1);

    processes.deactivate("a1b2c3d4e5").await?;
    assert!(
        processes
            .create_if_below_limit(&ProcessRecord::new("f6a7b8c9d0", 300), 1)
            .await?
    );

    database.close().await;
    Ok(())
}

#[tokio::test]
async fn test_enqueue_across_pools_waits_instead_of_failing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let first = file_database(&dir).await?;
    let second = file_database(&dir).await?;
    let queue_a = SqliteQueueRepository::new(first.pool().clone());
    let queue_b = SqliteQueueRepository::new(second.pool().clone());

    let mut inserted_batches = 0;
    for page_id in 1..=100 {
        let (batch_a, batch_b) = (batch(page_id, 2), batch(page_id, 2));
        let (a, b) = tokio::join!(
            queue_a.enqueue_if_absent(&batch_a),
            queue_b.enqueue_if_absent(&batch_b),
        );
        let (a, b) = (a?, b?);
        // 同一页面只有一批条目入队
        assert_eq!(a.len() + b.len(), 2);
        inserted_batches += usize::from(!a.is_empty()) + usize::from(!b.is_empty());

        let (batch_c, batch_d) = (batch(page_id + 1000, 1), batch(page_id + 2000, 1));
        let (c, d) = tokio::join!(
            queue_a.enqueue_if_absent(&batch_c),
            queue_b.enqueue_if_absent(&batch_d),
        );
        assert_eq!(c?.len(), 1);
        assert_eq!(d?.len(), 1);
    }
    assert_eq!(inserted_batches, 100);
    assert_eq!(queue_a.count(&QueueFilter::all()).await?, 400);

    first.close().await;
    second.close().await;
    Ok(())
}

#[tokio::test]
async fn test_process_slots_across_pools() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let first = file_database(&dir).await?;
    let second = file_database(&dir).await?;
    let processes_a = SqliteProcessRepository::new(first.pool().clone());
    let processes_b = SqliteProcessRepository::new(second.pool().clone());

    for round in 0..20 {
        let a = ProcessRecord::new(format!("a-{round}"), 300);
        let b = ProcessRecord::new(format!("b-{round}"), 300);
        let (created_a, created_b) = tokio::join!(
            processes_a.create_if_below_limit(&a, 1),
            processes_b.create_if_below_limit(&b, 1),
        );
        assert!(created_a? ^ created_b?);
        assert_eq!(processes_a.count_active().await?, 1);

        for record in processes_a.list_active().await? {
            processes_a.deactivate(&record.process_id).await?;
        }
    }

    first.close().await;
    second.close().await;
    Ok(())
}
