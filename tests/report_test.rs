use chrono::Utc;
use fungihub::db::{self, NewBatch};
use fungihub::model::{BatchStatus, BatchType};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

async fn grain(pool: &sqlx::SqlitePool, strain: i64) -> fungihub::model::Batch {
    db::create_batch(
        pool,
        NewBatch {
            batch_type: Some(BatchType::Grain),
            strain_id: Some(strain),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

async fn backdate(pool: &sqlx::SqlitePool, id: i64, days: i64) {
    sqlx::query("UPDATE batches SET created_at = datetime('now', ?) WHERE id = ?")
        .bind(format!("-{days} days"))
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn empty_database_reports_zeroes() {
    let pool = setup_pool().await;
    let stats = db::dashboard_stats(&pool, Utc::now()).await.unwrap();
    assert_eq!(stats.ready, 0);
    assert_eq!(stats.incubating_spawn, 0);
    assert_eq!(stats.incubating_kits, 0);
    assert_eq!(stats.contamination_rate_pct, 0.0);
    assert_eq!(stats.ready_soon, 0);
    assert_eq!(stats.sold_last_30_days, 0);
    assert_eq!(stats.inoculated_this_month, 0);
    assert!(stats.expiring.is_empty());
}

#[tokio::test]
async fn status_counters_split_spawn_and_kits() {
    let pool = setup_pool().await;
    let strain = db::create_strain(&pool, "Oyster", 12).await.unwrap().id;
    let parent = grain(&pool, strain).await;
    let _other = grain(&pool, strain).await;

    db::create_batch(
        &pool,
        NewBatch {
            batch_type: Some(BatchType::Substrate),
            parent_readable_id: Some(parent.readable_id.clone()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    db::create_batch(
        &pool,
        NewBatch {
            batch_type: Some(BatchType::Bulk),
            parent_readable_id: Some(parent.readable_id.clone()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    db::update_batch_status(&pool, parent.id, BatchStatus::Ready)
        .await
        .unwrap();

    let stats = db::dashboard_stats(&pool, Utc::now()).await.unwrap();
    assert_eq!(stats.ready, 1);
    assert_eq!(stats.incubating_spawn, 1);
    assert_eq!(stats.incubating_kits, 2);
    assert_eq!(stats.inoculated_this_month, 1);
}

#[tokio::test]
async fn contamination_rate_covers_recent_creations_only() {
    let pool = setup_pool().await;
    let strain = db::create_strain(&pool, "Oyster", 12).await.unwrap().id;

    let bad = grain(&pool, strain).await;
    let _good = grain(&pool, strain).await;
    db::update_batch_status(&pool, bad.id, BatchStatus::Contaminated)
        .await
        .unwrap();

    // an old contaminated batch outside the 30-day window must not count
    let old = grain(&pool, strain).await;
    db::update_batch_status(&pool, old.id, BatchStatus::Contaminated)
        .await
        .unwrap();
    backdate(&pool, old.id, 40).await;

    let stats = db::dashboard_stats(&pool, Utc::now()).await.unwrap();
    assert!((stats.contamination_rate_pct - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn forecast_counts_overdue_and_imminent_grain() {
    let pool = setup_pool().await;
    let short = db::create_strain(&pool, "Fast", 10).await.unwrap().id;
    let long = db::create_strain(&pool, "Slow", 30).await.unwrap().id;

    // ready in 4 days: counted
    let imminent = grain(&pool, short).await;
    backdate(&pool, imminent.id, 6).await;
    // already past its forecast date: counted
    let overdue = grain(&pool, short).await;
    backdate(&pool, overdue.id, 20).await;
    // ready in 24 days: not counted
    let far = grain(&pool, long).await;
    backdate(&pool, far.id, 6).await;

    let stats = db::dashboard_stats(&pool, Utc::now()).await.unwrap();
    assert_eq!(stats.ready_soon, 2);
}

#[tokio::test]
async fn expiring_lists_long_incubating_batches() {
    let pool = setup_pool().await;
    let strain = db::create_strain(&pool, "Oyster", 12).await.unwrap().id;
    let stuck = grain(&pool, strain).await;
    backdate(&pool, stuck.id, 50).await;
    let _fresh = grain(&pool, strain).await;

    let stats = db::dashboard_stats(&pool, Utc::now()).await.unwrap();
    assert_eq!(stats.expiring.len(), 1);
    assert_eq!(stats.expiring[0].readable_id, stuck.readable_id);
    assert_eq!(stats.expiring[0].days_incubating, 50);
}

#[tokio::test]
async fn monthly_series_clamps_month_count() {
    let pool = setup_pool().await;
    let now = Utc::now();

    // a huge month count must not allocate a huge series
    let series = db::monthly_inoculations(&pool, now, u32::MAX).await.unwrap();
    assert_eq!(series.len(), db::MAX_TRAILING_MONTHS as usize);

    let series = db::monthly_inoculations(&pool, now, 0).await.unwrap();
    assert_eq!(series.len(), 1);
}

#[tokio::test]
async fn monthly_inoculations_zero_fill_empty_months() {
    let pool = setup_pool().await;
    let strain = db::create_strain(&pool, "Oyster", 12).await.unwrap().id;
    let _batch = grain(&pool, strain).await;

    let now = Utc::now();
    let series = db::monthly_inoculations(&pool, now, 6).await.unwrap();
    assert_eq!(series.len(), 6);
    let current = series.last().unwrap();
    assert_eq!(current.month, now.format("%Y-%m").to_string());
    assert_eq!(current.grain, 1);
    assert_eq!(current.kits, 0);
    for entry in &series[..5] {
        assert_eq!(entry.grain, 0);
        assert_eq!(entry.kits, 0);
    }
}
