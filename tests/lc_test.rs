use chrono::Local;
use fungihub::db::{self, NewBatch, NewLiquidCulture};
use fungihub::error::AppError;
use fungihub::model::{BatchType, LcStatus};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[tokio::test]
async fn lc_ids_use_their_own_date_key_and_sequence() {
    let pool = setup_pool().await;
    let strain = db::create_strain(&pool, "Oyster", 12).await.unwrap().id;

    // a batch created the same day must not consume LC sequence numbers
    db::create_batch(
        &pool,
        NewBatch {
            batch_type: Some(BatchType::Grain),
            strain_id: Some(strain),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let lc1 = db::create_liquid_culture(&pool, NewLiquidCulture::default())
        .await
        .unwrap();
    let lc2 = db::create_liquid_culture(&pool, NewLiquidCulture::default())
        .await
        .unwrap();

    let key = Local::now().date_naive().format("%Y%m%d").to_string();
    assert_eq!(lc1.readable_id, format!("LC-{key}-01"));
    assert_eq!(lc2.readable_id, format!("LC-{key}-02"));
    assert_eq!(lc1.status, LcStatus::Active);
}

#[tokio::test]
async fn listing_joins_strain_names() {
    let pool = setup_pool().await;
    let strain = db::create_strain(&pool, "Shiitake", 20).await.unwrap().id;

    db::create_liquid_culture(
        &pool,
        NewLiquidCulture {
            strain_id: Some(strain),
            volume_ml: Some(250.0),
            notes: Some("honey broth".into()),
        },
    )
    .await
    .unwrap();
    db::create_liquid_culture(&pool, NewLiquidCulture::default())
        .await
        .unwrap();

    let lcs = db::list_liquid_cultures(&pool).await.unwrap();
    assert_eq!(lcs.len(), 2);
    let with_strain = lcs
        .iter()
        .find(|lc| lc.strain_id == Some(strain))
        .expect("LC with a strain");
    assert_eq!(with_strain.strain_name.as_deref(), Some("Shiitake"));
    assert_eq!(with_strain.volume_ml, Some(250.0));
    let without = lcs.iter().find(|lc| lc.strain_id.is_none()).unwrap();
    assert!(without.strain_name.is_none());
}

#[tokio::test]
async fn status_and_notes_updates() {
    let pool = setup_pool().await;
    let lc = db::create_liquid_culture(&pool, NewLiquidCulture::default())
        .await
        .unwrap();

    db::update_lc_status(&pool, lc.id, LcStatus::Exhausted)
        .await
        .unwrap();
    db::update_lc_notes(&pool, lc.id, "used up on G-batch")
        .await
        .unwrap();

    let lcs = db::list_liquid_cultures(&pool).await.unwrap();
    assert_eq!(lcs[0].status, LcStatus::Exhausted);
    assert_eq!(lcs[0].notes, "used up on G-batch");

    let err = db::update_lc_status(&pool, 9999, LcStatus::Contaminated)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_the_culture() {
    let pool = setup_pool().await;
    let lc = db::create_liquid_culture(&pool, NewLiquidCulture::default())
        .await
        .unwrap();

    db::delete_liquid_culture(&pool, lc.id).await.unwrap();
    assert!(db::list_liquid_cultures(&pool).await.unwrap().is_empty());

    let err = db::delete_liquid_culture(&pool, lc.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
