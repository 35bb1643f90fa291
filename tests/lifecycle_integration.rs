/// Integration smoke tests for the lead lifecycle against a real database.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL (or DATABASE_URL) to run.
use chrono::{Duration, Utc};
use pulse_capture_api::db::Database;
use pulse_capture_api::errors::AppError;
use pulse_capture_api::handlers::record_event;
use pulse_capture_api::lifecycle;
use pulse_capture_api::models::{EventType, LeadStatus};
use serde_json::json;
use sqlx::PgPool;
use std::env;
use uuid::Uuid;

async fn connect() -> anyhow::Result<Database> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    db.migrate().await?;
    Ok(db)
}

async fn insert_lead(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO leads (id, name, email, problem_text, status) VALUES ($1, $2, $3, $4, 'new')",
    )
    .bind(id)
    .bind(name)
    .bind(format!("{}@test.example", id.simple()))
    .bind("We need help scaling our outbound sales")
    .execute(pool)
    .await?;
    Ok(id)
}

async fn event_count(pool: &PgPool, lead_id: Uuid, event_type: &str) -> anyhow::Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM events WHERE lead_id = $1 AND event_type = $2",
    )
    .bind(lead_id)
    .bind(event_type)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[tokio::test]
#[ignore]
async fn captured_lead_starts_new_with_one_event() -> anyhow::Result<()> {
    let db = connect().await?;
    let lead_id = insert_lead(&db.pool, "Capture Test").await?;
    record_event(
        &db.pool,
        lead_id,
        EventType::LeadCaptured,
        json!({ "source": "website" }),
    )
    .await
    .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let status = lifecycle::current_status(&db.pool, lead_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(status, LeadStatus::New);
    assert_eq!(event_count(&db.pool, lead_id, "lead_captured").await?, 1);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn repeated_scoring_appends_two_events() -> anyhow::Result<()> {
    let db = connect().await?;
    let lead_id = insert_lead(&db.pool, "Rescore Test").await?;

    for _ in 0..2 {
        let current = lifecycle::current_status(&db.pool, lead_id)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        lifecycle::apply(&db.pool, lead_id, current, LeadStatus::Scored)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        record_event(
            &db.pool,
            lead_id,
            EventType::LeadScored,
            json!({ "fit_score": 70 }),
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }

    assert_eq!(event_count(&db.pool, lead_id, "lead_scored").await?, 2);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn stale_transition_loses_the_race() -> anyhow::Result<()> {
    let db = connect().await?;
    let lead_id = insert_lead(&db.pool, "Race Test").await?;

    lifecycle::apply(&db.pool, lead_id, LeadStatus::New, LeadStatus::Scored)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    // Second writer still believes the lead is new
    let result = lifecycle::apply(&db.pool, lead_id, LeadStatus::New, LeadStatus::OutreachSent).await;
    match result {
        Err(AppError::Conflict(_)) => {}
        other => panic!("expected Conflict, got {:?}", other),
    }

    let status = lifecycle::current_status(&db.pool, lead_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(status, LeadStatus::Scored);
    Ok(())
}

#[tokio::test]
#[ignore]
async fn listing_window_is_created_at_descending() -> anyhow::Result<()> {
    let db = connect().await?;

    let marker = Uuid::new_v4().simple().to_string();
    let base = Utc::now();
    // 25 leads, oldest first; lead 0 is the oldest
    for i in 0..25i64 {
        sqlx::query(
            "INSERT INTO leads (id, name, email, problem_text, status, created_at)
             VALUES ($1, $2, $3, $4, 'new', $5)",
        )
        .bind(Uuid::new_v4())
        .bind(format!("{} {}", marker, i))
        .bind(format!("{}-{}@test.example", marker, i))
        .bind("We need help scaling our outbound sales")
        .bind(base - Duration::minutes(25 - i))
        .execute(&db.pool)
        .await?;
    }

    // Page 2, limit 10: leads 11-20 by created_at descending
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM leads WHERE name LIKE $1
         ORDER BY created_at DESC LIMIT 10 OFFSET 10",
    )
    .bind(format!("{}%", marker))
    .fetch_all(&db.pool)
    .await?;

    assert_eq!(names.len(), 10);
    assert_eq!(names.first().unwrap(), &format!("{} {}", marker, 14));
    assert_eq!(names.last().unwrap(), &format!("{} {}", marker, 5));
    Ok(())
}

#[tokio::test]
#[ignore]
async fn deleting_a_lead_cascades_its_events() -> anyhow::Result<()> {
    let db = connect().await?;
    let lead_id = insert_lead(&db.pool, "Cascade Test").await?;
    record_event(&db.pool, lead_id, EventType::LeadCaptured, json!({}))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(lead_id)
        .execute(&db.pool)
        .await?;

    assert_eq!(event_count(&db.pool, lead_id, "lead_captured").await?, 0);
    Ok(())
}
