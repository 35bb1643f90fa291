//! Apply the database schema standalone, outside of server startup.
//!
//! Usage: cargo run --bin migrate

use pulse_capture_api::config::Config;
use pulse_capture_api::db::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "migrate=info,pulse_capture_api=info".into()),
        )
        .init();

    tracing::info!("Starting database migration...");

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    db.migrate().await?;

    // Verify tables were created
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name",
    )
    .fetch_all(&db.pool)
    .await?;

    tracing::info!("Migration completed. Tables present: {}", tables.join(", "));

    Ok(())
}
