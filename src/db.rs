use sqlx::{postgres::PgPoolOptions, PgPool};

/// Full schema definition. Every statement is re-run safe, so applying it
/// at startup doubles as the migration step (the original tooling shipped a
/// standalone migrate script; `src/bin/migrate.rs` keeps that entry point).
const SCHEMA: &str = include_str!("../migrations/schema.sql");

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Apply the static schema file. Multi-statement, so it goes through the
    /// simple query protocol.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Database schema applied");
        Ok(())
    }
}
