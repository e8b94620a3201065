use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required environment variable {key}"))
}

/// Build the shared connection pool from POSTGRES_* environment variables.
pub async fn connect_pool() -> Result<PgPool> {
    let options = PgConnectOptions::new()
        .host(&required("POSTGRES_HOST")?)
        .port(
            required("POSTGRES_PORT")?
                .trim()
                .parse::<u16>()
                .context("POSTGRES_PORT must be an integer")?,
        )
        .username(&required("POSTGRES_USER")?)
        .password(&required("POSTGRES_PASSWORD")?)
        .database(&required("POSTGRES_DB")?);

    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Apply embedded migrations. Idempotent; every binary calls this on boot.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("database migration failed")?;
    info!("database migrations applied");
    Ok(())
}
