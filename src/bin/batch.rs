use std::sync::Arc;

use scour::{batch, db, AppState, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let settings = Settings::from_env()?;
    let pool = db::connect_pool().await?;
    db::migrate(&pool).await?;
    let state = Arc::new(AppState::new(settings, pool)?);

    batch::runner::run(state).await
}
