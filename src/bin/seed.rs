use anyhow::bail;

use scour::{db, storage};

/// Enqueue seed URLs from the command line: `scour-seed <url> [<url> ...]`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: scour-seed <url> [<url> ...]");
    }

    let pool = db::connect_pool().await?;
    db::migrate(&pool).await?;

    for url in urls {
        let inserted = storage::queue::enqueue(&pool, &url).await?;
        println!("{url}: {}", if inserted { "enqueued" } else { "already known" });
    }
    Ok(())
}
