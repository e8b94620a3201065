use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::crawler::rate_limit::DomainRateLimiter;
use crate::spellcheck::meta::SpellMetaCache;

/// Long-lived shared state injected into every component.
///
/// All durable state lives in Postgres; what sits here is the connection
/// pool, the outbound HTTP client, and the two process-wide caches (rate
/// limiter slots and the spellcheck meta file).
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub http_client: reqwest::Client,
    pub settings: Arc<Settings>,
    pub rate_limiter: Arc<DomainRateLimiter>,
    pub spell_meta: Arc<SpellMetaCache>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("crawler_concurrency", &self.settings.crawler_concurrency)
            .field("request_timeout_s", &self.settings.request_timeout_s)
            .finish()
    }
}

impl AppState {
    pub fn new(settings: Settings, db: PgPool) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_s))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(settings.user_agent.clone())
            .build()?;

        let spell_meta = Arc::new(SpellMetaCache::new(settings.spellcheck_meta_path.clone()));

        Ok(Self {
            db,
            http_client,
            settings: Arc::new(settings),
            rate_limiter: Arc::new(DomainRateLimiter::new(1.0)),
            spell_meta,
        })
    }
}
