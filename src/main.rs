use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use scour::types::{ErrorResponse, SearchResponse, SpellcheckResponse};
use scour::{db, search, spellcheck, AppState, Settings};

fn port_from_env() -> Option<u16> {
    for key in ["SCOUR_PORT", "PORT"] {
        if let Ok(value) = std::env::var(key) {
            if let Ok(port) = value.trim().parse::<u16>() {
                return Some(port);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let settings = Settings::from_env()?;
    let pool = db::connect_pool().await?;
    db::migrate(&pool).await?;
    let state = AppState::new(settings, pool)?;

    let app = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/search", get(search_handler))
        .route("/spellcheck", get(spellcheck_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let port = port_from_env().unwrap_or(8000);
    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("search API listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "scour",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
    offset: Option<usize>,
}

fn validate_params(params: &SearchParams) -> Result<(usize, usize), String> {
    if params.q.is_empty() {
        return Err("q must be non-empty".to_string());
    }
    let limit = params.limit.unwrap_or(20);
    if !(1..=100).contains(&limit) {
        return Err("limit must be between 1 and 100".to_string());
    }
    Ok((limit, params.offset.unwrap_or(0)))
}

async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<ErrorResponse>)> {
    let (limit, offset) = validate_params(&params)
        .map_err(|error| (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })))?;

    match search::perform_search(&state, &params.q, limit, offset).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            error!(%err, "search failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            ))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpellcheckParams {
    q: String,
}

async fn spellcheck_handler(
    State(state): State<AppState>,
    Query(params): Query<SpellcheckParams>,
) -> Result<Json<SpellcheckResponse>, (StatusCode, Json<ErrorResponse>)> {
    match spellcheck::service::suggest(&state, &params.q).await {
        Ok(suggestion) => Ok(Json(SpellcheckResponse { suggestion })),
        Err(err) => {
            error!(%err, "spellcheck failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            ))
        }
    }
}
