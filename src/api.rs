// src/api.rs
//! Read API: `/top`, `/summarize`, `/proxy` (+ `/api/...` aliases) and `/health`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::cache::SnapshotCache;
use crate::enrich::ArticleExtractor;
use crate::proxy::{FetchProxy, ProxyError};
use crate::rate_limit::{anon_id, client_identity, RateLimiter};
use crate::summarize::{Summarizer, Summary};
use crate::types::{EnrichedItem, ItemId};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SnapshotCache>,
    pub limiter: Arc<RateLimiter>,
    pub proxy: Arc<FetchProxy>,
    pub extractor: Arc<dyn ArticleExtractor>,
    pub summarizer: Arc<dyn Summarizer>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing story id")]
    MissingId,

    #[error("invalid story id: {0}")]
    InvalidId(String),

    #[error("story {0} not in snapshot")]
    NotFound(ItemId),

    #[error("rate limited")]
    RateLimited,

    #[error("missing url parameter")]
    MissingUrl,

    #[error("article extraction failed for story {id}: {cause:#}")]
    Extract { id: ItemId, cause: anyhow::Error },

    #[error("summary generation failed for story {id}: {cause:#}")]
    Summarize { id: ItemId, cause: anyhow::Error },

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl ApiError {
    fn status_and_body(&self) -> (StatusCode, &'static str) {
        match self {
            Self::MissingId => (StatusCode::BAD_REQUEST, "Missing story ID"),
            Self::InvalidId(_) => (StatusCode::BAD_REQUEST, "Invalid story ID"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "Story not found"),
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"),
            Self::MissingUrl => (StatusCode::BAD_REQUEST, "Missing url parameter"),
            Self::Extract { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to extract article content",
            ),
            Self::Summarize { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate summary",
            ),
            Self::Proxy(e) => (e.status(), "Proxy request failed"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // proxy errors carry their own bodies and metrics
        if let Self::Proxy(e) = self {
            return e.into_response();
        }
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            error!(target: "api", error = %self, "request failed");
        }
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let summarize_route = get(summarize).route_layer(middleware::from_fn_with_state(
        state.clone(),
        rate_limit,
    ));

    Router::new()
        .route("/health", get(health))
        .route("/top", get(top))
        .route("/summarize", summarize_route.clone())
        .route("/proxy", get(proxy))
        // paths used by the web frontend
        .route("/api/top", get(top))
        .route("/api/summarize", summarize_route)
        .route("/api/image-proxy", get(proxy))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Token-bucket gate keyed by client identity. Peer address comes from
/// `ConnectInfo` when the server was started with it.
async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identity = client_identity(req.headers(), peer);
    if !state.limiter.allow(&identity) {
        counter!("rate_limit_denied_total").increment(1);
        warn!(
            target: "rate_limit",
            event = "rate_limited",
            client = %anon_id(&identity),
            path = %req.uri().path(),
        );
        return ApiError::RateLimited.into_response();
    }
    next.run(req).await
}

#[derive(serde::Serialize)]
struct Health {
    status: &'static str,
    items: usize,
    last_updated: Option<String>,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        items: state.cache.len(),
        last_updated: state.cache.last_updated().map(|t| t.to_rfc3339()),
    })
}

async fn top(State(state): State<AppState>) -> Json<Vec<EnrichedItem>> {
    Json(state.cache.get_all())
}

#[derive(Deserialize)]
struct SummarizeParams {
    id: Option<String>,
}

async fn summarize(
    State(state): State<AppState>,
    Query(q): Query<SummarizeParams>,
) -> Result<Json<Summary>, ApiError> {
    let raw = q
        .id
        .filter(|s| !s.trim().is_empty())
        .ok_or(ApiError::MissingId)?;
    let id: ItemId = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidId(raw.clone()))?;

    let entry = state.cache.get(id).ok_or(ApiError::NotFound(id))?;
    if let Some(summary) = entry.summary.clone() {
        info!(target: "api", event = "summary_cache_hit", story_id = id);
        return Ok(Json(Summary {
            summary,
            model: entry.summary_model.clone().unwrap_or_default(),
        }));
    }

    let text = state
        .extractor
        .article_text(&entry.item.url)
        .await
        .map_err(|cause| ApiError::Extract { id, cause })?;
    let summary = state
        .summarizer
        .summarize(&text)
        .await
        .map_err(|cause| ApiError::Summarize { id, cause })?;

    let patched = state.cache.update(id, |e| {
        e.summary = Some(summary.summary.clone());
        e.summary_model = Some(summary.model.clone());
        e.article_text = Some(text);
    });
    if !patched {
        info!(target: "api", event = "summary_not_cached", story_id = id, "story left the snapshot");
    }
    Ok(Json(summary))
}

#[derive(Deserialize)]
struct ProxyParams {
    url: Option<String>,
}

async fn proxy(
    State(state): State<AppState>,
    Query(q): Query<ProxyParams>,
) -> Result<Response, ApiError> {
    let url = q
        .url
        .filter(|s| !s.trim().is_empty())
        .ok_or(ApiError::MissingUrl)?;
    let relayed = state.proxy.relay(&url).await?;
    Ok(relayed.into_response())
}
