use crate::config::Config;
use crate::error::ApiError;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
    routing::{get, post},
};
use chorus_core::{
    Authenticator, CastVoteOperation, CastVoteOperationRequest, DynKvStore, GetTalliesOperation,
    GetTalliesOperationRequest, Result, SessionAuthenticator, Tally, VoteType,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub struct ServerState {
    pub authenticator: Arc<dyn Authenticator>,
    pub cast_vote: CastVoteOperation,
    pub get_tallies: GetTalliesOperation,
}

impl ServerState {
    pub fn new(config: &Config, store: DynKvStore) -> Self {
        Self {
            authenticator: Arc::new(SessionAuthenticator::new(store.clone())),
            cast_vote: CastVoteOperation::new(store.clone(), config.votes.consistency),
            get_tallies: GetTalliesOperation::new(store)
                .with_max_items(config.server.max_batch_items),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VoteRequest {
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    item_type: Option<String>,
    #[serde(default)]
    vote_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct VoteResponse {
    likes: i64,
    dislikes: i64,
    vote: Option<VoteType>,
}

#[derive(Debug, Deserialize)]
struct TalliesRequest {
    #[serde(default)]
    items: Option<Vec<String>>,
}

pub async fn run_server(config: Config) -> Result<()> {
    let store = config.store.open().await?;
    let state = Arc::new(ServerState::new(&config, store));

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await.map_err(|e| {
        chorus_core::ChorusError::Config(format!(
            "failed to bind {}: {}",
            config.server.bind_addr, e
        ))
    })?;
    tracing::info!("Server listening on {}", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| chorus_core::ChorusError::Internal(format!("server error: {}", e)))?;

    tracing::info!("Server shut down");
    Ok(())
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/vote", post(vote_handler))
        .route("/api/votes", post(tallies_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn vote_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: std::result::Result<Json<VoteRequest>, JsonRejection>,
) -> std::result::Result<Json<VoteResponse>, ApiError> {
    let user_id = match bearer_token(&headers) {
        Some(token) => Some(state.authenticator.authenticate(token).await?),
        None => None,
    };
    if user_id.is_none() {
        return Err(chorus_core::ChorusError::Unauthorized.into());
    }

    let Json(body) = body?;
    let request = CastVoteOperationRequest::parse(
        user_id,
        body.item_type.as_deref(),
        body.item_id.as_deref(),
        body.vote_type.as_deref(),
    )?;

    let result = state.cast_vote.run(request).await?;

    Ok(Json(VoteResponse {
        likes: result.tally.likes,
        dislikes: result.tally.dislikes,
        vote: result.vote,
    }))
}

async fn tallies_handler(
    State(state): State<Arc<ServerState>>,
    body: std::result::Result<Json<TalliesRequest>, JsonRejection>,
) -> std::result::Result<Json<BTreeMap<String, Tally>>, ApiError> {
    let Json(body) = body?;
    let items = body.items.ok_or_else(|| {
        chorus_core::ChorusError::BadRequest("items is required".to_string())
    })?;

    let result = state
        .get_tallies
        .run(GetTalliesOperationRequest { items })
        .await?;

    Ok(Json(result.tallies))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", error);
            std::future::pending::<()>().await;
        }

        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(error) => {
                tracing::error!("Failed to install signal handler: {}", error);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
