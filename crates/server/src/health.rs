//! `/health` for the bot process. The bot is ready once the shout-out table
//! answers; the body carries the backlog a release would pick up.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use trout_core::Visibility;
use trout_db::{DbPool, RepositoryError, SqlShoutOutRepository};

#[derive(Clone)]
pub struct HealthState {
    shout_outs: Arc<SqlShoutOutRepository>,
}

impl HealthState {
    pub fn new(db_pool: DbPool) -> Self {
        Self { shout_outs: Arc::new(SqlShoutOutRepository::new(db_pool)) }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PendingShoutOuts {
    pub public: i64,
    pub private: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingShoutOuts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState::new(db_pool))
}

pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let checked_at = Utc::now().to_rfc3339();

    match pending_backlog(&state.shout_outs).await {
        Ok(pending) => (
            StatusCode::OK,
            Json(HealthResponse { status: "ready", pending: Some(pending), error: None, checked_at }),
        ),
        Err(error) => {
            warn!(
                event_name = "system.health.degraded",
                correlation_id = "health",
                error = %error,
                "shout-out store is not answering"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    pending: None,
                    error: Some(error.to_string()),
                    checked_at,
                }),
            )
        }
    }
}

async fn pending_backlog(
    shout_outs: &SqlShoutOutRepository,
) -> Result<PendingShoutOuts, RepositoryError> {
    Ok(PendingShoutOuts {
        public: shout_outs.count_unreleased(Visibility::Public).await?,
        private: shout_outs.count_unreleased(Visibility::Private).await?,
    })
}
