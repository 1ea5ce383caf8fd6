use crate::mdoc::AppState;
use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::Connection;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};
use utoipa::ToSchema;

const HEALTH_DB_TIMEOUT_SECONDS: u64 = 2;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    name: String,
    version: String,
    build: String,
    database: String,
}

#[utoipa::path(
    get,
    path= "/check",
    responses (
        (status = 200, description = "Process is alive", body = String)
    ),
    tag = "health",
)]
pub async fn check() -> impl IntoResponse {
    "1"
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "User database is reachable", body = Health),
        (status = 503, description = "User database is unreachable", body = Health)
    ),
    tag = "health",
)]
pub async fn health(method: Method, State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = ping_database(&state).await;

    let health = Health {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: GIT_COMMIT_HASH.to_string(),
        database: if db_healthy { "ok" } else { "error" }.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = health.build.get(..7).unwrap_or("");

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            let mut headers = HeaderMap::new();
            headers.insert("X-App", x_app_header_value);
            headers
        })
        .unwrap_or_else(|err| {
            debug!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    if db_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}

async fn ping_database(state: &AppState) -> bool {
    let probe = async {
        match state.users().pool().acquire().await {
            Ok(mut conn) => match conn.ping().await {
                Ok(()) => true,
                Err(err) => {
                    error!("Failed to ping database: {}", err);
                    false
                }
            },
            Err(err) => {
                error!("Failed to acquire database connection: {}", err);
                false
            }
        }
    };

    if let Ok(healthy) = timeout(Duration::from_secs(HEALTH_DB_TIMEOUT_SECONDS), probe).await {
        healthy
    } else {
        warn!("Database health check timed out");
        false
    }
}
