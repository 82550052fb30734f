use axum::{extract::State, http::StatusCode, Json};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

/// Liveness: the process is up.
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ledger-rs",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness: the database answers a trivial query.
pub async fn ready(State(pool): State<Arc<PgPool>>) -> (StatusCode, Json<Value>) {
    match sqlx::query("SELECT 1").execute(pool.as_ref()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ready", "database": "up" })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "not_ready", "database": "down" })),
            )
        }
    }
}
