//! `Idempotency-Key` support for write endpoints.
//!
//! A 2xx JSON response is stored per (company, key) for 24 hours and
//! replayed verbatim on repeats. Reusing a key for a different request is
//! rejected with 422. Failing to store a key never fails the request.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::context::COMPANY_HEADER;
use crate::routes::ErrorResponse;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

const KEY_TTL_HOURS: i64 = 24;
const MAX_KEY_CHARS: usize = 255;
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, sqlx::FromRow)]
struct StoredResponse {
    request_hash: String,
    response_body: JsonValue,
    status_code: i32,
}

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(code, message))).into_response()
}

fn company_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(COMPANY_HEADER)?
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Fingerprint of a request: method, path and body
pub fn request_hash(method: &Method, path: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    format!("{:x}", hasher.finalize())
}

/// Replay or record responses for requests carrying an idempotency key
pub async fn check_idempotency(
    State(pool): State<Arc<PgPool>>,
    request: Request,
    next: Next,
) -> Response {
    if !matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) {
        return next.run(request).await;
    }

    let key = match request.headers().get(IDEMPOTENCY_HEADER) {
        Some(value) => match value.to_str() {
            Ok(k) if !k.trim().is_empty() && k.len() <= MAX_KEY_CHARS => k.trim().to_string(),
            _ => {
                return error(
                    StatusCode::BAD_REQUEST,
                    "invalid_idempotency_key",
                    "Idempotency-Key must be 1-255 visible ASCII characters",
                )
            }
        },
        None => return next.run(request).await,
    };

    // Without a tenant there is nothing to scope the key to; the handler
    // rejects the request itself.
    let Some(company_id) = company_id(request.headers()) else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "Request body too large",
            )
        }
    };
    let hash = request_hash(&parts.method, parts.uri.path(), &body_bytes);

    let existing = sqlx::query_as::<_, StoredResponse>(
        r#"
        SELECT request_hash, response_body, status_code
        FROM idempotency_keys
        WHERE company_id = $1 AND idempotency_key = $2 AND expires_at > NOW()
        "#,
    )
    .bind(company_id)
    .bind(&key)
    .fetch_optional(pool.as_ref())
    .await;

    match existing {
        Ok(Some(stored)) if stored.request_hash != hash => {
            tracing::warn!(
                company_id = %company_id,
                idempotency_key = %key,
                "Idempotency key reused for a different request"
            );
            return error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "idempotency_key_conflict",
                "Idempotency-Key was already used for a different request",
            );
        }
        Ok(Some(stored)) => {
            tracing::info!(company_id = %company_id, idempotency_key = %key, "Replaying stored response");
            let status = u16::try_from(stored.status_code)
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::OK);
            return (status, Json(stored.response_body)).into_response();
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(error = %e, "Failed to look up idempotency key");
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "database_error",
                "Database error",
            );
        }
    }

    let response = next
        .run(axum::http::Request::from_parts(parts, Body::from(body_bytes)))
        .await;

    if !response.status().is_success() {
        return response;
    }

    let status_code = i32::from(response.status().as_u16());
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to read response",
            )
        }
    };

    match serde_json::from_slice::<JsonValue>(&bytes) {
        Ok(response_body) => {
            let expires_at = Utc::now() + Duration::hours(KEY_TTL_HOURS);
            let stored = sqlx::query(
                r#"
                INSERT INTO idempotency_keys
                    (company_id, idempotency_key, request_hash, response_body, status_code, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (company_id, idempotency_key) DO UPDATE
                SET request_hash = EXCLUDED.request_hash,
                    response_body = EXCLUDED.response_body,
                    status_code = EXCLUDED.status_code,
                    created_at = NOW(),
                    expires_at = EXCLUDED.expires_at
                WHERE idempotency_keys.expires_at <= NOW()
                "#,
            )
            .bind(company_id)
            .bind(&key)
            .bind(&hash)
            .bind(&response_body)
            .bind(status_code)
            .bind(expires_at)
            .execute(pool.as_ref())
            .await;

            if let Err(e) = stored {
                tracing::warn!(
                    company_id = %company_id,
                    idempotency_key = %key,
                    error = %e,
                    "Failed to store idempotency key"
                );
            }
        }
        Err(_) => {
            tracing::warn!(idempotency_key = %key, "Response is not JSON; not cached");
        }
    }

    axum::http::Response::from_parts(parts, Body::from(bytes))
}
