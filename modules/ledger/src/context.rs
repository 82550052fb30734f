//! Company/user context for every request.
//!
//! Authentication happens upstream; the gateway forwards the resolved
//! tenant and user as `X-Company-Id` / `X-User-Id`. Every query the
//! services run is filtered on `company_id` taken from here.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::routes::ErrorResponse;

pub const COMPANY_HEADER: &str = "x-company-id";
pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanyContext {
    pub company_id: Uuid,
    pub user_id: Uuid,
}

impl CompanyContext {
    pub fn new(company_id: Uuid, user_id: Uuid) -> Self {
        Self {
            company_id,
            user_id,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextRejection {
    #[error("Missing required header {0}")]
    MissingHeader(&'static str),

    #[error("Header {0} must be a valid UUID")]
    InvalidHeader(&'static str),
}

impl IntoResponse for ContextRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing_context", self.to_string())),
        )
            .into_response()
    }
}

pub(crate) fn header_uuid(parts: &Parts, name: &'static str) -> Result<Uuid, ContextRejection> {
    let raw = parts
        .headers
        .get(name)
        .ok_or(ContextRejection::MissingHeader(name))?;
    raw.to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or(ContextRejection::InvalidHeader(name))
}

impl<S> FromRequestParts<S> for CompanyContext
where
    S: Send + Sync,
{
    type Rejection = ContextRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let company_id = header_uuid(parts, COMPANY_HEADER)?;
        let user_id = header_uuid(parts, USER_HEADER)?;
        Ok(CompanyContext::new(company_id, user_id))
    }
}
