use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::ApiError;
use crate::context::CompanyContext;
use crate::contracts::period_v1::{CreatePeriodRequest, PeriodResponse};
use crate::services::period_service;

/// Handler for POST /api/ledger/periods
pub async fn create_period(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Json(req): Json<CreatePeriodRequest>,
) -> Result<(StatusCode, Json<PeriodResponse>), ApiError> {
    let period =
        period_service::create_period(&pool, &ctx, req.period_start, req.period_end).await?;
    Ok((StatusCode::CREATED, Json(period.into())))
}

/// Handler for POST /api/ledger/periods/{id}/close
pub async fn close_period(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(period_id): Path<Uuid>,
) -> Result<Json<PeriodResponse>, ApiError> {
    Ok(Json(period_service::close_period(&pool, &ctx, period_id).await?.into()))
}

/// Handler for POST /api/ledger/periods/{id}/reopen
pub async fn reopen_period(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(period_id): Path<Uuid>,
) -> Result<Json<PeriodResponse>, ApiError> {
    Ok(Json(period_service::reopen_period(&pool, &ctx, period_id).await?.into()))
}

/// Handler for POST /api/ledger/periods/{id}/lock
pub async fn lock_period(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(period_id): Path<Uuid>,
) -> Result<Json<PeriodResponse>, ApiError> {
    Ok(Json(period_service::lock_period(&pool, &ctx, period_id).await?.into()))
}
