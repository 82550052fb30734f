//! Payment API routes: recording, allocation (manual and by strategy),
//! allocation reversal and payment void.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::ApiError;
use crate::context::CompanyContext;
use crate::contracts::payment_v1::{
    AllocatePaymentRequest, AllocationOutcomeResponse, AllocationResponse, AutoAllocateRequest,
    PaymentDetailResponse, PaymentResponse, ReasonRequest, RecordPaymentRequest,
};
use crate::money::to_minor;
use crate::services::allocation_service::{self, AllocationInput};
use crate::services::allocation_strategy::StrategyOptions;
use crate::services::payment_service;

/// Handler for POST /api/ar/payments
pub async fn record_payment(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Json(req): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let payment = payment_service::record_payment(&pool, &ctx, &req).await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// Handler for GET /api/ar/payments/{id}
pub async fn get_payment(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentDetailResponse>, ApiError> {
    let (payment, allocations) =
        payment_service::get_payment(&pool, ctx.company_id, payment_id).await?;
    Ok(Json(PaymentDetailResponse {
        payment: payment.into(),
        allocations: allocations.into_iter().map(Into::into).collect(),
    }))
}

/// Handler for POST /api/ar/payments/{id}/allocations
pub async fn allocate_payment(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<AllocatePaymentRequest>,
) -> Result<(StatusCode, Json<AllocationOutcomeResponse>), ApiError> {
    let inputs = req
        .allocations
        .iter()
        .map(|line| match to_minor(line.amount) {
            Some(amount_minor) => Ok(AllocationInput {
                invoice_id: line.invoice_id,
                amount_minor,
            }),
            None => Err(ApiError::validation(format!(
                "Allocation amount for invoice {} is outside the supported range",
                line.invoice_id
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let outcome = allocation_service::allocate_payment(&pool, &ctx, payment_id, &inputs).await?;
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Handler for POST /api/ar/payments/{id}/auto-allocate
pub async fn auto_allocate_payment(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<AutoAllocateRequest>,
) -> Result<Json<AllocationOutcomeResponse>, ApiError> {
    let as_of = req.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let percentages: Vec<(Uuid, f64)> = req
        .percentages
        .iter()
        .map(|p| (p.invoice_id, p.percent))
        .collect();
    let options = StrategyOptions::build(req.strategy, &percentages, &req.priority)?;

    let outcome = allocation_service::auto_allocate_payment(
        &pool,
        &ctx,
        payment_id,
        req.strategy,
        &options,
        as_of,
    )
    .await?;
    Ok(Json(outcome.into()))
}

/// Handler for POST /api/ar/payments/{id}/allocations/{allocation_id}/reverse
pub async fn reverse_allocation(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path((payment_id, allocation_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<AllocationResponse>, ApiError> {
    let allocation =
        allocation_service::reverse_allocation(&pool, &ctx, payment_id, allocation_id, &req.reason)
            .await?;
    Ok(Json(allocation.into()))
}

/// Handler for POST /api/ar/payments/{id}/void
pub async fn void_payment(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = payment_service::void_payment(&pool, &ctx, payment_id, &req.reason).await?;
    Ok(Json(payment.into()))
}
