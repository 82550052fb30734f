use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::ApiError;
use crate::context::CompanyContext;
use crate::contracts::payment_v1::{
    CreateInvoiceRequest, CustomerBalanceResponse, InvoiceResponse,
    ReverseInvoiceAllocationsRequest, ReverseInvoiceAllocationsResponse,
};
use crate::money::{from_minor, to_minor};
use crate::services::{allocation_service, invoice_service};

/// Handler for POST /api/ar/invoices
pub async fn create_invoice(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), ApiError> {
    let invoice = invoice_service::create_invoice(&pool, &ctx, &req).await?;
    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// Handler for GET /api/ar/invoices/{id}
pub async fn get_invoice(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice = invoice_service::get_invoice(&pool, ctx.company_id, invoice_id).await?;
    Ok(Json(invoice.into()))
}

/// Handler for POST /api/ar/invoices/{id}/send
pub async fn send_invoice(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let invoice = invoice_service::send_invoice(&pool, &ctx, invoice_id).await?;
    Ok(Json(invoice.into()))
}

/// Handler for POST /api/ar/invoices/{id}/allocations/reverse
pub async fn reverse_invoice_allocations(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(invoice_id): Path<Uuid>,
    Json(req): Json<ReverseInvoiceAllocationsRequest>,
) -> Result<Json<ReverseInvoiceAllocationsResponse>, ApiError> {
    let max_minor = match req.max_amount {
        Some(amount) => Some(to_minor(amount).ok_or_else(|| {
            ApiError::validation("max_amount is outside the supported range")
        })?),
        None => None,
    };

    let outcome = allocation_service::reverse_invoice_allocations(
        &pool,
        &ctx,
        invoice_id,
        &req.reason,
        max_minor,
    )
    .await?;

    Ok(Json(ReverseInvoiceAllocationsResponse {
        invoice_id: outcome.invoice_id,
        reversed_count: outcome.allocations.len(),
        reversed_total: from_minor(outcome.reversed_total_minor),
        allocations: outcome.allocations.into_iter().map(Into::into).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// Reference date for overdue checks; defaults to today
    pub as_of: Option<NaiveDate>,
}

/// Handler for GET /api/ar/customers/{customer_id}/balance
pub async fn customer_balance(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(customer_id): Path<Uuid>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<CustomerBalanceResponse>, ApiError> {
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let summary =
        invoice_service::customer_balance_summary(&pool, ctx.company_id, customer_id, as_of).await?;
    Ok(Json(summary.into()))
}
