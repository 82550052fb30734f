//! Journal entry API routes
//!
//! - Create: draft entry, optionally posted in the same transaction
//! - Post: validate and post a draft
//! - Void / Reverse: undo a posted entry with an equal-and-opposite entry

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
use crate::contracts::journal_entry_v1::{
    CreateJournalEntryRequest, JournalEntryResponse, ReversalOutcome, ReverseJournalEntryRequest,
    VoidJournalEntryRequest, VoidOutcome,
};
use crate::services::{journal_service, reversal_service};

async fn load_response(
    pool: &PgPool,
    company_id: Uuid,
    entry_id: Uuid,
) -> Result<JournalEntryResponse, ApiError> {
    let (entry, lines) = journal_service::get_entry(pool, company_id, entry_id).await?;
    Ok(JournalEntryResponse::from_parts(entry, lines))
}

/// Handler for POST /api/ledger/journal-entries
pub async fn create_entry(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Json(req): Json<CreateJournalEntryRequest>,
) -> Result<(StatusCode, Json<JournalEntryResponse>), ApiError> {
    let entry_id = journal_service::create_draft_entry(&pool, &ctx, &req).await?;
    let response = load_response(&pool, ctx.company_id, entry_id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for GET /api/ledger/journal-entries/{id}
pub async fn get_entry(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<JournalEntryResponse>, ApiError> {
    Ok(Json(load_response(&pool, ctx.company_id, entry_id).await?))
}

/// Handler for POST /api/ledger/journal-entries/{id}/post
pub async fn post_entry(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<JournalEntryResponse>, ApiError> {
    journal_service::post_entry(&pool, &ctx, entry_id).await?;
    Ok(Json(load_response(&pool, ctx.company_id, entry_id).await?))
}

/// Handler for POST /api/ledger/journal-entries/{id}/void
///
/// Drafts are marked void directly. Posted entries get a reversal dated
/// today and are then marked void.
pub async fn void_entry(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<VoidJournalEntryRequest>,
) -> Result<Json<VoidOutcome>, ApiError> {
    let outcome = reversal_service::void_entry(&pool, &ctx, entry_id, &req.reason).await?;
    Ok(Json(outcome))
}

/// Handler for POST /api/ledger/journal-entries/{id}/reverse
pub async fn reverse_entry(
    State(pool): State<Arc<PgPool>>,
    ctx: CompanyContext,
    Path(entry_id): Path<Uuid>,
    Json(req): Json<ReverseJournalEntryRequest>,
) -> Result<(StatusCode, Json<ReversalOutcome>), ApiError> {
    let outcome = reversal_service::reverse_entry(
        &pool,
        &ctx,
        entry_id,
        req.reversal_date,
        req.reason.as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}
