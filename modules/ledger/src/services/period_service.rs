//! Accounting period lifecycle: create, close, reopen, lock.

use chrono::NaiveDate;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::context::CompanyContext;
use crate::repos::audit_repo;
use crate::repos::period_repo::{self, AccountingPeriod, PeriodStatus};

#[derive(Debug, thiserror::Error)]
pub enum PeriodServiceError {
    #[error("Period start {start} is after period end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Period overlaps existing period {0}")]
    Overlap(Uuid),

    #[error("Accounting period not found: {0}")]
    NotFound(Uuid),

    #[error("Cannot move period {period_id} from {} to {}", from.as_str(), to.as_str())]
    InvalidTransition {
        period_id: Uuid,
        from: PeriodStatus,
        to: PeriodStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// open ⇄ closed, and either → locked. Locked is final.
pub fn is_allowed_transition(from: PeriodStatus, to: PeriodStatus) -> bool {
    matches!(
        (from, to),
        (PeriodStatus::Open, PeriodStatus::Closed)
            | (PeriodStatus::Closed, PeriodStatus::Open)
            | (PeriodStatus::Open, PeriodStatus::Locked)
            | (PeriodStatus::Closed, PeriodStatus::Locked)
    )
}

pub async fn create_period(
    pool: &PgPool,
    ctx: &CompanyContext,
    period_start: NaiveDate,
    period_end: NaiveDate,
) -> Result<AccountingPeriod, PeriodServiceError> {
    if period_start > period_end {
        return Err(PeriodServiceError::InvalidRange {
            start: period_start,
            end: period_end,
        });
    }

    let mut tx = pool.begin().await?;

    period_repo::lock_company_periods_tx(&mut tx, ctx.company_id).await?;
    if let Some(existing) =
        period_repo::find_overlapping_tx(&mut tx, ctx.company_id, period_start, period_end).await?
    {
        return Err(PeriodServiceError::Overlap(existing.id));
    }

    let period = period_repo::insert_tx(&mut tx, ctx.company_id, period_start, period_end).await?;

    audit_repo::insert_tx(
        &mut tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "period.created",
            entity_type: "accounting_period",
            entity_id: period.id,
            details: json!({ "period_start": period_start, "period_end": period_end }),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        company_id = %ctx.company_id,
        period_id = %period.id,
        %period_start,
        %period_end,
        "Accounting period created"
    );

    Ok(period)
}

pub async fn close_period(
    pool: &PgPool,
    ctx: &CompanyContext,
    period_id: Uuid,
) -> Result<AccountingPeriod, PeriodServiceError> {
    transition(pool, ctx, period_id, PeriodStatus::Closed).await
}

pub async fn reopen_period(
    pool: &PgPool,
    ctx: &CompanyContext,
    period_id: Uuid,
) -> Result<AccountingPeriod, PeriodServiceError> {
    transition(pool, ctx, period_id, PeriodStatus::Open).await
}

pub async fn lock_period(
    pool: &PgPool,
    ctx: &CompanyContext,
    period_id: Uuid,
) -> Result<AccountingPeriod, PeriodServiceError> {
    transition(pool, ctx, period_id, PeriodStatus::Locked).await
}

async fn transition(
    pool: &PgPool,
    ctx: &CompanyContext,
    period_id: Uuid,
    to: PeriodStatus,
) -> Result<AccountingPeriod, PeriodServiceError> {
    let mut tx = pool.begin().await?;

    let current = period_repo::lock_by_id_tx(&mut tx, ctx.company_id, period_id)
        .await?
        .ok_or(PeriodServiceError::NotFound(period_id))?;

    if !is_allowed_transition(current.status, to) {
        tracing::warn!(
            company_id = %ctx.company_id,
            period_id = %period_id,
            from = current.status.as_str(),
            to = to.as_str(),
            "Period transition rejected"
        );
        return Err(PeriodServiceError::InvalidTransition {
            period_id,
            from: current.status,
            to,
        });
    }

    let updated = period_repo::update_status_tx(&mut tx, period_id, to, ctx.user_id).await?;

    audit_repo::insert_tx(
        &mut tx,
        audit_repo::AuditRecord {
            company_id: ctx.company_id,
            actor_id: ctx.user_id,
            action: "period.status_changed",
            entity_type: "accounting_period",
            entity_id: period_id,
            details: json!({ "from": current.status, "to": to }),
        },
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        company_id = %ctx.company_id,
        period_id = %period_id,
        from = current.status.as_str(),
        to = to.as_str(),
        "Accounting period status changed"
    );

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_is_final() {
        for to in [PeriodStatus::Open, PeriodStatus::Closed, PeriodStatus::Locked] {
            assert!(!is_allowed_transition(PeriodStatus::Locked, to));
        }
    }

    #[test]
    fn open_and_closed_move_both_ways() {
        assert!(is_allowed_transition(PeriodStatus::Open, PeriodStatus::Closed));
        assert!(is_allowed_transition(PeriodStatus::Closed, PeriodStatus::Open));
        assert!(is_allowed_transition(PeriodStatus::Open, PeriodStatus::Locked));
        assert!(is_allowed_transition(PeriodStatus::Closed, PeriodStatus::Locked));
    }

    #[test]
    fn same_status_is_not_a_transition() {
        assert!(!is_allowed_transition(PeriodStatus::Open, PeriodStatus::Open));
        assert!(!is_allowed_transition(PeriodStatus::Closed, PeriodStatus::Closed));
    }
}
